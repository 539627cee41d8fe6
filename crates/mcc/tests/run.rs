//! End-to-end tests: compile Mini-C sources through the library API and run
//! them on the VM with captured I/O.

use mcc::interface::{FileName, Session};
use mcc::parse::Parser;
use mcc::vm::{Program, Vm};

/// Compiles a source string, returning the program or the rendered
/// diagnostics.
fn compile(src: &str) -> Result<Program, String> {
    let sess = Session::builder().with_buffer_emitter().build();
    let result = sess.enter(|| -> mcc::interface::Result<Program> {
        let mut parser = Parser::from_source_code(&sess, FileName::custom("test"), src.into())?;
        parser.parse_unit()
    });
    match result {
        Ok(program) if sess.dcx.has_errors().is_ok() => Ok(program),
        _ => Err(sess.dcx.emitted_diagnostics().unwrap()),
    }
}

/// Compiles and runs, feeding `input` to the builtins and returning
/// `(exit value, captured output)`.
#[track_caller]
fn run_with_input(src: &str, input: &str) -> (Option<i64>, String) {
    let program = compile(src).unwrap_or_else(|diags| panic!("compilation failed:\n{diags}"));
    let mut out = Vec::new();
    let ret = Vm::new(&program)
        .with_stdin(input.as_bytes())
        .with_stdout(&mut out)
        .run()
        .expect("runtime trap");
    (ret.map(|cell| cell.to_int()), String::from_utf8(out).unwrap())
}

#[track_caller]
fn run(src: &str) -> Option<i64> {
    run_with_input(src, "").0
}

#[test]
fn returns_value_through_frames() {
    let src = "int add3(int a, int b, int c){ return a + b + c; }\n\
               int main(){ return add3(1, 2, 39); }";
    assert_eq!(run(src), Some(42));
}

#[test]
fn struct_field_and_array_index() {
    let src = "struct P{ int xs[3]; };\n\
               int main(){ struct P p; p.xs[1] = 7; return p.xs[1]; }";
    assert_eq!(run(src), Some(7));
}

#[test]
fn while_counts_to_ten() {
    let src = "int main(){ int i; i = 0; while (i < 10) i = i + 1; return i; }";
    assert_eq!(run(src), Some(10));
}

#[test]
fn mutual_recursion() {
    let src = "int is_even(int n){ if (n == 0) return 1; return is_odd(n - 1); }\n\
               int is_odd(int n){ if (n == 0) return 0; return is_even(n - 1); }\n\
               int main(){ return is_even(10); }";
    // Mini-C requires definition before use, so `is_odd` cannot be called
    // from `is_even` before it exists.
    assert!(compile(src).unwrap_err().contains("Undefined id: is_odd"));
}

#[test]
fn builtin_output() {
    let src = "int main(){\n\
                   put_s(\"fib: \");\n\
                   int i; i = 0;\n\
                   int a; int b; int t;\n\
                   a = 0; b = 1;\n\
                   while (i < 8) {\n\
                       put_i(a); put_c(' ');\n\
                       t = a + b; a = b; b = t;\n\
                       i = i + 1;\n\
                   }\n\
                   return 0;\n\
               }";
    let (ret, out) = run_with_input(src, "");
    assert_eq!(ret, Some(0));
    assert_eq!(out, "fib: 0 1 1 2 3 5 8 13 ");
}

#[test]
fn builtin_input() {
    let src = "int main(){ int a; int b; a = get_i(); b = get_i(); return a * b; }";
    let (ret, _) = run_with_input(src, "6\n7\n");
    assert_eq!(ret, Some(42));
}

#[test]
fn double_io() {
    let src = "int main(){ double x; x = get_d(); put_d(x / 2.0); return 0; }";
    let (_, out) = run_with_input(src, "5\n");
    assert_eq!(out, "2.5");
}

#[test]
fn division_by_zero_traps() {
    let src = "int main(){ int z; z = 0; return 1 / z; }";
    let program = compile(src).unwrap();
    let err = Vm::new(&program).run().unwrap_err();
    assert_eq!(err.to_string(), "division by zero");
}

#[test]
fn void_main_returns_nothing() {
    let src = "void main(){ put_i(1); }";
    let (ret, out) = run_with_input(src, "");
    assert_eq!(ret, None);
    assert_eq!(out, "1");
}

#[test]
fn global_arrays_persist_across_calls() {
    let src = "int cells[10];\n\
               void set(int i, int v){ cells[i] = v; }\n\
               int main(){\n\
                   set(3, 11); set(4, 31);\n\
                   return cells[3] + cells[4];\n\
               }";
    assert_eq!(run(src), Some(42));
}

#[test]
fn struct_array_of_structs() {
    let src = "struct Point{ int x; int y; };\n\
               struct Line{ struct Point a; struct Point b; };\n\
               int main(){\n\
                   struct Line ls[2];\n\
                   ls[1].b.y = 9;\n\
                   ls[0].a.x = 1;\n\
                   return ls[1].b.y * 10 + ls[0].a.x;\n\
               }";
    assert_eq!(run(src), Some(91));
}

#[test]
fn shadowing_in_nested_blocks() {
    let src = "int main(){\n\
                   int x; x = 1;\n\
                   { int x; x = 2; { x = x + 1; } put_i(x); }\n\
                   return x;\n\
               }";
    let (ret, out) = run_with_input(src, "");
    assert_eq!(out, "3");
    assert_eq!(ret, Some(1));
}

#[test]
fn widening_in_comparisons() {
    let src = "int main(){ if (1 < 1.5) return 1; return 0; }";
    assert_eq!(run(src), Some(1));
}

#[test]
fn char_array_as_string() {
    let src = "char msg[3];\n\
               int main(){ msg[0] = 'h'; msg[1] = 'i'; msg[2] = 0; put_s(msg); return 0; }";
    let (_, out) = run_with_input(src, "");
    assert_eq!(out, "hi");
}
