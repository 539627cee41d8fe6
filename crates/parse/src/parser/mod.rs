use crate::{
    Lexer, PResult, SymbolTable, Ty,
    scope::{FnData, SymbolData, SymbolKind},
    token::{Token, TokenKind},
    ty::ArrayLen,
};
use mcc_interface::{
    FileName, Ident, Result, Session, SourceFile, Span, Symbol,
    diagnostics::{DiagCtxt, DiagMsg, ErrorGuaranteed},
};
use mcc_vm::{Builtin, Cell, Code, InstrId, Op};

mod expr;
pub(crate) use expr::ExprRes;

mod item;
mod stmt;

/// The Mini-C parser.
///
/// A single recursive-descent pass: name resolution, type checking and code
/// emission happen while parsing. There is no AST; the output is a
/// [`Program`].
pub struct Parser<'sess> {
    /// The parser session.
    pub sess: &'sess Session,

    /// The token stream.
    tokens: Vec<Token>,
    /// Index of the current token in `tokens`.
    pos: usize,
    /// The current token.
    pub token: Token,
    /// The previously consumed token.
    pub prev_token: Token,

    /// The symbol table.
    symbols: SymbolTable,
    /// The emitted instructions.
    code: Code,
    /// The global memory image: variable storage and string literal data.
    globals: Vec<Cell>,
    /// The function or struct whose definition is being parsed.
    owner: Option<crate::SymbolId>,
}

/// A restore point: token position, emitted-code length and global-memory
/// size.
///
/// Rolling back truncates everything emitted since the snapshot, so failed
/// grammar alternatives leave no trace in the instruction stream or in the
/// global memory image (string literals allocate there).
pub(crate) struct Snapshot {
    pos: usize,
    token: Token,
    prev_token: Token,
    code_len: usize,
    globals_len: usize,
}

impl<'sess> Parser<'sess> {
    /// Creates a new parser over a token stream.
    ///
    /// The host builtins are installed into the global domain before any
    /// parsing happens.
    pub fn new(sess: &'sess Session, tokens: Vec<Token>) -> Self {
        let mut parser = Self {
            sess,
            token: tokens.first().copied().unwrap_or(Token::EOF),
            tokens,
            pos: 0,
            prev_token: Token::DUMMY,
            symbols: SymbolTable::new(),
            code: Code::new(),
            globals: Vec::new(),
            owner: None,
        };
        parser.install_builtins();
        parser
    }

    /// Creates a new parser from a source code string.
    pub fn from_source_code(
        sess: &'sess Session,
        filename: FileName,
        src: String,
    ) -> Result<Self> {
        let file = sess
            .source_map()
            .new_source_file(filename, src)
            .map_err(|e| sess.dcx.err(e.to_string()).emit())?;
        Ok(Self::from_source_file(sess, &file))
    }

    /// Creates a new parser from a source file.
    pub fn from_source_file(sess: &'sess Session, file: &SourceFile) -> Self {
        Self::new(sess, Lexer::from_source_file(sess, file).into_tokens())
    }

    /// Returns the diagnostic context.
    #[inline]
    pub fn dcx(&self) -> &'sess DiagCtxt {
        &self.sess.dcx
    }

    /// Advances to the next token.
    pub fn bump(&mut self) {
        self.prev_token = self.token;
        self.pos += 1;
        self.token = self.tokens.get(self.pos).copied().unwrap_or(Token::EOF);
    }

    /// Returns the token `n` positions ahead of the current one.
    pub fn look_ahead(&self, n: usize) -> Token {
        self.tokens.get(self.pos + n).copied().unwrap_or(Token::EOF)
    }

    /// Returns `true` if the current token is `kind`.
    #[inline]
    fn check(&self, kind: &TokenKind) -> bool {
        self.token.kind == *kind
    }

    /// Consumes the current token if it is `kind`.
    fn eat(&mut self, kind: &TokenKind) -> bool {
        let is_present = self.check(kind);
        if is_present {
            self.bump();
        }
        is_present
    }

    /// Consumes the current token if it is the given keyword.
    fn eat_keyword(&mut self, kw: Symbol) -> bool {
        let is_present = self.token.is_keyword(kw);
        if is_present {
            self.bump();
        }
        is_present
    }

    /// Consumes the current token if it is a non-keyword identifier.
    fn eat_ident(&mut self) -> Option<Ident> {
        if self.token.is_non_keyword_ident() {
            let ident = self.token.ident();
            self.bump();
            ident
        } else {
            None
        }
    }

    /// Consumes an identifier or fails with `msg`.
    fn expect_ident(&mut self, msg: &'static str) -> PResult<Ident> {
        self.eat_ident().ok_or_else(|| self.err_here(msg))
    }

    /// Consumes the token `kind` or fails with `msg`.
    fn expect(&mut self, kind: &TokenKind, msg: &'static str) -> PResult<()> {
        if self.eat(kind) { Ok(()) } else { Err(self.err_here(msg)) }
    }

    /// Emits an error at the current token.
    fn err_here(&self, msg: impl Into<DiagMsg>) -> ErrorGuaranteed {
        self.err_at(self.token.span, msg)
    }

    /// Emits an error at the given span.
    fn err_at(&self, span: Span, msg: impl Into<DiagMsg>) -> ErrorGuaranteed {
        self.dcx().err(msg).span(span).emit()
    }

    /// Takes a restore point for a grammar alternative.
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            pos: self.pos,
            token: self.token,
            prev_token: self.prev_token,
            code_len: self.code.len(),
            globals_len: self.globals.len(),
        }
    }

    /// Restores the token cursor and truncates instructions and global
    /// allocations made since the snapshot.
    fn rollback(&mut self, snapshot: Snapshot) {
        self.pos = snapshot.pos;
        self.token = snapshot.token;
        self.prev_token = snapshot.prev_token;
        self.code.truncate(snapshot.code_len);
        self.globals.truncate(snapshot.globals_len);
    }

    /// Appends an instruction to the emitted code.
    fn emit(&mut self, op: Op) -> InstrId {
        self.code.push(op)
    }

    /// If `res` denotes a storage location of scalar type, loads the value;
    /// array and struct values are represented by their address.
    fn rvalue(&mut self, res: &ExprRes) {
        if res.lvalue && res.ty.can_be_scalar() {
            self.emit(if res.ty.is_real() { Op::LoadReal } else { Op::LoadInt });
        }
    }

    /// The conversion instruction needed to turn a `from` value into `to`,
    /// if any. Char counts as int.
    fn conv_op(from: &Ty, to: &Ty) -> Option<Op> {
        if !from.can_be_scalar() || !to.can_be_scalar() {
            return None;
        }
        match (from.is_real(), to.is_real()) {
            (false, true) => Some(Op::IntToReal),
            (true, false) => Some(Op::RealToInt),
            _ => None,
        }
    }

    /// Appends the conversion from `from` to `to`, if one is needed.
    fn append_conv(&mut self, from: &Ty, to: &Ty) {
        if let Some(op) = Self::conv_op(from, to) {
            self.emit(op);
        }
    }

    /// Inserts the conversion from `from` to `to` at position `at`, right
    /// after the operand whose code ends there.
    ///
    /// Insertions only happen inside the expression currently being parsed,
    /// which is emitted after every instruction id recorded so far, so no
    /// recorded jump target or call entry shifts.
    fn insert_conv_at(&mut self, at: usize, from: &Ty, to: &Ty) {
        if let Some(op) = Self::conv_op(from, to) {
            self.code.insert(at, op);
        }
    }

    /// Installs the host builtins as function symbols in the global domain,
    /// with typed signatures, so that calls to them type-check like any
    /// other call.
    fn install_builtins(&mut self) {
        const CHAR_ARRAY: Ty =
            Ty { base: crate::TyBase::Char, strukt: None, array: Some(ArrayLen::Unspecified) };

        for builtin in Builtin::ALL {
            let (param_tys, ret): (&[Ty], Ty) = match builtin {
                Builtin::PutI => (&[Ty::INT], Ty::VOID),
                Builtin::GetI => (&[], Ty::INT),
                Builtin::PutD => (&[Ty::DOUBLE], Ty::VOID),
                Builtin::GetD => (&[], Ty::DOUBLE),
                Builtin::PutC => (&[Ty::CHAR], Ty::VOID),
                Builtin::GetC => (&[], Ty::CHAR),
                Builtin::PutS => (&[CHAR_ARRAY], Ty::VOID),
                Builtin::Seconds => (&[], Ty::DOUBLE),
            };
            let fn_id = self.symbols.declare(SymbolData {
                name: Symbol::intern(builtin.name()),
                span: Span::DUMMY,
                ty: ret,
                owner: None,
                kind: SymbolKind::Fn(FnData { builtin: Some(builtin), ..FnData::default() }),
            });
            for (index, &ty) in param_tys.iter().enumerate() {
                let param = self.symbols.alloc(SymbolData {
                    name: Symbol::intern("x"),
                    span: Span::DUMMY,
                    ty,
                    owner: Some(fn_id),
                    kind: SymbolKind::Param { index: index as u32 },
                });
                self.symbols[fn_id].fn_data_mut().params.push(param);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcc_vm::{Program, Vm};

    /// Compiles a source string, returning the program or the rendered
    /// diagnostics.
    fn compile(src: &str) -> std::result::Result<Program, String> {
        let sess = Session::builder().with_buffer_emitter().build();
        let result = sess.enter(|| -> Result<Program> {
            let mut parser =
                Parser::from_source_code(&sess, FileName::custom("test"), src.to_string())?;
            parser.parse_unit()
        });
        match result {
            Ok(program) if sess.dcx.has_errors().is_ok() => Ok(program),
            _ => Err(sess.dcx.emitted_diagnostics().unwrap()),
        }
    }

    fn compile_err(src: &str) -> String {
        match compile(src) {
            Ok(_) => panic!("{src:?} compiled successfully"),
            Err(diags) => diags,
        }
    }

    #[track_caller]
    fn run(src: &str) -> Option<i64> {
        let program = compile(src).unwrap();
        let result = Vm::new(&program).run().unwrap();
        result.map(|cell| cell.to_int())
    }

    #[test]
    fn arithmetic_widening() {
        // The emitted body widens the int operand before the double add.
        let program = compile("int main(){ double x; x = 1 + 2.5; return 0; }").unwrap();
        assert_eq!(program.code.ops(), [
            Op::Enter(1),
            Op::FpAddr(1),
            Op::PushInt(1),
            Op::IntToReal,
            Op::PushReal(2.5),
            Op::AddReal,
            Op::StoreReal,
            Op::Drop,
            Op::PushInt(0),
            Op::Ret(0),
            Op::MissingRet,
        ]);
        assert_eq!(program.entry, Some(InstrId::from_usize(0)));
    }

    #[test]
    fn redeclaration() {
        let diags = compile_err("int a; int a;");
        assert_eq!(diags, "error in line 1: Variable a is already defined.\n");
    }

    #[test]
    fn undefined_id() {
        let diags = compile_err("int main(){ return y; }");
        assert_eq!(diags, "error in line 1: Undefined id: y\n");
    }

    #[test]
    fn struct_return_is_not_scalar() {
        let diags =
            compile_err("int main(){ struct P{int x;}; struct P p; return p; }");
        assert!(
            diags.contains("the return value must be a scalar value"),
            "unexpected diagnostics: {diags}"
        );
    }

    #[test]
    fn while_loop_shape() {
        let program =
            compile("int main(){ int i; i = 0; while (i < 10) i = i + 1; return i; }").unwrap();
        let ops = program.code.ops();
        let jf: Vec<_> = ops
            .iter()
            .enumerate()
            .filter_map(|(i, op)| match op {
                Op::JumpFalse(t) => Some((i, t.index())),
                _ => None,
            })
            .collect();
        let jmp: Vec<_> = ops
            .iter()
            .enumerate()
            .filter_map(|(i, op)| match op {
                Op::Jump(t) => Some((i, t.index())),
                _ => None,
            })
            .collect();
        // Exactly one conditional exit, jumping past the back-edge to the
        // trailing Nop; exactly one back-edge to the condition's first
        // instruction.
        assert_eq!(jf.len(), 1);
        assert_eq!(jmp.len(), 1);
        let (jmp_at, jmp_target) = jmp[0];
        let (_, jf_target) = jf[0];
        assert_eq!(jf_target, jmp_at + 1);
        assert_eq!(ops[jf_target], Op::Nop);
        assert!(matches!(ops[jmp_target], Op::FpAddr(1)));
    }

    #[test]
    fn backtracking_restores_code() {
        // `i + 1` first tries the assignment alternative, which emits the
        // destination address before seeing there is no `=`; the rollback
        // must leave exactly one address emission.
        let program = compile("int main(){ int i; i + 1; return 0; }").unwrap();
        assert_eq!(program.code.ops(), [
            Op::Enter(1),
            Op::FpAddr(1),
            Op::LoadInt,
            Op::PushInt(1),
            Op::AddInt,
            Op::Drop,
            Op::PushInt(0),
            Op::Ret(0),
            Op::MissingRet,
        ]);
    }

    #[test]
    fn non_void_fall_through_traps() {
        // `f` only returns on one path; all functions share one instruction
        // arena, so falling off the body must not run into `main`'s code.
        let src = "int f(int x){ if (x) return 1; }\n\
                   int main(){ return f(0); }";
        let program = compile(src).unwrap();
        let err = Vm::new(&program).run().unwrap_err();
        assert_eq!(err.to_string(), "a non-void function did not return a value");

        // The returning path is unaffected.
        let src = "int f(int x){ if (x) return 1; }\n\
                   int main(){ return f(5); }";
        assert_eq!(run(src), Some(1));
    }

    #[test]
    fn domains_are_balanced() {
        let sess = Session::builder().with_buffer_emitter().build();
        sess.enter(|| {
            let src = "struct P{int x;}; int g; \
                       int f(int a){ int b; { int c; { int d; } } return a; } \
                       int main(){ return f(1); }";
            let mut parser =
                Parser::from_source_code(&sess, FileName::custom("test"), src.to_string())
                    .unwrap();
            parser.parse_unit().unwrap();
            assert_eq!(parser.symbols.depth(), 1);
        });
    }

    #[test]
    fn struct_field_and_array_index() {
        let src = "struct P{ int xs[3]; };\n\
                   int main(){ struct P p; p.xs[1] = 7; return p.xs[1]; }";
        assert_eq!(run(src), Some(7));
    }

    #[test]
    fn while_loop_runs() {
        let src = "int main(){ int i; i = 0; while (i < 10) i = i + 1; return i; }";
        assert_eq!(run(src), Some(10));
    }

    #[test]
    fn if_else() {
        let src = "int main(){ int x; x = 3; if (x < 2) return 1; else return 2; }";
        assert_eq!(run(src), Some(2));
    }

    #[test]
    fn recursion() {
        let src = "int fib(int n){ if (n < 2) return n; return fib(n - 1) + fib(n - 2); }\n\
                   int main(){ return fib(10); }";
        assert_eq!(run(src), Some(55));
    }

    #[test]
    fn globals_and_params() {
        let src = "int g;\n\
                   void set(int v){ g = v; }\n\
                   int main(){ set(41); return g + 1; }";
        assert_eq!(run(src), Some(42));
    }

    #[test]
    fn array_parameters_share_storage() {
        let src = "int sum(int xs[], int n){\n\
                       int i; int s; i = 0; s = 0;\n\
                       while (i < n) { s = s + xs[i]; i = i + 1; }\n\
                       return s;\n\
                   }\n\
                   int main(){\n\
                       int xs[4]; int i; i = 0;\n\
                       while (i < 4) { xs[i] = i * i; i = i + 1; }\n\
                       return sum(xs, 4);\n\
                   }";
        assert_eq!(run(src), Some(0 + 1 + 4 + 9));
    }

    #[test]
    fn double_arithmetic_and_casts() {
        let src = "int main(){ double d; d = 7.5; return (int)(d * 2.0); }";
        assert_eq!(run(src), Some(15));
    }

    #[test]
    fn char_widens_to_int() {
        let src = "int main(){ char c; c = 'A'; return c + 1; }";
        assert_eq!(run(src), Some(66));
    }

    #[test]
    fn logic_and_comparisons() {
        let src = "int main(){ int a; a = 5; return (a > 1 && a <= 5) + (a == 4 || !a) * 10; }";
        assert_eq!(run(src), Some(1));
    }

    #[test]
    fn unary_minus() {
        let src = "int main(){ int a; a = 3; return -a + 10; }";
        assert_eq!(run(src), Some(7));
    }

    #[test]
    fn nested_struct_members() {
        let src = "struct Inner{ int a; int b; };\n\
                   struct Outer{ struct Inner i; int c; };\n\
                   int main(){\n\
                       struct Outer o;\n\
                       o.i.b = 5; o.c = 2;\n\
                       return o.i.b * o.c;\n\
                   }";
        assert_eq!(run(src), Some(10));
    }

    #[test]
    fn void_function_call_statement() {
        let src = "int g;\n\
                   void bump(){ g = g + 1; }\n\
                   int main(){ bump(); bump(); return g; }";
        assert_eq!(run(src), Some(2));
    }

    #[test]
    fn missing_main_is_a_runtime_error() {
        let program = compile("int g;").unwrap();
        assert!(program.entry.is_none());
    }

    #[test]
    fn type_errors() {
        for (src, msg) in [
            ("int main(){ int a; a = main; return 0; }", "A function can only be called"),
            ("int main(){ return main(1); }", "Too many arguments in function call"),
            ("void f(int a){} int main(){ f(); return 0; }", "Too few arguments in function call"),
            ("int main(){ int a; 3 = a; return 0; }", "the assign destination must be a left-value"),
            (
                "int main(){ int xs[2]; int ys[2]; xs = ys; return 0; }",
                "the assign destination cannot be constant",
            ),
            ("int main(){ int a; return a[0]; }", "only an array can be indexed"),
            ("int main(){ int a; return a.b; }", "a field can only be selected from a struct"),
            ("struct P{int x;}; int main(){ struct P p; return p.y; }", "does not have a field"),
            ("int main(){ struct Q q; return 0; }", "Struct Q is not defined."),
            ("int main(){ int xs[]; return 0; }", "A vector variable must have a dimension."),
            ("void f(){} int main(){ return f() + 1; }", "Invalid operand type for + or -"),
            ("void f(){} void f(){} int main(){ return 0; }", "symbol redefinition: f"),
            ("int main(){ return 1 = 2; }", "the assign destination must be a left-value"),
        ] {
            let diags = compile_err(src);
            assert!(diags.contains(msg), "{src:?} produced {diags:?}, expected {msg:?}");
        }
    }

    #[test]
    fn string_literals_are_char_arrays() {
        let program = compile("int main(){ put_s(\"hi\"); return 0; }").unwrap();
        // 'h', 'i', NUL laid out in global memory.
        assert_eq!(program.globals.len(), 3);
        assert_eq!(program.globals[0].to_int(), 'h' as i64);
        assert_eq!(program.globals[1].to_int(), 'i' as i64);
        assert_eq!(program.globals[2].to_int(), 0);
        assert!(program.code.ops().contains(&Op::Addr(0)));
    }

    #[test]
    fn builtins_type_check() {
        let diags = compile_err("int main(){ put_i(\"nope\"); return 0; }");
        assert!(diags.contains("cannot convert the argument type to the parameter type"));
    }
}
