//! mcc CLI driver: argument parsing and the compile-then-run pipeline.

#[macro_use]
extern crate tracing;

use mcc_interface::{Result, Session};
use mcc_parse::Parser;
use mcc_vm::Vm;

mod args;
pub use args::{Args, CompilerStage};

pub mod utils;

/// Parses the command line arguments.
pub fn parse_args<I, T>(itr: I) -> std::result::Result<Args, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    <Args as clap::Parser>::try_parse_from(itr)
}

/// Runs the compiler with the given arguments: lex, parse and execute.
///
/// Returns `Err` if any diagnostic was emitted; the process exit code is
/// derived from this by the caller.
pub fn run_compiler_args(args: Args) -> Result {
    let sess = Session::builder()
        .with_stderr_emitter_and_color(args::color_choice(args.color))
        .build();
    sess.enter(|| run_compiler(&sess, &args))
}

fn run_compiler(sess: &Session, args: &Args) -> Result {
    let file = sess.source_map().load_file(&args.input).map_err(|e| {
        sess.dcx.err(format!("couldn't read {}: {e}", args.input.display())).emit()
    })?;

    let mut parser = Parser::from_source_file(sess, &file);
    let program = parser.parse_unit()?;
    sess.dcx.has_errors()?;
    debug!(instrs = program.code.len(), "compiled");

    if args.dump_bytecode {
        print!("{program}");
    }
    if args.stop_after == Some(CompilerStage::Parsing) {
        return Ok(());
    }

    let result = Vm::new(&program).run();
    match result {
        Ok(_) => Ok(()),
        Err(trap) => Err(sess.dcx.err(trap.to_string()).emit()),
    }
}
