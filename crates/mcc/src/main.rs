//! The main entry point for the mcc compiler.

#![allow(unused_crate_dependencies)]

use mcc_interface::diagnostics::FatalError;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = match mcc_cli::parse_args(std::env::args_os()) {
        Ok(args) => args,
        Err(e) => e.exit(),
    };
    mcc_cli::utils::init_logger(args.verbose);
    FatalError::catch_with_exit_code(|| mcc_cli::run_compiler_args(args))
}
