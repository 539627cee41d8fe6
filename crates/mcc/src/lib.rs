//! Compiler and stack-VM interpreter for the Mini-C language.
//!
//! This crate re-exports the member crates under stable names:
//!
//! - [`interface`]: session, diagnostics, source positions;
//! - [`parse`]: lexer and the single-pass parser/code-generator;
//! - [`vm`]: bytecode model and the virtual machine;
//! - [`cli`]: the command line driver.

pub use mcc_cli as cli;
pub use mcc_interface as interface;
pub use mcc_parse as parse;
pub use mcc_vm as vm;
