//! Mini-C lexer and single-pass parser for mcc.
//!
//! The parser performs name resolution, type checking and bytecode emission
//! in one recursive-descent pass over the token stream; there is no separate
//! AST. See [`Parser::parse_unit`].

#[macro_use]
extern crate tracing;

pub mod token;

mod lexer;
pub use lexer::Lexer;

mod parser;
pub use parser::Parser;

mod scope;
pub use scope::{FnData, Storage, SymbolData, SymbolId, SymbolKind, SymbolTable};

mod ty;
pub use ty::{ArrayLen, Ty, TyBase};

/// Parser result type. The error is proof that a diagnostic has been
/// emitted; the first one aborts the compilation.
pub type PResult<T> = Result<T, mcc_interface::diagnostics::ErrorGuaranteed>;
