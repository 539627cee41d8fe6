//! Session, diagnostics, source positions and string interning for mcc.
//!
//! Modeled on the `rustc_interface`/`rustc_span`/`rustc_errors` split, cut
//! down to what a single-file, line-oriented compiler needs.

pub mod diagnostics;

mod globals;
pub use globals::SessionGlobals;

mod pos;
pub use pos::{BytePos, RelativeBytePos};

mod session;
pub use session::{Session, SessionBuilder};

mod source_map;
pub use source_map::{FileName, SourceFile, SourceMap};

mod span;
pub use span::Span;

mod symbol;
pub use symbol::{Ident, Symbol, kw};

/// Compiler result type: either a value, or proof that an error diagnostic
/// has already been emitted.
pub type Result<T = (), E = diagnostics::ErrorGuaranteed> = std::result::Result<T, E>;

pub use anstream::ColorChoice;
