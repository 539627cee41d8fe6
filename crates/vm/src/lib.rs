//! Bytecode model and stack virtual machine for mcc.
//!
//! The parser emits [`Op`]s directly into a [`Code`] arena; the [`Vm`]
//! executes them against a value stack of untagged 64-bit [`Cell`]s. Type
//! information lives in the opcodes, not in the values.

#[macro_use]
extern crate tracing;

mod builtins;
pub use builtins::Builtin;

mod interp;
pub use interp::{STACK_LIMIT, Vm, VmError};

mod op;
pub use op::{Code, InstrId, Op, Program};

mod value;
pub use value::{Addr, Cell};
