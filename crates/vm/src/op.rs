use crate::{Builtin, Cell};
use index_vec::IndexVec;
use std::fmt;

index_vec::define_index_type! {
    /// The index of an instruction in a [`Code`] arena.
    pub struct InstrId = u32;
}

/// A single bytecode instruction with at most one immediate.
///
/// Arithmetic, comparison and load/store opcodes come in int/real pairs; the
/// parser picks the variant from the statically known operand type, and the
/// VM trusts it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Op {
    /// Push an int constant.
    PushInt(i64),
    /// Push a double constant.
    PushReal(f64),

    /// Push the address of the global cell at the given index.
    Addr(usize),
    /// Push the address of the stack cell at `FP + offset`.
    ///
    /// Locals have positive offsets, parameters negative ones.
    FpAddr(i32),
    /// Pop an int offset, then an address; push the address advanced by that
    /// many cells. Used for array indexing and struct member access.
    Offset,

    /// Pop an address and push the int cell it refers to.
    LoadInt,
    /// Pop an address and push the double cell it refers to.
    LoadReal,
    /// Pop an int value, then an address; store the value there and push it
    /// back as the result of the assignment expression.
    StoreInt,
    /// Pop a double value, then an address; store the value there and push
    /// it back as the result of the assignment expression.
    StoreReal,

    AddInt,
    SubInt,
    MulInt,
    /// Traps on division by zero.
    DivInt,
    AddReal,
    SubReal,
    MulReal,
    DivReal,

    LtInt,
    LtReal,
    LeInt,
    LeReal,
    GtInt,
    GtReal,
    GeInt,
    GeReal,
    EqInt,
    EqReal,
    NeInt,
    NeReal,

    /// Pop two ints, push `(a != 0) && (b != 0)`.
    AndInt,
    /// Pop two ints, push `(a != 0) || (b != 0)`.
    OrInt,
    /// Pop an int, push `a == 0`.
    NotInt,
    NegInt,
    NegReal,

    /// Pop an int, push it as a double.
    IntToReal,
    /// Pop a double, push it truncated to an int.
    RealToInt,

    /// Unconditional jump.
    Jump(InstrId),
    /// Pop an int and jump when it is zero.
    JumpFalse(InstrId),
    /// A stable jump target.
    Nop,

    /// Push the return address and jump to the callee's `Enter`.
    Call(InstrId),
    /// Invoke a host builtin. Does not establish a frame.
    CallExt(Builtin),
    /// Function prologue: push the old FP, establish the new frame and
    /// reserve the given number of zeroed local cells.
    Enter(u32),
    /// Pop the return value, tear down the frame and the given number of
    /// argument cells, and push the return value back.
    Ret(u32),
    /// Like [`Ret`](Self::Ret), without a return value.
    RetVoid(u32),
    /// Trap: emitted after every non-void function body. All instructions
    /// live in one shared arena, so falling off a body's end would
    /// otherwise run straight into the next function's code.
    MissingRet,

    /// Discard the top of the stack.
    Drop,
}

/// A flat arena of instructions.
///
/// Jump and call targets are [`InstrId`]s into this arena, so rolling back
/// speculative emission is a plain length truncation.
#[derive(Clone, Debug, Default)]
pub struct Code {
    ops: IndexVec<InstrId, Op>,
}

impl Code {
    /// Creates an empty code arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of instructions.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns `true` if no instructions have been emitted.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the id the next pushed instruction will get.
    pub fn next_id(&self) -> InstrId {
        InstrId::from_usize(self.ops.len())
    }

    /// Appends an instruction, returning its id.
    pub fn push(&mut self, op: Op) -> InstrId {
        self.ops.push(op)
    }

    /// Truncates the arena back to `len` instructions, discarding everything
    /// emitted since. The backtracking helper.
    pub fn truncate(&mut self, len: usize) {
        self.ops.truncate(len);
    }

    /// Inserts an instruction at the given position, shifting the rest.
    ///
    /// Only valid while ids at or past `at` have not been handed out as jump
    /// or call targets; the parser only inserts conversions inside the
    /// expression currently being emitted, which maintains this.
    pub fn insert(&mut self, at: usize, op: Op) {
        self.ops.raw.insert(at, op);
    }

    /// Replaces the instruction at `id`.
    pub fn set(&mut self, id: InstrId, op: Op) {
        self.ops[id] = op;
    }

    /// Returns the instruction at `id`.
    pub fn get(&self, id: InstrId) -> Op {
        self.ops[id]
    }

    /// Redirects the jump or call at `id` to the given target.
    ///
    /// # Panics
    ///
    /// Panics if the instruction at `id` takes no target.
    pub fn patch_target(&mut self, id: InstrId, target: InstrId) {
        let op = &mut self.ops[id];
        match op {
            Op::Jump(t) | Op::JumpFalse(t) | Op::Call(t) => *t = target,
            other => panic!("patch_target on non-jump {other:?}"),
        }
    }

    /// Sets the local-cell count of the `Enter` at `id`.
    ///
    /// # Panics
    ///
    /// Panics if the instruction at `id` is not an `Enter`.
    pub fn patch_enter(&mut self, id: InstrId, locals: u32) {
        match &mut self.ops[id] {
            Op::Enter(n) => *n = locals,
            other => panic!("patch_enter on {other:?}"),
        }
    }

    /// Iterates over all instructions with their ids.
    pub fn iter_enumerated(&self) -> impl Iterator<Item = (InstrId, &Op)> + '_ {
        self.ops.iter_enumerated()
    }

    /// Returns the instructions in the given range, for tests and dumps.
    pub fn ops(&self) -> &[Op] {
        &self.ops.raw
    }
}

/// A fully compiled program: code, the initial global memory image and the
/// entry point.
#[derive(Clone, Debug, Default)]
pub struct Program {
    /// All emitted instructions.
    pub code: Code,
    /// The initial contents of global memory: zeroed variable storage and
    /// string literal data.
    pub globals: Vec<Cell>,
    /// The `Enter` of the entry function, when one was defined.
    pub entry: Option<InstrId>,
}

impl fmt::Display for Program {
    /// Renders a bytecode listing, one instruction per line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, op) in self.code.iter_enumerated() {
            let marker = if Some(id) == self.entry { " <- entry" } else { "" };
            writeln!(f, "{:>5}: {op:?}{marker}", id.index())?;
        }
        Ok(())
    }
}
