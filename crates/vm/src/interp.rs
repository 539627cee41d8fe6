use crate::{Addr, Cell, Op, Program};
use std::io::{self, BufRead, Write};

/// Maximum size of the value stack, in cells.
pub const STACK_LIMIT: usize = 1 << 20;

/// Return address pushed below the entry frame; returning to it halts the VM.
const SENTINEL_RET: u64 = u64::MAX;

/// A runtime trap. Any of these aborts execution.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid memory address")]
    InvalidAddress,
    #[error("VM stack overflow")]
    StackOverflow,
    #[error("VM stack underflow")]
    StackUnderflow,
    #[error("instruction pointer out of bounds")]
    IpOutOfBounds,
    #[error("a non-void function did not return a value")]
    MissingReturn,
    #[error("the program has no entry function")]
    NoEntry,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The stack virtual machine.
///
/// Executes a [`Program`] against a value stack with frame pointers. The
/// entry function returns to a sentinel address, which halts execution.
pub struct Vm<'a> {
    program: &'a Program,
    globals: Vec<Cell>,
    stack: Vec<Cell>,
    /// Index of the current frame's saved-FP cell. Local `i` lives at
    /// `fp + 1 + i`; parameter `k` of `P` at `fp + k - P - 1`.
    fp: usize,
    ip: usize,
    stdin: Box<dyn BufRead + 'a>,
    stdout: Box<dyn Write + 'a>,
}

impl<'a> Vm<'a> {
    /// Creates a VM for the given program, with standard I/O attached.
    pub fn new(program: &'a Program) -> Self {
        Self {
            program,
            globals: program.globals.clone(),
            stack: Vec::new(),
            fp: 0,
            ip: 0,
            stdin: Box::new(io::BufReader::new(io::stdin())),
            stdout: Box::new(io::stdout()),
        }
    }

    /// Replaces the input the builtins read from.
    pub fn with_stdin(mut self, stdin: impl BufRead + 'a) -> Self {
        self.stdin = Box::new(stdin);
        self
    }

    /// Replaces the output the builtins write to.
    pub fn with_stdout(mut self, stdout: impl Write + 'a) -> Self {
        self.stdout = Box::new(stdout);
        self
    }

    /// Runs the program's entry function to completion.
    ///
    /// Returns the entry function's return value, or `None` for `void`.
    pub fn run(&mut self) -> Result<Option<Cell>, VmError> {
        let entry = self.program.entry.ok_or(VmError::NoEntry)?;
        self.stack.clear();
        self.fp = 0;
        self.push(Cell::from_raw(SENTINEL_RET))?;
        self.ip = entry.index();
        let result = self.dispatch_loop();
        self.stdout.flush()?;
        result
    }

    fn dispatch_loop(&mut self) -> Result<Option<Cell>, VmError> {
        loop {
            let Some(&op) = self.program.code.ops().get(self.ip) else {
                return Err(VmError::IpOutOfBounds);
            };
            trace!(ip = self.ip, ?op, sp = self.stack.len(), fp = self.fp, "exec");
            self.ip += 1;
            match op {
                Op::PushInt(v) => self.push(Cell::from_int(v))?,
                Op::PushReal(v) => self.push(Cell::from_real(v))?,

                Op::Addr(index) => self.push(Cell::from_addr(Addr::Global(index)))?,
                Op::FpAddr(offset) => {
                    let index = (self.fp as i64) + i64::from(offset);
                    if index < 0 {
                        return Err(VmError::InvalidAddress);
                    }
                    self.push(Cell::from_addr(Addr::Stack(index as usize)))?;
                }
                Op::Offset => {
                    let offset = self.pop()?.to_int();
                    let addr = self.pop()?.to_addr();
                    self.push(Cell::from_addr(addr.offset(offset)))?;
                }

                Op::LoadInt | Op::LoadReal => {
                    let addr = self.pop()?.to_addr();
                    let cell = self.read(addr)?;
                    self.push(cell)?;
                }
                Op::StoreInt | Op::StoreReal => {
                    let value = self.pop()?;
                    let addr = self.pop()?.to_addr();
                    self.write(addr, value)?;
                    // Assignment is an expression; its value stays on the
                    // stack for the enclosing expression or a Drop.
                    self.push(value)?;
                }

                Op::AddInt => self.int_binop(|a, b| a.wrapping_add(b))?,
                Op::SubInt => self.int_binop(|a, b| a.wrapping_sub(b))?,
                Op::MulInt => self.int_binop(|a, b| a.wrapping_mul(b))?,
                Op::DivInt => {
                    let b = self.pop()?.to_int();
                    let a = self.pop()?.to_int();
                    if b == 0 {
                        return Err(VmError::DivisionByZero);
                    }
                    self.push(Cell::from_int(a.wrapping_div(b)))?;
                }
                Op::AddReal => self.real_binop(|a, b| a + b)?,
                Op::SubReal => self.real_binop(|a, b| a - b)?,
                Op::MulReal => self.real_binop(|a, b| a * b)?,
                Op::DivReal => self.real_binop(|a, b| a / b)?,

                Op::LtInt => self.int_cmp(|a, b| a < b)?,
                Op::LeInt => self.int_cmp(|a, b| a <= b)?,
                Op::GtInt => self.int_cmp(|a, b| a > b)?,
                Op::GeInt => self.int_cmp(|a, b| a >= b)?,
                Op::EqInt => self.int_cmp(|a, b| a == b)?,
                Op::NeInt => self.int_cmp(|a, b| a != b)?,
                Op::LtReal => self.real_cmp(|a, b| a < b)?,
                Op::LeReal => self.real_cmp(|a, b| a <= b)?,
                Op::GtReal => self.real_cmp(|a, b| a > b)?,
                Op::GeReal => self.real_cmp(|a, b| a >= b)?,
                Op::EqReal => self.real_cmp(|a, b| a == b)?,
                Op::NeReal => self.real_cmp(|a, b| a != b)?,

                Op::AndInt => self.int_binop(|a, b| ((a != 0) && (b != 0)) as i64)?,
                Op::OrInt => self.int_binop(|a, b| ((a != 0) || (b != 0)) as i64)?,
                Op::NotInt => {
                    let a = self.pop()?.to_int();
                    self.push(Cell::from_int((a == 0) as i64))?;
                }
                Op::NegInt => {
                    let a = self.pop()?.to_int();
                    self.push(Cell::from_int(a.wrapping_neg()))?;
                }
                Op::NegReal => {
                    let a = self.pop()?.to_real();
                    self.push(Cell::from_real(-a))?;
                }

                Op::IntToReal => {
                    let a = self.pop()?.to_int();
                    self.push(Cell::from_real(a as f64))?;
                }
                Op::RealToInt => {
                    let a = self.pop()?.to_real();
                    self.push(Cell::from_int(a as i64))?;
                }

                Op::Jump(target) => self.ip = target.index(),
                Op::JumpFalse(target) => {
                    if self.pop()?.to_int() == 0 {
                        self.ip = target.index();
                    }
                }
                Op::Nop => {}

                Op::Call(target) => {
                    self.push(Cell::from_raw(self.ip as u64))?;
                    self.ip = target.index();
                }
                Op::CallExt(builtin) => self.call_builtin(builtin)?,
                Op::Enter(locals) => {
                    self.push(Cell::from_raw(self.fp as u64))?;
                    self.fp = self.stack.len() - 1;
                    for _ in 0..locals {
                        self.push(Cell::ZERO)?;
                    }
                }
                Op::Ret(params) => {
                    let value = self.pop()?;
                    if let Some(ret) = self.leave_frame(params, Some(value))? {
                        return Ok(ret);
                    }
                }
                Op::RetVoid(params) => {
                    if let Some(ret) = self.leave_frame(params, None)? {
                        return Ok(ret);
                    }
                }
                Op::MissingRet => return Err(VmError::MissingReturn),

                Op::Drop => {
                    self.pop()?;
                }
            }
        }
    }

    /// Tears down the current frame and `params` argument cells, pushing the
    /// return value back. Returns `Some` when the sentinel return address was
    /// reached, i.e. the entry function returned.
    fn leave_frame(
        &mut self,
        params: u32,
        value: Option<Cell>,
    ) -> Result<Option<Option<Cell>>, VmError> {
        let saved_fp = self.read(Addr::Stack(self.fp))?.raw() as usize;
        let ret_ip = self
            .fp
            .checked_sub(1)
            .map(|i| self.read(Addr::Stack(i)))
            .transpose()?
            .ok_or(VmError::StackUnderflow)?
            .raw();
        let frame_base = self
            .fp
            .checked_sub(1 + params as usize)
            .ok_or(VmError::StackUnderflow)?;
        self.stack.truncate(frame_base);
        self.fp = saved_fp;
        if ret_ip == SENTINEL_RET {
            return Ok(Some(value));
        }
        self.ip = ret_ip as usize;
        if let Some(value) = value {
            self.push(value)?;
        }
        Ok(None)
    }

    fn int_binop(&mut self, f: impl FnOnce(i64, i64) -> i64) -> Result<(), VmError> {
        let b = self.pop()?.to_int();
        let a = self.pop()?.to_int();
        self.push(Cell::from_int(f(a, b)))
    }

    fn real_binop(&mut self, f: impl FnOnce(f64, f64) -> f64) -> Result<(), VmError> {
        let b = self.pop()?.to_real();
        let a = self.pop()?.to_real();
        self.push(Cell::from_real(f(a, b)))
    }

    fn int_cmp(&mut self, f: impl FnOnce(i64, i64) -> bool) -> Result<(), VmError> {
        let b = self.pop()?.to_int();
        let a = self.pop()?.to_int();
        self.push(Cell::from_int(f(a, b) as i64))
    }

    fn real_cmp(&mut self, f: impl FnOnce(f64, f64) -> bool) -> Result<(), VmError> {
        let b = self.pop()?.to_real();
        let a = self.pop()?.to_real();
        self.push(Cell::from_int(f(a, b) as i64))
    }

    pub(crate) fn push(&mut self, cell: Cell) -> Result<(), VmError> {
        if self.stack.len() >= STACK_LIMIT {
            return Err(VmError::StackOverflow);
        }
        self.stack.push(cell);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<Cell, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    pub(crate) fn read(&self, addr: Addr) -> Result<Cell, VmError> {
        match addr {
            Addr::Global(index) => self.globals.get(index),
            Addr::Stack(index) => self.stack.get(index),
        }
        .copied()
        .ok_or(VmError::InvalidAddress)
    }

    pub(crate) fn write(&mut self, addr: Addr, value: Cell) -> Result<(), VmError> {
        let slot = match addr {
            Addr::Global(index) => self.globals.get_mut(index),
            Addr::Stack(index) => self.stack.get_mut(index),
        }
        .ok_or(VmError::InvalidAddress)?;
        *slot = value;
        Ok(())
    }

    pub(crate) fn stdio(&mut self) -> (&mut dyn BufRead, &mut dyn Write) {
        (&mut *self.stdin, &mut *self.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Code, InstrId, Op};

    fn program(ops: &[Op]) -> Program {
        let mut code = Code::new();
        for &op in ops {
            code.push(op);
        }
        Program { code, globals: Vec::new(), entry: Some(InstrId::from_usize(0)) }
    }

    fn run(ops: &[Op]) -> Result<Option<Cell>, VmError> {
        Vm::new(&program(ops)).run()
    }

    #[test]
    fn int_arithmetic() {
        let ret = run(&[
            Op::Enter(0),
            Op::PushInt(2),
            Op::PushInt(3),
            Op::MulInt,
            Op::PushInt(1),
            Op::SubInt,
            Op::Ret(0),
        ])
        .unwrap();
        assert_eq!(ret.unwrap().to_int(), 5);
    }

    #[test]
    fn widened_arithmetic() {
        // 1 + 2.5
        let ret = run(&[
            Op::Enter(0),
            Op::PushInt(1),
            Op::IntToReal,
            Op::PushReal(2.5),
            Op::AddReal,
            Op::Ret(0),
        ])
        .unwrap();
        assert_eq!(ret.unwrap().to_real(), 3.5);
    }

    #[test]
    fn locals_and_stores() {
        // int x; x = 7; return x;
        let ret = run(&[
            Op::Enter(1),
            Op::FpAddr(1),
            Op::PushInt(7),
            Op::StoreInt,
            Op::Drop,
            Op::FpAddr(1),
            Op::LoadInt,
            Op::Ret(0),
        ])
        .unwrap();
        assert_eq!(ret.unwrap().to_int(), 7);
    }

    #[test]
    fn division_by_zero_traps() {
        let err = run(&[Op::Enter(0), Op::PushInt(1), Op::PushInt(0), Op::DivInt, Op::Ret(0)])
            .unwrap_err();
        assert!(matches!(err, VmError::DivisionByZero));
    }

    #[test]
    fn calls_and_frames() {
        // fn add(a, b) { return a + b; }  entry: return add(20, 22);
        let mut code = Code::new();
        // add
        let add_entry = code.push(Op::Enter(0));
        code.push(Op::FpAddr(-3)); // a: 0 - 2 - 1
        code.push(Op::LoadInt);
        code.push(Op::FpAddr(-2)); // b: 1 - 2 - 1
        code.push(Op::LoadInt);
        code.push(Op::AddInt);
        code.push(Op::Ret(2));
        // entry
        let entry = code.push(Op::Enter(0));
        code.push(Op::PushInt(20));
        code.push(Op::PushInt(22));
        code.push(Op::Call(add_entry));
        code.push(Op::Ret(0));

        let program = Program { code, globals: Vec::new(), entry: Some(entry) };
        let ret = Vm::new(&program).run().unwrap();
        assert_eq!(ret.unwrap().to_int(), 42);
    }

    #[test]
    fn void_entry_returns_none() {
        let ret = run(&[Op::Enter(0), Op::RetVoid(0)]).unwrap();
        assert!(ret.is_none());
    }

    #[test]
    fn loop_with_jumps() {
        // i = 0; while (i < 10) i = i + 1; return i;
        let mut code = Code::new();
        let entry = code.push(Op::Enter(1));
        code.push(Op::FpAddr(1));
        code.push(Op::PushInt(0));
        code.push(Op::StoreInt);
        code.push(Op::Drop);
        let cond = code.next_id();
        code.push(Op::FpAddr(1));
        code.push(Op::LoadInt);
        code.push(Op::PushInt(10));
        code.push(Op::LtInt);
        let jf = code.push(Op::JumpFalse(cond));
        code.push(Op::FpAddr(1));
        code.push(Op::FpAddr(1));
        code.push(Op::LoadInt);
        code.push(Op::PushInt(1));
        code.push(Op::AddInt);
        code.push(Op::StoreInt);
        code.push(Op::Drop);
        code.push(Op::Jump(cond));
        let end = code.push(Op::Nop);
        code.patch_target(jf, end);
        code.push(Op::FpAddr(1));
        code.push(Op::LoadInt);
        code.push(Op::Ret(0));

        let program = Program { code, globals: Vec::new(), entry: Some(entry) };
        let ret = Vm::new(&program).run().unwrap();
        assert_eq!(ret.unwrap().to_int(), 10);
    }

    #[test]
    fn global_offset_addressing() {
        // globals: [0, 0, 0]; g[2] = 9; return g[2];
        let mut code = Code::new();
        let entry = code.push(Op::Enter(0));
        code.push(Op::Addr(0));
        code.push(Op::PushInt(2));
        code.push(Op::Offset);
        code.push(Op::PushInt(9));
        code.push(Op::StoreInt);
        code.push(Op::Addr(0));
        code.push(Op::PushInt(2));
        code.push(Op::Offset);
        code.push(Op::LoadInt);
        code.push(Op::Ret(0));

        let program = Program { code, globals: vec![Cell::ZERO; 3], entry: Some(entry) };
        let ret = Vm::new(&program).run().unwrap();
        assert_eq!(ret.unwrap().to_int(), 9);
    }

    #[test]
    fn missing_return_traps() {
        let err = run(&[Op::Enter(0), Op::MissingRet]).unwrap_err();
        assert!(matches!(err, VmError::MissingReturn));
    }

    #[test]
    fn out_of_range_address_traps() {
        let err = run(&[Op::Enter(0), Op::Addr(100), Op::LoadInt, Op::Ret(0)]).unwrap_err();
        assert!(matches!(err, VmError::InvalidAddress));
    }

    #[test]
    fn runaway_recursion_overflows() {
        // fn f() { return f(); }
        let mut code = Code::new();
        let entry = code.push(Op::Enter(0));
        code.push(Op::Call(entry));
        code.push(Op::Ret(0));
        let program = Program { code, globals: Vec::new(), entry: Some(entry) };
        let err = Vm::new(&program).run().unwrap_err();
        assert!(matches!(err, VmError::StackOverflow));
    }
}
