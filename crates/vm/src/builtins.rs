use crate::{Cell, Vm, VmError};
use std::io::{BufRead, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

/// The host-provided builtin functions.
///
/// These are installed as function symbols in the global domain before
/// parsing begins, with typed signatures, so calls to them type-check like
/// any other call. At runtime they operate directly on the VM stack and do
/// not establish a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// `void put_i(int x)`: prints an int.
    PutI,
    /// `int get_i()`: reads an int from a line of input.
    GetI,
    /// `void put_d(double x)`: prints a double.
    PutD,
    /// `double get_d()`: reads a double from a line of input.
    GetD,
    /// `void put_c(char c)`: prints a character.
    PutC,
    /// `char get_c()`: reads a single character.
    GetC,
    /// `void put_s(char s[])`: prints a NUL-terminated char array.
    PutS,
    /// `double seconds()`: seconds since the Unix epoch.
    Seconds,
}

impl Builtin {
    /// Every builtin, in registration order.
    pub const ALL: [Self; 8] = [
        Self::PutI,
        Self::GetI,
        Self::PutD,
        Self::GetD,
        Self::PutC,
        Self::GetC,
        Self::PutS,
        Self::Seconds,
    ];

    /// The source-language name of the builtin.
    pub const fn name(self) -> &'static str {
        match self {
            Self::PutI => "put_i",
            Self::GetI => "get_i",
            Self::PutD => "put_d",
            Self::GetD => "get_d",
            Self::PutC => "put_c",
            Self::GetC => "get_c",
            Self::PutS => "put_s",
            Self::Seconds => "seconds",
        }
    }
}

impl Vm<'_> {
    pub(crate) fn call_builtin(&mut self, builtin: Builtin) -> Result<(), VmError> {
        trace!(name = builtin.name(), "builtin");
        match builtin {
            Builtin::PutI => {
                let value = self.pop()?.to_int();
                let (_, out) = self.stdio();
                write!(out, "{value}")?;
            }
            Builtin::PutD => {
                let value = self.pop()?.to_real();
                let (_, out) = self.stdio();
                write!(out, "{value}")?;
            }
            Builtin::PutC => {
                let value = self.pop()?.to_int();
                let c = char::from_u32(value as u32)
                    .ok_or_else(|| VmError::InvalidInput(format!("invalid character {value}")))?;
                let (_, out) = self.stdio();
                write!(out, "{c}")?;
            }
            Builtin::PutS => {
                let mut addr = self.pop()?.to_addr();
                let mut s = String::new();
                loop {
                    let code = self.read(addr)?.to_int();
                    if code == 0 {
                        break;
                    }
                    s.push(char::from_u32(code as u32).unwrap_or('\u{fffd}'));
                    addr = addr.offset(1);
                }
                let (_, out) = self.stdio();
                write!(out, "{s}")?;
            }
            Builtin::GetI => {
                let line = self.read_input_line()?;
                let value: i64 = line
                    .trim()
                    .parse()
                    .map_err(|_| VmError::InvalidInput(format!("expected an int, got {line:?}")))?;
                self.push(Cell::from_int(value))?;
            }
            Builtin::GetD => {
                let line = self.read_input_line()?;
                let value: f64 = line.trim().parse().map_err(|_| {
                    VmError::InvalidInput(format!("expected a double, got {line:?}"))
                })?;
                self.push(Cell::from_real(value))?;
            }
            Builtin::GetC => {
                let (input, out) = self.stdio();
                out.flush()?;
                let mut byte = [0u8; 1];
                let read = input.read(&mut byte)?;
                let c = if read == 0 { 0 } else { i64::from(byte[0]) };
                self.push(Cell::from_int(c))?;
            }
            Builtin::Seconds => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);
                self.push(Cell::from_real(now))?;
            }
        }
        Ok(())
    }

    fn read_input_line(&mut self) -> Result<String, VmError> {
        let (input, out) = self.stdio();
        out.flush()?;
        let mut line = String::new();
        input.read_line(&mut line)?;
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Code, InstrId, Op, Program};

    fn run_io(ops: &[Op], globals: Vec<Cell>, input: &str) -> (Option<Cell>, String) {
        let mut code = Code::new();
        for &op in ops {
            code.push(op);
        }
        let program = Program { code, globals, entry: Some(InstrId::from_usize(0)) };
        let mut out = Vec::new();
        let ret = Vm::new(&program)
            .with_stdin(input.as_bytes())
            .with_stdout(&mut out)
            .run()
            .unwrap();
        (ret, String::from_utf8(out).unwrap())
    }

    #[test]
    fn put_i_prints() {
        let (_, out) = run_io(
            &[Op::Enter(0), Op::PushInt(42), Op::CallExt(Builtin::PutI), Op::RetVoid(0)],
            Vec::new(),
            "",
        );
        assert_eq!(out, "42");
    }

    #[test]
    fn get_i_reads() {
        let (ret, _) = run_io(
            &[Op::Enter(0), Op::CallExt(Builtin::GetI), Op::Ret(0)],
            Vec::new(),
            "  123\n",
        );
        assert_eq!(ret.unwrap().to_int(), 123);
    }

    #[test]
    fn put_s_walks_until_nul() {
        let globals =
            vec![Cell::from_int('h' as i64), Cell::from_int('i' as i64), Cell::ZERO];
        let (_, out) = run_io(
            &[Op::Enter(0), Op::Addr(0), Op::CallExt(Builtin::PutS), Op::RetVoid(0)],
            globals,
            "",
        );
        assert_eq!(out, "hi");
    }

    #[test]
    fn get_c_eof_is_zero() {
        let (ret, _) =
            run_io(&[Op::Enter(0), Op::CallExt(Builtin::GetC), Op::Ret(0)], Vec::new(), "");
        assert_eq!(ret.unwrap().to_int(), 0);
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = Builtin::ALL.iter().map(|b| b.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Builtin::ALL.len());
    }
}
