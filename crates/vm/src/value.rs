use std::fmt;

/// The stack-region bit of an encoded [`Addr`].
const STACK_BIT: u64 = 1 << 63;

/// A single VM value: a 64-bit cell wide enough to carry an int, a double or
/// an address.
///
/// Cells are untagged; the typed opcodes determine how a cell is read. Zero
/// bits read as int `0`, double `0.0` and the first global address, which is
/// why freshly reserved storage can simply be zeroed.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Cell(u64);

impl Cell {
    /// The all-zeroes cell.
    pub const ZERO: Self = Self(0);

    /// Creates a cell from raw bits.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw bits.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Creates a cell holding an int.
    #[inline]
    pub const fn from_int(value: i64) -> Self {
        Self(value as u64)
    }

    /// Reads the cell as an int.
    #[inline]
    pub const fn to_int(self) -> i64 {
        self.0 as i64
    }

    /// Creates a cell holding a double.
    #[inline]
    pub fn from_real(value: f64) -> Self {
        Self(value.to_bits())
    }

    /// Reads the cell as a double.
    #[inline]
    pub fn to_real(self) -> f64 {
        f64::from_bits(self.0)
    }

    /// Creates a cell holding an address.
    #[inline]
    pub fn from_addr(addr: Addr) -> Self {
        match addr {
            Addr::Global(index) => Self(index as u64),
            Addr::Stack(index) => Self(index as u64 | STACK_BIT),
        }
    }

    /// Reads the cell as an address.
    #[inline]
    pub fn to_addr(self) -> Addr {
        if self.0 & STACK_BIT != 0 {
            Addr::Stack((self.0 & !STACK_BIT) as usize)
        } else {
            Addr::Global(self.0 as usize)
        }
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cell({:#x})", self.0)
    }
}

/// A decoded cell address: an index into global memory or into the value
/// stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Addr {
    /// An index into the program's global memory.
    Global(usize),
    /// An index into the VM value stack.
    Stack(usize),
}

impl Addr {
    /// Offsets the address by `n` cells, staying in the same region.
    ///
    /// Wraps on overflow; out-of-range results are caught by the VM's bounds
    /// checks on access.
    #[inline]
    pub fn offset(self, n: i64) -> Self {
        match self {
            Self::Global(index) => Self::Global(index.wrapping_add_signed(n as isize)),
            Self::Stack(index) => Self::Stack(index.wrapping_add_signed(n as isize)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_roundtrip() {
        for v in [0i64, 1, -1, i64::MAX, i64::MIN] {
            assert_eq!(Cell::from_int(v).to_int(), v);
        }
    }

    #[test]
    fn real_roundtrip() {
        for v in [0.0f64, 2.5, -1e300, f64::INFINITY] {
            assert_eq!(Cell::from_real(v).to_real(), v);
        }
        assert!(Cell::from_real(f64::NAN).to_real().is_nan());
    }

    #[test]
    fn addr_roundtrip() {
        for a in [Addr::Global(0), Addr::Global(1234), Addr::Stack(0), Addr::Stack(99)] {
            assert_eq!(Cell::from_addr(a).to_addr(), a);
        }
    }

    #[test]
    fn addr_offset() {
        assert_eq!(Addr::Global(10).offset(3), Addr::Global(13));
        assert_eq!(Addr::Stack(10).offset(-2), Addr::Stack(8));
    }

    #[test]
    fn zero_cell_reads_as_zero() {
        assert_eq!(Cell::ZERO.to_int(), 0);
        assert_eq!(Cell::ZERO.to_real(), 0.0);
        assert_eq!(Cell::ZERO.to_addr(), Addr::Global(0));
    }
}
