//! The Mini-C type model and conversion rules.

use crate::scope::SymbolId;
use std::fmt;

/// The base of a type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TyBase {
    Int,
    Double,
    Char,
    Void,
    Struct,
}

/// The declared length of an array type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArrayLen {
    /// `T x[]`: compatible with any length. Only parameters and string
    /// literals carry this.
    Unspecified,
    /// `T x[n]`
    Fixed(u32),
}

/// A Mini-C type: a base, a struct symbol when the base is
/// [`Struct`](TyBase::Struct), and an optional array qualifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ty {
    pub base: TyBase,
    pub strukt: Option<SymbolId>,
    pub array: Option<ArrayLen>,
}

impl Ty {
    pub const INT: Self = Self::scalar(TyBase::Int);
    pub const DOUBLE: Self = Self::scalar(TyBase::Double);
    pub const CHAR: Self = Self::scalar(TyBase::Char);
    pub const VOID: Self = Self::scalar(TyBase::Void);

    /// Creates a scalar (non-array, non-struct) type.
    pub const fn scalar(base: TyBase) -> Self {
        Self { base, strukt: None, array: None }
    }

    /// Creates the type of the given struct symbol.
    pub const fn strukt(symbol: SymbolId) -> Self {
        Self { base: TyBase::Struct, strukt: Some(symbol), array: None }
    }

    /// Returns `true` if this is an array type.
    #[inline]
    pub const fn is_array(&self) -> bool {
        self.array.is_some()
    }

    /// Returns `true` if an expression of this type is a scalar value:
    /// not an array, and neither `struct` nor `void`.
    #[inline]
    pub const fn can_be_scalar(&self) -> bool {
        !self.is_array() && !matches!(self.base, TyBase::Struct | TyBase::Void)
    }

    /// Returns `true` if the base is `double`.
    #[inline]
    pub const fn is_real(&self) -> bool {
        matches!(self.base, TyBase::Double)
    }

    /// Returns the element type of an array type.
    #[inline]
    pub const fn elem(&self) -> Self {
        Self { base: self.base, strukt: self.strukt, array: None }
    }

    /// Returns `true` if a value of this type converts to `dst`:
    /// - arrays convert only to arrays of the same base (and struct) with a
    ///   compatible length; an unspecified length is compatible with any,
    /// - structs are not convertible,
    /// - scalars among `int`, `double` and `char` are mutually convertible,
    /// - `void` converts to nothing.
    pub fn conv_to(&self, dst: &Self) -> bool {
        match (self.array, dst.array) {
            (Some(a), Some(b)) => {
                self.base == dst.base
                    && self.strukt == dst.strukt
                    && match (a, b) {
                        (ArrayLen::Unspecified, _) | (_, ArrayLen::Unspecified) => true,
                        (ArrayLen::Fixed(n), ArrayLen::Fixed(m)) => n == m,
                    }
            }
            (Some(_), None) | (None, Some(_)) => false,
            (None, None) => {
                matches!(self.base, TyBase::Int | TyBase::Double | TyBase::Char)
                    && matches!(dst.base, TyBase::Int | TyBase::Double | TyBase::Char)
            }
        }
    }

    /// Computes the result type of an arithmetic operation between `a` and
    /// `b`: both must be scalars, and the widest base wins
    /// (`double` > `int` > `char`).
    pub fn arith(a: &Self, b: &Self) -> Option<Self> {
        if !a.can_be_scalar() || !b.can_be_scalar() {
            return None;
        }
        let base = match (a.base, b.base) {
            (TyBase::Double, _) | (_, TyBase::Double) => TyBase::Double,
            (TyBase::Int, _) | (_, TyBase::Int) => TyBase::Int,
            _ => TyBase::Char,
        };
        Some(Self::scalar(base))
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.base {
            TyBase::Int => f.write_str("int")?,
            TyBase::Double => f.write_str("double")?,
            TyBase::Char => f.write_str("char")?,
            TyBase::Void => f.write_str("void")?,
            TyBase::Struct => f.write_str("struct")?,
        }
        match self.array {
            Some(ArrayLen::Unspecified) => f.write_str("[]"),
            Some(ArrayLen::Fixed(n)) => write!(f, "[{n}]"),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(base: TyBase, len: ArrayLen) -> Ty {
        Ty { base, strukt: None, array: Some(len) }
    }

    #[test]
    fn scalar_conversions() {
        assert!(Ty::INT.conv_to(&Ty::DOUBLE));
        assert!(Ty::DOUBLE.conv_to(&Ty::CHAR));
        assert!(Ty::CHAR.conv_to(&Ty::INT));
        assert!(!Ty::VOID.conv_to(&Ty::INT));
        assert!(!Ty::INT.conv_to(&Ty::VOID));
    }

    #[test]
    fn array_conversions() {
        let a3 = array(TyBase::Int, ArrayLen::Fixed(3));
        let a5 = array(TyBase::Int, ArrayLen::Fixed(5));
        let any = array(TyBase::Int, ArrayLen::Unspecified);
        let d3 = array(TyBase::Double, ArrayLen::Fixed(3));
        assert!(a3.conv_to(&a3));
        assert!(a3.conv_to(&any));
        assert!(any.conv_to(&a5));
        assert!(!a3.conv_to(&a5));
        assert!(!a3.conv_to(&d3));
        assert!(!a3.conv_to(&Ty::INT));
        assert!(!Ty::INT.conv_to(&a3));
    }

    #[test]
    fn structs_do_not_convert() {
        let s = Ty::strukt(SymbolId::from_usize(0));
        assert!(!s.conv_to(&s));
        assert!(!s.conv_to(&Ty::INT));
    }

    #[test]
    fn widening() {
        assert_eq!(Ty::arith(&Ty::INT, &Ty::DOUBLE), Some(Ty::DOUBLE));
        assert_eq!(Ty::arith(&Ty::CHAR, &Ty::INT), Some(Ty::INT));
        assert_eq!(Ty::arith(&Ty::CHAR, &Ty::CHAR), Some(Ty::CHAR));
        assert_eq!(Ty::arith(&Ty::INT, &Ty::VOID), None);
        let arr = array(TyBase::Int, ArrayLen::Fixed(3));
        assert_eq!(Ty::arith(&arr, &Ty::INT), None);
    }
}
