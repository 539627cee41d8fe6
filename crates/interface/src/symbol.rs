use crate::{SessionGlobals, Span};
use rustc_hash::FxHashMap;
use std::{cmp, fmt, hash, sync::Mutex};

/// An identifier: an interned name paired with its source location.
#[derive(Clone, Copy)]
pub struct Ident {
    /// The identifier's name.
    pub name: Symbol,
    /// The identifier's span.
    pub span: Span,
}

impl PartialEq for Ident {
    #[inline]
    fn eq(&self, rhs: &Self) -> bool {
        self.name == rhs.name
    }
}

impl Eq for Ident {}

impl hash::Hash for Ident {
    #[inline]
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name.fmt(f)
    }
}

impl Ident {
    /// Constructs a new identifier from a symbol and a span.
    #[inline]
    pub const fn new(name: Symbol, span: Span) -> Self {
        Self { name, span }
    }

    /// Maps a string to an identifier with a dummy span.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(string: &str) -> Self {
        Self::new(Symbol::intern(string), Span::DUMMY)
    }

    /// Access the underlying string.
    pub fn as_str(&self) -> &'static str {
        self.name.as_str()
    }

    /// Returns `true` if the identifier is a keyword of the language.
    #[inline]
    pub fn is_keyword(self) -> bool {
        self.name.is_keyword()
    }
}

/// An interned string.
///
/// Internally just an index; all operations (hashing, equality, ordering)
/// operate on that index.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u32);

impl Symbol {
    const fn new(n: u32) -> Self {
        Self(n)
    }

    /// Maps a string to its interned representation.
    pub fn intern(string: &str) -> Self {
        SessionGlobals::with(|g| g.symbol_interner.intern(string))
    }

    /// Access the underlying string.
    ///
    /// The interner leaks its strings, so the returned reference is valid for
    /// the rest of the process.
    pub fn as_str(&self) -> &'static str {
        SessionGlobals::with(|g| g.symbol_interner.get(*self))
    }

    /// Returns the internal index.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns `true` if the symbol is a keyword of the language.
    #[inline]
    pub fn is_keyword(self) -> bool {
        self.0 < kw::KEYWORD_COUNT
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialOrd for Ident {
    #[inline]
    fn partial_cmp(&self, rhs: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(rhs))
    }
}

impl Ord for Ident {
    #[inline]
    fn cmp(&self, rhs: &Self) -> cmp::Ordering {
        self.name.cmp(&rhs.name)
    }
}

/// The keywords of the language, pre-interned at fixed indices.
///
/// The order here must match [`PREDEFINED`].
#[allow(non_upper_case_globals)]
pub mod kw {
    use super::Symbol;

    pub const Char: Symbol = Symbol::new(0);
    pub const Double: Symbol = Symbol::new(1);
    pub const Else: Symbol = Symbol::new(2);
    pub const If: Symbol = Symbol::new(3);
    pub const Int: Symbol = Symbol::new(4);
    pub const Return: Symbol = Symbol::new(5);
    pub const Struct: Symbol = Symbol::new(6);
    pub const Void: Symbol = Symbol::new(7);
    pub const While: Symbol = Symbol::new(8);

    pub(super) const KEYWORD_COUNT: u32 = 9;
}

/// Strings pre-interned by [`Interner::fresh`], keywords first.
const PREDEFINED: &[&str] =
    &["char", "double", "else", "if", "int", "return", "struct", "void", "while"];

pub(crate) struct Interner {
    inner: Mutex<InternerInner>,
}

struct InternerInner {
    strings: Vec<&'static str>,
    names: FxHashMap<&'static str, Symbol>,
}

impl Interner {
    /// Creates a fresh interner with all predefined symbols installed.
    pub(crate) fn fresh() -> Self {
        let strings = PREDEFINED.to_vec();
        let names = strings.iter().enumerate().map(|(i, &s)| (s, Symbol::new(i as u32))).collect();
        Self { inner: Mutex::new(InternerInner { strings, names }) }
    }

    fn intern(&self, string: &str) -> Symbol {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&name) = inner.names.get(string) {
            return name;
        }

        let name = Symbol::new(inner.strings.len() as u32);
        // Interned strings live for the rest of the process; the whole
        // compile-time arena is reclaimed at exit.
        let string: &'static str = Box::leak(string.into());
        inner.strings.push(string);
        inner.names.insert(string, name);
        name
    }

    fn get(&self, symbol: Symbol) -> &'static str {
        self.inner.lock().unwrap().strings[symbol.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_preinterned() {
        SessionGlobals::new().set(|| {
            assert_eq!(Symbol::intern("char"), kw::Char);
            assert_eq!(Symbol::intern("while"), kw::While);
            assert_eq!(kw::Struct.as_str(), "struct");
            assert!(kw::If.is_keyword());
            assert_eq!(PREDEFINED.len() as u32, kw::KEYWORD_COUNT);
        });
    }

    #[test]
    fn interning_is_stable() {
        SessionGlobals::new().set(|| {
            let a = Symbol::intern("main");
            let b = Symbol::intern("main");
            assert_eq!(a, b);
            assert_eq!(a.as_str(), "main");
            assert!(!a.is_keyword());
            assert_ne!(a, Symbol::intern("niam"));
        });
    }
}
