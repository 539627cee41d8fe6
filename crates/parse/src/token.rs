//! Mini-C source code tokens.

use mcc_interface::{Ident, Span, Symbol};
use std::fmt;

/// Describes how a sequence of tokens is delimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Delimiter {
    /// `( ... )`
    Parenthesis,
    /// `{ ... }`
    Brace,
    /// `[ ... ]`
    Bracket,
}

impl Delimiter {
    /// Returns the string representation of the opening delimiter.
    pub const fn to_open_str(self) -> &'static str {
        match self {
            Self::Parenthesis => "(",
            Self::Brace => "{",
            Self::Bracket => "[",
        }
    }

    /// Returns the string representation of the closing delimiter.
    pub const fn to_close_str(self) -> &'static str {
        match self {
            Self::Parenthesis => ")",
            Self::Brace => "}",
            Self::Bracket => "]",
        }
    }
}

/// A kind of literal token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenLitKind {
    /// An integer literal.
    Integer,
    /// A floating-point literal.
    Rational,
    /// A character literal. The symbol excludes the quotes.
    Char,
    /// A string literal. The symbol excludes the quotes.
    Str,
}

impl TokenLitKind {
    /// Returns the description of the literal kind.
    pub const fn description(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Rational => "rational",
            Self::Char => "character",
            Self::Str => "string",
        }
    }
}

/// A kind of token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    // Expression-operator symbols.
    /// `=`
    Eq,
    /// `==`
    EqEq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `!`
    Not,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,

    // Structural symbols.
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `;`
    Semi,
    /// An opening delimiter (e.g., `{`).
    OpenDelim(Delimiter),
    /// A closing delimiter (e.g., `}`).
    CloseDelim(Delimiter),

    /// A literal token. The symbol holds the raw text, excluding any quotes.
    Literal(TokenLitKind, Symbol),

    /// Identifier token. Keywords are identifiers too; see
    /// [`Token::is_keyword`].
    Ident(Symbol),

    /// End of file marker.
    Eof,
}

impl TokenKind {
    /// Returns the description of the token kind, for diagnostics.
    pub fn description(&self) -> String {
        match self {
            Self::Eq => "=".into(),
            Self::EqEq => "==".into(),
            Self::Ne => "!=".into(),
            Self::Lt => "<".into(),
            Self::Le => "<=".into(),
            Self::Gt => ">".into(),
            Self::Ge => ">=".into(),
            Self::AndAnd => "&&".into(),
            Self::OrOr => "||".into(),
            Self::Not => "!".into(),
            Self::Plus => "+".into(),
            Self::Minus => "-".into(),
            Self::Star => "*".into(),
            Self::Slash => "/".into(),
            Self::Dot => ".".into(),
            Self::Comma => ",".into(),
            Self::Semi => ";".into(),
            Self::OpenDelim(d) => d.to_open_str().into(),
            Self::CloseDelim(d) => d.to_close_str().into(),
            Self::Literal(kind, _) => format!("<{}>", kind.description()),
            Self::Ident(symbol) => symbol.to_string(),
            Self::Eof => "<eof>".into(),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// A single token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token {
    /// The kind of the token.
    pub kind: TokenKind,
    /// The full span of the token.
    pub span: Span,
}

impl Token {
    /// The [EOF](TokenKind::Eof) token.
    pub const EOF: Self = Self::new(TokenKind::Eof, Span::DUMMY);

    /// A dummy token that will be thrown away later.
    pub const DUMMY: Self = Self::new(TokenKind::Semi, Span::DUMMY);

    /// Creates a new token.
    #[inline]
    pub const fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Returns the identifier if the kind is [`TokenKind::Ident`].
    #[inline]
    pub const fn ident(&self) -> Option<Ident> {
        match self.kind {
            TokenKind::Ident(name) => Some(Ident::new(name, self.span)),
            _ => None,
        }
    }

    /// Returns the literal if the kind is [`TokenKind::Literal`].
    #[inline]
    pub const fn lit(&self) -> Option<(TokenLitKind, Symbol)> {
        match self.kind {
            TokenKind::Literal(kind, symbol) => Some((kind, symbol)),
            _ => None,
        }
    }

    /// Returns `true` if the token is a given keyword, `kw`.
    #[inline]
    pub fn is_keyword(&self, kw: Symbol) -> bool {
        matches!(self.kind, TokenKind::Ident(name) if name == kw)
    }

    /// Returns `true` if the token is an identifier, but not a keyword.
    #[inline]
    pub fn is_non_keyword_ident(&self) -> bool {
        matches!(self.kind, TokenKind::Ident(name) if !name.is_keyword())
    }

    /// Returns `true` if the token is an end-of-file marker.
    #[inline]
    pub const fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    /// Returns `true` if the token is the given open delimiter.
    #[inline]
    pub fn is_open_delim(&self, d: Delimiter) -> bool {
        self.kind == TokenKind::OpenDelim(d)
    }

    /// Returns `true` if the token is the given close delimiter.
    #[inline]
    pub fn is_close_delim(&self, d: Delimiter) -> bool {
        self.kind == TokenKind::CloseDelim(d)
    }
}
