//! Mini-C lexer.

use crate::token::{Token, TokenKind, TokenLitKind};
use mcc_interface::{BytePos, Session, SourceFile, Span, Symbol, diagnostics::DiagCtxt};

mod cursor;
use cursor::{Cursor, RawLiteralKind, RawToken, RawTokenKind};

/// Mini-C lexer.
///
/// Converts a [`Cursor`]'s output from simple [`RawTokenKind`]s into rich
/// [`TokenKind`]s, interning identifier and literal text and validating
/// literals.
pub struct Lexer<'sess, 'src> {
    /// Cursor for getting lexer tokens.
    cursor: Cursor<'src>,
    /// The absolute offset within the source map of the current character.
    pos: BytePos,

    /// The parsing context.
    pub(crate) sess: &'sess Session,
    /// Initial position, read-only.
    start_pos: BytePos,
    /// Source text to tokenize.
    src: &'src str,
}

impl<'sess, 'src> Lexer<'sess, 'src> {
    /// Creates a new `Lexer` for the given source string.
    pub fn new(sess: &'sess Session, src: &'src str) -> Self {
        Self::with_start_pos(sess, src, BytePos(0))
    }

    /// Creates a new `Lexer` for the given source file.
    ///
    /// The source file must have been added to the session's source map.
    pub fn from_source_file(sess: &'sess Session, file: &'src SourceFile) -> Self {
        Self::with_start_pos(sess, &file.src, file.start_pos)
    }

    /// Creates a new `Lexer` for the given source string and starting
    /// position.
    pub fn with_start_pos(sess: &'sess Session, src: &'src str, start_pos: BytePos) -> Self {
        Self { cursor: Cursor::new(src), pos: start_pos, sess, start_pos, src }
    }

    /// Returns a reference to the diagnostic context.
    #[inline]
    pub fn dcx(&self) -> &'sess DiagCtxt {
        &self.sess.dcx
    }

    /// Consumes the lexer and collects the remaining tokens into a vector,
    /// ending with an [`Eof`](TokenKind::Eof) token.
    ///
    /// Lexing stops at the first error; the caller checks the diagnostic
    /// context before parsing.
    #[instrument(name = "lex", level = "debug", skip_all)]
    pub fn into_tokens(mut self) -> Vec<Token> {
        let mut tokens = Vec::with_capacity(self.src.len() / 4 + 1);
        loop {
            let token = self.next_token();
            if self.dcx().has_errors().is_err() {
                tokens.push(Token::new(TokenKind::Eof, token.span));
                break;
            }
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        trace!(src.len = self.src.len(), tokens.len = tokens.len(), "lexed");
        tokens
    }

    /// Returns the next non-comment token, advancing the lexer.
    pub fn next_token(&mut self) -> Token {
        loop {
            let RawToken { kind: raw_kind, len } = self.cursor.advance_token();
            let start = self.pos;
            self.pos += len;

            // Cook the token: intern text, validate literals.
            let kind = match raw_kind {
                RawTokenKind::Whitespace | RawTokenKind::LineComment => continue,
                RawTokenKind::BlockComment { terminated } => {
                    if !terminated {
                        self.dcx()
                            .err("unterminated block comment")
                            .span(self.new_span(start, self.pos))
                            .emit();
                    }
                    continue;
                }

                RawTokenKind::Ident => TokenKind::Ident(self.symbol_from(start)),
                RawTokenKind::Literal { kind } => {
                    let (kind, symbol) = self.cook_literal(start, self.pos, kind);
                    TokenKind::Literal(kind, symbol)
                }

                RawTokenKind::Eq => TokenKind::Eq,
                RawTokenKind::EqEq => TokenKind::EqEq,
                RawTokenKind::Ne => TokenKind::Ne,
                RawTokenKind::Lt => TokenKind::Lt,
                RawTokenKind::Le => TokenKind::Le,
                RawTokenKind::Gt => TokenKind::Gt,
                RawTokenKind::Ge => TokenKind::Ge,
                RawTokenKind::AndAnd => TokenKind::AndAnd,
                RawTokenKind::OrOr => TokenKind::OrOr,
                RawTokenKind::Not => TokenKind::Not,
                RawTokenKind::Plus => TokenKind::Plus,
                RawTokenKind::Minus => TokenKind::Minus,
                RawTokenKind::Star => TokenKind::Star,
                RawTokenKind::Slash => TokenKind::Slash,
                RawTokenKind::Dot => TokenKind::Dot,
                RawTokenKind::Comma => TokenKind::Comma,
                RawTokenKind::Semi => TokenKind::Semi,
                RawTokenKind::OpenDelim(d) => TokenKind::OpenDelim(d),
                RawTokenKind::CloseDelim(d) => TokenKind::CloseDelim(d),

                RawTokenKind::Unknown => {
                    let c = self.str_from(start).chars().next().unwrap_or('\0');
                    let msg = format!("invalid char: {c} ({})", c as u32);
                    self.dcx().err(msg).span(self.new_span(start, self.pos)).emit();
                    continue;
                }

                RawTokenKind::Eof => TokenKind::Eof,
            };
            return Token::new(kind, self.new_span(start, self.pos));
        }
    }

    fn cook_literal(
        &self,
        start: BytePos,
        end: BytePos,
        kind: RawLiteralKind,
    ) -> (TokenLitKind, Symbol) {
        let span = self.new_span(start, end);
        match kind {
            RawLiteralKind::Int => (TokenLitKind::Integer, self.symbol_from_to(start, end)),
            RawLiteralKind::Rational { empty_fraction, empty_exponent } => {
                if empty_fraction {
                    self.dcx().err("Invalid decimal part").span(span).emit();
                } else if empty_exponent {
                    self.dcx().err("Invalid exponent part").span(span).emit();
                }
                (TokenLitKind::Rational, self.symbol_from_to(start, end))
            }
            RawLiteralKind::Char { terminated } => {
                if !terminated {
                    self.dcx().err("unterminated character literal").span(span).emit();
                    return (TokenLitKind::Char, self.symbol_from_to(start, end));
                }
                // Strip the quotes.
                let content = self.str_from_to(start + 1, end - 1);
                match content.chars().count() {
                    0 => {
                        self.dcx().err("empty char").span(span).emit();
                    }
                    1 => {}
                    _ => {
                        self.dcx().err("invalid char literal").span(span).emit();
                    }
                }
                (TokenLitKind::Char, Symbol::intern(content))
            }
            RawLiteralKind::Str { terminated } => {
                if !terminated {
                    self.dcx().err("unterminated string").span(span).emit();
                    return (TokenLitKind::Str, self.symbol_from_to(start, end));
                }
                let content = self.str_from_to(start + 1, end - 1);
                (TokenLitKind::Str, Symbol::intern(content))
            }
        }
    }

    #[inline]
    fn new_span(&self, lo: BytePos, hi: BytePos) -> Span {
        Span::new(lo, hi)
    }

    #[inline]
    fn src_index(&self, pos: BytePos) -> usize {
        (pos - self.start_pos).to_usize()
    }

    /// Interns the source text from `start` up to the current position.
    fn symbol_from(&self, start: BytePos) -> Symbol {
        self.symbol_from_to(start, self.pos)
    }

    /// Slice of the source text from `start` up to the current position.
    fn str_from(&self, start: BytePos) -> &'src str {
        self.str_from_to(start, self.pos)
    }

    fn symbol_from_to(&self, start: BytePos, end: BytePos) -> Symbol {
        Symbol::intern(self.str_from_to(start, end))
    }

    fn str_from_to(&self, start: BytePos, end: BytePos) -> &'src str {
        &self.src[self.src_index(start)..self.src_index(end)]
    }
}

impl Iterator for Lexer<'_, '_> {
    type Item = Token;

    #[inline]
    fn next(&mut self) -> Option<Token> {
        let token = self.next_token();
        if token.is_eof() { None } else { Some(token) }
    }
}

impl std::iter::FusedIterator for Lexer<'_, '_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Delimiter::*;
    use TokenKind::*;
    use std::ops::Range;

    type Expected<'a> = &'a [(Range<u32>, TokenKind)];

    fn check(src: &str, expected: Expected<'_>) {
        let sess = Session::builder().with_silent_emitter().build();
        sess.enter(|| {
            let tokens: Vec<_> = Lexer::new(&sess, src)
                .map(|t| (t.span.lo().to_u32()..t.span.hi().to_u32(), t.kind))
                .collect();
            assert!(sess.dcx.has_errors().is_ok(), "{src:?} should lex cleanly");
            assert_eq!(tokens, expected, "{src:?}");
        });
    }

    fn checks(tests: &[(&str, Expected<'_>)]) {
        for &(src, expected) in tests {
            check(src, expected);
        }
    }

    fn check_fails(src: &str) {
        let sess = Session::builder().with_silent_emitter().build();
        sess.enter(|| {
            let _ = Lexer::new(&sess, src).into_tokens();
            assert!(sess.dcx.has_errors().is_err(), "{src:?} should fail to lex");
        });
    }

    fn lit(kind: TokenLitKind, symbol: &str) -> TokenKind {
        Literal(kind, Symbol::intern(symbol))
    }

    fn id(symbol: &str) -> TokenKind {
        Ident(Symbol::intern(symbol))
    }

    #[test]
    fn empty() {
        checks(&[("", &[]), (" ", &[]), (" \n", &[]), ("\t\n \t ", &[])]);
    }

    #[test]
    fn idents_and_keywords() {
        checks(&[
            ("abc", &[(0..3, id("abc"))]),
            ("_a1 b", &[(0..3, id("_a1")), (4..5, id("b"))]),
            ("int x", &[(0..3, id("int")), (4..5, id("x"))]),
        ]);
        let sess = Session::builder().with_silent_emitter().build();
        sess.enter(|| {
            let tokens: Vec<_> = Lexer::new(&sess, "while whilex").collect();
            assert!(tokens[0].is_keyword(mcc_interface::kw::While));
            assert!(tokens[1].is_non_keyword_ident());
        });
    }

    #[test]
    fn literals() {
        use TokenLitKind::*;
        checks(&[
            ("0", &[(0..1, lit(Integer, "0"))]),
            ("123 4", &[(0..3, lit(Integer, "123")), (4..5, lit(Integer, "4"))]),
            ("1.5", &[(0..3, lit(Rational, "1.5"))]),
            ("1e3", &[(0..3, lit(Rational, "1e3"))]),
            ("1.5e-3", &[(0..6, lit(Rational, "1.5e-3"))]),
            ("'a'", &[(0..3, lit(Char, "a"))]),
            ("\"hi\"", &[(0..4, lit(Str, "hi"))]),
            ("\"\"", &[(0..2, lit(Str, ""))]),
        ]);
    }

    #[test]
    fn malformed_literals() {
        check_fails("1.");
        check_fails("1e+");
        check_fails("''");
        check_fails("'ab'");
        check_fails("\"abc");
    }

    #[test]
    fn operators() {
        checks(&[
            ("==", &[(0..2, EqEq)]),
            ("= =", &[(0..1, Eq), (2..3, Eq)]),
            ("===", &[(0..2, EqEq), (2..3, Eq)]),
            ("!=", &[(0..2, Ne)]),
            ("!", &[(0..1, Not)]),
            ("<=", &[(0..2, Le)]),
            ("<", &[(0..1, Lt)]),
            (">=", &[(0..2, Ge)]),
            (">", &[(0..1, Gt)]),
            ("&&", &[(0..2, AndAnd)]),
            ("||", &[(0..2, OrOr)]),
            ("+-*/", &[(0..1, Plus), (1..2, Minus), (2..3, Star), (3..4, Slash)]),
            (".,;", &[(0..1, Dot), (1..2, Comma), (2..3, Semi)]),
            ("(", &[(0..1, OpenDelim(Parenthesis))]),
            (")", &[(0..1, CloseDelim(Parenthesis))]),
            ("{}", &[(0..1, OpenDelim(Brace)), (1..2, CloseDelim(Brace))]),
            ("[]", &[(0..1, OpenDelim(Bracket)), (1..2, CloseDelim(Bracket))]),
        ]);
    }

    #[test]
    fn invalid_chars() {
        check_fails("&");
        check_fails("|");
        check_fails("#");
    }

    #[test]
    fn comments() {
        checks(&[
            ("// nothing", &[]),
            ("a // trailing\nb", &[(0..1, id("a")), (14..15, id("b"))]),
            ("/* x */ 1", &[(8..9, lit(TokenLitKind::Integer, "1"))]),
            ("/* multi\nline */;", &[(16..17, Semi)]),
        ]);
        check_fails("/* open");
    }

    #[test]
    fn error_stops_lexing() {
        let sess = Session::builder().with_silent_emitter().build();
        sess.enter(|| {
            let tokens = Lexer::new(&sess, "a # b").into_tokens();
            assert!(sess.dcx.has_errors().is_err());
            // `a`, then the error cuts the stream with an EOF.
            assert_eq!(tokens.len(), 2);
            assert!(tokens[1].is_eof());
        });
    }
}
