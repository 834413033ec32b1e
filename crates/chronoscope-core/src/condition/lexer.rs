//! Tokenizer for condition expressions.
//!
//! Numbers are decimal with an optional fraction and exponent. A leading
//! dot (`.5`) starts a number when a digit follows it; a trailing dot
//! (`5.`) is not part of the number.

use crate::error::EvaluationError;

/// Token kinds produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Numeric literal.
    Number(f64),
    /// Quoted string literal (quotes stripped).
    Str(String),
    /// Identifier or keyword.
    Ident(String),
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `!`
    Bang,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNotEq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// End of input.
    Eof,
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// What was read.
    pub kind: TokenKind,
    /// Byte offset in the source expression.
    pub offset: usize,
}

/// Split an expression into tokens, terminated by [`TokenKind::Eof`].
///
/// # Errors
///
/// Returns [`EvaluationError::Syntax`] for unterminated strings, malformed
/// numbers, a lone `=`, `&` or `|`, or any character the grammar does not
/// use.
pub fn tokenize(source: &str) -> Result<Vec<Token>, EvaluationError> {
    Lexer {
        src: source.as_bytes(),
        source,
        pos: 0,
    }
    .run()
}

struct Lexer<'a> {
    src: &'a [u8],
    source: &'a str,
    pos: usize,
}

impl Lexer<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos.saturating_add(ahead)).copied()
    }

    fn bump(&mut self, n: usize) {
        self.pos = self.pos.saturating_add(n);
    }

    fn slice(&self, start: usize, end: usize) -> &str {
        self.source.get(start..end).unwrap_or_default()
    }

    fn run(mut self) -> Result<Vec<Token>, EvaluationError> {
        let mut tokens = Vec::new();
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.bump(1);
                continue;
            }
            let offset = self.pos;
            let kind = match b {
                b'0'..=b'9' => self.number()?,
                b'.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number()?,
                b'\'' | b'"' => self.string(b)?,
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.ident(),
                _ => self.operator(b)?,
            };
            tokens.push(Token { kind, offset });
        }
        tokens.push(Token {
            kind: TokenKind::Eof,
            offset: self.pos,
        });
        Ok(tokens)
    }

    fn digits(&mut self) -> usize {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump(1);
        }
        self.pos.saturating_sub(start)
    }

    fn number(&mut self) -> Result<TokenKind, EvaluationError> {
        let start = self.pos;
        self.digits();
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump(1);
            self.digits();
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.bump(1);
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.bump(1);
            }
            if self.digits() == 0 {
                return Err(EvaluationError::syntax(start, "malformed exponent"));
            }
        }
        if self
            .peek()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == b'_')
        {
            return Err(EvaluationError::syntax(
                self.pos,
                "identifier cannot start with a digit",
            ));
        }
        let text = self.slice(start, self.pos);
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|e| EvaluationError::syntax(start, format!("invalid number `{text}`: {e}")))
    }

    fn string(&mut self, quote: u8) -> Result<TokenKind, EvaluationError> {
        let start = self.pos;
        self.bump(1);
        let body_start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let body = self.slice(body_start, self.pos).to_owned();
                self.bump(1);
                return Ok(TokenKind::Str(body));
            }
            self.bump(1);
        }
        Err(EvaluationError::syntax(start, "unterminated string literal"))
    }

    fn ident(&mut self) -> TokenKind {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
        {
            self.bump(1);
        }
        TokenKind::Ident(self.slice(start, self.pos).to_owned())
    }

    fn operator(&mut self, b: u8) -> Result<TokenKind, EvaluationError> {
        let offset = self.pos;
        let next = self.peek_at(1);
        let third = self.peek_at(2);
        let (kind, width) = match (b, next, third) {
            (b'=', Some(b'='), Some(b'=')) => (TokenKind::StrictEq, 3),
            (b'=', Some(b'='), _) => (TokenKind::EqEq, 2),
            (b'!', Some(b'='), Some(b'=')) => (TokenKind::StrictNotEq, 3),
            (b'!', Some(b'='), _) => (TokenKind::NotEq, 2),
            (b'!', _, _) => (TokenKind::Bang, 1),
            (b'<', Some(b'='), _) => (TokenKind::Le, 2),
            (b'<', _, _) => (TokenKind::Lt, 1),
            (b'>', Some(b'='), _) => (TokenKind::Ge, 2),
            (b'>', _, _) => (TokenKind::Gt, 1),
            (b'&', Some(b'&'), _) => (TokenKind::AndAnd, 2),
            (b'|', Some(b'|'), _) => (TokenKind::OrOr, 2),
            (b'.', _, _) => (TokenKind::Dot, 1),
            (b',', _, _) => (TokenKind::Comma, 1),
            (b'(', _, _) => (TokenKind::LParen, 1),
            (b')', _, _) => (TokenKind::RParen, 1),
            (b'+', _, _) => (TokenKind::Plus, 1),
            (b'-', _, _) => (TokenKind::Minus, 1),
            (b'*', _, _) => (TokenKind::Star, 1),
            (b'/', _, _) => (TokenKind::Slash, 1),
            (b'%', _, _) => (TokenKind::Percent, 1),
            (b'=', _, _) => {
                return Err(EvaluationError::syntax(offset, "assignment is not supported"));
            }
            (b'&' | b'|', _, _) => {
                return Err(EvaluationError::syntax(
                    offset,
                    "bitwise operators are not supported",
                ));
            }
            _ => {
                return Err(EvaluationError::syntax(
                    offset,
                    format!("unexpected character {:?}", char::from(b)),
                ));
            }
        };
        self.bump(width);
        Ok(kind)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_comparison_chain() {
        assert_eq!(
            kinds("t >= 2 && avg('a.b') !== 0.5"),
            vec![
                TokenKind::Ident("t".into()),
                TokenKind::Ge,
                TokenKind::Number(2.0),
                TokenKind::AndAnd,
                TokenKind::Ident("avg".into()),
                TokenKind::LParen,
                TokenKind::Str("a.b".into()),
                TokenKind::RParen,
                TokenKind::StrictNotEq,
                TokenKind::Number(0.5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers_with_exponent_and_member_dot() {
        assert_eq!(
            kinds("1e3 2.5E-1 3.x"),
            vec![
                TokenKind::Number(1000.0),
                TokenKind::Number(0.25),
                TokenKind::Number(3.0),
                TokenKind::Dot,
                TokenKind::Ident("x".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn offsets_point_at_token_start() {
        let tokens = tokenize("  state . x").unwrap();
        let offsets: Vec<usize> = tokens.iter().map(|t| t.offset).collect();
        assert_eq!(offsets, vec![2, 8, 10, 11]);
    }

    #[test]
    fn rejects_malformed_input() {
        for src in ["'open", "t = 3", "a & b", "a | b", "1e", "2abc"] {
            let err = tokenize(src).unwrap_err();
            assert!(matches!(err, EvaluationError::Syntax { .. }), "{src}");
        }
    }

    #[test]
    fn leading_dot_starts_a_number() {
        assert_eq!(
            kinds(".5 < t"),
            vec![
                TokenKind::Number(0.5),
                TokenKind::Lt,
                TokenKind::Ident("t".into()),
                TokenKind::Eof
            ]
        );
        assert_eq!(
            kinds("state.a"),
            vec![
                TokenKind::Ident("state".into()),
                TokenKind::Dot,
                TokenKind::Ident("a".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn both_quote_styles() {
        assert_eq!(
            kinds("\"FR\" 'DE'"),
            vec![
                TokenKind::Str("FR".into()),
                TokenKind::Str("DE".into()),
                TokenKind::Eof
            ]
        );
    }
}
