use crate::common::Operator;
use logos::{Lexer as LogosLexer, Logos};
use logos_iter::{LogosIter, PeekableLexer};
use std::fmt;

pub type Lexer<'a> = PeekableLexer<'a, LogosLexer<'a, TokenKind>, TokenKind>;

pub fn lexer(s: &str) -> Lexer {
    TokenKind::lexer(s).peekable_lexer()
}

#[derive(Logos, Debug, Copy, Clone, PartialEq)]
pub enum TokenKind {
    #[regex(r"([0-9]+(\.[0-9]*)?)|(\.[0-9]+)")]
    Number,

    /// `NdF` with an optional modifier suffix, e.g. `4d6kh3` or `dF`.
    #[regex(r"[0-9]*[dD]([0-9]+|[cCfF])([a-zA-Z]+(<=|>=|<|>|=)?[0-9]*)*", priority = 3)]
    Dice,
    /// `2d` waiting for a parenthesized face count.
    #[regex(r"[0-9]+[dD]")]
    DicePrefix,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
    /// A data reference the substitution step could not resolve.
    #[regex(r"@[a-zA-Z0-9_.\-]+")]
    DataRef,

    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    /// `}` together with any pool modifiers, e.g. `}kh1`.
    #[regex(r"\}([a-zA-Z]+(<=|>=|<|>|=)?[0-9]*)*")]
    RightBrace,
    #[token(",")]
    Comma,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[regex(r"\[[^\]]+\]")]
    Flavor,

    #[token("[]")]
    ErrEmptyFlavor,

    #[regex(r"[ \t\r\n]+", logos::skip)]
    #[error]
    Error,
}

impl TokenKind {
    pub const ADDITION_OPS: &'static [Self] = &[Self::Plus, Self::Minus];

    pub const MULTIPLICATION_OPS: &'static [Self] = &[Self::Star, Self::Slash, Self::Percent];

    pub const ATOMS: &'static [Self] = &[
        Self::Number,
        Self::Dice,
        Self::Ident,
        Self::LeftParen,
        Self::LeftBrace,
    ];

    pub fn as_str(&self) -> &'static str {
        use TokenKind::*;

        match self {
            Number => "<number>",
            Dice => "<dice>",
            DicePrefix => "<dice prefix>",
            Ident => "<identifier>",
            DataRef => "<data reference>",
            LeftParen => "'('",
            RightParen => "')'",
            LeftBrace => "'{'",
            RightBrace => "'}'",
            Comma => "','",
            Plus => "'+'",
            Minus => "'-'",
            Star => "'*'",
            Slash => "'/'",
            Percent => "'%'",
            Flavor => "<flavor>",
            ErrEmptyFlavor | Error => "<error>",
        }
    }

    pub fn as_operator(&self) -> Option<Operator> {
        Some(match self {
            Self::Plus => Operator::Add,
            Self::Minus => Operator::Sub,
            Self::Star => Operator::Mul,
            Self::Slash => Operator::Div,
            Self::Percent => Operator::Rem,
            _ => return None,
        })
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(s: &str) -> Vec<(TokenKind, &str)> {
        let mut lex = TokenKind::lexer(s);
        let mut ret = Vec::new();
        while let Some(kind) = lex.next() {
            ret.push((kind, lex.slice()));
        }
        ret
    }

    #[test]
    fn test_dice_tokens() {
        use TokenKind::*;
        assert_eq!(kinds("4d6kh3"), vec![(Dice, "4d6kh3")]);
        assert_eq!(kinds("d20"), vec![(Dice, "d20")]);
        assert_eq!(kinds("2dF"), vec![(Dice, "2dF")]);
        assert_eq!(kinds("1d20cs>=15"), vec![(Dice, "1d20cs>=15")]);
        assert_eq!(kinds("2d(3)"), vec![(DicePrefix, "2d"), (LeftParen, "("), (Number, "3"), (RightParen, ")")]);
    }

    #[test]
    fn test_other_tokens() {
        use TokenKind::*;
        assert_eq!(
            kinds("floor(1.5) + {2, 3}kh1[best] - @missing"),
            vec![
                (Ident, "floor"),
                (LeftParen, "("),
                (Number, "1.5"),
                (RightParen, ")"),
                (Plus, "+"),
                (LeftBrace, "{"),
                (Number, "2"),
                (Comma, ","),
                (Number, "3"),
                (RightBrace, "}kh1"),
                (Flavor, "[best]"),
                (Minus, "-"),
                (DataRef, "@missing"),
            ]
        );
        assert_eq!(kinds("[]"), vec![(ErrEmptyFlavor, "[]")]);
        assert_eq!(kinds("$"), vec![(Error, "$")]);
    }
}
