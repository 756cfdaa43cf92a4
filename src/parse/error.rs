use std::fmt;
use std::ops::Range;

/// A malformed formula. Raised by the parser and by the AST builder alike.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("cannot parse formula {formula:?} (at position {}, {fragment:?}): {kind}", .span.start)]
pub struct FormulaSyntaxError {
    pub formula: String,
    pub fragment: String,
    pub span: Range<usize>,
    pub kind: SyntaxErrorKind,
}

impl FormulaSyntaxError {
    pub fn new(formula: &str, span: Range<usize>, kind: SyntaxErrorKind) -> Self {
        let fragment = formula.get(span.clone()).unwrap_or_default().to_string();
        Self {
            formula: formula.to_string(),
            fragment,
            span,
            kind,
        }
    }

    /// An error pointing at a fragment whose position is unknown.
    pub fn at_fragment(formula: &str, fragment: &str, kind: SyntaxErrorKind) -> Self {
        let start = formula.find(fragment).unwrap_or(formula.len());
        Self {
            formula: formula.to_string(),
            fragment: fragment.to_string(),
            span: start..start + fragment.len(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxErrorKind {
    UnexpectedToken { found: String, expected: Vec<String> },
    UnexpectedEnd { expected: Vec<String> },
    UnrecognizedInput,
    EmptyFlavor,
    InvalidModifier(String),
    InvalidDice(String),
    UnbalancedParenthesis,
    MissingOperand,
    MissingOperator,
    EmptyPool,
}

impl fmt::Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedToken { found, expected } => {
                write!(f, "unexpected token: found {}, expected ", found)?;
                fmt_expected(expected, f)
            }
            Self::UnexpectedEnd { expected } => {
                write!(f, "unexpected end of formula, expected ")?;
                fmt_expected(expected, f)
            }
            Self::UnrecognizedInput => write!(f, "unrecognized input"),
            Self::EmptyFlavor => write!(f, "flavor text cannot be empty"),
            Self::InvalidModifier(m) => write!(f, "invalid modifier {:?}", m),
            Self::InvalidDice(why) => write!(f, "invalid dice term: {}", why),
            Self::UnbalancedParenthesis => write!(f, "unbalanced parenthesis"),
            Self::MissingOperand => write!(f, "operator is missing an operand"),
            Self::MissingOperator => write!(f, "two terms are not joined by an operator"),
            Self::EmptyPool => write!(f, "dice pools need at least one term"),
        }
    }
}

fn fmt_expected(expected: &[String], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match expected {
        [] => f.write_str("nothing"),
        [a] => f.write_str(a),
        [a, b] => write!(f, "{} or {}", a, b),
        [rest @ .., last] => write!(f, "{}, or {}", rest.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message() {
        let err = FormulaSyntaxError::new(
            "2d6 + $",
            6..7,
            SyntaxErrorKind::UnexpectedToken {
                found: "'$'".into(),
                expected: vec!["<number>".into(), "<dice>".into(), "'('".into()],
            },
        );
        assert_eq!(err.fragment, "$");
        assert_eq!(
            err.to_string(),
            "cannot parse formula \"2d6 + $\" (at position 6, \"$\"): unexpected token: found '$', expected <number>, <dice>, or '('"
        );
    }

    #[test]
    fn test_at_fragment() {
        let err = FormulaSyntaxError::at_fragment("4d6kq", "kq", SyntaxErrorKind::InvalidModifier("kq".into()));
        assert_eq!(err.span, 3..5);
    }
}
