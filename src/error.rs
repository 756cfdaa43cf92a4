pub use crate::parse::{FormulaSyntaxError, SyntaxErrorKind};

pub type RResult<T> = Result<T, RollError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RollError {
    #[error("{0}")]
    Syntax(#[from] FormulaSyntaxError),
    #[error("{0}")]
    Evaluation(#[from] EvaluationError),
    #[error("this roll has already been evaluated and is now immutable")]
    AlreadyEvaluated,
    #[error("{term:?} cannot be evaluated synchronously; evaluate it asynchronously or pass minimize or maximize")]
    SynchronousEvaluation { term: String },
    #[error("too many dice rolled")]
    TooManyRolls,
    #[error("invalid roll data: {0}")]
    InvalidData(String),
}

impl RollError {
    pub fn invalid_data(msg: impl ToString) -> Self {
        Self::InvalidData(msg.to_string())
    }

    pub fn synchronous(term: impl ToString) -> Self {
        Self::SynchronousEvaluation {
            term: term.to_string(),
        }
    }
}

impl From<serde_json::Error> for RollError {
    fn from(e: serde_json::Error) -> Self {
        Self::invalid_data(e)
    }
}

/// A term that could not be turned into a number.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("unresolved term {0:?} in roll formula")]
    UnresolvedString(String),
    #[error("cannot divide by zero")]
    DivisionByZero,
    #[error("unknown roll function {0:?}")]
    UnknownFunction(String),
    #[error("invalid arguments to {function}: {reason}")]
    InvalidArguments { function: String, reason: String },
    #[error("dice pool results must be whole numbers")]
    NonIntegerPoolResult,
    #[error("term {0:?} has not been evaluated")]
    Unevaluated(String),
    #[error("the roll was abandoned before all of its dice were fulfilled")]
    Cancelled,
}

impl EvaluationError {
    pub fn invalid_arguments(function: &str, reason: impl ToString) -> Self {
        Self::InvalidArguments {
            function: function.to_string(),
            reason: reason.to_string(),
        }
    }
}
