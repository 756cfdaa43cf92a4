//! Dice formulas: parsing, precedence-correct evaluation, dice modifiers and
//! externally fulfilled rolls.
//!
//! ```no_run
//! use dice_formula::{EvaluateOptions, Roll, RollContext};
//!
//! let mut ctx: RollContext = RollContext::default();
//! let mut roll = Roll::new("4d6kh3 + 2").unwrap();
//! let options = EvaluateOptions { strict: false, ..Default::default() };
//! let total = roll.evaluate_sync(&mut ctx, options).unwrap();
//! println!("{} = {}", roll.formula(), total);
//! ```

pub mod common;
pub mod config;
pub mod error;
pub mod fulfillment;
pub mod parse;
pub mod roll;

pub use config::{DiceConfig, FulfillmentConfig, MethodConfig};
pub use error::{EvaluationError, FormulaSyntaxError, RResult, RollError, SyntaxErrorKind};
pub use fulfillment::{FulfillmentCoordinator, FulfillmentMismatchError, FulfillmentRequest, FulfillmentState};
pub use roll::{
    BreakdownStringifier, DefaultRoller, EvaluateOptions, Number, Roll, RollContext, Roller, SimpleStringifier,
    StepRoller, Stringify,
};

/// Parses and evaluates `formula` with the thread-local RNG, rolling any
/// externally configured dice internally.
pub fn roll(formula: &str) -> RResult<Roll> {
    let mut roll = Roll::new(formula)?;
    let options = EvaluateOptions {
        allow_interactive: false,
        strict: false,
        ..Default::default()
    };
    let mut ctx: RollContext = RollContext::default();
    roll.evaluate_sync(&mut ctx, options)?;
    Ok(roll)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roll() {
        let roll = roll("3d6 + 1").unwrap();
        let total = roll.total().unwrap().as_int();
        assert!((4..=19).contains(&total));
        assert_eq!(roll.dice()[0].values().sum::<i64>() + 1, total);
        assert!(crate::roll("1d6 +").is_err());
    }
}
