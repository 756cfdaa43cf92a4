use super::functions::{FunctionRegistry, FunctionResult};
use super::num::Number;
use super::roller::Roller;
use crate::common::*;
use crate::config::DiceConfig;
use crate::error::{RResult, RollError};

pub type DefaultRoller = rand::prelude::ThreadRng;

/// Everything an evaluation draws on: the random source, the roll budget,
/// fulfillment configuration and the functions formulas may call.
#[derive(Debug)]
pub struct RollContext<R = DefaultRoller> {
    config: DiceConfig,
    rolls: usize,
    roller: R,
    functions: FunctionRegistry,
}

impl<R: Roller> RollContext<R> {
    pub fn new(config: DiceConfig, roller: R) -> Self {
        Self {
            config,
            rolls: 0,
            roller,
            functions: FunctionRegistry::default(),
        }
    }

    pub fn with_roller(roller: R) -> Self {
        Self::new(DiceConfig::default(), roller)
    }

    pub fn new_bounded(max_rolls: usize, roller: R) -> Self {
        Self::new(
            DiceConfig {
                max_rolls: Some(max_rolls),
                ..Default::default()
            },
            roller,
        )
    }

    pub fn new_unbounded(roller: R) -> Self {
        Self::new(
            DiceConfig {
                max_rolls: None,
                ..Default::default()
            },
            roller,
        )
    }

    pub fn config(&self) -> &DiceConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut DiceConfig {
        &mut self.config
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn register_function<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Number]) -> FunctionResult + 'static,
    {
        self.functions.register(name, f);
    }

    /// Dice drawn since the current evaluation began.
    pub fn rolls(&self) -> usize {
        self.rolls
    }

    pub(crate) fn reset_rolls(&mut self) {
        self.rolls = 0;
    }

    pub(crate) fn count_rolls(&mut self, n: usize) -> RResult<()> {
        self.rolls += n;
        if self.config.max_rolls.map_or(false, |max| self.rolls > max) {
            Err(RollError::TooManyRolls)
        } else {
            Ok(())
        }
    }

    /// Draws one value from the internal random source.
    pub(crate) fn roll_one(&mut self, denomination: Denomination) -> Int {
        let face = self.roller.roll(denomination.faces());
        log::trace!("{} -> face {}", denomination, face);
        denomination.map_face(face)
    }
}

impl Default for RollContext {
    fn default() -> Self {
        Self::with_roller(rand::thread_rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roll::roller::StepRoller;
    use crate::roll::{EvaluateOptions, Roll};
    use futures_util::FutureExt;

    fn mock_roller() -> StepRoller {
        StepRoller::new(10, 1)
    }

    fn eval(roll: &mut Roll, ctx: &mut RollContext<StepRoller>) -> RResult<Number> {
        roll.evaluate(ctx, EvaluateOptions::default())
            .now_or_never()
            .expect("internal rolls never suspend")
    }

    fn check(s: &str, expected: impl Into<Number>) {
        let mut ctx = RollContext::new_bounded(1000, mock_roller());
        let mut roll = Roll::new(s).unwrap();
        let actual = eval(&mut roll, &mut ctx).unwrap();
        assert_eq!(expected.into(), actual);
    }

    fn check_err(s: &str, expected: RollError) {
        let mut ctx = RollContext::new_bounded(1000, mock_roller());
        let mut roll = Roll::new(s).unwrap();
        let actual = eval(&mut roll, &mut ctx);
        assert_eq!(expected, actual.unwrap_err());
    }

    #[test]
    fn test_eval_number() {
        check("2", 2);
        check("2.0", 2.0);
        check("2.5", 2.5);
    }

    #[test]
    fn test_eval_unary() {
        check("-2", -2);
        check("--2", 2);
        check("---2", -2);
        check("2 * -3", -6);
        check("-1d20 + 4", -10 + 4);
    }

    #[test]
    fn test_eval_binary() {
        check("2 + 3", 5);
        check("2 + 3 * 4", 14);
        check("3.5 % 2", 1.5);
        check("2 * (1 - 3)", -4);
        check("10 - 4 - 3", 3);
        check("7 / 2", 3.5);
    }

    #[test]
    fn test_eval_dice() {
        check("1d20 + 4", 10 + 4);
        check("2d4", 2 + 3);
        check("8d6", 4 + 5 + 6 + 1 + 2 + 3 + 4 + 5);
    }

    #[test]
    fn test_eval_pool() {
        check("{1, 2, 3}", 6);
        check("{2d4, 1d8}", 2 + 3 + 4);
        check("{2d4kl1, 1d8rr<5}kh1", 5);
    }

    #[test]
    fn test_eval_op_dice() {
        check("2d20kh1", 11);
        check("8d6rr1", 4 + 5 + 6 + 2 + 3 + 4 + 5 + 6);
        check("8d6x6", 4 + 5 + 6 + 1 + 2 + 3 + 4 + 5 + 6 + 1);
        check("8d6min3", 4 + 5 + 6 + 3 + 3 + 3 + 4 + 5);
        check("8d6dh1dl1", 4 + 5 + 2 + 3 + 4 + 5);
        check("1d6 + 2 * 8d6r>3", 4 + 2 * (1 + 2 + 3 + 1 + 2 + 3 + 4 + 5));
    }

    #[test]
    fn test_eval_functions() {
        check("max(1d20, 15)", 15);
        check("floor(7 / 2) + abs(-2)", 5);
    }

    #[test]
    fn test_custom_function() {
        let mut ctx = RollContext::new_bounded(1000, mock_roller());
        ctx.register_function("double", |args| Ok(args[0] * Number::Int(2)));
        let mut roll = Roll::new("double(1d20)").unwrap();
        assert_eq!(eval(&mut roll, &mut ctx), Ok(Number::Int(20)));
    }

    #[test]
    fn test_err_too_many_rolls() {
        check_err("2d20rr<21", RollError::TooManyRolls);
    }

    #[test]
    fn test_budget_resets_between_rolls() {
        let mut ctx = RollContext::new_bounded(3, mock_roller());
        for _ in 0..3 {
            let mut roll = Roll::new("3d6").unwrap();
            assert!(eval(&mut roll, &mut ctx).is_ok());
            assert_eq!(ctx.rolls(), 3);
        }
    }
}
