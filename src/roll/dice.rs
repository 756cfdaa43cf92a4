use super::eval::{External, Session};
use super::modifiers::{self, Condition, Modifier, ModifierKind, ModifierSet};
use super::num::Number;
use super::roller::Roller;
use super::terms::{Term, TermOptions};
use crate::common::*;
use crate::error::{RResult, RollError};
use serde::{Deserialize, Serialize};

/// Upper bound on results inspected by a single reroll or explode pass.
const MAX_CHECKED: usize = 1000;

/// One die's outcome. Results are never removed once drawn, only flagged.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct DiceResult {
    pub result: Int,
    #[serde(default = "active_default")]
    pub active: bool,
    /// Overrides `result` when counting towards the total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<Int>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<bool>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub discarded: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub rerolled: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub exploded: bool,
}

fn active_default() -> bool {
    true
}

fn is_false(x: &bool) -> bool {
    !x
}

impl DiceResult {
    pub fn new(result: Int) -> Self {
        Self {
            result,
            active: true,
            count: None,
            success: None,
            failure: None,
            discarded: false,
            rerolled: false,
            exploded: false,
        }
    }

    /// What this result adds to the total while active.
    pub fn value(&self) -> Int {
        self.count.unwrap_or(self.result)
    }

    pub(crate) fn discard(&mut self) {
        self.active = false;
        self.discarded = true;
    }
}

/// `NdF` with modifiers: a [`Denomination::Die`], [`Denomination::Coin`] or
/// [`Denomination::Fate`] term.
#[derive(Debug, Clone, PartialEq)]
pub struct DiceTerm {
    pub number: usize,
    pub denomination: Denomination,
    pub modifiers: Vec<Modifier>,
    pub results: Vec<DiceResult>,
    pub options: TermOptions,
    pub(crate) evaluated: bool,
}

impl DiceTerm {
    pub fn new(number: usize, denomination: Denomination) -> Self {
        Self {
            number,
            denomination,
            modifiers: Vec::new(),
            results: Vec::new(),
            options: TermOptions::default(),
            evaluated: false,
        }
    }

    /// Parses and appends a modifier suffix such as `kh1r1`.
    pub fn with_modifiers(mut self, modifiers: &str) -> Result<Self, String> {
        let set = ModifierSet::for_denomination(&self.denomination);
        self.modifiers.extend(Modifier::parse_all(modifiers, set)?);
        Ok(self)
    }

    /// Presets raw results. Only the dice still missing are drawn on evaluation.
    pub fn with_results(mut self, results: impl IntoIterator<Item = Int>) -> Self {
        self.results.extend(results.into_iter().map(DiceResult::new));
        self
    }

    pub fn with_flavor(mut self, flavor: impl Into<String>) -> Self {
        self.options.flavor = Some(flavor.into());
        self
    }

    pub fn faces(&self) -> UInt {
        self.denomination.faces()
    }

    /// `2d6` without modifiers or flavor.
    pub fn expression(&self) -> String {
        format!("{}{}", self.number, self.denomination)
    }

    /// Counted values of the active results.
    pub fn values(&self) -> impl Iterator<Item = Int> + '_ {
        self.results.iter().filter(|r| r.active).map(DiceResult::value)
    }

    fn draws_dice(&self) -> bool {
        self.modifiers.iter().any(|m| m.kind.draws_dice())
    }

    pub(crate) async fn evaluate<R: Roller>(&mut self, session: &mut Session<'_, R>) -> RResult<()> {
        if self.evaluated {
            return Err(RollError::AlreadyEvaluated);
        }
        let external = session.begin_fulfillment(self)?;
        let rolled = self.roll_and_modify(session, external.as_ref()).await;
        session.end_fulfillment(external);
        rolled?;
        self.evaluated = true;
        log::debug!("{} rolled {:?}", self.formula(), self.results.iter().map(|r| r.result).collect::<Vec<_>>());
        Ok(())
    }

    async fn roll_and_modify<R: Roller>(
        &mut self,
        session: &mut Session<'_, R>,
        external: Option<&External>,
    ) -> RResult<()> {
        let missing = self.number.saturating_sub(self.results.len());
        for _ in 0..missing {
            self.roll(session, external).await?;
        }
        for modifier in self.modifiers.clone() {
            match modifier.kind {
                ModifierKind::Reroll { recursive, condition } => {
                    let condition = condition
                        .unwrap_or_else(|| Condition::new(Comparison::Eq, self.denomination.min_value()));
                    self.reroll(session, external, condition, recursive).await?;
                }
                ModifierKind::Explode { recursive, condition } => {
                    let condition = condition
                        .unwrap_or_else(|| Condition::new(Comparison::Eq, self.denomination.max_value()));
                    self.explode(session, external, condition, recursive).await?;
                }
                ref kind => modifiers::apply_in_place(&mut self.results, kind, self.denomination.values()),
            }
        }
        Ok(())
    }

    async fn roll<R: Roller>(&mut self, session: &mut Session<'_, R>, external: Option<&External>) -> RResult<()> {
        let value = session.draw(self.denomination, external).await?;
        self.results.push(DiceResult::new(value));
        Ok(())
    }

    async fn reroll<R: Roller>(
        &mut self,
        session: &mut Session<'_, R>,
        external: Option<&External>,
        condition: Condition,
        recursive: bool,
    ) -> RResult<()> {
        if session.options.is_pinned() {
            return Ok(());
        }
        let initial = self.results.len();
        let mut checked = 0;
        while checked < self.results.len() {
            let r = &mut self.results[checked];
            checked += 1;
            if r.active && condition.matches(r.result) {
                r.rerolled = true;
                r.active = false;
                self.roll(session, external).await?;
            }
            if !recursive && checked >= initial {
                break;
            }
            if checked > MAX_CHECKED {
                return Err(RollError::TooManyRolls);
            }
        }
        Ok(())
    }

    async fn explode<R: Roller>(
        &mut self,
        session: &mut Session<'_, R>,
        external: Option<&External>,
        condition: Condition,
        recursive: bool,
    ) -> RResult<()> {
        if session.options.is_pinned() {
            return Ok(());
        }
        let initial = self.results.len();
        let mut checked = 0;
        while checked < self.results.len() {
            let r = &mut self.results[checked];
            checked += 1;
            if r.active && condition.matches(r.result) {
                r.exploded = true;
                self.roll(session, external).await?;
            }
            if !recursive && checked >= initial {
                break;
            }
            if checked > MAX_CHECKED {
                return Err(RollError::TooManyRolls);
            }
        }
        Ok(())
    }
}

impl Term for DiceTerm {
    fn formula(&self) -> String {
        let modifiers: String = self.modifiers.iter().map(ToString::to_string).collect();
        self.options.decorate(format!("{}{}", self.expression(), modifiers))
    }

    fn total(&self) -> Option<Number> {
        self.evaluated.then(|| self.values().map(Number::Int).sum())
    }

    fn is_deterministic(&self) -> bool {
        self.evaluated || (self.results.len() >= self.number && !self.draws_dice())
    }

    fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    fn options(&self) -> &TermOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut TermOptions {
        &mut self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roll::ctx::RollContext;
    use crate::roll::eval::EvaluateOptions;
    use crate::roll::roller::{SequenceRoller, StepRoller};
    use futures_util::FutureExt;

    fn evaluate(term: &mut DiceTerm, roller: impl Roller, options: EvaluateOptions) -> RResult<()> {
        let mut ctx = RollContext::with_roller(roller);
        let mut session = Session::new(&mut ctx, options, None, true);
        term.evaluate(&mut session)
            .now_or_never()
            .unwrap_or_else(|| Err(RollError::synchronous(term.formula())))
    }

    fn die(number: usize, faces: UInt, modifiers: &str) -> DiceTerm {
        DiceTerm::new(number, Denomination::Die(faces))
            .with_modifiers(modifiers)
            .unwrap()
    }

    #[test]
    fn test_sum_of_values_is_total() {
        let mut term = die(4, 6, "kh3");
        evaluate(&mut term, StepRoller::new(3, 1), EvaluateOptions::default()).unwrap();
        assert_eq!(term.results.len(), 4);
        assert_eq!(term.total(), Some(Number::Int(term.values().sum())));
        assert_eq!(term.total(), Some(Number::Int(4 + 5 + 6)));
    }

    #[test]
    fn test_reroll_once() {
        let mut term = die(1, 6, "r1");
        evaluate(&mut term, SequenceRoller::new(vec![1, 1]), EvaluateOptions::default()).unwrap();
        assert_eq!(term.results.len(), 2);
        assert!(term.results[0].rerolled);
        assert!(!term.results[0].active);
        assert_eq!(term.total(), Some(Number::Int(1)));

        let mut term = die(1, 6, "r1");
        evaluate(&mut term, SequenceRoller::new(vec![1, 5]), EvaluateOptions::default()).unwrap();
        assert_eq!(term.results.len(), 2);
        assert_eq!(term.total(), Some(Number::Int(5)));
    }

    #[test]
    fn test_reroll_recursive() {
        let mut term = die(1, 6, "rr<3");
        evaluate(&mut term, SequenceRoller::new(vec![1, 2, 1, 4]), EvaluateOptions::default()).unwrap();
        assert_eq!(term.results.len(), 4);
        assert_eq!(term.values().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn test_explode() {
        let mut term = die(2, 6, "x");
        evaluate(&mut term, SequenceRoller::new(vec![6, 2, 6, 3]), EvaluateOptions::default()).unwrap();
        assert_eq!(term.results.iter().map(|r| r.result).collect::<Vec<_>>(), vec![6, 2, 6, 3]);
        assert!(term.results[0].exploded && term.results[2].exploded);
        assert_eq!(term.total(), Some(Number::Int(17)));

        let mut term = die(1, 6, "xo");
        evaluate(&mut term, SequenceRoller::new(vec![6, 6, 6]), EvaluateOptions::default()).unwrap();
        assert_eq!(term.results.len(), 2);
    }

    #[test]
    fn test_modifiers_apply_left_to_right() {
        let mut term = die(2, 6, "r1kh1");
        evaluate(&mut term, SequenceRoller::new(vec![1, 3, 2]), EvaluateOptions::default()).unwrap();
        assert_eq!(term.total(), Some(Number::Int(3)));
        assert_eq!(term.results.iter().filter(|r| r.discarded).count(), 1);
    }

    #[test]
    fn test_preset_results() {
        let mut term = DiceTerm::new(3, Denomination::Die(6)).with_results(vec![2, 2]);
        assert!(!term.is_deterministic());
        evaluate(&mut term, StepRoller::new(5, 0), EvaluateOptions::default()).unwrap();
        assert_eq!(term.total(), Some(Number::Int(9)));

        let term = DiceTerm::new(2, Denomination::Die(6)).with_results(vec![3, 4]);
        assert!(term.is_deterministic());
    }

    #[test]
    fn test_pinned_skips_explosions() {
        let mut term = die(3, 6, "x");
        let options = EvaluateOptions {
            maximize: true,
            ..Default::default()
        };
        evaluate(&mut term, StepRoller::new(1, 1), options).unwrap();
        assert_eq!(term.total(), Some(Number::Int(18)));
    }

    #[test]
    fn test_fate_and_coin() {
        let mut term = DiceTerm::new(4, Denomination::Fate);
        evaluate(&mut term, StepRoller::new(1, 1), EvaluateOptions::default()).unwrap();
        assert_eq!(term.total(), Some(Number::Int(-1 + 0 + 1 - 1)));

        let mut term = DiceTerm::new(3, Denomination::Coin).with_modifiers("c").unwrap();
        evaluate(&mut term, StepRoller::new(1, 1), EvaluateOptions::default()).unwrap();
        assert_eq!(term.total(), Some(Number::Int(1)));
    }

    #[test]
    fn test_runaway_explosion() {
        let mut term = die(1, 1, "x");
        let mut ctx = RollContext::new_unbounded(StepRoller::new(1, 0));
        let mut session = Session::new(&mut ctx, EvaluateOptions::default(), None, true);
        let err = term.evaluate(&mut session).now_or_never().unwrap();
        assert_eq!(err, Err(RollError::TooManyRolls));

        let mut term = die(1, 1, "x");
        let err = evaluate(&mut term, StepRoller::new(1, 0), EvaluateOptions::default());
        assert_eq!(err, Err(RollError::TooManyRolls));
    }

    #[test]
    fn test_pinned_draws_count_towards_budget() {
        let mut term = die(1_000_000_000, 6, "");
        let mut ctx = RollContext::new_bounded(100, StepRoller::new(1, 1));
        let mut session = Session::new(&mut ctx, EvaluateOptions::maximized(), None, true);
        let err = term.evaluate(&mut session).now_or_never().unwrap();
        assert_eq!(err, Err(RollError::TooManyRolls));
        assert_eq!(term.results.len(), 100);
        assert_eq!(ctx.rolls(), 101);
    }

    #[test]
    fn test_formula() {
        let term = die(4, 6, "kh3").with_flavor("fire");
        assert_eq!(term.formula(), "4d6kh3[fire]");
        assert_eq!(DiceTerm::new(1, Denomination::Fate).formula(), "1df");
    }

    #[test]
    fn test_evaluate_twice() {
        let mut term = die(1, 6, "");
        evaluate(&mut term, StepRoller::new(1, 1), EvaluateOptions::default()).unwrap();
        assert_eq!(
            evaluate(&mut term, StepRoller::new(1, 1), EvaluateOptions::default()),
            Err(RollError::AlreadyEvaluated)
        );
    }
}
