mod ctx;
pub mod data;
pub mod dice;
mod eval;
pub mod functions;
pub mod modifiers;
pub mod num;
mod roller;
mod stringify;
pub mod terms;

use crate::common::*;
use crate::config::FulfillmentConfig;
use crate::error::{RResult, RollError};
use crate::fulfillment::{self, FulfillmentCoordinator};
use crate::parse::{self, FormulaSyntaxError, ParseNode, SubFormula};
use dice::DiceTerm;
use eval::Session;
use futures_util::future::{FutureExt, LocalBoxFuture};
use serde_json::Value;
use terms::*;

pub use ctx::{DefaultRoller, RollContext};
pub use eval::{evaluate_total, simplify_terms, EvaluateOptions};
pub use num::Number;
pub use roller::{Roller, SequenceRoller, StepRoller};
pub use stringify::{BreakdownStringifier, SimpleStringifier, Stringify};

/// A formula together with its terms and, once evaluated, its total.
///
/// A roll is evaluated at most once. Use [`Roll::clone_unevaluated`] or
/// [`Roll::reroll`] for a fresh copy of the same formula and data.
#[derive(Debug)]
pub struct Roll {
    formula: String,
    pub data: Value,
    pub options: TermOptions,
    pub terms: Vec<RollTerm>,
    total: Option<Number>,
    evaluated: bool,
    /// Dice of intermediate terms collapsed during evaluation.
    extra_dice: Vec<DiceTerm>,
    coordinator: Option<FulfillmentCoordinator>,
}

/// Clones start without a coordinator: pending requests belong to one roll.
impl Clone for Roll {
    fn clone(&self) -> Self {
        Self {
            formula: self.formula.clone(),
            data: self.data.clone(),
            options: self.options.clone(),
            terms: self.terms.clone(),
            total: self.total,
            evaluated: self.evaluated,
            extra_dice: self.extra_dice.clone(),
            coordinator: None,
        }
    }
}

impl Roll {
    pub fn new(formula: &str) -> RResult<Self> {
        Self::with_data(formula, Value::Null)
    }

    /// Substitutes `@path` references from `data`, then parses.
    pub fn with_data(formula: &str, data: Value) -> RResult<Self> {
        let formula = Self::replace_formula_data(formula, &data, None, false);
        let nodes = parse::parse(&formula)?;
        let mut roll = Self::from_terms(build_terms(&formula, nodes)?);
        roll.data = data;
        Ok(roll)
    }

    /// An unevaluated roll over already constructed terms.
    pub fn from_terms(terms: Vec<RollTerm>) -> Self {
        Self {
            formula: Self::get_formula(&terms),
            data: Value::Null,
            options: TermOptions::default(),
            terms,
            total: None,
            evaluated: false,
            extra_dice: Vec::new(),
            coordinator: None,
        }
    }

    fn from_sub_formula(sub: SubFormula) -> RResult<Self> {
        Ok(Self::from_terms(build_terms(&sub.formula, sub.nodes)?))
    }

    pub fn formula(&self) -> &str {
        &self.formula
    }

    /// Renders terms back into a formula: operators are spaced, except a
    /// leading `-`, and adjacent operands are written back to back.
    pub fn get_formula(terms: &[RollTerm]) -> String {
        let mut ret = String::new();
        for (i, term) in terms.iter().enumerate() {
            match term.operator() {
                Some(op) if i == 0 => ret.push(op.as_char()),
                Some(op) => {
                    ret.push(' ');
                    ret.push(op.as_char());
                    ret.push(' ');
                }
                None => ret.push_str(&term.formula()),
            }
        }
        ret
    }

    /// Whether `formula` parses, with missing data treated as 0.
    pub fn validate(formula: &str) -> bool {
        let formula = Self::replace_formula_data(formula, &Value::Null, Some("0"), false);
        Self::new(&formula).is_ok()
    }

    pub fn replace_formula_data(formula: &str, data: &Value, missing: Option<&str>, warn: bool) -> String {
        parse::replace_formula_data(formula, data, missing, warn)
    }

    /// Evaluates every term, suspending on dice that wait for external results.
    pub async fn evaluate<R: Roller>(&mut self, ctx: &mut RollContext<R>, options: EvaluateOptions) -> RResult<Number> {
        if self.evaluated {
            return Err(RollError::AlreadyEvaluated);
        }
        ctx.reset_rolls();
        let coordinator = self.coordinator().clone();
        let mut session = Session::new(ctx, options, Some(coordinator), false);
        self.evaluate_nested(&mut session).await
    }

    /// Evaluates without suspending.
    ///
    /// In strict mode random dice are refused unless `minimize` or `maximize`
    /// fixes their results; dice waiting on an external method always are.
    pub fn evaluate_sync<R: Roller>(&mut self, ctx: &mut RollContext<R>, options: EvaluateOptions) -> RResult<Number> {
        if self.evaluated {
            return Err(RollError::AlreadyEvaluated);
        }
        if options.strict && !options.is_pinned() {
            if let Some(term) = self.terms.iter().find(|t| !t.is_deterministic()) {
                return Err(RollError::synchronous(term.formula()));
            }
        }
        ctx.reset_rolls();
        let mut session = Session::new(ctx, options, None, true);
        let result = self.evaluate_nested(&mut session).now_or_never();
        result.unwrap_or_else(|| Err(RollError::synchronous(self.formula())))
    }

    pub(crate) fn evaluate_nested<'a, 'c, R: Roller>(
        &'a mut self,
        session: &'a mut Session<'c, R>,
    ) -> LocalBoxFuture<'a, RResult<Number>> {
        eval::evaluate_roll(self, session).boxed_local()
    }

    /// A fresh, unevaluated roll of the same formula and data.
    pub fn clone_unevaluated(&self) -> RResult<Self> {
        let mut roll = Self::with_data(&self.formula, self.data.clone())?;
        roll.options = self.options.clone();
        Ok(roll)
    }

    pub async fn reroll<R: Roller>(&self, ctx: &mut RollContext<R>, options: EvaluateOptions) -> RResult<Self> {
        let mut roll = self.clone_unevaluated()?;
        roll.evaluate(ctx, options).await?;
        Ok(roll)
    }

    pub fn reroll_sync<R: Roller>(&self, ctx: &mut RollContext<R>, options: EvaluateOptions) -> RResult<Self> {
        let mut roll = self.clone_unevaluated()?;
        roll.evaluate_sync(ctx, options)?;
        Ok(roll)
    }

    /// Scales every top-level dice term to `round(number * multiply) + add`
    /// dice, and numeric terms by `multiply` if `multiply_numeric` is set.
    pub fn alter(&mut self, multiply: Float, add: Int, multiply_numeric: bool) -> RResult<&mut Self> {
        if self.evaluated {
            return Err(RollError::AlreadyEvaluated);
        }
        for term in &mut self.terms {
            match term {
                RollTerm::Dice(d) => {
                    let number = (d.number as Float * multiply).round() as Int + add;
                    d.number = number.max(0) as usize;
                }
                RollTerm::Pool(p) => {
                    for roll in &mut p.rolls {
                        roll.alter(multiply, add, multiply_numeric)?;
                    }
                    p.terms = p.rolls.iter().map(|r| r.formula.clone()).collect();
                }
                RollTerm::Numeric(n) if multiply_numeric => {
                    n.number = Number::from(n.number.as_float() * multiply);
                }
                _ => {}
            }
        }
        self.formula = Self::get_formula(&self.terms);
        Ok(self)
    }

    /// Every dice term of the roll, nested ones included.
    pub fn dice(&self) -> Vec<&DiceTerm> {
        self.extra_dice
            .iter()
            .chain(self.terms.iter().flat_map(RollTerm::dice))
            .collect()
    }

    pub fn is_deterministic(&self) -> bool {
        self.terms.iter().all(Term::is_deterministic)
    }

    pub fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    pub fn total(&self) -> Option<Number> {
        self.total
    }

    /// The formula with each term replaced by its value, e.g. `4 + 3`.
    pub fn result(&self) -> RResult<String> {
        SimpleStringifier::new().stringify(self)
    }

    pub fn fulfillable_terms<'a>(&'a self, config: &FulfillmentConfig) -> Vec<&'a DiceTerm> {
        fulfillment::identify_fulfillable_terms(&self.terms, config)
    }

    /// The coordinator external results for this roll are registered with.
    pub fn coordinator(&mut self) -> &FulfillmentCoordinator {
        self.coordinator.get_or_insert_with(FulfillmentCoordinator::new)
    }

    /// Gives up on the roll, failing any dice still waiting for results.
    pub fn abandon(&self) {
        if let Some(coordinator) = &self.coordinator {
            coordinator.cancel();
        }
    }

    /// Totals of `n` independent evaluations, with external methods bypassed.
    pub fn simulate<R: Roller>(formula: &str, n: usize, ctx: &mut RollContext<R>) -> RResult<Vec<Number>> {
        let options = EvaluateOptions {
            allow_interactive: false,
            strict: false,
            ..Default::default()
        };
        let template = Self::new(formula)?;
        (0..n)
            .map(|_| template.reroll_sync(ctx, options).map(|r| r.total.unwrap_or_default()))
            .collect()
    }
}

/// Instantiates a parsed node sequence into terms, checking it forms a
/// well-built expression first.
pub(crate) fn build_terms(formula: &str, nodes: Vec<ParseNode>) -> RResult<Vec<RollTerm>> {
    let fragments: Vec<String> = nodes.iter().map(ToString::to_string).collect();
    let ast = parse::to_ast(nodes).map_err(|e| {
        let fragment = fragments.get(e.index).map(String::as_str).unwrap_or_default();
        FormulaSyntaxError::at_fragment(formula, fragment, e.kind)
    })?;
    let mut terms = Vec::new();
    for node in parse::flatten_tree(ast) {
        push_node(&mut terms, node)?;
    }
    Ok(terms)
}

fn push_node(terms: &mut Vec<RollTerm>, node: ParseNode) -> RResult<()> {
    match node {
        ParseNode::Number(x) => terms.push(NumericTerm::new(x).into()),
        ParseNode::Dice {
            number,
            denomination,
            modifiers,
        } => {
            let mut term = DiceTerm::new(number, denomination);
            term.modifiers = modifiers;
            terms.push(term.into());
        }
        ParseNode::Function { name, args } => {
            let rolls = args
                .into_iter()
                .map(Roll::from_sub_formula)
                .collect::<RResult<Vec<_>>>()?;
            terms.push(FunctionTerm::new(name, rolls).into());
        }
        ParseNode::Pool { items, modifiers } => {
            let rolls = items.try_mapped(Roll::from_sub_formula)?;
            terms.push(PoolTerm::new(rolls, modifiers).into());
        }
        ParseNode::Parenthetical(sub) => {
            terms.push(ParentheticalTerm::new(Roll::from_sub_formula(sub)?).into());
        }
        ParseNode::String(s) => terms.push(StringTerm::new(s).into()),
        ParseNode::Operator(op) => terms.push(OperatorTerm::new(op).into()),
        ParseNode::Negation(inner) => match *inner {
            ParseNode::Number(x) => terms.push(NumericTerm::new(-x).into()),
            inner if terms.is_empty() => {
                terms.push(OperatorTerm::new(Operator::Sub).into());
                push_node(terms, inner)?;
            }
            inner => {
                let mut negated = vec![OperatorTerm::new(Operator::Sub).into()];
                push_node(&mut negated, inner)?;
                terms.push(ParentheticalTerm::new(Roll::from_terms(negated)).into());
            }
        },
        ParseNode::Concat(nodes) => {
            for node in nodes {
                push_node(terms, node)?;
            }
        }
        ParseNode::Annotated(inner, flavor) => {
            push_node(terms, *inner)?;
            if let Some(last) = terms.last_mut() {
                last.options_mut().flavor = Some(flavor);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvaluationError;
    use crate::fulfillment::FulfillmentState;
    use crate::parse::SyntaxErrorKind;

    fn ctx() -> RollContext<StepRoller> {
        RollContext::with_roller(StepRoller::new(10, 1))
    }

    fn lenient() -> EvaluateOptions {
        EvaluateOptions {
            strict: false,
            ..Default::default()
        }
    }

    fn manual_d20() -> RollContext<StepRoller> {
        let mut ctx = ctx();
        ctx.config_mut().fulfillment.assign(Denomination::Die(20), "manual", true);
        ctx
    }

    #[test]
    fn test_canonical_formula() {
        assert_eq!(Roll::new("1d20+5").unwrap().formula(), "1d20 + 5");
        assert_eq!(Roll::new("-1d20 - -3").unwrap().formula(), "-1d20 + 3");
        assert_eq!(Roll::new("2 * -1d6").unwrap().formula(), "2 * (-1d6)");
        assert_eq!(Roll::new("(1 + 1)d6[fire]").unwrap().formula(), "(1 + 1)d6[fire]");
        assert_eq!(Roll::new("{ 1d20 ,2 }kh").unwrap().formula(), "{1d20, 2}kh");
    }

    #[test]
    fn test_round_trip_through_formula() {
        for formula in ["2 + 3 * 4", "10 - (4 - 3) * 2", "-2d6 + 4 % 3", "max(1d4, 2) / 2", "{1, 2d6}kh1 - 1"] {
            let mut first = Roll::new(formula).unwrap();
            let mut second = Roll::new(first.formula()).unwrap();
            assert_eq!(second.formula(), first.formula());
            let a = first.evaluate_sync(&mut ctx(), lenient()).unwrap();
            let b = second.evaluate_sync(&mut ctx(), lenient()).unwrap();
            assert_eq!(a, b, "{}", formula);
        }
    }

    #[test]
    fn test_preset_dice() {
        let dice = DiceTerm::new(2, Denomination::Die(6)).with_results(vec![3, 4]);
        let mut roll = Roll::from_terms(vec![
            dice.into(),
            OperatorTerm::new(Operator::Add).into(),
            NumericTerm::new(4).into(),
        ]);
        assert_eq!(roll.formula(), "2d6 + 4");
        assert!(roll.is_deterministic());
        assert_eq!(roll.evaluate_sync(&mut ctx(), EvaluateOptions::default()), Ok(Number::Int(11)));
    }

    #[test]
    fn test_precedence() {
        let mut roll = Roll::new("2 + 3 * 4").unwrap();
        assert_eq!(roll.evaluate_sync(&mut ctx(), EvaluateOptions::default()), Ok(Number::Int(14)));
        assert_eq!(roll.total(), Some(Number::Int(14)));
    }

    #[test]
    fn test_evaluated_once() {
        let mut roll = Roll::new("1d20 + 1").unwrap();
        let mut ctx = ctx();
        let total = roll.evaluate_sync(&mut ctx, lenient()).unwrap();
        assert_eq!(roll.evaluate_sync(&mut ctx, lenient()), Err(RollError::AlreadyEvaluated));
        assert!(matches!(roll.alter(2.0, 0, false), Err(RollError::AlreadyEvaluated)));

        let mut copy = roll.clone_unevaluated().unwrap();
        assert!(!copy.is_evaluated());
        copy.evaluate_sync(&mut ctx, lenient()).unwrap();
        assert_eq!(roll.total(), Some(total));
        assert_eq!(roll.dice()[0].results.len(), 1);

        let rerolled = roll.reroll_sync(&mut ctx, lenient()).unwrap();
        assert!(rerolled.is_evaluated());
        assert_eq!(roll.total(), Some(total));
    }

    #[test]
    fn test_synchronous_refusal() {
        let mut roll = Roll::new("1 + 1d20").unwrap();
        assert_eq!(
            roll.evaluate_sync(&mut ctx(), EvaluateOptions::default()),
            Err(RollError::synchronous("1d20"))
        );
        assert!(!roll.is_evaluated());
        assert_eq!(roll.evaluate_sync(&mut ctx(), EvaluateOptions::maximized()), Ok(Number::Int(21)));

        let mut roll = Roll::new("1d20").unwrap();
        assert_eq!(roll.evaluate_sync(&mut ctx(), EvaluateOptions::minimized()), Ok(Number::Int(1)));
    }

    #[test]
    fn test_synchronous_refuses_dynamic_dice() {
        let mut roll = Roll::new("(1 + 1)d6").unwrap();
        assert_eq!(
            roll.evaluate_sync(&mut ctx(), EvaluateOptions::default()),
            Err(RollError::synchronous("2d6"))
        );
        assert!(!roll.is_evaluated());
        assert_eq!(roll.terms.len(), 2);
        assert!(roll.dice().is_empty());

        assert_eq!(roll.evaluate_sync(&mut ctx(), lenient()), Ok(Number::Int(4 + 5)));
        assert_eq!(roll.terms[0].formula(), "2d6");
    }

    #[test]
    fn test_synchronous_refuses_manual_dice() {
        let mut ctx = manual_d20();
        let mut roll = Roll::new("1d20 + 1").unwrap();
        assert_eq!(roll.evaluate_sync(&mut ctx, lenient()), Err(RollError::synchronous("1d20")));
        assert!(!roll.is_evaluated());

        let options = EvaluateOptions {
            allow_interactive: false,
            ..lenient()
        };
        assert_eq!(roll.evaluate_sync(&mut ctx, options), Ok(Number::Int(11)));
    }

    #[test]
    fn test_failed_evaluation_leaves_roll_untouched() {
        let roller = SequenceRoller::new(vec![6, 6, 6, 1, 2, 3]);
        let mut ctx = RollContext::new_bounded(3, roller);
        let mut roll = Roll::new("2d6x").unwrap();
        assert_eq!(roll.evaluate_sync(&mut ctx, lenient()), Err(RollError::TooManyRolls));
        assert!(!roll.is_evaluated());
        assert_eq!(roll.total(), None);
        assert!(roll.dice()[0].results.is_empty());

        assert_eq!(roll.evaluate_sync(&mut ctx, lenient()), Ok(Number::Int(1 + 2)));
        assert_eq!(roll.dice()[0].results.len(), 2);
        assert!(roll.dice()[0].results.iter().all(|r| !r.exploded));
    }

    #[test]
    fn test_clone_has_own_coordinator() {
        let mut roll = Roll::new("1d20").unwrap();
        let coordinator = roll.coordinator().clone();
        let mut copy = roll.clone();
        copy.abandon();
        assert!(!coordinator.is_cancelled());

        copy.coordinator().cancel();
        assert!(!coordinator.is_cancelled());
        roll.abandon();
        assert!(coordinator.is_cancelled());
    }

    #[tokio::test]
    async fn test_manual_result_completes_roll() {
        let mut ctx = manual_d20();
        let mut roll = Roll::new("1d20 + 4").unwrap();
        let coordinator = roll.coordinator().clone();

        let actor = async {
            let request = coordinator.next_request().await.unwrap();
            assert_eq!(request.method, "manual");
            assert_eq!(request.denomination, Denomination::Die(20));
            assert_eq!(coordinator.state(request.ticket), Some(FulfillmentState::AwaitingExternal));
            assert!(!coordinator.register_result("manual", "d20", 0));
            assert!(coordinator.register_result("manual", "d20", 15));
        };
        let (total, ()) = tokio::join!(roll.evaluate(&mut ctx, EvaluateOptions::default()), actor);
        assert_eq!(total, Ok(Number::Int(19)));
        assert!(roll.is_evaluated());
        assert_eq!(roll.dice()[0].results[0].result, 15);
        assert_eq!(coordinator.state(0), Some(FulfillmentState::Fulfilled));
        assert!(coordinator.is_complete());
    }

    #[tokio::test]
    async fn test_configured_dice_rolled_internally() {
        let mut ctx = manual_d20();
        let mut roll = Roll::new("1d20").unwrap();
        let coordinator = roll.coordinator().clone();
        let options = EvaluateOptions {
            allow_interactive: false,
            ..Default::default()
        };
        assert_eq!(roll.evaluate(&mut ctx, options).await, Ok(Number::Int(10)));
        assert_eq!(coordinator.state(0), Some(FulfillmentState::InternallyRolled));
        assert!(coordinator.outstanding().is_empty());
    }

    #[tokio::test]
    async fn test_abandon_fails_waiting_dice() {
        let mut ctx = manual_d20();
        let mut roll = Roll::new("2d20kh").unwrap();
        let coordinator = roll.coordinator().clone();

        let actor = async {
            let request = coordinator.next_request().await.unwrap();
            assert!(coordinator.register_result(&request.method, "d20", 7));
            coordinator.next_request().await.unwrap();
            coordinator.cancel();
            assert!(!coordinator.register_result("manual", "d20", 12));
        };
        let (total, ()) = tokio::join!(roll.evaluate(&mut ctx, EvaluateOptions::default()), actor);
        assert_eq!(total, Err(RollError::Evaluation(EvaluationError::Cancelled)));
        assert!(!roll.is_evaluated());
        assert_eq!(roll.total(), None);
        assert!(coordinator.outstanding().is_empty());
        assert!(coordinator.is_complete());

        roll.abandon();
        assert!(!roll.coordinator().register_result("manual", "d20", 3));
    }

    #[test]
    fn test_dynamic_dice() {
        let mut roll = Roll::new("(1 + 1)d6 + 2d(3)").unwrap();
        assert_eq!(roll.terms.len(), 5);
        roll.evaluate_sync(&mut ctx(), lenient()).unwrap();
        let formulas: Vec<_> = roll.terms.iter().map(Term::formula).collect();
        assert_eq!(formulas, ["2d6", "+", "2d3"]);
        assert_eq!(roll.dice().len(), 2);
    }

    #[test]
    fn test_strings() {
        let mut roll = Roll::new("1d4 + bonus").unwrap();
        assert_eq!(
            roll.evaluate_sync(&mut ctx(), lenient()),
            Err(RollError::Evaluation(EvaluationError::UnresolvedString("bonus".into())))
        );

        let mut roll = Roll::new("3 + bonus").unwrap();
        let options = EvaluateOptions {
            allow_strings: true,
            ..Default::default()
        };
        assert_eq!(roll.evaluate_sync(&mut ctx(), options), Ok(Number::Int(3)));
    }

    #[test]
    fn test_data_substitution() {
        let data = serde_json::json!({ "abilities": { "str": 3 }, "weapon": "1d8" });
        let roll = Roll::with_data("@weapon + @abilities.str", data).unwrap();
        assert_eq!(roll.formula(), "1d8 + 3");
        assert!(Roll::validate("1d20 + @missing"));
        assert!(!Roll::validate("1d20 +"));
        assert!(!Roll::validate("(1d20"));
    }

    #[test]
    fn test_syntax_errors_carry_fragment() {
        let err = Roll::new("1d20 + 4d6kq").unwrap_err();
        match err {
            RollError::Syntax(e) => {
                assert_eq!(e.formula, "1d20 + 4d6kq");
                assert_eq!(e.fragment, "kq");
                assert_eq!(e.kind, SyntaxErrorKind::InvalidModifier("kq".into()));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_alter() {
        let mut roll = Roll::new("2d6 + 1d4 + 3").unwrap();
        roll.alter(2.0, 1, false).unwrap();
        assert_eq!(roll.formula(), "5d6 + 3d4 + 3");
        roll.alter(0.5, 0, true).unwrap();
        assert_eq!(roll.formula(), "3d6 + 2d4 + 1.5");
    }

    #[test]
    fn test_division_by_zero() {
        let mut roll = Roll::new("1d6 / (2 - 2)").unwrap();
        assert_eq!(
            roll.evaluate_sync(&mut ctx(), lenient()),
            Err(RollError::Evaluation(EvaluationError::DivisionByZero))
        );
        assert_eq!(roll.total(), None);
    }

    #[test]
    fn test_simulate() {
        let totals = Roll::simulate("1d4", 8, &mut ctx()).unwrap();
        assert_eq!(totals.len(), 8);
        assert!(totals.iter().all(|t| (1..=4).contains(&t.as_int())));
    }
}
