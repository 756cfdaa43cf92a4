use super::dice::{DiceResult, DiceTerm};
use super::eval::Session;
use super::modifiers::{self, Modifier};
use super::num::Number;
use super::roller::Roller;
use super::Roll;
use crate::common::*;
use crate::error::{EvaluationError, RResult, RollError};
use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

/// Flavor text plus any caller annotations carried along with a term.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TermOptions {
    pub fn flavored(flavor: impl Into<String>) -> Self {
        Self {
            flavor: Some(flavor.into()),
            ..Default::default()
        }
    }

    /// Appends `[flavor]` to a rendered term.
    pub(crate) fn decorate(&self, formula: String) -> String {
        match &self.flavor {
            Some(flavor) => format!("{}[{}]", formula, flavor),
            None => formula,
        }
    }

    /// Fills in whatever `self` lacks from `other`.
    pub(crate) fn merge(&mut self, other: &TermOptions) {
        if self.flavor.is_none() {
            self.flavor = other.flavor.clone();
        }
        for (k, v) in &other.extra {
            self.extra.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

#[enum_dispatch]
pub trait Term {
    /// The canonical formula text, flavor included.
    fn formula(&self) -> String;

    /// `None` until the term has been evaluated.
    fn total(&self) -> Option<Number>;

    fn is_deterministic(&self) -> bool;

    /// Must be reduced to a number before the surrounding arithmetic is evaluated.
    fn is_intermediate(&self) -> bool {
        false
    }

    fn is_evaluated(&self) -> bool;

    fn options(&self) -> &TermOptions;

    fn options_mut(&mut self) -> &mut TermOptions;

    fn flavor(&self) -> Option<&str> {
        self.options().flavor.as_deref()
    }
}

#[enum_dispatch(Term)]
#[derive(Debug, Clone)]
pub enum RollTerm {
    Numeric(NumericTerm),
    Operator(OperatorTerm),
    Dice(DiceTerm),
    Pool(PoolTerm),
    Function(FunctionTerm),
    Parenthetical(ParentheticalTerm),
    String(StringTerm),
}

impl RollTerm {
    pub fn operator(&self) -> Option<Operator> {
        match self {
            Self::Operator(op) => Some(op.operator),
            _ => None,
        }
    }

    /// Dice terms held by this term, including those inside nested rolls.
    pub fn dice(&self) -> Vec<&DiceTerm> {
        match self {
            Self::Dice(d) => vec![d],
            Self::Pool(p) => p.rolls.iter().flat_map(Roll::dice).collect(),
            Self::Function(f) => f.rolls.iter().flat_map(Roll::dice).collect(),
            Self::Parenthetical(p) => p.roll.dice(),
            _ => Vec::new(),
        }
    }

    pub(crate) async fn evaluate<R: Roller>(&mut self, session: &mut Session<'_, R>) -> RResult<()> {
        match self {
            Self::Numeric(_) | Self::Operator(_) => Ok(()),
            Self::Dice(d) => d.evaluate(session).await,
            Self::Pool(p) => p.evaluate(session).await,
            Self::Function(f) => f.evaluate(session).await,
            Self::Parenthetical(p) => p.evaluate(session).await,
            Self::String(s) => s.evaluate(session.options.allow_strings),
        }
    }
}

/// A literal number.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericTerm {
    pub number: Number,
    pub options: TermOptions,
}

impl NumericTerm {
    pub fn new(number: impl Into<Number>) -> Self {
        Self {
            number: number.into(),
            options: TermOptions::default(),
        }
    }

    pub fn with_options(number: impl Into<Number>, options: TermOptions) -> Self {
        Self {
            number: number.into(),
            options,
        }
    }
}

impl Term for NumericTerm {
    fn formula(&self) -> String {
        self.options.decorate(self.number.to_string())
    }

    fn total(&self) -> Option<Number> {
        Some(self.number)
    }

    fn is_deterministic(&self) -> bool {
        true
    }

    fn is_evaluated(&self) -> bool {
        true
    }

    fn options(&self) -> &TermOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut TermOptions {
        &mut self.options
    }
}

/// An arithmetic operator. Consumed structurally, never evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorTerm {
    pub operator: Operator,
    pub options: TermOptions,
}

impl OperatorTerm {
    pub fn new(operator: Operator) -> Self {
        Self {
            operator,
            options: TermOptions::default(),
        }
    }
}

impl Term for OperatorTerm {
    fn formula(&self) -> String {
        self.operator.to_string()
    }

    fn total(&self) -> Option<Number> {
        None
    }

    fn is_deterministic(&self) -> bool {
        true
    }

    fn is_evaluated(&self) -> bool {
        true
    }

    fn options(&self) -> &TermOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut TermOptions {
        &mut self.options
    }
}

/// `{f1, f2, ...}mods`: each element is rolled and its total becomes one result.
#[derive(Debug, Clone)]
pub struct PoolTerm {
    pub terms: Vec<String>,
    pub rolls: Vec<Roll>,
    pub modifiers: Vec<Modifier>,
    pub results: Vec<DiceResult>,
    pub options: TermOptions,
    pub(crate) evaluated: bool,
}

impl PoolTerm {
    pub fn new(rolls: NonEmpty<Roll>, modifiers: Vec<Modifier>) -> Self {
        Self {
            terms: rolls.iter().map(|r| r.formula().to_string()).collect(),
            rolls: rolls.into_vec(),
            modifiers,
            results: Vec::new(),
            options: TermOptions::default(),
            evaluated: false,
        }
    }

    pub fn values(&self) -> impl Iterator<Item = Int> + '_ {
        self.results.iter().filter(|r| r.active).map(DiceResult::value)
    }

    async fn evaluate<R: Roller>(&mut self, session: &mut Session<'_, R>) -> RResult<()> {
        if self.evaluated {
            return Err(RollError::AlreadyEvaluated);
        }
        for roll in &mut self.rolls {
            let total = roll.evaluate_nested(session).await?;
            let value = total.to_whole().ok_or(EvaluationError::NonIntegerPoolResult)?;
            self.results.push(DiceResult::new(value));
        }
        let low = self.results.iter().map(|r| r.result).min().unwrap_or(0);
        let high = self.results.iter().map(|r| r.result).max().unwrap_or(0);
        for modifier in &self.modifiers {
            modifiers::apply_in_place(&mut self.results, &modifier.kind, low..=high);
        }
        self.evaluated = true;
        Ok(())
    }
}

impl Term for PoolTerm {
    fn formula(&self) -> String {
        let modifiers: String = self.modifiers.iter().map(ToString::to_string).collect();
        self.options
            .decorate(format!("{{{}}}{}", self.terms.join(", "), modifiers))
    }

    fn total(&self) -> Option<Number> {
        self.evaluated.then(|| self.values().map(Number::Int).sum())
    }

    fn is_deterministic(&self) -> bool {
        self.evaluated || self.rolls.iter().all(Roll::is_deterministic)
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

/// `name(arg, ...)`: every argument is its own roll.
#[derive(Debug, Clone)]
pub struct FunctionTerm {
    pub function: String,
    pub terms: Vec<String>,
    pub rolls: Vec<Roll>,
    pub result: Option<Number>,
    pub options: TermOptions,
}

impl FunctionTerm {
    pub fn new(function: impl Into<String>, rolls: Vec<Roll>) -> Self {
        Self {
            function: function.into(),
            terms: rolls.iter().map(|r| r.formula().to_string()).collect(),
            rolls,
            result: None,
            options: TermOptions::default(),
        }
    }

    async fn evaluate<R: Roller>(&mut self, session: &mut Session<'_, R>) -> RResult<()> {
        if self.result.is_some() {
            return Err(RollError::AlreadyEvaluated);
        }
        let mut args = Vec::with_capacity(self.rolls.len());
        for roll in &mut self.rolls {
            args.push(roll.evaluate_nested(session).await?);
        }
        let result = session.ctx.functions().call(&self.function, &args)?;
        log::debug!("{}({:?}) = {}", self.function, args, result);
        self.result = Some(result);
        Ok(())
    }
}

impl Term for FunctionTerm {
    fn formula(&self) -> String {
        self.options
            .decorate(format!("{}({})", self.function, self.terms.join(", ")))
    }

    fn total(&self) -> Option<Number> {
        self.result
    }

    fn is_deterministic(&self) -> bool {
        self.rolls.iter().all(Roll::is_deterministic)
    }

    fn is_intermediate(&self) -> bool {
        true
    }

    fn is_evaluated(&self) -> bool {
        self.result.is_some()
    }

    fn options(&self) -> &TermOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut TermOptions {
        &mut self.options
    }
}

/// `(formula)`: a nested roll resolved before the outer arithmetic.
#[derive(Debug, Clone)]
pub struct ParentheticalTerm {
    pub term: String,
    pub roll: Box<Roll>,
    pub options: TermOptions,
}

impl ParentheticalTerm {
    pub fn new(roll: Roll) -> Self {
        Self {
            term: roll.formula().to_string(),
            roll: Box::new(roll),
            options: TermOptions::default(),
        }
    }

    async fn evaluate<R: Roller>(&mut self, session: &mut Session<'_, R>) -> RResult<()> {
        self.roll.evaluate_nested(session).await?;
        Ok(())
    }
}

impl Term for ParentheticalTerm {
    fn formula(&self) -> String {
        self.options.decorate(format!("({})", self.term))
    }

    fn total(&self) -> Option<Number> {
        self.roll.total()
    }

    fn is_deterministic(&self) -> bool {
        self.roll.is_deterministic()
    }

    fn is_intermediate(&self) -> bool {
        true
    }

    fn is_evaluated(&self) -> bool {
        self.roll.is_evaluated()
    }

    fn options(&self) -> &TermOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut TermOptions {
        &mut self.options
    }
}

/// A fragment that could not be classified. Counts as 0 when strings are allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct StringTerm {
    pub term: String,
    pub options: TermOptions,
    pub(crate) evaluated: bool,
}

impl StringTerm {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            options: TermOptions::default(),
            evaluated: false,
        }
    }

    fn evaluate(&mut self, allow_strings: bool) -> RResult<()> {
        if !allow_strings {
            return Err(EvaluationError::UnresolvedString(self.term.clone()).into());
        }
        log::debug!("treating unresolved term {:?} as 0", self.term);
        self.evaluated = true;
        Ok(())
    }
}

impl Term for StringTerm {
    fn formula(&self) -> String {
        self.options.decorate(self.term.clone())
    }

    fn total(&self) -> Option<Number> {
        self.evaluated.then_some(Number::ZERO)
    }

    fn is_deterministic(&self) -> bool {
        true
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
