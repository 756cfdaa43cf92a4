//! Evaluation of a roll's term list: intermediate resolution, string
//! simplification, per-term evaluation and the precedence-correct total.

use super::ctx::RollContext;
use super::dice::DiceTerm;
use super::num::Number;
use super::roller::Roller;
use super::terms::{NumericTerm, RollTerm, StringTerm, Term};
use super::Roll;
use crate::common::*;
use crate::error::{EvaluationError, RResult, RollError};
use crate::fulfillment::{FulfillmentCoordinator, Ticket};
use crate::parse::{self, FormulaSyntaxError};
use serde::{Deserialize, Serialize};

/// Per-evaluation switches.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluateOptions {
    /// Every die shows its lowest face.
    pub minimize: bool,
    /// Every die shows its highest face.
    pub maximize: bool,
    /// Unresolved string terms count as 0 instead of failing.
    pub allow_strings: bool,
    /// Dice configured for an interactive method wait for external results.
    pub allow_interactive: bool,
    /// Synchronous evaluation refuses random dice.
    pub strict: bool,
}

impl EvaluateOptions {
    pub fn minimized() -> Self {
        Self {
            minimize: true,
            ..Default::default()
        }
    }

    pub fn maximized() -> Self {
        Self {
            maximize: true,
            ..Default::default()
        }
    }

    /// Whether every die result is fixed in advance.
    pub fn is_pinned(&self) -> bool {
        self.minimize || self.maximize
    }
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self {
            minimize: false,
            maximize: false,
            allow_strings: false,
            allow_interactive: true,
            strict: true,
        }
    }
}

/// State shared by every term evaluated as part of one top-level roll,
/// nested rolls included.
pub(crate) struct Session<'c, R> {
    pub ctx: &'c mut RollContext<R>,
    pub options: EvaluateOptions,
    pub coordinator: Option<FulfillmentCoordinator>,
    /// Suspending is not an option; interactive dice fail instead.
    pub synchronous: bool,
}

/// How a dice term being evaluated reaches its coordinator.
pub(crate) struct External {
    ticket: Ticket,
    /// Set when the term's results must come from outside.
    method: Option<String>,
}

impl<'c, R: Roller> Session<'c, R> {
    pub fn new(
        ctx: &'c mut RollContext<R>,
        options: EvaluateOptions,
        coordinator: Option<FulfillmentCoordinator>,
        synchronous: bool,
    ) -> Self {
        Self {
            ctx,
            options,
            coordinator,
            synchronous,
        }
    }

    /// Registers a dice term with the coordinator if its denomination has an
    /// external method configured.
    pub fn begin_fulfillment(&self, term: &DiceTerm) -> RResult<Option<External>> {
        let method = match self.ctx.config().fulfillment.external_method(&term.denomination) {
            Some(method) => method,
            None => return Ok(None),
        };
        let interactive =
            self.options.allow_interactive && !self.options.is_pinned() && !term.is_deterministic();
        if interactive && self.synchronous {
            return Err(RollError::synchronous(term.formula()));
        }
        let coordinator = match &self.coordinator {
            Some(c) => c,
            None => return Ok(None),
        };
        let method = interactive.then(|| method.to_string());
        let ticket = coordinator.track(term.denomination, method.as_deref());
        Ok(Some(External { ticket, method }))
    }

    /// Produces one die result: pinned, external or from the roller.
    pub async fn draw(&mut self, denomination: Denomination, external: Option<&External>) -> RResult<Int> {
        self.ctx.count_rolls(1)?;
        if self.options.minimize {
            return Ok(denomination.min_value());
        }
        if self.options.maximize {
            return Ok(denomination.max_value());
        }
        match (external, &self.coordinator) {
            (
                Some(External {
                    ticket,
                    method: Some(method),
                }),
                Some(coordinator),
            ) => coordinator.request(method, denomination, *ticket).await,
            _ => Ok(self.ctx.roll_one(denomination)),
        }
    }

    pub fn end_fulfillment(&self, external: Option<External>) {
        if let (Some(external), Some(coordinator)) = (external, &self.coordinator) {
            coordinator.finish(external.ticket);
        }
    }
}

pub(crate) async fn evaluate_roll<R: Roller>(roll: &mut Roll, session: &mut Session<'_, R>) -> RResult<Number> {
    if roll.evaluated {
        return Err(RollError::AlreadyEvaluated);
    }

    // Nothing is committed to the roll unless every step succeeds.
    let mut terms = roll.terms.clone();
    let mut extra_dice = Vec::new();

    // Functions and parentheticals collapse to plain numbers first.
    for i in 0..terms.len() {
        if !terms[i].is_intermediate() {
            continue;
        }
        if !terms[i].is_evaluated() {
            terms[i].evaluate(session).await?;
        }
        let term = &terms[i];
        let total = term
            .total()
            .ok_or_else(|| EvaluationError::Unevaluated(term.formula()))?;
        extra_dice.extend(term.dice().into_iter().cloned());
        let resolved = NumericTerm::with_options(total, term.options().clone());
        terms[i] = resolved.into();
    }

    let mut terms = simplify_terms(terms);

    // Simplification can turn `(1 + 1)d6` into a random `2d6`.
    if session.synchronous && session.options.strict && !session.options.is_pinned() {
        if let Some(term) = terms.iter().find(|t| !t.is_deterministic()) {
            return Err(RollError::synchronous(term.formula()));
        }
    }

    for term in &mut terms {
        if !term.is_evaluated() {
            term.evaluate(session).await?;
        }
    }

    let total = evaluate_total(&roll.formula, &terms)?;
    log::debug!("{} = {}", roll.formula, total);
    roll.terms = terms;
    roll.extra_dice.extend(extra_dice);
    roll.total = Some(total);
    roll.evaluated = true;
    Ok(total)
}

/// Merges string fragments with their non-operator neighbours and
/// re-classifies the result, then drops operators that cannot apply.
///
/// `(1 + 1)d6` reaches this point as `2` followed by the string `d6`, which
/// merges into the dice term `2d6`.
pub fn simplify_terms(terms: Vec<RollTerm>) -> Vec<RollTerm> {
    let mut simplified: Vec<RollTerm> = Vec::with_capacity(terms.len());
    for term in terms {
        let merge = match simplified.last() {
            Some(RollTerm::String(_)) => term.operator().is_none(),
            Some(prior) => prior.operator().is_none() && matches!(term, RollTerm::String(_)),
            None => false,
        };
        match simplified.pop() {
            Some(prior) if merge => simplified.push(merge_strings(prior, term)),
            Some(prior) => {
                simplified.push(prior);
                simplified.push(term);
            }
            None => simplified.push(term),
        }
    }

    let mut simplified: Vec<RollTerm> = simplified
        .into_iter()
        .map(|term| match term {
            RollTerm::String(s) => {
                let mut classified = parse::classify(&s.term);
                classified.options_mut().merge(&s.options);
                classified
            }
            other => other,
        })
        .collect();

    if matches!(simplified.first().and_then(RollTerm::operator), Some(op) if op != Operator::Sub) {
        simplified.remove(0);
    }
    if simplified.last().map_or(false, |t| t.operator().is_some()) {
        simplified.pop();
    }
    simplified
}

fn merge_strings(prior: RollTerm, next: RollTerm) -> RollTerm {
    let mut options = prior.options().clone();
    options.merge(next.options());
    let term = format!("{}{}", fragment(&prior), fragment(&next));
    let mut merged = StringTerm::new(term);
    merged.options = options;
    merged.into()
}

/// The text a term contributes to a merged string.
fn fragment(term: &RollTerm) -> String {
    match term {
        RollTerm::String(s) => s.term.clone(),
        other => match other.total() {
            Some(total) => total.to_string(),
            None => {
                let mut bare = other.clone();
                bare.options_mut().flavor = None;
                bare.formula()
            }
        },
    }
}

/// Combines evaluated terms with operator precedence.
pub fn evaluate_total(formula: &str, terms: &[RollTerm]) -> RResult<Number> {
    let ast = parse::to_ast(terms.iter()).map_err(|e| {
        let fragment = terms.get(e.index).map(Term::formula).unwrap_or_default();
        FormulaSyntaxError::at_fragment(formula, &fragment, e.kind)
    })?;
    ast.evaluate(
        |term| {
            term.total()
                .ok_or_else(|| RollError::from(EvaluationError::Unevaluated(term.formula())))
        },
        |op, l, r| l.apply(op, r).map_err(RollError::from),
    )
}
