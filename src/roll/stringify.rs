use super::dice::{DiceResult, DiceTerm};
use super::num::Number;
use super::terms::{PoolTerm, RollTerm, Term};
use super::Roll;
use crate::common::*;
use crate::error::{EvaluationError, RResult};

fn total_of<T: Term>(term: &T) -> RResult<Number> {
    term.total()
        .ok_or_else(|| EvaluationError::Unevaluated(term.formula()).into())
}

/// Renders an evaluated roll. The default methods replace every term with its
/// value, e.g. `14 + 4`.
pub trait Stringify {
    fn stringify(&mut self, roll: &Roll) -> RResult<String> {
        self.str_roll(roll)
    }

    fn str_roll(&mut self, roll: &Roll) -> RResult<String> {
        self.str_terms(&roll.terms)
    }

    fn str_terms(&mut self, terms: &[RollTerm]) -> RResult<String> {
        let mut ret = String::new();
        for (i, term) in terms.iter().enumerate() {
            match term.operator() {
                Some(op) if i == 0 => ret.push(op.as_char()),
                Some(op) => ret.push_str(&format!(" {} ", op)),
                None => ret.push_str(&self.str_term(term)?),
            }
        }
        Ok(ret)
    }

    fn str_term(&mut self, term: &RollTerm) -> RResult<String> {
        match term {
            RollTerm::Dice(d) => self.str_dice(d),
            RollTerm::Pool(p) => self.str_pool(p),
            other => total_of(other).map(|x| x.to_string()),
        }
    }

    fn str_dice(&mut self, dice: &DiceTerm) -> RResult<String> {
        total_of(dice).map(|x| x.to_string())
    }

    fn str_pool(&mut self, pool: &PoolTerm) -> RResult<String> {
        total_of(pool).map(|x| x.to_string())
    }
}

#[derive(Default)]
pub struct SimpleStringifier;

impl SimpleStringifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stringify for SimpleStringifier {}

/// Shows every die next to its term, Markdown-style: discarded results are
/// ~~struck~~, highest and lowest faces **bold**, explosions marked with `!`.
#[derive(Default)]
pub struct BreakdownStringifier;

impl BreakdownStringifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn fmt_result(&self, r: &DiceResult, critical: bool) -> String {
        let mut ret = match r.count {
            Some(count) if count != r.result => format!("{} ({})", r.result, count),
            _ => r.result.to_string(),
        };
        if r.exploded {
            ret.push('!');
        }
        if critical {
            ret = format!("**{}**", ret);
        }
        if !r.active {
            ret = format!("~~{}~~", ret);
        }
        ret
    }

    fn fmt_results<'a>(&self, results: impl Iterator<Item = (&'a DiceResult, bool)>) -> String {
        results
            .map(|(r, critical)| self.fmt_result(r, critical))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Stringify for BreakdownStringifier {
    fn str_roll(&mut self, roll: &Roll) -> RResult<String> {
        let terms = self.str_terms(&roll.terms)?;
        let total = roll
            .total()
            .ok_or_else(|| EvaluationError::Unevaluated(roll.formula().to_string()))?;
        Ok(format!("{} = `{}`", terms, total))
    }

    fn str_dice(&mut self, dice: &DiceTerm) -> RResult<String> {
        total_of(dice)?;
        let critical = |r: &DiceResult| match dice.denomination {
            Denomination::Die(_) => dice.denomination.values().end() == &r.result || r.result == 1,
            _ => false,
        };
        let results = self.fmt_results(dice.results.iter().map(|r| (r, critical(r))));
        Ok(format!("{} ({})", dice.formula(), results))
    }

    fn str_pool(&mut self, pool: &PoolTerm) -> RResult<String> {
        total_of(pool)?;
        let results = self.fmt_results(pool.results.iter().map(|r| (r, false)));
        Ok(format!("{} ({})", pool.formula(), results))
    }
}
