//! Dice modifiers and the result-flagging algorithms behind them.
//!
//! Modifiers never remove results. Discarded results stay in the array with
//! `active == false`; rerolled and exploded results are flagged in place and
//! followed by the newly drawn entries.

use super::dice::DiceResult;
use crate::common::*;
use std::fmt;
use std::ops::RangeInclusive;

/// A `(comparison, target)` pair such as `>=5`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Condition {
    pub comparison: Comparison,
    pub target: Int,
}

impl Condition {
    pub const fn new(comparison: Comparison, target: Int) -> Self {
        Self { comparison, target }
    }

    pub fn matches(&self, value: Int) -> bool {
        self.comparison.compare(value, self.target)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.comparison == Comparison::Eq {
            write!(f, "{}", self.target)
        } else {
            write!(f, "{}{}", self.comparison, self.target)
        }
    }
}

/// Which modifier commands a term accepts.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ModifierSet {
    Die,
    Coin,
    Fate,
    Pool,
}

impl ModifierSet {
    pub const fn for_denomination(d: &Denomination) -> Self {
        match d {
            Denomination::Die(_) => Self::Die,
            Denomination::Coin => Self::Coin,
            Denomination::Fate => Self::Fate,
        }
    }

    fn allows(&self, command: &str) -> bool {
        const KEEP_DROP: &[&str] = &["k", "kh", "kl", "d", "dh", "dl"];
        const DIE: &[&str] = &[
            "r", "rr", "x", "xo", "min", "max", "cs", "cf", "df", "sf", "ms", "even", "odd",
        ];
        match self {
            Self::Die => KEEP_DROP.contains(&command) || DIE.contains(&command),
            Self::Coin => command == "c",
            Self::Fate => KEEP_DROP.contains(&command) || command == "r" || command == "rr",
            Self::Pool => KEEP_DROP.contains(&command) || command == "cs" || command == "cf",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ModifierKind {
    Reroll { recursive: bool, condition: Option<Condition> },
    Explode { recursive: bool, condition: Option<Condition> },
    KeepDrop { keep: bool, highest: bool, number: usize },
    Minimum(Int),
    Maximum(Int),
    CountSuccess(Option<Condition>),
    CountFailures(Option<Condition>),
    DeductFailures(Option<Condition>),
    SubtractFailures(Option<Condition>),
    MarginSuccess(Condition),
    CountEven,
    CountOdd,
    Call(Int),
}

impl ModifierKind {
    /// Whether applying this modifier may draw new dice.
    pub const fn draws_dice(&self) -> bool {
        matches!(self, Self::Reroll { .. } | Self::Explode { .. })
    }
}

/// One parsed modifier, remembering the text it was written as.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Modifier {
    pub raw: String,
    pub kind: ModifierKind,
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Modifier {
    /// Splits a modifier suffix such as `kh1rr<2` into individual modifiers.
    ///
    /// On failure the offending chunk is returned.
    pub fn parse_all(s: &str, set: ModifierSet) -> Result<Vec<Self>, String> {
        split_modifiers(s)?
            .into_iter()
            .map(|chunk| Self::parse(chunk, set).ok_or_else(|| chunk.to_string()))
            .collect()
    }

    pub fn parse(chunk: &str, set: ModifierSet) -> Option<Self> {
        let split = chunk
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(chunk.len());
        let (command, args) = chunk.split_at(split);
        let command = command.to_ascii_lowercase();
        if !set.allows(&command) {
            return None;
        }
        let (comparison, target) = parse_args(args)?;
        let condition = match (comparison, target) {
            (c, Some(t)) => Some(Condition::new(c.unwrap_or(Comparison::Eq), t)),
            (None, None) => None,
            (Some(_), None) => return None,
        };
        let count = |default: usize| -> Option<usize> {
            match (comparison, target) {
                (None, None) => Some(default),
                (None, Some(t)) => usize::try_from(t).ok(),
                _ => None,
            }
        };
        let number = || match (comparison, target) {
            (None, Some(t)) => Some(t),
            _ => None,
        };

        use ModifierKind::*;
        let kind = match command.as_str() {
            "r" => Reroll { recursive: false, condition },
            "rr" => Reroll { recursive: true, condition },
            "x" => Explode { recursive: true, condition },
            "xo" => Explode { recursive: false, condition },
            "k" | "kh" => KeepDrop { keep: true, highest: true, number: count(1)? },
            "kl" => KeepDrop { keep: true, highest: false, number: count(1)? },
            "d" | "dl" => KeepDrop { keep: false, highest: false, number: count(1)? },
            "dh" => KeepDrop { keep: false, highest: true, number: count(1)? },
            "min" => Minimum(number()?),
            "max" => Maximum(number()?),
            "cs" => CountSuccess(condition),
            "cf" => CountFailures(condition),
            "df" => DeductFailures(condition),
            "sf" => SubtractFailures(condition),
            "ms" => MarginSuccess(condition?),
            "even" if condition.is_none() => CountEven,
            "odd" if condition.is_none() => CountOdd,
            "c" => Call(match (comparison, target) {
                (None, None) => 1,
                (None, Some(t @ 0..=1)) => t,
                _ => return None,
            }),
            _ => return None,
        };
        Some(Self {
            raw: chunk.to_string(),
            kind,
        })
    }
}

/// Breaks a suffix into `letters[args]` chunks.
fn split_modifiers(s: &str) -> Result<Vec<&str>, String> {
    let mut chunks = Vec::new();
    let mut rest = s;
    while !rest.is_empty() {
        let letters = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        if letters == 0 {
            return Err(rest.to_string());
        }
        let end = rest[letters..]
            .find(|c: char| c.is_ascii_alphabetic())
            .map_or(rest.len(), |i| i + letters);
        chunks.push(&rest[..end]);
        rest = &rest[end..];
    }
    Ok(chunks)
}

fn parse_args(args: &str) -> Option<(Option<Comparison>, Option<Int>)> {
    let digits = args
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(args.len());
    let (cmp, num) = args.split_at(digits);
    let comparison = if cmp.is_empty() {
        None
    } else {
        Some(cmp.parse().ok()?)
    };
    let target = if num.is_empty() {
        None
    } else {
        Some(num.parse().ok()?)
    };
    Some((comparison, target))
}

/// Marks the `number` highest or lowest active results as kept or dropped.
///
/// Ties keep their original roll order: the earlier of two equal results ranks
/// first, so it is the one kept by `kh`/`kl` and the one dropped by `dh`/`dl`.
pub fn keep_or_drop(results: &mut [DiceResult], number: usize, keep: bool, highest: bool) {
    let mut ranked: Vec<usize> = (0..results.len()).filter(|&i| results[i].active).collect();
    ranked.sort_by(|&a, &b| {
        let (x, y) = (results[a].result, results[b].result);
        if highest {
            y.cmp(&x)
        } else {
            x.cmp(&y)
        }
    });
    let cut = number.min(ranked.len());
    let (selected, rest) = ranked.split_at(cut);
    let discard = if keep { rest } else { selected };
    for &i in discard {
        results[i].discard();
    }
}

/// Counts matching active results as 1 and the rest as 0.
pub fn apply_count(results: &mut [DiceResult], condition: Condition, flag_failure: bool) {
    for r in results.iter_mut().filter(|r| r.active) {
        let hit = condition.matches(r.result);
        if flag_failure {
            r.failure = Some(hit);
            if hit {
                r.success = None;
            }
        } else {
            r.success = Some(hit);
            if hit {
                r.failure = None;
            }
        }
        r.count = Some(hit as Int);
    }
}

/// Flags failures and makes them subtract from the total.
///
/// Without a condition, results already counted as non-successes become the
/// failures. `invert` subtracts a failure's face value instead of one.
pub fn apply_deduct(results: &mut [DiceResult], condition: Option<Condition>, invert: bool) {
    for r in results.iter_mut().filter(|r| r.active) {
        let failed = match condition {
            Some(c) => c.matches(r.result),
            None => r.success == Some(false),
        };
        if failed {
            r.failure = Some(true);
            r.success = None;
            r.count = Some(if invert { r.result.saturating_neg() } else { -1 });
        }
    }
}

pub fn apply_margin(results: &mut [DiceResult], condition: Condition) {
    for r in results.iter_mut().filter(|r| r.active) {
        let value = r.value();
        r.count = Some(match condition.comparison {
            Comparison::Lt | Comparison::Le => condition.target.saturating_sub(value),
            _ => value.saturating_sub(condition.target),
        });
    }
}

pub fn apply_parity(results: &mut [DiceResult], even: bool) {
    for r in results.iter_mut().filter(|r| r.active) {
        let hit = (r.result % 2 == 0) == even;
        r.success = Some(hit);
        r.count = Some(hit as Int);
    }
}

pub fn apply_clamp(results: &mut [DiceResult], min: Option<Int>, max: Option<Int>) {
    for r in results.iter_mut() {
        if let Some(min) = min {
            r.result = r.result.max(min);
        }
        if let Some(max) = max {
            r.result = r.result.min(max);
        }
    }
}

/// Applies a modifier that does not draw new dice.
///
/// `values` is the range a single result can take, used for default targets.
/// Reroll and explode are left to the caller and ignored here.
pub fn apply_in_place(results: &mut [DiceResult], kind: &ModifierKind, values: RangeInclusive<Int>) {
    use ModifierKind::*;
    let (min, max) = values.into_inner();
    match kind {
        Reroll { .. } | Explode { .. } => {}
        KeepDrop { keep, highest, number } => keep_or_drop(results, *number, *keep, *highest),
        Minimum(x) => apply_clamp(results, Some(*x), None),
        Maximum(x) => apply_clamp(results, None, Some(*x)),
        CountSuccess(c) => apply_count(results, c.unwrap_or(Condition::new(Comparison::Ge, max)), false),
        CountFailures(c) => apply_count(results, c.unwrap_or(Condition::new(Comparison::Eq, min)), true),
        DeductFailures(c) => apply_deduct(results, *c, false),
        SubtractFailures(c) => apply_deduct(results, *c, true),
        MarginSuccess(c) => apply_margin(results, *c),
        CountEven => apply_parity(results, true),
        CountOdd => apply_parity(results, false),
        Call(call) => {
            for r in results.iter_mut().filter(|r| r.active) {
                let hit = r.result == *call;
                r.success = Some(hit);
                r.count = Some(hit as Int);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(values: &[Int]) -> Vec<DiceResult> {
        values.iter().copied().map(DiceResult::new).collect()
    }

    fn active(results: &[DiceResult]) -> Vec<Int> {
        results.iter().filter(|r| r.active).map(|r| r.result).collect()
    }

    #[test]
    fn test_keep_highest_ties_by_roll_order() {
        let mut rs = results(&[5, 3, 5, 1]);
        keep_or_drop(&mut rs, 2, true, true);
        assert_eq!(active(&rs), vec![5, 5]);
        assert!(rs[1].discarded && rs[3].discarded);
        assert_eq!(rs.len(), 4);

        let mut rs = results(&[5, 3, 5]);
        keep_or_drop(&mut rs, 1, true, true);
        assert!(rs[0].active);
        assert!(!rs[2].active);
    }

    #[test]
    fn test_drop_lowest() {
        let mut rs = results(&[4, 2, 6, 2]);
        keep_or_drop(&mut rs, 1, false, false);
        assert_eq!(active(&rs), vec![4, 6, 2]);
        assert!(rs[1].discarded);
    }

    #[test]
    fn test_keep_more_than_rolled() {
        let mut rs = results(&[1, 2]);
        keep_or_drop(&mut rs, 5, true, false);
        assert_eq!(active(&rs), vec![1, 2]);
    }

    #[test]
    fn test_count_and_deduct() {
        let mut rs = results(&[6, 1, 4, 5]);
        apply_count(&mut rs, Condition::new(Comparison::Ge, 5), false);
        assert_eq!(rs.iter().map(DiceResult::value).collect::<Vec<_>>(), vec![1, 0, 0, 1]);

        apply_deduct(&mut rs, Some(Condition::new(Comparison::Eq, 1)), false);
        assert_eq!(rs[1].count, Some(-1));
        assert_eq!(rs[1].failure, Some(true));
        assert_eq!(rs.iter().map(DiceResult::value).sum::<Int>(), 1);
    }

    #[test]
    fn test_subtract_failures_without_condition() {
        let mut rs = results(&[3, 6]);
        apply_count(&mut rs, Condition::new(Comparison::Ge, 5), false);
        apply_deduct(&mut rs, None, true);
        assert_eq!(rs[0].count, Some(-3));
        assert_eq!(rs[1].count, Some(1));
    }

    #[test]
    fn test_margin() {
        let mut rs = results(&[14]);
        apply_margin(&mut rs, Condition::new(Comparison::Ge, 10));
        assert_eq!(rs[0].value(), 4);
        let mut rs = results(&[14]);
        apply_margin(&mut rs, Condition::new(Comparison::Le, 10));
        assert_eq!(rs[0].value(), -4);
    }

    #[test]
    fn test_coin_call() {
        let mut rs = results(&[1, 0, 1]);
        apply_in_place(&mut rs, &ModifierKind::Call(0), 0..=1);
        assert_eq!(rs.iter().map(DiceResult::value).sum::<Int>(), 1);
    }

    #[test]
    fn test_clamp_keeps_every_result() {
        let mut rs = results(&[1, 6, 3]);
        apply_in_place(&mut rs, &ModifierKind::Minimum(2), 1..=6);
        apply_in_place(&mut rs, &ModifierKind::Maximum(5), 1..=6);
        assert_eq!(active(&rs), vec![2, 5, 3]);
    }

    #[test]
    fn test_parse_modifiers() {
        let mods = Modifier::parse_all("kh2rr<3cs>=5", ModifierSet::Die).unwrap();
        assert_eq!(mods.len(), 3);
        assert_eq!(mods[0].kind, ModifierKind::KeepDrop { keep: true, highest: true, number: 2 });
        assert_eq!(
            mods[1].kind,
            ModifierKind::Reroll { recursive: true, condition: Some(Condition::new(Comparison::Lt, 3)) }
        );
        assert_eq!(mods[2].kind, ModifierKind::CountSuccess(Some(Condition::new(Comparison::Ge, 5))));
        assert_eq!(mods.iter().map(ToString::to_string).collect::<String>(), "kh2rr<3cs>=5");
    }

    #[test]
    fn test_parse_defaults() {
        let mods = Modifier::parse_all("kxmin2", ModifierSet::Die);
        assert_eq!(mods, Err("kxmin2".to_string()));
        let mods = Modifier::parse_all("k", ModifierSet::Die).unwrap();
        assert_eq!(mods[0].kind, ModifierKind::KeepDrop { keep: true, highest: true, number: 1 });
        let mods = Modifier::parse_all("x", ModifierSet::Die).unwrap();
        assert_eq!(mods[0].kind, ModifierKind::Explode { recursive: true, condition: None });
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(Modifier::parse_all("kh>", ModifierSet::Die), Err("kh>".to_string()));
        assert_eq!(Modifier::parse_all("q2", ModifierSet::Die), Err("q2".to_string()));
        assert_eq!(Modifier::parse_all("x", ModifierSet::Fate), Err("x".to_string()));
        assert_eq!(Modifier::parse_all("ms", ModifierSet::Die), Err("ms".to_string()));
        assert_eq!(Modifier::parse_all("k<2", ModifierSet::Die), Err("k<2".to_string()));
        assert!(Modifier::parse_all("c0", ModifierSet::Coin).is_ok());
        assert!(Modifier::parse_all("cs>3", ModifierSet::Pool).is_ok());
        assert!(Modifier::parse_all("rr", ModifierSet::Pool).is_err());
    }
}
