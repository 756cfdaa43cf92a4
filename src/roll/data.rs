//! Plain-record form of rolls and terms, discriminated by `class`.

use super::dice::{DiceResult, DiceTerm};
use super::eval;
use super::modifiers::{Modifier, ModifierSet};
use super::num::Number;
use super::terms::*;
use super::Roll;
use crate::common::*;
use crate::error::{RResult, RollError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ROLL_CLASS: &str = "Roll";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollData {
    pub class: String,
    pub formula: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub options: TermOptions,
    pub terms: Vec<TermData>,
    #[serde(default)]
    pub total: Option<Number>,
    #[serde(default)]
    pub evaluated: bool,
    /// Dice of intermediate terms that were collapsed during evaluation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dice: Vec<TermData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum TermData {
    NumericTerm {
        number: Number,
        #[serde(default)]
        options: TermOptions,
    },
    OperatorTerm {
        operator: Operator,
        #[serde(default)]
        options: TermOptions,
    },
    Die {
        number: usize,
        faces: UInt,
        #[serde(flatten)]
        dice: DiceData,
    },
    Coin {
        number: usize,
        #[serde(flatten)]
        dice: DiceData,
    },
    FateDie {
        number: usize,
        #[serde(flatten)]
        dice: DiceData,
    },
    PoolTerm {
        terms: Vec<String>,
        rolls: Vec<RollData>,
        #[serde(flatten)]
        dice: DiceData,
    },
    FunctionTerm {
        #[serde(rename = "fn")]
        function: String,
        terms: Vec<String>,
        rolls: Vec<RollData>,
        #[serde(default)]
        result: Option<Number>,
        #[serde(default)]
        options: TermOptions,
    },
    ParentheticalTerm {
        term: String,
        roll: Box<RollData>,
        #[serde(default)]
        options: TermOptions,
    },
    StringTerm {
        term: String,
        #[serde(default)]
        options: TermOptions,
        #[serde(default)]
        evaluated: bool,
    },
}

/// Fields shared by every term holding a result array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiceData {
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub results: Vec<DiceResult>,
    #[serde(default)]
    pub options: TermOptions,
    #[serde(default)]
    pub evaluated: bool,
}

impl DiceData {
    fn new(modifiers: &[Modifier], results: &[DiceResult], options: &TermOptions, evaluated: bool) -> Self {
        Self {
            modifiers: modifiers.iter().map(ToString::to_string).collect(),
            results: results.to_vec(),
            options: options.clone(),
            evaluated,
        }
    }

    fn modifiers(&self, set: ModifierSet) -> RResult<Vec<Modifier>> {
        self.modifiers
            .iter()
            .map(|m| Modifier::parse(m, set).ok_or_else(|| RollError::invalid_data(format!("invalid modifier {:?}", m))))
            .collect()
    }

    fn into_dice(self, number: usize, denomination: Denomination) -> RResult<DiceTerm> {
        let modifiers = self.modifiers(ModifierSet::for_denomination(&denomination))?;
        Ok(DiceTerm {
            number,
            denomination,
            modifiers,
            results: self.results,
            options: self.options,
            evaluated: self.evaluated,
        })
    }
}

impl From<&DiceTerm> for TermData {
    fn from(d: &DiceTerm) -> Self {
        let dice = DiceData::new(&d.modifiers, &d.results, &d.options, d.evaluated);
        match d.denomination {
            Denomination::Die(faces) => Self::Die {
                number: d.number,
                faces,
                dice,
            },
            Denomination::Coin => Self::Coin { number: d.number, dice },
            Denomination::Fate => Self::FateDie { number: d.number, dice },
        }
    }
}

impl From<&RollTerm> for TermData {
    fn from(term: &RollTerm) -> Self {
        match term {
            RollTerm::Numeric(n) => Self::NumericTerm {
                number: n.number,
                options: n.options.clone(),
            },
            RollTerm::Operator(op) => Self::OperatorTerm {
                operator: op.operator,
                options: op.options.clone(),
            },
            RollTerm::Dice(d) => d.into(),
            RollTerm::Pool(p) => Self::PoolTerm {
                terms: p.terms.clone(),
                rolls: p.rolls.iter().map(RollData::from).collect(),
                dice: DiceData::new(&p.modifiers, &p.results, &p.options, p.evaluated),
            },
            RollTerm::Function(f) => Self::FunctionTerm {
                function: f.function.clone(),
                terms: f.terms.clone(),
                rolls: f.rolls.iter().map(RollData::from).collect(),
                result: f.result,
                options: f.options.clone(),
            },
            RollTerm::Parenthetical(p) => Self::ParentheticalTerm {
                term: p.term.clone(),
                roll: Box::new(RollData::from(&*p.roll)),
                options: p.options.clone(),
            },
            RollTerm::String(s) => Self::StringTerm {
                term: s.term.clone(),
                options: s.options.clone(),
                evaluated: s.evaluated,
            },
        }
    }
}

impl TryFrom<TermData> for RollTerm {
    type Error = RollError;

    fn try_from(data: TermData) -> RResult<Self> {
        Ok(match data {
            TermData::NumericTerm { number, options } => NumericTerm::with_options(number, options).into(),
            TermData::OperatorTerm { operator, options } => OperatorTerm { operator, options }.into(),
            TermData::Die { number, faces, dice } => {
                if faces == 0 {
                    return Err(RollError::invalid_data("dice need at least one face"));
                }
                dice.into_dice(number, Denomination::Die(faces))?.into()
            }
            TermData::Coin { number, dice } => dice.into_dice(number, Denomination::Coin)?.into(),
            TermData::FateDie { number, dice } => dice.into_dice(number, Denomination::Fate)?.into(),
            TermData::PoolTerm { terms, rolls, dice } => PoolTerm {
                terms,
                rolls: rolls.into_iter().map(Roll::from_data).collect::<RResult<_>>()?,
                modifiers: dice.modifiers(ModifierSet::Pool)?,
                results: dice.results,
                options: dice.options,
                evaluated: dice.evaluated,
            }
            .into(),
            TermData::FunctionTerm {
                function,
                terms,
                rolls,
                result,
                options,
            } => FunctionTerm {
                function,
                terms,
                rolls: rolls.into_iter().map(Roll::from_data).collect::<RResult<_>>()?,
                result,
                options,
            }
            .into(),
            TermData::ParentheticalTerm { term, roll, options } => ParentheticalTerm {
                term,
                roll: Box::new(Roll::from_data(*roll)?),
                options,
            }
            .into(),
            TermData::StringTerm { term, options, evaluated } => StringTerm {
                term,
                options,
                evaluated,
            }
            .into(),
        })
    }
}

impl From<&Roll> for RollData {
    fn from(roll: &Roll) -> Self {
        Self {
            class: ROLL_CLASS.to_string(),
            formula: roll.formula.clone(),
            data: roll.data.clone(),
            options: roll.options.clone(),
            terms: roll.terms.iter().map(TermData::from).collect(),
            total: roll.total,
            evaluated: roll.evaluated,
            dice: roll.extra_dice.iter().map(TermData::from).collect(),
        }
    }
}

impl Roll {
    pub fn to_data(&self) -> RollData {
        self.into()
    }

    /// Rebuilds a roll from its record. Unknown classes are rejected.
    pub fn from_data(data: RollData) -> RResult<Self> {
        if data.class != ROLL_CLASS {
            return Err(RollError::invalid_data(format!("expected class {:?}, found {:?}", ROLL_CLASS, data.class)));
        }
        let terms = data
            .terms
            .into_iter()
            .map(RollTerm::try_from)
            .collect::<RResult<Vec<_>>>()?;
        let extra_dice = data
            .dice
            .into_iter()
            .map(|d| match RollTerm::try_from(d)? {
                RollTerm::Dice(d) => Ok(d),
                other => Err(RollError::invalid_data(format!("{} is not a dice term", other.formula()))),
            })
            .collect::<RResult<Vec<_>>>()?;

        let total = match (data.evaluated, data.total) {
            (true, None) => Some(eval::evaluate_total(&data.formula, &terms)?),
            (_, total) => total,
        };
        Ok(Self {
            formula: data.formula,
            data: data.data,
            options: data.options,
            terms,
            total,
            evaluated: data.evaluated,
            extra_dice,
            coordinator: None,
        })
    }

    pub fn to_json(&self) -> RResult<String> {
        Ok(serde_json::to_string(&self.to_data())?)
    }

    pub fn from_json(s: &str) -> RResult<Self> {
        Self::from_data(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roll::ctx::RollContext;
    use crate::roll::roller::StepRoller;
    use crate::roll::EvaluateOptions;
    use serde_json::json;

    #[test]
    fn test_term_records() {
        let roll = Roll::new("2d6kh1[fire] + max(1, 2) - dc").unwrap();
        let data = roll.to_data();
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["class"], "Roll");
        assert_eq!(value["terms"][0]["class"], "Die");
        assert_eq!(value["terms"][0]["faces"], 6);
        assert_eq!(value["terms"][0]["modifiers"], json!(["kh1"]));
        assert_eq!(value["terms"][0]["options"]["flavor"], "fire");
        assert_eq!(value["terms"][1], json!({ "class": "OperatorTerm", "operator": "+", "options": {} }));
        assert_eq!(value["terms"][2]["class"], "FunctionTerm");
        assert_eq!(value["terms"][2]["fn"], "max");
        assert_eq!(value["terms"][4]["class"], "Coin");
    }

    #[test]
    fn test_evaluated_roll_survives_json() {
        let mut ctx = RollContext::with_roller(StepRoller::new(2, 1));
        let mut roll = Roll::new("{1d4, 3}kh + (1d6 * 2)").unwrap();
        let total = roll.evaluate_sync(&mut ctx, EvaluateOptions { strict: false, ..Default::default() }).unwrap();

        let restored = Roll::from_json(&roll.to_json().unwrap()).unwrap();
        assert!(restored.is_evaluated());
        assert_eq!(restored.total(), Some(total));
        assert_eq!(restored.formula(), roll.formula());
        assert_eq!(restored.dice().len(), roll.dice().len());
        assert_eq!(restored.to_data(), roll.to_data());
    }

    #[test]
    fn test_rejects_unknown_class() {
        let err = Roll::from_json(r#"{ "class": "Roll", "formula": "1", "terms": [{ "class": "Mystery" }] }"#);
        assert!(matches!(err, Err(RollError::InvalidData(_))));

        let err = Roll::from_json(r#"{ "class": "Chat", "formula": "1", "terms": [] }"#);
        assert!(matches!(err, Err(RollError::InvalidData(_))));

        let err = Roll::from_json(
            r#"{ "class": "Roll", "formula": "1d6", "terms": [{ "class": "Die", "number": 1, "faces": 6, "modifiers": ["zz"] }] }"#,
        );
        assert!(matches!(err, Err(RollError::InvalidData(_))));
    }

    #[test]
    fn test_total_recomputed_when_missing() {
        let roll = Roll::from_json(
            r#"{
                "class": "Roll",
                "formula": "1d6 + 2",
                "evaluated": true,
                "terms": [
                    { "class": "Die", "number": 1, "faces": 6, "results": [{ "result": 4 }], "evaluated": true },
                    { "class": "OperatorTerm", "operator": "+" },
                    { "class": "NumericTerm", "number": 2 }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(roll.total(), Some(Number::Int(6)));
    }
}
