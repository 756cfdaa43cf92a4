use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};
use std::ops::RangeInclusive;
use std::str::FromStr;

pub type Int = i64;
pub type UInt = u32;

pub type Float = f64;

pub type NonEmpty<T> = vec1::Vec1<T>;

/// The kind of die a dice term rolls.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Denomination {
    /// A numbered die with the given face count.
    Die(UInt),
    /// A two-sided coin, 0 (tails) or 1 (heads).
    Coin,
    /// A three-sided fate die, -1, 0 or +1.
    Fate,
}

impl Denomination {
    /// Number of faces the random source has to pick from.
    pub const fn faces(&self) -> UInt {
        match self {
            Self::Die(n) => *n,
            Self::Coin => 2,
            Self::Fate => 3,
        }
    }

    /// Maps a raw face in `1..=faces` onto the value the die reports.
    pub const fn map_face(&self, face: UInt) -> Int {
        match self {
            Self::Die(_) => face as Int,
            Self::Coin => face as Int - 1,
            Self::Fate => face as Int - 2,
        }
    }

    pub const fn min_value(&self) -> Int {
        self.map_face(1)
    }

    pub const fn max_value(&self) -> Int {
        self.map_face(self.faces())
    }

    /// The range of values a fulfilled result may take.
    pub const fn values(&self) -> RangeInclusive<Int> {
        self.min_value()..=self.max_value()
    }

    /// The term-class name used in serialized records.
    pub const fn class_name(&self) -> &'static str {
        match self {
            Self::Die(_) => "Die",
            Self::Coin => "Coin",
            Self::Fate => "FateDie",
        }
    }
}

impl fmt::Display for Denomination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Die(n) => write!(f, "d{}", n),
            Self::Coin => f.write_str("dc"),
            Self::Fate => f.write_str("df"),
        }
    }
}

impl FromStr for Denomination {
    type Err = String;

    /// Parses the part after the `d`, e.g. `20`, `c` or `f`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "c" | "C" => Ok(Self::Coin),
            "f" | "F" => Ok(Self::Fate),
            _ => match s.parse::<UInt>() {
                Ok(0) | Err(_) => Err(format!("'{}' is not a valid die denomination", s)),
                Ok(n) => Ok(Self::Die(n)),
            },
        }
    }
}

/// Arithmetic operators allowed between terms.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Rem,
}

impl Operator {
    /// Binding strength used by the shunting-yard builder.
    pub const fn precedence(&self) -> u8 {
        match self {
            Self::Add | Self::Sub => 10,
            Self::Mul | Self::Div | Self::Rem => 20,
        }
    }

    pub const fn is_additive(&self) -> bool {
        matches!(self, Self::Add | Self::Sub)
    }

    pub const fn as_char(&self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
            Self::Rem => '%',
        }
    }

    pub const fn from_char(c: char) -> Option<Self> {
        Some(match c {
            '+' => Self::Add,
            '-' => Self::Sub,
            '*' => Self::Mul,
            '/' => Self::Div,
            '%' => Self::Rem,
            _ => return None,
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char(self.as_char())
    }
}

/// Comparison used by reroll, explode and counting modifiers.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Comparison {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn compare(&self, value: Int, target: Int) -> bool {
        match self {
            Self::Eq => value == target,
            Self::Lt => value < target,
            Self::Le => value <= target,
            Self::Gt => value > target,
            Self::Ge => value >= target,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparison {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "=" | "==" => Self::Eq,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            _ => return Err(()),
        })
    }
}
