use super::num::Number;
use crate::common::Float;
use crate::error::EvaluationError;
use std::collections::HashMap;
use std::fmt;

pub type FunctionResult = Result<Number, EvaluationError>;

/// A function callable from a formula as `name(arg, ...)`.
pub type RollFunction = Box<dyn Fn(&[Number]) -> FunctionResult>;

/// Named functions available to function terms.
pub struct FunctionRegistry {
    functions: HashMap<String, RollFunction>,
}

impl FunctionRegistry {
    /// A registry without any functions.
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Number]) -> FunctionResult + 'static,
    {
        self.functions.insert(name.into(), Box::new(f));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn call(&self, name: &str, args: &[Number]) -> FunctionResult {
        let f = self
            .functions
            .get(name)
            .ok_or_else(|| EvaluationError::UnknownFunction(name.to_string()))?;
        f(args)
    }

    fn unary(&mut self, name: &'static str, f: fn(Float) -> Float) {
        self.register(name, move |args| match args {
            [x] => finite(name, f(x.as_float())),
            _ => Err(arity(name, "exactly 1", args.len())),
        });
    }

    fn binary(&mut self, name: &'static str, f: fn(Float, Float) -> Float) {
        self.register(name, move |args| match args {
            [x, y] => finite(name, f(x.as_float(), y.as_float())),
            _ => Err(arity(name, "exactly 2", args.len())),
        });
    }

    fn fold(&mut self, name: &'static str, f: fn(Number, Number) -> Number) {
        self.register(name, move |args| match args {
            [first, rest @ ..] => Ok(rest.iter().copied().fold(*first, f)),
            [] => Err(arity(name, "at least 1", 0)),
        });
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        let mut ret = Self::empty();
        ret.register("abs", |args| match args {
            [x] if *x < Number::ZERO => Ok(-*x),
            [x] => Ok(*x),
            _ => Err(arity("abs", "exactly 1", args.len())),
        });
        ret.unary("ceil", Float::ceil);
        ret.unary("floor", Float::floor);
        ret.unary("round", Float::round);
        ret.unary("trunc", Float::trunc);
        ret.unary("sign", |x| if x == 0.0 { 0.0 } else { x.signum() });
        ret.unary("sqrt", Float::sqrt);
        ret.unary("cbrt", Float::cbrt);
        ret.unary("exp", Float::exp);
        ret.unary("log", Float::ln);
        ret.unary("log2", Float::log2);
        ret.unary("log10", Float::log10);
        ret.binary("pow", Float::powf);
        ret.fold("min", |a, b| if b < a { b } else { a });
        ret.fold("max", |a, b| if b > a { b } else { a });
        ret.register("hypot", |args| {
            let sum: Float = args.iter().map(|x| x.as_float().powi(2)).sum();
            finite("hypot", sum.sqrt())
        });
        ret.register("clamp", |args| match args {
            [_, lo, hi] if lo > hi => Err(EvaluationError::invalid_arguments(
                "clamp",
                format!("lower bound {} exceeds upper bound {}", lo, hi),
            )),
            [x, lo, _] if x < lo => Ok(*lo),
            [x, _, hi] if x > hi => Ok(*hi),
            [x, _, _] => Ok(*x),
            _ => Err(arity("clamp", "exactly 3", args.len())),
        });
        ret
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}

fn finite(name: &str, x: Float) -> FunctionResult {
    if x.is_finite() {
        Ok(Number::from(x))
    } else {
        Err(EvaluationError::invalid_arguments(name, format!("result {} is not a finite number", x)))
    }
}

fn arity(name: &str, expected: &str, found: usize) -> EvaluationError {
    EvaluationError::invalid_arguments(name, format!("expected {} argument(s), found {}", expected, found))
}
