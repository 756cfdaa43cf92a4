//! Parse trees and the shunting-yard builder turning flat infix sequences into
//! strictly binary expression trees.

use super::error::SyntaxErrorKind;
use crate::common::*;
use crate::roll::modifiers::Modifier;
use crate::roll::num::Number;
use crate::roll::terms::RollTerm;
use std::fmt;

/// A parenthesized or comma-separated piece of a formula, kept both as text
/// and as its own parsed node sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SubFormula {
    pub formula: String,
    pub nodes: Vec<ParseNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseNode {
    Number(Number),
    Dice {
        number: usize,
        denomination: Denomination,
        modifiers: Vec<Modifier>,
    },
    Function {
        name: String,
        args: Vec<SubFormula>,
    },
    Pool {
        items: NonEmpty<SubFormula>,
        modifiers: Vec<Modifier>,
    },
    Parenthetical(SubFormula),
    String(String),
    Operator(Operator),
    /// A leading `-`, or one directly after `*`, `/` or `%`.
    Negation(Box<ParseNode>),
    /// Atoms written back to back, such as `2d` followed by `(1 + 2)`.
    Concat(Vec<ParseNode>),
    Annotated(Box<ParseNode>, String),
}

impl ParseNode {
    /// The term class this node instantiates into.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Number(_) => "NumericTerm",
            Self::Dice { denomination, .. } => denomination.class_name(),
            Self::Function { .. } => "FunctionTerm",
            Self::Pool { .. } => "PoolTerm",
            Self::Parenthetical(_) => "ParentheticalTerm",
            Self::String(_) | Self::Concat(_) => "StringTerm",
            Self::Operator(_) => "OperatorTerm",
            Self::Negation(inner) | Self::Annotated(inner, _) => inner.class(),
        }
    }
}

impl fmt::Display for ParseNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(x) => write!(f, "{}", x),
            Self::Dice {
                number,
                denomination,
                modifiers,
            } => {
                write!(f, "{}{}", number, denomination)?;
                modifiers.iter().try_for_each(|m| write!(f, "{}", m))
            }
            Self::Function { name, args } => {
                let args: Vec<_> = args.iter().map(|a| a.formula.as_str()).collect();
                write!(f, "{}({})", name, args.join(", "))
            }
            Self::Pool { items, modifiers } => {
                let items: Vec<_> = items.iter().map(|a| a.formula.as_str()).collect();
                write!(f, "{{{}}}", items.join(", "))?;
                modifiers.iter().try_for_each(|m| write!(f, "{}", m))
            }
            Self::Parenthetical(inner) => write!(f, "({})", inner.formula),
            Self::String(s) => f.write_str(s),
            Self::Operator(op) => write!(f, "{}", op),
            Self::Negation(inner) => write!(f, "-{}", inner),
            Self::Concat(nodes) => nodes.iter().try_for_each(|n| write!(f, "{}", n)),
            Self::Annotated(inner, flavor) => write!(f, "{}[{}]", inner, flavor),
        }
    }
}

/// Lets the builder treat parse nodes and instantiated terms alike.
pub trait IsOperator {
    fn operator(&self) -> Option<Operator>;
}

impl IsOperator for ParseNode {
    fn operator(&self) -> Option<Operator> {
        match self {
            Self::Operator(op) => Some(*op),
            _ => None,
        }
    }
}

impl IsOperator for RollTerm {
    fn operator(&self) -> Option<Operator> {
        RollTerm::operator(self)
    }
}

impl<T: IsOperator + ?Sized> IsOperator for &T {
    fn operator(&self) -> Option<Operator> {
        (**self).operator()
    }
}

pub fn is_operator_term<T: IsOperator>(x: &T) -> bool {
    x.operator().is_some()
}

/// Builds the pieces [`flatten_tree`] reinserts into an infix sequence.
pub trait Operand: IsOperator + Sized {
    fn from_operator(op: Operator) -> Self;

    /// Groups a flattened subtree so it binds as a single operand.
    fn parenthesize(items: Vec<Self>) -> Self;
}

impl Operand for ParseNode {
    fn from_operator(op: Operator) -> Self {
        Self::Operator(op)
    }

    fn parenthesize(items: Vec<Self>) -> Self {
        let formula = items.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
        Self::Parenthetical(SubFormula {
            formula,
            nodes: items,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Ast<T> {
    Leaf(T),
    /// A leading `-` applied to the first operand.
    Neg(Box<Ast<T>>),
    Binary {
        op: Operator,
        left: Box<Ast<T>>,
        right: Box<Ast<T>>,
    },
}

impl<T> Ast<T> {
    /// Folds the tree bottom-up with `leaf` supplying operand values.
    pub fn evaluate<E>(
        &self,
        mut leaf: impl FnMut(&T) -> Result<Number, E>,
        mut apply: impl FnMut(Operator, Number, Number) -> Result<Number, E>,
    ) -> Result<Number, E> {
        self.fold(&mut leaf, &mut apply)
    }

    fn fold<E>(
        &self,
        leaf: &mut dyn FnMut(&T) -> Result<Number, E>,
        apply: &mut dyn FnMut(Operator, Number, Number) -> Result<Number, E>,
    ) -> Result<Number, E> {
        match self {
            Self::Leaf(x) => leaf(x),
            Self::Neg(x) => Ok(-x.fold(leaf, apply)?),
            Self::Binary { op, left, right } => {
                let l = left.fold(leaf, apply)?;
                let r = right.fold(leaf, apply)?;
                apply(*op, l, r)
            }
        }
    }

    fn precedence(&self) -> Option<u8> {
        match self {
            Self::Binary { op, .. } => Some(op.precedence()),
            _ => None,
        }
    }
}

/// Where the builder rejected a sequence, as an index into its input.
#[derive(Debug, Clone, PartialEq)]
pub struct AstError {
    pub index: usize,
    pub kind: SyntaxErrorKind,
}

impl AstError {
    fn new(index: usize, kind: SyntaxErrorKind) -> Self {
        Self { index, kind }
    }
}

/// Two-stack shunting-yard over an infix sequence of operands and operators.
///
/// A leading `-` negates the first operand; any other leading operator, two
/// operators in a row or a dangling operator yields `MissingOperand`, and two
/// operands in a row yield `MissingOperator`.
pub fn to_ast<T: IsOperator>(items: impl IntoIterator<Item = T>) -> Result<Ast<T>, AstError> {
    let mut operands: Vec<Ast<T>> = Vec::new();
    let mut operators: Vec<(Operator, usize)> = Vec::new();
    let mut expect_operand = true;
    let mut negate = false;
    let mut last = 0;

    for (i, item) in items.into_iter().enumerate() {
        last = i;
        match item.operator() {
            Some(Operator::Sub) if i == 0 => negate = true,
            Some(_) if expect_operand => return Err(AstError::new(i, SyntaxErrorKind::MissingOperand)),
            Some(op) => {
                while let Some(&(top, j)) = operators.last() {
                    if top.precedence() < op.precedence() {
                        break;
                    }
                    operators.pop();
                    combine(&mut operands, top, j)?;
                }
                operators.push((op, i));
                expect_operand = true;
            }
            None if !expect_operand => return Err(AstError::new(i, SyntaxErrorKind::MissingOperator)),
            None => {
                let leaf = Ast::Leaf(item);
                operands.push(if std::mem::take(&mut negate) {
                    Ast::Neg(Box::new(leaf))
                } else {
                    leaf
                });
                expect_operand = false;
            }
        }
    }

    if expect_operand {
        return Err(AstError::new(last, SyntaxErrorKind::MissingOperand));
    }
    while let Some((op, j)) = operators.pop() {
        combine(&mut operands, op, j)?;
    }
    operands
        .pop()
        .ok_or_else(|| AstError::new(0, SyntaxErrorKind::MissingOperand))
}

fn combine<T>(operands: &mut Vec<Ast<T>>, op: Operator, index: usize) -> Result<(), AstError> {
    let right = operands.pop();
    let left = operands.pop();
    match (left, right) {
        (Some(left), Some(right)) => {
            operands.push(Ast::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
            Ok(())
        }
        _ => Err(AstError::new(index, SyntaxErrorKind::MissingOperand)),
    }
}

/// Walks a tree back into infix order, parenthesizing subtrees that would
/// otherwise bind differently.
pub fn flatten_tree<T: Operand>(ast: Ast<T>) -> Vec<T> {
    let mut out = Vec::new();
    flatten_into(ast, &mut out);
    out
}

fn flatten_into<T: Operand>(ast: Ast<T>, out: &mut Vec<T>) {
    match ast {
        Ast::Leaf(x) => out.push(x),
        Ast::Neg(x) => {
            out.push(T::from_operator(Operator::Sub));
            flatten_operand(*x, 0, false, out);
        }
        Ast::Binary { op, left, right } => {
            flatten_operand(*left, op.precedence(), false, out);
            out.push(T::from_operator(op));
            flatten_operand(*right, op.precedence(), true, out);
        }
    }
}

fn flatten_operand<T: Operand>(ast: Ast<T>, parent: u8, right: bool, out: &mut Vec<T>) {
    let grouped = match ast.precedence() {
        Some(p) => p < parent || (right && p == parent),
        None => false,
    };
    if grouped {
        let mut inner = Vec::new();
        flatten_into(ast, &mut inner);
        out.push(T::parenthesize(inner));
    } else {
        flatten_into(ast, out);
    }
}
