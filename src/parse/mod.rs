pub mod ast;
mod data;
mod error;
mod lexer;
mod parser;

use crate::roll::terms::{RollTerm, StringTerm};

pub use ast::{flatten_tree, is_operator_term, to_ast, Ast, AstError, ParseNode, SubFormula};
pub use data::{get_property, replace_formula_data};
pub use error::{FormulaSyntaxError, SyntaxErrorKind};

/// Parses a formula into a flat infix sequence of nodes.
pub fn parse(s: &str) -> Result<Vec<ParseNode>, FormulaSyntaxError> {
    parser::Parser::new(s).parse()
}

/// Turns a leftover string fragment into a term: the single term it parses
/// to, or a [`StringTerm`] holding it unchanged.
pub fn classify(s: &str) -> RollTerm {
    let term = parse(s)
        .ok()
        .and_then(|nodes| crate::roll::build_terms(s, nodes).ok())
        .and_then(|mut terms| match terms.len() {
            1 => terms.pop(),
            _ => None,
        });
    match term {
        Some(RollTerm::String(_)) | None => StringTerm::new(s).into(),
        Some(term) => term,
    }
}
