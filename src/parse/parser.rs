use super::ast::*;
use super::error::{FormulaSyntaxError, SyntaxErrorKind};
use super::lexer::*;
use crate::common::*;
use crate::roll::modifiers::{Modifier, ModifierSet};
use crate::roll::num::Number;
use logos_iter::LogosIter;
use std::ops::Range;
use vec1::Vec1;

type PResult<T = ParseNode> = Result<T, FormulaSyntaxError>;

pub struct Parser<'a> {
    source: &'a str,
    lexer: Lexer<'a>,
    /// End of the most recently consumed token.
    last_end: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            lexer: lexer(source),
            last_end: 0,
        }
    }

    pub fn parse(mut self) -> PResult<Vec<ParseNode>> {
        let nodes = self.parse_expression()?;
        match self.lexer.peek().copied() {
            None => Ok(nodes),
            Some(TokenKind::RightParen) => {
                self.advance();
                self.error(SyntaxErrorKind::UnbalancedParenthesis)
            }
            Some(_) => self.unexpected_token(&[
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
            ]),
        }
    }

    fn advance(&mut self) -> Option<TokenKind> {
        let kind = self.lexer.next();
        if kind.is_some() {
            self.last_end = self.lexer.span().end;
        }
        kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        self.lexer.peek().map_or(false, |&peeked| peeked == kind)
    }

    fn matches_any(&mut self, options: &[TokenKind]) -> bool {
        self.lexer
            .peek()
            .map_or(false, |peeked| options.contains(peeked))
    }

    /// Whether the next token starts right where the last one ended.
    fn is_adjacent(&self) -> bool {
        self.source[self.last_end..]
            .chars()
            .next()
            .map_or(false, |c| !c.is_whitespace())
    }

    fn slice(&self) -> &str {
        self.lexer.slice()
    }

    fn error<T>(&self, kind: SyntaxErrorKind) -> PResult<T> {
        self.error_at(self.lexer.span(), kind)
    }

    fn error_at<T>(&self, span: Range<usize>, kind: SyntaxErrorKind) -> PResult<T> {
        Err(FormulaSyntaxError::new(self.source, span, kind))
    }

    fn unexpected_token<T>(&mut self, expected: &[TokenKind]) -> PResult<T> {
        let expected = expected.iter().map(|k| k.as_str().to_string()).collect();
        match self.advance() {
            None => {
                let end = self.source.len();
                self.error_at(end..end, SyntaxErrorKind::UnexpectedEnd { expected })
            }
            Some(TokenKind::Error) => self.error(SyntaxErrorKind::UnrecognizedInput),
            Some(TokenKind::ErrEmptyFlavor) => self.error(SyntaxErrorKind::EmptyFlavor),
            Some(found) => self.error(SyntaxErrorKind::UnexpectedToken {
                found: found.as_str().to_string(),
                expected,
            }),
        }
    }

    /// Consumes a closing bracket, reporting a missing one as unbalanced.
    fn close(&mut self, closing: TokenKind) -> PResult<()> {
        if self.matches(closing) {
            self.advance();
            Ok(())
        } else if self.lexer.peek().is_none() {
            let end = self.source.len();
            self.error_at(end..end, SyntaxErrorKind::UnbalancedParenthesis)
        } else {
            self.unexpected_token(&[closing, TokenKind::Comma])
        }
    }

    /// Consumes a run of `+`/`-`, collapsing it to one sign: odd counts of `-` are `-`.
    fn parse_signs(&mut self) -> Option<Operator> {
        let mut seen = false;
        let mut negative = false;
        while self.matches_any(TokenKind::ADDITION_OPS) {
            seen = true;
            if self.advance() == Some(TokenKind::Minus) {
                negative = !negative;
            }
        }
        match (seen, negative) {
            (false, _) => None,
            (true, true) => Some(Operator::Sub),
            (true, false) => Some(Operator::Add),
        }
    }

    fn parse_expression(&mut self) -> PResult<Vec<ParseNode>> {
        let mut items = Vec::new();
        let mut negate = self.parse_signs() == Some(Operator::Sub);

        loop {
            let operand = self.parse_operand()?;
            items.push(if negate {
                ParseNode::Negation(Box::new(operand))
            } else {
                operand
            });

            if let Some(op) = self.parse_signs() {
                items.push(ParseNode::Operator(op));
                negate = false;
            } else if self.matches_any(TokenKind::MULTIPLICATION_OPS) {
                let op = self.advance().and_then(|k| k.as_operator());
                if let Some(op) = op {
                    items.push(ParseNode::Operator(op));
                }
                negate = self.parse_signs() == Some(Operator::Sub);
            } else {
                break;
            }
        }

        Ok(items)
    }

    /// One operand: an atom plus anything glued directly onto it, as in
    /// `(1 + 1)d6` or `2d(3)`.
    fn parse_operand(&mut self) -> PResult {
        let mut atoms = vec![self.parse_atom()?];
        while self.is_adjacent() {
            let after_string = matches!(atoms.last(), Some(ParseNode::String(_)));
            match self.lexer.peek().copied() {
                Some(TokenKind::Dice | TokenKind::DicePrefix | TokenKind::Ident | TokenKind::DataRef) => {
                    self.advance();
                    let fragment = ParseNode::String(self.slice().to_string());
                    atoms.push(self.parse_flavors(fragment)?);
                }
                Some(TokenKind::LeftParen | TokenKind::Number) if after_string => {
                    atoms.push(self.parse_atom()?);
                }
                _ => break,
            }
        }

        Ok(match atoms.len() {
            1 => atoms.remove(0),
            _ => ParseNode::Concat(atoms),
        })
    }

    fn parse_atom(&mut self) -> PResult {
        let atom = match self.lexer.peek().copied() {
            Some(TokenKind::Number) => self.parse_number(),
            Some(TokenKind::Dice) => self.parse_dice(),
            Some(TokenKind::DicePrefix | TokenKind::DataRef) => {
                self.advance();
                Ok(ParseNode::String(self.slice().to_string()))
            }
            Some(TokenKind::Ident) => self.parse_function(),
            Some(TokenKind::LeftParen) => self.parse_parenthetical(),
            Some(TokenKind::LeftBrace) => self.parse_pool(),
            _ => self.unexpected_token(TokenKind::ATOMS),
        }?;
        self.parse_flavors(atom)
    }

    /// Wraps `node` in any `[flavor]` suffixes that follow it.
    fn parse_flavors(&mut self, node: ParseNode) -> PResult {
        let mut flavors = Vec::new();
        loop {
            if self.matches(TokenKind::Flavor) {
                self.advance();
                let slice = self.slice();
                flavors.push(slice[1..slice.len() - 1].to_string());
            } else if self.matches(TokenKind::ErrEmptyFlavor) {
                self.advance();
                return self.error(SyntaxErrorKind::EmptyFlavor);
            } else {
                break;
            }
        }

        Ok(if flavors.is_empty() {
            node
        } else {
            ParseNode::Annotated(Box::new(node), flavors.join(" "))
        })
    }

    fn parse_number(&mut self) -> PResult {
        self.advance();
        let slice = self.slice();
        let number = if slice.contains('.') {
            slice.parse::<Float>().ok().map(Number::from)
        } else {
            slice.parse::<Int>().ok().map(Number::Int)
        };
        match number {
            Some(x) => Ok(ParseNode::Number(x)),
            None => self.error(SyntaxErrorKind::UnrecognizedInput),
        }
    }

    fn parse_dice(&mut self) -> PResult {
        self.advance();
        let slice = self.slice();
        let span = self.lexer.span();

        // logos has already checked the overall shape of the literal
        let split = slice.find(|c: char| c == 'd' || c == 'D').unwrap_or(0);
        let (number, rest) = (&slice[..split], &slice[split + 1..]);
        let number = if number.is_empty() {
            1
        } else {
            match number.parse::<usize>() {
                Ok(n) => n,
                Err(_) => {
                    return self.error(SyntaxErrorKind::InvalidDice(format!("{} is too many dice", number)))
                }
            }
        };

        let faces_len = match rest.find(|c: char| !c.is_ascii_digit()) {
            Some(0) => 1,
            Some(i) => i,
            None => rest.len(),
        };
        let (faces, suffix) = rest.split_at(faces_len);
        let denomination: Denomination = match faces.parse() {
            Ok(d) => d,
            Err(why) => return self.error(SyntaxErrorKind::InvalidDice(why)),
        };

        match Modifier::parse_all(suffix, ModifierSet::for_denomination(&denomination)) {
            Ok(modifiers) => Ok(ParseNode::Dice {
                number,
                denomination,
                modifiers,
            }),
            Err(chunk) => {
                let start = span.end - suffix.len() + suffix.find(chunk.as_str()).unwrap_or(0);
                self.error_at(start..start + chunk.len(), SyntaxErrorKind::InvalidModifier(chunk))
            }
        }
    }

    /// `name(args)`, or a bare word left for later classification.
    fn parse_function(&mut self) -> PResult {
        self.advance();
        let name = self.slice().to_string();
        if !(self.is_adjacent() && self.matches(TokenKind::LeftParen)) {
            return Ok(ParseNode::String(name));
        }
        self.advance();

        let mut args = Vec::new();
        if !self.matches(TokenKind::RightParen) {
            loop {
                args.push(self.parse_sub_formula()?);
                if self.matches(TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.close(TokenKind::RightParen)?;
        Ok(ParseNode::Function { name, args })
    }

    fn parse_parenthetical(&mut self) -> PResult {
        self.advance();
        let inner = self.parse_sub_formula()?;
        self.close(TokenKind::RightParen)?;
        Ok(ParseNode::Parenthetical(inner))
    }

    fn parse_pool(&mut self) -> PResult {
        self.advance();
        let open = self.lexer.span();
        if self.matches(TokenKind::RightBrace) {
            self.advance();
            let span = open.start..self.last_end;
            return self.error_at(span, SyntaxErrorKind::EmptyPool);
        }

        let mut items = Vec::new();
        loop {
            items.push(self.parse_sub_formula()?);
            if self.matches(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.close(TokenKind::RightBrace)?;

        let suffix = &self.slice()[1..];
        let modifiers = match Modifier::parse_all(suffix, ModifierSet::Pool) {
            Ok(m) => m,
            Err(chunk) => {
                let start = self.last_end - suffix.len() + suffix.find(chunk.as_str()).unwrap_or(0);
                return self.error_at(start..start + chunk.len(), SyntaxErrorKind::InvalidModifier(chunk));
            }
        };
        match Vec1::try_from_vec(items) {
            Ok(items) => Ok(ParseNode::Pool { items, modifiers }),
            Err(_) => self.error_at(open, SyntaxErrorKind::EmptyPool),
        }
    }

    fn parse_sub_formula(&mut self) -> PResult<SubFormula> {
        let start = self.last_end;
        let nodes = self.parse_expression()?;
        let formula = self.source[start..self.last_end].trim().to_string();
        Ok(SubFormula { formula, nodes })
    }
}
