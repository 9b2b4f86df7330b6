//! Precedence-climbing evaluator over the token stream.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! or         := and ( "||" and )*
//! and        := comparison ( "&&" comparison )*
//! comparison := "(" or ")" | literal ( comparator literal )?
//! ```
//!
//! Evaluation happens while parsing; there is nothing with side effects, so
//! both operands of `&&`/`||` are always evaluated.

use super::ExpressionError;
use super::lexer::Token;
use super::value::{Operand, compare};

/// Deepest parenthesis nesting accepted; each level costs three stack frames.
pub(crate) const MAX_DEPTH: usize = 64;

pub(crate) struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0, depth: 0 }
    }

    /// Evaluate the whole token stream; trailing tokens are an error.
    pub(crate) fn evaluate(mut self) -> Result<bool, ExpressionError> {
        let result = self.parse_or()?;
        match self.peek() {
            None => Ok(result),
            Some(Token::RParen) => Err(ExpressionError::UnmatchedParen),
            Some(other) => Err(ExpressionError::UnexpectedToken(other.describe())),
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<bool, ExpressionError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = left || right;
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<bool, ExpressionError> {
        let mut left = self.parse_comparison()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = left && right;
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<bool, ExpressionError> {
        match self.next() {
            None => Err(ExpressionError::UnexpectedEnd),
            Some(Token::LParen) => {
                self.depth += 1;
                if self.depth > MAX_DEPTH {
                    return Err(ExpressionError::TooDeep(MAX_DEPTH));
                }
                let inner = self.parse_or()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    None => Err(ExpressionError::UnmatchedParen),
                    Some(other) => Err(ExpressionError::UnexpectedToken(other.describe())),
                }
            }
            Some(Token::RParen) => Err(ExpressionError::UnmatchedParen),
            Some(token) => {
                let left = literal(token)?;
                let Some(Token::Cmp(op)) = self.peek() else {
                    return Ok(left.truthy());
                };
                self.pos += 1;
                match self.next() {
                    None => Err(ExpressionError::UnexpectedEnd),
                    Some(rhs) => Ok(compare(*op, &left, &literal(rhs)?)),
                }
            }
        }
    }
}

fn literal(token: &Token) -> Result<Operand, ExpressionError> {
    match token {
        Token::Quoted(text) => Ok(Operand::from_quoted(text)),
        Token::Bare(text) => Ok(Operand::from_bare(text)),
        other => Err(ExpressionError::UnexpectedToken(other.describe())),
    }
}
