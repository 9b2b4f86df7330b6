//! Safe boolean evaluation of `condition` step expressions.
//!
//! Expressions are never handed to a general-purpose interpreter.  They go
//! through four stages:
//!
//! 1. **sanitize**: reject denylisted keywords and characters outside the
//!    allow-list;
//! 2. **substitute**: replace variable references with JSON literals;
//! 3. **tokenize**: see [`lexer`];
//! 4. **parse/evaluate**: see [`parser`].
//!
//! Any failure along the way makes [`evaluate_expression`] return `false`.

mod lexer;
mod parser;
mod value;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use nodes::traits::resolve_path;

static DENYLIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:eval|Function|constructor|prototype|__proto__|this|window|global|globalThis|process|require|import|new)\b",
    )
    .expect("denylist pattern is valid")
});

static ALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^[A-Za-z0-9\s.\[\]"'<>=!&|()_]*$"#).expect("allow-list pattern is valid"));

/// Why an expression was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("forbidden keyword '{0}'")]
    ForbiddenKeyword(String),

    #[error("character '{0}' is not allowed")]
    IllegalCharacter(char),

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unmatched parenthesis")]
    UnmatchedParen,

    #[error("parentheses nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Evaluate `expression` against `variables`.
///
/// Never panics and never errors: rejected or malformed expressions are
/// logged and evaluate to `false`.
pub fn evaluate_expression(expression: &str, variables: &HashMap<String, Value>) -> bool {
    match try_evaluate(expression, variables) {
        Ok(result) => result,
        Err(err @ (ExpressionError::ForbiddenKeyword(_) | ExpressionError::IllegalCharacter(_))) => {
            warn!(expression, error = %err, "condition expression rejected");
            false
        }
        Err(err) => {
            debug!(expression, error = %err, "condition expression could not be parsed");
            false
        }
    }
}

/// Like [`evaluate_expression`] but reports why an expression was rejected.
pub fn try_evaluate(expression: &str, variables: &HashMap<String, Value>) -> Result<bool, ExpressionError> {
    sanitize(expression)?;
    let substituted = substitute(expression, variables);
    let tokens = lexer::tokenize(&substituted)?;
    parser::Parser::new(&tokens).evaluate()
}

fn sanitize(expression: &str) -> Result<(), ExpressionError> {
    if let Some(found) = DENYLIST.find(expression) {
        return Err(ExpressionError::ForbiddenKeyword(found.as_str().to_owned()));
    }
    if !ALLOWED.is_match(expression) {
        let bad = expression
            .chars()
            .find(|c| !ALLOWED.is_match(c.encode_utf8(&mut [0; 4])))
            .unwrap_or('?');
        return Err(ExpressionError::IllegalCharacter(bad));
    }
    Ok(())
}

/// Replace identifier paths outside quoted literals with JSON literals.
///
/// A path such as `order.total` resolves to the longest dotted prefix that
/// names a variable, then navigates into its value.  Paths that resolve to
/// nothing are left as written.
fn substitute(expression: &str, variables: &HashMap<String, Value>) -> String {
    let chars: Vec<char> = expression.chars().collect();
    let mut out = String::with_capacity(expression.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '"' || c == '\'' {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            i = (i + 1).min(chars.len());
            out.extend(&chars[start..i]);
            continue;
        }

        if c.is_ascii_alphanumeric() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let path = word.trim_end_matches('.');
            let trailing = &word[path.len()..];

            let is_identifier = c.is_ascii_alphabetic() || c == '_';
            match is_identifier.then(|| resolve_path(variables, path)).flatten() {
                Some(value) => {
                    out.push_str(&value.to_string());
                    out.push_str(trailing);
                }
                None => out.push_str(&word),
            }
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}
