//! Built-in evaluator over JSON values.
//!
//! Supported input:
//!
//! | Input             | Effect                                    |
//! |-------------------|-------------------------------------------|
//! | `name = <json>`   | bind `name` to the JSON value             |
//! | `name = other`    | bind `name` to a copy of `other`          |
//! | `name`            | print the value bound to `name`           |
//! | `del name`        | unbind `name`                             |
//! | `dir()`           | list bound names                          |
//! | `<json>`          | echo the literal                          |
//!
//! A JSON value cut off at end of input (an open `{`, `[` or string) is
//! reported as [`Outcome::Incomplete`] so the console keeps reading lines.

use serde_json::Value;

use super::{EvalError, Evaluator, Outcome};

const SILENT: Outcome = Outcome::Output(String::new());
use crate::context::SharedContext;

/// Evaluator that reads and writes [`SharedContext`] entries as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamespaceEvaluator;

impl NamespaceEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for NamespaceEvaluator {
    fn evaluate(&self, source: &str, context: &SharedContext) -> Result<Outcome, EvalError> {
        let source = source.trim();

        if source.is_empty() {
            return Ok(SILENT);
        }

        if source == "dir()" || source == "dir" {
            return Ok(Outcome::Output(Value::from(context.names()).to_string()));
        }

        if let Some(name) = source.strip_prefix("del ") {
            let name = name.trim();
            if !is_identifier(name) {
                return Err(EvalError::Syntax(format!("cannot delete '{}'", name)));
            }
            return context
                .remove(name)
                .map(|_| SILENT)
                .ok_or_else(|| EvalError::NameError(name.to_string()));
        }

        if let Some((target, expr)) = split_assignment(source) {
            return match eval_expr(expr, context)? {
                Some(value) => {
                    context.set(target, value);
                    Ok(SILENT)
                }
                None => Ok(Outcome::Incomplete),
            };
        }

        Ok(match eval_expr(source, context)? {
            Some(value) => Outcome::Output(value.to_string()),
            None => Outcome::Incomplete,
        })
    }
}

/// Evaluate a right-hand side. `Ok(None)` means the input is incomplete.
fn eval_expr(expr: &str, context: &SharedContext) -> Result<Option<Value>, EvalError> {
    let expr = expr.trim();

    if is_identifier(expr) && !is_json_keyword(expr) {
        return context
            .get(expr)
            .map(Some)
            .ok_or_else(|| EvalError::NameError(expr.to_string()));
    }

    match serde_json::from_str::<Value>(expr) {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_eof() => Ok(None),
        Err(e) => Err(EvalError::Syntax(e.to_string())),
    }
}

/// Split `name = expr`, rejecting comparisons such as `a == b`.
fn split_assignment(source: &str) -> Option<(&str, &str)> {
    let (target, expr) = source.split_once('=')?;
    let target = target.trim();
    if !is_identifier(target) || is_json_keyword(target) || expr.starts_with('=') {
        return None;
    }
    Some((target, expr))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn is_json_keyword(s: &str) -> bool {
    matches!(s, "true" | "false" | "null")
}
