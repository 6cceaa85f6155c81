//! `_IF` condition evaluation (spec §4.2 "Conditional").

use crate::substitute::substitute;
use regex::Regex;
use std::cmp::Ordering;
use wiretest_core::{ScriptError, ScriptResult, VarContext, Origin};

pub fn eval_if(origin: &Origin, rest: &str, vars: &VarContext) -> ScriptResult<bool> {
    let text = substitute(rest, vars);
    let trimmed = text.trim();
    if let Some(inner) = trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        return eval_expr(origin, inner);
    }
    let tokens = tokenize_quoted(trimmed);
    if tokens.len() < 3 {
        return Err(ScriptError::Argument(
            origin.clone(),
            format!("_IF: expected '\"left\" [NOT] OP \"right\"', got {trimmed:?}"),
        ));
    }
    let left = tokens[0].clone();
    let mut idx = 1;
    let mut negate = false;
    if tokens[idx].eq_ignore_ascii_case("NOT") {
        negate = true;
        idx += 1;
    }
    let op = tokens
        .get(idx)
        .ok_or_else(|| ScriptError::Argument(origin.clone(), "_IF: missing operator".into()))?
        .to_ascii_uppercase();
    idx += 1;
    let right = tokens.get(idx).cloned().unwrap_or_default();

    let result = match op.as_str() {
        "MATCH" => Regex::new(&right)
            .map_err(|e| ScriptError::Argument(origin.clone(), format!("bad regex {right:?}: {e}")))?
            .is_match(&left),
        "EQUAL" => left == right,
        "EQ" => numeric_cmp(&left, &right) == Some(Ordering::Equal),
        "LT" => numeric_cmp(&left, &right) == Some(Ordering::Less),
        "GT" => numeric_cmp(&left, &right) == Some(Ordering::Greater),
        "LE" => matches!(numeric_cmp(&left, &right), Some(Ordering::Less | Ordering::Equal)),
        "GE" => matches!(numeric_cmp(&left, &right), Some(Ordering::Greater | Ordering::Equal)),
        other => {
            return Err(ScriptError::Argument(
                origin.clone(),
                format!("_IF: unknown operator {other:?}"),
            ));
        }
    };
    Ok(result != negate)
}

fn numeric_cmp(a: &str, b: &str) -> Option<Ordering> {
    let a: f64 = a.trim().parse().ok()?;
    let b: f64 = b.trim().parse().ok()?;
    a.partial_cmp(&b)
}

/// Splits on whitespace, treating `"..."` as one token (quotes stripped).
pub(crate) fn tokenize_quoted(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut tok = String::new();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                tok.push(c);
            }
            out.push(tok);
        } else {
            let mut tok = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                tok.push(c);
                chars.next();
            }
            out.push(tok);
        }
    }
    out
}

/// A minimal parenthesized-expression form: `<left> <op> <right>` with
/// `==`/`!=`/`<`/`>`/`<=`/`>=`, numeric if both sides parse as numbers,
/// lexicographic string comparison otherwise.
fn eval_expr(origin: &Origin, expr: &str) -> ScriptResult<bool> {
    for op in ["==", "!=", "<=", ">=", "<", ">"] {
        if let Some(pos) = expr.find(op) {
            let left = expr[..pos].trim();
            let right = expr[pos + op.len()..].trim();
            return Ok(compare(left, right, op));
        }
    }
    Err(ScriptError::Argument(
        origin.clone(),
        format!("_IF (...): no recognized operator in {expr:?}"),
    ))
}

fn compare(left: &str, right: &str, op: &str) -> bool {
    match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(a), Ok(b)) => match op {
            "==" => a == b,
            "!=" => a != b,
            "<" => a < b,
            ">" => a > b,
            "<=" => a <= b,
            ">=" => a >= b,
            _ => false,
        },
        _ => match op {
            "==" => left == right,
            "!=" => left != right,
            "<" => left < right,
            ">" => left > right,
            "<=" => left <= right,
            ">=" => left >= right,
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiretest_core::GlobalVars;

    fn origin() -> Origin {
        Origin::new("t", 1)
    }

    #[test]
    fn equal_operator() {
        let ctx = VarContext::new(GlobalVars::new());
        assert!(eval_if(&origin(), "\"a\" EQUAL \"a\"", &ctx).unwrap());
        assert!(!eval_if(&origin(), "\"a\" EQUAL \"b\"", &ctx).unwrap());
    }

    #[test]
    fn not_negates() {
        let ctx = VarContext::new(GlobalVars::new());
        assert!(eval_if(&origin(), "\"a\" NOT EQUAL \"b\"", &ctx).unwrap());
    }

    #[test]
    fn numeric_comparisons() {
        let ctx = VarContext::new(GlobalVars::new());
        assert!(eval_if(&origin(), "\"5\" GT \"3\"", &ctx).unwrap());
        assert!(eval_if(&origin(), "\"3\" LE \"3\"", &ctx).unwrap());
    }

    #[test]
    fn match_uses_regex() {
        let ctx = VarContext::new(GlobalVars::new());
        assert!(eval_if(&origin(), "\"hello world\" MATCH \"^hello\"", &ctx).unwrap());
    }

    #[test]
    fn parenthesized_expression_form() {
        let ctx = VarContext::new(GlobalVars::new());
        assert!(eval_if(&origin(), "(1 < 2)", &ctx).unwrap());
        assert!(!eval_if(&origin(), "(2 < 1)", &ctx).unwrap());
    }
}
