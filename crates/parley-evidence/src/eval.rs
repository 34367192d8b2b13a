//! Interpreter for evidence expressions over attested records
//!
//! Evaluation only reads record payloads. There is no assignment, no
//! function lookup beyond the fixed aggregates and no access outside
//! `records[i]`.

use parley_attest::AttestedDocument;
use serde_json::Value as Json;

use crate::ast::{Aggregate, ArithOp, CompareOp, Expr, FieldRef, PathSegment};
use crate::{EvidenceError, Result};

/// Runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
        }
    }

    fn as_number(&self) -> Result<f64> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(eval_error(format!("expected number, found {}", other.type_name()))),
        }
    }

    fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(eval_error(format!("expected bool, found {}", other.type_name()))),
        }
    }
}

/// Check that every field reference names an existing record and field
pub fn validate(expr: &Expr, records: &[AttestedDocument]) -> Result<()> {
    for field in expr.field_refs() {
        resolve(field, records)?;
    }
    Ok(())
}

/// Evaluate to a boolean. Non-boolean results are an error.
pub fn evaluate(expr: &Expr, records: &[AttestedDocument]) -> Result<bool> {
    eval(expr, records)?.as_bool()
}

/// Evaluate to any value
pub fn eval(expr: &Expr, records: &[AttestedDocument]) -> Result<Value> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Field(field) => scalar(field, resolve(field, records)?),
        Expr::Neg(inner) => Ok(Value::Number(-eval(inner, records)?.as_number()?)),
        Expr::Arith { op, lhs, rhs } => {
            let a = eval(lhs, records)?.as_number()?;
            let b = eval(rhs, records)?.as_number()?;
            let result = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div if b == 0.0 => return Err(eval_error("division by zero")),
                ArithOp::Div => a / b,
            };
            finite(result)
        }
        Expr::Compare { first, rest } => {
            let mut left = eval(first, records)?;
            for (op, operand) in rest {
                let right = eval(operand, records)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Expr::And(lhs, rhs) => {
            let a = eval(lhs, records)?.as_bool()?;
            let b = eval(rhs, records)?.as_bool()?;
            Ok(Value::Bool(a && b))
        }
        Expr::Or(lhs, rhs) => {
            let a = eval(lhs, records)?.as_bool()?;
            let b = eval(rhs, records)?.as_bool()?;
            Ok(Value::Bool(a || b))
        }
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, records)?.as_bool()?)),
        Expr::Call { func, args } => aggregate(*func, args, records),
    }
}

fn aggregate(func: Aggregate, args: &[Expr], records: &[AttestedDocument]) -> Result<Value> {
    if func == Aggregate::Count {
        // Arguments are still evaluated so dangling references fail
        for arg in args {
            eval(arg, records)?;
        }
        return Ok(Value::Number(args.len() as f64));
    }

    let numbers = args
        .iter()
        .map(|arg| eval(arg, records)?.as_number())
        .collect::<Result<Vec<f64>>>()?;
    if numbers.is_empty() {
        return Err(eval_error(format!("{} of nothing", func.name())));
    }

    let result = match func {
        Aggregate::Sum => numbers.iter().sum(),
        Aggregate::Average => numbers.iter().sum::<f64>() / numbers.len() as f64,
        Aggregate::Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
        Aggregate::Max => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Aggregate::Count => numbers.len() as f64,
    };
    finite(result)
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(match op {
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Ge => a >= b,
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
        }),
        (Value::Str(a), Value::Str(b)) => match op {
            CompareOp::Eq => Ok(a == b),
            CompareOp::Ne => Ok(a != b),
            _ => Err(eval_error("strings only support == and !=")),
        },
        (Value::Bool(a), Value::Bool(b)) => match op {
            CompareOp::Eq => Ok(a == b),
            CompareOp::Ne => Ok(a != b),
            _ => Err(eval_error("booleans only support == and !=")),
        },
        (a, b) => Err(eval_error(format!(
            "cannot compare {} with {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

/// Walk a field reference into the record payload.
///
/// Paths are payload-relative. A leading `signed_data.data` (full wire
/// path) or `payload`/`data` segment is accepted when the payload has no
/// field of that name.
pub fn resolve<'a>(field: &FieldRef, records: &'a [AttestedDocument]) -> Result<&'a Json> {
    let document = records.get(field.index).ok_or_else(|| EvidenceError::InvalidEvidenceExpression {
        message: format!(
            "records[{}] is out of range ({} records)",
            field.index,
            records.len()
        ),
    })?;
    let payload = document.payload();

    let path = strip_wrapper(&field.path, |key| payload.contains_key(key));
    let (first, rest) = path.split_first().ok_or_else(|| EvidenceError::InvalidEvidenceExpression {
        message: format!("{} does not name a field", field),
    })?;

    let missing = || EvidenceError::InvalidEvidenceExpression {
        message: format!("{} is not present in the record", field),
    };

    let mut current = match first {
        PathSegment::Key(key) => payload.get(key).ok_or_else(missing)?,
        PathSegment::Index(_) => return Err(missing()),
    };
    for segment in rest {
        current = match segment {
            PathSegment::Key(key) => current.get(key.as_str()),
            PathSegment::Index(i) => current.get(*i),
        }
        .ok_or_else(missing)?;
    }
    Ok(current)
}

fn strip_wrapper<'p>(path: &'p [PathSegment], has_field: impl Fn(&str) -> bool) -> &'p [PathSegment] {
    let key = |i: usize| match path.get(i) {
        Some(PathSegment::Key(k)) => Some(k.as_str()),
        _ => None,
    };

    match (key(0), key(1)) {
        (Some("signed_data"), Some("data")) if !has_field("signed_data") => &path[2..],
        (Some(wrapper @ ("payload" | "data")), _) if !has_field(wrapper) => &path[1..],
        _ => path,
    }
}

fn scalar(field: &FieldRef, json: &Json) -> Result<Value> {
    match json {
        Json::Number(n) => n
            .as_f64()
            .map(Value::Number)
            .ok_or_else(|| eval_error(format!("{} is not a finite number", field))),
        Json::String(s) => Ok(Value::Str(s.clone())),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Null => Err(eval_error(format!("{} is null", field))),
        Json::Array(_) | Json::Object(_) => {
            Err(eval_error(format!("{} is not a scalar value", field)))
        }
    }
}

fn finite(n: f64) -> Result<Value> {
    if n.is_finite() {
        Ok(Value::Number(n))
    } else {
        Err(eval_error("arithmetic overflow"))
    }
}

fn eval_error(message: impl Into<String>) -> EvidenceError {
    EvidenceError::Eval {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;
    use chrono::Utc;
    use parley_attest::AttestedRecord;
    use serde_json::json;

    fn documents(payloads: Vec<Json>) -> Vec<AttestedDocument> {
        payloads
            .into_iter()
            .map(|p| {
                AttestedDocument::new(
                    AttestedRecord {
                        payload: p.as_object().cloned().unwrap(),
                        signature: String::new(),
                        signer: "Alice".to_string(),
                        signed_at: Utc::now(),
                    },
                    0,
                )
            })
            .collect()
    }

    fn check(source: &str, records: &[AttestedDocument]) -> Result<bool> {
        let expr = parse_expression(source)?;
        validate(&expr, records)?;
        evaluate(&expr, records)
    }

    #[test]
    fn test_average_within_band() {
        let records = documents(vec![
            json!({"offer_amount": 1_200_000}),
            json!({"offer_amount": 1_300_000}),
        ]);
        assert!(check(
            "1200000 <= average(records[0].offer_amount, records[1].offer_amount) <= 1300000",
            &records
        )
        .unwrap());
        assert!(!check(
            "(records[0].offer_amount + records[1].offer_amount) / 2 > 1300000",
            &records
        )
        .unwrap());
    }

    #[test]
    fn test_aggregates() {
        let records = documents(vec![json!({"a": 3, "b": 7.5, "c": -1})]);
        assert!(check("sum(records[0].a, records[0].b) == 10.5", &records).unwrap());
        assert!(check("min(records[0].a, records[0].b, records[0].c) == -1", &records).unwrap());
        assert!(check("max(records[0].a, records[0].b) == 7.5", &records).unwrap());
        assert!(check("count(records[0].a, records[0].b) == 2", &records).unwrap());
    }

    #[test]
    fn test_nested_and_wire_paths() {
        let records = documents(vec![json!({
            "buyer": {"name": "Bob"},
            "contingencies": ["inspection", "financing"],
            "offer_amount": 1_250_000
        })]);
        assert!(check("records[0].buyer.name == 'Bob'", &records).unwrap());
        assert!(check("records[0].contingencies[1] == 'financing'", &records).unwrap());
        assert!(check(
            "records[0]['signed_data']['data']['offer_amount'] > 1200000",
            &records
        )
        .unwrap());
        assert!(check("records[0].payload.offer_amount > 1200000", &records).unwrap());
    }

    #[test]
    fn test_dangling_references_are_invalid() {
        let records = documents(vec![json!({"offer_amount": 1})]);

        for source in ["records[1].offer_amount > 0", "records[0].closing_days > 0"] {
            let expr = parse_expression(source).unwrap();
            assert!(matches!(
                validate(&expr, &records),
                Err(EvidenceError::InvalidEvidenceExpression { .. })
            ));
        }
    }

    #[test]
    fn test_type_errors() {
        let records = documents(vec![json!({"name": "Bob", "terms": {"days": 30}, "n": 1})]);
        assert!(matches!(check("records[0].name > 1", &records), Err(EvidenceError::Eval { .. })));
        assert!(matches!(check("records[0].terms > 1", &records), Err(EvidenceError::Eval { .. })));
        assert!(matches!(check("records[0].n / 0 > 1", &records), Err(EvidenceError::Eval { .. })));
        assert!(matches!(check("records[0].n + 1", &records), Err(EvidenceError::Eval { .. })));
    }
}
