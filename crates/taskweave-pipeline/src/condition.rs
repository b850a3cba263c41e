//! Condition evaluation for condition stages.
//!
//! Conditions are either boolean literals or `{field, operator, value}`
//! triples where `field` is a dot path into the pipeline's condition scope.
//! Free-form expressions are never evaluated.

use std::cmp::Ordering;

use serde_json::Value;
use taskweave_config::{Condition, ConditionOperator, FieldCondition};
use thiserror::Error;

static NULL: Value = Value::Null;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expression conditions are not supported: {expression:?}")]
pub struct UnsupportedCondition {
  pub expression: String,
}

/// Evaluate `condition` against `scope`.
pub fn evaluate(condition: &Condition, scope: &Value) -> Result<bool, UnsupportedCondition> {
  match condition {
    Condition::Literal(value) => Ok(*value),
    Condition::Field(field) => Ok(evaluate_field(field, scope)),
    Condition::Expression(expression) => Err(UnsupportedCondition {
      expression: expression.clone(),
    }),
  }
}

fn evaluate_field(condition: &FieldCondition, scope: &Value) -> bool {
  let actual = lookup(scope, &condition.field);
  let expected = &condition.value;

  match condition.operator {
    ConditionOperator::Eq => values_equal(actual, expected),
    ConditionOperator::Ne => !values_equal(actual, expected),
    ConditionOperator::Gt => compare(actual, expected) == Some(Ordering::Greater),
    ConditionOperator::Lt => compare(actual, expected) == Some(Ordering::Less),
    ConditionOperator::Ge => matches!(
      compare(actual, expected),
      Some(Ordering::Greater | Ordering::Equal)
    ),
    ConditionOperator::Le => matches!(
      compare(actual, expected),
      Some(Ordering::Less | Ordering::Equal)
    ),
    ConditionOperator::Contains => match (actual, expected) {
      (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
      (Value::Array(items), needle) => items.iter().any(|item| values_equal(item, needle)),
      _ => false,
    },
    ConditionOperator::StartsWith => match (actual, expected) {
      (Value::String(s), Value::String(prefix)) => s.starts_with(prefix.as_str()),
      _ => false,
    },
    ConditionOperator::EndsWith => match (actual, expected) {
      (Value::String(s), Value::String(suffix)) => s.ends_with(suffix.as_str()),
      _ => false,
    },
  }
}

/// Resolve a dot path such as `stages.build.files.0`. Misses resolve to null.
pub fn lookup<'a>(root: &'a Value, path: &str) -> &'a Value {
  if path.is_empty() {
    return root;
  }

  let mut current = root;
  for segment in path.split('.') {
    let next = match current {
      Value::Object(map) => map.get(segment),
      Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
      _ => None,
    };
    match next {
      Some(value) => current = value,
      None => return &NULL,
    }
  }
  current
}

// Numbers compare by value so `1` equals `1.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
  match (a.as_f64(), b.as_f64()) {
    (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
    _ => a == b,
  }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
  match (a, b) {
    (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
    (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
    _ => None,
  }
}
