/// Condition evaluation for cached rows
///
/// Mirrors the store's loose comparison: numeric-looking values compare as
/// numbers, everything else as case-insensitive text. NULL never matches.

use std::cmp::Ordering;

use crate::sql::Glue;
use crate::types::{Row, Value};

pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Evaluate flat equality conditions joined by `glue` against a row.
    /// An empty condition list matches every row.
    pub fn evaluate(row: &Row, conditions: &[(&str, &Value)], glue: Glue) -> bool {
        if conditions.is_empty() {
            return true;
        }
        let mut results = conditions
            .iter()
            .map(|(field, expected)| row.get(field).is_some_and(|actual| Self::loose_eq(actual, expected)));
        match glue {
            Glue::And => results.all(|r| r),
            Glue::Or => results.any(|r| r),
        }
    }

    /// Equality as the store performs it between a column and a literal.
    pub fn loose_eq(a: &Value, b: &Value) -> bool {
        if a.is_null() || b.is_null() {
            return false;
        }
        match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x == y,
            _ => a.to_string().to_lowercase() == b.to_string().to_lowercase(),
        }
    }

    /// Sort order of two column values; NULL sorts first.
    pub fn compare(a: &Value, b: &Value) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_string().to_lowercase().cmp(&b.to_string().to_lowercase()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Row {
        Row::new()
            .with("id", 1)
            .with("name", "Alice")
            .with("age", "30")
            .with("nick", Value::Null)
    }

    #[test]
    fn test_loose_equality() {
        assert!(ConditionEvaluator::loose_eq(&Value::Integer(30), &Value::from("30")));
        assert!(ConditionEvaluator::loose_eq(&Value::from("30.0"), &Value::Integer(30)));
        assert!(ConditionEvaluator::loose_eq(&Value::from("ALICE"), &Value::from("alice")));
        assert!(!ConditionEvaluator::loose_eq(&Value::Null, &Value::Null));
        assert!(!ConditionEvaluator::loose_eq(&Value::from(""), &Value::Integer(0)));
    }

    #[test]
    fn test_and_or() {
        let row = alice();
        let name = Value::from("alice");
        let age = Value::Integer(31);
        assert!(ConditionEvaluator::evaluate(&row, &[("name", &name)], Glue::And));
        assert!(!ConditionEvaluator::evaluate(&row, &[("name", &name), ("age", &age)], Glue::And));
        assert!(ConditionEvaluator::evaluate(&row, &[("name", &name), ("age", &age)], Glue::Or));
        assert!(!ConditionEvaluator::evaluate(&row, &[("missing", &name)], Glue::Or));
        assert!(ConditionEvaluator::evaluate(&row, &[], Glue::And));
    }

    #[test]
    fn test_compare() {
        assert_eq!(ConditionEvaluator::compare(&Value::from("10"), &Value::from("9")), Ordering::Greater);
        assert_eq!(ConditionEvaluator::compare(&Value::from("b"), &Value::from("A")), Ordering::Greater);
        assert_eq!(ConditionEvaluator::compare(&Value::Null, &Value::Integer(1)), Ordering::Less);
    }
}
