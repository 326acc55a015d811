/// Reads where-specs written as JSON, the way callers outside Rust build them.
///
/// Object entries are interpreted by shape:
///
/// | entry | predicate |
/// |---|---|
/// | `"0": "a > b"` (numeric key, string) | raw fragment |
/// | `"OR": {...}` / `"AND": [...]` | nested group |
/// | `"x": {"operator": "OR", "sub": {...}}` | nested group with that glue |
/// | `"loc": [1.5, 2]` on a POINT column | point equality |
/// | `"name": "Ann"` / `"name": null` | equality / `IS NULL` |
/// | `"age": [">", 18]`, `"id": ["IN", [1, 2]]` | `[operator, value]` |
/// | `"age": ["BETWEEN", 1, 9]` | range |
/// | `"0": ["age", ">", 18]` | `[field, operator, value]` |
/// | `"0": ["age", "BETWEEN", 1, 9]` | `[field, BETWEEN, low, high]` |
/// | `"0": [["title", "body"], "MATCH", "rust"]` | full-text match |
///
/// A top-level array is read as a list of numeric-keyed entries.

use serde_json::Value as Json;

use crate::sql::{CompareOp, Glue, Predicate, WhereSpec};
use crate::types::{DataType, DbError, DbResult, TableSchema, Value};

pub fn parse_where(json: &Json, schema: Option<&TableSchema>) -> DbResult<WhereSpec> {
    Ok(WhereSpec {
        items: predicates(json, schema)?,
    })
}

pub fn parse_where_str(text: &str, schema: Option<&TableSchema>) -> DbResult<WhereSpec> {
    let json: Json = serde_json::from_str(text)?;
    parse_where(&json, schema)
}

fn predicates(json: &Json, schema: Option<&TableSchema>) -> DbResult<Vec<Predicate>> {
    match json {
        Json::Object(entries) => entries
            .iter()
            .map(|(key, value)| entry(key, value, schema))
            .collect(),
        Json::Array(items) => items.iter().map(|value| entry("0", value, schema)).collect(),
        Json::Null => Ok(Vec::new()),
        other => Err(DbError::malformed(format!("where-spec must be an object or array, got {other}"))),
    }
}

fn is_numeric_key(key: &str) -> bool {
    key.parse::<i64>().is_ok()
}

fn entry(key: &str, value: &Json, schema: Option<&TableSchema>) -> DbResult<Predicate> {
    let numeric_key = is_numeric_key(key);
    let glue_key = ["AND", "OR"].contains(&key.to_ascii_uppercase().as_str());

    match value {
        Json::String(fragment) if numeric_key => Ok(Predicate::Raw(fragment.clone())),
        Json::Object(sub) if sub.contains_key("operator") && sub.contains_key("sub") => {
            let glue = match &sub["operator"] {
                Json::String(op) => Glue::parse(op)?,
                other => return Err(DbError::malformed(format!("invalid group operator {other}"))),
            };
            Ok(Predicate::Group {
                glue,
                items: predicates(&sub["sub"], schema)?,
            })
        }
        Json::Object(_) | Json::Array(_) if glue_key && !numeric_key => Ok(Predicate::Group {
            glue: Glue::parse(key)?,
            items: predicates(value, schema)?,
        }),
        Json::Object(_) if numeric_key => Ok(Predicate::Group {
            glue: Glue::And,
            items: predicates(value, schema)?,
        }),
        Json::Object(_) => Err(DbError::malformed(format!("unexpected object for field '{key}'"))),
        Json::Array(items) => positional(key, numeric_key, items, schema),
        scalar if numeric_key => Err(DbError::malformed(format!("raw fragment must be a string, got {scalar}"))),
        scalar => Ok(Predicate::Compare {
            field: key.to_string(),
            op: CompareOp::Eq,
            value: scalar_value(scalar)?,
        }),
    }
}

fn is_point_column(schema: Option<&TableSchema>, field: &str) -> bool {
    schema
        .and_then(|s| s.column(field))
        .is_some_and(|c| c.data_type == DataType::Point)
}

fn positional(key: &str, numeric_key: bool, items: &[Json], schema: Option<&TableSchema>) -> DbResult<Predicate> {
    let keyword = |json: &Json, word: &str| json.as_str().is_some_and(|s| s.trim().eq_ignore_ascii_case(word));

    match items {
        [x, y] if !numeric_key && x.is_number() && y.is_number() => {
            if is_point_column(schema, key) {
                Ok(Predicate::Compare {
                    field: key.to_string(),
                    op: CompareOp::Eq,
                    value: Value::from_json(&Json::Array(items.to_vec()))?,
                })
            } else {
                Err(DbError::malformed(format!(
                    "'{key}' is not a point column, expected [operator, value]"
                )))
            }
        }
        [field, value] if numeric_key => Ok(Predicate::Compare {
            field: field_name(field)?,
            op: CompareOp::Eq,
            value: scalar_value(value)?,
        }),
        [Json::String(op), value] => operator_predicate(key, op, value),
        [first, low, high] if keyword(first, "BETWEEN") && !numeric_key => Ok(Predicate::Between {
            field: key.to_string(),
            low: scalar_value(low)?,
            high: scalar_value(high)?,
        }),
        [Json::Array(fields), op, against] if keyword(op, "MATCH") => Ok(Predicate::Match {
            fields: fields.iter().map(field_name).collect::<DbResult<_>>()?,
            against: scalar_value(against)?,
        }),
        [field, Json::String(op), value] => operator_predicate(&field_name(field)?, op, value),
        [field, op, low, high] if keyword(op, "BETWEEN") => Ok(Predicate::Between {
            field: field_name(field)?,
            low: scalar_value(low)?,
            high: scalar_value(high)?,
        }),
        _ => Err(DbError::malformed(format!(
            "unrecognized condition shape for '{key}' ({} elements)",
            items.len()
        ))),
    }
}

fn operator_predicate(field: &str, op: &str, value: &Json) -> DbResult<Predicate> {
    let normalized = op.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
    match normalized.as_str() {
        "IN" | "NOT IN" => {
            let Json::Array(values) = value else {
                return Err(DbError::malformed(format!("expected an array after {normalized} for '{field}'")));
            };
            Ok(Predicate::In {
                field: field.to_string(),
                values: values.iter().map(scalar_value).collect::<DbResult<_>>()?,
                negated: normalized == "NOT IN",
            })
        }
        "MATCH" => Ok(Predicate::Match {
            fields: vec![field.to_string()],
            against: scalar_value(value)?,
        }),
        _ => Ok(Predicate::Compare {
            field: field.to_string(),
            op: CompareOp::parse(&normalized)?,
            value: scalar_value(value)?,
        }),
    }
}

fn field_name(json: &Json) -> DbResult<String> {
    json.as_str()
        .map(str::to_string)
        .ok_or_else(|| DbError::malformed(format!("expected a field name, got {json}")))
}

fn scalar_value(json: &Json) -> DbResult<Value> {
    match json {
        Json::Array(_) | Json::Object(_) => Err(DbError::malformed(format!(
            "composite value {json} is only allowed with IN / NOT IN"
        ))),
        scalar => Value::from_json(scalar),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Column;
    use serde_json::json;

    fn places() -> TableSchema {
        TableSchema::new(
            "places",
            vec![
                Column::new("id", DataType::Int).primary(),
                Column::new("loc", DataType::Point),
            ],
        )
    }

    #[test]
    fn test_scalar_and_null_equality() {
        let spec = parse_where(&json!({"name": "Ann", "deleted_at": null}), None).unwrap();
        assert_eq!(spec, WhereSpec::new().eq("deleted_at", Value::Null).eq("name", "Ann"));
    }

    #[test]
    fn test_numeric_looking_value_is_not_raw() {
        let spec = parse_where(&json!({"code": "1 = 1"}), None).unwrap();
        assert_eq!(spec, WhereSpec::new().eq("code", "1 = 1"));

        let spec = parse_where(&json!({"0": "a.x = b.y"}), None).unwrap();
        assert_eq!(spec, WhereSpec::new().raw("a.x = b.y"));
    }

    #[test]
    fn test_operator_shapes() {
        let spec = parse_where(
            &json!([
                ["age", ">=", 18],
                ["age", "BETWEEN", 1, 9],
                [["title", "body"], "MATCH", "rust"]
            ]),
            None,
        )
        .unwrap();
        assert_eq!(
            spec,
            WhereSpec::new()
                .compare("age", CompareOp::Ge, 18)
                .between("age", 1, 9)
                .matches(["title", "body"], "rust")
        );

        let spec = parse_where(&json!({"id": ["not   in", [1, 2]], "n": ["BETWEEN", 0, 5]}), None).unwrap();
        assert_eq!(spec, WhereSpec::new().not_in("id", [1, 2]).between("n", 0, 5));

        let spec = parse_where_str(r#"{"age": [">", 18], "name": ["IN", ["a", "b"]]}"#, None).unwrap();
        assert_eq!(spec, WhereSpec::new().compare("age", CompareOp::Gt, 18).is_in("name", ["a", "b"]));
    }

    #[test]
    fn test_groups() {
        let spec = parse_where(
            &json!({"OR": {"a": 1, "b": 2}, "x": {"operator": "AND", "sub": [["c", "<", 3]]}}),
            None,
        )
        .unwrap();
        assert_eq!(
            spec,
            WhereSpec::new()
                .group(Glue::Or, WhereSpec::new().eq("a", 1).eq("b", 2))
                .group(Glue::And, WhereSpec::new().compare("c", CompareOp::Lt, 3))
        );
    }

    #[test]
    fn test_point_equality_needs_point_column() {
        let schema = places();
        let spec = parse_where(&json!({"loc": [1.5, 2]}), Some(&schema)).unwrap();
        assert_eq!(spec, WhereSpec::new().eq("loc", Value::Point(1.5, 2.0)));

        let err = parse_where(&json!({"id": [1, 2]}), Some(&schema)).unwrap_err();
        assert!(matches!(err, DbError::MalformedPredicate(_)));
    }

    #[test]
    fn test_malformed_shapes() {
        for bad in [
            json!({"id": ["IN", 3]}),
            json!({"id": [">", [1, 2]]}),
            json!({"id": ["~~", 3]}),
            json!({"id": ["a", "b", "c", "d", "e"]}),
            json!({"0": 5}),
            json!("id = 1"),
        ] {
            assert!(
                matches!(parse_where(&bad, None), Err(DbError::MalformedPredicate(_))),
                "{bad} should be rejected"
            );
        }
    }
}
