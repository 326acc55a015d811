use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::column::Column;
use super::constraints::ForeignKey;
use super::data_type::DataType;
use super::error::{DbError, DbResult};
use super::row::Row;
use super::value::Value;
use crate::parser::parse_wkt_point;

/// Column and key metadata of one table, as produced by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    /// Ordered composite primary key.
    pub primary_key: Vec<String>,
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// Builds a schema, taking the primary key from the columns flagged as such.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let primary_key = columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        Self {
            name: name.into(),
            primary_key,
            columns,
        }
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn require_column(&self, name: &str) -> DbResult<&Column> {
        self.column(name).ok_or_else(|| DbError::SchemaMismatch {
            table: self.name.clone(),
            column: name.to_string(),
        })
    }

    /// The single primary-key column; composite keys are rejected.
    pub fn sole_primary_key(&self) -> DbResult<&str> {
        match self.primary_key.as_slice() {
            [only] => Ok(only),
            [] => Err(DbError::InvalidOperation(format!(
                "table '{}' has no primary key",
                self.name
            ))),
            _ => Err(DbError::MalformedPredicate(format!(
                "table '{}' has a composite primary key, select by id is not possible",
                self.name
            ))),
        }
    }

    /// Every (column, foreign key) pair of the table, in column order.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&Column, &ForeignKey)> {
        self.columns
            .iter()
            .flat_map(|c| c.foreign_keys.iter().map(move |fk| (c, fk)))
    }

    #[must_use]
    pub fn has_point_columns(&self) -> bool {
        self.columns.iter().any(|c| c.real && c.data_type == DataType::Point)
    }

    /// Validates a value against the declared column type.
    pub fn check_value(&self, column: &str, value: &Value, check_lengths: bool) -> DbResult<()> {
        let col = self.require_column(column)?;
        let mismatch = |detail: String| DbError::TypeMismatch {
            table: self.name.clone(),
            column: column.to_string(),
            detail,
        };

        if value.is_null() {
            return if col.nullable || col.primary_key {
                Ok(())
            } else {
                Err(mismatch("NULL in a NOT NULL column".to_string()))
            };
        }

        match &col.data_type {
            t if t.is_numeric() => match value {
                Value::Integer(_) | Value::Real(_) | Value::Numeric(_) | Value::Boolean(_) => Ok(()),
                Value::Text(s) if s.is_empty() || value.as_number().is_some() => Ok(()),
                other => Err(mismatch(format!("'{other}' is not numeric"))),
            },
            DataType::Char { length } | DataType::Varchar { length } => {
                if check_lengths {
                    let len = value.to_string().chars().count();
                    if len > *length {
                        return Err(mismatch(format!("length {len} exceeds {length}")));
                    }
                }
                Ok(())
            }
            DataType::Date | DataType::DateTime => match value {
                Value::Date(_) | Value::Timestamp(_) => Ok(()),
                Value::Text(s) if parse_date_text(s).is_some() => Ok(()),
                other => Err(mismatch(format!("'{other}' is not a valid date"))),
            },
            DataType::Enum { values } => {
                let text = value.to_string();
                if values.contains(&text) {
                    Ok(())
                } else {
                    Err(mismatch(format!("'{text}' is not one of {values:?}")))
                }
            }
            DataType::Point => match value {
                Value::Point(..) => Ok(()),
                other => Err(mismatch(format!("'{other}' is not a point"))),
            },
            _ => Ok(()),
        }
    }

    /// Converts store text into the column's native value kind.
    #[must_use]
    pub fn normalize_row(&self, mut row: Row) -> Row {
        for (field, value) in &mut row.values {
            let Some(col) = self.column(field) else {
                continue;
            };
            let Value::Text(text) = value else {
                continue;
            };
            let normalized = if col.data_type.is_integer() {
                text.trim().parse().ok().map(Value::Integer)
            } else if col.data_type.is_float() {
                text.trim().parse().ok().map(Value::Real)
            } else if col.data_type == DataType::Point {
                parse_wkt_point(text).map(|(x, y)| Value::Point(x, y))
            } else if matches!(col.data_type, DataType::Date | DataType::DateTime) {
                parse_date_text(text)
            } else {
                None
            };
            if let Some(v) = normalized {
                *value = v;
            }
        }
        row
    }
}

/// Parses the textual date forms accepted by the store.
#[must_use]
pub fn parse_date_text(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(Value::Timestamp(ts));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(Value::Timestamp(ts));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().map(Value::Date)
}
