use std::collections::BTreeMap;

use super::error::{DbError, DbResult};
use super::row::Row;
use super::value::Value;

/// A write value that is either language-neutral or given per language.
#[derive(Debug, Clone, PartialEq)]
pub enum PerLanguage<T> {
    Scalar(T),
    Map(BTreeMap<String, T>),
}

impl<T> PerLanguage<T> {
    /// Per-language view: a scalar belongs to `current` only.
    #[must_use]
    pub fn into_languages(self, current: &str) -> BTreeMap<String, T> {
        match self {
            Self::Scalar(v) => BTreeMap::from([(current.to_string(), v)]),
            Self::Map(map) => map,
        }
    }
}

/// Field values of an insert or update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    fields: BTreeMap<String, PerLanguage<Value>>,
}

impl Payload {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), PerLanguage::Scalar(value.into()));
        self
    }

    /// Sets one translatable field for several languages at once.
    #[must_use]
    pub fn set_translations<L, V>(mut self, field: impl Into<String>, values: impl IntoIterator<Item = (L, V)>) -> Self
    where
        L: Into<String>,
        V: Into<Value>,
    {
        let map = values.into_iter().map(|(l, v)| (l.into(), v.into())).collect();
        self.fields.insert(field.into(), PerLanguage::Map(map));
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: PerLanguage<Value>) {
        self.fields.insert(field.into(), value);
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&PerLanguage<Value>> {
        self.fields.get(field)
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PerLanguage<Value>)> {
        self.fields.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Reads a JSON object; nested objects are per-language maps.
    pub fn from_json(json: &serde_json::Value) -> DbResult<Self> {
        let serde_json::Value::Object(object) = json else {
            return Err(DbError::UnsupportedValueType(
                "payload must be a JSON object".to_string(),
            ));
        };
        let mut payload = Self::new();
        for (field, value) in object {
            let entry = match value {
                serde_json::Value::Object(langs) => PerLanguage::Map(
                    langs
                        .iter()
                        .map(|(l, v)| Ok((l.clone(), Value::from_json(v)?)))
                        .collect::<DbResult<_>>()?,
                ),
                other => PerLanguage::Scalar(Value::from_json(other)?),
            };
            payload.insert(field.clone(), entry);
        }
        Ok(payload)
    }
}

impl From<Row> for Payload {
    fn from(row: Row) -> Self {
        Self {
            fields: row
                .values
                .into_iter()
                .map(|(k, v)| (k, PerLanguage::Scalar(v)))
                .collect(),
        }
    }
}

impl FromIterator<(String, PerLanguage<Value>)> for Payload {
    fn from_iter<I: IntoIterator<Item = (String, PerLanguage<Value>)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
