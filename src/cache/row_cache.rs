use std::collections::HashMap;

use crate::parser::SortDirection;
use crate::sql::{Glue, Limit};
use crate::types::{Row, Value};
use super::conditions::ConditionEvaluator;

/// Sort key and direction of a cache read.
pub type SortKey = (String, SortDirection);

#[derive(Debug, Clone)]
struct CachedTable {
    lang: String,
    rows: Vec<Row>,
}

/// Full-table snapshots of the cacheable tables, per connection.
#[derive(Debug, Clone, Default)]
pub struct RowCache {
    tables: HashMap<String, CachedTable>,
}

impl RowCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a snapshot of `table` in language `lang` is held.
    pub fn is_loaded(&self, table: &str, lang: &str) -> bool {
        self.tables.get(table).is_some_and(|t| t.lang == lang)
    }

    pub fn load(&mut self, table: &str, lang: &str, rows: Vec<Row>) {
        tracing::trace!(table, rows = rows.len(), "row cache loaded");
        self.tables.insert(
            table.to_string(),
            CachedTable {
                lang: lang.to_string(),
                rows,
            },
        );
    }

    /// Language of the snapshot of `table`, if loaded.
    pub fn language(&self, table: &str) -> Option<&str> {
        self.tables.get(table).map(|t| t.lang.as_str())
    }

    /// Filters, sorts and paginates the snapshot. `None` when not loaded.
    pub fn query(
        &self,
        table: &str,
        conditions: &[(&str, &Value)],
        glue: Glue,
        order: Option<&SortKey>,
        limit: Option<Limit>,
    ) -> Option<Vec<Row>> {
        let cached = self.tables.get(table)?;
        let mut rows: Vec<Row> = cached
            .rows
            .iter()
            .filter(|row| ConditionEvaluator::evaluate(row, conditions, glue))
            .cloned()
            .collect();

        if let Some((field, direction)) = order {
            rows.sort_by(|a, b| {
                let ord = ConditionEvaluator::compare(
                    a.get(field).unwrap_or(&Value::Null),
                    b.get(field).unwrap_or(&Value::Null),
                );
                match direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            });
        }

        if let Some(limit) = limit {
            rows = rows
                .into_iter()
                .skip(usize::try_from(limit.offset()).unwrap_or(usize::MAX))
                .take(usize::try_from(limit.count()).unwrap_or(usize::MAX))
                .collect();
        }
        Some(rows)
    }

    pub fn apply_insert(&mut self, table: &str, row: Row) {
        if let Some(cached) = self.tables.get_mut(table) {
            cached.rows.push(row);
        }
    }

    /// Merges `changes` into every matching row; returns how many matched.
    pub fn apply_update(&mut self, table: &str, conditions: &[(&str, &Value)], glue: Glue, changes: &Row) -> usize {
        let Some(cached) = self.tables.get_mut(table) else {
            return 0;
        };
        let mut matched = 0;
        for row in &mut cached.rows {
            if ConditionEvaluator::evaluate(row, conditions, glue) {
                row.merge(changes);
                matched += 1;
            }
        }
        matched
    }

    /// Removes every matching row; returns how many were removed.
    pub fn apply_delete(&mut self, table: &str, conditions: &[(&str, &Value)], glue: Glue) -> usize {
        let Some(cached) = self.tables.get_mut(table) else {
            return 0;
        };
        let before = cached.rows.len();
        cached.rows.retain(|row| !ConditionEvaluator::evaluate(row, conditions, glue));
        before - cached.rows.len()
    }

    /// Forgets the snapshot; the next eligible read reloads it.
    pub fn invalidate(&mut self, table: &str) {
        if self.tables.remove(table).is_some() {
            tracing::trace!(table, "row cache dropped");
        }
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cities() -> RowCache {
        let mut cache = RowCache::new();
        cache.load(
            "cities",
            "en",
            vec![
                Row::new().with("id", 1).with("name", "Rome").with("country", "IT"),
                Row::new().with("id", 2).with("name", "milan").with("country", "IT"),
                Row::new().with("id", 3).with("name", "Paris").with("country", "FR"),
                Row::new().with("id", 10).with("name", "Lyon").with("country", "FR"),
            ],
        );
        cache
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter().filter_map(|r| r.get("id").and_then(Value::as_int)).collect()
    }

    #[test]
    fn test_filter_sort_paginate() {
        let cache = cities();
        let fr = Value::from("fr");
        let rows = cache.query("cities", &[("country", &fr)], Glue::And, None, None).unwrap();
        assert_eq!(ids(&rows), vec![3, 10]);

        let order = ("id".to_string(), SortDirection::Desc);
        let rows = cache
            .query("cities", &[], Glue::And, Some(&order), Some(Limit::Range { offset: 1, count: 2 }))
            .unwrap();
        assert_eq!(ids(&rows), vec![3, 2]);

        let order = ("name".to_string(), SortDirection::Asc);
        let rows = cache.query("cities", &[], Glue::And, Some(&order), Some(Limit::Count(2))).unwrap();
        assert_eq!(ids(&rows), vec![10, 2]);

        assert!(cache.query("towns", &[], Glue::And, None, None).is_none());
    }

    #[test]
    fn test_writes_are_replayed() {
        let mut cache = cities();
        let it = Value::from("IT");
        assert_eq!(
            cache.apply_update("cities", &[("country", &it)], Glue::And, &Row::new().with("country", "Italy")),
            2
        );
        let italy = Value::from("italy");
        assert_eq!(cache.query("cities", &[("country", &italy)], Glue::And, None, None).unwrap().len(), 2);

        let three = Value::Integer(3);
        assert_eq!(cache.apply_delete("cities", &[("id", &three)], Glue::And), 1);
        cache.apply_insert("cities", Row::new().with("id", 11).with("name", "Nice"));
        let rows = cache.query("cities", &[], Glue::And, None, None).unwrap();
        assert_eq!(ids(&rows), vec![1, 2, 10, 11]);
    }

    #[test]
    fn test_language_scoping() {
        let mut cache = cities();
        assert!(cache.is_loaded("cities", "en"));
        assert!(!cache.is_loaded("cities", "it"));
        cache.invalidate("cities");
        assert!(!cache.is_loaded("cities", "en"));
    }
}
