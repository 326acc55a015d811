use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::types::{Row, Value};

/// A materialized read result.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedResult {
    Row(Option<Row>),
    Rows(Vec<Row>),
    Value(Option<Value>),
    Count(u64),
}

/// Key of a compiled read: the SQL text plus the options that change how
/// its rows are turned into a result.
pub fn fingerprint(sql: &str, shape: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    hasher.update([0u8]);
    hasher.update(shape.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compiled-read results grouped by table; a write clears its table's group.
#[derive(Debug, Clone, Default)]
pub struct QueryResultCache {
    tables: HashMap<String, HashMap<String, CachedResult>>,
}

impl QueryResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table: &str, key: &str) -> Option<&CachedResult> {
        self.tables.get(table)?.get(key)
    }

    pub fn insert(&mut self, table: &str, key: String, result: CachedResult) {
        self.tables.entry(table.to_string()).or_default().insert(key, result);
    }

    /// Drops every result read from `table`.
    pub fn invalidate_table(&mut self, table: &str) {
        if let Some(entries) = self.tables.get_mut(table) {
            entries.clear();
        }
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_depends_on_shape() {
        let sql = "SELECT `t`.* FROM `users` `t`";
        assert_eq!(fingerprint(sql, "rows"), fingerprint(sql, "rows"));
        assert_ne!(fingerprint(sql, "rows"), fingerprint(sql, "row"));
        assert_eq!(fingerprint(sql, "rows").len(), 64);
    }

    #[test]
    fn test_invalidate_table() {
        let mut cache = QueryResultCache::new();
        cache.insert("users", "a".to_string(), CachedResult::Count(3));
        cache.insert("posts", "b".to_string(), CachedResult::Value(None));
        assert_eq!(cache.len(), 2);

        cache.invalidate_table("users");
        assert!(cache.get("users", "a").is_none());
        assert_eq!(cache.get("posts", "b"), Some(&CachedResult::Value(None)));
        cache.clear();
        assert!(cache.is_empty());
    }
}
