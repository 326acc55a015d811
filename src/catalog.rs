/// Table schema sources and the per-connection schema cache.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::types::{DbError, DbResult, TableSchema};

/// Produces table metadata; introspection lives behind this trait.
pub trait SchemaProvider {
    /// Schema of `table`, or `None` when no such table exists.
    fn table_schema(&self, table: &str) -> DbResult<Option<TableSchema>>;
}

/// Resolution of table names to schemas, failing on unknown tables.
pub trait SchemaLookup {
    fn lookup(&mut self, table: &str) -> DbResult<Arc<TableSchema>>;
}

/// Fixed set of schemas, e.g. loaded from a JSON catalog file.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemas {
    tables: HashMap<String, Arc<TableSchema>>,
}

impl StaticSchemas {
    #[must_use]
    pub fn new(schemas: Vec<TableSchema>) -> Self {
        Self {
            tables: schemas
                .into_iter()
                .map(|s| (s.name.clone(), Arc::new(s)))
                .collect(),
        }
    }

    /// Reads a JSON array of table schemas.
    pub fn from_json_file(path: impl AsRef<Path>) -> DbResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let schemas: Vec<TableSchema> = serde_json::from_str(&text)?;
        Ok(Self::new(schemas))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

impl SchemaProvider for StaticSchemas {
    fn table_schema(&self, table: &str) -> DbResult<Option<TableSchema>> {
        Ok(self.tables.get(table).map(|s| (**s).clone()))
    }
}

impl SchemaLookup for StaticSchemas {
    fn lookup(&mut self, table: &str) -> DbResult<Arc<TableSchema>> {
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| DbError::TableNotFound(table.to_string()))
    }
}

/// Lazily filled schema cache, kept for the lifetime of a connection.
pub struct SchemaCache {
    provider: Box<dyn SchemaProvider>,
    loaded: HashMap<String, Arc<TableSchema>>,
}

impl SchemaCache {
    pub fn new(provider: Box<dyn SchemaProvider>) -> Self {
        Self {
            provider,
            loaded: HashMap::new(),
        }
    }

    /// Adds a schema the provider does not know about.
    pub fn register(&mut self, schema: TableSchema) -> Arc<TableSchema> {
        let schema = Arc::new(schema);
        self.loaded.insert(schema.name.clone(), Arc::clone(&schema));
        schema
    }

    /// Whether `table` exists, without failing on unknown names.
    pub fn exists(&mut self, table: &str) -> DbResult<bool> {
        match self.lookup(table) {
            Ok(_) => Ok(true),
            Err(DbError::TableNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl SchemaLookup for SchemaCache {
    fn lookup(&mut self, table: &str) -> DbResult<Arc<TableSchema>> {
        if let Some(schema) = self.loaded.get(table) {
            return Ok(Arc::clone(schema));
        }
        let schema = self
            .provider
            .table_schema(table)?
            .ok_or_else(|| DbError::TableNotFound(table.to_string()))?;
        tracing::trace!(table, columns = schema.columns.len(), "schema loaded");
        let schema = Arc::new(schema);
        self.loaded.insert(table.to_string(), Arc::clone(&schema));
        Ok(schema)
    }
}
