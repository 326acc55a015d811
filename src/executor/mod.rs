/// Executor module - runs reads and writes for one connection
///
/// Structure:
/// - options: per-call option structs and selectors
/// - queries: SELECT / COUNT / streamed reads, row cache and result cache paths
/// - dml: INSERT / UPDATE / DELETE across main, text and extension tables
/// - deferred: batched multi-row inserts

mod deferred;
mod dml;
pub mod options;
mod queries;

pub use options::{CheckOptions, DeleteOptions, InsertOptions, SelectOptions, Selector, UpdateOptions};
pub use queries::RowStream;

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{QueryResultCache, RowCache};
use crate::catalog::{SchemaCache, SchemaLookup, SchemaProvider};
use crate::config::{EngineConfig, LimitKind};
use crate::driver::{Driver, ExecOutcome, FixedLanguages, LanguageResolver};
use crate::transaction::TransactionManager;
use crate::types::{DbError, DbResult, Row, TableSchema};
use deferred::DeferredInserts;

/// Execution counters of one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Statements sent to the store.
    pub queries: u64,
    /// Row reads that reached the store, per table.
    pub reads: HashMap<String, u64>,
    /// Count reads that reached the store, per table.
    pub count_reads: HashMap<String, u64>,
    /// Reads answered by the row cache, per table.
    pub cache_reads: HashMap<String, u64>,
}

/// Everything a connection accumulates while it is open.
#[derive(Debug, Default)]
struct ConnectionState {
    rows: RowCache,
    results: QueryResultCache,
    query_counts: HashMap<String, u32>,
    table_counts: HashMap<String, u32>,
    transactions: TransactionManager,
    deferred: DeferredInserts,
    stats: ConnectionStats,
}

/// A logical connection: a driver plus the schema cache, language resolver,
/// configuration and per-connection caches.
pub struct Connection<D: Driver> {
    driver: D,
    schemas: SchemaCache,
    languages: Box<dyn LanguageResolver>,
    config: EngineConfig,
    state: ConnectionState,
    closed: bool,
}

impl<D: Driver> Connection<D> {
    pub fn new(driver: D, provider: impl SchemaProvider + 'static, config: EngineConfig) -> Self {
        Self {
            driver,
            schemas: SchemaCache::new(Box::new(provider)),
            languages: Box::new(FixedLanguages::default()),
            config,
            state: ConnectionState::default(),
            closed: false,
        }
    }

    #[must_use]
    pub fn with_languages(mut self, languages: impl LanguageResolver + 'static) -> Self {
        self.languages = Box::new(languages);
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.state.stats
    }

    pub fn set_query_limit(&mut self, kind: LimitKind, limit: u32) {
        self.config.set_limit(kind, limit);
    }

    /// Schema of `table`. The version-lock ledger has a built-in schema
    /// when the provider does not describe it.
    pub fn schema(&mut self, table: &str) -> DbResult<Arc<TableSchema>> {
        match self.schemas.lookup(table) {
            Err(DbError::TableNotFound(_)) if table == self.config.version_lock_table => {
                Ok(self.schemas.register(dml::version_lock_schema(table)))
            }
            other => other,
        }
    }

    pub fn begin_transaction(&mut self) -> DbResult<()> {
        self.state.transactions.begin(&mut self.driver)?;
        tracing::trace!(depth = self.state.transactions.depth(), "begin");
        Ok(())
    }

    /// Returns false when no transaction was open.
    pub fn commit(&mut self) -> DbResult<bool> {
        Ok(self.state.transactions.commit(&mut self.driver)?)
    }

    /// Rolls back every open level. Cached reads may reflect rolled-back
    /// writes, so both caches are dropped.
    pub fn rollback(&mut self) -> DbResult<bool> {
        let rolled_back = self.state.transactions.rollback(&mut self.driver)?;
        if rolled_back {
            self.state.rows.clear();
            self.state.results.clear();
        }
        Ok(rolled_back)
    }

    pub fn in_transaction(&self) -> bool {
        self.state.transactions.in_transaction()
    }

    /// Runs a statement verbatim. Caches of `table` are dropped.
    pub fn execute_raw(&mut self, table: &str, sql: &str) -> DbResult<ExecOutcome> {
        let outcome = self.exec(table, sql, true, false)?;
        self.changed(table);
        self.state.rows.invalidate(table);
        Ok(outcome)
    }

    /// The table itself, its linked extension table (either direction) and
    /// its text table (either direction).
    pub fn linked_tables_of(&self, table: &str) -> Vec<String> {
        let mut tables = vec![table.to_string()];
        let mut push = |name: String| {
            if !tables.contains(&name) {
                tables.push(name);
            }
        };
        if let Some(ext) = self.config.linked_tables.get(table) {
            push(ext.clone());
        }
        for (main, ext) in &self.config.linked_tables {
            if ext == table {
                push(main.clone());
            }
        }
        if let Some(text) = self.config.text_table(table) {
            push(text);
        }
        for main in self.config.multilang.keys() {
            if self.config.text_table(main).as_deref() == Some(table) {
                push(main.clone());
            }
        }
        tables
    }

    /// Flushes deferred inserts and rolls back an open transaction.
    /// Later calls do nothing.
    pub fn close(&mut self) -> DbResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let flushed = self.flush_all_deferred();
        if self.in_transaction() {
            tracing::warn!(depth = self.state.transactions.depth(), "closing with an open transaction, rolling back");
            self.rollback()?;
        }
        flushed.map(|_| ())
    }

    /// Drops cached results of `table` and of every table composed with it.
    fn changed(&mut self, table: &str) {
        for related in self.linked_tables_of(table) {
            self.state.results.invalidate_table(&related);
            if related != table {
                self.state.rows.invalidate(&related);
            }
        }
    }

    fn check_limits(&mut self, table: &str, sql: &str, counted: bool) -> DbResult<()> {
        self.state.stats.queries += 1;
        if !counted {
            return Ok(());
        }

        let per_query = self.state.query_counts.entry(sql.to_string()).or_default();
        *per_query += 1;
        if self.config.query_limit > 0 && *per_query > self.config.query_limit {
            return Err(DbError::QueryLimitExceeded {
                scope: "query".to_string(),
                sql: sql.to_string(),
            });
        }

        let per_table = self.state.table_counts.entry(table.to_string()).or_default();
        *per_table += 1;
        if self.config.query_limit_table > 0 && *per_table > self.config.query_limit_table {
            return Err(DbError::QueryLimitExceeded {
                scope: format!("table {table}"),
                sql: sql.to_string(),
            });
        }
        Ok(())
    }

    fn log_statement(&self, table: &str, kind: &str, sql: &str, debug: bool) {
        if debug || self.config.debug {
            tracing::info!(table, kind, sql, "statement");
        } else {
            tracing::debug!(table, kind, sql, "statement");
        }
    }

    /// Runs a write statement; failures carry the SQL.
    fn exec(&mut self, table: &str, sql: &str, counted: bool, debug: bool) -> DbResult<ExecOutcome> {
        self.check_limits(table, sql, counted).map_err(|e| e.with_sql(sql))?;
        self.log_statement(table, "write", sql, debug);
        self.driver
            .execute(sql)
            .map_err(|e| DbError::from(e).with_sql(sql))
    }

    /// Runs a read statement and collects its rows.
    fn fetch(&mut self, table: &str, sql: &str, counted: bool, debug: bool) -> DbResult<Vec<Row>> {
        self.check_limits(table, sql, counted)?;
        self.log_statement(table, "read", sql, debug);
        let rows = self.driver.query(sql)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Runs `op` inside a transaction level, rolling everything back when it fails.
    fn atomically<T>(&mut self, op: impl FnOnce(&mut Self) -> DbResult<T>) -> DbResult<T> {
        self.begin_transaction()?;
        match op(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(error = %e, "write failed, rolling back");
                if let Err(rollback) = self.rollback() {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

impl<D: Driver> Drop for Connection<D> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "connection teardown failed");
        }
    }
}
