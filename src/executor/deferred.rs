/// Deferred inserts
///
/// Rows queued per table and written as one multi-row INSERT once the
/// batch reaches its threshold, on an explicit flush, or on close.

use std::collections::BTreeMap;

use crate::driver::Driver;
use crate::sql::write::insert_many_sql;
use crate::types::{DbError, DbResult, Row};
use super::options::InsertOptions;
use super::Connection;

#[derive(Debug)]
struct DeferredBatch {
    /// Options shared by every queued row, with `defer` cleared.
    options: InsertOptions,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
pub(crate) struct DeferredInserts {
    batches: BTreeMap<String, DeferredBatch>,
}

impl DeferredInserts {
    fn take(&mut self, table: &str) -> Option<DeferredBatch> {
        self.batches.remove(table).filter(|batch| !batch.rows.is_empty())
    }

    fn tables(&self) -> Vec<String> {
        self.batches.keys().cloned().collect()
    }
}

impl<D: Driver> Connection<D> {
    /// Queues `row` and flushes the table's batch once it holds `threshold` rows.
    pub(crate) fn defer_insert(&mut self, table: &str, row: Row, options: &InsertOptions, threshold: usize) -> DbResult<()> {
        let options = InsertOptions {
            defer: None,
            ..options.clone()
        };
        let batch = self
            .state
            .deferred
            .batches
            .entry(table.to_string())
            .or_insert_with(|| DeferredBatch {
                options: options.clone(),
                rows: Vec::new(),
            });
        if batch.options != options {
            return Err(DbError::InvalidOperation(format!(
                "deferred inserts into '{table}' must share their options; flush before changing them"
            )));
        }
        batch.rows.push(row);
        let queued = batch.rows.len();
        tracing::trace!(table, queued, threshold, "insert deferred");

        if queued >= threshold.max(1) {
            self.flush_deferred(table)?;
        }
        Ok(())
    }

    /// Writes the queued rows of `table` as one statement. Returns the
    /// affected row count, 0 when nothing was queued.
    pub fn flush_deferred(&mut self, table: &str) -> DbResult<u64> {
        let Some(batch) = self.state.deferred.take(table) else {
            return Ok(0);
        };
        let sql = insert_many_sql(&self.driver, table, &batch.rows, batch.options.replace);
        let outcome = self.atomically(|conn| {
            conn.exec(table, &sql, batch.options.query_limit, batch.options.debug)
        })?;
        tracing::debug!(table, rows = batch.rows.len(), "deferred inserts flushed");

        self.changed(table);
        self.state.rows.invalidate(table);
        Ok(outcome.affected)
    }

    /// Flushes every table's queue. The first failure stops the flush; the
    /// failed batch is dropped, later batches stay queued.
    pub fn flush_all_deferred(&mut self) -> DbResult<u64> {
        let mut affected = 0;
        for table in self.state.deferred.tables() {
            affected += self.flush_deferred(&table)?;
        }
        Ok(affected)
    }

    /// Rows currently queued for `table`.
    pub fn deferred_len(&self, table: &str) -> usize {
        self.state.deferred.batches.get(table).map_or(0, |b| b.rows.len())
    }
}
