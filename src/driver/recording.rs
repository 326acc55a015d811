use crate::sql::Quoter;
use crate::types::{DriverError, Row};
use super::{Driver, ExecOutcome, RowIter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxCall {
    Begin,
    Commit,
    Rollback,
}

/// In-memory driver that records every statement and answers queries from
/// scripted responses. Responses are matched by SQL substring; the most
/// recently registered match wins. Unmatched queries return no rows.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    responses: Vec<(String, Vec<Row>)>,
    failures: Vec<(String, DriverError)>,
    affected: Vec<(String, u64)>,
    statements: Vec<String>,
    transactions: Vec<TxCall>,
    next_id: i64,
}

impl RecordingDriver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Rows returned by queries containing `pattern`.
    pub fn respond(&mut self, pattern: impl Into<String>, rows: Vec<Row>) -> &mut Self {
        self.responses.push((pattern.into(), rows));
        self
    }

    /// Statements containing `pattern` fail with `error`.
    pub fn fail(&mut self, pattern: impl Into<String>, error: DriverError) -> &mut Self {
        self.failures.push((pattern.into(), error));
        self
    }

    /// Affected-row count reported for statements containing `pattern` (default 1).
    pub fn affect(&mut self, pattern: impl Into<String>, rows: u64) -> &mut Self {
        self.affected.push((pattern.into(), rows));
        self
    }

    /// Drops every scripted response, failure and affected count.
    pub fn reset_script(&mut self) {
        self.responses.clear();
        self.failures.clear();
        self.affected.clear();
    }

    #[must_use]
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Recorded statements containing `pattern`.
    #[must_use]
    pub fn matching(&self, pattern: &str) -> Vec<&str> {
        self.statements
            .iter()
            .filter(|s| s.contains(pattern))
            .map(String::as_str)
            .collect()
    }

    #[must_use]
    pub fn transactions(&self) -> &[TxCall] {
        &self.transactions
    }

    pub fn clear_log(&mut self) {
        self.statements.clear();
        self.transactions.clear();
    }

    fn record(&mut self, sql: &str) -> Result<(), DriverError> {
        self.statements.push(sql.to_string());
        match self.failures.iter().rev().find(|(p, _)| sql.contains(p.as_str())) {
            Some((_, error)) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl Quoter for RecordingDriver {}

impl Driver for RecordingDriver {
    fn execute(&mut self, sql: &str) -> Result<ExecOutcome, DriverError> {
        self.record(sql)?;
        let affected = self
            .affected
            .iter()
            .rev()
            .find(|(p, _)| sql.contains(p.as_str()))
            .map_or(1, |(_, n)| *n);
        let upper = sql.trim_start().to_ascii_uppercase();
        let last_insert_id = if upper.starts_with("INSERT") || upper.starts_with("REPLACE") {
            let id = self.next_id;
            self.next_id += 1;
            Some(id)
        } else {
            None
        };
        Ok(ExecOutcome { affected, last_insert_id })
    }

    fn query(&mut self, sql: &str) -> Result<RowIter<'_>, DriverError> {
        self.record(sql)?;
        let rows = self
            .responses
            .iter()
            .rev()
            .find(|(p, _)| sql.contains(p.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        self.transactions.push(TxCall::Begin);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.transactions.push(TxCall::Commit);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.transactions.push(TxCall::Rollback);
        Ok(())
    }
}
