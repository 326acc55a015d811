use thiserror::Error;

/// Failure reported by the underlying store driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("driver error (code {code:?}): {message}")]
pub struct DriverError {
    pub code: Option<u32>,
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { code: None, message: message.into() }
    }

    #[must_use]
    pub const fn with_code(mut self, code: u32) -> Self {
        self.code = Some(code);
        self
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Table '{0}' not found")]
    TableNotFound(String),
    #[error("Column '{table}.{column}' does not exist")]
    SchemaMismatch { table: String, column: String },
    #[error("Value for column '{table}.{column}' does not match its type: {detail}")]
    TypeMismatch {
        table: String,
        column: String,
        detail: String,
    },
    #[error("Malformed predicate: {0}")]
    MalformedPredicate(String),
    #[error("Unsupported value type: {0}")]
    UnsupportedValueType(String),
    #[error("Ambiguous join from '{from}' to '{to}': {detail}")]
    AmbiguousJoin {
        from: String,
        to: String,
        detail: String,
    },
    #[error("No foreign key links '{from}' and '{to}': {detail}")]
    NoForeignKey {
        from: String,
        to: String,
        detail: String,
    },
    #[error("Query limit exceeded ({scope}): {sql}")]
    QueryLimitExceeded { scope: String, sql: String },
    #[error("A newer version of {table}#{row} has been saved (have {given}, latest {latest})")]
    VersionConflict {
        table: String,
        row: String,
        given: i64,
        latest: i64,
    },
    #[error(
        "Cannot delete from '{table}': a row is still referenced by table '{referencing_table}' (column '{referencing_column}')"
    )]
    ConstraintViolation {
        table: String,
        referencing_table: String,
        referencing_column: String,
    },
    #[error("Tried to {0} a full table without explicit confirmation")]
    ConfirmationRequired(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("{source} (query: {sql})")]
    Statement {
        sql: String,
        #[source]
        source: Box<DbError>,
    },
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    /// Attaches the SQL text that was being executed when the error occurred.
    #[must_use]
    pub fn with_sql(self, sql: impl Into<String>) -> Self {
        match self {
            already @ Self::Statement { .. } => already,
            other => Self::Statement {
                sql: sql.into(),
                source: Box::new(other),
            },
        }
    }

    /// Innermost error, looking through `Statement` wrappers.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Statement { source, .. } => source.root(),
            other => other,
        }
    }

    /// SQL attached to this error, if any.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Statement { sql, .. } => Some(sql),
            _ => None,
        }
    }

    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedPredicate(detail.into())
    }
}

pub type DbResult<T> = Result<T, DbError>;
