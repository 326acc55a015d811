// tablekit - relational data access over a MySQL-flavored store
// Where-spec compilation, composed-table CRUD and connection-scoped caching

// Clippy configuration - allow non-critical warnings
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::format_push_string)]
#![allow(clippy::wildcard_enum_match_arm)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_const_for_fn)]

// Core data structures (values, rows, schemas, payloads, errors)
pub mod core;

// Backward compatibility - re-export all core types as types module
pub mod types {
    pub use crate::core::*;
}

// Where-spec JSON, driver messages and small clause grammars
pub mod parser;

// SQL text generation (quoting, predicates, joins, SELECT, writes)
pub mod sql;

// Table schemas: provider seam and per-connection cache
pub mod catalog;

// Driver and language-resolver seams
pub mod driver;

// Engine configuration (file + environment)
pub mod config;

// Row cache and compiled-read result cache
pub mod cache;

// Nested transaction depth over the driver's transaction
pub mod transaction;

// Connection: reads, writes, deferred inserts
pub mod executor;

// Re-export commonly used types for convenience
pub use core::{Column, DataType, DbError, DbResult, DriverError, Payload, PerLanguage, Row, TableSchema, Value};
pub use catalog::{SchemaProvider, StaticSchemas};
pub use config::EngineConfig;
pub use driver::{Driver, ExecOutcome, FixedLanguages, LanguageResolver};
pub use executor::{
    CheckOptions, Connection, DeleteOptions, InsertOptions, RowStream, SelectOptions, Selector, UpdateOptions,
};
pub use sql::{CompareOp, Glue, JoinSpec, WhereSpec};

/// Installs the fmt subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_logging(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .try_init();
}
