// Module declarations
pub mod error;
pub mod value;
pub mod data_type;
pub mod constraints;
pub mod column;
pub mod row;
pub mod schema;
pub mod payload;

// Re-exports for convenience
pub use error::{DbError, DbResult, DriverError};
pub use value::Value;
pub use data_type::DataType;
pub use constraints::ForeignKey;
pub use column::Column;
pub use row::Row;
pub use schema::TableSchema;
pub use payload::{Payload, PerLanguage};
