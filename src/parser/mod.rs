// Module declarations
mod common;
mod messages;
mod where_json;

// Re-export the parsers used by the compiler and the executor
pub use common::{limit_clause, parse_wkt_point, simple_order_by, SortDirection};
pub use messages::{parse_fk_violation, ForeignKeyFailure};
pub use where_json::{parse_where, parse_where_str};
