// SQL text generation: literals and identifiers, where-specs, joins and statements
pub mod quote;
pub mod predicate;
pub mod joins;
pub mod select;
pub mod write;

pub use quote::{mysql_quote, quote_literal, sanitize_identifier, FieldScope, MysqlQuoter, Quoter};
pub use predicate::{CompareOp, Glue, Predicate, WhereCompiler, WhereSpec};
pub use joins::{plan_joins, JoinCondition, JoinField, JoinKind, JoinSpec, ResolvedJoin};
pub use select::{Aggregate, AggregateFn, Composition, Limit, Projection, SelectBuilder, SelectShape};
