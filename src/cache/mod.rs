// Connection-scoped caches: table snapshots and compiled-read results
mod conditions;
mod result_cache;
mod row_cache;

pub use conditions::ConditionEvaluator;
pub use result_cache::{fingerprint, CachedResult, QueryResultCache};
pub use row_cache::{RowCache, SortKey};
