/// Per-call options of the read and write operations.
///
/// Every option has a documented default; builders only flip what differs.

use crate::sql::{Aggregate, Glue, JoinSpec, Limit, Projection, SelectShape, WhereSpec};
use crate::types::Value;

/// What a read or write applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Spec(WhereSpec),
    /// Equality on the table's single primary-key column.
    Id(Value),
    /// Rows where the named field is truthy, not an equality: `"active"`
    /// compiles to ``WHERE (`t`.`active`)``.
    Field(String),
}

impl From<WhereSpec> for Selector {
    fn from(spec: WhereSpec) -> Self {
        Self::Spec(spec)
    }
}

impl From<i64> for Selector {
    fn from(id: i64) -> Self {
        Self::Id(Value::Integer(id))
    }
}

impl From<i32> for Selector {
    fn from(id: i32) -> Self {
        Self::Id(Value::Integer(i64::from(id)))
    }
}

impl From<&str> for Selector {
    fn from(field: &str) -> Self {
        Self::Field(field.to_string())
    }
}

/// Validation of write payloads against the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOptions {
    /// Reject unknown columns.
    pub check: bool,
    pub check_types: bool,
    /// Enforce declared char/varchar lengths.
    pub check_lengths: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            check: true,
            check_types: true,
            check_lengths: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectOptions {
    /// Glue of the top-level where-spec.
    pub glue: Glue,
    pub distinct: Option<String>,
    pub limit: Option<Limit>,
    pub order_by: Option<String>,
    pub group_by: Option<String>,
    pub having: WhereSpec,
    pub joins: Vec<JoinSpec>,
    pub field: Option<String>,
    pub fields: Option<Vec<String>>,
    pub aggregates: Vec<Aggregate>,
    pub only_aggregates: bool,
    /// Language of translated fields; the resolver's current one by default.
    pub lang: Option<String>,
    /// Fall back to other languages when a translation is missing.
    pub fallback: bool,
    /// Compose the text and extension tables into the row.
    pub multilang: bool,
    /// Bypass the row cache.
    pub ignore_cache: bool,
    /// Use the compiled-read result cache.
    pub quick_cache: bool,
    /// Count this statement against the query limits.
    pub query_limit: bool,
    pub debug: bool,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            glue: Glue::And,
            distinct: None,
            limit: None,
            order_by: None,
            group_by: None,
            having: WhereSpec::new(),
            joins: Vec::new(),
            field: None,
            fields: None,
            aggregates: Vec::new(),
            only_aggregates: false,
            lang: None,
            fallback: true,
            multilang: true,
            ignore_cache: false,
            quick_cache: true,
            query_limit: true,
            debug: false,
        }
    }
}

impl SelectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn or(mut self) -> Self {
        self.glue = Glue::Or;
        self
    }

    #[must_use]
    pub const fn limit(mut self, count: u64) -> Self {
        self.limit = Some(Limit::Count(count));
        self
    }

    #[must_use]
    pub const fn range(mut self, offset: u64, count: u64) -> Self {
        self.limit = Some(Limit::Range { offset, count });
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: impl Into<String>) -> Self {
        self.order_by = Some(order.into());
        self
    }

    #[must_use]
    pub fn group_by(mut self, group: impl Into<String>) -> Self {
        self.group_by = Some(group.into());
        self
    }

    #[must_use]
    pub fn having(mut self, having: WhereSpec) -> Self {
        self.having = having;
        self
    }

    #[must_use]
    pub fn join(mut self, join: JoinSpec) -> Self {
        self.joins.push(join);
        self
    }

    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    #[must_use]
    pub fn fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregates.push(aggregate);
        self
    }

    #[must_use]
    pub const fn only_aggregates(mut self) -> Self {
        self.only_aggregates = true;
        self
    }

    #[must_use]
    pub fn distinct(mut self, field: impl Into<String>) -> Self {
        self.distinct = Some(field.into());
        self
    }

    #[must_use]
    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    #[must_use]
    pub const fn no_fallback(mut self) -> Self {
        self.fallback = false;
        self
    }

    #[must_use]
    pub const fn without_multilang(mut self) -> Self {
        self.multilang = false;
        self
    }

    #[must_use]
    pub const fn ignore_cache(mut self) -> Self {
        self.ignore_cache = true;
        self
    }

    #[must_use]
    pub const fn no_quick_cache(mut self) -> Self {
        self.quick_cache = false;
        self
    }

    #[must_use]
    pub const fn no_query_limit(mut self) -> Self {
        self.query_limit = false;
        self
    }

    #[must_use]
    pub const fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// SQL shape of the read. Single-row reads default to `LIMIT 1`.
    pub(crate) fn shape(&self, single: bool) -> SelectShape {
        let projection = match (&self.field, &self.fields) {
            (Some(field), _) => Projection::Field(field.clone()),
            (None, Some(fields)) => Projection::Fields(fields.clone()),
            (None, None) => Projection::All,
        };
        SelectShape {
            projection,
            distinct: self.distinct.clone(),
            aggregates: self.aggregates.clone(),
            only_aggregates: self.only_aggregates,
            group_by: self.group_by.clone(),
            having: self.having.clone(),
            order_by: self.order_by.clone(),
            limit: self.limit.or(if single { Some(Limit::Count(1)) } else { None }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOptions {
    /// Emit `REPLACE INTO`.
    pub replace: bool,
    /// Queue the row and flush once this many rows are queued.
    pub defer: Option<usize>,
    pub check: CheckOptions,
    pub query_limit: bool,
    pub debug: bool,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self {
            replace: false,
            defer: None,
            check: CheckOptions::default(),
            query_limit: true,
            debug: false,
        }
    }
}

impl InsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn replace(mut self) -> Self {
        self.replace = true;
        self
    }

    #[must_use]
    pub const fn defer(mut self, rows: usize) -> Self {
        self.defer = Some(rows);
        self
    }

    #[must_use]
    pub const fn check(mut self, check: CheckOptions) -> Self {
        self.check = check;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Optimistic lock: the row version the caller last read.
    pub version: Option<i64>,
    /// Allow updating every row.
    pub confirm: bool,
    pub check: CheckOptions,
    pub query_limit: bool,
    pub debug: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            version: None,
            confirm: false,
            check: CheckOptions::default(),
            query_limit: true,
            debug: false,
        }
    }
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    #[must_use]
    pub const fn confirm(mut self) -> Self {
        self.confirm = true;
        self
    }

    #[must_use]
    pub const fn check(mut self, check: CheckOptions) -> Self {
        self.check = check;
        self
    }
}

#[derive(Debug, Clone)]
pub struct DeleteOptions {
    /// Allow deleting every row.
    pub confirm: bool,
    pub joins: Vec<JoinSpec>,
    pub query_limit: bool,
    pub debug: bool,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            confirm: false,
            joins: Vec::new(),
            query_limit: true,
            debug: false,
        }
    }
}

impl DeleteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn confirm(mut self) -> Self {
        self.confirm = true;
        self
    }

    #[must_use]
    pub fn join(mut self, join: JoinSpec) -> Self {
        self.joins.push(join);
        self
    }
}
