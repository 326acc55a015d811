/// SELECT and COUNT statement construction over a table and its composed
/// text/extension tables.

use crate::parser::limit_clause;
use crate::types::{DataType, DbError, DbResult, TableSchema};
use super::joins::{join_projection, render_joins, ResolvedJoin};
use super::predicate::{Glue, WhereCompiler, WhereSpec};
use super::quote::{sanitize_fragment, sanitize_identifier, AliasedFields, FieldScope, Quoter};

pub const MAIN_ALIAS: &str = "t";
pub const TEXT_ALIAS: &str = "lang";
pub const LINKED_ALIAS: &str = "c";
pub const CUSTOM_TEXT_ALIAS: &str = "custom_ml";

/// Row count of the last `SQL_CALC_FOUND_ROWS` statement.
pub const FOUND_ROWS_SQL: &str = "SELECT FOUND_ROWS() AS `n`";

/// Per-language text table joined to the main table.
#[derive(Debug, Clone)]
pub struct TextJoin {
    pub table: String,
    pub parent_field: String,
    pub lang_field: String,
    pub fields: Vec<String>,
    pub lang: String,
    /// Languages tried, in order, when `lang` has no row.
    pub fallbacks: Vec<String>,
}

/// Extension table sharing the main table's primary key.
#[derive(Debug, Clone)]
pub struct LinkedJoin {
    pub table: String,
    pub key: String,
    pub fields: Vec<String>,
}

/// Text table of the extension table, keyed by the text row's id.
#[derive(Debug, Clone)]
pub struct CustomTextJoin {
    pub table: String,
    pub key: String,
    pub text_key: String,
    pub fields: Vec<String>,
}

/// The secondary tables a logical row of the main table spans.
#[derive(Debug, Clone, Default)]
pub struct Composition {
    pub multilang: Option<TextJoin>,
    pub linked: Option<LinkedJoin>,
    pub custom_multilang: Option<CustomTextJoin>,
}

impl Composition {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.multilang.is_none() && self.linked.is_none() && self.custom_multilang.is_none()
    }

    /// Field scope of a statement on the main table aliased `t`.
    #[must_use]
    pub fn scope(&self, joins: &[ResolvedJoin]) -> FieldScope {
        FieldScope {
            main_alias: Some(MAIN_ALIAS.to_string()),
            joins: joins.to_vec(),
            multilang: self
                .multilang
                .as_ref()
                .map(|m| AliasedFields::new(TEXT_ALIAS, m.fields.clone())),
            linked: self
                .linked
                .as_ref()
                .map(|l| AliasedFields::new(LINKED_ALIAS, l.fields.clone())),
            custom_multilang: self
                .custom_multilang
                .as_ref()
                .map(|c| AliasedFields::new(CUSTOM_TEXT_ALIAS, c.fields.clone())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl AggregateFn {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Count => "COUNT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub function: AggregateFn,
    pub field: String,
    pub alias: Option<String>,
}

impl Aggregate {
    pub fn new(function: AggregateFn, field: impl Into<String>) -> Self {
        Self {
            function,
            field: field.into(),
            alias: None,
        }
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Column name of the aggregate in result rows.
    #[must_use]
    pub fn output_name(&self) -> String {
        self.alias.clone().unwrap_or_else(|| {
            format!(
                "{}_{}",
                self.function.as_sql().to_ascii_lowercase(),
                self.field.replace('.', "_")
            )
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Count(u64),
    Range { offset: u64, count: u64 },
}

impl Limit {
    /// Reads `count` or `offset,count`.
    pub fn parse(text: &str) -> DbResult<Self> {
        match limit_clause(text) {
            Some((Some(offset), count)) => Ok(Self::Range { offset, count }),
            Some((None, count)) => Ok(Self::Count(count)),
            None => Err(DbError::malformed(format!("invalid limit '{text}'"))),
        }
    }

    #[must_use]
    pub const fn offset(self) -> u64 {
        match self {
            Self::Count(_) => 0,
            Self::Range { offset, .. } => offset,
        }
    }

    #[must_use]
    pub const fn count(self) -> u64 {
        match self {
            Self::Count(count) | Self::Range { count, .. } => count,
        }
    }

    #[must_use]
    pub fn as_sql(self) -> String {
        match self {
            Self::Count(count) => format!("LIMIT {count}"),
            Self::Range { offset, count } => format!("LIMIT {offset},{count}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    Field(String),
    Fields(Vec<String>),
}

/// Everything about a read that shapes its SQL besides the filter.
#[derive(Debug, Clone, Default)]
pub struct SelectShape {
    pub projection: Projection,
    pub distinct: Option<String>,
    pub aggregates: Vec<Aggregate>,
    pub only_aggregates: bool,
    pub group_by: Option<String>,
    pub having: WhereSpec,
    pub order_by: Option<String>,
    pub limit: Option<Limit>,
}

/// Builds read statements for one table.
pub struct SelectBuilder<'a> {
    quoter: &'a dyn Quoter,
    table: &'a TableSchema,
    composition: &'a Composition,
    joins: &'a [ResolvedJoin],
    hide_column: Option<&'a str>,
    scope: FieldScope,
}

impl<'a> SelectBuilder<'a> {
    pub fn new(
        quoter: &'a dyn Quoter,
        table: &'a TableSchema,
        composition: &'a Composition,
        joins: &'a [ResolvedJoin],
    ) -> Self {
        Self {
            quoter,
            table,
            composition,
            joins,
            hide_column: None,
            scope: composition.scope(joins),
        }
    }

    /// Excludes rows whose `column` flag is set.
    #[must_use]
    pub const fn hide(mut self, column: Option<&'a str>) -> Self {
        self.hide_column = column;
        self
    }

    #[must_use]
    pub const fn scope(&self) -> &FieldScope {
        &self.scope
    }

    fn main_key(&self) -> DbResult<String> {
        Ok(sanitize_identifier(&format!(
            "{MAIN_ALIAS}.{}",
            self.table.sole_primary_key()?
        )))
    }

    fn text_join(&self, text: &TextJoin) -> DbResult<String> {
        let lang_column = sanitize_identifier(&format!("{TEXT_ALIAS}.{}", text.lang_field));
        let parent = sanitize_identifier(&format!("{TEXT_ALIAS}.{}", text.parent_field));
        let main_key = self.main_key()?;

        let wanted = self.quoter.quote(&text.lang);
        let language = match text.fallbacks.split_last() {
            None => wanted,
            Some((last, preferred)) => {
                let mut case = String::from("(CASE");
                for candidate in std::iter::once(&text.lang).chain(preferred) {
                    let quoted = self.quoter.quote(candidate);
                    case.push_str(&format!(
                        " WHEN {quoted} IN (SELECT {} FROM {} WHERE {} = {main_key}) THEN {quoted}",
                        sanitize_identifier(&text.lang_field),
                        sanitize_identifier(&text.table),
                        sanitize_identifier(&text.parent_field),
                    ));
                }
                case.push_str(&format!(" ELSE {} END)", self.quoter.quote(last)));
                case
            }
        };
        Ok(format!(
            " LEFT OUTER JOIN {} AS {} ON {parent} = {main_key} AND {lang_column} LIKE {language}",
            sanitize_identifier(&text.table),
            sanitize_identifier(TEXT_ALIAS),
        ))
    }

    fn from_clause(&self) -> DbResult<String> {
        let mut sql = format!(
            " FROM {} {}",
            sanitize_identifier(&self.table.name),
            sanitize_identifier(MAIN_ALIAS)
        );
        if let Some(text) = &self.composition.multilang {
            sql.push_str(&self.text_join(text)?);
        }
        if let Some(linked) = &self.composition.linked {
            sql.push_str(&format!(
                " LEFT JOIN {} AS {} ON {} = {}",
                sanitize_identifier(&linked.table),
                sanitize_identifier(LINKED_ALIAS),
                sanitize_identifier(&format!("{LINKED_ALIAS}.{}", linked.key)),
                self.main_key()?
            ));
        }
        if let (Some(custom), Some(_)) = (&self.composition.custom_multilang, &self.composition.multilang) {
            sql.push_str(&format!(
                " LEFT JOIN {} AS {} ON {} = {}",
                sanitize_identifier(&custom.table),
                sanitize_identifier(CUSTOM_TEXT_ALIAS),
                sanitize_identifier(&format!("{CUSTOM_TEXT_ALIAS}.{}", custom.key)),
                sanitize_identifier(&format!("{TEXT_ALIAS}.{}", custom.text_key))
            ));
        }
        sql.push_str(&render_joins(self.quoter, self.joins, &self.scope)?);
        Ok(sql)
    }

    /// ` WHERE ...`, or an empty string when nothing filters.
    pub fn where_clause(&self, spec: &WhereSpec, glue: Glue) -> DbResult<String> {
        let compiled = WhereCompiler::new(self.quoter, Some(self.table), &self.scope).compile(&spec.items, glue)?;
        let hidden = self
            .hide_column
            .map(|column| format!("{} = 0", sanitize_identifier(&format!("{MAIN_ALIAS}.{column}"))));
        Ok(match (compiled.is_empty(), hidden) {
            (true, None) => String::new(),
            (true, Some(hidden)) => format!(" WHERE {hidden}"),
            (false, None) => format!(" WHERE {compiled}"),
            (false, Some(hidden)) => format!(" WHERE ({compiled}) AND {hidden}"),
        })
    }

    fn default_projection(&self) -> Vec<String> {
        let mut columns = if self.table.has_point_columns() {
            self.table
                .columns
                .iter()
                .filter(|c| c.real)
                .map(|c| {
                    let reference = sanitize_identifier(&format!("{MAIN_ALIAS}.{}", c.name));
                    if c.data_type == DataType::Point {
                        format!("AsText({reference}) AS {}", sanitize_identifier(&c.name))
                    } else {
                        reference
                    }
                })
                .collect()
        } else {
            vec![format!("{}.*", sanitize_identifier(MAIN_ALIAS))]
        };
        let composed = [
            self.composition.multilang.as_ref().map(|m| (TEXT_ALIAS, &m.fields)),
            self.composition.linked.as_ref().map(|l| (LINKED_ALIAS, &l.fields)),
            self.composition.custom_multilang.as_ref().map(|c| (CUSTOM_TEXT_ALIAS, &c.fields)),
        ];
        for (alias, fields) in composed.into_iter().flatten() {
            columns.extend(fields.iter().map(|f| sanitize_identifier(&format!("{alias}.{f}"))));
        }
        columns.extend(join_projection(self.joins));
        columns
    }

    fn aggregate_columns(&self, shape: &SelectShape) -> Vec<String> {
        shape
            .aggregates
            .iter()
            .map(|a| {
                format!(
                    "{}({}) AS {}",
                    a.function.as_sql(),
                    self.scope.resolve(&a.field),
                    sanitize_identifier(&a.output_name())
                )
            })
            .collect()
    }

    fn tail(&self, shape: &SelectShape) -> DbResult<String> {
        let mut sql = String::new();
        if let Some(group_by) = &shape.group_by {
            sql.push_str(&format!(" GROUP BY {}", sanitize_fragment(group_by)));
        }
        if !shape.having.is_empty() {
            let having = WhereCompiler::new(self.quoter, None, &self.scope).compile(&shape.having.items, Glue::And)?;
            sql.push_str(&format!(" HAVING {having}"));
        }
        if let Some(order_by) = &shape.order_by {
            sql.push_str(&format!(" ORDER BY {}", sanitize_fragment(order_by)));
        }
        Ok(sql)
    }

    pub fn select(&self, spec: &WhereSpec, glue: Glue, shape: &SelectShape) -> DbResult<String> {
        let mut columns = Vec::new();
        if shape.only_aggregates {
            if shape.aggregates.is_empty() {
                return Err(DbError::InvalidOperation(
                    "only aggregates requested but none given".to_string(),
                ));
            }
        } else if let Some(distinct) = &shape.distinct {
            columns.push(self.scope.resolve(distinct));
        } else {
            match &shape.projection {
                Projection::All => columns.extend(self.default_projection()),
                Projection::Field(field) => columns.push(self.scope.resolve(field)),
                Projection::Fields(fields) => columns.extend(fields.iter().map(|f| self.scope.resolve(f))),
            }
        }
        columns.extend(self.aggregate_columns(shape));

        let mut sql = String::from("SELECT ");
        if shape.distinct.is_some() && !shape.only_aggregates {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&columns.join(","));
        sql.push_str(&self.from_clause()?);
        sql.push_str(&self.where_clause(spec, glue)?);
        sql.push_str(&self.tail(shape)?);
        if let Some(limit) = shape.limit {
            sql.push(' ');
            sql.push_str(&limit.as_sql());
        }
        Ok(sql)
    }

    /// Row-count statement. Grouped counts select with `SQL_CALC_FOUND_ROWS`
    /// and are followed by [`FOUND_ROWS_SQL`].
    pub fn count(&self, spec: &WhereSpec, glue: Glue, shape: &SelectShape) -> DbResult<String> {
        let counted = match &shape.distinct {
            Some(field) => format!("COUNT(DISTINCT {})", self.scope.resolve(field)),
            None => "COUNT(*)".to_string(),
        };
        let grouped = shape.group_by.is_some();
        let mut sql = format!(
            "SELECT {}{counted} AS `n`",
            if grouped { "SQL_CALC_FOUND_ROWS " } else { "" }
        );
        sql.push_str(&self.from_clause()?);
        sql.push_str(&self.where_clause(spec, glue)?);
        sql.push_str(&self.tail(shape)?);
        if grouped {
            sql.push_str(" LIMIT 1");
        } else if let Some(limit) = shape.limit {
            sql.push(' ');
            sql.push_str(&limit.as_sql());
        }
        Ok(sql)
    }
}
