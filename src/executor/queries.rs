/// Read operations: single row, row list, single value, count and streamed reads.
///
/// A read is answered, in order of preference, by the row cache (cacheable
/// table, flat equality filter), the compiled-result cache, or the store.

use std::sync::Arc;

use crate::cache::{fingerprint, CachedResult, SortKey};
use crate::driver::{Driver, RowIter};
use crate::parser::simple_order_by;
use crate::sql::select::{CustomTextJoin, LinkedJoin, TextJoin, FOUND_ROWS_SQL, MAIN_ALIAS};
use crate::sql::{
    plan_joins, sanitize_identifier, Composition, Limit, Predicate, SelectBuilder, WhereSpec,
};
use crate::types::{DbError, DbResult, Row, TableSchema, Value};
use super::options::{SelectOptions, Selector};
use super::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadKind {
    Row,
    Rows,
    Value,
    Count,
}

impl ReadKind {
    const fn single(self) -> bool {
        matches!(self, Self::Row | Self::Value)
    }
}

/// How a read is served from the row cache.
struct CachePlan {
    conditions: Vec<(String, Value)>,
    order: Option<SortKey>,
}

/// Turns a selector into a where-spec on `schema`.
pub(crate) fn resolve_selector(schema: &TableSchema, selector: Selector) -> DbResult<WhereSpec> {
    match selector {
        Selector::Spec(spec) => Ok(spec),
        Selector::Id(id) => Ok(WhereSpec::new().eq(schema.sole_primary_key()?, id)),
        Selector::Field(field) => {
            schema.require_column(&field)?;
            Ok(WhereSpec::new().push(Predicate::Raw(sanitize_identifier(&format!(
                "{MAIN_ALIAS}.{field}"
            )))))
        }
    }
}

/// Value of a single-value read: the requested field, else the first
/// aggregate, else the first column.
fn value_of(row: &Row, options: &SelectOptions) -> Option<Value> {
    let key = options
        .field
        .as_deref()
        .map(|f| f.rsplit('.').next().unwrap_or(f).to_string())
        .or_else(|| options.aggregates.first().map(|a| a.output_name()));
    match key {
        Some(key) => row.get(&key).cloned(),
        None => row.values.values().next().cloned(),
    }
}

fn count_of(rows: &[Row]) -> u64 {
    rows.first()
        .and_then(|row| row.get("n"))
        .and_then(Value::to_i64)
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0)
}

fn project(rows: Vec<Row>, options: &SelectOptions) -> Vec<Row> {
    let fields: Vec<&str> = match (&options.field, &options.fields) {
        (Some(field), _) => vec![field.as_str()],
        (None, Some(fields)) => fields.iter().map(String::as_str).collect(),
        (None, None) => return rows,
    };
    rows.into_iter()
        .map(|row| {
            fields
                .iter()
                .filter_map(|f| row.get(f).map(|v| ((*f).to_string(), v.clone())))
                .collect()
        })
        .collect()
}

/// Lazy single-pass row sequence of a streamed read, normalized to the
/// table's column types.
pub struct RowStream<'a> {
    rows: RowIter<'a>,
    schemas: Vec<Arc<TableSchema>>,
}

impl Iterator for RowStream<'_> {
    type Item = DbResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(
            row.map(|row| self.schemas.iter().fold(row, |row, schema| schema.normalize_row(row)))
                .map_err(DbError::from),
        )
    }
}

impl<D: Driver> Connection<D> {
    /// First row matching `selector`, or `None`.
    pub fn select(
        &mut self,
        table: &str,
        selector: impl Into<Selector>,
        options: &SelectOptions,
    ) -> DbResult<Option<Row>> {
        match self.read_selector(table, selector.into(), options, ReadKind::Row)? {
            CachedResult::Row(row) => Ok(row),
            other => Err(unexpected(&other)),
        }
    }

    /// Every row matching `selector`.
    pub fn select_all(
        &mut self,
        table: &str,
        selector: impl Into<Selector>,
        options: &SelectOptions,
    ) -> DbResult<Vec<Row>> {
        match self.read_selector(table, selector.into(), options, ReadKind::Rows)? {
            CachedResult::Rows(rows) => Ok(rows),
            other => Err(unexpected(&other)),
        }
    }

    /// One value of the first matching row: `options.field`, or the first
    /// aggregate when only aggregates are selected.
    pub fn select_value(
        &mut self,
        table: &str,
        selector: impl Into<Selector>,
        options: &SelectOptions,
    ) -> DbResult<Option<Value>> {
        match self.read_selector(table, selector.into(), options, ReadKind::Value)? {
            CachedResult::Value(value) => Ok(value),
            other => Err(unexpected(&other)),
        }
    }

    /// Number of matching rows; with `group_by`, the number of groups.
    pub fn count(
        &mut self,
        table: &str,
        selector: impl Into<Selector>,
        options: &SelectOptions,
    ) -> DbResult<u64> {
        match self.read_selector(table, selector.into(), options, ReadKind::Count)? {
            CachedResult::Count(n) => Ok(n),
            other => Err(unexpected(&other)),
        }
    }

    /// Matching rows as a lazy stream. Caches are not consulted.
    pub fn select_stream(
        &mut self,
        table: &str,
        selector: impl Into<Selector>,
        options: &SelectOptions,
    ) -> DbResult<RowStream<'_>> {
        let schema = self.schema(table)?;
        let spec = resolve_selector(&schema, selector.into())?;
        let lang = self.language_of(options);
        let sql = self.compile(&schema, &spec, options, &lang, ReadKind::Rows)?;
        let schemas = self.normalizers(&schema, options)?;

        self.check_limits(table, &sql, options.query_limit)?;
        self.log_statement(table, "stream", &sql, options.debug);
        *self.state.stats.reads.entry(table.to_string()).or_default() += 1;
        let rows = self.driver.query(&sql)?;
        Ok(RowStream { rows, schemas })
    }

    /// The SELECT a read would run, without running it.
    pub fn compile_select(
        &mut self,
        table: &str,
        selector: impl Into<Selector>,
        options: &SelectOptions,
    ) -> DbResult<String> {
        let schema = self.schema(table)?;
        let spec = resolve_selector(&schema, selector.into())?;
        let lang = self.language_of(options);
        self.compile(&schema, &spec, options, &lang, ReadKind::Rows)
    }

    /// The COUNT statement a count would run, without running it.
    pub fn compile_count(
        &mut self,
        table: &str,
        selector: impl Into<Selector>,
        options: &SelectOptions,
    ) -> DbResult<String> {
        let schema = self.schema(table)?;
        let spec = resolve_selector(&schema, selector.into())?;
        let lang = self.language_of(options);
        self.compile(&schema, &spec, options, &lang, ReadKind::Count)
    }

    /// Text, extension and extension-text tables composed into rows of `schema`.
    pub(crate) fn composition(
        &mut self,
        schema: &TableSchema,
        lang: &str,
        fallback: bool,
    ) -> DbResult<Composition> {
        let table = schema.name.as_str();
        let mut composition = Composition::default();

        if let Some(ml) = self.config.multilang.get(table).cloned() {
            composition.multilang = Some(TextJoin {
                table: format!("{table}{}", ml.suffix),
                parent_field: ml.parent_field,
                lang_field: ml.lang_field,
                fields: ml.fields,
                lang: lang.to_string(),
                fallbacks: if fallback { self.languages.fallbacks(lang) } else { Vec::new() },
            });
        }

        if let Some(ext) = self.config.linked_tables.get(table).cloned() {
            let ext_schema = self.schema(&ext)?;
            let key = ext_schema.sole_primary_key()?.to_string();
            let mut fields: Vec<String> = schema
                .columns
                .iter()
                .filter(|c| !c.real)
                .map(|c| c.name.clone())
                .collect();
            if fields.is_empty() {
                fields = ext_schema
                    .columns
                    .iter()
                    .filter(|c| c.name != key)
                    .map(|c| c.name.clone())
                    .collect();
            }
            composition.linked = Some(LinkedJoin { table: ext, key, fields });
        }

        if composition.multilang.is_some() {
            if let Some((custom_table, custom_schema)) = self.custom_text_table(table)? {
                let text_table = self.config.text_table(table).unwrap_or_default();
                let text_schema = self.schema(&text_table)?;
                composition.custom_multilang = Some(CustomTextJoin {
                    table: custom_table,
                    key: custom_schema.sole_primary_key()?.to_string(),
                    text_key: text_schema.sole_primary_key()?.to_string(),
                    fields: text_schema
                        .columns
                        .iter()
                        .filter(|c| !c.real)
                        .map(|c| c.name.clone())
                        .collect(),
                });
            }
        }
        Ok(composition)
    }

    /// Text table of the extension table, when both exist.
    pub(crate) fn custom_text_table(&mut self, table: &str) -> DbResult<Option<(String, Arc<TableSchema>)>> {
        let (Some(ext), Some(ml)) = (self.config.linked_tables.get(table), self.config.multilang.get(table)) else {
            return Ok(None);
        };
        let name = format!("{ext}{}", ml.suffix);
        if !self.schemas.exists(&name)? {
            return Ok(None);
        }
        let schema = self.schema(&name)?;
        Ok(Some((name, schema)))
    }

    fn read_selector(
        &mut self,
        table: &str,
        selector: Selector,
        options: &SelectOptions,
        kind: ReadKind,
    ) -> DbResult<CachedResult> {
        let schema = self.schema(table)?;
        let spec = resolve_selector(&schema, selector)?;
        self.read(&schema, &spec, options, kind)
    }

    fn language_of(&self, options: &SelectOptions) -> String {
        options
            .lang
            .clone()
            .unwrap_or_else(|| self.languages.current().to_string())
    }

    fn read(
        &mut self,
        schema: &Arc<TableSchema>,
        spec: &WhereSpec,
        options: &SelectOptions,
        kind: ReadKind,
    ) -> DbResult<CachedResult> {
        let table = schema.name.as_str();
        let lang = self.language_of(options);

        if let Some(plan) = self.cache_plan(table, spec, options, &lang) {
            return self.read_cached(schema, &plan, options, &lang, kind);
        }

        let sql = self.compile(schema, spec, options, &lang, kind)?;
        let key = fingerprint(&sql, &shape_tag(options, kind));
        if options.quick_cache {
            if let Some(hit) = self.state.results.get(table, &key) {
                tracing::trace!(table, "result cache hit");
                return Ok(hit.clone());
            }
        }

        let counter = if kind == ReadKind::Count {
            &mut self.state.stats.count_reads
        } else {
            &mut self.state.stats.reads
        };
        *counter.entry(table.to_string()).or_default() += 1;

        let rows = self.fetch(table, &sql, options.query_limit, options.debug)?;
        let result = match kind {
            ReadKind::Count if options.group_by.is_some() => {
                let found = self.fetch(table, FOUND_ROWS_SQL, false, options.debug)?;
                CachedResult::Count(count_of(&found))
            }
            ReadKind::Count => CachedResult::Count(count_of(&rows)),
            _ => {
                let schemas = self.normalizers(schema, options)?;
                let rows: Vec<Row> = rows
                    .into_iter()
                    .map(|row| schemas.iter().fold(row, |row, s| s.normalize_row(row)))
                    .collect();
                match kind {
                    ReadKind::Row => CachedResult::Row(rows.into_iter().next()),
                    ReadKind::Value => CachedResult::Value(rows.first().and_then(|r| value_of(r, options))),
                    _ => CachedResult::Rows(rows),
                }
            }
        };

        if options.quick_cache {
            self.state.results.insert(table, key, result.clone());
        }
        Ok(result)
    }

    /// Schemas used to type the columns of a read, main table first.
    fn normalizers(&mut self, schema: &Arc<TableSchema>, options: &SelectOptions) -> DbResult<Vec<Arc<TableSchema>>> {
        let mut schemas = vec![Arc::clone(schema)];
        if options.multilang {
            if let Some(text) = self.config.text_table(&schema.name) {
                schemas.push(self.schema(&text)?);
            }
            if let Some(ext) = self.config.linked_tables.get(&schema.name).cloned() {
                schemas.push(self.schema(&ext)?);
            }
        }
        Ok(schemas)
    }

    fn compile(
        &mut self,
        schema: &TableSchema,
        spec: &WhereSpec,
        options: &SelectOptions,
        lang: &str,
        kind: ReadKind,
    ) -> DbResult<String> {
        let composition = if options.multilang {
            self.composition(schema, lang, options.fallback)?
        } else {
            Composition::default()
        };
        let joins = plan_joins(schema, &options.joins, &mut self.schemas)?;
        let hide = self
            .config
            .is_auto_hide(&schema.name)
            .then_some(self.config.hide_column.as_str());
        let builder = SelectBuilder::new(&self.driver, schema, &composition, &joins).hide(hide);
        let shape = options.shape(kind.single());
        match kind {
            ReadKind::Count => builder.count(spec, options.glue, &shape),
            _ => builder.select(spec, options.glue, &shape),
        }
    }

    /// Row-cache plan when the read can be answered from a table snapshot.
    /// Snapshots are composed with text tables and fallbacks, so reads that
    /// turn either off go to the store.
    fn cache_plan(&self, table: &str, spec: &WhereSpec, options: &SelectOptions, lang: &str) -> Option<CachePlan> {
        if options.ignore_cache
            || !self.config.is_cached(table)
            || !options.multilang
            || !options.fallback
            || !options.joins.is_empty()
            || !options.aggregates.is_empty()
            || options.only_aggregates
            || options.distinct.is_some()
            || options.group_by.is_some()
            || !options.having.is_empty()
            || lang != self.languages.current()
        {
            return None;
        }
        let order = match &options.order_by {
            Some(order) => Some(simple_order_by(order)?),
            None => None,
        };
        let conditions = spec
            .flat_equalities()?
            .into_iter()
            .map(|(field, value)| (field.to_string(), value.clone()))
            .collect();
        Some(CachePlan { conditions, order })
    }

    fn read_cached(
        &mut self,
        schema: &Arc<TableSchema>,
        plan: &CachePlan,
        options: &SelectOptions,
        lang: &str,
        kind: ReadKind,
    ) -> DbResult<CachedResult> {
        let table = schema.name.as_str();
        if !self.state.rows.is_loaded(table, lang) {
            let snapshot = SelectOptions::new().ignore_cache().no_quick_cache().lang(lang);
            if let CachedResult::Rows(rows) = self.read(schema, &WhereSpec::new(), &snapshot, ReadKind::Rows)? {
                self.state.rows.load(table, lang, rows);
            }
        }
        *self.state.stats.cache_reads.entry(table.to_string()).or_default() += 1;
        tracing::trace!(table, "row cache read");

        let conditions: Vec<(&str, &Value)> = plan.conditions.iter().map(|(f, v)| (f.as_str(), v)).collect();
        let limit = if kind.single() {
            options.limit.or(Some(Limit::Count(1)))
        } else {
            options.limit
        };
        let rows = self
            .state
            .rows
            .query(table, &conditions, options.glue, plan.order.as_ref(), limit)
            .unwrap_or_default();

        Ok(match kind {
            ReadKind::Count => CachedResult::Count(rows.len() as u64),
            ReadKind::Value => CachedResult::Value(rows.first().and_then(|r| value_of(r, options))),
            ReadKind::Row => CachedResult::Row(project(rows, options).into_iter().next()),
            ReadKind::Rows => CachedResult::Rows(project(rows, options)),
        })
    }
}

/// Options that change how rows become a result, beyond the SQL text.
fn shape_tag(options: &SelectOptions, kind: ReadKind) -> String {
    let aggregates: Vec<String> = options.aggregates.iter().map(|a| a.output_name()).collect();
    format!("{kind:?}|{:?}|{}", options.field, aggregates.join(","))
}

fn unexpected(result: &CachedResult) -> DbError {
    DbError::InvalidOperation(format!("unexpected read result {result:?}"))
}
