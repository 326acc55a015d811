/// DML operations
///
/// INSERT, UPDATE, DELETE over a table and the text/extension tables its
/// logical rows span. Every write runs inside one transaction level.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::config::MultilangTable;
use crate::driver::Driver;
use crate::parser::parse_fk_violation;
use crate::sql::joins::render_joins;
use crate::sql::select::{CUSTOM_TEXT_ALIAS, LINKED_ALIAS, MAIN_ALIAS, TEXT_ALIAS};
use crate::sql::write::{delete_sql, insert_defaults_sql, insert_sql, update_sql};
use crate::sql::{plan_joins, sanitize_identifier, CompareOp, FieldScope, Glue, Quoter, WhereCompiler, WhereSpec};
use crate::types::{Column, DataType, DbError, DbResult, Payload, PerLanguage, Row, TableSchema, Value};
use super::options::{CheckOptions, DeleteOptions, InsertOptions, SelectOptions, Selector, UpdateOptions};
use super::queries::resolve_selector;
use super::Connection;

/// Schema of the version-lock ledger when the catalog has none.
pub(crate) fn version_lock_schema(name: &str) -> TableSchema {
    TableSchema::new(
        name,
        vec![
            Column::new("id", DataType::Int).primary(),
            Column::new("table", DataType::Varchar { length: 100 }),
            Column::new("row", DataType::Varchar { length: 100 }),
            Column::new("version", DataType::Int),
            Column::new("date", DataType::DateTime),
        ],
    )
}

/// A write payload split by the physical table each field lives in.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Partitioned {
    pub main: Row,
    pub multilang: BTreeMap<String, Row>,
    pub custom_main: Row,
    pub custom_multilang: BTreeMap<String, Row>,
}

impl Partitioned {
    /// Whether anything goes beyond the main table.
    pub fn has_secondary(&self) -> bool {
        !self.multilang.is_empty() || !self.custom_main.is_empty() || !self.custom_multilang.is_empty()
    }

    /// Every change visible on the logical row in language `lang`.
    fn changes_in(&self, lang: &str) -> Row {
        let mut changes = self.main.clone();
        changes.merge(&self.custom_main);
        if let Some(row) = self.multilang.get(lang) {
            changes.merge(row);
        }
        if let Some(row) = self.custom_multilang.get(lang) {
            changes.merge(row);
        }
        changes
    }
}

fn scalar(table: &str, field: &str, value: &PerLanguage<Value>) -> DbResult<Value> {
    match value {
        PerLanguage::Scalar(v) => Ok(v.clone()),
        PerLanguage::Map(_) => Err(DbError::UnsupportedValueType(format!(
            "per-language values given for '{table}.{field}', which is not translatable"
        ))),
    }
}

/// Value of the primary key when `spec` pins it with an equality.
fn pinned_key(schema: &TableSchema, spec: &WhereSpec) -> Option<Value> {
    let pk = schema.sole_primary_key().ok()?;
    spec.items
        .iter()
        .filter_map(|p| p.as_flat_equality())
        .find(|(field, _)| *field == pk)
        .map(|(_, value)| value.clone())
}

/// Value of the primary key when `spec` is exactly the primary-key equality.
fn exact_key(schema: &TableSchema, spec: &WhereSpec) -> Option<Value> {
    if spec.items.len() == 1 {
        pinned_key(schema, spec)
    } else {
        None
    }
}

/// Text-table row of `parent` in `lang`.
fn text_row(ml: &MultilangTable, fields: Option<&Row>, parent: i64, lang: &str) -> Row {
    let mut row = fields.cloned().unwrap_or_default();
    row.insert(ml.parent_field.clone(), Value::Integer(parent));
    row.insert(ml.lang_field.clone(), Value::from(lang));
    row
}

fn qualified(alias: &str, column: &str) -> String {
    sanitize_identifier(&format!("{alias}.{column}"))
}

/// ` WHERE <extra> AND (<where>)`, or just the extra condition.
fn with_condition(extra: &str, compiled: &str) -> String {
    if compiled.is_empty() {
        format!(" WHERE {extra}")
    } else {
        format!(" WHERE {extra} AND ({compiled})")
    }
}

impl<D: Driver> Connection<D> {
    /// Routes every payload field to its physical table and validates it.
    pub(crate) fn partition(&mut self, schema: &TableSchema, payload: &Payload, check: CheckOptions) -> DbResult<Partitioned> {
        let table = schema.name.as_str();
        let text_schema = match self.config.text_table(table) {
            Some(text) => Some(self.schema(&text)?),
            None => None,
        };
        let linked = self.config.linked_tables.contains_key(table);
        let current = self.languages.current().to_string();
        let languages = self.languages.languages().to_vec();
        let validate = |schema: &TableSchema, field: &str, value: &Value| -> DbResult<()> {
            if check.check && check.check_types {
                schema.check_value(field, value, check.check_lengths)
            } else {
                Ok(())
            }
        };

        let mut parts = Partitioned::default();
        for (field, value) in payload.iter() {
            if let Some(column) = schema.column(field) {
                if column.generated {
                    continue;
                }
                let value = scalar(table, field, value)?;
                validate(schema, field, &value)?;
                if column.real {
                    parts.main.insert(field.clone(), value);
                } else if linked {
                    parts.custom_main.insert(field.clone(), value);
                } else {
                    tracing::debug!(table, field = field.as_str(), "skipping column without storage");
                }
                continue;
            }

            let text_column = text_schema
                .as_ref()
                .and_then(|s| s.column(field).map(|c| (Arc::clone(s), c.real, c.generated)));
            if let Some((text_schema, real, generated)) = text_column {
                if generated {
                    continue;
                }
                for (lang, value) in value.clone().into_languages(&current) {
                    if !languages.contains(&lang) {
                        tracing::debug!(table, lang = lang.as_str(), "skipping unknown language");
                        continue;
                    }
                    validate(&*text_schema, field, &value)?;
                    let bucket = if real {
                        &mut parts.multilang
                    } else if linked {
                        &mut parts.custom_multilang
                    } else {
                        continue;
                    };
                    bucket.entry(lang).or_default().insert(field.clone(), value);
                }
                continue;
            }

            if check.check {
                return Err(DbError::SchemaMismatch {
                    table: table.to_string(),
                    column: field.clone(),
                });
            }
        }
        Ok(parts)
    }

    /// Inserts one logical row. Returns the generated primary key; `None`
    /// for deferred inserts and for tables without a generated key.
    pub fn insert(&mut self, table: &str, payload: &Payload, options: &InsertOptions) -> DbResult<Option<i64>> {
        let schema = self.schema(table)?;
        let parts = self.partition(&schema, payload, options.check)?;

        if let Some(threshold) = options.defer {
            if parts.has_secondary() {
                return Err(DbError::InvalidOperation(format!(
                    "deferred insert into '{table}' touches translated or linked columns"
                )));
            }
            self.defer_insert(table, parts.main, options, threshold)?;
            return Ok(None);
        }

        let id = self.atomically(|conn| conn.insert_parts(&schema, &parts, options))?;
        self.after_insert(&schema, id)?;
        Ok(id)
    }

    fn insert_parts(&mut self, schema: &TableSchema, parts: &Partitioned, options: &InsertOptions) -> DbResult<Option<i64>> {
        let table = schema.name.as_str();
        let sql = if parts.main.is_empty() {
            insert_defaults_sql(schema, options.replace)
        } else {
            insert_sql(&self.driver, table, &parts.main, options.replace)
        };
        let outcome = self.exec(table, &sql, options.query_limit, options.debug)?;
        let id = schema
            .sole_primary_key()
            .ok()
            .and_then(|pk| parts.main.get(pk))
            .and_then(Value::to_i64)
            .or(outcome.last_insert_id);

        if !parts.has_secondary() {
            return Ok(id);
        }
        let Some(id) = id else {
            return Err(DbError::InvalidOperation(format!(
                "no primary key generated for '{table}', cannot write its translated or linked columns"
            )));
        };

        if let Some(ml) = self.config.multilang.get(table).cloned() {
            let text_table = format!("{table}{}", ml.suffix);
            let langs: BTreeSet<&String> = parts.multilang.keys().chain(parts.custom_multilang.keys()).collect();
            for lang in langs {
                let row = text_row(&ml, parts.multilang.get(lang), id, lang);
                let text_id = self.insert_row(&text_table, &row, options)?;
                if let Some(custom) = parts.custom_multilang.get(lang) {
                    self.insert_custom_text(table, custom, text_id, options)?;
                }
            }
        }

        if let Some(ext) = self.config.linked_tables.get(table).cloned() {
            let ext_schema = self.schema(&ext)?;
            let mut row = parts.custom_main.clone();
            row.insert(ext_schema.sole_primary_key()?, Value::Integer(id));
            self.insert_row(&ext, &row, options)?;
        }
        Ok(Some(id))
    }

    fn insert_custom_text(&mut self, table: &str, fields: &Row, text_id: Option<i64>, options: &InsertOptions) -> DbResult<()> {
        let (custom_table, custom_schema) = self.custom_text_table(table)?.ok_or_else(|| {
            DbError::InvalidOperation(format!("'{table}' has no extension text table"))
        })?;
        let text_id = text_id.ok_or_else(|| {
            DbError::InvalidOperation(format!("no key generated for the text row of '{table}'"))
        })?;
        let mut row = fields.clone();
        row.insert(custom_schema.sole_primary_key()?, Value::Integer(text_id));
        self.insert_row(&custom_table, &row, options)?;
        Ok(())
    }

    /// Plain single-table insert of an already partitioned row.
    fn insert_row(&mut self, table: &str, row: &Row, options: &InsertOptions) -> DbResult<Option<i64>> {
        let sql = insert_sql(&self.driver, table, row, false);
        let outcome = self.exec(table, &sql, options.query_limit, options.debug)?;
        self.state.results.invalidate_table(table);
        Ok(outcome.last_insert_id)
    }

    /// Appends the new row to a loaded snapshot, re-read from the store.
    fn after_insert(&mut self, schema: &Arc<TableSchema>, id: Option<i64>) -> DbResult<()> {
        let table = schema.name.as_str();
        self.changed(table);
        if !self.config.is_cached(table) {
            return Ok(());
        }
        let current = self.languages.current().to_string();
        let (Some(id), Ok(pk), true) = (id, schema.sole_primary_key(), self.state.rows.is_loaded(table, &current)) else {
            self.state.rows.invalidate(table);
            return Ok(());
        };
        let fresh = SelectOptions::new().ignore_cache().no_quick_cache();
        match self.select(table, WhereSpec::new().eq(pk, id), &fresh)? {
            Some(row) => self.state.rows.apply_insert(table, row),
            None => self.state.rows.invalidate(table),
        }
        Ok(())
    }

    /// Updates every logical row matching `selector`.
    pub fn update(
        &mut self,
        table: &str,
        selector: impl Into<Selector>,
        payload: &Payload,
        options: &UpdateOptions,
    ) -> DbResult<()> {
        let schema = self.schema(table)?;
        let spec = resolve_selector(&schema, selector.into())?;
        if spec.is_empty() && !options.confirm {
            return Err(DbError::ConfirmationRequired("update".to_string()));
        }
        let parts = self.partition(&schema, payload, options.check)?;

        self.atomically(|conn| {
            if let Some(version) = options.version {
                match exact_key(&schema, &spec) {
                    Some(row) => conn.check_version(table, &row, version)?,
                    None => tracing::debug!(table, "version lock needs a primary-key selector, skipped"),
                }
            }
            conn.update_parts(&schema, &spec, &parts, options)
        })?;

        self.after_update(&schema, &spec, &parts);
        Ok(())
    }

    /// Fails when a newer version of the row was recorded, else records `given + 1`.
    fn check_version(&mut self, table: &str, row: &Value, given: i64) -> DbResult<()> {
        let ledger = self.config.version_lock_table.clone();
        let row_key = row.to_string();
        let latest = self
            .select_value(
                &ledger,
                WhereSpec::new().eq("table", table).eq("row", row_key.as_str()),
                &SelectOptions::new()
                    .field("version")
                    .order_by("id DESC")
                    .ignore_cache()
                    .no_quick_cache(),
            )?
            .and_then(|v| v.to_i64())
            .unwrap_or(1);

        if latest > given {
            return Err(DbError::VersionConflict {
                table: table.to_string(),
                row: row_key,
                given,
                latest,
            });
        }

        let now = chrono::Local::now().naive_local();
        let entry = Payload::new()
            .set("table", table)
            .set("row", row_key)
            .set("version", given + 1)
            .set("date", now);
        self.insert(&ledger, &entry, &InsertOptions::new())?;
        Ok(())
    }

    fn update_parts(&mut self, schema: &TableSchema, spec: &WhereSpec, parts: &Partitioned, options: &UpdateOptions) -> DbResult<()> {
        let table = schema.name.as_str();
        let main_scope = FieldScope::aliased(MAIN_ALIAS);
        let compiled = WhereCompiler::new(&self.driver, Some(schema), &main_scope).compile(&spec.items, Glue::And)?;
        let where_sql = if compiled.is_empty() {
            String::new()
        } else {
            format!(" WHERE {compiled}")
        };
        let row_id = pinned_key(schema, spec);

        if !parts.main.is_empty() {
            let set = WhereCompiler::new(&self.driver, Some(schema), &main_scope)
                .for_assignments()
                .compile_assignments(parts.main.iter())?;
            let sql = update_sql(table, MAIN_ALIAS, "", &set, &where_sql);
            self.exec(table, &sql, options.query_limit, options.debug)?;
        }

        if !parts.has_secondary() {
            return Ok(());
        }
        let main_key = qualified(MAIN_ALIAS, schema.sole_primary_key()?);

        if let Some(ml) = self.config.multilang.get(table).cloned() {
            let text_table = format!("{table}{}", ml.suffix);
            let text_schema = self.schema(&text_table)?;
            let text_scope = FieldScope::aliased(TEXT_ALIAS);
            let joins = format!(
                " INNER JOIN {} {} ON {main_key} = {}",
                sanitize_identifier(table),
                sanitize_identifier(MAIN_ALIAS),
                qualified(TEXT_ALIAS, &ml.parent_field)
            );
            for (lang, row) in &parts.multilang {
                let set = WhereCompiler::new(&self.driver, Some(&*text_schema), &text_scope)
                    .for_assignments()
                    .compile_assignments(row.iter())?;
                let lang_condition = format!("{} = {}", qualified(TEXT_ALIAS, &ml.lang_field), self.driver.quote(lang));
                let sql = update_sql(&text_table, TEXT_ALIAS, &joins, &set, &with_condition(&lang_condition, &compiled));
                let outcome = self.exec(&text_table, &sql, options.query_limit, options.debug)?;

                // zero affected rows also happens when nothing changed: check before inserting
                if let (0, Some(id)) = (outcome.affected, &row_id) {
                    let existing = self.count(
                        &text_table,
                        WhereSpec::new().eq(ml.parent_field.as_str(), id.clone()).eq(ml.lang_field.as_str(), lang.as_str()),
                        &SelectOptions::new().without_multilang().ignore_cache().no_quick_cache(),
                    )?;
                    if existing == 0 {
                        let parent = id.to_i64().ok_or_else(|| DbError::InvalidOperation(format!("non-numeric key {id} for '{table}'")))?;
                        let row = text_row(&ml, Some(row), parent, lang);
                        self.insert_row(&text_table, &row, &insert_options(options))?;
                    }
                }
            }
        }

        if !parts.custom_main.is_empty() {
            let ext = self.config.linked_tables.get(table).cloned().ok_or_else(|| {
                DbError::InvalidOperation(format!("'{table}' has no linked table"))
            })?;
            let ext_schema = self.schema(&ext)?;
            let key = ext_schema.sole_primary_key()?.to_string();
            let set = WhereCompiler::new(&self.driver, Some(&*ext_schema), &FieldScope::aliased(LINKED_ALIAS))
                .for_assignments()
                .compile_assignments(parts.custom_main.iter())?;
            let joins = format!(
                " INNER JOIN {} {} ON {main_key} = {}",
                sanitize_identifier(table),
                sanitize_identifier(MAIN_ALIAS),
                qualified(LINKED_ALIAS, &key)
            );
            let sql = update_sql(&ext, LINKED_ALIAS, &joins, &set, &where_sql);
            let outcome = self.exec(&ext, &sql, options.query_limit, options.debug)?;

            if let (0, Some(id)) = (outcome.affected, &row_id) {
                let existing = self.count(
                    &ext,
                    WhereSpec::new().eq(key.as_str(), id.clone()),
                    &SelectOptions::new().without_multilang().ignore_cache().no_quick_cache(),
                )?;
                if existing == 0 {
                    let mut row = parts.custom_main.clone();
                    row.insert(key, id.clone());
                    self.insert_row(&ext, &row, &insert_options(options))?;
                }
            }
        }

        if !parts.custom_multilang.is_empty() {
            self.update_custom_text(schema, &compiled, row_id.as_ref(), parts, options)?;
        }
        Ok(())
    }

    fn update_custom_text(
        &mut self,
        schema: &TableSchema,
        compiled: &str,
        row_id: Option<&Value>,
        parts: &Partitioned,
        options: &UpdateOptions,
    ) -> DbResult<()> {
        let table = schema.name.as_str();
        let (custom_table, custom_schema) = self.custom_text_table(table)?.ok_or_else(|| {
            DbError::InvalidOperation(format!("'{table}' has no extension text table"))
        })?;
        let ml = self.config.multilang.get(table).cloned().ok_or_else(|| {
            DbError::InvalidOperation(format!("'{table}' is not translatable"))
        })?;
        let text_table = format!("{table}{}", ml.suffix);
        let text_schema = self.schema(&text_table)?;
        let custom_key = custom_schema.sole_primary_key()?.to_string();
        let text_key = text_schema.sole_primary_key()?.to_string();

        let joins = format!(
            " INNER JOIN {} {} ON {} = {} INNER JOIN {} {} ON {} = {}",
            sanitize_identifier(&text_table),
            sanitize_identifier(TEXT_ALIAS),
            qualified(TEXT_ALIAS, &text_key),
            qualified(CUSTOM_TEXT_ALIAS, &custom_key),
            sanitize_identifier(table),
            sanitize_identifier(MAIN_ALIAS),
            qualified(MAIN_ALIAS, schema.sole_primary_key()?),
            qualified(TEXT_ALIAS, &ml.parent_field)
        );
        let uncached = SelectOptions::new().without_multilang().ignore_cache().no_quick_cache();

        for (lang, row) in &parts.custom_multilang {
            let set = WhereCompiler::new(&self.driver, Some(&*custom_schema), &FieldScope::aliased(CUSTOM_TEXT_ALIAS))
                .for_assignments()
                .compile_assignments(row.iter())?;
            let lang_condition = format!("{} = {}", qualified(TEXT_ALIAS, &ml.lang_field), self.driver.quote(lang));
            let sql = update_sql(&custom_table, CUSTOM_TEXT_ALIAS, &joins, &set, &with_condition(&lang_condition, compiled));
            let outcome = self.exec(&custom_table, &sql, options.query_limit, options.debug)?;

            let (0, Some(id)) = (outcome.affected, row_id) else {
                continue;
            };
            let parent = id.to_i64().ok_or_else(|| DbError::InvalidOperation(format!("non-numeric key {id} for '{table}'")))?;
            let text_id = self.select_value(
                &text_table,
                WhereSpec::new().eq(ml.parent_field.as_str(), parent).eq(ml.lang_field.as_str(), lang.as_str()),
                &uncached.clone().field(text_key.as_str()),
            )?;
            let text_id = match text_id.and_then(|v| v.to_i64()) {
                Some(text_id) => text_id,
                None => {
                    let text = text_row(&ml, None, parent, lang);
                    self.insert_row(&text_table, &text, &insert_options(options))?
                        .ok_or_else(|| DbError::InvalidOperation(format!("no key generated for the text row of '{table}'")))?
                }
            };
            let existing = self.count(&custom_table, WhereSpec::new().eq(custom_key.as_str(), text_id), &uncached)?;
            if existing == 0 {
                let mut custom = row.clone();
                custom.insert(custom_key.clone(), Value::Integer(text_id));
                self.insert_row(&custom_table, &custom, &insert_options(options))?;
            }
        }
        Ok(())
    }

    /// Replays the update on a loaded snapshot, or drops it.
    fn after_update(&mut self, schema: &TableSchema, spec: &WhereSpec, parts: &Partitioned) {
        let table = schema.name.as_str();
        self.changed(table);
        if !self.config.is_cached(table) {
            return;
        }
        let Some(lang) = self.state.rows.language(table).map(str::to_string) else {
            return;
        };
        match spec.flat_equalities() {
            Some(conditions) => {
                let changes = parts.changes_in(&lang);
                let matched = self.state.rows.apply_update(table, &conditions, Glue::And, &changes);
                tracing::trace!(table, matched, "row cache updated");
            }
            None => self.state.rows.invalidate(table),
        }
    }

    /// Deletes the matching rows, or flags them hidden on auto-hide tables.
    /// Returns the affected row count.
    pub fn delete(&mut self, table: &str, selector: impl Into<Selector>, options: &DeleteOptions) -> DbResult<u64> {
        let schema = self.schema(table)?;
        let spec = resolve_selector(&schema, selector.into())?;
        if spec.is_empty() && !options.confirm {
            return Err(DbError::ConfirmationRequired("delete".to_string()));
        }

        let joins = plan_joins(&schema, &options.joins, &mut self.schemas)?;
        let scope = FieldScope::aliased(MAIN_ALIAS).with_joins(joins.clone());
        let compiled = WhereCompiler::new(&self.driver, Some(&*schema), &scope).compile(&spec.items, Glue::And)?;
        let where_sql = if compiled.is_empty() {
            String::new()
        } else {
            format!(" WHERE {compiled}")
        };
        let join_sql = render_joins(&self.driver, &joins, &scope)?;
        let hide = self
            .config
            .is_auto_hide(table)
            .then(|| self.config.hide_column.clone());
        let sql = delete_sql(table, &join_sql, &where_sql, hide.as_deref());

        let outcome = self
            .atomically(|conn| conn.exec(table, &sql, options.query_limit, options.debug))
            .map_err(|e| referenced_elsewhere(table, e))?;

        self.changed(table);
        if self.config.is_cached(table) {
            match (joins.is_empty(), spec.flat_equalities()) {
                (true, Some(conditions)) => {
                    self.state.rows.apply_delete(table, &conditions, Glue::And);
                }
                _ => self.state.rows.invalidate(table),
            }
        }
        Ok(outcome.affected)
    }

    /// Updates the matching row and returns its key, or inserts
    /// `where ∪ payload` (payload wins) and returns the new key.
    pub fn update_or_insert(
        &mut self,
        table: &str,
        selector: impl Into<Selector>,
        payload: &Payload,
        options: &UpdateOptions,
    ) -> DbResult<Option<i64>> {
        let schema = self.schema(table)?;
        let spec = resolve_selector(&schema, selector.into())?;
        let existing = self.select(
            table,
            spec.clone(),
            &SelectOptions::new().without_multilang().ignore_cache().no_quick_cache(),
        )?;

        if let Some(row) = existing {
            self.update(table, spec, payload, options)?;
            let id = schema
                .sole_primary_key()
                .ok()
                .and_then(|pk| row.get(pk))
                .and_then(Value::to_i64);
            return Ok(id);
        }

        let mut merged = payload.clone();
        for (field, value) in spec.items.iter().filter_map(|p| p.as_flat_equality()) {
            if !merged.contains(field) {
                merged.insert(field, PerLanguage::Scalar(value.clone()));
            }
        }
        self.insert(table, &merged, &insert_options(options))
    }

    /// Deletes ledger entries older than the configured time-to-live.
    pub fn purge_version_locks(&mut self, now: NaiveDateTime) -> DbResult<u64> {
        let ledger = self.config.version_lock_table.clone();
        let cutoff = now - chrono::Duration::hours(i64::from(self.config.version_lock_ttl_hours));
        self.delete(
            &ledger,
            WhereSpec::new().compare("date", CompareOp::Lt, cutoff),
            &DeleteOptions::new().confirm(),
        )
    }
}

fn insert_options(options: &UpdateOptions) -> InsertOptions {
    InsertOptions {
        check: options.check,
        query_limit: options.query_limit,
        debug: options.debug,
        ..InsertOptions::default()
    }
}

/// Foreign-key failures become `ConstraintViolation`, keeping the SQL.
fn referenced_elsewhere(table: &str, error: DbError) -> DbError {
    let failure = match error.root() {
        DbError::Driver(driver) => parse_fk_violation(&driver.message),
        _ => None,
    };
    match failure {
        Some(failure) => {
            let translated = DbError::ConstraintViolation {
                table: table.to_string(),
                referencing_table: failure.referencing_table,
                referencing_column: failure.referencing_column,
            };
            match error.sql() {
                Some(sql) => translated.with_sql(sql),
                None => translated,
            }
        }
        None => error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticSchemas;
    use crate::config::EngineConfig;
    use crate::driver::{FixedLanguages, RecordingDriver, TxCall};
    use crate::sql::JoinSpec;
    use crate::types::DriverError;

    fn schemas() -> StaticSchemas {
        StaticSchemas::new(vec![
            TableSchema::new(
                "users",
                vec![
                    Column::new("id", DataType::Int).primary(),
                    Column::new("name", DataType::Varchar { length: 5 }),
                    Column::new("age", DataType::Int).nullable(),
                    Column::new("slug", DataType::Varchar { length: 40 }).generated(),
                ],
            ),
            TableSchema::new(
                "posts",
                vec![
                    Column::new("id", DataType::Int).primary(),
                    Column::new("author", DataType::Int).references("users", "id"),
                    Column::new("views", DataType::Int),
                    Column::new("rating", DataType::Int).linked(),
                ],
            ),
            TableSchema::new(
                "posts_texts",
                vec![
                    Column::new("id", DataType::Int).primary(),
                    Column::new("parent", DataType::Int).references("posts", "id"),
                    Column::new("lang", DataType::Char { length: 2 }),
                    Column::new("title", DataType::Varchar { length: 80 }),
                    Column::new("subtitle", DataType::Varchar { length: 80 }).linked(),
                ],
            ),
            TableSchema::new(
                "posts_custom",
                vec![
                    Column::new("id", DataType::Int).primary(),
                    Column::new("rating", DataType::Int),
                ],
            ),
            TableSchema::new(
                "posts_custom_texts",
                vec![
                    Column::new("id", DataType::Int).primary(),
                    Column::new("subtitle", DataType::Varchar { length: 80 }),
                ],
            ),
        ])
    }

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.multilang.insert("posts".into(), MultilangTable::new(["title"]));
        config.linked_tables.insert("posts".into(), "posts_custom".into());
        config
    }

    fn connection(config: EngineConfig) -> Connection<RecordingDriver> {
        Connection::new(RecordingDriver::new(), schemas(), config)
            .with_languages(FixedLanguages::new("en").with_languages(["it"]))
    }

    #[test]
    fn test_partition_routes_fields() {
        let mut conn = connection(config());
        let schema = conn.schema("posts").unwrap();
        let payload = Payload::new()
            .set("views", 3)
            .set("rating", 5)
            .set_translations("title", [("en", "Hello"), ("it", "Ciao"), ("xx", "??")])
            .set("subtitle", "Sub");

        let parts = conn.partition(&schema, &payload, CheckOptions::default()).unwrap();
        assert_eq!(parts.main, Row::new().with("views", 3));
        assert_eq!(parts.custom_main, Row::new().with("rating", 5));
        assert_eq!(parts.multilang.len(), 2);
        assert_eq!(parts.multilang["it"], Row::new().with("title", "Ciao"));
        assert_eq!(parts.custom_multilang["en"], Row::new().with("subtitle", "Sub"));
    }

    #[test]
    fn test_partition_checks() {
        let mut conn = connection(config());
        let schema = conn.schema("users").unwrap();

        let unknown = Payload::new().set("nope", 1);
        assert!(matches!(
            conn.partition(&schema, &unknown, CheckOptions::default()),
            Err(DbError::SchemaMismatch { .. })
        ));
        let lenient = CheckOptions { check: false, ..CheckOptions::default() };
        assert!(conn.partition(&schema, &unknown, lenient).unwrap().main.is_empty());

        let bad_type = Payload::new().set("age", "old");
        assert!(matches!(
            conn.partition(&schema, &bad_type, CheckOptions::default()),
            Err(DbError::TypeMismatch { .. })
        ));

        let long = Payload::new().set("name", "Annabel");
        assert!(conn.partition(&schema, &long, CheckOptions::default()).is_ok());
        let strict = CheckOptions { check_lengths: true, ..CheckOptions::default() };
        assert!(matches!(conn.partition(&schema, &long, strict), Err(DbError::TypeMismatch { .. })));

        let generated = Payload::new().set("slug", "ann");
        assert!(conn.partition(&schema, &generated, CheckOptions::default()).unwrap().main.is_empty());
    }

    #[test]
    fn test_insert_spans_text_and_linked_tables() {
        let mut conn = connection(config());
        let payload = Payload::new()
            .set("author", 1)
            .set("views", 0)
            .set("rating", 4)
            .set_translations("title", [("en", "Hello"), ("it", "Ciao")]);

        let id = conn.insert("posts", &payload, &InsertOptions::new()).unwrap();
        assert_eq!(id, Some(1));
        let statements = conn.driver().statements().to_vec();
        assert_eq!(
            statements,
            vec![
                "INSERT INTO `posts`(`author`,`views`) VALUES('1','0')".to_string(),
                "INSERT INTO `posts_texts`(`lang`,`parent`,`title`) VALUES('en','1','Hello')".to_string(),
                "INSERT INTO `posts_texts`(`lang`,`parent`,`title`) VALUES('it','1','Ciao')".to_string(),
                "INSERT INTO `posts_custom`(`id`,`rating`) VALUES('1','4')".to_string(),
            ]
        );
        assert_eq!(conn.driver().transactions(), [TxCall::Begin, TxCall::Commit]);
    }

    #[test]
    fn test_insert_rolls_back_when_a_sub_insert_fails() {
        let mut conn = connection(config());
        conn.driver_mut().fail("INTO `posts_texts`", DriverError::new("disk full"));
        let payload = Payload::new().set("author", 1).set("views", 0).set("title", "Hello");

        let err = conn.insert("posts", &payload, &InsertOptions::new()).unwrap_err();
        assert!(matches!(err.root(), DbError::Driver(_)));
        assert!(err.sql().is_some_and(|sql| sql.contains("posts_texts")));
        assert_eq!(conn.driver().transactions(), [TxCall::Begin, TxCall::Rollback]);
    }

    #[test]
    fn test_empty_insert_uses_defaults() {
        let mut conn = connection(EngineConfig::default());
        conn.insert("users", &Payload::new(), &InsertOptions::new().replace()).unwrap();
        assert_eq!(conn.driver().statements()[0], "REPLACE INTO `users` VALUES(NULL,'',NULL,DEFAULT)");
    }

    #[test]
    fn test_update_requires_confirmation_for_full_table() {
        let mut conn = connection(EngineConfig::default());
        let payload = Payload::new().set("name", "x");
        let err = conn
            .update("users", WhereSpec::new(), &payload, &UpdateOptions::new())
            .unwrap_err();
        assert!(matches!(err, DbError::ConfirmationRequired(_)));

        conn.update("users", WhereSpec::new(), &payload, &UpdateOptions::new().confirm())
            .unwrap();
        assert_eq!(conn.driver().statements()[0], "UPDATE `users` `t` SET `t`.`name` = 'x'");
    }

    #[test]
    fn test_update_text_row_falls_back_to_insert() {
        let mut conn = connection(config());
        conn.driver_mut()
            .affect("UPDATE `posts_texts`", 0)
            .respond("COUNT(*)", vec![Row::new().with("n", 0)]);

        let payload = Payload::new().set("title", "Ciao");
        conn.update("posts", 7, &payload, &UpdateOptions::new()).unwrap();

        let statements = conn.driver().statements();
        assert_eq!(
            statements[0],
            "UPDATE `posts_texts` `lang` INNER JOIN `posts` `t` ON `t`.`id` = `lang`.`parent` \
             SET `lang`.`title` = 'Ciao' WHERE `lang`.`lang` = 'en' AND (`t`.`id` = '7')"
        );
        assert!(statements[1].starts_with("SELECT COUNT(*) AS `n` FROM `posts_texts` `t`"));
        assert_eq!(
            statements[2],
            "INSERT INTO `posts_texts`(`lang`,`parent`,`title`) VALUES('en','7','Ciao')"
        );
    }

    #[test]
    fn test_update_text_row_unchanged_is_not_duplicated() {
        let mut conn = connection(config());
        conn.driver_mut()
            .affect("UPDATE `posts_texts`", 0)
            .respond("COUNT(*)", vec![Row::new().with("n", 1)]);

        conn.update("posts", 7, &Payload::new().set("title", "Ciao"), &UpdateOptions::new())
            .unwrap();
        assert!(conn.driver().matching("INSERT").is_empty());
    }

    #[test]
    fn test_update_linked_table() {
        let mut conn = connection(config());
        conn.update("posts", 7, &Payload::new().set("rating", 2), &UpdateOptions::new())
            .unwrap();
        assert_eq!(
            conn.driver().statements()[0],
            "UPDATE `posts_custom` `c` INNER JOIN `posts` `t` ON `t`.`id` = `c`.`id` \
             SET `c`.`rating` = '2' WHERE `t`.`id` = '7'"
        );
    }

    #[test]
    fn test_version_lock() {
        let mut conn = connection(EngineConfig::default());
        let payload = Payload::new().set("name", "x");

        conn.update("users", 5, &payload, &UpdateOptions::new().version(1)).unwrap();
        let ledger = conn.driver().matching("INSERT INTO `model_version_locks`");
        assert_eq!(ledger.len(), 1);
        assert!(ledger[0].contains("'users','2'"), "{}", ledger[0]);

        conn.driver_mut()
            .respond("FROM `model_version_locks`", vec![Row::new().with("version", "2")]);
        let err = conn
            .update("users", 5, &payload, &UpdateOptions::new().version(1))
            .unwrap_err();
        assert!(matches!(err, DbError::VersionConflict { given: 1, latest: 2, .. }));
        assert_eq!(conn.driver().transactions().last(), Some(&TxCall::Rollback));
    }

    #[test]
    fn test_soft_and_hard_delete() {
        let mut config = EngineConfig::default();
        config.auto_hide.push("users".into());
        let mut conn = connection(config);

        conn.delete("users", 1, &DeleteOptions::new()).unwrap();
        conn.delete("posts", 3, &DeleteOptions::new()).unwrap();
        assert_eq!(
            conn.driver().statements(),
            [
                "UPDATE `users` `t` SET `t`.`zk_deleted` = 1 WHERE `t`.`id` = '1'",
                "DELETE `t` FROM `posts` `t` WHERE `t`.`id` = '3'",
            ]
        );
        assert!(matches!(
            conn.delete("users", WhereSpec::new(), &DeleteOptions::new()),
            Err(DbError::ConfirmationRequired(_))
        ));
    }

    #[test]
    fn test_delete_with_join() {
        let mut conn = connection(EngineConfig::default());
        let options = DeleteOptions::new().join(JoinSpec::new("users").alias("u"));
        conn.delete("posts", WhereSpec::new().eq("u.name", "Ann"), &options).unwrap();
        assert_eq!(
            conn.driver().statements()[0],
            "DELETE `t` FROM `posts` `t` INNER JOIN `users` `u` ON (`u`.`id` = `t`.`author`) WHERE `u`.`name` = 'Ann'"
        );
    }

    #[test]
    fn test_delete_translates_fk_failure() {
        let mut conn = connection(EngineConfig::default());
        conn.driver_mut().fail(
            "DELETE",
            DriverError::new(
                "Cannot delete or update a parent row: a foreign key constraint fails \
                 (`blog`.`posts`, CONSTRAINT `fk_author` FOREIGN KEY (`author`) REFERENCES `users` (`id`))",
            )
            .with_code(1451),
        );

        let err = conn.delete("users", 1, &DeleteOptions::new()).unwrap_err();
        match err.root() {
            DbError::ConstraintViolation { table, referencing_table, referencing_column } => {
                assert_eq!(table, "users");
                assert_eq!(referencing_table, "posts");
                assert_eq!(referencing_column, "author");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.sql(), Some("DELETE `t` FROM `users` `t` WHERE `t`.`id` = '1'"));
    }

    #[test]
    fn test_update_or_insert() {
        let mut conn = connection(EngineConfig::default());
        let payload = Payload::new().set("age", 30);

        let id = conn
            .update_or_insert("users", WhereSpec::new().eq("name", "Ann"), &payload, &UpdateOptions::new())
            .unwrap();
        assert_eq!(id, Some(1));
        assert_eq!(
            conn.driver().matching("INSERT")[0],
            "INSERT INTO `users`(`age`,`name`) VALUES('30','Ann')"
        );

        conn.driver_mut()
            .respond("FROM `users`", vec![Row::new().with("id", "9").with("name", "Ann")]);
        let id = conn
            .update_or_insert("users", WhereSpec::new().eq("name", "Ann"), &payload, &UpdateOptions::new())
            .unwrap();
        assert_eq!(id, Some(9));
        assert_eq!(
            conn.driver().statements().last().map(String::as_str),
            Some("UPDATE `users` `t` SET `t`.`age` = '30' WHERE `t`.`name` = 'Ann'")
        );
    }

    #[test]
    fn test_purge_version_locks() {
        let mut conn = connection(EngineConfig::default());
        let now = chrono::NaiveDate::from_ymd_opt(2024, 3, 2)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        conn.purge_version_locks(now).unwrap();
        assert_eq!(
            conn.driver().statements()[0],
            "DELETE `t` FROM `model_version_locks` `t` WHERE `t`.`date` < '2024-03-01 12:00:00'"
        );
    }
}
