/// Join planning: explicit join clauses or clauses inferred from foreign keys.

use crate::catalog::SchemaLookup;
use crate::types::{DbError, DbResult, TableSchema};
use super::predicate::{Glue, Predicate, WhereCompiler};
use super::quote::{sanitize_identifier, FieldScope, Quoter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
}

impl JoinKind {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
        }
    }
}

/// A projected column of a joined table, optionally renamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinField {
    pub field: String,
    pub alias: Option<String>,
}

impl JoinField {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            alias: None,
        }
    }

    pub fn aliased(field: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            alias: Some(alias.into()),
        }
    }

    /// Name under which the field appears in result rows.
    #[must_use]
    pub fn exposed_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.field)
    }
}

/// A join as declared by the caller.
#[derive(Debug, Clone, Default)]
pub struct JoinSpec {
    pub table: String,
    pub alias: Option<String>,
    pub kind: JoinKind,
    /// Column of the source table.
    pub on: Option<String>,
    /// Column of the joined table.
    pub join_field: Option<String>,
    /// Raw ON condition, bypassing inference.
    pub full_on: Option<String>,
    pub fields: Option<Vec<JoinField>>,
    /// Extra conditions added to the ON clause.
    pub filter: Vec<Predicate>,
}

impl JoinSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub const fn kind(mut self, kind: JoinKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn on(mut self, field: impl Into<String>) -> Self {
        self.on = Some(field.into());
        self
    }

    #[must_use]
    pub fn join_field(mut self, field: impl Into<String>) -> Self {
        self.join_field = Some(field.into());
        self
    }

    #[must_use]
    pub fn full_on(mut self, condition: impl Into<String>) -> Self {
        self.full_on = Some(condition.into());
        self
    }

    #[must_use]
    pub fn fields(mut self, fields: impl IntoIterator<Item = JoinField>) -> Self {
        self.fields = Some(fields.into_iter().collect());
        self
    }

    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter.push(predicate);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinCondition {
    Raw(String),
    Columns { on: String, join_field: String },
}

/// A join with its alias, condition and projection settled.
#[derive(Debug, Clone)]
pub struct ResolvedJoin {
    pub table: String,
    pub alias: String,
    pub kind: JoinKind,
    pub condition: JoinCondition,
    pub filter: Vec<Predicate>,
    pub fields: Vec<JoinField>,
}

/// Resolves every declared join against the source table's foreign keys.
pub fn plan_joins(
    source: &TableSchema,
    specs: &[JoinSpec],
    lookup: &mut dyn SchemaLookup,
) -> DbResult<Vec<ResolvedJoin>> {
    specs
        .iter()
        .enumerate()
        .map(|(index, spec)| plan_join(source, spec, index, lookup))
        .collect()
}

fn plan_join(
    source: &TableSchema,
    spec: &JoinSpec,
    index: usize,
    lookup: &mut dyn SchemaLookup,
) -> DbResult<ResolvedJoin> {
    let condition = match (&spec.full_on, &spec.on, &spec.join_field) {
        (Some(raw), _, _) => JoinCondition::Raw(raw.clone()),
        (None, Some(on), Some(join_field)) => JoinCondition::Columns {
            on: on.clone(),
            join_field: join_field.clone(),
        },
        (None, Some(on), None) => infer_from_column(source, on, &spec.table)?,
        (None, None, _) => {
            let target = lookup.lookup(&spec.table)?;
            infer_from_keys(source, &target)?
        }
    };

    let fields = match &spec.fields {
        Some(fields) => fields.clone(),
        None => {
            let target = lookup.lookup(&spec.table)?;
            target
                .columns
                .iter()
                .map(|c| {
                    if source.has_column(&c.name) {
                        JoinField::aliased(c.name.clone(), format!("{}_{}", spec.table, c.name))
                    } else {
                        JoinField::new(c.name.clone())
                    }
                })
                .collect()
        }
    };

    Ok(ResolvedJoin {
        table: spec.table.clone(),
        alias: spec.alias.clone().unwrap_or_else(|| format!("j{index}")),
        kind: spec.kind,
        condition,
        filter: spec.filter.clone(),
        fields,
    })
}

/// `on` is known: its foreign key to the target gives the joined column.
fn infer_from_column(source: &TableSchema, on: &str, target: &str) -> DbResult<JoinCondition> {
    let column = source.require_column(on)?;
    let candidates: Vec<_> = column
        .foreign_keys
        .iter()
        .filter(|fk| fk.referenced_table == target)
        .collect();
    match candidates.as_slice() {
        [fk] => Ok(JoinCondition::Columns {
            on: on.to_string(),
            join_field: fk.referenced_column.clone(),
        }),
        [] if column.foreign_keys.is_empty() => Err(DbError::NoForeignKey {
            from: source.name.clone(),
            to: target.to_string(),
            detail: format!("column '{on}' has no foreign key"),
        }),
        [] => Err(DbError::NoForeignKey {
            from: source.name.clone(),
            to: target.to_string(),
            detail: format!(
                "column '{on}' references '{}' instead",
                column.foreign_keys[0].referenced_table
            ),
        }),
        _ => Err(DbError::AmbiguousJoin {
            from: source.name.clone(),
            to: target.to_string(),
            detail: format!("column '{on}' has several foreign keys to the target"),
        }),
    }
}

/// Nothing is known: look for exactly one foreign key in either direction.
fn infer_from_keys(source: &TableSchema, target: &TableSchema) -> DbResult<JoinCondition> {
    let ambiguous = |direction: &str| DbError::AmbiguousJoin {
        from: source.name.clone(),
        to: target.name.clone(),
        detail: format!("more than one foreign key {direction}, use 'on' to pick one"),
    };

    let forward: Vec<_> = source
        .foreign_keys()
        .filter(|(_, fk)| fk.referenced_table == target.name)
        .collect();
    match forward.as_slice() {
        [(column, fk)] => {
            return Ok(JoinCondition::Columns {
                on: column.name.clone(),
                join_field: fk.referenced_column.clone(),
            });
        }
        [] => {}
        _ => return Err(ambiguous("points at the joined table")),
    }

    let backward: Vec<_> = target
        .foreign_keys()
        .filter(|(_, fk)| fk.referenced_table == source.name)
        .collect();
    match backward.as_slice() {
        [(column, fk)] => Ok(JoinCondition::Columns {
            on: fk.referenced_column.clone(),
            join_field: column.name.clone(),
        }),
        [] => Err(DbError::NoForeignKey {
            from: source.name.clone(),
            to: target.name.clone(),
            detail: "no foreign key in either direction, specify the join columns".to_string(),
        }),
        _ => Err(ambiguous("points back at the source table")),
    }
}

/// Renders the JOIN clauses, resolving extra ON conditions in `scope`.
pub fn render_joins(quoter: &dyn Quoter, joins: &[ResolvedJoin], scope: &FieldScope) -> DbResult<String> {
    let main_alias = scope.main_alias.as_deref().unwrap_or("t");
    let mut sql = String::new();
    for join in joins {
        let on = match &join.condition {
            JoinCondition::Raw(raw) => raw.clone(),
            JoinCondition::Columns { on, join_field } => {
                let mut parts = vec![format!(
                    "{}.{} = {}.{}",
                    sanitize_identifier(&join.alias),
                    sanitize_identifier(join_field),
                    sanitize_identifier(main_alias),
                    sanitize_identifier(on)
                )];
                let extra = WhereCompiler::new(quoter, None, scope).compile(&join.filter, Glue::And)?;
                if !extra.is_empty() {
                    parts.push(extra);
                }
                format!("({})", parts.join(" AND "))
            }
        };
        sql.push_str(&format!(
            " {} JOIN {} {} ON {on}",
            join.kind.as_sql(),
            sanitize_identifier(&join.table),
            sanitize_identifier(&join.alias)
        ));
    }
    Ok(sql)
}

/// Projection list for the joined fields: `` `j0`.`name` AS `alias` ``.
#[must_use]
pub fn join_projection(joins: &[ResolvedJoin]) -> Vec<String> {
    joins
        .iter()
        .flat_map(|join| {
            join.fields.iter().map(move |f| {
                let column = format!("{}.{}", sanitize_identifier(&join.alias), sanitize_identifier(&f.field));
                match &f.alias {
                    Some(alias) => format!("{column} AS {}", sanitize_identifier(alias)),
                    None => column,
                }
            })
        })
        .collect()
}
