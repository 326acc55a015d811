/// Where-spec model and its compilation to a SQL boolean expression.
///
/// A where-spec is a list of predicates joined by a glue operator; groups
/// nest with their own glue. Shape errors are reported while building the
/// spec (see `parser::where_json`), so compilation only fails on unknown
/// columns.

use crate::types::{DataType, DbError, DbResult, TableSchema, Value};
use super::quote::{quote_literal, FieldScope, Quoter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Glue {
    #[default]
    And,
    Or,
}

impl Glue {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    pub fn parse(text: &str) -> DbResult<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            other => Err(DbError::malformed(format!("unknown logical operator '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
    Regexp,
}

impl CompareOp {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::Regexp => "REGEXP",
        }
    }

    pub fn parse(text: &str) -> DbResult<Self> {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        match normalized.as_str() {
            "=" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "LIKE" => Ok(Self::Like),
            "NOT LIKE" => Ok(Self::NotLike),
            "REGEXP" => Ok(Self::Regexp),
            other => Err(DbError::malformed(format!("unknown comparison operator '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Pre-built SQL fragment, inserted verbatim inside parentheses.
    Raw(String),
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    Between {
        field: String,
        low: Value,
        high: Value,
    },
    In {
        field: String,
        values: Vec<Value>,
        negated: bool,
    },
    Match {
        fields: Vec<String>,
        against: Value,
    },
    Group {
        glue: Glue,
        items: Vec<Predicate>,
    },
}

impl Predicate {
    /// Flat equality on a non-null scalar, the only shape the row cache replays.
    #[must_use]
    pub fn as_flat_equality(&self) -> Option<(&str, &Value)> {
        match self {
            Self::Compare {
                field,
                op: CompareOp::Eq,
                value,
            } if !value.is_null() && !matches!(value, Value::Point(..)) => Some((field, value)),
            _ => None,
        }
    }
}

/// An ordered list of predicates; the glue is supplied at compile time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereSpec {
    pub items: Vec<Predicate>,
}

impl WhereSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn push(mut self, predicate: Predicate) -> Self {
        self.items.push(predicate);
        self
    }

    #[must_use]
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(field, CompareOp::Eq, value)
    }

    #[must_use]
    pub fn compare(self, field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        self.push(Predicate::Compare {
            field: field.into(),
            op,
            value: value.into(),
        })
    }

    #[must_use]
    pub fn between(self, field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push(Predicate::Between {
            field: field.into(),
            low: low.into(),
            high: high.into(),
        })
    }

    #[must_use]
    pub fn is_in<V: Into<Value>>(self, field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.push(Predicate::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        })
    }

    #[must_use]
    pub fn not_in<V: Into<Value>>(self, field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.push(Predicate::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        })
    }

    #[must_use]
    pub fn matches<S: Into<String>>(self, fields: impl IntoIterator<Item = S>, against: impl Into<Value>) -> Self {
        self.push(Predicate::Match {
            fields: fields.into_iter().map(Into::into).collect(),
            against: against.into(),
        })
    }

    #[must_use]
    pub fn raw(self, fragment: impl Into<String>) -> Self {
        self.push(Predicate::Raw(fragment.into()))
    }

    #[must_use]
    pub fn group(self, glue: Glue, sub: Self) -> Self {
        self.push(Predicate::Group {
            glue,
            items: sub.items,
        })
    }

    /// Equality checks when every predicate is one; `None` otherwise.
    #[must_use]
    pub fn flat_equalities(&self) -> Option<Vec<(&str, &Value)>> {
        self.items.iter().map(Predicate::as_flat_equality).collect()
    }
}

/// Compiles predicates against one table and field scope.
pub struct WhereCompiler<'a> {
    quoter: &'a dyn Quoter,
    schema: Option<&'a TableSchema>,
    scope: &'a FieldScope,
    for_where: bool,
}

impl<'a> WhereCompiler<'a> {
    pub fn new(quoter: &'a dyn Quoter, schema: Option<&'a TableSchema>, scope: &'a FieldScope) -> Self {
        Self {
            quoter,
            schema,
            scope,
            for_where: true,
        }
    }

    /// Assignment mode for SET clauses: `= NULL` is kept as is.
    #[must_use]
    pub const fn for_assignments(mut self) -> Self {
        self.for_where = false;
        self
    }

    /// Joins the compiled predicates with `glue`. Empty input yields an empty string.
    pub fn compile(&self, items: &[Predicate], glue: Glue) -> DbResult<String> {
        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            if let Some(sql) = self.compile_one(item)? {
                parts.push(sql);
            }
        }
        Ok(parts.join(&format!(" {} ", glue.as_sql())))
    }

    /// `field = value` pairs for an UPDATE ... SET clause.
    pub fn compile_assignments<'v>(&self, values: impl IntoIterator<Item = (&'v String, &'v Value)>) -> DbResult<String> {
        let items: Vec<Predicate> = values
            .into_iter()
            .map(|(field, value)| Predicate::Compare {
                field: field.clone(),
                op: CompareOp::Eq,
                value: value.clone(),
            })
            .collect();
        let parts = items
            .iter()
            .map(|p| self.compile_one(p).map(Option::unwrap_or_default))
            .collect::<DbResult<Vec<_>>>()?;
        Ok(parts.join(","))
    }

    fn field(&self, name: &str) -> DbResult<String> {
        if let Some(schema) = self.schema {
            if !name.contains('.') && !schema.has_column(name) && !self.scope.knows(name) {
                return Err(DbError::SchemaMismatch {
                    table: schema.name.clone(),
                    column: name.to_string(),
                });
            }
        }
        Ok(self.scope.resolve(name))
    }

    fn literal(&self, value: &Value) -> String {
        quote_literal(self.quoter, value)
    }

    fn compile_one(&self, predicate: &Predicate) -> DbResult<Option<String>> {
        let sql = match predicate {
            Predicate::Raw(fragment) => format!("({fragment})"),
            Predicate::Group { glue, items } => {
                let inner = self.compile(items, *glue)?;
                if inner.is_empty() {
                    return Ok(None);
                }
                format!("({inner})")
            }
            Predicate::Compare { field, op, value } => {
                let column = self.field(field)?;
                if let (Value::Point(..), Some(schema)) = (value, self.schema) {
                    if let Some(col) = schema.column(field) {
                        if col.data_type != DataType::Point {
                            return Err(DbError::malformed(format!(
                                "point value given for non-point column '{field}'"
                            )));
                        }
                    }
                }
                let operator = match (value.is_null() && self.for_where, op) {
                    (true, CompareOp::Eq) => "IS",
                    (true, CompareOp::Ne) => "IS NOT",
                    _ => op.as_sql(),
                };
                format!("{column} {operator} {}", self.literal(value))
            }
            Predicate::Between { field, low, high } => format!(
                "{} BETWEEN {} AND {}",
                self.field(field)?,
                self.literal(low),
                self.literal(high)
            ),
            Predicate::In {
                field,
                values,
                negated,
            } => {
                let column = self.field(field)?;
                if values.is_empty() {
                    // empty set: IN matches nothing, NOT IN matches everything
                    return Ok(Some(if *negated { "1 = 1" } else { "0 = 1" }.to_string()));
                }
                let list = values.iter().map(|v| self.literal(v)).collect::<Vec<_>>().join(",");
                let operator = if *negated { "NOT IN" } else { "IN" };
                format!("{column} {operator} ({list})")
            }
            Predicate::Match { fields, against } => {
                if fields.is_empty() {
                    return Err(DbError::malformed("MATCH needs at least one field"));
                }
                let columns = fields
                    .iter()
                    .map(|f| self.field(f))
                    .collect::<DbResult<Vec<_>>>()?
                    .join(",");
                format!("MATCH({columns}) AGAINST({})", self.literal(against))
            }
        };
        Ok(Some(sql))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::quote::MysqlQuoter;
    use crate::types::Column;

    fn places() -> TableSchema {
        TableSchema::new(
            "places",
            vec![
                Column::new("id", DataType::Int).primary(),
                Column::new("name", DataType::Varchar { length: 50 }),
                Column::new("body", DataType::Text),
                Column::new("location", DataType::Point),
                Column::new("deleted_at", DataType::DateTime).nullable(),
            ],
        )
    }

    fn compile(spec: &WhereSpec, glue: Glue) -> DbResult<String> {
        let schema = places();
        let scope = FieldScope::default();
        WhereCompiler::new(&MysqlQuoter, Some(&schema), &scope).compile(&spec.items, glue)
    }

    #[test]
    fn test_equality_and_glue() {
        let spec = WhereSpec::new().eq("id", 3).eq("name", "Rome");
        assert_eq!(compile(&spec, Glue::And).unwrap(), "`id` = '3' AND `name` = 'Rome'");
        assert_eq!(compile(&spec, Glue::Or).unwrap(), "`id` = '3' OR `name` = 'Rome'");
    }

    #[test]
    fn test_null_rewrite_in_where() {
        let spec = WhereSpec::new()
            .eq("deleted_at", Value::Null)
            .compare("name", CompareOp::Ne, Value::Null);
        assert_eq!(
            compile(&spec, Glue::And).unwrap(),
            "`deleted_at` IS NULL AND `name` IS NOT NULL"
        );
    }

    #[test]
    fn test_null_kept_in_assignments() {
        let schema = places();
        let scope = FieldScope::default();
        let compiler = WhereCompiler::new(&MysqlQuoter, Some(&schema), &scope).for_assignments();
        let field = "deleted_at".to_string();
        let name = "name".to_string();
        let sql = compiler
            .compile_assignments([(&field, &Value::Null), (&name, &Value::from("x"))])
            .unwrap();
        assert_eq!(sql, "`deleted_at` = NULL,`name` = 'x'");
    }

    #[test]
    fn test_nested_groups() {
        let spec = WhereSpec::new()
            .eq("id", 1)
            .group(Glue::Or, WhereSpec::new().eq("name", "a").eq("name", "b"));
        assert_eq!(
            compile(&spec, Glue::And).unwrap(),
            "`id` = '1' AND (`name` = 'a' OR `name` = 'b')"
        );
    }

    #[test]
    fn test_empty_group_is_dropped() {
        let spec = WhereSpec::new().eq("id", 1).group(Glue::Or, WhereSpec::new());
        assert_eq!(compile(&spec, Glue::And).unwrap(), "`id` = '1'");
    }

    #[test]
    fn test_raw_fragment() {
        let spec = WhereSpec::new().raw("id > 10");
        assert_eq!(compile(&spec, Glue::And).unwrap(), "(id > 10)");
    }

    #[test]
    fn test_between_in_and_match() {
        let spec = WhereSpec::new()
            .between("id", 1, 9)
            .is_in("name", ["a", "b"])
            .not_in("id", [4])
            .matches(["name", "body"], "rome");
        assert_eq!(
            compile(&spec, Glue::And).unwrap(),
            "`id` BETWEEN '1' AND '9' AND `name` IN ('a','b') AND `id` NOT IN ('4') AND MATCH(`name`,`body`) AGAINST('rome')"
        );
    }

    #[test]
    fn test_empty_in_lists() {
        let spec = WhereSpec::new().is_in("id", Vec::<i64>::new());
        assert_eq!(compile(&spec, Glue::And).unwrap(), "0 = 1");
        let spec = WhereSpec::new().not_in("id", Vec::<i64>::new());
        assert_eq!(compile(&spec, Glue::And).unwrap(), "1 = 1");
    }

    #[test]
    fn test_point_equality() {
        let spec = WhereSpec::new().eq("location", Value::Point(12.5, 41.9));
        assert_eq!(compile(&spec, Glue::And).unwrap(), "`location` = POINT(12.5,41.9)");
        let spec = WhereSpec::new().eq("name", Value::Point(1.0, 2.0));
        assert!(matches!(compile(&spec, Glue::And), Err(DbError::MalformedPredicate(_))));
    }

    #[test]
    fn test_unknown_column_is_schema_mismatch() {
        let spec = WhereSpec::new().eq("nope", 1);
        assert!(matches!(
            compile(&spec, Glue::And),
            Err(DbError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_operators_parse() {
        assert_eq!(CompareOp::parse("<>").unwrap(), CompareOp::Ne);
        assert_eq!(CompareOp::parse("not   like").unwrap(), CompareOp::NotLike);
        assert!(CompareOp::parse("~~").is_err());
        assert_eq!(Glue::parse("or").unwrap(), Glue::Or);
    }

    #[test]
    fn test_flat_equalities() {
        let spec = WhereSpec::new().eq("id", 1).eq("name", "x");
        assert_eq!(spec.flat_equalities().unwrap().len(), 2);
        assert!(WhereSpec::new().eq("id", Value::Null).flat_equalities().is_none());
        assert!(WhereSpec::new().between("id", 1, 2).flat_equalities().is_none());
    }
}
