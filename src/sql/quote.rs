/// Literal quoting, identifier sanitizing and field reference resolution.
///
/// Identifiers are the only text injected into SQL without going through
/// the driver's quoting, so every table/column name passes through
/// `sanitize_identifier`.

use crate::types::Value;
use super::joins::ResolvedJoin;

/// Quoting of string literals, as provided by the driver.
pub trait Quoter {
    /// Returns `raw` as a complete, escaped SQL string literal.
    fn quote(&self, raw: &str) -> String {
        mysql_quote(raw)
    }
}

/// Stand-alone quoter using MySQL escaping rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlQuoter;

impl Quoter for MysqlQuoter {}

#[must_use]
pub fn mysql_quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('\'');
    for c in raw.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\x1a' => out.push_str("\\Z"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Renders a value as a SQL literal.
#[must_use]
pub fn quote_literal(quoter: &dyn Quoter, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Point(x, y) => format!("POINT({x},{y})"),
        // Date/time values already display as 'YYYY-MM-DD HH:MM:SS'
        other => quoter.quote(&other.to_string()),
    }
}

fn allowed_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ',' | '(' | ')' | '!' | '=' | '<' | '>' | ' ' | '-')
}

/// Strips every character outside the identifier whitelist, without quoting.
#[must_use]
pub fn sanitize_fragment(text: &str) -> String {
    text.chars().filter(|c| allowed_identifier_char(*c)).collect()
}

/// Sanitizes and backtick-quotes an identifier. Dotted names are quoted
/// per segment: `t.name` becomes `` `t`.`name` ``.
#[must_use]
pub fn sanitize_identifier(name: &str) -> String {
    sanitize_fragment(name)
        .split('.')
        .map(|part| format!("`{part}`"))
        .collect::<Vec<_>>()
        .join(".")
}

/// Fields served by a secondary table joined under `alias`.
#[derive(Debug, Clone, Default)]
pub struct AliasedFields {
    pub alias: String,
    pub fields: Vec<String>,
}

impl AliasedFields {
    pub fn new(alias: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            alias: alias.into(),
            fields,
        }
    }

    fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }
}

/// Everything needed to turn a field name into a qualified SQL reference.
#[derive(Debug, Clone, Default)]
pub struct FieldScope {
    pub main_alias: Option<String>,
    pub joins: Vec<ResolvedJoin>,
    pub multilang: Option<AliasedFields>,
    pub linked: Option<AliasedFields>,
    pub custom_multilang: Option<AliasedFields>,
}

impl FieldScope {
    /// Scope with only a main-table alias.
    pub fn aliased(alias: impl Into<String>) -> Self {
        Self {
            main_alias: Some(alias.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_joins(mut self, joins: Vec<ResolvedJoin>) -> Self {
        self.joins = joins;
        self
    }

    fn join_reference(&self, name: &str) -> Option<String> {
        self.joins.iter().find_map(|join| {
            join.fields
                .iter()
                .find(|f| f.exposed_name() == name)
                .map(|f| format!("{}.{}", sanitize_identifier(&join.alias), sanitize_identifier(&f.field)))
        })
    }

    /// Whether `name` is served by a join or a composed table of this scope.
    #[must_use]
    pub fn knows(&self, name: &str) -> bool {
        self.join_reference(name).is_some()
            || [&self.multilang, &self.linked, &self.custom_multilang]
                .into_iter()
                .flatten()
                .any(|a| a.has(name))
    }

    /// Qualified SQL reference for `name`. Joins are searched in declaration
    /// order and the first projecting join wins.
    #[must_use]
    pub fn resolve(&self, name: &str) -> String {
        if name.contains('.') {
            return sanitize_identifier(name);
        }
        if let Some(reference) = self.join_reference(name) {
            return reference;
        }
        let composed = [&self.multilang, &self.custom_multilang, &self.linked]
            .into_iter()
            .flatten()
            .find(|a| a.has(name));
        if let Some(aliased) = composed {
            return format!("{}.{}", sanitize_identifier(&aliased.alias), sanitize_identifier(name));
        }
        match &self.main_alias {
            Some(alias) => format!("{}.{}", sanitize_identifier(alias), sanitize_identifier(name)),
            None => sanitize_identifier(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::joins::{JoinCondition, JoinField, JoinKind};
    use chrono::NaiveDate;

    fn join(alias: &str, fields: Vec<JoinField>) -> ResolvedJoin {
        ResolvedJoin {
            table: "users".to_string(),
            alias: alias.to_string(),
            kind: JoinKind::Inner,
            condition: JoinCondition::Raw("1".to_string()),
            filter: Vec::new(),
            fields,
        }
    }

    #[test]
    fn test_quote_literal() {
        let q = MysqlQuoter;
        assert_eq!(quote_literal(&q, &Value::Null), "NULL");
        assert_eq!(quote_literal(&q, &Value::Integer(5)), "'5'");
        assert_eq!(quote_literal(&q, &Value::from("O'Brien")), "'O\\'Brien'");
        assert_eq!(quote_literal(&q, &Value::Point(1.0, 2.5)), "POINT(1,2.5)");
        let ts = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(8, 5, 0).unwrap();
        assert_eq!(quote_literal(&q, &Value::Timestamp(ts)), "'2024-03-09 08:05:00'");
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("users"), "`users`");
        assert_eq!(sanitize_identifier("us`ers;--"), "`users--`");
        assert_eq!(sanitize_identifier("t.name"), "`t`.`name`");
    }

    #[test]
    fn test_resolve_plain_and_aliased() {
        assert_eq!(FieldScope::default().resolve("name"), "`name`");
        assert_eq!(FieldScope::aliased("t").resolve("name"), "`t`.`name`");
    }

    #[test]
    fn test_resolve_join_fields() {
        let scope = FieldScope::aliased("t").with_joins(vec![
            join("j0", vec![JoinField::new("email"), JoinField::aliased("id", "users_id")]),
            join("j1", vec![JoinField::new("email")]),
        ]);
        assert_eq!(scope.resolve("email"), "`j0`.`email`");
        assert_eq!(scope.resolve("users_id"), "`j0`.`id`");
        // aliased projection does not capture the raw name
        assert_eq!(scope.resolve("id"), "`t`.`id`");
    }

    #[test]
    fn test_resolve_composed_tables() {
        let scope = FieldScope {
            main_alias: Some("t".to_string()),
            multilang: Some(AliasedFields::new("lang", vec!["title".to_string()])),
            linked: Some(AliasedFields::new("c", vec!["extra".to_string()])),
            ..FieldScope::default()
        };
        assert_eq!(scope.resolve("title"), "`lang`.`title`");
        assert_eq!(scope.resolve("extra"), "`c`.`extra`");
        assert!(scope.knows("title"));
        assert!(!scope.knows("id"));
    }
}
