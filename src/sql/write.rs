/// INSERT / UPDATE / DELETE statement text.

use std::collections::BTreeSet;

use crate::types::{Row, TableSchema};
use super::quote::{quote_literal, sanitize_identifier, Quoter};
use super::select::MAIN_ALIAS;

fn verb(replace: bool) -> &'static str {
    if replace { "REPLACE" } else { "INSERT" }
}

/// `INSERT INTO `t`(`a`,`b`) VALUES('1','2')`
#[must_use]
pub fn insert_sql(quoter: &dyn Quoter, table: &str, row: &Row, replace: bool) -> String {
    let columns: Vec<String> = row.iter().map(|(k, _)| sanitize_identifier(k)).collect();
    let values: Vec<String> = row.iter().map(|(_, v)| quote_literal(quoter, v)).collect();
    format!(
        "{} INTO {}({}) VALUES({})",
        verb(replace),
        sanitize_identifier(table),
        columns.join(","),
        values.join(",")
    )
}

/// A row made only of defaults: NULL where allowed (or auto-generated),
/// `DEFAULT` for generated columns, `''` elsewhere.
#[must_use]
pub fn insert_defaults_sql(schema: &TableSchema, replace: bool) -> String {
    let values: Vec<&str> = schema
        .columns
        .iter()
        .filter(|c| c.real)
        .map(|c| match c {
            c if c.generated => "DEFAULT",
            c if c.nullable || c.primary_key => "NULL",
            _ => "''",
        })
        .collect();
    format!(
        "{} INTO {} VALUES({})",
        verb(replace),
        sanitize_identifier(&schema.name),
        values.join(",")
    )
}

/// One statement for several rows. Columns are the union over all rows;
/// a row missing a column gets `DEFAULT`.
#[must_use]
pub fn insert_many_sql(quoter: &dyn Quoter, table: &str, rows: &[Row], replace: bool) -> String {
    let columns: BTreeSet<&String> = rows.iter().flat_map(|r| r.iter().map(|(k, _)| k)).collect();
    let tuples: Vec<String> = rows
        .iter()
        .map(|row| {
            let values: Vec<String> = columns
                .iter()
                .map(|c| row.get(c).map_or_else(|| "DEFAULT".to_string(), |v| quote_literal(quoter, v)))
                .collect();
            format!("({})", values.join(","))
        })
        .collect();
    format!(
        "{} INTO {}({}) VALUES{}",
        verb(replace),
        sanitize_identifier(table),
        columns.iter().map(|c| sanitize_identifier(c)).collect::<Vec<_>>().join(","),
        tuples.join(",")
    )
}

/// `UPDATE `table` `alias`<joins> SET <set><where>`; `where_sql` carries its
/// own leading ` WHERE` or is empty.
#[must_use]
pub fn update_sql(table: &str, alias: &str, joins: &str, set: &str, where_sql: &str) -> String {
    format!(
        "UPDATE {} {}{joins} SET {set}{where_sql}",
        sanitize_identifier(table),
        sanitize_identifier(alias)
    )
}

/// Hard delete, or a soft delete flagging `hide_column` when given.
#[must_use]
pub fn delete_sql(table: &str, joins: &str, where_sql: &str, hide_column: Option<&str>) -> String {
    match hide_column {
        Some(column) => update_sql(
            table,
            MAIN_ALIAS,
            joins,
            &format!("{} = 1", sanitize_identifier(&format!("{MAIN_ALIAS}.{column}"))),
            where_sql,
        ),
        None => format!(
            "DELETE {alias} FROM {} {alias}{joins}{where_sql}",
            sanitize_identifier(table),
            alias = sanitize_identifier(MAIN_ALIAS)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::quote::MysqlQuoter;
    use crate::types::{Column, DataType, Value};

    #[test]
    fn test_insert() {
        let row = Row::new().with("name", "Ann").with("age", Value::Null);
        assert_eq!(
            insert_sql(&MysqlQuoter, "users", &row, false),
            "INSERT INTO `users`(`age`,`name`) VALUES(NULL,'Ann')"
        );
        assert!(insert_sql(&MysqlQuoter, "users", &row, true).starts_with("REPLACE INTO"));
    }

    #[test]
    fn test_insert_defaults() {
        let schema = TableSchema::new(
            "users",
            vec![
                Column::new("id", DataType::Int).primary(),
                Column::new("name", DataType::Text),
                Column::new("bio", DataType::Text).nullable(),
                Column::new("extra", DataType::Text).linked(),
            ],
        );
        assert_eq!(
            insert_defaults_sql(&schema, false),
            "INSERT INTO `users` VALUES(NULL,'',NULL)"
        );
    }

    #[test]
    fn test_insert_many_fills_missing_with_default() {
        let rows = vec![
            Row::new().with("a", 1).with("b", 2),
            Row::new().with("a", 3),
            Row::new().with("b", 4).with("c", "x"),
        ];
        assert_eq!(
            insert_many_sql(&MysqlQuoter, "t1", &rows, false),
            "INSERT INTO `t1`(`a`,`b`,`c`) VALUES('1','2',DEFAULT),('3',DEFAULT,DEFAULT),(DEFAULT,'4','x')"
        );
    }

    #[test]
    fn test_delete_soft_and_hard() {
        let where_sql = " WHERE `t`.`id` = '1'";
        assert_eq!(
            delete_sql("users", "", where_sql, Some("zk_deleted")),
            "UPDATE `users` `t` SET `t`.`zk_deleted` = 1 WHERE `t`.`id` = '1'"
        );
        assert_eq!(
            delete_sql("users", "", where_sql, None),
            "DELETE `t` FROM `users` `t` WHERE `t`.`id` = '1'"
        );
    }
}
