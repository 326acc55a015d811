/// Parsing of driver error messages into structured form.

use nom::{
    bytes::complete::{tag, tag_no_case, take_until},
    character::complete::{char, multispace0},
    combinator::opt,
    multi::separated_list1,
    sequence::{delimited, preceded, tuple},
    IResult,
};

use super::common::{backticked, ws};

/// Details of a failed foreign-key check as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyFailure {
    /// Table holding the reference.
    pub referencing_table: String,
    pub constraint: String,
    pub referencing_column: String,
    /// Table being referenced.
    pub referenced_table: String,
    pub referenced_column: String,
}

const FK_MARKER: &str = "a foreign key constraint fails";

/// `db`.`table` or `table`; keeps the last segment.
fn qualified_name(input: &str) -> IResult<&str, String> {
    let (rest, parts) = separated_list1(char('.'), backticked)(input)?;
    Ok((rest, parts.last().cloned().unwrap_or_default()))
}

fn constraint_body(input: &str) -> IResult<&str, ForeignKeyFailure> {
    let (rest, (referencing_table, _, constraint, _, referencing_column, _, referenced_table, referenced_column)) =
        tuple((
            qualified_name,
            ws(char(',')),
            preceded(ws(tag_no_case("CONSTRAINT")), backticked),
            ws(tag_no_case("FOREIGN KEY")),
            delimited(ws(char('(')), backticked, ws(char(')'))),
            ws(tag_no_case("REFERENCES")),
            qualified_name,
            delimited(ws(char('(')), backticked, ws(char(')'))),
        ))(input)?;
    Ok((
        rest,
        ForeignKeyFailure {
            referencing_table,
            constraint,
            referencing_column,
            referenced_table,
            referenced_column,
        },
    ))
}

fn fk_message(input: &str) -> IResult<&str, ForeignKeyFailure> {
    let (rest, _) = take_until(FK_MARKER)(input)?;
    let (rest, _) = tag(FK_MARKER)(rest)?;
    let (rest, _) = tuple((multispace0, opt(char('('))))(rest)?;
    constraint_body(rest)
}

/// Extracts the foreign-key details from a constraint-violation message,
/// e.g. ``Cannot delete or update a parent row: a foreign key constraint fails
/// (`shop`.`orders`, CONSTRAINT `fk_user` FOREIGN KEY (`user_id`) REFERENCES `users` (`id`))``.
#[must_use]
pub fn parse_fk_violation(message: &str) -> Option<ForeignKeyFailure> {
    if !message.to_ascii_lowercase().contains(FK_MARKER) {
        return None;
    }
    let lowered_marker_at = message.to_ascii_lowercase().find(FK_MARKER)?;
    let normalized = format!("{}{}", FK_MARKER, &message[lowered_marker_at + FK_MARKER.len()..]);
    fk_message(&normalized).ok().map(|(_, failure)| failure)
}
