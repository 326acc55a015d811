use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{alpha1, char, digit1, multispace0, multispace1},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    number::complete::double,
    sequence::{delimited, pair, preceded, separated_pair, tuple},
    IResult,
};

pub fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

pub fn identifier(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            take_while(|c: char| c.is_alphanumeric() || c == '_'),
        )),
        |s: &str| s.to_string(),
    )(input)
}

/// A backtick-quoted identifier: `name`
pub fn backticked(input: &str) -> IResult<&str, String> {
    map(
        delimited(char('`'), take_while1(|c| c != '`'), char('`')),
        |s: &str| s.to_string(),
    )(input)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// `field [ASC|DESC]`, a single sort key and nothing else.
pub fn simple_order_by(input: &str) -> Option<(String, SortDirection)> {
    let direction = alt((
        value(SortDirection::Asc, tag_no_case("ASC")),
        value(SortDirection::Desc, tag_no_case("DESC")),
    ));
    let clause = tuple((
        ws(identifier),
        opt(preceded(multispace0, direction)),
        multispace0,
    ));
    all_consuming(clause)(input)
        .ok()
        .map(|(_, (field, dir, _))| (field, dir.unwrap_or(SortDirection::Asc)))
}

fn unsigned(input: &str) -> IResult<&str, u64> {
    map_res(digit1, |s: &str| s.parse::<u64>())(input)
}

/// `count` or `offset,count`
pub fn limit_clause(input: &str) -> Option<(Option<u64>, u64)> {
    let with_offset = map(
        separated_pair(ws(unsigned), char(','), ws(unsigned)),
        |(offset, count)| (Some(offset), count),
    );
    let bare = map(ws(unsigned), |count| (None, count));
    all_consuming(alt((with_offset, bare)))(input)
        .ok()
        .map(|(_, limit)| limit)
}

/// Well-known-text point as returned by `AsText`: `POINT(x y)`
pub fn parse_wkt_point(input: &str) -> Option<(f64, f64)> {
    let point = preceded(
        ws(tag_no_case("POINT")),
        delimited(
            ws(char('(')),
            separated_pair(double, multispace1, double),
            ws(char(')')),
        ),
    );
    all_consuming(point)(input).ok().map(|(_, xy)| xy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier() {
        assert_eq!(identifier("user_id rest").unwrap(), (" rest", "user_id".to_string()));
        assert!(identifier("9abc").is_err());
    }

    #[test]
    fn test_simple_order_by() {
        assert_eq!(simple_order_by("name"), Some(("name".to_string(), SortDirection::Asc)));
        assert_eq!(simple_order_by(" id desc "), Some(("id".to_string(), SortDirection::Desc)));
        assert_eq!(simple_order_by("id DESC, name"), None);
        assert_eq!(simple_order_by("id sideways"), None);
    }

    #[test]
    fn test_limit_clause() {
        assert_eq!(limit_clause("10"), Some((None, 10)));
        assert_eq!(limit_clause("5, 10"), Some((Some(5), 10)));
        assert_eq!(limit_clause("5,x"), None);
    }

    #[test]
    fn test_wkt_point() {
        assert_eq!(parse_wkt_point("POINT(1.5 -2)"), Some((1.5, -2.0)));
        assert_eq!(parse_wkt_point("point( 3 4 )"), Some((3.0, 4.0)));
        assert_eq!(parse_wkt_point("LINESTRING(0 0,1 1)"), None);
    }

    #[test]
    fn test_backticked() {
        assert_eq!(backticked("`users` x").unwrap(), (" x", "users".to_string()));
    }
}
