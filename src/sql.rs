//! SQL text builders for selects, counts, ordering and limits.

use crate::condition::Condition;
use crate::value::FieldMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;

static TRAILING_LIMIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\s+limit\s+(?:(\d+)\s*,\s*)?(\d+)(?:\s+offset\s+(\d+))?\s*;?\s*$")
        .expect("limit pattern is a valid regex")
});

static PLACEHOLDER_LIMIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\s+limit\s+(?:\d+|\?\d*|[:@$]\w+)(?:\s*(?:,|\boffset\b)\s*(?:\d+|\?\d*|[:@$]\w+))?\s*;?\s*$")
        .expect("placeholder limit pattern is a valid regex")
});

static SELECT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*select\s.+\sfrom\s").expect("select pattern is a valid regex"));

/// SQL flavour spoken by a database adapter.
///
/// Only string escaping and the random-order function differ between
/// flavours; identifiers are always backtick-quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Sqlite,
    MySql,
}

impl Dialect {
    /// Quote a string literal.
    ///
    /// MySQL also treats backslash as an escape character, so it is doubled there.
    pub fn quote_string(self, value: &str) -> String {
        let escaped = match self {
            Dialect::Sqlite => value.replace('\'', "''"),
            Dialect::MySql => value.replace('\\', "\\\\").replace('\'', "''"),
        };
        format!("'{escaped}'")
    }

    pub fn random_function(self) -> &'static str {
        match self {
            Dialect::Sqlite => "RANDOM()",
            Dialect::MySql => "RAND()",
        }
    }
}

/// `name` -> `` `name` ``
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn parse(text: &str) -> Self {
        if text.trim().eq_ignore_ascii_case("desc") {
            Direction::Desc
        } else {
            Direction::Asc
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// ORDER BY clause
#[derive(Debug, Clone, PartialEq)]
pub enum OrderBy {
    Fields(Vec<(String, Direction)>),
    Random,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        OrderBy::Fields(vec![(field.into(), Direction::Asc)])
    }

    pub fn desc(field: impl Into<String>) -> Self {
        OrderBy::Fields(vec![(field.into(), Direction::Desc)])
    }

    pub fn random() -> Self {
        OrderBy::Random
    }

    /// Append a tie-breaking field
    #[must_use]
    pub fn then(self, field: impl Into<String>, direction: Direction) -> Self {
        match self {
            OrderBy::Fields(mut fields) => {
                fields.push((field.into(), direction));
                OrderBy::Fields(fields)
            }
            OrderBy::Random => OrderBy::Random,
        }
    }

    pub fn to_sql(&self, dialect: Dialect, prefix: Option<&str>) -> String {
        match self {
            OrderBy::Random => dialect.random_function().to_string(),
            OrderBy::Fields(fields) => fields
                .iter()
                .map(|(field, dir)| match prefix {
                    Some(p) => format!("{p}.{} {}", quote_identifier(field), dir.as_sql()),
                    None => format!("{} {}", quote_identifier(field), dir.as_sql()),
                })
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// In-memory ordering of two rows; random ordering leaves rows as they are
    pub fn compare(&self, a: &FieldMap, b: &FieldMap) -> Ordering {
        let OrderBy::Fields(fields) = self else {
            return Ordering::Equal;
        };
        for (field, dir) in fields {
            let ord = match (a.get(field), b.get(field)) {
                (Some(x), Some(y)) => x.loose_cmp(y).unwrap_or_else(|| x.is_null().cmp(&y.is_null()).reverse()),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            let ord = match dir {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// `"title"`, `"id DESC"`, `"parent_id ASC, id DESC"` or `"RAND()"`
impl From<&str> for OrderBy {
    fn from(text: &str) -> Self {
        let upper = text.trim().to_ascii_uppercase();
        if upper == "RAND()" || upper == "RANDOM()" {
            return OrderBy::Random;
        }
        OrderBy::Fields(
            text.split(',')
                .filter_map(|part| {
                    let mut words = part.split_whitespace();
                    let field = words.next()?.trim_matches('`').to_string();
                    let dir = words.next().map_or(Direction::Asc, Direction::parse);
                    Some((field, dir))
                })
                .collect(),
        )
    }
}

impl<const N: usize> From<[(&str, &str); N]> for OrderBy {
    fn from(pairs: [(&str, &str); N]) -> Self {
        OrderBy::Fields(
            pairs
                .iter()
                .map(|(field, dir)| ((*field).to_string(), Direction::parse(dir)))
                .collect(),
        )
    }
}

/// LIMIT window: skip `offset` rows, return at most `count`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub offset: u64,
    pub count: u64,
}

impl Limit {
    pub fn count(count: u64) -> Self {
        Self { offset: 0, count }
    }

    pub fn range(offset: u64, count: u64) -> Self {
        Self { offset, count }
    }

    pub fn to_sql(self) -> String {
        if self.offset == 0 {
            format!("{}", self.count)
        } else {
            format!("{} OFFSET {}", self.count, self.offset)
        }
    }

    /// Number of rows this window keeps out of `total`
    pub fn clamp(self, total: u64) -> u64 {
        total.saturating_sub(self.offset).min(self.count)
    }

    /// Index bounds of this window over a list of `len` items
    pub fn bounds(self, len: usize) -> (usize, usize) {
        let start = usize::try_from(self.offset).unwrap_or(usize::MAX).min(len);
        let count = usize::try_from(self.count).unwrap_or(usize::MAX);
        (start, start.saturating_add(count).min(len))
    }
}

/// Clamp a raw row count by an optional window
pub fn clamp_count(total: u64, limit: Option<Limit>) -> u64 {
    limit.map_or(total, |l| l.clamp(total))
}

/// ` WHERE ... ORDER BY ... LIMIT ...`
pub fn select_params(
    condition: Option<&Condition>,
    order: Option<&OrderBy>,
    limit: Option<Limit>,
    dialect: Dialect,
    prefix: Option<&str>,
) -> String {
    let mut sql = match condition {
        Some(cond) => format!(" WHERE {}", cond.to_sql_qualified(dialect, prefix)),
        None => " WHERE 1=1".to_string(),
    };
    if let Some(order) = order {
        let rendered = order.to_sql(dialect, prefix);
        if !rendered.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&rendered);
        }
    }
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ");
        sql.push_str(&limit.to_sql());
    }
    sql
}

pub fn select_query(
    table: &str,
    condition: Option<&Condition>,
    order: Option<&OrderBy>,
    limit: Option<Limit>,
    dialect: Dialect,
) -> String {
    format!(
        "SELECT * FROM {}{}",
        quote_identifier(table),
        select_params(condition, order, limit, dialect, None)
    )
}

pub fn count_query(table: &str, condition: Option<&Condition>, dialect: Dialect) -> String {
    format!(
        "SELECT COUNT(*) FROM {}{}",
        quote_identifier(table),
        select_params(condition, None, None, dialect, None)
    )
}

/// Rows of `target` (alias `a`) joined to `joined` (alias `b`) on `a.id = b.foreign_key`.
///
/// The condition is qualified with `b.`, the ordering with `a.`.
pub fn select_join_query(
    target: &str,
    joined: &str,
    foreign_key: &str,
    condition: Option<&Condition>,
    order: Option<&OrderBy>,
    limit: Option<Limit>,
    dialect: Dialect,
) -> String {
    format!(
        "SELECT a.* FROM {} AS a JOIN {} AS b ON a.`id`=b.{}{}",
        quote_identifier(target),
        quote_identifier(joined),
        quote_identifier(foreign_key),
        join_params(condition, order, limit, dialect)
    )
}

pub fn count_join_query(
    target: &str,
    joined: &str,
    foreign_key: &str,
    condition: Option<&Condition>,
    dialect: Dialect,
) -> String {
    format!(
        "SELECT COUNT(*) FROM {} AS a JOIN {} AS b ON a.`id`=b.{}{}",
        quote_identifier(target),
        quote_identifier(joined),
        quote_identifier(foreign_key),
        join_params(condition, None, None, dialect)
    )
}

// join conditions address the join table, ordering addresses the target
fn join_params(
    condition: Option<&Condition>,
    order: Option<&OrderBy>,
    limit: Option<Limit>,
    dialect: Dialect,
) -> String {
    let mut sql = select_params(condition, None, None, dialect, Some("b"));
    if let Some(order) = order {
        let rendered = order.to_sql(dialect, Some("a"));
        if !rendered.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&rendered);
        }
    }
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ");
        sql.push_str(&limit.to_sql());
    }
    sql
}

pub fn random_select_query(
    table: &str,
    condition: Option<&Condition>,
    limit: Option<Limit>,
    dialect: Dialect,
) -> String {
    select_query(table, condition, Some(&OrderBy::Random), limit, dialect)
}

/// Split a trailing `LIMIT` off a query.
///
/// Understands `LIMIT n`, `LIMIT offset, n` and `LIMIT n OFFSET offset`.
pub fn extract_limit(sql: &str) -> (String, Option<Limit>) {
    let Some(caps) = TRAILING_LIMIT.captures(sql) else {
        return (sql.to_string(), None);
    };
    let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
    let count = number(2).unwrap_or(0);
    let offset = number(1).or_else(|| number(3)).unwrap_or(0);
    let stripped = TRAILING_LIMIT.replace(sql, "").into_owned();
    (stripped, Some(Limit::range(offset, count)))
}

/// Whether the trailing `LIMIT` takes a bound parameter (`LIMIT ?`, `LIMIT :n`),
/// so its window is only known to the driver
pub fn has_placeholder_limit(sql: &str) -> bool {
    !TRAILING_LIMIT.is_match(sql) && PLACEHOLDER_LIMIT.is_match(sql)
}

/// Rewrite a SELECT into a COUNT over the same rows, ignoring its LIMIT.
///
/// Returns the count query plus the extracted window, or `None` when the
/// text is not a plain SELECT.
pub fn select_to_count_query(sql: &str) -> Option<(String, Option<Limit>)> {
    let (stripped, limit) = extract_limit(sql);
    if !SELECT_PREFIX.is_match(&stripped) {
        return None;
    }
    let body = stripped.trim().trim_end_matches(';');
    Some((format!("SELECT COUNT(*) FROM ({body}) AS counted"), limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;

    #[test]
    fn test_select_query() {
        let cond = Condition::parse("parent_id=0");
        let sql = select_query(
            "items",
            Some(&cond),
            Some(&OrderBy::desc("id")),
            Some(Limit::range(5, 3)),
            Dialect::Sqlite,
        );
        assert_eq!(
            sql,
            "SELECT * FROM `items` WHERE (`parent_id`=0) ORDER BY `id` DESC LIMIT 3 OFFSET 5"
        );
        assert_eq!(
            select_query("items", None, None, None, Dialect::Sqlite),
            "SELECT * FROM `items` WHERE 1=1"
        );
    }

    #[test]
    fn test_join_query_qualifies_sides() {
        let cond = Condition::parse("item_id=3");
        let sql = select_join_query(
            "related_items",
            "items_relations",
            "related_item_id",
            Some(&cond),
            Some(&OrderBy::asc("id")),
            None,
            Dialect::Sqlite,
        );
        assert_eq!(
            sql,
            "SELECT a.* FROM `related_items` AS a JOIN `items_relations` AS b ON a.`id`=b.`related_item_id` WHERE (b.`item_id`=3) ORDER BY a.`id` ASC"
        );
    }

    #[test]
    fn test_order_parsing() {
        assert_eq!(OrderBy::from("RAND()"), OrderBy::Random);
        assert_eq!(
            OrderBy::from("parent_id, id desc"),
            OrderBy::asc("parent_id").then("id", Direction::Desc)
        );
        assert_eq!(OrderBy::from([("id", "DESC")]), OrderBy::desc("id"));
        assert_eq!(OrderBy::Random.to_sql(Dialect::MySql, None), "RAND()");
    }

    #[test]
    fn test_order_compare() {
        let order = OrderBy::desc("id");
        let a = fields! { "id" => 1 };
        let b = fields! { "id" => 2 };
        assert_eq!(order.compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_extract_limit_forms() {
        let (sql, limit) = extract_limit("SELECT * FROM t LIMIT 10");
        assert_eq!(sql, "SELECT * FROM t");
        assert_eq!(limit, Some(Limit::count(10)));

        let (_, limit) = extract_limit("select * from t limit 5, 10");
        assert_eq!(limit, Some(Limit::range(5, 10)));

        let (_, limit) = extract_limit("SELECT * FROM t LIMIT 10 OFFSET 5");
        assert_eq!(limit, Some(Limit::range(5, 10)));

        let (sql, limit) = extract_limit("SELECT * FROM t");
        assert_eq!(sql, "SELECT * FROM t");
        assert_eq!(limit, None);
    }

    #[test]
    fn test_placeholder_limit() {
        assert!(has_placeholder_limit("SELECT * FROM t LIMIT ?"));
        assert!(has_placeholder_limit("SELECT * FROM t LIMIT :n;"));
        assert!(has_placeholder_limit("SELECT * FROM t LIMIT 2, ?"));
        assert!(has_placeholder_limit("SELECT * FROM t LIMIT ? OFFSET :skip"));
        assert!(!has_placeholder_limit("SELECT * FROM t LIMIT 10 OFFSET 5"));
        assert!(!has_placeholder_limit("SELECT * FROM t WHERE id = ?"));
        assert_eq!(extract_limit("SELECT * FROM t LIMIT ?").1, None);
    }

    #[test]
    fn test_count_rewrite() {
        let (count, limit) = select_to_count_query("SELECT id, title FROM items WHERE id > 2 LIMIT 1, 2").unwrap();
        assert_eq!(count, "SELECT COUNT(*) FROM (SELECT id, title FROM items WHERE id > 2) AS counted");
        assert_eq!(limit, Some(Limit::range(1, 2)));
        assert!(select_to_count_query("PRAGMA table_info(items)").is_none());
    }

    #[test]
    fn test_limit_clamp() {
        assert_eq!(clamp_count(7, Some(Limit::range(5, 10))), 2);
        assert_eq!(clamp_count(7, Some(Limit::range(10, 3))), 0);
        assert_eq!(clamp_count(7, Some(Limit::count(5))), 5);
        assert_eq!(clamp_count(7, None), 7);
        assert_eq!(Limit::range(5, 10).bounds(7), (5, 7));
    }

    #[test]
    fn test_quote_string_dialects() {
        assert_eq!(Dialect::Sqlite.quote_string(r"a\'b"), r"'a\''b'");
        assert_eq!(Dialect::MySql.quote_string(r"a\'b"), r"'a\\''b'");
    }
}
