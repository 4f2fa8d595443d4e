//! Splitting SQL dumps into statements

use crate::error::Result;
use std::fs;
use std::path::Path;

/// Returned by a parse callback to keep going or stop early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseControl {
    #[default]
    Continue,
    Stop,
}

/// Source of SQL statements
pub trait DumpParser {
    /// Call `callback` once per statement, in source order.
    ///
    /// Returns the number of statements handed to the callback, including
    /// the one that asked to stop.
    fn parse(&self, callback: &mut dyn FnMut(&str) -> ParseControl) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Statement splitter for SQL text.
///
/// Statements end at `;` outside quotes. `--` line comments and `/* */`
/// block comments are dropped; a trailing statement without `;` is still
/// delivered. Quotes are closed by the same character, so doubled quotes
/// (`'it''s'`) need no special handling.
///
/// # Examples
///
/// ```
/// use rowguard::migration::{DumpParser, ParseControl, SqlDumpParser};
///
/// let parser = SqlDumpParser::new("INSERT INTO t VALUES ('a;b'); -- note\nDELETE FROM t;");
/// let mut seen = Vec::new();
/// parser.parse(&mut |sql| {
///     seen.push(sql.to_string());
///     ParseControl::Continue
/// });
/// assert_eq!(seen, ["INSERT INTO t VALUES ('a;b')", "DELETE FROM t"]);
/// ```
#[derive(Debug, Clone)]
pub struct SqlDumpParser {
    source: String,
    backslash_escapes: bool,
}

impl SqlDumpParser {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            backslash_escapes: false,
        }
    }

    /// # Errors
    ///
    /// Returns `OrmError::Io` when the file can't be read.
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(fs::read_to_string(path)?))
    }

    /// Treat `\` inside quotes as escaping the next character (MySQL dumps)
    #[must_use]
    pub fn backslash_escapes(mut self, enabled: bool) -> Self {
        self.backslash_escapes = enabled;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Every statement, collected
    pub fn statements(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.parse(&mut |sql| {
            out.push(sql.to_string());
            ParseControl::Continue
        });
        out
    }
}

impl DumpParser for SqlDumpParser {
    fn parse(&self, callback: &mut dyn FnMut(&str) -> ParseControl) -> usize {
        let mut delivered = 0;
        let mut current = String::new();
        let mut state = Scan::Code;
        let mut chars = self.source.chars().peekable();

        let mut flush = |current: &mut String, delivered: &mut usize| -> ParseControl {
            let statement = current.trim();
            let control = if statement.is_empty() {
                ParseControl::Continue
            } else {
                *delivered += 1;
                callback(statement)
            };
            current.clear();
            control
        };

        while let Some(c) = chars.next() {
            match state {
                Scan::Code => match c {
                    '\'' | '"' | '`' => {
                        state = Scan::Quoted(c);
                        current.push(c);
                    }
                    '-' if chars.peek() == Some(&'-') => {
                        chars.next();
                        state = Scan::LineComment;
                    }
                    '/' if chars.peek() == Some(&'*') => {
                        chars.next();
                        state = Scan::BlockComment;
                    }
                    ';' => {
                        if flush(&mut current, &mut delivered) == ParseControl::Stop {
                            return delivered;
                        }
                    }
                    _ => current.push(c),
                },
                Scan::Quoted(quote) => {
                    current.push(c);
                    if c == '\\' && self.backslash_escapes && quote != '`' {
                        if let Some(escaped) = chars.next() {
                            current.push(escaped);
                        }
                    } else if c == quote {
                        state = Scan::Code;
                    }
                }
                Scan::LineComment => {
                    if c == '\n' {
                        current.push('\n');
                        state = Scan::Code;
                    }
                }
                Scan::BlockComment => {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        current.push(' ');
                        state = Scan::Code;
                    }
                }
            }
        }
        flush(&mut current, &mut delivered);
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_splits_on_semicolons() {
        let parser = SqlDumpParser::new("CREATE TABLE a (id INT);\n\nINSERT INTO a VALUES (1);\n");
        assert_eq!(
            parser.statements(),
            vec!["CREATE TABLE a (id INT)", "INSERT INTO a VALUES (1)"]
        );
    }

    #[test]
    fn test_semicolons_inside_quotes_are_kept() {
        let parser = SqlDumpParser::new(
            "INSERT INTO a VALUES ('x;y', \"z;\", 'it''s;');UPDATE `we;ird` SET v=1;",
        );
        assert_eq!(
            parser.statements(),
            vec![
                "INSERT INTO a VALUES ('x;y', \"z;\", 'it''s;')",
                "UPDATE `we;ird` SET v=1"
            ]
        );
    }

    #[test]
    fn test_comments_are_dropped() {
        let sql = "-- header;\n/* block; comment */CREATE TABLE a (id INT); -- trailing\n\
                   INSERT INTO a VALUES ('-- not a comment');";
        assert_eq!(
            SqlDumpParser::new(sql).statements(),
            vec!["CREATE TABLE a (id INT)", "INSERT INTO a VALUES ('-- not a comment')"]
        );
    }

    #[test]
    fn test_trailing_statement_without_semicolon() {
        let parser = SqlDumpParser::new("DELETE FROM a;\nDELETE FROM b\n");
        assert_eq!(parser.statements(), vec!["DELETE FROM a", "DELETE FROM b"]);
    }

    #[test]
    fn test_backslash_escapes() {
        let sql = r"INSERT INTO a VALUES ('it\'s;ok');DELETE FROM a;";
        assert_eq!(SqlDumpParser::new(sql).backslash_escapes(true).statements().len(), 2);
    }

    #[test]
    fn test_stop_halts_parsing() {
        let parser = SqlDumpParser::new("A;B;C;");
        let mut seen = Vec::new();
        let delivered = parser.parse(&mut |sql| {
            seen.push(sql.to_string());
            if sql == "B" {
                ParseControl::Stop
            } else {
                ParseControl::Continue
            }
        });
        assert_eq!(delivered, 2);
        assert_eq!(seen, vec!["A", "B"]);
    }
}
