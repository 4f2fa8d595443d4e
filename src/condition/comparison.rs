//! Single `field <op> value` predicates.

use crate::error::{OrmError, Result};
use crate::sql::{quote_identifier, Dialect};
use crate::value::{FieldMap, FieldValue};
use once_cell::sync::Lazy;
use regex::Regex;

static COMPARISON_GRAMMAR: Lazy<Regex> = Lazy::new(|| {
    // longest operators first so that `>=` never parses as `>` followed by `=value`
    Regex::new(r"(?s)^\s*(\w+)\s*(>=|<=|!~|!:|!=|[:=!><~])\s*(.*?)\s*$")
        .expect("comparison grammar is a valid regex")
});

/// Comparison operator of the condition mini-language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!` (or `!=`)
    Ne,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
    /// `~`, SQL `LIKE`
    Like,
    /// `!~`, SQL `NOT LIKE`
    NotLike,
    /// `:`, membership in a list
    In,
    /// `!:`, absence from a list
    NotIn,
}

impl Operator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "=" => Operator::Eq,
            "!" | "!=" => Operator::Ne,
            ">" => Operator::Gt,
            "<" => Operator::Lt,
            ">=" => Operator::Ge,
            "<=" => Operator::Le,
            "~" => Operator::Like,
            "!~" => Operator::NotLike,
            ":" => Operator::In,
            "!:" => Operator::NotIn,
            _ => return None,
        })
    }

    /// Canonical mini-language symbol
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Like => "~",
            Operator::NotLike => "!~",
            Operator::In => ":",
            Operator::NotIn => "!:",
        }
    }

    pub fn takes_list(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    fn sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Like => " LIKE ",
            Operator::NotLike => " NOT LIKE ",
            Operator::In => " IN ",
            Operator::NotIn => " NOT IN ",
        }
    }
}

/// A right-hand operand as written by the caller.
///
/// `quoted` records that the text was wrapped in single quotes, which forces
/// it to be treated as a string even when it spells a number.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub text: String,
    pub quoted: bool,
}

impl Literal {
    /// Parse raw operand text, stripping one pair of surrounding single quotes
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
            Literal {
                text: trimmed[1..trimmed.len() - 1].to_string(),
                quoted: true,
            }
        } else {
            Literal {
                text: trimmed.to_string(),
                quoted: false,
            }
        }
    }

    fn is_numeric(&self) -> bool {
        !self.quoted && FieldValue::Text(self.text.clone()).is_numeric()
    }

    /// The value this literal stands for when evaluated in memory
    pub fn value(&self) -> FieldValue {
        if self.is_numeric() {
            let text = self.text.trim();
            return text
                .parse::<i64>()
                .map(FieldValue::Int)
                .or_else(|_| text.parse::<f64>().map(FieldValue::Float))
                .unwrap_or_else(|_| FieldValue::Text(self.text.clone()));
        }
        FieldValue::Text(self.text.clone())
    }

    /// SQL rendering: numbers pass through, everything else is escaped and quoted
    pub fn to_sql(&self, dialect: Dialect) -> String {
        if self.is_numeric() {
            self.text.trim().to_string()
        } else {
            dialect.quote_string(&self.text)
        }
    }
}

impl From<&FieldValue> for Literal {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Int(_) | FieldValue::Float(_) => Literal {
                text: value.to_string(),
                quoted: false,
            },
            FieldValue::Text(s) => Literal {
                text: s.clone(),
                quoted: true,
            },
            FieldValue::Null => Literal {
                text: String::new(),
                quoted: true,
            },
        }
    }
}

/// Operand of a comparison: a scalar or, for `:`/`!:`, a list
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Single(Literal),
    List(Vec<Literal>),
}

impl Operand {
    /// Parse operand text for the given operator.
    ///
    /// Lists are comma separated and may be wrapped in brackets: `1,2` or `[1, 2]`.
    pub fn parse(op: Operator, raw: &str) -> Self {
        if op.takes_list() {
            let inner = raw.trim_matches(|c| c == ' ' || c == '[' || c == ']');
            Operand::List(inner.split(',').map(Literal::parse).collect())
        } else {
            Operand::Single(Literal::parse(raw))
        }
    }
}

/// `field <op> operand`
#[derive(Debug, Clone)]
pub struct Comparison {
    field: String,
    op: Operator,
    operand: Operand,
    pattern: Option<Regex>,
}

impl PartialEq for Comparison {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field && self.op == other.op && self.operand == other.operand
    }
}

impl Comparison {
    /// Build a comparison, checking that the operand shape fits the operator.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::InvalidArgument` when a list operator gets a scalar
    /// (or the reverse), and `OrmError::ConditionParse` when a `LIKE` pattern
    /// cannot be turned into a matcher.
    pub fn new(field: impl Into<String>, op: Operator, operand: Operand) -> Result<Self> {
        let field = field.into();
        match (&operand, op.takes_list()) {
            (Operand::List(_), false) => {
                return Err(OrmError::InvalidArgument(format!(
                    "operator {} on {field} expects a single value",
                    op.symbol()
                )))
            }
            (Operand::Single(_), true) => {
                return Err(OrmError::InvalidArgument(format!(
                    "operator {} on {field} expects a list",
                    op.symbol()
                )))
            }
            _ => {}
        }
        let pattern = match (&operand, op) {
            (Operand::Single(lit), Operator::Like | Operator::NotLike) => {
                Some(like_to_regex(&lit.text)?)
            }
            _ => None,
        };
        Ok(Self {
            field,
            op,
            operand,
            pattern,
        })
    }

    pub(crate) fn equals(field: &str, value: &FieldValue) -> Self {
        Self {
            field: field.to_string(),
            op: Operator::Eq,
            operand: Operand::Single(Literal::from(value)),
            pattern: None,
        }
    }

    /// Parse `field<op>value`.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::ConditionParse` when the text does not match the grammar.
    pub fn parse(text: &str) -> Result<Self> {
        let caps = COMPARISON_GRAMMAR
            .captures(text)
            .ok_or_else(|| OrmError::ConditionParse(format!("can't parse '{text}'")))?;
        let field = &caps[1];
        let op = Operator::from_symbol(&caps[2])
            .ok_or_else(|| OrmError::ConditionParse(format!("unknown operator in '{text}'")))?;
        Self::new(field, op, Operand::parse(op, &caps[3]))
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.op
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    pub(crate) fn to_sql(&self, dialect: Dialect, prefix: Option<&str>) -> String {
        let column = match prefix {
            Some(p) => format!("{p}.{}", quote_identifier(&self.field)),
            None => quote_identifier(&self.field),
        };
        let rhs = match &self.operand {
            Operand::Single(lit) => lit.to_sql(dialect),
            Operand::List(items) => {
                let rendered: Vec<String> = items.iter().map(|l| l.to_sql(dialect)).collect();
                format!("({})", rendered.join(","))
            }
        };
        format!("({column}{}{rhs})", self.op.sql())
    }

    /// Evaluate against a field map. Absent and null fields never match.
    pub fn test(&self, item: &FieldMap) -> bool {
        let value = match item.get(&self.field) {
            Some(v) if !v.is_null() => v,
            _ => return false,
        };
        match (&self.operand, self.op) {
            (Operand::Single(lit), op) => {
                let expected = lit.value();
                match op {
                    Operator::Eq => value.loose_eq(&expected),
                    Operator::Ne => !value.loose_eq(&expected),
                    Operator::Gt => value.loose_cmp(&expected).is_some_and(|o| o.is_gt()),
                    Operator::Lt => value.loose_cmp(&expected).is_some_and(|o| o.is_lt()),
                    Operator::Ge => value.loose_cmp(&expected).is_some_and(|o| o.is_ge()),
                    Operator::Le => value.loose_cmp(&expected).is_some_and(|o| o.is_le()),
                    Operator::Like => self.like_matches(value),
                    Operator::NotLike => !self.like_matches(value),
                    Operator::In | Operator::NotIn => false,
                }
            }
            (Operand::List(items), op) => {
                let found = items.iter().any(|l| value.loose_eq(&l.value()));
                match op {
                    Operator::In => found,
                    Operator::NotIn => !found,
                    _ => false,
                }
            }
        }
    }

    fn like_matches(&self, value: &FieldValue) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|re| re.is_match(&value.to_string()))
    }
}

/// Translate a SQL `LIKE` pattern into an anchored, case-insensitive regex
fn like_to_regex(pattern: &str) -> Result<Regex> {
    let mut source = String::from("(?is)^");
    for c in pattern.chars() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| OrmError::ConditionParse(format!("bad LIKE pattern '{pattern}': {e}")))
}
