//! Condition engine.
//!
//! A [`Condition`] is a predicate tree that compiles to a SQL `WHERE`
//! fragment and can also be evaluated against an in-memory [`FieldMap`].
//! Conditions are usually written in a small mini-language:
//!
//! | text            | meaning                     |
//! |-----------------|-----------------------------|
//! | `id=5`          | equals                      |
//! | `id!5`, `id!=5` | not equals                  |
//! | `n>1`, `n<1`    | greater / less              |
//! | `n>=1`, `n<=1`  | greater-or-equal / less-or-equal |
//! | `title~it%`     | SQL `LIKE`                  |
//! | `title!~it%`    | SQL `NOT LIKE`              |
//! | `id:1,2,3`      | in list (brackets optional) |
//! | `id!:[1,2]`     | not in list                 |
//!
//! Lists of condition strings are AND-combined unless built with
//! [`Condition::or`].
//!
//! # Examples
//!
//! ```
//! use rowguard::{fields, Condition};
//!
//! let cond = Condition::and(["parent_id = 0", "title ~ item%"]);
//! assert_eq!(cond.compile(), "((`parent_id`=0) AND (`title` LIKE 'item%'))");
//! assert!(cond.test(&fields! { "parent_id" => 0, "title" => "Item 2" }).unwrap());
//! ```

mod comparison;

pub use comparison::{Comparison, Literal, Operand, Operator};

use crate::error::{OrmError, Result};
use crate::sql::Dialect;
use crate::value::{FieldMap, FieldValue};
use std::fmt;

/// Boolean combinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    fn as_sql(self) -> &'static str {
        match self {
            BoolOp::And => " AND ",
            BoolOp::Or => " OR ",
        }
    }
}

/// Predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// AND/OR over child conditions
    Bool { op: BoolOp, operands: Vec<Condition> },
    /// `field <op> operand`
    Comparison(Comparison),
    /// Opaque SQL, never evaluable in memory
    RawSql(String),
}

impl Condition {
    /// Parse a single comparison; text outside the grammar becomes raw SQL
    pub fn parse(text: &str) -> Self {
        match Comparison::parse(text) {
            Ok(cmp) => Condition::Comparison(cmp),
            Err(_) => Condition::RawSql(text.trim().to_string()),
        }
    }

    /// Parse a single comparison, failing on text outside the grammar.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::ConditionParse` when `text` is not `field<op>value`.
    pub fn parse_strict(text: &str) -> Result<Self> {
        Comparison::parse(text).map(Condition::Comparison)
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Condition::RawSql(sql.into())
    }

    /// AND over every item; an empty list matches everything
    pub fn and<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoCondition,
    {
        Self::combine(BoolOp::And, items)
    }

    /// OR over every item; an empty list matches nothing
    pub fn or<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoCondition,
    {
        Self::combine(BoolOp::Or, items)
    }

    pub fn combine<I>(op: BoolOp, items: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoCondition,
    {
        Condition::Bool {
            op,
            operands: items.into_iter().map(IntoCondition::into_condition).collect(),
        }
    }

    /// Programmatic comparison against a typed value.
    ///
    /// # Errors
    ///
    /// Fails when `op` is a list operator.
    pub fn compare(field: &str, op: Operator, value: impl Into<FieldValue>) -> Result<Self> {
        let value = value.into();
        Comparison::new(field, op, Operand::Single(Literal::from(&value))).map(Condition::Comparison)
    }

    /// `field = value`
    pub fn equals(field: &str, value: impl Into<FieldValue>) -> Self {
        let value = value.into();
        Condition::Comparison(Comparison::equals(field, &value))
    }

    /// `field : values`.
    ///
    /// An empty list never matches.
    pub fn is_in<V: Into<FieldValue>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let items: Vec<Literal> = values.into_iter().map(|v| Literal::from(&v.into())).collect();
        if items.is_empty() {
            return Condition::or(Vec::<Condition>::new());
        }
        match Comparison::new(field, Operator::In, Operand::List(items)) {
            Ok(cmp) => Condition::Comparison(cmp),
            Err(_) => Condition::or(Vec::<Condition>::new()),
        }
    }

    /// SQL fragment using MySQL-style string escaping
    pub fn compile(&self) -> String {
        self.to_sql(Dialect::MySql)
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_sql_qualified(dialect, None)
    }

    /// SQL fragment with every field prefixed by a table alias
    pub fn to_sql_qualified(&self, dialect: Dialect, prefix: Option<&str>) -> String {
        match self {
            Condition::Comparison(cmp) => cmp.to_sql(dialect, prefix),
            Condition::RawSql(sql) => format!("({sql})"),
            Condition::Bool { op, operands } if operands.is_empty() => match op {
                BoolOp::And => "(1=1)".to_string(),
                BoolOp::Or => "(1=0)".to_string(),
            },
            Condition::Bool { op, operands } => {
                let parts: Vec<String> = operands
                    .iter()
                    .map(|c| c.to_sql_qualified(dialect, prefix))
                    .collect();
                format!("({})", parts.join(op.as_sql()))
            }
        }
    }

    /// Evaluate against a field map.
    ///
    /// AND stops at the first false operand, OR at the first true one.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::ConditionParse` when a raw SQL node has to be evaluated.
    pub fn test(&self, item: &FieldMap) -> Result<bool> {
        match self {
            Condition::Comparison(cmp) => Ok(cmp.test(item)),
            Condition::RawSql(sql) => Err(OrmError::ConditionParse(format!(
                "can't test raw SQL condition '{sql}' in memory"
            ))),
            Condition::Bool { op: BoolOp::And, operands } => {
                for c in operands {
                    if !c.test(item)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Bool { op: BoolOp::Or, operands } => {
                for c in operands {
                    if c.test(item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Whether this tree contains raw SQL anywhere
    pub fn has_raw_sql(&self) -> bool {
        match self {
            Condition::RawSql(_) => true,
            Condition::Comparison(_) => false,
            Condition::Bool { operands, .. } => operands.iter().any(Condition::has_raw_sql),
        }
    }

    /// AND this condition with another, flattening nested ANDs
    #[must_use]
    pub fn and_also(self, other: Condition) -> Condition {
        match self {
            Condition::Bool {
                op: BoolOp::And,
                mut operands,
            } => {
                operands.push(other);
                Condition::Bool {
                    op: BoolOp::And,
                    operands,
                }
            }
            first => Condition::and([first, other]),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compile())
    }
}

/// Anything that can be turned into a [`Condition`]
pub trait IntoCondition {
    fn into_condition(self) -> Condition;
}

impl IntoCondition for Condition {
    fn into_condition(self) -> Condition {
        self
    }
}

impl IntoCondition for &Condition {
    fn into_condition(self) -> Condition {
        self.clone()
    }
}

impl IntoCondition for &str {
    fn into_condition(self) -> Condition {
        Condition::parse(self)
    }
}

impl IntoCondition for String {
    fn into_condition(self) -> Condition {
        Condition::parse(&self)
    }
}

impl IntoCondition for &String {
    fn into_condition(self) -> Condition {
        Condition::parse(self)
    }
}

impl<T: IntoCondition> IntoCondition for Vec<T> {
    fn into_condition(self) -> Condition {
        Condition::and(self)
    }
}

impl<T: IntoCondition, const N: usize> IntoCondition for [T; N] {
    fn into_condition(self) -> Condition {
        Condition::and(self)
    }
}

impl<T: IntoCondition + Clone> IntoCondition for &[T] {
    fn into_condition(self) -> Condition {
        Condition::and(self.iter().cloned())
    }
}
