//! Backend-agnostic boolean filter trees.
//!
//! A [`Condition`] is an ordered list of nodes, each either a leaf
//! comparison on a field path or a nested sub-condition, tagged with the
//! connective (`AND`/`OR`) joining it to its predecessor and an optional
//! negation. Turning a condition into SQL is the query builder's job.

mod parse;

use crate::catalog::EXPR_SEP;
use crate::core::{ModelError, Result, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Dotted sequence of field names, possibly crossing relations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn parse(path: &str) -> Self {
        Self(path.split(EXPR_SEP).map(|s| s.trim().to_string()).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl From<String> for FieldPath {
    fn from(path: String) -> Self {
        Self::parse(&path)
    }
}

impl From<Vec<String>> for FieldPath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Closed set of comparison operators.
///
/// How each operator is spelled in SQL, and how many placeholders it
/// takes, is decided by the backend adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    /// Substring match, `%value%`.
    Like,
    NotLike,
    /// Raw pattern match, the value is used as given.
    LikePattern,
    ILike,
    NotILike,
    ILikePattern,
    In,
    NotIn,
    Lower,
    LowerOrEqual,
    Greater,
    GreaterOrEqual,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::Like => "like",
            Self::NotLike => "not like",
            Self::LikePattern => "=like",
            Self::ILike => "ilike",
            Self::NotILike => "not ilike",
            Self::ILikePattern => "=ilike",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Lower => "<",
            Self::LowerOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::IsNull => "is null",
            Self::IsNotNull => "is not null",
        }
    }

    /// Operators whose argument is a list of values.
    pub fn is_set_membership(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// Operators that take no argument at all.
    pub fn is_null_check(&self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

impl FromStr for Operator {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_lowercase();
        let op = match normalized.as_str() {
            "=" | "==" => Self::Equals,
            "!=" | "<>" => Self::NotEquals,
            "like" => Self::Like,
            "not like" => Self::NotLike,
            "=like" => Self::LikePattern,
            "ilike" => Self::ILike,
            "not ilike" => Self::NotILike,
            "=ilike" => Self::ILikePattern,
            "in" => Self::In,
            "not in" => Self::NotIn,
            "<" => Self::Lower,
            "<=" => Self::LowerOrEqual,
            ">" => Self::Greater,
            ">=" => Self::GreaterOrEqual,
            "is null" => Self::IsNull,
            "is not null" => Self::IsNotNull,
            _ => {
                return Err(ModelError::InvalidExpression(format!(
                    "Unknown operator '{}'",
                    s
                )));
            }
        };
        Ok(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Leaf {
        path: FieldPath,
        operator: Operator,
        arg: Value,
    },
    Nested(Condition),
}

/// One node of a condition.
#[derive(Debug, Clone, PartialEq)]
pub struct CondValue {
    /// Joined to the previous node with OR instead of AND.
    /// Meaningless on the first node of a condition.
    pub is_or: bool,
    pub is_not: bool,
    pub predicate: Predicate,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    params: Vec<CondValue>,
}

impl Condition {
    /// Empty condition, matching every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an SQL-like boolean expression, e.g.
    /// `(age > 30 OR name LIKE 'Bo') AND NOT manager.name = 'Alice'`.
    pub fn parse(expr: &str) -> Result<Self> {
        parse::parse_condition(expr)
    }

    fn push_leaf(mut self, is_or: bool, is_not: bool, path: FieldPath, operator: Operator, arg: Value) -> Self {
        self.params.push(CondValue {
            is_or,
            is_not,
            predicate: Predicate::Leaf { path, operator, arg },
        });
        self
    }

    fn push_cond(mut self, is_or: bool, is_not: bool, cond: Condition) -> Self {
        self.params.push(CondValue {
            is_or,
            is_not,
            predicate: Predicate::Nested(cond),
        });
        self
    }

    pub fn and(self, field: impl Into<FieldPath>, operator: Operator, value: impl Into<Value>) -> Self {
        self.push_leaf(false, false, field.into(), operator, value.into())
    }

    pub fn and_not(self, field: impl Into<FieldPath>, operator: Operator, value: impl Into<Value>) -> Self {
        self.push_leaf(false, true, field.into(), operator, value.into())
    }

    pub fn or(self, field: impl Into<FieldPath>, operator: Operator, value: impl Into<Value>) -> Self {
        self.push_leaf(true, false, field.into(), operator, value.into())
    }

    pub fn or_not(self, field: impl Into<FieldPath>, operator: Operator, value: impl Into<Value>) -> Self {
        self.push_leaf(true, true, field.into(), operator, value.into())
    }

    pub fn and_cond(self, cond: Condition) -> Self {
        self.push_cond(false, false, cond)
    }

    pub fn and_not_cond(self, cond: Condition) -> Self {
        self.push_cond(false, true, cond)
    }

    pub fn or_cond(self, cond: Condition) -> Self {
        self.push_cond(true, false, cond)
    }

    pub fn or_not_cond(self, cond: Condition) -> Self {
        self.push_cond(true, true, cond)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn nodes(&self) -> &[CondValue] {
        &self.params
    }

    /// Every field path referenced by this condition and its
    /// sub-conditions, each yielded once.
    pub fn all_field_paths(&self) -> impl Iterator<Item = &FieldPath> {
        let mut seen = HashSet::new();
        self.walk_paths().filter(move |path| seen.insert(*path))
    }

    fn walk_paths(&self) -> Box<dyn Iterator<Item = &FieldPath> + '_> {
        Box::new(self.params.iter().flat_map(|cv| -> Box<dyn Iterator<Item = &FieldPath> + '_> {
            match &cv.predicate {
                Predicate::Leaf { path, .. } => Box::new(std::iter::once(path)),
                Predicate::Nested(sub) => sub.walk_paths(),
            }
        }))
    }
}
