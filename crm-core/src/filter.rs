//! Structured filter clauses
//!
//! A [`FilterClause`] tree is what both the REST filter syntax and GraphQL
//! filter inputs are reduced to before they reach the query runner.
//! `Display` renders a clause back in REST syntax.

use crate::error::ParseEnumError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a leaf clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Is,
    Like,
    Ilike,
    StartsWith,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 11] = [
        FilterOperator::Eq,
        FilterOperator::Neq,
        FilterOperator::Gt,
        FilterOperator::Gte,
        FilterOperator::Lt,
        FilterOperator::Lte,
        FilterOperator::In,
        FilterOperator::Is,
        FilterOperator::Like,
        FilterOperator::Ilike,
        FilterOperator::StartsWith,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::In => "in",
            FilterOperator::Is => "is",
            FilterOperator::Like => "like",
            FilterOperator::Ilike => "ilike",
            FilterOperator::StartsWith => "startsWith",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("filter operator", s))
    }
}

/// Logical combinator of a composite clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conjunction {
    And,
    Or,
    Not,
}

impl Conjunction {
    pub const ALL: [Conjunction; 3] = [Conjunction::And, Conjunction::Or, Conjunction::Not];

    pub fn as_str(&self) -> &'static str {
        match self {
            Conjunction::And => "and",
            Conjunction::Or => "or",
            Conjunction::Not => "not",
        }
    }
}

impl fmt::Display for Conjunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Conjunction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("conjunction", s))
    }
}

/// Operand of the `is` operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NullCheck {
    Null,
    NotNull,
}

impl NullCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            NullCheck::Null => "NULL",
            NullCheck::NotNull => "NOT_NULL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NULL" => Some(NullCheck::Null),
            "NOT_NULL" => Some(NullCheck::NotNull),
            _ => None,
        }
    }
}

/// Typed comparison value.
///
/// Numbers that fail to parse are kept as `NaN`; such comparisons match no
/// record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(f64),
    Boolean(bool),
    Text(String),
    List(Vec<FilterValue>),
}

impl FilterValue {
    pub fn text(value: impl Into<String>) -> Self {
        FilterValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FilterValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, FilterValue::Number(n) if n.is_nan())
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FilterValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FilterValue::Boolean(b) => serde_json::Value::Bool(*b),
            FilterValue::Text(s) => serde_json::Value::String(s.clone()),
            FilterValue::List(items) => {
                serde_json::Value::Array(items.iter().map(FilterValue::to_json).collect())
            }
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Number(n) => write!(f, "{}", n),
            FilterValue::Boolean(b) => write!(f, "{}", b),
            FilterValue::Text(s) if !s.contains('"') => write!(f, "\"{}\"", s),
            FilterValue::Text(s) if !s.contains('\'') => write!(f, "'{}'", s),
            // Both quote kinds: a doubled quote inside quotes is literal.
            FilterValue::Text(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            FilterValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Filter clause tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FilterClause {
    Leaf {
        field: String,
        operator: FilterOperator,
        value: FilterValue,
    },
    Composite {
        conjunction: Conjunction,
        clauses: Vec<FilterClause>,
    },
}

impl FilterClause {
    pub fn leaf(field: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        FilterClause::Leaf {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn and(clauses: Vec<FilterClause>) -> Self {
        FilterClause::Composite {
            conjunction: Conjunction::And,
            clauses,
        }
    }

    pub fn or(clauses: Vec<FilterClause>) -> Self {
        FilterClause::Composite {
            conjunction: Conjunction::Or,
            clauses,
        }
    }

    pub fn not(clause: FilterClause) -> Self {
        FilterClause::Composite {
            conjunction: Conjunction::Not,
            clauses: vec![clause],
        }
    }

    /// Combines two optional clauses with `and`.
    pub fn merge(left: Option<FilterClause>, right: Option<FilterClause>) -> Option<FilterClause> {
        match (left, right) {
            (Some(l), Some(r)) => Some(FilterClause::and(vec![l, r])),
            (l, r) => l.or(r),
        }
    }

    /// Field names referenced anywhere in the tree.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            FilterClause::Leaf { field, .. } => out.push(field),
            FilterClause::Composite { clauses, .. } => {
                for clause in clauses {
                    clause.collect_fields(out);
                }
            }
        }
    }
}

impl fmt::Display for FilterClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterClause::Leaf {
                field,
                operator,
                value,
            } => write!(f, "{}[{}]:{}", field, operator, value),
            FilterClause::Composite {
                conjunction,
                clauses,
            } => {
                write!(f, "{}(", conjunction)?;
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", clause)?;
                }
                f.write_str(")")
            }
        }
    }
}
