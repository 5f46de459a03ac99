//! Ordering descriptors

use crate::error::ParseEnumError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Sort direction with explicit null placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderByDirection {
    #[default]
    AscNullsFirst,
    AscNullsLast,
    DescNullsFirst,
    DescNullsLast,
}

impl OrderByDirection {
    pub const ALL: [OrderByDirection; 4] = [
        OrderByDirection::AscNullsFirst,
        OrderByDirection::AscNullsLast,
        OrderByDirection::DescNullsFirst,
        OrderByDirection::DescNullsLast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderByDirection::AscNullsFirst => "AscNullsFirst",
            OrderByDirection::AscNullsLast => "AscNullsLast",
            OrderByDirection::DescNullsFirst => "DescNullsFirst",
            OrderByDirection::DescNullsLast => "DescNullsLast",
        }
    }

    pub fn is_ascending(&self) -> bool {
        matches!(
            self,
            OrderByDirection::AscNullsFirst | OrderByDirection::AscNullsLast
        )
    }

    pub fn nulls_first(&self) -> bool {
        matches!(
            self,
            OrderByDirection::AscNullsFirst | OrderByDirection::DescNullsFirst
        )
    }

    /// The direction producing the exact reverse sequence.
    pub fn reverse(&self) -> Self {
        match self {
            OrderByDirection::AscNullsFirst => OrderByDirection::DescNullsLast,
            OrderByDirection::AscNullsLast => OrderByDirection::DescNullsFirst,
            OrderByDirection::DescNullsFirst => OrderByDirection::AscNullsLast,
            OrderByDirection::DescNullsLast => OrderByDirection::AscNullsFirst,
        }
    }
}

impl fmt::Display for OrderByDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderByDirection {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("order direction", s))
    }
}

/// Value of an [`OrderBy`] entry: a direction, or ordering on a related
/// object's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderByNode {
    Direction(OrderByDirection),
    Nested(OrderBy),
}

impl Serialize for OrderByNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            OrderByNode::Direction(direction) => direction.serialize(serializer),
            OrderByNode::Nested(nested) => nested.serialize(serializer),
        }
    }
}

/// One flattened ordering term: a field path and its direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub path: Vec<String>,
    pub direction: OrderByDirection,
}

/// Insertion-ordered field → ordering mapping.
///
/// Inserting an existing key replaces its value in place, so the key keeps
/// its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBy {
    entries: Vec<(String, OrderByNode)>,
}

impl OrderBy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, direction: OrderByDirection) -> Self {
        let mut order_by = Self::new();
        order_by.insert(field, OrderByNode::Direction(direction));
        order_by
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn insert(&mut self, field: impl Into<String>, node: OrderByNode) {
        let field = field.into();
        match self.entries.iter_mut().find(|(key, _)| *key == field) {
            Some(entry) => entry.1 = node,
            None => self.entries.push((field, node)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&OrderByNode> {
        self.entries
            .iter()
            .find(|(key, _)| key == field)
            .map(|(_, node)| node)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OrderByNode)> {
        self.entries.iter().map(|(key, node)| (key.as_str(), node))
    }

    /// Shallow merge, entries of `other` win.
    pub fn merge(&mut self, other: OrderBy) {
        for (key, node) in other.entries {
            self.insert(key, node);
        }
    }

    /// Flattens nested entries into path terms, depth first, in order.
    pub fn terms(&self) -> Vec<OrderTerm> {
        let mut out = Vec::new();
        self.collect_terms(&mut Vec::new(), &mut out);
        out
    }

    fn collect_terms(&self, prefix: &mut Vec<String>, out: &mut Vec<OrderTerm>) {
        for (key, node) in &self.entries {
            prefix.push(key.clone());
            match node {
                OrderByNode::Direction(direction) => out.push(OrderTerm {
                    path: prefix.clone(),
                    direction: *direction,
                }),
                OrderByNode::Nested(nested) => nested.collect_terms(prefix, out),
            }
            prefix.pop();
        }
    }
}

impl Serialize for OrderBy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, node) in &self.entries {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }
}
