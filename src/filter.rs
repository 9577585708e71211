//! Structured read filters.
//!
//! A [`Filter`] is an ordered list of field conditions that serialises to the
//! condition map the source service understands:
//!
//! ```text
//! Filter::new()
//!     .field_in("bk_biz_id", [1, 2])        ─┐
//!     .field_ne("default", 1)                ├──▶ {"bk_biz_id": {"$in": [1, 2]},
//!                                            │     "default":   {"$ne": 1}}
//! ```
//!
//! Conditions on the same field merge into one operator object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single comparison on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    In { field: String, values: Vec<Value> },
    NotIn { field: String, values: Vec<Value> },
    Ne { field: String, value: Value },
}

impl Condition {
    pub fn field(&self) -> &str {
        match self {
            Condition::In { field, .. }
            | Condition::NotIn { field, .. }
            | Condition::Ne { field, .. } => field,
        }
    }

    fn operator(&self) -> (&'static str, Value) {
        match self {
            Condition::In { values, .. } => ("$in", Value::Array(values.clone())),
            Condition::NotIn { values, .. } => ("$nin", Value::Array(values.clone())),
            Condition::Ne { value, .. } => ("$ne", value.clone()),
        }
    }
}

/// An ordered conjunction of conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_in<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition::In {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn field_not_in<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition::NotIn {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn field_ne(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Ne {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Render as the remote condition map.
    pub fn to_condition_map(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for condition in &self.conditions {
            let (op, value) = condition.operator();
            let entry = out
                .entry(condition.field().to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(ops) = entry {
                ops.insert(op.to_string(), value);
            }
        }
        out
    }
}
