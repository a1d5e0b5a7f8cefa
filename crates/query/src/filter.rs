//! Compiled filter representation and its JSON rendering.

use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::config::DEFAULT_OPERATOR_PREFIX;

/// Largest integer an `f64` represents exactly (2^53).
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Canonical comparison tags, independent of their surface syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOp {
    Gte,
    Lte,
    Gt,
    Lt,
    Ne,
}

impl ComparisonOp {
    pub const fn tag(self) -> &'static str {
        match self {
            ComparisonOp::Gte => "gte",
            ComparisonOp::Lte => "lte",
            ComparisonOp::Gt => "gt",
            ComparisonOp::Lt => "lt",
            ComparisonOp::Ne => "ne",
        }
    }
}

/// A typed value produced by type inference.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl ScalarValue {
    pub fn to_json(&self) -> Value {
        match self {
            ScalarValue::Number(n) => number_to_json(*n),
            ScalarValue::Bool(b) => Value::Bool(*b),
            ScalarValue::Text(s) => Value::String(s.clone()),
        }
    }
}

/// Whole numbers render as JSON integers so `50` stays `50`, not `50.0`.
fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= MAX_EXACT_INTEGER {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

/// Comparison operators applied to one field, in first-insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComparisonSet {
    ops: IndexMap<ComparisonOp, ScalarValue>,
}

impl ComparisonSet {
    pub fn single(op: ComparisonOp, value: ScalarValue) -> Self {
        let mut set = Self::default();
        set.insert(op, value);
        set
    }

    /// Add or overwrite an operator. An overwritten key keeps its position.
    pub fn insert(&mut self, op: ComparisonOp, value: ScalarValue) {
        self.ops.insert(op, value);
    }

    pub fn get(&self, op: ComparisonOp) -> Option<&ScalarValue> {
        self.ops.get(&op)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ComparisonOp, &ScalarValue)> {
        self.ops.iter().map(|(op, value)| (*op, value))
    }
}

/// What a single field is constrained to.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    /// Bare equality, rendered as the value itself.
    Literal(ScalarValue),
    /// One or more comparison operators, rendered as an operator object.
    Comparisons(ComparisonSet),
}

/// The structured result of compiling a search string.
///
/// Fields keep the order in which they first appeared in the input. An empty
/// expression matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterExpression {
    fields: IndexMap<String, FieldFilter>,
}

impl FilterExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, field: &str) -> Option<&FieldFilter> {
        self.fields.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldFilter)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Bind `field` to a literal, replacing whatever it held before.
    pub fn set_literal(&mut self, field: &str, value: ScalarValue) {
        self.fields
            .insert(field.to_string(), FieldFilter::Literal(value));
    }

    /// Merge a comparison into `field`. A field holding a literal is
    /// replaced by a fresh comparison set.
    pub fn merge_comparison(&mut self, field: &str, op: ComparisonOp, value: ScalarValue) {
        match self.fields.entry(field.to_string()) {
            Entry::Occupied(mut entry) => {
                if let FieldFilter::Comparisons(set) = entry.get_mut() {
                    set.insert(op, value);
                } else {
                    entry.insert(FieldFilter::Comparisons(ComparisonSet::single(op, value)));
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(FieldFilter::Comparisons(ComparisonSet::single(op, value)));
            }
        }
    }

    /// Render as a filter document, prefixing operator tags with `prefix`.
    pub fn to_document(&self, prefix: &str) -> Value {
        let mut doc = Map::with_capacity(self.fields.len());
        for (field, filter) in &self.fields {
            let value = match filter {
                FieldFilter::Literal(value) => value.to_json(),
                FieldFilter::Comparisons(set) => {
                    let mut ops = Map::with_capacity(set.len());
                    for (op, value) in set.iter() {
                        ops.insert(format!("{prefix}{}", op.tag()), value.to_json());
                    }
                    Value::Object(ops)
                }
            };
            doc.insert(field.clone(), value);
        }
        Value::Object(doc)
    }

    /// Compact JSON rendering (no whitespace).
    pub fn to_json_string(&self, prefix: &str) -> String {
        self.to_document(prefix).to_string()
    }
}

impl std::fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_json_string(DEFAULT_OPERATOR_PREFIX))
    }
}

impl Serialize for FilterExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_document(DEFAULT_OPERATOR_PREFIX)
            .serialize(serializer)
    }
}
