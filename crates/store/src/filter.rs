//! Filter documents evaluated against stored JSON documents.
//!
//! The accepted language is the subset of the Mongo query syntax the gateway
//! emits and its clients send:
//!
//! ```text
//! {"status": "A", "weight": {"$gte": 50, "$lt": 90}}
//! {"$or": [{"tags": "red"}, {"qty": {"$in": [1, 2]}}]}
//! {"name": {"$regex": "^jo", "$options": "i"}, "address.city": "Oslo"}
//! ```
//!
//! Fields are ANDed. A field whose value is an object made only of `$`
//! keys is an operator object; any other value is matched by equality.

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::StoreError;

/// Maximum nesting of `$and`/`$or`/`$nor`/`$not`.
const MAX_FILTER_DEPTH: usize = 32;

/// A parsed filter document.
#[derive(Debug, Clone)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Field { path: String, predicate: Predicate },
}

/// Condition on the value found at one field path.
#[derive(Debug, Clone)]
pub enum Predicate {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(Regex),
    Not(Box<Predicate>),
    All(Vec<Predicate>),
}

impl Default for Filter {
    fn default() -> Self {
        Filter::all()
    }
}

impl Filter {
    /// The empty filter, matching every document.
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, Filter::And(clauses) if clauses.is_empty())
    }

    /// Parse a filter document. Anything but a JSON object is rejected.
    pub fn parse(filter: &Value) -> Result<Self, StoreError> {
        parse_document(filter, 0)
    }

    /// Parse filter text; empty or whitespace-only text matches everything.
    pub fn parse_str(text: &str) -> Result<Self, StoreError> {
        if text.trim().is_empty() {
            return Ok(Filter::all());
        }
        let value: Value = serde_json::from_str(text)
            .map_err(|e| StoreError::InvalidFilter(format!("filter is not valid JSON: {e}")))?;
        Self::parse(&value)
    }

    pub fn matches(&self, doc: &Map<String, Value>) -> bool {
        match self {
            Filter::And(clauses) => clauses.iter().all(|c| c.matches(doc)),
            Filter::Or(clauses) => clauses.iter().any(|c| c.matches(doc)),
            Filter::Nor(clauses) => !clauses.iter().any(|c| c.matches(doc)),
            Filter::Field { path, predicate } => predicate.matches(resolve_path(doc, path)),
        }
    }
}

impl Predicate {
    /// `target` is `None` when the path does not exist in the document.
    pub fn matches(&self, target: Option<&Value>) -> bool {
        match self {
            Predicate::Eq(expected) => equals_or_contains(target, expected),
            Predicate::Ne(expected) => !equals_or_contains(target, expected),
            Predicate::Gt(bound) => any_ordered(target, bound, |o| o == Ordering::Greater),
            Predicate::Gte(bound) => any_ordered(target, bound, |o| o != Ordering::Less),
            Predicate::Lt(bound) => any_ordered(target, bound, |o| o == Ordering::Less),
            Predicate::Lte(bound) => any_ordered(target, bound, |o| o != Ordering::Greater),
            Predicate::In(options) => options.iter().any(|o| equals_or_contains(target, o)),
            Predicate::Nin(options) => !options.iter().any(|o| equals_or_contains(target, o)),
            Predicate::Exists(expected) => target.is_some() == *expected,
            Predicate::Regex(re) => candidates(target).any(|v| match v {
                Value::String(s) => re.is_match(s),
                _ => false,
            }),
            Predicate::Not(inner) => !inner.matches(target),
            Predicate::All(preds) => preds.iter().all(|p| p.matches(target)),
        }
    }
}

fn parse_document(filter: &Value, depth: usize) -> Result<Filter, StoreError> {
    if depth > MAX_FILTER_DEPTH {
        return Err(StoreError::InvalidFilter(format!(
            "filter nesting exceeds maximum of {MAX_FILTER_DEPTH}"
        )));
    }
    let Value::Object(map) = filter else {
        return Err(StoreError::InvalidFilter(format!(
            "filter must be a JSON object, got {}",
            kind_name(filter)
        )));
    };

    let mut clauses = Vec::with_capacity(map.len());
    for (key, value) in map {
        let clause = match key.as_str() {
            "$and" => Filter::And(parse_clause_list(key, value, depth)?),
            "$or" => Filter::Or(parse_clause_list(key, value, depth)?),
            "$nor" => Filter::Nor(parse_clause_list(key, value, depth)?),
            op if op.starts_with('$') => {
                return Err(StoreError::InvalidFilter(format!(
                    "unknown top-level operator '{op}'"
                )));
            }
            path => Filter::Field {
                path: path.to_string(),
                predicate: parse_field_value(path, value, depth)?,
            },
        };
        clauses.push(clause);
    }

    // A single clause does not need the wrapper.
    if clauses.len() == 1 {
        if let Some(only) = clauses.pop() {
            return Ok(only);
        }
    }
    Ok(Filter::And(clauses))
}

fn parse_clause_list(op: &str, value: &Value, depth: usize) -> Result<Vec<Filter>, StoreError> {
    match value {
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| parse_document(item, depth + 1))
            .collect(),
        _ => Err(StoreError::InvalidFilter(format!(
            "'{op}' expects a non-empty array of filter documents"
        ))),
    }
}

fn is_operator_object(map: &Map<String, Value>) -> Result<bool, StoreError> {
    let operators = map.keys().filter(|k| k.starts_with('$')).count();
    if operators == 0 {
        return Ok(false);
    }
    if operators != map.len() {
        return Err(StoreError::InvalidFilter(
            "cannot mix operators and plain fields in one field condition".to_string(),
        ));
    }
    Ok(true)
}

fn parse_field_value(path: &str, value: &Value, depth: usize) -> Result<Predicate, StoreError> {
    match value {
        Value::Object(map) if is_operator_object(map)? => parse_operators(path, map, depth),
        other => Ok(Predicate::Eq(other.clone())),
    }
}

fn parse_operators(
    path: &str,
    ops: &Map<String, Value>,
    depth: usize,
) -> Result<Predicate, StoreError> {
    if depth > MAX_FILTER_DEPTH {
        return Err(StoreError::InvalidFilter(format!(
            "filter nesting exceeds maximum of {MAX_FILTER_DEPTH}"
        )));
    }
    let options = match ops.get("$options") {
        None => None,
        Some(Value::String(opts)) => Some(opts.as_str()),
        Some(_) => {
            return Err(StoreError::InvalidFilter(format!(
                "'$options' on '{path}' must be a string"
            )));
        }
    };
    if options.is_some() && !ops.contains_key("$regex") {
        return Err(StoreError::InvalidFilter(format!(
            "'$options' on '{path}' requires '$regex'"
        )));
    }

    let mut preds = Vec::with_capacity(ops.len());
    for (op, operand) in ops {
        let pred = match op.as_str() {
            "$eq" => Predicate::Eq(operand.clone()),
            "$ne" => Predicate::Ne(operand.clone()),
            "$gt" => Predicate::Gt(operand.clone()),
            "$gte" => Predicate::Gte(operand.clone()),
            "$lt" => Predicate::Lt(operand.clone()),
            "$lte" => Predicate::Lte(operand.clone()),
            "$in" => Predicate::In(operand_list(path, op, operand)?),
            "$nin" => Predicate::Nin(operand_list(path, op, operand)?),
            "$exists" => Predicate::Exists(truthy(operand)),
            "$regex" => Predicate::Regex(build_regex(path, operand, options)?),
            "$options" => continue,
            "$not" => match operand {
                Value::Object(inner) if is_operator_object(inner)? => {
                    Predicate::Not(Box::new(parse_operators(path, inner, depth + 1)?))
                }
                _ => {
                    return Err(StoreError::InvalidFilter(format!(
                        "'$not' on '{path}' expects an operator object"
                    )));
                }
            },
            other => {
                return Err(StoreError::InvalidFilter(format!(
                    "unknown operator '{other}' on field '{path}'"
                )));
            }
        };
        preds.push(pred);
    }

    if preds.len() == 1 {
        if let Some(only) = preds.pop() {
            return Ok(only);
        }
    }
    Ok(Predicate::All(preds))
}

fn operand_list(path: &str, op: &str, operand: &Value) -> Result<Vec<Value>, StoreError> {
    match operand {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(StoreError::InvalidFilter(format!(
            "'{op}' on '{path}' expects an array"
        ))),
    }
}

fn build_regex(path: &str, pattern: &Value, options: Option<&str>) -> Result<Regex, StoreError> {
    let Value::String(pattern) = pattern else {
        return Err(StoreError::InvalidFilter(format!(
            "'$regex' on '{path}' must be a string"
        )));
    };
    let mut builder = RegexBuilder::new(pattern);
    for flag in options.unwrap_or_default().chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(StoreError::InvalidFilter(format!(
                    "unsupported regex option '{other}' on '{path}'"
                )));
            }
        };
    }
    builder
        .build()
        .map_err(|e| StoreError::InvalidFilter(format!("bad regex on '{path}': {e}")))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Null => false,
        _ => true,
    }
}

/// Resolve a dot-separated path. Numeric segments index into arrays.
///
/// Returns `None` if any segment is missing.
pub fn resolve_path<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// The value itself followed by its elements when it is an array.
fn candidates(target: Option<&Value>) -> impl Iterator<Item = &Value> {
    let elements = match target {
        Some(Value::Array(items)) => items.as_slice(),
        _ => &[],
    };
    target.into_iter().chain(elements.iter())
}

fn equals_or_contains(target: Option<&Value>, expected: &Value) -> bool {
    match target {
        // A missing field equals null.
        None => expected.is_null(),
        Some(_) => candidates(target).any(|v| values_equal(v, expected)),
    }
}

fn any_ordered(target: Option<&Value>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    candidates(target).any(|v| compare_same_kind(v, bound).is_some_and(&accept))
}

/// Structural equality where numbers compare by value (`1 == 1.0`).
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(fa), Some(fb)) => fa == fb,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => left == right,
    }
}

/// Compare two JSON values, returning an ordering only when both have the
/// same scalar kind.
///
/// - Numbers: compared as f64
/// - Strings: compared lexicographically
/// - Booleans: false < true
/// - Mismatched or non-scalar kinds: `None`
pub fn compare_same_kind(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

pub(crate) fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_doc() -> Map<String, Value> {
        match json!({
            "_id": "user123",
            "name": "Alice",
            "age": 30,
            "active": true,
            "score": 95.5,
            "address": {"city": "Portland", "zip": "97201"},
            "tags": ["admin", "user"],
            "scores": [3, 8, 12],
            "metadata": null
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn check(filter: Value) -> bool {
        Filter::parse(&filter).unwrap().matches(&sample_doc())
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = Filter::parse(&json!({})).unwrap();
        assert!(filter.is_match_all());
        assert!(filter.matches(&sample_doc()));
        assert!(Filter::parse_str("  ").unwrap().is_match_all());
    }

    #[test]
    fn implicit_and_of_equalities() {
        assert!(check(json!({"name": "Alice", "age": 30})));
        assert!(!check(json!({"name": "Alice", "age": 31})));
    }

    #[test]
    fn numbers_compare_by_value() {
        assert!(check(json!({"age": 30.0})));
        assert!(check(json!({"score": {"$gt": 95}})));
    }

    #[test]
    fn comparison_operators() {
        assert!(check(json!({"age": {"$gte": 30, "$lte": 30}})));
        assert!(check(json!({"age": {"$gt": 18, "$lt": 65}})));
        assert!(!check(json!({"age": {"$gt": 30}})));
        assert!(check(json!({"name": {"$lt": "Bob"}})));
    }

    #[test]
    fn ordering_across_kinds_never_matches() {
        assert!(!check(json!({"age": {"$gt": "10"}})));
        assert!(!check(json!({"name": {"$gte": 0}})));
    }

    #[test]
    fn ne_and_missing_fields() {
        assert!(check(json!({"name": {"$ne": "Bob"}})));
        assert!(check(json!({"missing": {"$ne": 1}})));
        assert!(check(json!({"missing": null})));
        assert!(check(json!({"metadata": null})));
        assert!(!check(json!({"name": null})));
    }

    #[test]
    fn array_fields_match_any_element() {
        assert!(check(json!({"tags": "admin"})));
        assert!(check(json!({"tags": ["admin", "user"]})));
        assert!(check(json!({"scores": {"$gt": 10}})));
        assert!(!check(json!({"scores": {"$gt": 12}})));
        assert!(!check(json!({"tags": {"$ne": "user"}})));
    }

    #[test]
    fn in_and_nin() {
        assert!(check(json!({"age": {"$in": [1, 30]}})));
        assert!(check(json!({"tags": {"$in": ["guest", "user"]}})));
        assert!(check(json!({"age": {"$nin": [1, 2]}})));
        assert!(!check(json!({"age": {"$nin": [30]}})));
    }

    #[test]
    fn exists_distinguishes_null_from_missing() {
        assert!(check(json!({"metadata": {"$exists": true}})));
        assert!(check(json!({"missing": {"$exists": false}})));
        assert!(!check(json!({"missing": {"$exists": 1}})));
    }

    #[test]
    fn regex_with_options() {
        assert!(check(json!({"name": {"$regex": "^al", "$options": "i"}})));
        assert!(!check(json!({"name": {"$regex": "^al"}})));
        assert!(check(json!({"tags": {"$regex": "^adm"}})));
    }

    #[test]
    fn not_negates_operator_object() {
        assert!(check(json!({"age": {"$not": {"$gt": 40}}})));
        assert!(!check(json!({"age": {"$not": {"$gt": 20}}})));
    }

    #[test]
    fn logical_operators() {
        assert!(check(json!({"$or": [{"name": "Bob"}, {"age": 30}]})));
        assert!(!check(json!({"$and": [{"name": "Alice"}, {"age": 1}]})));
        assert!(check(json!({"$nor": [{"name": "Bob"}, {"age": 1}]})));
    }

    #[test]
    fn dotted_paths_reach_nested_values() {
        assert!(check(json!({"address.city": "Portland"})));
        assert!(check(json!({"tags.1": "user"})));
        assert!(!check(json!({"address.country": {"$exists": true}})));
    }

    #[test]
    fn invalid_filters_are_rejected() {
        for bad in [
            json!([1, 2]),
            json!({"$where": "1"}),
            json!({"age": {"$between": [1, 2]}}),
            json!({"age": {"$in": 3}}),
            json!({"$or": []}),
            json!({"age": {"$gt": 1, "plain": 2}}),
            json!({"name": {"$regex": "("}}),
            json!({"name": {"$options": "i"}}),
            json!({"name": {"$not": 3}}),
        ] {
            let err = Filter::parse(&bad).unwrap_err();
            assert!(matches!(err, StoreError::InvalidFilter(_)), "{bad}");
        }
    }

    #[test]
    fn parse_str_rejects_bad_json() {
        assert!(matches!(
            Filter::parse_str("{status:"),
            Err(StoreError::InvalidFilter(_))
        ));
    }

    #[test]
    fn excessive_nesting_is_rejected() {
        let mut filter = json!({"a": 1});
        for _ in 0..40 {
            filter = json!({"$and": [filter]});
        }
        assert!(Filter::parse(&filter).is_err());
    }
}
