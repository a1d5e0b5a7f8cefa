//! Aggregation pipelines.
//!
//! A pipeline is a JSON array of single-key stage documents run in order
//! over the documents of one collection:
//!
//! ```text
//! [{"$match": {"status": "A"}},
//!  {"$group": {"_id": "$cust_id", "total": {"$sum": "$amount"}}},
//!  {"$sort": {"total": -1}},
//!  {"$limit": 5}]
//! ```

use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::filter::{kind_name, resolve_path, values_equal, Filter};
use crate::order::{sort_documents, total_cmp, SortDirection, SortSpec};
use crate::StoreError;

type Document = Map<String, Value>;

#[derive(Debug, Clone)]
pub enum Stage {
    Match(Filter),
    Sort(Vec<SortSpec>),
    Skip(usize),
    Limit(usize),
    Project(Projection),
    Count(String),
    Group(Group),
}

#[derive(Debug, Clone)]
pub struct Projection {
    fields: Vec<String>,
    include: bool,
    keep_id: bool,
}

#[derive(Debug, Clone)]
pub struct Group {
    key: Expression,
    accumulators: Vec<(String, Accumulator, Expression)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulator {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
}

/// Either a `"$field"` reference or a constant.
#[derive(Debug, Clone)]
enum Expression {
    Field(String),
    Constant(Value),
}

impl Expression {
    fn parse(value: &Value) -> Self {
        match value {
            Value::String(s) if s.len() > 1 && s.starts_with('$') => {
                Expression::Field(s[1..].to_string())
            }
            other => Expression::Constant(other.clone()),
        }
    }

    fn eval<'a>(&'a self, doc: &'a Document) -> Option<&'a Value> {
        match self {
            Expression::Field(path) => resolve_path(doc, path),
            Expression::Constant(value) => Some(value),
        }
    }
}

/// A parsed aggregation pipeline.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn parse(pipeline: &Value) -> Result<Self, StoreError> {
        let Value::Array(raw) = pipeline else {
            return Err(invalid(format!(
                "pipeline must be an array of stages, got {}",
                kind_name(pipeline)
            )));
        };
        let stages = raw
            .iter()
            .enumerate()
            .map(|(i, stage)| parse_stage(stage).map_err(|e| invalid(format!("stage {i}: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { stages })
    }

    /// Parse pipeline text; empty text is the empty pipeline.
    pub fn parse_str(text: &str) -> Result<Self, StoreError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(text)
            .map_err(|e| invalid(format!("pipeline is not valid JSON: {e}")))?;
        Self::parse(&value)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn run(&self, mut docs: Vec<Document>) -> Vec<Document> {
        for stage in &self.stages {
            docs = match stage {
                Stage::Match(filter) => docs.into_iter().filter(|d| filter.matches(d)).collect(),
                Stage::Sort(keys) => {
                    sort_documents(&mut docs, keys);
                    docs
                }
                Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
                Stage::Limit(n) => docs.into_iter().take(*n).collect(),
                Stage::Project(projection) => docs.iter().map(|d| projection.apply(d)).collect(),
                Stage::Count(field) => {
                    if docs.is_empty() {
                        Vec::new()
                    } else {
                        let mut out = Document::new();
                        out.insert(field.clone(), Value::from(docs.len() as u64));
                        vec![out]
                    }
                }
                Stage::Group(group) => group.apply(&docs),
            };
        }
        docs
    }
}

fn invalid(message: String) -> StoreError {
    StoreError::InvalidPipeline(message)
}

fn parse_stage(stage: &Value) -> Result<Stage, String> {
    let Some((name, spec)) = stage.as_object().filter(|m| m.len() == 1).and_then(|m| m.iter().next())
    else {
        return Err("each stage must be an object with exactly one key".to_string());
    };
    match name.as_str() {
        "$match" => Filter::parse(spec)
            .map(Stage::Match)
            .map_err(|e| e.to_string()),
        "$sort" => parse_sort(spec).map(Stage::Sort),
        "$skip" => non_negative(name, spec).map(Stage::Skip),
        "$limit" => match non_negative(name, spec)? {
            0 => Err("'$limit' must be positive".to_string()),
            n => Ok(Stage::Limit(n)),
        },
        "$project" => parse_projection(spec).map(Stage::Project),
        "$count" => match spec {
            Value::String(field) if !field.is_empty() && !field.starts_with('$') && !field.contains('.') => {
                Ok(Stage::Count(field.clone()))
            }
            _ => Err("'$count' expects a non-empty field name".to_string()),
        },
        "$group" => parse_group(spec).map(Stage::Group),
        other => Err(format!("unknown stage '{other}'")),
    }
}

fn non_negative(name: &str, spec: &Value) -> Result<usize, String> {
    spec.as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| format!("'{name}' expects a non-negative integer"))
}

fn parse_sort(spec: &Value) -> Result<Vec<SortSpec>, String> {
    let keys = spec
        .as_object()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| "'$sort' expects a non-empty object".to_string())?;
    keys.iter()
        .map(|(field, dir)| {
            SortDirection::from_number(dir)
                .map(|d| SortSpec::new(field.clone(), d))
                .ok_or_else(|| format!("sort direction for '{field}' must be 1 or -1"))
        })
        .collect()
}

fn projection_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

fn parse_projection(spec: &Value) -> Result<Projection, String> {
    let fields = spec
        .as_object()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| "'$project' expects a non-empty object".to_string())?;

    let mut keep_id = true;
    let mut include = None;
    let mut names = Vec::new();
    for (field, flag) in fields {
        let flag =
            projection_flag(flag).ok_or_else(|| format!("projection of '{field}' must be 0 or 1"))?;
        if field == "_id" {
            keep_id = flag;
            continue;
        }
        match include {
            Some(mode) if mode != flag => {
                return Err("cannot mix inclusion and exclusion in '$project'".to_string());
            }
            _ => include = Some(flag),
        }
        names.push(field.clone());
    }
    Ok(Projection {
        fields: names,
        // Only `_id` was given: `{_id: 0}` excludes it, `{_id: 1}` keeps only it.
        include: include.unwrap_or(keep_id),
        keep_id,
    })
}

impl Projection {
    fn apply(&self, doc: &Document) -> Document {
        if self.include {
            let mut out = Document::new();
            if self.keep_id {
                if let Some(id) = doc.get("_id") {
                    out.insert("_id".to_string(), id.clone());
                }
            }
            for field in &self.fields {
                if let Some(value) = resolve_path(doc, field) {
                    set_path(&mut out, field, value.clone());
                }
            }
            out
        } else {
            let mut out = doc.clone();
            if !self.keep_id {
                out.remove("_id");
            }
            for field in &self.fields {
                remove_path(&mut out, field);
            }
            out
        }
    }
}

fn set_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if let Value::Object(map) = child {
                set_path(map, rest, value);
            }
        }
    }
}

fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(map)) = doc.get_mut(head) {
                remove_path(map, rest);
            }
        }
    }
}

fn parse_group(spec: &Value) -> Result<Group, String> {
    let fields = spec
        .as_object()
        .ok_or_else(|| "'$group' expects an object".to_string())?;
    let key = fields
        .get("_id")
        .map(Expression::parse)
        .ok_or_else(|| "'$group' requires an '_id' expression".to_string())?;

    let mut accumulators = Vec::new();
    for (name, acc) in fields.iter().filter(|(name, _)| name.as_str() != "_id") {
        let Some((op, operand)) = acc.as_object().filter(|m| m.len() == 1).and_then(|m| m.iter().next())
        else {
            return Err(format!("accumulator '{name}' must be an object with one operator"));
        };
        let accumulator = match op.as_str() {
            "$sum" => Accumulator::Sum,
            "$avg" => Accumulator::Avg,
            "$min" => Accumulator::Min,
            "$max" => Accumulator::Max,
            "$first" => Accumulator::First,
            "$last" => Accumulator::Last,
            "$push" => Accumulator::Push,
            other => return Err(format!("unknown accumulator '{other}' for '{name}'")),
        };
        accumulators.push((name.clone(), accumulator, Expression::parse(operand)));
    }
    Ok(Group { key, accumulators })
}

impl Group {
    fn apply(&self, docs: &[Document]) -> Vec<Document> {
        // Groups keep the order in which their key first appeared.
        let mut groups: Vec<(Value, Vec<&Document>)> = Vec::new();
        for doc in docs {
            let key = self.key.eval(doc).cloned().unwrap_or(Value::Null);
            match groups.iter_mut().find(|(k, _)| values_equal(k, &key)) {
                Some((_, members)) => members.push(doc),
                None => groups.push((key, vec![doc])),
            }
        }

        groups
            .into_iter()
            .map(|(key, members)| {
                let mut out = Document::new();
                out.insert("_id".to_string(), key);
                for (name, accumulator, expr) in &self.accumulators {
                    out.insert(name.clone(), accumulate(*accumulator, expr, &members));
                }
                out
            })
            .collect()
    }
}

fn accumulate(accumulator: Accumulator, expr: &Expression, members: &[&Document]) -> Value {
    let mut values = members.iter().map(|doc| expr.eval(doc));
    match accumulator {
        Accumulator::Sum => number(values.filter_map(|v| v.and_then(Value::as_f64)).sum()),
        Accumulator::Avg => {
            let nums: Vec<f64> = values.filter_map(|v| v.and_then(Value::as_f64)).collect();
            if nums.is_empty() {
                Value::Null
            } else {
                number(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        Accumulator::Min => extreme(values, Ordering::Less),
        Accumulator::Max => extreme(values, Ordering::Greater),
        Accumulator::First => values.next().flatten().cloned().unwrap_or(Value::Null),
        Accumulator::Last => values.last().flatten().cloned().unwrap_or(Value::Null),
        Accumulator::Push => Value::Array(values.flatten().cloned().collect()),
    }
}

fn extreme<'a>(values: impl Iterator<Item = Option<&'a Value>>, wanted: Ordering) -> Value {
    values
        .flatten()
        .filter(|v| !v.is_null())
        .fold(None::<&Value>, |best, v| match best {
            Some(b) if total_cmp(Some(v), Some(b)) != wanted => Some(b),
            _ => Some(v),
        })
        .cloned()
        .unwrap_or(Value::Null)
}

/// Whole values within the exactly representable range render as integers.
fn number(f: f64) -> Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if f.fract() == 0.0 && f.abs() <= MAX_EXACT {
        Value::from(f as i64)
    } else {
        serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn orders() -> Vec<Document> {
        json!([
            {"_id": "1", "cust": "a", "amount": 10, "status": "A", "item": {"sku": "x"}},
            {"_id": "2", "cust": "b", "amount": 5.5, "status": "A", "item": {"sku": "y"}},
            {"_id": "3", "cust": "a", "amount": 20, "status": "B", "item": {"sku": "z"}},
            {"_id": "4", "cust": "c", "status": "A"},
        ])
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect()
    }

    fn run(pipeline: Value) -> Value {
        let out = Pipeline::parse(&pipeline).unwrap().run(orders());
        Value::Array(out.into_iter().map(Value::Object).collect())
    }

    #[test]
    fn empty_pipeline_returns_input() {
        assert_eq!(run(json!([])).as_array().unwrap().len(), 4);
        assert!(Pipeline::parse_str("").unwrap().stages().is_empty());
    }

    #[test]
    fn match_sort_skip_limit() {
        let out = run(json!([
            {"$match": {"status": "A"}},
            {"$sort": {"_id": -1}},
            {"$skip": 1},
            {"$limit": 1}
        ]));
        assert_eq!(out[0]["_id"], "2");
        assert_eq!(out.as_array().unwrap().len(), 1);
    }

    #[test]
    fn group_with_accumulators() {
        let out = run(json!([
            {"$group": {
                "_id": "$cust",
                "total": {"$sum": "$amount"},
                "n": {"$sum": 1},
                "avg": {"$avg": "$amount"},
                "low": {"$min": "$amount"},
                "high": {"$max": "$amount"},
                "first": {"$first": "$_id"},
                "last": {"$last": "$_id"},
                "ids": {"$push": "$_id"}
            }}
        ]));
        assert_eq!(
            out[0],
            json!({"_id": "a", "total": 30, "n": 2, "avg": 15, "low": 10, "high": 20,
                   "first": "1", "last": "3", "ids": ["1", "3"]})
        );
        assert_eq!(out[1]["total"], json!(5.5));
        assert_eq!(out[2], json!({"_id": "c", "total": 0, "n": 1, "avg": null,
                                  "low": null, "high": null, "first": "4", "last": "4",
                                  "ids": ["4"]}));
    }

    #[test]
    fn group_by_null_collapses_everything() {
        let out = run(json!([{"$group": {"_id": null, "count": {"$sum": 1}}}]));
        assert_eq!(out, json!([{"_id": null, "count": 4}]));
    }

    #[test]
    fn count_stage() {
        assert_eq!(
            run(json!([{"$match": {"status": "A"}}, {"$count": "n"}])),
            json!([{"n": 3}])
        );
        assert_eq!(
            run(json!([{"$match": {"status": "Z"}}, {"$count": "n"}])),
            json!([])
        );
    }

    #[test]
    fn project_inclusion_and_exclusion() {
        let out = run(json!([{"$limit": 1}, {"$project": {"cust": 1, "item.sku": 1}}]));
        assert_eq!(out, json!([{"_id": "1", "cust": "a", "item": {"sku": "x"}}]));

        let out = run(json!([{"$limit": 1}, {"$project": {"_id": 0, "item": 0, "status": 0}}]));
        assert_eq!(out, json!([{"cust": "a", "amount": 10}]));

        let out = run(json!([{"$limit": 1}, {"$project": {"_id": 1}}]));
        assert_eq!(out, json!([{"_id": "1"}]));
    }

    #[test]
    fn invalid_pipelines_are_rejected() {
        for bad in [
            json!({"$match": {}}),
            json!([{"$unwind": "$tags"}]),
            json!([{"$match": {}, "$limit": 1}]),
            json!([{"$limit": -1}]),
            json!([{"$limit": 0}]),
            json!([{"$sort": {"a": 2}}]),
            json!([{"$project": {"a": 1, "b": 0}}]),
            json!([{"$group": {"total": {"$sum": 1}}}]),
            json!([{"$group": {"_id": null, "x": {"$median": "$a"}}}]),
            json!([{"$count": ""}]),
            json!([{"$match": {"$where": 1}}]),
        ] {
            assert!(
                matches!(Pipeline::parse(&bad), Err(StoreError::InvalidPipeline(_))),
                "{bad}"
            );
        }
    }
}
