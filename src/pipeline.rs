//! Extraction pipeline evaluator.
//!
//! A [`PipelineSpec`] declares up to four steps that always run in the fixed order
//! `from → where → pluck → reduce` against a single item of a source record:
//!
//! - `from`: dot-path navigation (`"."` is the whole item, numeric segments index sequences)
//! - `where`: conjunctive literal-equality filter over a sequence of mappings
//! - `pluck`: map each remaining item to the value of one key
//! - `reduce`: collapse the sequence using one of the closed set of [`Reduce`] kinds
//!
//! [`evaluate`] is a pure function of its inputs. A path that cannot be found falls back to the
//! declared `default`, and is an [`WeaveError::Extraction`] when there is none.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter},
};

use crate::error::WeaveError;

/// The `from` path that denotes the whole item.
pub const WHOLE_RECORD: &str = ".";

const DEFAULT_SEPARATOR: &str = " ";

fn whole_record() -> String {
    WHOLE_RECORD.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Auto,
    #[serde(alias = "string")]
    Text,
    #[serde(alias = "float", alias = "int", alias = "integer")]
    Number,
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "sequence", alias = "array")]
    List,
}

impl FieldType {
    /// Convert `value` into this declared type. `Auto` accepts anything and null passes through
    /// every type.
    pub fn coerce(self, value: Value, path: &str) -> Result<Value, WeaveError> {
        let mismatch = |value: &Value| {
            WeaveError::shape(
                path,
                format!("declared type {self} does not accept {}", type_name(value)),
            )
        };
        match (self, value) {
            (FieldType::Auto, value) | (_, value @ Value::Null) => Ok(value),
            (FieldType::Text, value @ Value::String(_)) => Ok(value),
            (FieldType::Text, Value::Number(n)) => Ok(Value::String(n.to_string())),
            (FieldType::Text, Value::Bool(b)) => Ok(Value::String(b.to_string())),
            (FieldType::Number, value @ Value::Number(_)) => Ok(value),
            (FieldType::Number, Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(n) => Ok(number(n)),
                Err(_) => Err(mismatch(&Value::String(s))),
            },
            (FieldType::Boolean, value @ Value::Bool(_)) => Ok(value),
            (FieldType::Boolean, Value::String(s)) => match s.trim().parse::<bool>() {
                Ok(b) => Ok(Value::Bool(b)),
                Err(_) => Err(mismatch(&Value::String(s))),
            },
            (FieldType::List, value @ Value::Array(_)) => Ok(value),
            (_, value) => Err(mismatch(&value)),
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldType::Auto => "auto",
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::List => "list",
        };
        write!(f, "{name}")
    }
}

/// The closed table of reduce kinds. Composite behavior exists only as the named composites
/// (`join_unique`, `count_unique`); reduces never chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReduceDecl", into = "ReduceDecl")]
pub enum Reduce {
    Join(String),
    JoinUnique(String),
    First,
    Last,
    Count,
    CountUnique,
    Unique,
    Sum,
    Mean,
    Min,
    Max,
}

/// Accepts `reduce: join` as well as the parametrized `reduce: {join: ", "}` form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ReduceDecl {
    Name(String),
    Param(BTreeMap<String, String>),
}

impl TryFrom<ReduceDecl> for Reduce {
    type Error = WeaveError;

    fn try_from(decl: ReduceDecl) -> Result<Self, Self::Error> {
        match decl {
            ReduceDecl::Name(name) => Ok(match name.as_str() {
                "join" => Reduce::Join(DEFAULT_SEPARATOR.to_string()),
                "join_unique" => Reduce::JoinUnique(DEFAULT_SEPARATOR.to_string()),
                "first" => Reduce::First,
                "last" => Reduce::Last,
                "count" => Reduce::Count,
                "count_unique" => Reduce::CountUnique,
                "unique" => Reduce::Unique,
                "sum" => Reduce::Sum,
                "mean" => Reduce::Mean,
                "min" => Reduce::Min,
                "max" => Reduce::Max,
                other => {
                    return Err(WeaveError::Config(format!("unknown reduce kind '{other}'")));
                }
            }),
            ReduceDecl::Param(params) => {
                let mut entries = params.into_iter();
                match (entries.next(), entries.next()) {
                    (Some((name, sep)), None) if name == "join" => Ok(Reduce::Join(sep)),
                    (Some((name, sep)), None) if name == "join_unique" => {
                        Ok(Reduce::JoinUnique(sep))
                    }
                    _ => Err(WeaveError::Config(
                        "parametrized reduce must be a single `join` or `join_unique` key"
                            .to_string(),
                    )),
                }
            }
        }
    }
}

impl From<Reduce> for ReduceDecl {
    fn from(reduce: Reduce) -> Self {
        let (name, separator) = match reduce {
            Reduce::Join(sep) => ("join", Some(sep)),
            Reduce::JoinUnique(sep) => ("join_unique", Some(sep)),
            Reduce::First => ("first", None),
            Reduce::Last => ("last", None),
            Reduce::Count => ("count", None),
            Reduce::CountUnique => ("count_unique", None),
            Reduce::Unique => ("unique", None),
            Reduce::Sum => ("sum", None),
            Reduce::Mean => ("mean", None),
            Reduce::Min => ("min", None),
            Reduce::Max => ("max", None),
        };
        match separator {
            Some(sep) if sep != DEFAULT_SEPARATOR => {
                ReduceDecl::Param(BTreeMap::from([(name.to_string(), sep)]))
            }
            _ => ReduceDecl::Name(name.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PipelineDecl")]
pub struct PipelineSpec {
    pub from: String,
    #[serde(rename = "where", skip_serializing_if = "BTreeMap::is_empty")]
    pub filter: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pluck: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce: Option<Reduce>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "type")]
    pub kind: FieldType,
}

/// A field may be declared as a bare path (`text: content`) or as a full pipeline map.
#[derive(Deserialize)]
#[serde(untagged)]
enum PipelineDecl {
    Path(String),
    Body(PipelineBody),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PipelineBody {
    #[serde(default = "whole_record")]
    from: String,
    #[serde(default, rename = "where")]
    filter: BTreeMap<String, Value>,
    #[serde(default)]
    pluck: Option<String>,
    #[serde(default)]
    reduce: Option<Reduce>,
    #[serde(default)]
    default: Option<Value>,
    #[serde(default, rename = "type")]
    kind: FieldType,
}

impl From<PipelineDecl> for PipelineSpec {
    fn from(decl: PipelineDecl) -> Self {
        match decl {
            PipelineDecl::Path(from) => PipelineSpec::path(from),
            PipelineDecl::Body(body) => PipelineSpec {
                from: body.from,
                filter: body.filter,
                pluck: body.pluck,
                reduce: body.reduce,
                default: body.default,
                kind: body.kind,
            },
        }
    }
}

impl Default for PipelineSpec {
    fn default() -> Self {
        PipelineSpec::path(WHOLE_RECORD)
    }
}

impl PipelineSpec {
    pub fn path<S: Into<String>>(from: S) -> Self {
        PipelineSpec {
            from: from.into(),
            filter: BTreeMap::new(),
            pluck: None,
            reduce: None,
            default: None,
            kind: FieldType::Auto,
        }
    }

    pub fn with_where<K: Into<String>>(mut self, key: K, literal: Value) -> Self {
        self.filter.insert(key.into(), literal);
        self
    }

    pub fn with_pluck<K: Into<String>>(mut self, key: K) -> Self {
        self.pluck = Some(key.into());
        self
    }

    pub fn with_reduce(mut self, reduce: Reduce) -> Self {
        self.reduce = Some(reduce);
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_type(mut self, kind: FieldType) -> Self {
        self.kind = kind;
        self
    }

    /// The declared type, or the statically inferred one when the declaration is `auto`. Returns
    /// [`FieldType::Auto`] when the type can only be known from the extracted value.
    pub fn static_type(&self) -> FieldType {
        if self.kind != FieldType::Auto {
            return self.kind;
        }
        match &self.reduce {
            None if self.pluck.is_some() => FieldType::List,
            None => FieldType::Auto,
            Some(Reduce::Join(_) | Reduce::JoinUnique(_)) => FieldType::Text,
            Some(Reduce::First | Reduce::Last) => FieldType::Auto,
            Some(Reduce::Unique) => FieldType::List,
            Some(
                Reduce::Count
                | Reduce::CountUnique
                | Reduce::Sum
                | Reduce::Mean
                | Reduce::Min
                | Reduce::Max,
            ) => FieldType::Number,
        }
    }
}

/// Where a pipeline is being evaluated, for error reporting.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    /// Config path of the declaration, e.g. `nodes.turn.fields.text`.
    pub path: &'a str,
    /// Identity of the record being resolved.
    pub record: &'a str,
}

impl Scope<'_> {
    fn missing(&self, what: String) -> WeaveError {
        WeaveError::Extraction {
            path: self.path.to_string(),
            record: self.record.to_string(),
            message: what,
        }
    }
}

/// Evaluate `spec` against `item`.
pub fn evaluate(spec: &PipelineSpec, item: &Value, scope: Scope<'_>) -> Result<Value, WeaveError> {
    let value = match navigate(item, &spec.from) {
        Some(value) => {
            let mut value = value.clone();
            if !spec.filter.is_empty() {
                value = apply_where(value, &spec.filter, scope.path)?;
            }
            if let Some(key) = &spec.pluck {
                value = apply_pluck(value, key, spec.default.as_ref(), scope)?;
            }
            match &spec.reduce {
                Some(reduce) => apply_reduce(reduce, value, scope.path)?,
                None => value,
            }
        }
        None => match &spec.default {
            // A substituted default skips the structural steps but still flows through reduce.
            Some(default) => match (&spec.reduce, default) {
                (Some(reduce), Value::Array(_)) => {
                    apply_reduce(reduce, default.clone(), scope.path)?
                }
                _ => default.clone(),
            },
            None => {
                return Err(scope.missing(format!("path '{}' not found", spec.from)));
            }
        },
    };
    spec.kind.coerce(value, scope.path)
}

/// Navigate a dot path. `"."` (or an empty path) is the whole value; numeric segments index into
/// sequences. Returns `None` when any segment is absent.
pub fn navigate<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if path == WHOLE_RECORD || path.is_empty() {
        return Some(value);
    }
    path.trim_start_matches('.')
        .split('.')
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Select the items that `from` + `where` address on a record. A sequence yields its (filtered)
/// elements, any other value yields itself, and an absent path yields nothing.
pub fn select_items<'a>(
    record: &'a Value,
    from: &str,
    filter: &BTreeMap<String, Value>,
    path: &str,
) -> Result<Vec<&'a Value>, WeaveError> {
    match navigate(record, from) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => {
            let mut selected = Vec::with_capacity(items.len());
            for item in items {
                if filter.is_empty() || matches_filter(item, filter, path)? {
                    selected.push(item);
                }
            }
            Ok(selected)
        }
        Some(other) if filter.is_empty() => Ok(vec![other]),
        Some(other) => Err(where_on_non_sequence(other, path)),
    }
}

fn where_on_non_sequence(value: &Value, path: &str) -> WeaveError {
    WeaveError::shape(
        path,
        format!(
            "`where` requires a sequence of mappings, found {}",
            type_name(value)
        ),
    )
}

fn matches_filter(
    item: &Value,
    filter: &BTreeMap<String, Value>,
    path: &str,
) -> Result<bool, WeaveError> {
    if !item.is_object() {
        return Err(WeaveError::shape(
            path,
            format!(
                "`where` requires a sequence of mappings, found an element of type {}",
                type_name(item)
            ),
        ));
    }
    Ok(filter.iter().all(|(key, literal)| {
        navigate(item, key)
            .map(|v| values_equal(v, literal))
            .unwrap_or(false)
    }))
}

fn apply_where(
    value: Value,
    filter: &BTreeMap<String, Value>,
    path: &str,
) -> Result<Value, WeaveError> {
    match value {
        Value::Array(items) => {
            let mut kept = Vec::with_capacity(items.len());
            for item in items {
                if matches_filter(&item, filter, path)? {
                    kept.push(item);
                }
            }
            Ok(Value::Array(kept))
        }
        other => Err(where_on_non_sequence(&other, path)),
    }
}

fn apply_pluck(
    value: Value,
    key: &str,
    default: Option<&Value>,
    scope: Scope<'_>,
) -> Result<Value, WeaveError> {
    let Value::Array(items) = value else {
        return Err(WeaveError::shape(
            scope.path,
            format!("`pluck` requires a sequence, found {}", type_name(&value)),
        ));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| match (navigate(item, key), default) {
            (Some(found), _) => Ok(found.clone()),
            (None, Some(default)) => Ok(default.clone()),
            (None, None) => Err(scope.missing(format!("key '{key}' not found on item {i}"))),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn apply_reduce(reduce: &Reduce, value: Value, path: &str) -> Result<Value, WeaveError> {
    let Value::Array(items) = value else {
        return Err(WeaveError::shape(
            path,
            format!("`reduce` requires a sequence, found {}", type_name(&value)),
        ));
    };
    Ok(match reduce {
        Reduce::Join(sep) => Value::String(join(&items, sep)),
        Reduce::JoinUnique(sep) => Value::String(join(&unique(items), sep)),
        Reduce::First => items.into_iter().next().unwrap_or(Value::Null),
        Reduce::Last => items.into_iter().last().unwrap_or(Value::Null),
        Reduce::Count => Value::from(items.len()),
        Reduce::CountUnique => Value::from(unique(items).len()),
        Reduce::Unique => Value::Array(unique(items)),
        Reduce::Sum | Reduce::Mean | Reduce::Min | Reduce::Max => {
            numeric_reduce(reduce, &items, path)?
        }
    })
}

fn numeric_reduce(reduce: &Reduce, items: &[Value], path: &str) -> Result<Value, WeaveError> {
    let mut numbers = Vec::with_capacity(items.len());
    for item in items {
        match item.as_f64() {
            Some(n) => numbers.push(n),
            None => {
                return Err(WeaveError::shape(
                    path,
                    format!("numeric reduce over non-numeric element {}", type_name(item)),
                ));
            }
        }
    }
    let integral = items.iter().all(|item| item.is_i64());
    if numbers.is_empty() {
        return Ok(match reduce {
            Reduce::Sum => Value::from(0),
            _ => Value::Null,
        });
    }
    if integral && !matches!(reduce, Reduce::Mean) {
        let mut ints = items.iter().filter_map(Value::as_i64);
        let result = match reduce {
            Reduce::Sum => ints
                .try_fold(0i64, i64::checked_add)
                .ok_or_else(|| WeaveError::shape(path, "integer sum overflows 64 bits"))?,
            Reduce::Min => ints.min().unwrap_or_default(),
            _ => ints.max().unwrap_or_default(),
        };
        return Ok(Value::from(result));
    }
    let result = match reduce {
        Reduce::Sum => numbers.iter().sum::<f64>(),
        Reduce::Mean => numbers.iter().sum::<f64>() / numbers.len() as f64,
        Reduce::Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
        _ => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    };
    Ok(number(result))
}

fn join(items: &[Value], sep: &str) -> String {
    items.iter().map(text_of).collect::<Vec<_>>().join(sep)
}

/// Order-preserving deduplication.
fn unique(items: Vec<Value>) -> Vec<Value> {
    let mut seen = BTreeSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(canonical_key(item)))
        .collect()
}

/// Textual rendering of a value: strings verbatim, other scalars via `Display`, null as the empty
/// string and containers as compact JSON.
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// A key under which equal values collide, used for set semantics over JSON values.
pub fn canonical_key(value: &Value) -> String {
    match value {
        Value::String(s) => format!("s:{s}"),
        Value::Number(n) => match n.as_f64() {
            Some(f) => format!("n:{f}"),
            None => format!("n:{n}"),
        },
        other => format!("j:{other}"),
    }
}

/// Literal equality with numbers compared by value, so `2` equals `2.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

pub fn number(n: f64) -> Value {
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "text",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCOPE: Scope<'static> = Scope {
        path: "nodes.doc.fields.test",
        record: "doc.json",
    };

    fn conversation() -> Value {
        json!({
            "title": "Chat",
            "turns": [
                {"role": "user", "content": "hello there", "tokens": 2},
                {"role": "assistant", "content": "hi", "tokens": 1},
                {"role": "user", "content": "hello there", "tokens": 2},
                {"role": "user", "content": "bye", "tokens": 1}
            ]
        })
    }

    #[test]
    fn test_navigate_whole_record_and_nested_paths() {
        let record = json!({"a": {"b": [10, 20]}});
        assert_eq!(navigate(&record, "."), Some(&record));
        assert_eq!(navigate(&record, "a.b.1"), Some(&json!(20)));
        assert_eq!(navigate(&record, "a.c"), None);
        assert_eq!(navigate(&record, "a.b.x"), None);
    }

    #[test]
    fn test_full_pipeline_join_unique() {
        let spec = PipelineSpec::path("turns")
            .with_where("role", json!("user"))
            .with_pluck("content")
            .with_reduce(Reduce::JoinUnique(" | ".to_string()));
        let value = evaluate(&spec, &conversation(), SCOPE).unwrap();
        assert_eq!(value, json!("hello there | bye"));
    }

    #[test]
    fn test_reduce_table() {
        let record = conversation();
        let base = PipelineSpec::path("turns").with_pluck("tokens");
        let cases = [
            (Reduce::Count, json!(4)),
            (Reduce::CountUnique, json!(2)),
            (Reduce::Unique, json!([2, 1])),
            (Reduce::Sum, json!(6)),
            (Reduce::Mean, json!(1.5)),
            (Reduce::Min, json!(1)),
            (Reduce::Max, json!(2)),
            (Reduce::First, json!(2)),
            (Reduce::Last, json!(1)),
            (Reduce::Join(",".to_string()), json!("2,1,2,1")),
        ];
        for (reduce, expected) in cases {
            let spec = base.clone().with_reduce(reduce.clone());
            assert_eq!(
                evaluate(&spec, &record, SCOPE).unwrap(),
                expected,
                "reduce {reduce:?}"
            );
        }
    }

    #[test]
    fn test_numeric_reduce_rejects_text() {
        let spec = PipelineSpec::path("turns")
            .with_pluck("role")
            .with_reduce(Reduce::Sum);
        let err = evaluate(&spec, &conversation(), SCOPE).unwrap_err();
        assert_eq!(err.kind(), "shape");
    }

    #[test]
    fn test_integer_reduce_is_exact() {
        let big = (1i64 << 53) + 1;
        let record = json!({"ids": [big, 2, -3]});
        let reduce = |reduce: Reduce| {
            let spec = PipelineSpec::path("ids").with_reduce(reduce);
            evaluate(&spec, &record, SCOPE)
        };
        assert_eq!(reduce(Reduce::Sum).unwrap(), json!(big - 1));
        assert_eq!(reduce(Reduce::Max).unwrap(), json!(big));
        assert_eq!(reduce(Reduce::Min).unwrap(), json!(-3));

        let overflow = json!({"ids": [i64::MAX, 1]});
        let spec = PipelineSpec::path("ids").with_reduce(Reduce::Sum);
        assert_eq!(evaluate(&spec, &overflow, SCOPE).unwrap_err().kind(), "shape");
    }

    #[test]
    fn test_where_on_non_sequence_is_an_error() {
        let spec = PipelineSpec::path("title").with_where("role", json!("user"));
        let err = evaluate(&spec, &conversation(), SCOPE).unwrap_err();
        assert_eq!(err.kind(), "shape");
    }

    #[test]
    fn test_missing_path_without_default_fails_with_field_path() {
        let spec = PipelineSpec::path("summary");
        match evaluate(&spec, &conversation(), SCOPE) {
            Err(WeaveError::Extraction { path, record, .. }) => {
                assert_eq!(path, "nodes.doc.fields.test");
                assert_eq!(record, "doc.json");
            }
            other => panic!("expected extraction error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_path_with_default_flows_through_reduce() {
        let spec = PipelineSpec::path("tags")
            .with_pluck("name")
            .with_reduce(Reduce::Count)
            .with_default(json!([]));
        assert_eq!(evaluate(&spec, &conversation(), SCOPE).unwrap(), json!(0));

        let spec = PipelineSpec::path("summary").with_default(json!("n/a"));
        assert_eq!(evaluate(&spec, &conversation(), SCOPE).unwrap(), json!("n/a"));
    }

    #[test]
    fn test_pluck_missing_key_per_item() {
        let record = json!({"items": [{"k": 1}, {"other": 2}]});
        let strict = PipelineSpec::path("items").with_pluck("k");
        assert!(evaluate(&strict, &record, SCOPE).is_err());

        let lenient = strict.with_default(json!(0)).with_reduce(Reduce::Sum);
        assert_eq!(evaluate(&lenient, &record, SCOPE).unwrap(), json!(1));
    }

    #[test]
    fn test_static_type_inference() {
        let pluck = PipelineSpec::path("turns").with_pluck("content");
        assert_eq!(pluck.static_type(), FieldType::List);
        assert_eq!(
            pluck.clone().with_reduce(Reduce::Count).static_type(),
            FieldType::Number
        );
        assert_eq!(
            pluck
                .clone()
                .with_reduce(Reduce::Join(" ".into()))
                .static_type(),
            FieldType::Text
        );
        assert_eq!(
            pluck.with_type(FieldType::Text).static_type(),
            FieldType::Text
        );
    }

    #[test]
    fn test_declared_type_coercion() {
        let record = json!({"year": "2015"});
        let spec = PipelineSpec::path("year").with_type(FieldType::Number);
        assert_eq!(evaluate(&spec, &record, SCOPE).unwrap(), json!(2015.0));

        let spec = PipelineSpec::path("year").with_type(FieldType::List);
        assert!(evaluate(&spec, &record, SCOPE).is_err());
    }

    #[test]
    fn test_field_declaration_forms() {
        let short: PipelineSpec = serde_yaml::from_str("content").unwrap();
        assert_eq!(short, PipelineSpec::path("content"));

        let full: PipelineSpec = serde_yaml::from_str(
            "from: turns\nwhere: {role: user}\npluck: content\nreduce: {join: \"; \"}\n",
        )
        .unwrap();
        assert_eq!(full.reduce, Some(Reduce::Join("; ".to_string())));
        assert_eq!(full.filter.get("role"), Some(&json!("user")));

        let bad = serde_yaml::from_str::<PipelineSpec>("from: turns\nreduce: median\n");
        assert!(bad.is_err());
    }
}
