use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const OP_AND: &str = "AND";
pub const OP_OR: &str = "OR";
pub const OP_EQ: &str = "EQ";
pub const OP_IN: &str = "IN";
pub const OP_RANGE: &str = "RANGE";
pub const OP_REGEX: &str = "REGEX";
pub const OP_STARTS_WITH: &str = "STARTS_WITH";
pub const OP_ENDS_WITH: &str = "ENDS_WITH";
pub const OP_EXIST: &str = "EXIST";

pub const KEY_HOST: &str = "HOST";
pub const KEY_URL: &str = "URL";
pub const KEY_SRC_IP: &str = "SRC_IP";
pub const KEY_HEADER: &str = "HEADER";
pub const KEY_COOKIE: &str = "COOKIE";
pub const KEY_PARAM: &str = "PARAM";
pub const KEY_METHOD: &str = "METHOD";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MatchError {
    #[error("invalid dslx values {0:?}")]
    InvalidValues(Vec<String>),
    #[error("dslx term {0} has a value without operator")]
    MissingOperator(String),
    #[error("unsupported match type {0}")]
    UnsupportedMatchType(String),
    #[error("rule without matcher")]
    NoMatcher,
}

/// One clause of a match expression: a dimension, an optional key (header, cookie or param name)
/// and one or more `[op, args...]` values which are OR-ed together.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct DslxTerm {
    pub values: Vec<Vec<String>>,
    #[serde(rename = "type")]
    pub term_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl DslxTerm {
    pub fn new(term_type: &str, op: &str, args: &[&str]) -> Self {
        let mut value = vec![op.to_owned()];
        value.extend(args.iter().map(|a| (*a).to_owned()));
        Self { values: vec![value], term_type: term_type.to_owned(), key: None }
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.to_owned());
        self
    }

    fn key(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.is_empty())
    }
}

pub type Dslx = Vec<DslxTerm>;

/// Ranks match expressions. More constrained expressions must score strictly higher.
pub trait Specificity: Send + Sync {
    fn score(&self, dslx: &[DslxTerm]) -> i32;
}

/// Exact hosts outrank wildcard hosts, which outrank any url match. Exact urls outrank prefixes
/// and longer prefixes outrank shorter ones.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultSpecificity;

impl Specificity for DefaultSpecificity {
    fn score(&self, dslx: &[DslxTerm]) -> i32 {
        let mut score: i32 = 0;
        for term in dslx {
            match term.term_type.as_str() {
                KEY_HOST => match term.values.first().and_then(|v| v.first()).map(String::as_str) {
                    Some(OP_EQ | OP_IN) => score += 50000,
                    Some(OP_ENDS_WITH) => score += 10000,
                    _ => {},
                },
                KEY_URL => {
                    for value in &term.values {
                        match value.first().map(String::as_str) {
                            Some(OP_EQ) => score += 2000,
                            Some(op @ (OP_STARTS_WITH | OP_REGEX)) => {
                                let len = value.get(1).map_or(0, String::len);
                                score += 1000 + i32::try_from(len).unwrap_or(0);
                                if op == OP_STARTS_WITH {
                                    score += 2;
                                }
                            },
                            _ => {},
                        }
                    }
                },
                _ => score += 100 * i32::try_from(term.values.len()).unwrap_or(0),
            }
        }
        score
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompiledMatch {
    pub internal_dsl: Vec<Value>,
    pub specificity: i32,
    pub serialized_len: usize,
}

fn term_expression(term: &DslxTerm, value: &[String]) -> Result<Value, MatchError> {
    let (op, args) = value.split_first().ok_or_else(|| MatchError::MissingOperator(term.term_type.clone()))?;
    let mut expression = vec![Value::from(op.as_str()), Value::from(term.term_type.as_str())];
    if let Some(key) = term.key() {
        expression.push(Value::from(key));
    }
    expression.extend(args.iter().map(|a| Value::from(a.as_str())));
    Ok(Value::Array(expression))
}

/// Turns a match expression into the prefix-notation tree evaluated by the data plane.
pub fn to_internal_dsl(dslx: &[DslxTerm]) -> Result<Vec<Value>, MatchError> {
    let mut internal = vec![];
    if dslx.is_empty() {
        return Ok(internal);
    }
    if dslx.len() > 1 {
        internal.push(Value::from(OP_AND));
    }
    for term in dslx {
        match term.values.as_slice() {
            [] => continue,
            [value] => internal.push(term_expression(term, value)?),
            values => {
                let mut alternatives = vec![Value::from(OP_OR)];
                for value in values {
                    if value.len() < 2 {
                        return Err(MatchError::InvalidValues(value.clone()));
                    }
                    alternatives.push(term_expression(term, value)?);
                }
                internal.push(Value::Array(alternatives));
            },
        }
    }
    Ok(internal)
}

/// Extra bytes a character takes when the data plane's JSON encoder escapes it as `\uXXXX`.
fn escape_overhead(c: char) -> usize {
    match c {
        '<' | '>' | '&' => 5,
        '\u{2028}' | '\u{2029}' => 3,
        _ => 0,
    }
}

/// Length of the compact JSON encoding with HTML-safe escaping, the way the data plane measures
/// its match expressions.
pub fn serialized_len(internal_dsl: &[Value]) -> usize {
    serde_json::to_string(internal_dsl).map_or(0, |s| s.len() + s.chars().map(escape_overhead).sum::<usize>())
}

pub fn compile(dslx: &[DslxTerm], specificity: &dyn Specificity) -> Result<CompiledMatch, MatchError> {
    let internal_dsl = to_internal_dsl(dslx)?;
    let serialized_len = serialized_len(&internal_dsl);
    Ok(CompiledMatch { internal_dsl, specificity: specificity.score(dslx), serialized_len })
}
