//! Boolean filter expressions for the fact store.
//!
//! The tree mirrors the store's native boolean filter: `bool` nodes with
//! `must` / `must_not` / `should` groups over leaf predicates. It serializes
//! to the store's JSON form and can also be evaluated in-process against a
//! single fact, which is how the local fact stores apply it.

mod compiler;

pub use compiler::FilterCompiler;

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::store::Fact;

/// Suffix marking an exact-match subfield in the store's mapping.
const KEYWORD_SUFFIX: &str = ".keyword";

/// A filter expression.
///
/// Every variant must be handled in `to_json()` and `matches()` - the
/// compiler enforces this.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals a literal.
    Term { field: String, value: String },

    /// Field equals one of several literals.
    Terms { field: String, values: Vec<String> },

    /// Numeric field within an inclusive range, open where a bound is `None`.
    Range {
        field: String,
        gte: Option<i64>,
        lte: Option<i64>,
    },

    /// Field is present and not null.
    Exists { field: String },

    /// String field starts with a prefix.
    Prefix { field: String, value: String },

    /// Boolean combination.
    Bool(BoolFilter),
}

/// `must` clauses all match, no `must_not` clause matches, and at least one
/// `should` clause matches when any are given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolFilter {
    pub must: Vec<Filter>,
    pub must_not: Vec<Filter>,
    pub should: Vec<Filter>,
}

// =============================================================================
// Constructors
// =============================================================================

impl Filter {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    /// A `term` for one value, `terms` for several.
    pub fn term_or_terms(field: impl Into<String>, mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            Filter::Term {
                field: field.into(),
                value: values.remove(0),
            }
        } else {
            Filter::Terms {
                field: field.into(),
                values,
            }
        }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Filter::Exists {
            field: field.into(),
        }
    }

    pub fn prefix(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Prefix {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn range(field: impl Into<String>, gte: Option<i64>, lte: Option<i64>) -> Self {
        Filter::Range {
            field: field.into(),
            gte,
            lte,
        }
    }

    pub fn must(clauses: Vec<Filter>) -> Self {
        Filter::Bool(BoolFilter {
            must: clauses,
            ..Default::default()
        })
    }

    pub fn should(clauses: Vec<Filter>) -> Self {
        Filter::Bool(BoolFilter {
            should: clauses,
            ..Default::default()
        })
    }
}

// =============================================================================
// Serialization
// =============================================================================

impl Filter {
    /// The store's JSON representation.
    pub fn to_json(&self) -> Value {
        match self {
            Filter::Term { field, value } => json!({ "term": { field.as_str(): value } }),
            Filter::Terms { field, values } => json!({ "terms": { field.as_str(): values } }),
            Filter::Range { field, gte, lte } => {
                let mut bounds = Map::new();
                if let Some(gte) = gte {
                    bounds.insert("gte".to_string(), json!(gte));
                }
                if let Some(lte) = lte {
                    bounds.insert("lte".to_string(), json!(lte));
                }
                json!({ "range": { field.as_str(): bounds } })
            }
            Filter::Exists { field } => json!({ "exists": { "field": field } }),
            Filter::Prefix { field, value } => json!({ "prefix": { field.as_str(): value } }),
            Filter::Bool(b) => {
                let mut groups = Map::new();
                for (name, clauses) in [("must", &b.must), ("must_not", &b.must_not), ("should", &b.should)] {
                    if !clauses.is_empty() {
                        let clauses: Vec<Value> = clauses.iter().map(Filter::to_json).collect();
                        groups.insert(name.to_string(), Value::Array(clauses));
                    }
                }
                if !b.must.is_empty() && !b.should.is_empty() {
                    groups.insert("minimum_should_match".to_string(), json!(1));
                }
                json!({ "bool": groups })
            }
        }
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

// =============================================================================
// Evaluation
// =============================================================================

impl Filter {
    /// Evaluate the filter against one fact.
    pub fn matches(&self, fact: &Fact) -> bool {
        match self {
            Filter::Term { field, value } => {
                lookup(fact, field).and_then(as_text).as_deref() == Some(value.as_str())
            }
            Filter::Terms { field, values } => lookup(fact, field)
                .and_then(as_text)
                .is_some_and(|text| values.iter().any(|v| *v == text)),
            Filter::Range { field, gte, lte } => {
                let Some(n) = lookup(fact, field).and_then(as_number) else {
                    return false;
                };
                gte.map_or(true, |g| n >= g as f64) && lte.map_or(true, |l| n <= l as f64)
            }
            Filter::Exists { field } => lookup(fact, field).is_some_and(|v| !v.is_null()),
            Filter::Prefix { field, value } => lookup(fact, field)
                .and_then(as_text)
                .is_some_and(|text| text.starts_with(value.as_str())),
            Filter::Bool(b) => {
                b.must.iter().all(|f| f.matches(fact))
                    && !b.must_not.iter().any(|f| f.matches(fact))
                    && (b.should.is_empty() || b.should.iter().any(|f| f.matches(fact)))
            }
        }
    }
}

/// Resolve a field name against a fact: exact key first, otherwise a dotted
/// path through nested objects. A trailing `.keyword` is ignored.
fn lookup<'a>(fact: &'a Fact, field: &str) -> Option<&'a Value> {
    let field = field.strip_suffix(KEYWORD_SUFFIX).unwrap_or(field);
    if let Some(value) = fact.get(field) {
        return Some(value);
    }
    let mut parts = field.split('.');
    let mut current = fact.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
