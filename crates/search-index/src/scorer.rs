//! The scorer/filter pipeline (§4.5): turns an engine candidate's proximity,
//! BM25, and stored fields into a sort-key vector, or an empty vector to
//! suppress the candidate. Also the filter-satisfied predicate it builds on.

use std::cmp::Ordering;
use std::sync::Arc;

use search_core::{NativeValue, Schema, Tokenizer};

use crate::document::StoredDoc;
use crate::tokenizer::whitespace_tokenize;

/// Maximum token proximity (§4.5, §9): candidates whose terms never co-occur
/// within this span are always suppressed.
pub const MAX_TOKEN_PROXIMITY: usize = 2;

/// A resolved `s=` clause: field index known, ready to index into a `Schema`.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedSortBy {
    pub field_idx: usize,
    pub ascending: bool,
}

/// A resolved `f=` clause: field index known, conds/range endpoints already
/// coerced to the field's native type.
#[derive(Debug, Clone)]
pub struct ResolvedFilter {
    pub field_idx: usize,
    pub conds: Vec<NativeValue>,
    pub ranges: Vec<(Option<NativeValue>, Option<NativeValue>)>,
}

/// The engine's scoring callback (§9: "re-express as an interface/trait
/// implemented by a small struct carrying `(schema, parsedQuery)`").
pub trait Scorer: Send + Sync {
    /// `proximity` is the minimum token-position window containing every
    /// query term (`usize::MAX` if the terms never co-occur). `bm25` is the
    /// engine's own relevance score for the candidate. Returns an empty
    /// vector to suppress the candidate, otherwise one value per sort key.
    fn score(&self, proximity: usize, bm25: f32, stored: &StoredDoc) -> Vec<f64>;
}

/// The scorer built for one query: carries the schema (for per-field
/// tokenizer/type lookups) and the resolved sort keys / filters.
pub struct QueryScorer {
    pub schema: Arc<Schema>,
    pub sort_bys: Vec<ResolvedSortBy>,
    pub filters: Vec<ResolvedFilter>,
}

impl Scorer for QueryScorer {
    fn score(&self, proximity: usize, bm25: f32, stored: &StoredDoc) -> Vec<f64> {
        if proximity > MAX_TOKEN_PROXIMITY {
            return Vec::new();
        }
        if !self.satisfied(stored) {
            return Vec::new();
        }

        self.sort_bys
            .iter()
            .map(|sort_by| {
                let field_name = &self.schema.fields[sort_by.field_idx].name;
                let Some(stored_val) = stored.get(field_name) else {
                    return 0.0;
                };
                let mut value = sorting_score(stored_val, bm25);
                if sort_by.ascending && value != 0.0 {
                    value = 1.0 / value;
                }
                value
            })
            .collect()
    }
}

impl QueryScorer {
    /// A doc *satisfies* the filter set iff every clause is satisfied (§4.5).
    fn satisfied(&self, stored: &StoredDoc) -> bool {
        for filter in &self.filters {
            let field_name = &self.schema.fields[filter.field_idx].name;
            let Some(stored_val) = stored.get(field_name) else {
                return false;
            };

            if !filter.conds.is_empty() {
                let tokenizer = self.schema.tokenizer(filter.field_idx);
                let matched = filter
                    .conds
                    .iter()
                    .any(|cond| cond_equals(stored_val, cond, tokenizer));
                if !matched {
                    return false;
                }
            }

            if !filter.ranges.is_empty() {
                let matched = filter
                    .ranges
                    .iter()
                    .any(|(from, to)| in_range(stored_val, from.as_ref(), to.as_ref()));
                if !matched {
                    return false;
                }
            }
        }
        true
    }
}

/// Per-type sort-key derivation (§4.5): string ⇒ BM25, numeric ⇒ the value,
/// bool ⇒ 2/1, anything else ⇒ 0.
fn sorting_score(stored_val: &NativeValue, bm25: f32) -> f64 {
    match stored_val {
        NativeValue::Str(_) => f64::from(bm25),
        NativeValue::Bool(b) => {
            if *b {
                2.0
            } else {
                1.0
            }
        }
        other => other.as_f64().unwrap_or(0.0),
    }
}

/// Equality/membership match for one filter `cond` against a stored value.
/// For strings, governed by the field's tokenizer (§4.5); for everything
/// else, plain equality.
fn cond_equals(stored_val: &NativeValue, cond: &NativeValue, tokenizer: Tokenizer) -> bool {
    match (stored_val, cond) {
        (NativeValue::Str(sv), NativeValue::Str(cv)) => match tokenizer {
            Tokenizer::Zh => sv.contains(cv.as_str()),
            Tokenizer::None => cv == sv.trim(),
            Tokenizer::Space => whitespace_tokenize(sv, &[]).iter().any(|tok| tok == cv),
        },
        _ => stored_val == cond,
    }
}

/// Whether `stored_val` falls within `[from, to]` (either end open). Ordering
/// uses the native type's natural order (§4.5).
fn in_range(stored_val: &NativeValue, from: Option<&NativeValue>, to: Option<&NativeValue>) -> bool {
    if let Some(from) = from
        && native_cmp(stored_val, from).is_none_or(|o| o == Ordering::Less)
    {
        return false;
    }
    if let Some(to) = to
        && native_cmp(stored_val, to).is_none_or(|o| o == Ordering::Greater)
    {
        return false;
    }
    true
}

/// Compare two `NativeValue`s of (expected) matching variant. `None` if the
/// variants don't match or aren't comparable (e.g. `json`).
fn native_cmp(a: &NativeValue, b: &NativeValue) -> Option<Ordering> {
    match (a, b) {
        (NativeValue::Str(x), NativeValue::Str(y)) => Some(x.cmp(y)),
        (NativeValue::Bool(x), NativeValue::Bool(y)) => Some(x.cmp(y)),
        (NativeValue::Json(_), _) | (_, NativeValue::Json(_)) => None,
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}
