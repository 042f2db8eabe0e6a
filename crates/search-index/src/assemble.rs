//! Query assembly (§4.6): turns a `ParsedQuery` plus a `Schema` into an
//! engine `SearchRequest`, resolving field names, coercing filter/range
//! values, and attaching the scorer.

use std::sync::Arc;

use search_core::{Field as SchemaField, Schema, Tokenizer};

use crate::document::ALL_DOCS_TOKEN;
use crate::engine::SearchRequest;
use crate::error::{IndexError, IndexResult};
use crate::query::ParsedQuery;
use crate::scorer::{QueryScorer, ResolvedFilter, ResolvedSortBy};
use crate::tokenizer::{hanzi_tokenize, whitespace_tokenize};

/// Build the engine request for `pq` against `schema`. Validates `fl`
/// against the schema; everything else drops unknown fields silently,
/// matching the source's `checkSortings`/`checkFilters` behavior.
pub fn assemble_search_request(schema: &Arc<Schema>, pq: &ParsedQuery, tz_offset_secs: i32) -> IndexResult<SearchRequest> {
    if let Some(fl) = &pq.output_fields {
        for name in fl {
            if schema.field_index(name).is_none() {
                return Err(IndexError::bad_request(format!("out field {name} not found")));
            }
        }
    }

    let mut must = Vec::new();
    let mut should = Vec::new();
    let mut not_in = Vec::new();

    if !pq.match_all {
        generate_tokens(&pq.terms.must, &mut must);
        generate_tokens(&pq.terms.should, &mut should);
        generate_tokens(&pq.terms.not_in, &mut not_in);
    }

    for fq in &pq.field_queries {
        let Some(field_idx) = schema.field_index(&fq.field_name) else {
            continue;
        };
        let tokenizer = schema.tokenizer(field_idx);
        generate_field_tokens(field_idx, tokenizer, &fq.terms.must, &mut must);
        generate_field_tokens(field_idx, tokenizer, &fq.terms.should, &mut should);
        generate_field_tokens(field_idx, tokenizer, &fq.terms.not_in, &mut not_in);
    }

    // "if there's not, there's must" (§9 open question b): a bare notIn needs
    // a non-empty positive set for the engine to restrict against.
    if !not_in.is_empty() && must.is_empty() {
        must.push(ALL_DOCS_TOKEN.to_string());
    }
    // Nothing at all was set: match every document.
    if must.is_empty() && should.is_empty() {
        must.push(ALL_DOCS_TOKEN.to_string());
    }

    let sort_bys = resolve_sort_bys(schema, pq);
    let filters = resolve_filters(schema, pq, tz_offset_secs)?;

    let scorer = Arc::new(QueryScorer {
        schema: Arc::clone(schema),
        sort_bys,
        filters,
    });

    Ok(SearchRequest {
        must,
        should,
        not_in,
        offset: pq.start,
        max_outputs: pq.rows,
        scorer,
    })
}

/// `q`-level terms are always CJK-split regardless of the target field's
/// tokenizer (§9 open question c): broadest possible recall.
fn generate_tokens(terms: &[String], out: &mut Vec<String>) {
    for term in terms {
        out.extend(hanzi_tokenize(term, &[]));
    }
}

fn generate_field_tokens(field_idx: usize, tokenizer: Tokenizer, terms: &[String], out: &mut Vec<String>) {
    for term in terms {
        let tokens: Vec<String> = match tokenizer {
            Tokenizer::Zh => hanzi_tokenize(term, &[]),
            Tokenizer::None => Vec::new(),
            Tokenizer::Space => whitespace_tokenize(term, &[]),
        };
        for token in tokens {
            out.push(format!("f{field_idx}:{token}"));
        }
    }
}

fn resolve_sort_bys(schema: &Schema, pq: &ParsedQuery) -> Vec<ResolvedSortBy> {
    let resolved: Vec<ResolvedSortBy> = pq
        .sort_bys
        .iter()
        .filter_map(|sb| {
            schema.field_index(&sb.field_name).map(|field_idx| ResolvedSortBy {
                field_idx,
                ascending: sb.ascending,
            })
        })
        .collect();

    if !resolved.is_empty() {
        return resolved;
    }

    if !schema.def_sort_bys.is_empty() {
        return schema
            .def_sort_bys
            .iter()
            .map(|&(field_idx, ascending)| ResolvedSortBy { field_idx, ascending })
            .collect();
    }

    schema
        .pk_idx
        .iter()
        .map(|&field_idx| ResolvedSortBy {
            field_idx,
            ascending: true,
        })
        .collect()
}

fn resolve_filters(schema: &Schema, pq: &ParsedQuery, tz_offset_secs: i32) -> IndexResult<Vec<ResolvedFilter>> {
    let mut resolved = Vec::with_capacity(pq.filters.len());
    for filter in &pq.filters {
        let Some(field_idx) = schema.field_index(&filter.field_name) else {
            continue;
        };
        let field: &SchemaField = &schema.fields[field_idx];
        let field_type = schema.field_type(field_idx);

        let mut conds = Vec::new();
        for cond in &filter.conds {
            if let Ok(v) = field.to_native_value(field_type, &serde_json::Value::String(cond.clone()), tz_offset_secs) {
                conds.push(v);
            }
        }

        let mut ranges = Vec::new();
        for range in &filter.ranges {
            let from = match &range.from {
                Some(s) => match field.to_native_value(field_type, &serde_json::Value::String(s.clone()), tz_offset_secs) {
                    Ok(v) => Some(v),
                    Err(_) => continue,
                },
                None => None,
            };
            let to = match &range.to {
                Some(s) => match field.to_native_value(field_type, &serde_json::Value::String(s.clone()), tz_offset_secs) {
                    Ok(v) => Some(v),
                    Err(_) => continue,
                },
                None => None,
            };
            if from.is_none() && to.is_none() {
                continue;
            }
            ranges.push((from, to));
        }

        if conds.is_empty() && ranges.is_empty() {
            continue;
        }

        resolved.push(ResolvedFilter {
            field_idx,
            conds,
            ranges,
        });
    }
    Ok(resolved)
}
