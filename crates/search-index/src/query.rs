//! Pure HTTP-string → `ParsedQuery` parser (§4.3). Knows nothing about any
//! schema or engine; filter-value coercion is deferred to query assembly.

use crate::tokenizer::fields_keep_quote;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

/// A `q`/`fq` sub-expression split into must/should/notIn term buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTerms {
    pub must: Vec<String>,
    pub should: Vec<String>,
    pub not_in: Vec<String>,
}

impl QueryTerms {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && self.not_in.is_empty()
    }
}

/// One `fq` clause: a field name plus its own must/should/notIn terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldQuery {
    pub field_name: String,
    pub terms: QueryTerms,
}

/// One `s` clause: a field name plus its requested direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SortBy {
    pub field_name: String,
    pub ascending: bool,
    /// Resolved against a schema during query assembly; `None` until then.
    pub field_idx: Option<usize>,
}

/// A value-or-open-end range endpoint, still in raw string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRange {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// One `f` clause: a field name plus its equality candidates and ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field_name: String,
    pub conds: Vec<String>,
    pub ranges: Vec<RawRange>,
    /// Resolved against a schema during query assembly; `None` until then.
    pub field_idx: Option<usize>,
}

/// The fully parsed, schema-agnostic query.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub terms: QueryTerms,
    /// `true` when `q` was empty/blank: the sentinel "match all docs" case.
    pub match_all: bool,
    pub field_queries: Vec<FieldQuery>,
    pub sort_bys: Vec<SortBy>,
    pub filters: Vec<Filter>,
    pub start: usize,
    pub rows: usize,
    pub output_fields: Option<Vec<String>>,
}

/// Parse the seven HTTP query parameters into a `ParsedQuery` (§4.3).
#[must_use]
pub fn parse_query(q: &str, fq: &str, s: &str, f: &str, page: &str, pagesize: &str, fl: &str) -> ParsedQuery {
    let (terms, match_all) = parse_q(q);
    let field_queries = parse_fq(fq);
    let sort_bys = parse_s(s);
    let filters = parse_f(f);
    let output_fields = parse_fl(fl);

    let rows = pagesize
        .trim()
        .parse::<i64>()
        .ok()
        .map_or(DEFAULT_PAGE_SIZE, |n| {
            if n <= 0 {
                DEFAULT_PAGE_SIZE
            } else {
                usize::try_from(n).unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)
            }
        });

    let start = page
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|&n| n > 0)
        .map_or(0, |n| (n as usize - 1) * rows);

    ParsedQuery {
        terms,
        match_all,
        field_queries,
        sort_bys,
        filters,
        start,
        rows,
        output_fields,
    }
}

/// `q`: `+must should -notIn`, quote-aware. Blank `q` ⇒ `match_all = true`.
fn parse_q(q: &str) -> (QueryTerms, bool) {
    let parts = fields_keep_quote(q, &[]);
    if parts.is_empty() {
        return (QueryTerms::default(), true);
    }

    let mut terms = QueryTerms::default();
    for part in parts {
        let mut chars = part.chars();
        match chars.next() {
            Some('+') => {
                let rest = chars.as_str();
                if !rest.is_empty() {
                    terms.must.push(rest.to_string());
                }
            }
            Some('-') => {
                let rest = chars.as_str();
                if !rest.is_empty() {
                    terms.not_in.push(rest.to_string());
                }
            }
            _ => terms.should.push(part),
        }
    }

    if terms.is_empty() {
        (terms, true)
    } else {
        (terms, false)
    }
}

/// `fq`: `f1:q-in-field,f2:q-field,...` separated by `,`/`;`.
fn parse_fq(fq: &str) -> Vec<FieldQuery> {
    fields_keep_quote(fq, &[',', ';'])
        .into_iter()
        .filter_map(|part| {
            let pos = part.find(':')?;
            if pos == 0 {
                return None;
            }
            let (field_name, rest) = part.split_at(pos);
            let (terms, match_all) = parse_q(&rest[1..]);
            if match_all && terms.is_empty() {
                return None;
            }
            Some(FieldQuery {
                field_name: field_name.to_string(),
                terms,
            })
        })
        .collect()
}

/// `s`: `f1:desc,f2:asc` separated by `,`/`;`/whitespace. Unknown direction ⇒ desc.
fn parse_s(s: &str) -> Vec<SortBy> {
    s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut pieces = part.splitn(2, ':');
            let field_name = pieces.next().unwrap_or_default().to_string();
            let ascending = pieces.next() == Some("asc");
            SortBy {
                field_name,
                ascending,
                field_idx: None,
            }
        })
        .filter(|sb| !sb.field_name.is_empty())
        .collect()
}

/// `f`: `f1:c1,c2;f2:r1~r2` separated by `;`; a `cond` containing `~` is a range.
fn parse_f(f: &str) -> Vec<Filter> {
    fields_keep_quote(f, &[';'])
        .into_iter()
        .filter_map(|part| {
            let pos = part.find(':')?;
            if pos == 0 {
                return None;
            }
            let (field_name, rest) = part.split_at(pos);
            let mut conds = Vec::new();
            let mut ranges = Vec::new();
            for cond in fields_keep_quote(&rest[1..], &[',']) {
                if let Some(tilde) = cond.find('~') {
                    let (from, to) = cond.split_at(tilde);
                    let to = &to[1..];
                    ranges.push(RawRange {
                        from: (!from.is_empty()).then(|| from.to_string()),
                        to: (!to.is_empty()).then(|| to.to_string()),
                    });
                } else {
                    conds.push(cond);
                }
            }
            if conds.is_empty() && ranges.is_empty() {
                return None;
            }
            Some(Filter {
                field_name: field_name.to_string(),
                conds,
                ranges,
                field_idx: None,
            })
        })
        .collect()
}

/// `fl`: comma/whitespace-separated list of output field names.
fn parse_fl(fl: &str) -> Option<Vec<String>> {
    let fields: Vec<String> = fl
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    (!fields.is_empty()).then_some(fields)
}
