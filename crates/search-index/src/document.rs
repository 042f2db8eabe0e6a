//! Document encoding: projects an incoming JSON document to a `StoredDoc` +
//! token stream against a `Schema`, derives `docId` from the PK fields, and
//! exposes the batch/stream ingestion path used by `Service::index_docs`.

use std::io::Read;

use indexmap::IndexMap;
use search_core::{CoreError, Field as SchemaField, FieldType, NativeValue, Schema, Tokenizer};
use serde_json::Value as JsonValue;

use crate::error::{IndexError, IndexResult};
use crate::tokenizer::{hanzi_tokenize, whitespace_tokenize};

/// Field-name → native-value mapping stored alongside a document in the engine.
pub type StoredDoc = IndexMap<String, NativeValue>;

/// Gap (in location units) inserted between consecutive fields' token runs,
/// so proximity scoring never conflates terms across a field boundary.
const FIELD_GAP: i64 = 10;

/// The sentinel label/token meaning "match every document", used both by the
/// query parser (§4.3) and by every encoded document (§4.4) so a bare "match
/// all" query has something non-empty to match against.
pub const ALL_DOCS_TOKEN: &str = ".";

/// One indexed token: bare text plus the ordered, strictly increasing
/// locations at which it occurs in a document's token stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub locations: Vec<i64>,
}

/// The result of encoding one input document: its synthesized docId, the
/// fields to store, and the merged token stream to hand the engine.
pub struct EncodedDocument {
    pub doc_id: String,
    pub stored: StoredDoc,
    pub tokens: Vec<Token>,
}

/// Encode one JSON document against `schema`, producing stored fields, a
/// merged token stream, and a synthesized `docId`.
///
/// Unknown input fields are silently dropped (matching the source's
/// `fieldMap` lookup-or-skip behavior). Every PK field must be present or
/// the document is rejected with `CoreError::BadRequest`.
pub fn encode_document(
    schema: &Schema,
    doc: &serde_json::Map<String, JsonValue>,
    tz_offset_secs: i32,
) -> IndexResult<EncodedDocument> {
    let mut stored = StoredDoc::new();
    let mut tokens = Vec::new();
    let mut pk_values: IndexMap<usize, NativeValue> = IndexMap::new();
    let mut start_loc: i64 = 0;

    for (field_name, raw_value) in doc {
        let Some(field_idx) = schema.field_index(field_name) else {
            continue;
        };
        let field: &SchemaField = &schema.fields[field_idx];
        let field_type = schema.field_type(field_idx);

        let mut value = field.to_native_value(field_type, raw_value, tz_offset_secs)?;

        if field.pk {
            pk_values.insert(field_idx, value.clone());
        }

        if let NativeValue::Str(ref s) = value {
            let tokenizer = schema.tokenizer(field_idx);
            let seg_tokens = match tokenizer {
                Tokenizer::Zh => hanzi_tokenize(s, &[]),
                Tokenizer::None => {
                    value = NativeValue::Str(s.trim().to_string());
                    Vec::new()
                }
                Tokenizer::Space => whitespace_tokenize(s, &[]),
            };
            if !seg_tokens.is_empty() {
                let n = seg_tokens.len() as i64;
                for (i, text) in seg_tokens.iter().enumerate() {
                    let i = i as i64;
                    tokens.push(Token {
                        text: text.clone(),
                        locations: vec![start_loc + i],
                    });
                    tokens.push(Token {
                        text: format!("f{field_idx}:{text}"),
                        locations: vec![start_loc + n + i],
                    });
                }
                start_loc += 2 * n + FIELD_GAP;
            }
        }

        stored.insert(field_name.clone(), value);
    }

    if pk_values.len() != schema.pk_idx.len() {
        return Err(IndexError::Core(CoreError::BadRequest(
            "pk field must be specified".to_string(),
        )));
    }

    let doc_id = schema
        .pk_idx
        .iter()
        .map(|idx| pk_values[idx].to_string())
        .collect::<Vec<_>>()
        .join("_");

    // Every document carries the sentinel "all docs" label (§4.4) so a bare
    // "match all" query (must=[ALL_DOCS_TOKEN]) has something to match against.
    tokens.push(Token {
        text: ALL_DOCS_TOKEN.to_string(),
        locations: vec![start_loc],
    });

    let tokens = merge_token_locs(tokens);

    Ok(EncodedDocument {
        doc_id,
        stored,
        tokens,
    })
}

/// Collapse duplicate-text token entries into one, concatenating their
/// location lists. Preserves the insertion order of first sight, per §8.4.
#[must_use]
pub fn merge_token_locs(tokens: Vec<Token>) -> Vec<Token> {
    let mut merged: IndexMap<String, Vec<i64>> = IndexMap::with_capacity(tokens.len());
    for token in tokens {
        merged
            .entry(token.text)
            .or_default()
            .extend(token.locations);
    }
    merged
        .into_iter()
        .map(|(text, locations)| Token { text, locations })
        .collect()
}

/// One record read off a batch ingestion stream, or the per-record error
/// encountered while decoding it.
pub struct DocRecord {
    pub doc: Option<serde_json::Map<String, JsonValue>>,
    pub err: Option<String>,
}

/// The wire format a batch ingestion stream is encoded in, matching the
/// source's extension-based dispatch (`.json` / `.csv` / `.jsonl`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFormat {
    /// A single top-level JSON array of document objects.
    JsonArray,
    /// CSV with a header row supplying field names positionally.
    Csv,
    /// JSON Lines: one JSON object per line, no enclosing array or commas.
    JsonLines,
}

/// Read every document out of `reader` according to `format`, eagerly (this
/// crate has no async runtime; "streaming" here means "don't require the
/// whole decoded `Vec` to be held twice", not deferred I/O).
pub fn read_batch(format: BatchFormat, reader: &mut dyn Read) -> IndexResult<Vec<DocRecord>> {
    match format {
        BatchFormat::JsonArray => read_json_array(reader),
        BatchFormat::Csv => read_csv(reader),
        BatchFormat::JsonLines => read_json_lines(reader),
    }
}

fn read_json_array(reader: &mut dyn Read) -> IndexResult<Vec<DocRecord>> {
    let docs: Vec<serde_json::Map<String, JsonValue>> = serde_json::from_reader(reader)
        .map_err(CoreError::from)?;
    Ok(docs
        .into_iter()
        .map(|doc| DocRecord {
            doc: Some(doc),
            err: None,
        })
        .collect())
}

fn read_json_lines(reader: &mut dyn Read) -> IndexResult<Vec<DocRecord>> {
    let mut text = String::new();
    reader.read_to_string(&mut text).map_err(CoreError::from)?;
    let mut records = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Map<String, JsonValue>>(line) {
            Ok(doc) => records.push(DocRecord {
                doc: Some(doc),
                err: None,
            }),
            Err(e) => records.push(DocRecord {
                doc: None,
                err: Some(e.to_string()),
            }),
        }
    }
    Ok(records)
}

fn read_csv(reader: &mut dyn Read) -> IndexResult<Vec<DocRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| IndexError::bad_request(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut records = Vec::new();
    for result in rdr.records() {
        match result {
            Ok(record) => {
                let mut doc = serde_json::Map::with_capacity(headers.len());
                for (name, value) in headers.iter().zip(record.iter()) {
                    doc.insert(name.clone(), JsonValue::String(value.to_string()));
                }
                records.push(DocRecord {
                    doc: Some(doc),
                    err: None,
                });
            }
            Err(e) => records.push(DocRecord {
                doc: None,
                err: Some(e.to_string()),
            }),
        }
    }
    Ok(records)
}

/// Returns the field type used internally for `FieldType::Json` values, so
/// callers can tell whether an output field should pass through untouched.
#[must_use]
pub const fn is_passthrough(ty: FieldType) -> bool {
    matches!(ty, FieldType::Json)
}
