//! The `Service` facade (§2 item 9, §6): every operation the transport layer
//! is expected to expose as an HTTP route, gathered behind one type so a
//! caller never has to reach into `Registry`/`assemble`/`document` directly.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use search_core::schema::SchemaConf;
use search_core::{NativeValue, Schema};

use crate::assemble::assemble_search_request;
use crate::document::{read_batch, BatchFormat, DocRecord, StoredDoc};
use crate::error::{IndexError, IndexResult};
use crate::query::parse_query;
use crate::registry::Registry;

/// One document's outcome within a batch `index_docs` call.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub doc_id: Option<String>,
    pub err: Option<String>,
}

/// The `{code, msg, index, docs}` summary an async batch (`index_docs_async`)
/// hands to its completion sink once the batch (and its trailing flush) has
/// finished (§4.4, §6). `code` is `0` on a batch that ran to completion
/// (individual record failures are still visible per-entry in `docs`) and
/// nonzero if the batch itself aborted (e.g. the wire format could not be
/// decoded at all, or the index was stopped mid-batch).
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub code: i32,
    pub msg: String,
    pub index: String,
    pub docs: Vec<BatchOutcome>,
}

/// Notified exactly once when an `index_docs_async` batch finishes. The
/// transport layer implements this to POST a `BatchReport` to the caller's
/// `cb` URL (§6); this crate only runs the batch and packages the report.
pub trait BatchCompletionSink: Send + 'static {
    fn notify(&self, report: BatchReport);
}

/// Pagination metadata derived from `total` and the request's page window (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub total: usize,
    pub pages: usize,
    pub page_size: usize,
    pub curr_page: usize,
    pub page_count: usize,
}

impl Pagination {
    fn compute(total: usize, offset: usize, rows: usize, page_count: usize) -> Self {
        let rows = rows.max(1);
        Self {
            total,
            pages: total.div_ceil(rows),
            page_size: rows,
            curr_page: offset / rows + 1,
            page_count,
        }
    }
}

/// One result document after `fl` projection and date/time formatting (§4.6).
#[derive(Debug, Clone)]
pub struct ResultDoc {
    pub doc_id: String,
    pub stored: StoredDoc,
}

/// `Service::search`'s response: pagination, whether the underlying search
/// timed out, and the page of result documents with `fl`/date-time output
/// projection already applied.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub pagination: Pagination,
    pub timeout: bool,
    pub docs: Vec<ResultDoc>,
}

/// Restrict `stored` to `output_fields` (or pass every field through when
/// `None`), formatting any `time_idx` field as a string along the way —
/// date/time fields are always emitted as formatted strings, never raw ns (§4.6).
fn project_doc(
    schema: &Schema,
    stored: &StoredDoc,
    output_fields: Option<&[String]>,
    tz_offset_secs: i32,
) -> IndexResult<StoredDoc> {
    let mut out = StoredDoc::new();
    let names: Vec<&String> = match output_fields {
        Some(fields) => fields.iter().collect(),
        None => stored.keys().collect(),
    };
    for name in names {
        let Some(value) = stored.get(name) else {
            continue;
        };
        let projected = match (schema.time_idx.get(name), value) {
            (Some(_), NativeValue::I64(ns)) => {
                NativeValue::Str(schema.format_datetime(name, *ns, tz_offset_secs)?)
            }
            _ => value.clone(),
        };
        out.insert(name.clone(), projected);
    }
    Ok(out)
}

fn project_response(
    schema: &Schema,
    response: crate::engine::SearchResponse,
    output_fields: Option<&[String]>,
    tz_offset_secs: i32,
) -> IndexResult<Vec<ResultDoc>> {
    response
        .docs
        .into_iter()
        .map(|doc| {
            let stored = project_doc(schema, &doc.stored, output_fields, tz_offset_secs)?;
            Ok(ResultDoc {
                doc_id: doc.doc_id,
                stored,
            })
        })
        .collect()
}

fn index_batch(registry: &Registry, index: &str, format: BatchFormat, reader: &mut dyn Read) -> IndexResult<Vec<BatchOutcome>> {
    let records = read_batch(format, reader)?;
    Ok(records
        .into_iter()
        .map(|record| index_one_record(registry, index, record))
        .collect())
}

fn index_one_record(registry: &Registry, index: &str, record: DocRecord) -> BatchOutcome {
    match record {
        DocRecord { doc: Some(doc), .. } => match registry.index_doc(index, &doc) {
            Ok(doc_id) => BatchOutcome {
                doc_id: Some(doc_id),
                err: None,
            },
            Err(e) => {
                tracing::warn!(index, error = %e, "batch index failed for record");
                BatchOutcome {
                    doc_id: None,
                    err: Some(e.to_string()),
                }
            }
        },
        DocRecord { err, .. } => BatchOutcome {
            doc_id: None,
            err: err.or_else(|| Some("malformed record".to_string())),
        },
    }
}

/// Ties the registry, schema CRUD, and query assembly together behind the
/// operations named in the external HTTP-route table (§6).
pub struct Service {
    root_dir: PathBuf,
    tz_offset_secs: i32,
    registry: Arc<Registry>,
}

impl Service {
    /// Build a `Service` and start its registry's worker pool / LRU ticker.
    #[must_use]
    pub fn start(root_dir: PathBuf, tz_offset_secs: i32, worker_num: usize, lru_minutes: i64) -> Self {
        let registry = Arc::new(Registry::new(root_dir.clone(), tz_offset_secs));
        registry.start(worker_num, lru_minutes);
        Self {
            root_dir,
            tz_offset_secs,
            registry,
        }
    }

    /// `GET /health`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.registry.is_running()
    }

    /// Stop accepting mutations, drain inflight ones, and close every engine.
    pub fn stop(&self) {
        self.registry.stop();
    }

    /// `GET /schema/:index`.
    pub fn get_schema(&self, index: &str) -> IndexResult<Schema> {
        Schema::load(&self.root_dir, index).map_err(Into::into)
    }

    /// `POST /schema/:index`. Fails with `AlreadyExists` if the index exists.
    pub fn create_schema(&self, index: &str, conf: SchemaConf) -> IndexResult<Schema> {
        Schema::save(&self.root_dir, index, conf).map_err(Into::into)
    }

    /// `DELETE /schema/:index`: remove the on-disk schema and close its engine.
    pub fn delete_schema(&self, index: &str) -> IndexResult<()> {
        self.registry.remove_indexer(index);
        Schema::delete(&self.root_dir, index).map_err(Into::into)
    }

    /// `PUT /schema/:index/:new`: rename on disk and drop the old registry entry.
    pub fn rename_schema(&self, old: &str, new: &str) -> IndexResult<()> {
        Schema::rename(&self.root_dir, old, new)?;
        self.registry.remove_indexer(old);
        Ok(())
    }

    /// `PUT /doc/:index`.
    pub fn index_doc(&self, index: &str, doc: &serde_json::Map<String, serde_json::Value>) -> IndexResult<String> {
        self.registry.index_doc(index, doc)
    }

    /// `PUT /update/:index`.
    pub fn update_doc(&self, index: &str, doc: &serde_json::Map<String, serde_json::Value>) -> IndexResult<String> {
        self.registry.update_doc(index, doc)
    }

    /// `DELETE /doc/:index`.
    pub fn remove_doc(&self, index: &str, doc_id: &str) -> IndexResult<()> {
        self.registry.remove_doc(index, doc_id)
    }

    /// `DELETE /docs/:index`: best-effort, reports the first failure (if any)
    /// but attempts every id regardless (matching §7's "abort the current
    /// operation" scoping to the per-id unit, not the whole batch).
    pub fn remove_docs(&self, index: &str, doc_ids: &[String]) -> IndexResult<()> {
        let mut first_err = None;
        for doc_id in doc_ids {
            if let Err(e) = self.registry.remove_doc(index, doc_id)
                && first_err.is_none()
            {
                first_err = Some(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// `PUT /docs/:index`: decode `reader` per `format`, indexing every
    /// well-formed record and collecting per-record outcomes without
    /// aborting the batch on a single bad record (§7).
    pub fn index_docs(&self, index: &str, format: BatchFormat, reader: &mut dyn Read) -> IndexResult<Vec<BatchOutcome>> {
        index_batch(&self.registry, index, format, reader)
    }

    /// `PUT /docs/:index?cb=url`: run the batch on a background thread and
    /// return immediately, matching the "accepted ack now, notify later"
    /// contract of §4.4/§6. The transport owns spilling the upload to
    /// `bytes` (and unlinking any temp file it used to do so, per §1's
    /// scoping of the upload handler) and owns turning `BatchReport` into
    /// the `{code,msg,index,docs}` POST to the caller's `cb` URL; this
    /// crate only runs the batch to completion and calls `sink.notify` once.
    pub fn index_docs_async(
        &self,
        index: &str,
        format: BatchFormat,
        bytes: Vec<u8>,
        sink: impl BatchCompletionSink,
    ) {
        let registry = Arc::clone(&self.registry);
        let index = index.to_string();
        std::thread::spawn(move || {
            let mut cursor = std::io::Cursor::new(bytes);
            let report = match index_batch(&registry, &index, format, &mut cursor) {
                Ok(docs) => BatchReport {
                    code: 0,
                    msg: "ok".to_string(),
                    index: index.clone(),
                    docs,
                },
                Err(e) => {
                    tracing::warn!(index, error = %e, "async batch ingestion failed");
                    BatchReport {
                        code: 1,
                        msg: e.to_string(),
                        index: index.clone(),
                        docs: Vec::new(),
                    }
                }
            };
            sink.notify(report);
        });
    }

    /// `GET /search/:index`. The seven raw query parameters are parsed and
    /// assembled against `index`'s schema, then run synchronously.
    #[allow(clippy::too_many_arguments)]
    pub fn search(
        &self,
        index: &str,
        q: &str,
        fq: &str,
        s: &str,
        f: &str,
        page: &str,
        pagesize: &str,
        fl: &str,
    ) -> IndexResult<SearchResult> {
        if !self.registry.is_running() {
            return Err(IndexError::ServiceStopped);
        }
        let (schema, _engine) = self.registry.get_or_init(index)?;
        let parsed = parse_query(q, fq, s, f, page, pagesize, fl);
        let request = assemble_search_request(&schema, &parsed, self.tz_offset_secs)?;
        let offset = request.offset;
        let rows = request.max_outputs;
        let response = self.registry.search(index, &request)?;
        let pagination = Pagination::compute(response.total, offset, rows, response.docs.len());
        let timeout = response.timeout;
        let docs = project_response(&schema, response, parsed.output_fields.as_deref(), self.tz_offset_secs)?;
        Ok(SearchResult { pagination, timeout, docs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_core::field::{Field as RawField, FieldTypeRaw, Sorting, TokenizerRaw};
    use tempfile::tempdir;

    fn field(name: &str, pk: bool, ty: &str, tokenizer: &str) -> RawField {
        RawField {
            name: name.into(),
            pk,
            field_type: FieldTypeRaw(ty.into()),
            tokenizer: TokenizerRaw(tokenizer.into()),
            time_fmt: String::new(),
            sorting: Sorting::None,
        }
    }

    #[test]
    fn s1_index_then_search_by_zh_term_round_trips() {
        let dir = tempdir().unwrap();
        let service = Service::start(dir.path().to_path_buf(), 0, 2, 0);
        let conf = SchemaConf {
            shards: 0,
            fields: vec![field("id", true, "i32", ""), field("text", false, "str", "zh")],
        };
        service.create_schema("articles", conf).unwrap();

        let mut doc = serde_json::Map::new();
        doc.insert("id".into(), serde_json::json!(1));
        doc.insert("text".into(), serde_json::json!("日文的之"));
        let doc_id = service.index_doc("articles", &doc).unwrap();
        assert_eq!(doc_id, "1");

        let resp = service.search("articles", "之", "", "", "", "", "", "").unwrap();
        assert_eq!(resp.pagination.total, 1);
        assert_eq!(resp.docs[0].doc_id, "1");

        service.stop();
    }

    #[test]
    fn health_reflects_start_stop() {
        let dir = tempdir().unwrap();
        let service = Service::start(dir.path().to_path_buf(), 0, 1, 0);
        assert!(service.is_running());
        service.stop();
        assert!(!service.is_running());
    }

    #[test]
    fn async_batch_notifies_sink_once_with_full_report() {
        use std::sync::{mpsc, Mutex};

        struct ChannelSink(Mutex<mpsc::Sender<BatchReport>>);
        impl BatchCompletionSink for ChannelSink {
            fn notify(&self, report: BatchReport) {
                let _ = self.0.lock().unwrap().send(report);
            }
        }

        let dir = tempdir().unwrap();
        let service = Service::start(dir.path().to_path_buf(), 0, 2, 0);
        let conf = SchemaConf {
            shards: 0,
            fields: vec![field("id", true, "i32", ""), field("body", false, "str", "space")],
        };
        service.create_schema("rows", conf).unwrap();

        let (tx, rx) = mpsc::channel();
        let csv_bytes = b"id,body\n1,foo\n2,bar\n".to_vec();
        service.index_docs_async("rows", BatchFormat::Csv, csv_bytes, ChannelSink(Mutex::new(tx)));

        let report = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(report.code, 0);
        assert_eq!(report.index, "rows");
        assert_eq!(report.docs.len(), 2);
        assert!(report.docs.iter().all(|d| d.err.is_none()));

        let hits = service.search("rows", "foo", "", "", "", "", "", "").unwrap();
        assert_eq!(hits.pagination.total, 1);

        service.stop();
    }

    #[test]
    fn empty_q_matches_every_document() {
        let dir = tempdir().unwrap();
        let service = Service::start(dir.path().to_path_buf(), 0, 2, 0);
        let conf = SchemaConf {
            shards: 0,
            fields: vec![field("id", true, "i32", ""), field("body", false, "str", "space")],
        };
        service.create_schema("rows", conf).unwrap();

        for (id, body) in [(1, "foo"), (2, "bar"), (3, "baz")] {
            let mut doc = serde_json::Map::new();
            doc.insert("id".into(), serde_json::json!(id));
            doc.insert("body".into(), serde_json::json!(body));
            service.index_doc("rows", &doc).unwrap();
        }

        let resp = service.search("rows", "", "", "", "", "", "", "").unwrap();
        assert_eq!(resp.pagination.total, 3);

        service.stop();
    }

    #[test]
    fn fl_projects_fields_and_formats_datetime_output() {
        let dir = tempdir().unwrap();
        let service = Service::start(dir.path().to_path_buf(), 0, 1, 0);
        let conf = SchemaConf {
            shards: 0,
            fields: vec![
                field("id", true, "i32", ""),
                field("body", false, "str", "space"),
                field("created", false, "date", ""),
            ],
        };
        service.create_schema("events", conf).unwrap();

        let mut doc = serde_json::Map::new();
        doc.insert("id".into(), serde_json::json!(1));
        doc.insert("body".into(), serde_json::json!("hello"));
        doc.insert("created".into(), serde_json::json!("2024-01-15"));
        service.index_doc("events", &doc).unwrap();

        let resp = service.search("events", "hello", "", "", "", "", "", "id,created").unwrap();
        assert_eq!(resp.docs.len(), 1);
        let stored = &resp.docs[0].stored;
        assert!(stored.contains_key("id"));
        assert!(stored.contains_key("created"));
        assert!(!stored.contains_key("body"));
        assert_eq!(stored.get("created").unwrap(), &NativeValue::Str("2024-01-15".to_string()));

        service.stop();
    }

    #[test]
    fn pagination_reports_total_pages_and_curr_page() {
        let dir = tempdir().unwrap();
        let service = Service::start(dir.path().to_path_buf(), 0, 1, 0);
        let conf = SchemaConf {
            shards: 0,
            fields: vec![field("id", true, "i32", "")],
        };
        service.create_schema("t", conf).unwrap();

        for id in 1..=5 {
            let mut doc = serde_json::Map::new();
            doc.insert("id".into(), serde_json::json!(id));
            service.index_doc("t", &doc).unwrap();
        }

        let resp = service.search("t", "", "", "", "", "2", "2", "").unwrap();
        assert_eq!(resp.pagination.total, 5);
        assert_eq!(resp.pagination.page_size, 2);
        assert_eq!(resp.pagination.pages, 3);
        assert_eq!(resp.pagination.curr_page, 2);
        assert_eq!(resp.pagination.page_count, resp.docs.len());

        service.stop();
    }

    #[test]
    fn delete_schema_removes_from_disk() {
        let dir = tempdir().unwrap();
        let service = Service::start(dir.path().to_path_buf(), 0, 1, 0);
        let conf = SchemaConf {
            shards: 0,
            fields: vec![field("id", true, "i32", "")],
        };
        service.create_schema("t", conf).unwrap();
        service.delete_schema("t").unwrap();
        assert!(service.get_schema("t").is_err());
        service.stop();
    }
}
