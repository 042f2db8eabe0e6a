//! The indexer registry and its worker pool (§4.7): one `SearchEngine` per
//! managed schema, mutated only through a bounded channel so every write to
//! a given engine is serialized relative to every other write in the system.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;

/// Bound on the mutation channel (§5: "bounded queue ⇒ natural backpressure").
/// A submitter blocks once this many ops are queued rather than growing
/// memory without limit.
const MUTATION_CHANNEL_CAPACITY: usize = 1024;

use search_core::Schema;

use crate::document::{encode_document, EncodedDocument, StoredDoc};
use crate::engine::{IndexedDoc, SearchEngine, SearchRequest};
use crate::error::{IndexError, IndexResult};
use crate::lru::Lru;
use crate::tantivy_engine::TantivyEngine;

/// One registered index: its resolved schema plus the engine backing it.
struct Entry {
    schema: Arc<Schema>,
    engine: Arc<dyn SearchEngine>,
}

enum Op {
    Index { engine: Arc<dyn SearchEngine>, doc_id: String, doc: IndexedDoc },
    Delete { engine: Arc<dyn SearchEngine>, doc_id: String },
    Flush { engine: Arc<dyn SearchEngine> },
}

/// Owns the registry map, the mutation channel, the worker threads, and the
/// LRU lifecycle manager (§4.7, §4.8). One instance per running service.
pub struct Registry {
    root_dir: PathBuf,
    tz_offset_secs: i32,
    entries: RwLock<HashMap<String, Entry>>,
    sender: RwLock<Option<SyncSender<Op>>>,
    workers: RwLock<Vec<JoinHandle<()>>>,
    lru: Lru,
}

impl Registry {
    #[must_use]
    pub fn new(root_dir: PathBuf, tz_offset_secs: i32) -> Self {
        Self {
            root_dir,
            tz_offset_secs,
            entries: RwLock::new(HashMap::new()),
            sender: RwLock::new(None),
            workers: RwLock::new(Vec::new()),
            lru: Lru::new(),
        }
    }

    /// `true` once `start` has run and before `stop` completes (§4.7's
    /// `NEW → RUNNING → STOPPED` state machine).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sender.read().expect("registry lock poisoned").is_some()
    }

    /// Start `worker_num` worker threads draining the mutation channel, and
    /// the LRU ticker (if `lru_minutes > 0`).
    pub fn start(self: &Arc<Self>, worker_num: usize, lru_minutes: i64) {
        let (tx, rx) = mpsc::sync_channel::<Op>(MUTATION_CHANNEL_CAPACITY);
        let rx = Arc::new(std::sync::Mutex::new(rx));

        let mut workers = Vec::with_capacity(worker_num.max(1));
        for _ in 0..worker_num.max(1) {
            let rx = Arc::clone(&rx);
            workers.push(std::thread::spawn(move || worker_loop(&rx)));
        }

        *self.sender.write().expect("registry lock poisoned") = Some(tx);
        *self.workers.write().expect("registry lock poisoned") = workers;

        if lru_minutes > 0 {
            self.lru.start_ticker(Arc::clone(self), lru_minutes);
        }
        tracing::info!(worker_num, lru_minutes, "indexer registry started");
    }

    /// Stop accepting new mutations, drain inflight ones, join every worker,
    /// stop the LRU ticker, then close every registered engine.
    pub fn stop(&self) {
        let sender = self.sender.write().expect("registry lock poisoned").take();
        drop(sender);

        let workers = std::mem::take(&mut *self.workers.write().expect("registry lock poisoned"));
        for worker in workers {
            let _ = worker.join();
        }
        self.lru.stop();

        let mut entries = self.entries.write().expect("registry lock poisoned");
        for (name, entry) in entries.drain() {
            if let Err(e) = entry.engine.close() {
                tracing::warn!(name, error = %e, "error closing index on shutdown");
            }
        }
        tracing::info!("indexer registry stopped");
    }

    /// Look up (or lazily open) the engine+schema for `index`, touching the
    /// LRU on both hit and miss (§4.7 step 1/2).
    pub fn get_or_init(&self, index: &str) -> IndexResult<(Arc<Schema>, Arc<dyn SearchEngine>)> {
        {
            let entries = self.entries.read().expect("registry lock poisoned");
            if let Some(entry) = entries.get(index) {
                self.lru.touch(index);
                return Ok((Arc::clone(&entry.schema), Arc::clone(&entry.engine)));
            }
        }

        let schema = Arc::new(Schema::load(&self.root_dir, index)?);
        let engine: Arc<dyn SearchEngine> = Arc::new(TantivyEngine::open_or_create(&schema.store_path)?);
        engine.flush()?;

        let mut entries = self.entries.write().expect("registry lock poisoned");
        let entry = entries.entry(index.to_string()).or_insert(Entry {
            schema,
            engine,
        });
        self.lru.touch(index);
        Ok((Arc::clone(&entry.schema), Arc::clone(&entry.engine)))
    }

    /// Remove `index` from the registry and close its engine asynchronously
    /// (§4.7: used by schema delete/rename and by LRU eviction).
    pub fn remove_indexer(&self, index: &str) {
        let removed = self.entries.write().expect("registry lock poisoned").remove(index);
        if let Some(entry) = removed {
            let name = index.to_string();
            std::thread::spawn(move || {
                if let Err(e) = entry.engine.close() {
                    tracing::warn!(name, error = %e, "error closing evicted index");
                }
            });
        }
    }

    fn submit(&self, op: Op) -> IndexResult<()> {
        let sender = self.sender.read().expect("registry lock poisoned");
        match sender.as_ref() {
            Some(tx) => tx.send(op).map_err(|_| IndexError::ServiceStopped),
            None => Err(IndexError::ServiceStopped),
        }
    }

    /// Encode `doc` against `index`'s schema, submit it for indexing, flush,
    /// and return the synthesized `docId`.
    pub fn index_doc(&self, index: &str, doc: &serde_json::Map<String, serde_json::Value>) -> IndexResult<String> {
        if !self.is_running() {
            return Err(IndexError::ServiceStopped);
        }
        let (schema, engine) = self.get_or_init(index)?;
        let EncodedDocument { doc_id, stored, tokens } = encode_document(&schema, doc, self.tz_offset_secs)?;

        tracing::debug!(index, doc_id, "dispatching index_doc");
        self.submit(Op::Index {
            engine: Arc::clone(&engine),
            doc_id: doc_id.clone(),
            doc: IndexedDoc { tokens, stored },
        })?;
        self.submit(Op::Flush { engine })?;
        Ok(doc_id)
    }

    /// Read-merge-write (§4.7): fetch the existing stored doc by its derived
    /// `docId`, merge `doc`'s fields over it, then index the merge. Behaves
    /// as a plain insert when no prior doc exists.
    pub fn update_doc(&self, index: &str, doc: &serde_json::Map<String, serde_json::Value>) -> IndexResult<String> {
        if !self.is_running() {
            return Err(IndexError::ServiceStopped);
        }
        let (schema, engine) = self.get_or_init(index)?;

        // The doc_id is a pure function of the PK fields (§3), so the prior
        // version (if any) can be looked up directly rather than re-running
        // a PK-filtered search.
        let doc_id = encode_document(&schema, doc, self.tz_offset_secs)?.doc_id;
        if let Some(existing) = engine.get_doc(&doc_id)? {
            let mut merged = stored_doc_to_json(&existing);
            for (k, v) in doc {
                merged.insert(k.clone(), v.clone());
            }
            return self.index_doc(index, &merged);
        }
        self.index_doc(index, doc)
    }

    /// Submit a removal for `doc_id`, flush, and return once dispatched.
    pub fn remove_doc(&self, index: &str, doc_id: &str) -> IndexResult<()> {
        if !self.is_running() {
            return Err(IndexError::ServiceStopped);
        }
        let (_, engine) = self.get_or_init(index)?;
        tracing::debug!(index, doc_id, "dispatching remove_doc");
        self.submit(Op::Delete {
            engine: Arc::clone(&engine),
            doc_id: doc_id.to_string(),
        })?;
        self.submit(Op::Flush { engine })
    }

    /// Execute `req` synchronously against `index`'s engine (queries never
    /// cross the mutation channel, §5).
    pub fn search(&self, index: &str, req: &SearchRequest) -> IndexResult<crate::engine::SearchResponse> {
        let (_, engine) = self.get_or_init(index)?;
        engine.search(req)
    }
}

fn stored_doc_to_json(stored: &StoredDoc) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::with_capacity(stored.len());
    for (k, v) in stored {
        if let Ok(json) = serde_json::to_value(v) {
            map.insert(k.clone(), json);
        }
    }
    map
}

fn worker_loop(rx: &Arc<std::sync::Mutex<Receiver<Op>>>) {
    loop {
        let op = {
            let guard = rx.lock().expect("mutation channel mutex poisoned");
            guard.recv()
        };
        let Ok(op) = op else {
            break;
        };
        match op {
            Op::Index { engine, doc_id, doc } => {
                if let Err(e) = engine.index_doc(&doc_id, doc) {
                    tracing::warn!(doc_id, error = %e, "index_doc failed");
                }
            }
            Op::Delete { engine, doc_id } => {
                if let Err(e) = engine.remove_doc(&doc_id) {
                    tracing::warn!(doc_id, error = %e, "remove_doc failed");
                }
            }
            Op::Flush { engine } => {
                if let Err(e) = engine.flush() {
                    tracing::warn!(error = %e, "flush failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_core::field::{Field as RawField, FieldTypeRaw, Sorting, TokenizerRaw};
    use search_core::schema::SchemaConf;
    use tempfile::tempdir;

    fn field(name: &str, pk: bool, ty: &str) -> RawField {
        RawField {
            name: name.into(),
            pk,
            field_type: FieldTypeRaw(ty.into()),
            tokenizer: TokenizerRaw::default(),
            time_fmt: String::new(),
            sorting: Sorting::None,
        }
    }

    #[test]
    fn index_doc_before_start_is_rejected() {
        let dir = tempdir().unwrap();
        let conf = SchemaConf {
            shards: 0,
            fields: vec![field("id", true, "i32")],
        };
        Schema::save(dir.path(), "t", conf).unwrap();

        let registry = Registry::new(dir.path().to_path_buf(), 0);
        let mut doc = serde_json::Map::new();
        doc.insert("id".into(), serde_json::json!(1));
        let err = registry.index_doc("t", &doc).unwrap_err();
        assert_eq!(err.error_code(), "SERVICE_STOPPED");
    }

    #[test]
    fn stop_then_reject_new_mutations() {
        let dir = tempdir().unwrap();
        let conf = SchemaConf {
            shards: 0,
            fields: vec![field("id", true, "i32")],
        };
        Schema::save(dir.path(), "t", conf).unwrap();

        let registry = Arc::new(Registry::new(dir.path().to_path_buf(), 0));
        registry.start(2, 0);
        assert!(registry.is_running());
        registry.stop();
        assert!(!registry.is_running());

        let mut doc = serde_json::Map::new();
        doc.insert("id".into(), serde_json::json!(1));
        assert!(registry.index_doc("t", &doc).is_err());
    }
}
