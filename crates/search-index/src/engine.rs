//! The narrow interface the core consumes an inverted-index engine through
//! (§1, §9: "Scorer callback object"). Anything implementing `SearchEngine`
//! can stand in; `tantivy_engine::TantivyEngine` is the one this workspace
//! ships so the crate is runnable end-to-end.

use std::sync::Arc;

use crate::document::{StoredDoc, Token};
use crate::error::IndexResult;

/// One document submitted for indexing: its merged token stream and the
/// native-typed fields to store alongside it.
#[derive(Debug, Clone)]
pub struct IndexedDoc {
    pub tokens: Vec<Token>,
    pub stored: StoredDoc,
}

/// A boolean term query against the engine's token field, plus the scorer
/// that turns each surviving candidate into a sort-key vector (or an empty
/// vector to suppress it) and the paging window to apply after scoring.
pub struct SearchRequest {
    pub must: Vec<String>,
    pub should: Vec<String>,
    pub not_in: Vec<String>,
    pub offset: usize,
    pub max_outputs: usize,
    pub scorer: Arc<dyn crate::scorer::Scorer>,
}

/// One scored, filtered candidate surviving `SearchRequest::scorer`.
#[derive(Debug, Clone)]
pub struct ScoredDoc {
    pub doc_id: String,
    pub stored: StoredDoc,
    pub sort_key: Vec<f64>,
}

/// An engine's response to `SearchEngine::search`: the total number of
/// documents that survived scoring/filtering, and the page of results the
/// request's `offset`/`max_outputs` selected.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub total: usize,
    pub docs: Vec<ScoredDoc>,
    pub timeout: bool,
}

/// The narrow interface an inverted-index engine must implement. Every
/// method may be called concurrently with `search`, but `index_doc` /
/// `remove_doc` / `flush` for a given engine instance are only ever called
/// from the registry's serialized worker pool (§4.7) — implementations do
/// not need to guard against concurrent *writers*, only concurrent
/// writer-vs-reader access.
pub trait SearchEngine: Send + Sync {
    /// Insert or replace the document named `doc_id`.
    fn index_doc(&self, doc_id: &str, doc: IndexedDoc) -> IndexResult<()>;

    /// Remove the document named `doc_id`, if present.
    fn remove_doc(&self, doc_id: &str) -> IndexResult<()>;

    /// Commit pending writes, making them visible to subsequent searches.
    fn flush(&self) -> IndexResult<()>;

    /// Release all resources held by this engine instance.
    fn close(&self) -> IndexResult<()>;

    /// Execute `req` and return the scored, paginated result set.
    fn search(&self, req: &SearchRequest) -> IndexResult<SearchResponse>;

    /// Fetch the stored fields for `doc_id` directly, bypassing scoring.
    /// Used by `update_doc`'s read-merge-write (§4.7) to look up the prior
    /// version of a document without needing every PK field tokenized.
    fn get_doc(&self, doc_id: &str) -> IndexResult<Option<StoredDoc>>;
}
