//! Tokenizer, query parser, document encoder, scorer, indexer registry, and
//! service facade for the search engine crate. `search-core` owns the schema
//! and configuration types this crate builds on.

pub mod assemble;
pub mod document;
pub mod engine;
pub mod error;
pub mod lru;
pub mod query;
pub mod registry;
pub mod scorer;
pub mod service;
pub mod tantivy_engine;
pub mod tokenizer;

pub use document::{BatchFormat, StoredDoc, Token, ALL_DOCS_TOKEN};
pub use engine::{IndexedDoc, ScoredDoc, SearchEngine, SearchRequest, SearchResponse};
pub use error::{IndexError, IndexResult};
pub use query::{parse_query, ParsedQuery};
pub use registry::Registry;
pub use scorer::{QueryScorer, Scorer};
pub use service::{BatchCompletionSink, BatchOutcome, BatchReport, Pagination, ResultDoc, SearchResult, Service};
pub use tantivy_engine::TantivyEngine;
