//! The `tantivy`-backed `SearchEngine` implementation. Every document's
//! merged token stream (§4.4) is inserted as a single `PreTokenizedString`
//! field so positions line up exactly with `merge_token_locs`'s output;
//! proximity (§4.5, §9 open question d) is then read back out of that
//! field's own posting lists rather than recomputed by hand.

use std::path::Path;
use std::sync::Mutex;

use tantivy::collector::{Collector, SegmentCollector};
use tantivy::index::SegmentReader;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Schema as TantivySchema, TextFieldIndexing, TextOptions, Value, STORED, STRING};
use tantivy::tokenizer::PreTokenizedString;
use tantivy::{DocAddress, DocId, Index, IndexReader, IndexWriter, ReloadPolicy, Score, Term, TantivyDocument};

use search_core::NativeValue;

use crate::document::{StoredDoc, Token};
use crate::engine::{IndexedDoc, ScoredDoc, SearchEngine, SearchRequest, SearchResponse};
use crate::error::{IndexError, IndexResult};

const DOC_ID_FIELD: &str = "doc_id";
const TOKENS_FIELD: &str = "tokens";
const PAYLOAD_FIELD: &str = "payload";

/// Field handles into the fixed schema every index in this crate shares.
#[derive(Debug, Clone, Copy)]
struct Fields {
    doc_id: tantivy::schema::Field,
    tokens: tantivy::schema::Field,
    payload: tantivy::schema::Field,
}

fn build_schema() -> (TantivySchema, Fields) {
    let mut builder = TantivySchema::builder();
    let doc_id = builder.add_text_field(DOC_ID_FIELD, STRING | STORED);
    let tokens_indexing = TextFieldIndexing::default()
        .set_tokenizer("raw")
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let tokens_options = TextOptions::default().set_indexing_options(tokens_indexing);
    let tokens = builder.add_text_field(TOKENS_FIELD, tokens_options);
    let payload = builder.add_text_field(PAYLOAD_FIELD, STORED);
    (builder.build(), Fields { doc_id, tokens, payload })
}

/// One `tantivy::Index` per schema (§4.7: the registry owns one `TantivyEngine`
/// per managed index). Writes are serialized behind a mutex because
/// `IndexWriter::add_document`/`delete_term`/`commit` need `&mut self`, even
/// though every `SearchEngine` method here only borrows `&self`.
pub struct TantivyEngine {
    index: Index,
    fields: Fields,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
}

/// Default heap size handed to `IndexWriter::new` (15 MB), comfortably above
/// tantivy's own minimum and adequate for the modest per-index write volume
/// this service expects (one registry worker thread per index, §4.7).
const WRITER_HEAP_BYTES: usize = 15_000_000;

impl TantivyEngine {
    /// Open the index rooted at `dir`, creating it (and `dir`) if absent.
    pub fn open_or_create(dir: &Path) -> IndexResult<Self> {
        let (schema, fields) = build_schema();

        let index = if dir.join("meta.json").exists() {
            Index::open_in_dir(dir).map_err(|e| IndexError::engine(e.to_string()))?
        } else {
            std::fs::create_dir_all(dir)?;
            Index::create_in_dir(dir, schema).map_err(|e| IndexError::engine(e.to_string()))?
        };

        Self::from_index(index, fields)
    }

    /// An in-memory index, used by tests and by the LRU's short-lived probes.
    #[cfg(test)]
    pub fn open_in_ram() -> IndexResult<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        Self::from_index(index, fields)
    }

    fn from_index(index: Index, fields: Fields) -> IndexResult<Self> {
        let writer = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| IndexError::engine(e.to_string()))?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| IndexError::engine(e.to_string()))?;

        Ok(Self {
            index,
            fields,
            writer: Mutex::new(writer),
            reader,
        })
    }

    fn pretokenize(tokens: &[Token]) -> PreTokenizedString {
        let mut entries: Vec<(i64, &str)> = tokens
            .iter()
            .flat_map(|t| t.locations.iter().map(move |&loc| (loc, t.text.as_str())))
            .collect();
        entries.sort_by_key(|&(loc, _)| loc);

        let inner = entries
            .into_iter()
            .enumerate()
            .map(|(i, (loc, text))| tantivy::tokenizer::Token {
                offset_from: i,
                offset_to: i + 1,
                position: usize::try_from(loc).unwrap_or(i),
                text: text.to_string(),
                position_length: 1,
            })
            .collect();

        PreTokenizedString {
            text: String::new(),
            tokens: inner,
        }
    }

    fn stored_doc_json(stored: &StoredDoc) -> IndexResult<String> {
        serde_json::to_string(stored).map_err(|e| IndexError::engine(e.to_string()))
    }

    fn payload_to_stored(raw: &str) -> IndexResult<StoredDoc> {
        serde_json::from_str(raw).map_err(|e| IndexError::engine(e.to_string()))
    }

    fn term_query(&self, token: &str) -> Box<dyn Query> {
        Box::new(TermQuery::new(
            Term::from_field_text(self.fields.tokens, token),
            IndexRecordOption::WithFreqsAndPositions,
        ))
    }

    fn boolean_query(&self, req: &SearchRequest) -> Box<dyn Query> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for token in &req.must {
            clauses.push((Occur::Must, self.term_query(token)));
        }
        for token in &req.should {
            clauses.push((Occur::Should, self.term_query(token)));
        }
        for token in &req.not_in {
            clauses.push((Occur::MustNot, self.term_query(token)));
        }
        Box::new(BooleanQuery::new(clauses))
    }
}

impl SearchEngine for TantivyEngine {
    fn index_doc(&self, doc_id: &str, doc: IndexedDoc) -> IndexResult<()> {
        let mut writer = self.writer.lock().expect("tantivy writer mutex poisoned");
        writer.delete_term(Term::from_field_text(self.fields.doc_id, doc_id));

        let mut tdoc = TantivyDocument::default();
        tdoc.add_text(self.fields.doc_id, doc_id);
        tdoc.add_pretokenized_text(self.fields.tokens, Self::pretokenize(&doc.tokens));
        tdoc.add_text(self.fields.payload, Self::stored_doc_json(&doc.stored)?);

        writer
            .add_document(tdoc)
            .map_err(|e| IndexError::engine(e.to_string()))?;
        Ok(())
    }

    fn remove_doc(&self, doc_id: &str) -> IndexResult<()> {
        let writer = self.writer.lock().expect("tantivy writer mutex poisoned");
        writer.delete_term(Term::from_field_text(self.fields.doc_id, doc_id));
        Ok(())
    }

    fn flush(&self) -> IndexResult<()> {
        {
            let mut writer = self.writer.lock().expect("tantivy writer mutex poisoned");
            writer.commit().map_err(|e| IndexError::engine(e.to_string()))?;
        }
        self.reader.reload().map_err(|e| IndexError::engine(e.to_string()))?;
        Ok(())
    }

    fn close(&self) -> IndexResult<()> {
        self.flush()
    }

    fn get_doc(&self, doc_id: &str) -> IndexResult<Option<StoredDoc>> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.fields.doc_id, doc_id),
            IndexRecordOption::Basic,
        );
        let hits = searcher
            .search(&query, &tantivy::collector::TopDocs::with_limit(1))
            .map_err(|e| IndexError::engine(e.to_string()))?;
        let Some((_, addr)) = hits.into_iter().next() else {
            return Ok(None);
        };
        let tdoc: TantivyDocument = searcher.doc(addr).map_err(|e| IndexError::engine(e.to_string()))?;
        let Some(payload) = tdoc.get_first(self.fields.payload).and_then(|v| v.as_str()) else {
            return Ok(None);
        };
        Ok(Some(Self::payload_to_stored(payload)?))
    }

    fn search(&self, req: &SearchRequest) -> IndexResult<SearchResponse> {
        let searcher = self.reader.searcher();
        let query = self.boolean_query(req);

        let proximity_collector = ProximityCollector {
            tokens_field: self.fields.tokens,
            terms: req
                .must
                .iter()
                .chain(req.should.iter())
                .cloned()
                .collect(),
        };

        let candidates = searcher
            .search(query.as_ref(), &proximity_collector)
            .map_err(|e| IndexError::engine(e.to_string()))?;

        let mut scored = Vec::with_capacity(candidates.len());
        for (addr, proximity, bm25) in candidates {
            let tdoc: TantivyDocument = searcher
                .doc(addr)
                .map_err(|e| IndexError::engine(e.to_string()))?;
            let Some(doc_id) = tdoc
                .get_first(self.fields.doc_id)
                .and_then(|v| v.as_str())
                .map(str::to_string)
            else {
                continue;
            };
            let Some(payload) = tdoc.get_first(self.fields.payload).and_then(|v| v.as_str()) else {
                continue;
            };
            let stored = Self::payload_to_stored(payload)?;

            let sort_key = req.scorer.score(proximity, bm25, &stored);
            if sort_key.is_empty() {
                continue;
            }

            scored.push(ScoredDoc { doc_id, stored, sort_key });
        }

        scored.sort_by(|a, b| {
            b.sort_key
                .partial_cmp(&a.sort_key)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let total = scored.len();
        let page = scored
            .into_iter()
            .skip(req.offset)
            .take(req.max_outputs.max(1))
            .collect();

        Ok(SearchResponse {
            total,
            docs: page,
            timeout: false,
        })
    }
}

/// A collector that, for every candidate surviving the boolean query,
/// computes (a) the native BM25 score and (b) the minimum token-position
/// window spanning one occurrence of every queried term (§4.5). A term that
/// never occurs in the candidate document yields `usize::MAX` (§9 open
/// question d): the document can still surface via `should`, but never wins
/// a proximity-ordered sort.
struct ProximityCollector {
    tokens_field: tantivy::schema::Field,
    terms: Vec<String>,
}

impl Collector for ProximityCollector {
    type Fruit = Vec<(DocAddress, usize, f32)>;
    type Child = ProximitySegmentCollector;

    fn for_segment(&self, segment_ord: u32, reader: &SegmentReader) -> tantivy::Result<Self::Child> {
        let inverted = reader.inverted_index(self.tokens_field)?;
        let postings: Vec<Option<tantivy::postings::SegmentPostings>> = self
            .terms
            .iter()
            .map(|text| {
                let term = Term::from_field_text(self.tokens_field, text);
                inverted.read_postings(&term, IndexRecordOption::WithFreqsAndPositions)
            })
            .collect::<tantivy::Result<_>>()?;

        Ok(ProximitySegmentCollector {
            segment_ord,
            postings,
            fruit: Vec::new(),
        })
    }

    fn requires_scoring(&self) -> bool {
        true
    }

    fn merge_fruits(&self, segment_fruits: Vec<Self::Fruit>) -> tantivy::Result<Self::Fruit> {
        Ok(segment_fruits.into_iter().flatten().collect())
    }
}

struct ProximitySegmentCollector {
    segment_ord: u32,
    postings: Vec<Option<tantivy::postings::SegmentPostings>>,
    fruit: Vec<(DocAddress, usize, f32)>,
}

impl SegmentCollector for ProximitySegmentCollector {
    type Fruit = Vec<(DocAddress, usize, f32)>;

    fn collect(&mut self, doc: DocId, score: Score) {
        use tantivy::DocSet;
        use tantivy::postings::Postings;

        let mut position_lists: Vec<Vec<u32>> = Vec::with_capacity(self.postings.len());
        for slot in &mut self.postings {
            let Some(postings) = slot else {
                position_lists.push(Vec::new());
                continue;
            };
            if postings.doc() < doc {
                postings.seek(doc);
            }
            if postings.doc() == doc {
                let mut buf = Vec::new();
                postings.positions(&mut buf);
                position_lists.push(buf);
            } else {
                position_lists.push(Vec::new());
            }
        }

        let proximity = min_window(&position_lists);
        self.fruit.push((
            DocAddress::new(self.segment_ord, doc),
            proximity,
            score,
        ));
    }

    fn harvest(self) -> Self::Fruit {
        self.fruit
    }
}

/// The smallest window (in position units) containing at least one entry
/// from every non-empty list, minus `(list_count - 1)` (§4.5). `usize::MAX`
/// if any required list is empty (its term never occurred in this document).
fn min_window(lists: &[Vec<u32>]) -> usize {
    if lists.is_empty() {
        return 0;
    }
    if lists.iter().any(Vec::is_empty) {
        return usize::MAX;
    }

    let mut idx = vec![0usize; lists.len()];
    let mut best = usize::MAX;

    loop {
        let mut min_pos = u32::MAX;
        let mut max_pos = 0u32;
        let mut min_list = 0;
        for (i, list) in lists.iter().enumerate() {
            let pos = list[idx[i]];
            if pos < min_pos {
                min_pos = pos;
                min_list = i;
            }
            max_pos = max_pos.max(pos);
        }

        let window = (max_pos - min_pos) as usize;
        best = best.min(window);

        idx[min_list] += 1;
        if idx[min_list] >= lists[min_list].len() {
            break;
        }
    }

    best.saturating_sub(lists.len().saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Token;
    use crate::scorer::Scorer;
    use std::sync::Arc;

    struct PassthroughScorer;
    impl Scorer for PassthroughScorer {
        fn score(&self, proximity: usize, bm25: f32, _stored: &StoredDoc) -> Vec<f64> {
            if proximity == usize::MAX {
                return Vec::new();
            }
            vec![f64::from(bm25)]
        }
    }

    fn sample_doc(text: &str) -> IndexedDoc {
        let mut stored = StoredDoc::new();
        stored.insert("body".to_string(), NativeValue::Str(text.to_string()));
        let tokens = text
            .split_whitespace()
            .enumerate()
            .map(|(i, w)| Token {
                text: w.to_string(),
                locations: vec![i as i64],
            })
            .collect();
        IndexedDoc { tokens, stored }
    }

    #[test]
    fn index_then_search_round_trips_stored_fields() {
        let engine = TantivyEngine::open_in_ram().unwrap();
        engine.index_doc("1", sample_doc("rust is fast")).unwrap();
        engine.flush().unwrap();

        let req = SearchRequest {
            must: vec!["rust".to_string()],
            should: Vec::new(),
            not_in: Vec::new(),
            offset: 0,
            max_outputs: 10,
            scorer: Arc::new(PassthroughScorer),
        };
        let resp = engine.search(&req).unwrap();
        assert_eq!(resp.total, 1);
        assert_eq!(resp.docs[0].doc_id, "1");
    }

    #[test]
    fn update_by_replace_removes_stale_tokens() {
        let engine = TantivyEngine::open_in_ram().unwrap();
        engine.index_doc("1", sample_doc("rust is fast")).unwrap();
        engine.flush().unwrap();
        engine.index_doc("1", sample_doc("go is also fast")).unwrap();
        engine.flush().unwrap();

        let req = SearchRequest {
            must: vec!["rust".to_string()],
            should: Vec::new(),
            not_in: Vec::new(),
            offset: 0,
            max_outputs: 10,
            scorer: Arc::new(PassthroughScorer),
        };
        let resp = engine.search(&req).unwrap();
        assert_eq!(resp.total, 0);
    }

    #[test]
    fn remove_doc_then_flush_drops_it_from_search() {
        let engine = TantivyEngine::open_in_ram().unwrap();
        engine.index_doc("1", sample_doc("hello world")).unwrap();
        engine.flush().unwrap();
        engine.remove_doc("1").unwrap();
        engine.flush().unwrap();

        let req = SearchRequest {
            must: vec!["hello".to_string()],
            should: Vec::new(),
            not_in: Vec::new(),
            offset: 0,
            max_outputs: 10,
            scorer: Arc::new(PassthroughScorer),
        };
        let resp = engine.search(&req).unwrap();
        assert_eq!(resp.total, 0);
    }

    #[test]
    fn min_window_returns_max_when_a_term_never_occurs() {
        let lists = vec![vec![0, 5], Vec::new()];
        assert_eq!(min_window(&lists), usize::MAX);
    }

    #[test]
    fn min_window_picks_tightest_span() {
        let lists = vec![vec![0, 10], vec![1]];
        assert_eq!(min_window(&lists), 0);
    }
}
