//! Indexing throughput and search latency at a few corpus sizes, mirroring
//! the shape (not the scale) of this codebase family's own Tantivy
//! benchmarks: seed a corpus, measure build cost, then measure steady-state
//! query cost against it.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use search_core::field::{Field as RawField, FieldTypeRaw, Sorting, TokenizerRaw};
use search_core::schema::SchemaConf;
use search_core::Schema;
use search_index::document::encode_document;
use search_index::engine::{SearchEngine, SearchRequest};
use search_index::scorer::QueryScorer;
use search_index::tantivy_engine::TantivyEngine;
use tempfile::TempDir;

const VOCAB: [&str; 8] = [
    "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta",
];
const NEEDLE_INTERVAL: usize = 37;

fn bench_schema() -> Arc<Schema> {
    let fields = vec![
        RawField {
            name: "id".into(),
            pk: true,
            field_type: FieldTypeRaw("i32".into()),
            tokenizer: TokenizerRaw::default(),
            time_fmt: String::new(),
            sorting: Sorting::None,
        },
        RawField {
            name: "body".into(),
            pk: false,
            field_type: FieldTypeRaw("str".into()),
            tokenizer: TokenizerRaw("space".into()),
            time_fmt: String::new(),
            sorting: Sorting::Desc,
        },
    ];
    let conf = SchemaConf { shards: 0, fields };
    Arc::new(Schema::from_conf("bench", std::path::PathBuf::from("/tmp/bench"), conf).expect("schema"))
}

fn seed(engine: &TantivyEngine, schema: &Schema, count: usize) {
    for i in 0..count {
        let v = VOCAB[i % VOCAB.len()];
        let mut body = format!("bench {i} {v} body text for the document");
        if i % NEEDLE_INTERVAL == 0 {
            body.push_str(" needle");
        }
        let mut doc = serde_json::Map::new();
        doc.insert("id".into(), serde_json::json!(i));
        doc.insert("body".into(), serde_json::json!(body));
        let encoded = encode_document(schema, &doc, 0).expect("encode");
        engine
            .index_doc(&encoded.doc_id, search_index::engine::IndexedDoc {
                tokens: encoded.tokens,
                stored: encoded.stored,
            })
            .expect("index_doc");
    }
    engine.flush().expect("flush");
}

fn seeded_engine(count: usize) -> (TempDir, TantivyEngine, Arc<Schema>) {
    let dir = TempDir::new().expect("tempdir");
    let schema = bench_schema();
    let engine = TantivyEngine::open_or_create(dir.path()).expect("open engine");
    seed(&engine, &schema, count);
    (dir, engine, schema)
}

fn search_request(schema: &Arc<Schema>, term: &str) -> SearchRequest {
    let scorer = Arc::new(QueryScorer {
        schema: Arc::clone(schema),
        sort_bys: Vec::new(),
        filters: Vec::new(),
    });
    SearchRequest {
        must: vec![term.to_string()],
        should: Vec::new(),
        not_in: Vec::new(),
        offset: 0,
        max_outputs: 20,
        scorer,
    }
}

fn bench_indexing_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("indexing_throughput");
    group.sample_size(10);

    for count in [100usize, 1_000, 5_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("docs", count), &count, |b, &count| {
            b.iter(|| {
                let dir = TempDir::new().expect("tempdir");
                let schema = bench_schema();
                let engine = TantivyEngine::open_or_create(dir.path()).expect("open engine");
                seed(&engine, &schema, count);
                black_box(&engine);
            });
        });
    }

    group.finish();
}

fn bench_search_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_latency");
    group.sample_size(20);

    for count in [1_000usize, 5_000] {
        let (dir, engine, schema) = seeded_engine(count);
        let request = search_request(&schema, "needle");

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("needle", count), &count, |b, _| {
            b.iter(|| {
                let response = engine.search(black_box(&request)).expect("search");
                black_box(&response);
            });
        });

        drop(engine);
        drop(dir);
    }

    group.finish();
}

criterion_group!(indexing, bench_indexing_throughput);
criterion_group!(search, bench_search_latency);
criterion_main!(indexing, search);
