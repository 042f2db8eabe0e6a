//! End-to-end scenarios run against a real `Service` over a temp directory.

use search_core::field::{Field as RawField, FieldTypeRaw, Sorting, TokenizerRaw};
use search_core::schema::SchemaConf;
use search_index::document::BatchFormat;
use search_index::error::IndexError;
use search_index::service::Service;
use tempfile::tempdir;

fn field(name: &str, pk: bool, ty: &str, tokenizer: &str, sorting: Sorting) -> RawField {
    RawField {
        name: name.into(),
        pk,
        field_type: FieldTypeRaw(ty.into()),
        tokenizer: TokenizerRaw(tokenizer.into()),
        time_fmt: String::new(),
        sorting,
    }
}

/// S2: two-part PK docId, and an update that drops a stale term while
/// keeping the document addressable under the same id.
#[test]
fn s2_update_overwrites_stale_tokens() {
    let dir = tempdir().unwrap();
    let service = Service::start(dir.path().to_path_buf(), 0, 2, 0);
    let conf = SchemaConf {
        shards: 0,
        fields: vec![
            field("id1", true, "i32", "", Sorting::None),
            field("id2", true, "str", "", Sorting::None),
            field("body", false, "str", "space", Sorting::None),
        ],
    };
    service.create_schema("notes", conf).unwrap();

    let mut doc = serde_json::Map::new();
    doc.insert("id1".into(), serde_json::json!(3));
    doc.insert("id2".into(), serde_json::json!("a"));
    doc.insert("body".into(), serde_json::json!("hello world"));
    let doc_id = service.index_doc("notes", &doc).unwrap();
    assert_eq!(doc_id, "3_a");

    let mut update = serde_json::Map::new();
    update.insert("id1".into(), serde_json::json!(3));
    update.insert("id2".into(), serde_json::json!("a"));
    update.insert("body".into(), serde_json::json!("new"));
    service.update_doc("notes", &update).unwrap();

    let hello = service.search("notes", "hello", "", "", "", "", "", "").unwrap();
    assert_eq!(hello.pagination.total, 0);
    let new_hits = service.search("notes", "new", "", "", "", "", "", "").unwrap();
    assert_eq!(new_hits.pagination.total, 1);
    assert_eq!(new_hits.docs[0].doc_id, "3_a");

    service.stop();
}

/// S5: batch CSV ingestion, then a query that should surface only the row
/// whose body contains the searched term.
#[test]
fn s5_csv_batch_then_targeted_search() {
    let dir = tempdir().unwrap();
    let service = Service::start(dir.path().to_path_buf(), 0, 2, 0);
    let conf = SchemaConf {
        shards: 0,
        fields: vec![
            field("id", true, "i32", "", Sorting::None),
            field("body", false, "str", "space", Sorting::None),
        ],
    };
    service.create_schema("rows", conf).unwrap();

    let csv_bytes = b"id,body\n1,foo\n2,bar\n";
    let mut cursor = std::io::Cursor::new(csv_bytes.to_vec());
    let outcomes = service.index_docs("rows", BatchFormat::Csv, &mut cursor).unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.err.is_none()));

    let hits = service.search("rows", "foo", "", "", "", "", "", "").unwrap();
    assert_eq!(hits.pagination.total, 1);
    assert_eq!(hits.docs[0].doc_id, "1");

    service.stop();
}

/// S6: mutations submitted after `stop` are rejected with `ServiceStopped`,
/// while mutations submitted before it have already landed.
#[test]
fn s6_stop_then_reject_new_mutations() {
    let dir = tempdir().unwrap();
    let service = Service::start(dir.path().to_path_buf(), 0, 2, 0);
    let conf = SchemaConf {
        shards: 0,
        fields: vec![field("id", true, "i32", "", Sorting::None)],
    };
    service.create_schema("t", conf).unwrap();

    let mut doc = serde_json::Map::new();
    doc.insert("id".into(), serde_json::json!(1));
    service.index_doc("t", &doc).unwrap();

    service.stop();
    assert!(!service.is_running());

    let mut doc2 = serde_json::Map::new();
    doc2.insert("id".into(), serde_json::json!(2));
    let err = service.index_doc("t", &doc2).unwrap_err();
    assert!(matches!(err, IndexError::ServiceStopped));
    assert_eq!(err.error_code(), "SERVICE_STOPPED");
}

/// S8: every stable error-code string is one of the eight named in the
/// error taxonomy, and `Service` surfaces `ServiceStopped` rather than
/// panicking once stopped.
#[test]
fn s8_error_codes_are_stable_and_known() {
    let known = [
        "NOT_FOUND",
        "ALREADY_EXISTS",
        "INVALID_SCHEMA",
        "BAD_REQUEST",
        "CONVERSION_ERROR",
        "SERVICE_STOPPED",
        "IO_ERROR",
        "INTERNAL_ERROR",
    ];

    let dir = tempdir().unwrap();
    let service = Service::start(dir.path().to_path_buf(), 0, 1, 0);
    assert!(known.contains(&service.get_schema("missing").unwrap_err().error_code()));

    service.stop();
    let mut doc = serde_json::Map::new();
    doc.insert("id".into(), serde_json::json!(1));
    assert_eq!(service.index_doc("t", &doc).unwrap_err().error_code(), "SERVICE_STOPPED");
}

/// Rename drops the old registry entry; the index is reachable only under
/// its new name afterward.
#[test]
fn rename_schema_moves_index_and_drops_old_registry_entry() {
    let dir = tempdir().unwrap();
    let service = Service::start(dir.path().to_path_buf(), 0, 1, 0);
    let conf = SchemaConf {
        shards: 0,
        fields: vec![field("id", true, "i32", "", Sorting::None)],
    };
    service.create_schema("old", conf).unwrap();
    service.rename_schema("old", "new").unwrap();

    assert!(service.get_schema("old").is_err());
    assert!(service.get_schema("new").is_ok());
    service.stop();
}
