//! Index lifecycle tests: flush, reopen, merge, metadata invariants

use serde_json::json;
use skald::segment::Document;
use skald::{Index, IndexConfig, Searcher, SkaldError};

fn doc(pairs: &[(&str, serde_json::Value)]) -> Document {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn text_doc(title: &str, body: &str) -> Document {
    doc(&[("title", json!(title)), ("body", json!(body))])
}

fn open(dir: &std::path::Path) -> Index {
    Index::open(IndexConfig::new(dir).with_flush_threshold(10_000)).unwrap()
}

#[test]
fn test_segment_ids_follow_the_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let idx = open(dir.path());

    idx.index("a", text_doc("one", "first")).unwrap();
    idx.flush().unwrap();
    idx.index("b", text_doc("two", "second")).unwrap();
    idx.flush().unwrap();

    let infos = idx.segments();
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0].id, "000000000001");
    assert_eq!(infos[1].id, "000000000002");
    assert!(infos[0].path.exists());
}

#[test]
fn test_flush_with_empty_builder_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let idx = open(dir.path());

    idx.flush().unwrap();
    idx.flush().unwrap();
    assert_eq!(idx.num_segments(), 0);
}

#[test]
fn test_reopen_restores_segments_and_epoch() {
    let dir = tempfile::tempdir().unwrap();
    {
        let idx = open(dir.path());
        idx.index("a", text_doc("one", "persisted words")).unwrap();
        idx.flush().unwrap();
        idx.index("b", text_doc("two", "more words")).unwrap();
        idx.flush().unwrap();
        idx.close();
    }

    let idx = open(dir.path());
    assert_eq!(idx.num_segments(), 2);

    let snapshot = idx.snapshot().unwrap();
    let searcher = Searcher::new(&snapshot);
    assert_eq!(searcher.query("words").unwrap().len(), 2);

    // New segment ids continue from the persisted epoch.
    idx.index("c", text_doc("three", "even more")).unwrap();
    idx.flush().unwrap();
    assert_eq!(idx.segments()[2].id, "000000000003");
}

#[test]
fn test_reopen_restores_deletions() {
    let dir = tempfile::tempdir().unwrap();
    {
        let idx = open(dir.path());
        idx.index("a", text_doc("one", "shared token")).unwrap();
        idx.index("b", text_doc("two", "shared token")).unwrap();
        idx.flush().unwrap();
        idx.delete("a").unwrap();
        // Tombstones persist with the next flush.
        idx.index("c", text_doc("three", "unrelated")).unwrap();
        idx.flush().unwrap();
        idx.close();
    }

    let idx = open(dir.path());
    let snapshot = idx.snapshot().unwrap();
    let searcher = Searcher::new(&snapshot);
    let hits = searcher.query("shared").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc_id, "b");
}

#[test]
fn test_closed_index_rejects_operations() {
    let dir = tempfile::tempdir().unwrap();
    let idx = open(dir.path());
    idx.close();

    assert!(matches!(
        idx.index("a", text_doc("t", "b")),
        Err(SkaldError::ClosedIndex)
    ));
    assert!(matches!(idx.delete("a"), Err(SkaldError::ClosedIndex)));
    assert!(matches!(idx.flush(), Err(SkaldError::ClosedIndex)));
    assert!(matches!(idx.snapshot(), Err(SkaldError::ClosedIndex)));
}

#[test]
fn test_invalid_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let idx = open(dir.path());

    assert!(matches!(
        idx.index("", text_doc("t", "b")),
        Err(SkaldError::InvalidArgument(_))
    ));
    assert!(matches!(
        idx.index("a", doc(&[("_id", json!("nope"))])),
        Err(SkaldError::InvalidArgument(_))
    ));
}

#[test]
fn test_segment_stats() {
    let dir = tempfile::tempdir().unwrap();
    let idx = open(dir.path());

    idx.index("a", text_doc("one", "alpha")).unwrap();
    idx.index("b", text_doc("two", "beta")).unwrap();
    idx.flush().unwrap();
    idx.delete("a").unwrap();

    let info = &idx.segments()[0];
    let stats = idx.segment_stats(&info.id).unwrap();
    assert_eq!(stats.num_docs, 2);
    assert_eq!(stats.num_deleted, 1);
    let mut fields = stats.fields.clone();
    fields.sort();
    assert_eq!(fields, vec!["_id", "body", "title"]);

    assert!(matches!(
        idx.segment_stats("999999999999"),
        Err(SkaldError::NotFound(_))
    ));
}

#[test]
fn test_load_doc_round_trips_non_string_values() {
    let dir = tempfile::tempdir().unwrap();
    let idx = open(dir.path());

    idx.index(
        "a",
        doc(&[
            ("title", json!("stored")),
            ("year", json!(2024)),
            ("draft", json!(false)),
        ]),
    )
    .unwrap();
    idx.flush().unwrap();

    let segment_id = idx.segments()[0].id.clone();
    let loaded = idx.load_doc(&segment_id, 0).unwrap();
    assert_eq!(loaded["title"], json!("stored"));
    assert_eq!(loaded["year"], json!(2024));
    assert_eq!(loaded["draft"], json!(false));

    assert!(matches!(
        idx.load_doc(&segment_id, 5),
        Err(SkaldError::NotFound(_))
    ));
    assert!(matches!(
        idx.load_doc("999999999999", 0),
        Err(SkaldError::NotFound(_))
    ));
}

#[test]
fn test_dump_postings_and_deletions() {
    let dir = tempfile::tempdir().unwrap();
    let idx = open(dir.path());

    idx.index("a", text_doc("one", "echo echo")).unwrap();
    idx.index("b", text_doc("two", "echo")).unwrap();
    idx.flush().unwrap();

    let entries = idx.dump_postings("body", "echo").unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].doc_num, 0);
    assert_eq!(entries[0].frequency, 2);
    assert_eq!(entries[0].positions, vec![0, 1]);

    idx.delete("a").unwrap();
    let segment_id = idx.segments()[0].id.clone();
    assert_eq!(idx.dump_deletions(&segment_id).unwrap(), vec![0]);

    // Unknown fields dump nothing rather than failing.
    assert!(idx.dump_postings("missing", "echo").unwrap().is_empty());
}

#[test]
fn test_merge_requires_two_segments() {
    let dir = tempfile::tempdir().unwrap();
    let idx = open(dir.path());

    idx.index("a", text_doc("one", "alpha")).unwrap();
    idx.flush().unwrap();

    // force_merge is a no-op with a single segment.
    idx.force_merge().unwrap();
    assert_eq!(idx.num_segments(), 1);

    let segment_id = idx.segments()[0].id.clone();
    assert!(matches!(
        idx.merge(&[segment_id]),
        Err(SkaldError::InvalidArgument(_))
    ));
    assert!(matches!(
        idx.merge(&["000000000001".to_string(), "999999999999".to_string()]),
        Err(SkaldError::NotFound(_))
    ));
}

#[test]
fn test_merge_records_doc_mappings_and_unlinks_files() {
    let dir = tempfile::tempdir().unwrap();
    let idx = open(dir.path());

    idx.index("a", text_doc("one", "alpha")).unwrap();
    idx.flush().unwrap();
    idx.index("b", text_doc("two", "beta")).unwrap();
    idx.flush().unwrap();

    let old_paths: Vec<_> = idx.segments().iter().map(|s| s.path.clone()).collect();

    idx.force_merge().unwrap();
    assert_eq!(idx.num_segments(), 1);

    for path in old_paths {
        assert!(!path.exists());
    }

    let merged_id = idx.segments()[0].id.clone();
    let mapping = idx.doc_mapping("a").unwrap().unwrap();
    assert_eq!(mapping.segment_id, merged_id);
    let mapping_b = idx.doc_mapping("b").unwrap().unwrap();
    assert_eq!(mapping_b.segment_id, merged_id);
    assert_ne!(mapping.doc_num, mapping_b.doc_num);

    // Merged content is still searchable.
    let snapshot = idx.snapshot().unwrap();
    let searcher = Searcher::new(&snapshot);
    assert_eq!(searcher.query("alpha").unwrap().len(), 1);
    assert_eq!(searcher.query("beta").unwrap().len(), 1);
}

#[test]
fn test_stored_docs_across_chunk_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let idx = Index::open(IndexConfig::new(dir.path()).with_flush_threshold(100_000)).unwrap();

    // Stored fields are chunked 1024 docs at a time; cover both chunks.
    let total = skald::segment::CHUNK_SIZE + 2;
    for i in 0..total {
        idx.index(
            &format!("doc{i}"),
            text_doc(&format!("title {i}"), &format!("body text {i}")),
        )
        .unwrap();
    }
    idx.flush().unwrap();

    let info = &idx.segments()[0];
    assert_eq!(info.num_docs, total);

    for doc_num in [1023, 1024, 1025] {
        let loaded = idx.load_doc(&info.id, doc_num).unwrap();
        assert_eq!(loaded["title"], json!(format!("title {doc_num}")));
        assert_eq!(loaded["body"], json!(format!("body text {doc_num}")));
    }

    // The doc just past the last chunk element is out of range.
    assert!(matches!(
        idx.load_doc(&info.id, total),
        Err(SkaldError::NotFound(_))
    ));

    // Terms from both chunks are searchable after the flush.
    let snapshot = idx.snapshot().unwrap();
    let searcher = Searcher::new(&snapshot);
    for doc_num in [1023, 1024, 1025] {
        let hits = searcher.query(&format!("title:{doc_num}")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, format!("doc{doc_num}"));
    }
}

#[test]
fn test_delete_in_builder_before_any_flush() {
    let dir = tempfile::tempdir().unwrap();
    let idx = open(dir.path());

    idx.index("a", text_doc("one", "ephemeral")).unwrap();
    idx.delete("a").unwrap();

    let snapshot = idx.snapshot().unwrap();
    let searcher = Searcher::new(&snapshot);
    assert!(searcher.query("ephemeral").unwrap().is_empty());

    // Builder tombstones are persisted as the new segment's deletions.
    idx.index("b", text_doc("two", "durable")).unwrap();
    idx.flush().unwrap();

    let segment_id = idx.segments()[0].id.clone();
    let stats = idx.segment_stats(&segment_id).unwrap();
    assert_eq!(stats.num_docs, 2);
    assert_eq!(stats.num_deleted, 1);
}
