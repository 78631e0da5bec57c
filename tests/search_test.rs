//! End-to-end query tests over a seeded corpus

use std::collections::HashSet;

use serde_json::json;
use skald::segment::Document;
use skald::{Hit, Index, IndexConfig, Searcher, ScoringMode, SkaldError};

fn doc(title: &str, body: &str) -> Document {
    let mut d = Document::new();
    d.insert("title".to_string(), json!(title));
    d.insert("body".to_string(), json!(body));
    d
}

/// Twenty documents spanning tech, places, and sports
fn seed_docs() -> Vec<(&'static str, Document)> {
    vec![
        ("doc1", doc("Go Programming Language", "Go is a unique programming language designed at Google.")),
        ("doc2", doc("Python Programming", "Python is a unique interpreted programming language.")),
        ("doc3", doc("Rust Programming Language", "Rust is a systems programming language focused on safety.")),
        ("doc4", doc("PostgreSQL", "PostgreSQL is an advanced open source relational system.")),
        ("doc5", doc("Redis Database", "Redis is an in-memory key value store used as cache and message broker.")),
        ("doc6", doc("Linux Kernel", "The Linux kernel is the core of many operating systems.")),
        ("doc7", doc("Git Version Control", "Git tracks changes in source code during development.")),
        ("doc8", doc("Docker Containers", "Docker packages applications into portable containers.")),
        ("doc9", doc("Kubernetes", "Kubernetes orchestrates containerized workloads across clusters.")),
        ("doc10", doc("Vim Editor", "Vim is a highly configurable text editor.")),
        ("doc11", doc("France", "France is a country in western Europe known for its cuisine.")),
        ("doc12", doc("New York City", "New York is the largest city in the united states.")),
        ("doc13", doc("California", "California is a populous state on the west coast of the united states.")),
        ("doc14", doc("Japan", "Japan is an island country in east Asia.")),
        ("doc15", doc("Football", "Every football team relies on each player during a match.")),
        ("doc16", doc("Basketball", "A basketball team has five players and each player scores points.")),
        ("doc17", doc("Functional Programming", "Functional programming favors pure functions and immutability.")),
        ("doc18", doc("Systems Programming", "Systems programming deals with memory management and concurrency.")),
        ("doc19", doc("Machine Learning", "Machine learning models learn patterns from data.")),
        ("doc20", doc("Databases Overview", "Modern databases trade consistency for availability.")),
    ]
}

fn seed_index(dir: &std::path::Path) -> Index {
    let idx = Index::open(IndexConfig::new(dir).with_flush_threshold(10_000)).unwrap();
    for (id, d) in seed_docs() {
        idx.index(id, d).unwrap();
    }
    idx
}

fn ids(hits: &[Hit]) -> HashSet<String> {
    hits.iter().map(|h| h.doc_id.clone()).collect()
}

fn id_set(expected: &[&str]) -> HashSet<String> {
    expected.iter().map(|s| s.to_string()).collect()
}

fn run(idx: &Index, query: &str) -> Vec<Hit> {
    let snapshot = idx.snapshot().unwrap();
    let searcher = Searcher::new(&snapshot);
    searcher.query(query).unwrap()
}

#[test]
fn test_term_query_programming() {
    let dir = tempfile::tempdir().unwrap();
    let idx = seed_index(dir.path());

    let hits = run(&idx, "\"programming\"");
    assert_eq!(ids(&hits), id_set(&["doc1", "doc2", "doc3", "doc17", "doc18"]));
}

#[test]
fn test_field_qualified_term() {
    let dir = tempfile::tempdir().unwrap();
    let idx = seed_index(dir.path());

    let hits = run(&idx, "title:database");
    assert_eq!(ids(&hits), id_set(&["doc5"]));
}

#[test]
fn test_phrase_united_states() {
    let dir = tempfile::tempdir().unwrap();
    let idx = seed_index(dir.path());

    let hits = run(&idx, "\"united states\"");
    assert_eq!(ids(&hits), id_set(&["doc12", "doc13"]));

    let hits = run(&idx, "title:\"united states\"");
    assert!(hits.is_empty());
}

#[test]
fn test_phrase_order_matters() {
    let dir = tempfile::tempdir().unwrap();
    let idx = seed_index(dir.path());

    let hits = run(&idx, "\"states united\"");
    assert!(hits.is_empty());
}

#[test]
fn test_prefix_query() {
    let dir = tempfile::tempdir().unwrap();
    let idx = seed_index(dir.path());

    let hits = run(&idx, "prog*");
    assert_eq!(ids(&hits), id_set(&["doc1", "doc2", "doc3", "doc17", "doc18"]));
}

#[test]
fn test_and_not() {
    let dir = tempfile::tempdir().unwrap();
    let idx = seed_index(dir.path());

    let hits = run(&idx, "programming AND NOT language");
    assert_eq!(ids(&hits), id_set(&["doc17", "doc18"]));

    let hits = run(&idx, "programming -language");
    assert_eq!(ids(&hits), id_set(&["doc17", "doc18"]));
}

#[test]
fn test_bare_negation_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let idx = seed_index(dir.path());

    let snapshot = idx.snapshot().unwrap();
    let searcher = Searcher::new(&snapshot);
    assert!(matches!(
        searcher.query("-language"),
        Err(SkaldError::InvalidQuery(_))
    ));
    assert!(matches!(
        searcher.query("NOT language"),
        Err(SkaldError::InvalidQuery(_))
    ));
}

#[test]
fn test_grouped_boolean() {
    let dir = tempfile::tempdir().unwrap();
    let idx = seed_index(dir.path());

    let hits = run(&idx, "(football OR basketball) AND (player OR team)");
    assert_eq!(ids(&hits), id_set(&["doc15", "doc16"]));
}

#[test]
fn test_regex_query() {
    let dir = tempfile::tempdir().unwrap();
    let idx = seed_index(dir.path());

    let hits = run(&idx, "/program.*/");
    assert_eq!(ids(&hits), id_set(&["doc1", "doc2", "doc3", "doc17", "doc18"]));
}

#[test]
fn test_fuzzy_query() {
    let dir = tempfile::tempdir().unwrap();
    let idx = seed_index(dir.path());

    // One edit away from "basketball".
    let hits = run(&idx, "basketbal~1");
    assert_eq!(ids(&hits), id_set(&["doc16"]));
}

#[test]
fn test_term_is_lowercased_at_match_time() {
    let dir = tempfile::tempdir().unwrap();
    let idx = seed_index(dir.path());

    let hits = run(&idx, "PROGRAMMING");
    assert_eq!(ids(&hits), id_set(&["doc1", "doc2", "doc3", "doc17", "doc18"]));
}

#[test]
fn test_unknown_field_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let idx = seed_index(dir.path());

    let snapshot = idx.snapshot().unwrap();
    let searcher = Searcher::new(&snapshot);
    assert!(matches!(
        searcher.query("nosuchfield:x"),
        Err(SkaldError::FieldNotFound(_))
    ));
}

#[test]
fn test_empty_query_matches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let idx = seed_index(dir.path());

    assert!(run(&idx, "").is_empty());
}

#[test]
fn test_delete_then_flush_then_merge() {
    let dir = tempfile::tempdir().unwrap();
    let idx = Index::open(IndexConfig::new(dir.path()).with_flush_threshold(10_000)).unwrap();

    let docs = seed_docs();
    for (id, d) in &docs[..10] {
        idx.index(id, d.clone()).unwrap();
    }
    idx.flush().unwrap();
    for (id, d) in &docs[10..] {
        idx.index(id, d.clone()).unwrap();
    }
    idx.flush().unwrap();
    assert_eq!(idx.num_segments(), 2);

    // Both doc1 and doc2 contain "unique"; tombstoning doc1 leaves doc2.
    idx.delete("doc1").unwrap();
    {
        let snapshot = idx.snapshot().unwrap();
        let searcher = Searcher::new(&snapshot);
        let hits = searcher.query("\"unique\"").unwrap();
        assert_eq!(ids(&hits), id_set(&["doc2"]));
    }

    idx.flush().unwrap();
    idx.force_merge().unwrap();
    assert_eq!(idx.num_segments(), 1);

    // The merged segment no longer holds doc1 physically.
    let info = &idx.segments()[0];
    assert_eq!(info.num_docs, 19);
    let stats = idx.segment_stats(&info.id).unwrap();
    assert_eq!(stats.num_deleted, 0);

    let snapshot = idx.snapshot().unwrap();
    let searcher = Searcher::new(&snapshot);
    let hits = searcher.query("\"unique\"").unwrap();
    assert_eq!(ids(&hits), id_set(&["doc2"]));
}

#[test]
fn test_results_search_segments_and_builder_together() {
    let dir = tempfile::tempdir().unwrap();
    let idx = Index::open(IndexConfig::new(dir.path()).with_flush_threshold(10_000)).unwrap();

    let docs = seed_docs();
    for (id, d) in &docs[..10] {
        idx.index(id, d.clone()).unwrap();
    }
    idx.flush().unwrap();
    for (id, d) in &docs[10..] {
        idx.index(id, d.clone()).unwrap();
    }

    // doc2 is flushed, doc17 still in the builder.
    let hits = run(&idx, "\"programming\"");
    assert_eq!(ids(&hits), id_set(&["doc1", "doc2", "doc3", "doc17", "doc18"]));
}

#[test]
fn test_reindex_shadows_older_copy() {
    let dir = tempfile::tempdir().unwrap();
    let idx = Index::open(IndexConfig::new(dir.path()).with_flush_threshold(10_000)).unwrap();

    idx.index("doc1", doc("Old Title", "legacy content here")).unwrap();
    idx.flush().unwrap();
    idx.index("doc1", doc("New Title", "fresh content here")).unwrap();

    // The old copy is tombstoned in its segment: "legacy" finds nothing.
    assert!(run(&idx, "legacy").is_empty());

    let hits = run(&idx, "fresh");
    assert_eq!(ids(&hits), id_set(&["doc1"]));

    // Dedup invariant: any query sees at most one copy of an external id.
    let hits = run(&idx, "content");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc_id, "doc1");
}

#[test]
fn test_snapshot_deletion_bitmaps_are_stable() {
    let dir = tempfile::tempdir().unwrap();
    let idx = Index::open(IndexConfig::new(dir.path()).with_flush_threshold(10_000)).unwrap();

    idx.index("doc1", doc("First", "alpha")).unwrap();
    idx.flush().unwrap();

    let snapshot = idx.snapshot().unwrap();
    idx.delete("doc1").unwrap();

    // The earlier snapshot captured its own bitmap clone.
    let searcher = Searcher::new(&snapshot);
    assert_eq!(searcher.query("alpha").unwrap().len(), 1);

    let fresh = idx.snapshot().unwrap();
    let searcher = Searcher::new(&fresh);
    assert!(searcher.query("alpha").unwrap().is_empty());
}

#[test]
fn test_snapshot_survives_merge_of_its_segments() {
    let dir = tempfile::tempdir().unwrap();
    let idx = Index::open(IndexConfig::new(dir.path()).with_flush_threshold(10_000)).unwrap();

    idx.index("doc1", doc("First", "alpha")).unwrap();
    idx.flush().unwrap();
    idx.index("doc2", doc("Second", "beta")).unwrap();
    idx.flush().unwrap();

    let snapshot = idx.snapshot().unwrap();
    assert_eq!(snapshot.segments().len(), 2);

    // Merging unlinks the old segment files, but the snapshot keeps its
    // mmaps alive and its segment list unchanged.
    idx.force_merge().unwrap();
    assert_eq!(idx.num_segments(), 1);

    assert_eq!(snapshot.segments().len(), 2);
    let searcher = Searcher::new(&snapshot);
    assert_eq!(searcher.query("alpha").unwrap().len(), 1);
}

#[test]
fn test_bm25_saturation() {
    let dir = tempfile::tempdir().unwrap();
    let idx = Index::open(IndexConfig::new(dir.path()).with_flush_threshold(10_000)).unwrap();

    idx.index("once", doc("a", "needle")).unwrap();
    idx.index("thrice", doc("a", "needle needle needle")).unwrap();
    idx.flush().unwrap();

    let hits = run(&idx, "needle");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].doc_id, "thrice");

    let high = hits[0].score;
    let low = hits[1].score;
    assert!(high > low);
    // Tripling the term frequency must not triple the score.
    assert!(high / low < 3.0);
}

#[test]
fn test_tfidf_scoring_mode() {
    let dir = tempfile::tempdir().unwrap();
    let idx = Index::open(
        IndexConfig::new(dir.path())
            .with_flush_threshold(10_000)
            .with_scoring(ScoringMode::TfIdf),
    )
    .unwrap();

    idx.index("once", doc("a", "needle haystack")).unwrap();
    idx.index("twice", doc("a", "needle needle")).unwrap();
    idx.flush().unwrap();

    let hits = run(&idx, "needle");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].doc_id, "twice");
    // tf' = 1 + ln(tf): sublinear growth.
    assert!(hits[0].score / hits[1].score < 2.0);
}

#[test]
fn test_automatic_flush_at_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let idx = Index::open(IndexConfig::new(dir.path()).with_flush_threshold(5)).unwrap();

    for (id, d) in seed_docs() {
        idx.index(id, d).unwrap();
    }

    assert!(idx.num_segments() >= 3);
    let hits = run(&idx, "\"programming\"");
    assert_eq!(ids(&hits), id_set(&["doc1", "doc2", "doc3", "doc17", "doc18"]));
}
