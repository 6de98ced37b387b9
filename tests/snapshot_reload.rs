// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

use policy_rag::embedding::{ChunkConfig, HashingProvider, SnapshotPaths};
use policy_rag::indexer::IndexBuilder;
use policy_rag::{format_citations, Grounding, RagError, Retriever};

const DIM: usize = 4096;

fn write_doc(docs: &Path, name: &str, contents: &str) {
    fs::create_dir_all(docs).unwrap();
    fs::write(docs.join(name), contents).unwrap();
}

fn build(docs: &Path, out: &Path) {
    let mut provider = HashingProvider::new(DIM).unwrap();
    IndexBuilder::new(docs, out, ChunkConfig::default())
        .build(&mut provider)
        .unwrap();
}

fn open(out: &Path) -> Retriever {
    Retriever::open(
        SnapshotPaths::in_dir(out),
        Box::new(HashingProvider::new(DIM).unwrap()),
    )
    .unwrap()
}

#[test]
fn rebuilt_snapshot_is_picked_up() {
    let dir = TempDir::new().unwrap();
    let docs = dir.path().join("docs");
    let out = dir.path().join("out");
    write_doc(&docs, "returns.md", "# Return Policy\nItems may be returned within 30 days.");
    build(&docs, &out);

    let retriever = open(&out);
    assert!(!retriever.reload_if_changed().unwrap());
    assert!(retriever.search("warranty claims", 5).unwrap().iter().all(|h| h.doc_id == "returns.md"));

    write_doc(&docs, "warranty.md", "# Warranty\nWarranty claims are accepted for one year.");
    build(&docs, &out);

    assert!(retriever.reload_if_changed().unwrap());
    let hits = retriever.search("warranty claims", 1).unwrap();
    assert_eq!(hits[0].doc_id, "warranty.md");
    assert_eq!(hits[0].cite(), "warranty.md#chunk0 (Warranty)");
}

#[test]
fn queries_share_one_retriever_across_threads() {
    let dir = TempDir::new().unwrap();
    let docs = dir.path().join("docs");
    let out = dir.path().join("out");
    write_doc(&docs, "returns.md", "# Return Policy\nItems may be returned within 30 days.");
    write_doc(&docs, "shipping.md", "# Shipping\nOrders ship within two business days.");
    build(&docs, &out);

    let retriever = Arc::new(open(&out));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let retriever = Arc::clone(&retriever);
            thread::spawn(move || {
                let query = if i % 2 == 0 { "return items" } else { "orders ship" };
                retriever.search(query, 1).unwrap()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let hits = handle.join().unwrap();
        let expected = if i % 2 == 0 { "returns.md" } else { "shipping.md" };
        assert_eq!(hits[0].doc_id, expected);
    }
}

#[test]
fn grounding_keeps_failures_apart_from_empty_results() {
    let dir = TempDir::new().unwrap();
    let docs = dir.path().join("docs");
    let out = dir.path().join("out");
    write_doc(&docs, "returns.md", "# Return Policy\nItems may be returned within 30 days.");
    build(&docs, &out);

    // A query embedder with a different dimension than the snapshot.
    let retriever = Retriever::open(
        SnapshotPaths::in_dir(&out),
        Box::new(HashingProvider::new(16).unwrap()),
    )
    .unwrap();
    assert!(matches!(
        retriever.search("returns", 3),
        Err(RagError::DimensionMismatch {
            expected: DIM,
            actual: 16
        })
    ));
    assert!(matches!(
        retriever.ground("returns", 3),
        Grounding::Unavailable { .. }
    ));

    let retriever = open(&out);
    assert_eq!(retriever.ground("returns", 0), Grounding::NoMatches);

    let hits = retriever.search("return items", 3).unwrap();
    assert_eq!(
        format_citations(&hits),
        "[1] returns.md#chunk0 (Return Policy)\n# Return Policy\nItems may be returned within 30 days."
    );
}

#[test]
fn deleted_metadata_requires_rebuild() {
    let dir = TempDir::new().unwrap();
    let docs = dir.path().join("docs");
    let out = dir.path().join("out");
    write_doc(&docs, "returns.md", "# Return Policy\nItems may be returned within 30 days.");
    build(&docs, &out);

    fs::remove_file(out.join("rag_meta.jsonl")).unwrap();
    let err = Retriever::open(
        SnapshotPaths::in_dir(&out),
        Box::new(HashingProvider::new(DIM).unwrap()),
    )
    .err()
    .unwrap();
    assert!(err.requires_rebuild());
}
