//! End-to-end runs of the command surface against a temporary store.

use std::path::Path;

use clap::Parser;
use luminary_cli::{Cli, Output, run};
use luminary_rag::RagConfig;

async fn luminary(storage: &Path, args: &[&str]) -> Output {
    let mut argv = vec!["luminary", "--storage", storage.to_str().unwrap()];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv).unwrap();
    run(cli, RagConfig::default()).await.unwrap()
}

fn write(dir: &Path, name: &str, text: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path.to_str().unwrap().to_string()
}

const LEASE: &str = "Residential Lease\n\n   The tenant shall pay rent   monthly.\n\n\n\
                     Either party may terminate with thirty days written notice.";
const NDA: &str = "Mutual Non-Disclosure Agreement\n\nConfidential information must not be disclosed.";

#[tokio::test]
async fn documents_survive_between_invocations() {
    let store = tempfile::tempdir().unwrap();
    let inputs = tempfile::tempdir().unwrap();
    let lease = write(inputs.path(), "lease.txt", LEASE);

    let added = luminary(store.path(), &["add", &lease, "--id", "lease", "--meta", "court=High Court"]).await;
    assert!(added.success, "{}", added.text);
    assert!(added.text.starts_with("Added 'lease'"));

    let again = luminary(store.path(), &["add", &lease, "--id", "lease"]).await;
    assert!(!again.success);
    assert!(again.text.contains("already exists"));

    let listed = luminary(store.path(), &["list"]).await;
    assert!(listed.text.contains("lease  lease.txt"));

    let document = luminary(store.path(), &["--json", "get", "lease"]).await;
    let value: serde_json::Value = serde_json::from_str(&document.text).unwrap();
    assert_eq!(value["metadata"]["court"], "High Court");
    assert_eq!(value["metadata"]["source_file"], "lease.txt");
    assert!(value["content"].as_str().unwrap().contains("The tenant shall pay rent monthly."));

    let stats = luminary(store.path(), &["stats"]).await;
    assert!(stats.text.starts_with("Documents: 1\n"));
}

#[tokio::test]
async fn search_ranks_the_matching_document_first() {
    let store = tempfile::tempdir().unwrap();
    let inputs = tempfile::tempdir().unwrap();
    luminary(store.path(), &["add", &write(inputs.path(), "lease.txt", LEASE), "--id", "lease"]).await;
    luminary(store.path(), &["add", &write(inputs.path(), "nda.txt", NDA), "--id", "nda"]).await;

    let found = luminary(store.path(), &["--json", "search", "terminate with written notice", "-k", "1"]).await;
    let value: serde_json::Value = serde_json::from_str(&found.text).unwrap();
    assert_eq!(value["results"].as_array().unwrap().len(), 1);
    assert_eq!(value["results"][0]["doc_id"], "lease");

    let grouped = luminary(store.path(), &["--json", "search-all", "confidential information"]).await;
    let groups: serde_json::Value = serde_json::from_str(&grouped.text).unwrap();
    assert_eq!(groups[0]["doc_id"], "nda");

    let scoped = luminary(store.path(), &["--json", "search", "rent", "--doc", "nda"]).await;
    let value: serde_json::Value = serde_json::from_str(&scoped.text).unwrap();
    assert!(value["results"].as_array().unwrap().iter().all(|hit| hit["doc_id"] == "nda"));
}

#[tokio::test]
async fn generation_failures_keep_retrieved_context() {
    let store = tempfile::tempdir().unwrap();
    let inputs = tempfile::tempdir().unwrap();
    luminary(store.path(), &["add", &write(inputs.path(), "lease.txt", LEASE), "--id", "lease"]).await;
    luminary(store.path(), &["add", &write(inputs.path(), "nda.txt", NDA), "--id", "nda"]).await;

    let answer = luminary(store.path(), &["ask", "lease", "How much notice is needed?"]).await;
    assert!(!answer.success);
    assert!(answer.text.starts_with("Error generating answer:"));
    assert!(answer.text.contains("Sources:"));

    let comparison = luminary(store.path(), &["compare", "lease", "nda"]).await;
    assert!(!comparison.success);
    assert!(comparison.text.contains("Basic comparison:"));

    let risks = luminary(store.path(), &["risks", "--doc", "lease"]).await;
    assert!(risks.text.starts_with("Risk assessment failed"));
}

#[tokio::test]
async fn missing_documents_are_reported_by_id() {
    let store = tempfile::tempdir().unwrap();

    let get = luminary(store.path(), &["get", "ghost"]).await;
    assert!(!get.success);
    assert_eq!(get.text, "Document 'ghost' not found");

    let compare = luminary(store.path(), &["compare", "ghost", "other"]).await;
    assert_eq!(compare.text, "Document 1 ('ghost') not found");

    let analyze = luminary(store.path(), &["--json", "analyze", "--doc", "ghost"]).await;
    let value: serde_json::Value = serde_json::from_str(&analyze.text).unwrap();
    assert_eq!(value["status"], "not_found");
}

#[tokio::test]
async fn delete_removes_the_document_and_its_chunks() {
    let store = tempfile::tempdir().unwrap();
    let inputs = tempfile::tempdir().unwrap();
    luminary(store.path(), &["add", &write(inputs.path(), "lease.txt", LEASE), "--id", "lease"]).await;

    let deleted = luminary(store.path(), &["--json", "delete", "lease"]).await;
    let value: serde_json::Value = serde_json::from_str(&deleted.text).unwrap();
    assert_eq!(value["doc_id"], "lease");
    assert!(value["chunks_deleted"].as_u64().unwrap() >= 1);

    let stats = luminary(store.path(), &["--json", "stats"]).await;
    let value: serde_json::Value = serde_json::from_str(&stats.text).unwrap();
    assert_eq!(value["total_documents"], 0);
    assert_eq!(value["total_chunks"], 0);

    assert!(!luminary(store.path(), &["delete", "lease"]).await.success);
}

#[tokio::test]
async fn qa_analysis_without_a_query_is_rejected() {
    let store = tempfile::tempdir().unwrap();
    let inputs = tempfile::tempdir().unwrap();
    let lease = write(inputs.path(), "lease.txt", LEASE);

    let cli = Cli::try_parse_from([
        "luminary",
        "--storage",
        store.path().to_str().unwrap(),
        "analyze",
        "--file",
        lease.as_str(),
        "--mode",
        "qa",
    ])
    .unwrap();
    let err = run(cli, RagConfig::default()).await.unwrap_err();
    assert!(err.to_string().contains("qa analysis requires a query"));
}

#[tokio::test]
async fn cleaned_files_keep_their_paragraph_chunks() {
    let store = tempfile::tempdir().unwrap();
    let inputs = tempfile::tempdir().unwrap();
    let text = (1..=20)
        .map(|i| format!("  Clause {i}.   The tenant shall observe obligation number {i} of this lease.  "))
        .collect::<Vec<_>>()
        .join("\n\n\n");
    let contract = write(inputs.path(), "contract.txt", &text);

    let added = luminary(store.path(), &["--json", "add", &contract, "--id", "contract"]).await;
    let value: serde_json::Value = serde_json::from_str(&added.text).unwrap();
    assert_eq!(value["status"], "added");
    assert!(value["chunks_created"].as_u64().unwrap() > 1, "{}", added.text);
}
