//! End-to-end tests that drive the compiled `rd` binary against a temporary
//! library and database.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

fn rd_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rd");
    path
}

/// Single-page PDF carrying one line of text. Built with lopdf so stream
/// lengths and the xref table come out correct.
fn pdf_bytes(text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![100.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

fn write_pdf(path: &Path, text: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, pdf_bytes(text)).unwrap();
}

/// A library with two papers filed under AI/Agents and AI/Transformers,
/// plus a config pointing at it. Embedding and chat stay disabled.
fn setup_library_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let papers = root.join("papers");
    write_pdf(
        &papers.join("AI/Agents/Tool Use in Agents - 2023.pdf"),
        "Agents call tools in a loop and observe the results.",
    );
    write_pdf(
        &papers.join("AI/Transformers/Attention Basics - 2017.pdf"),
        "Attention weights are computed over keys and values.",
    );

    let config_content = format!(
        r#"[db]
path = "{}/data/refdesk.sqlite"

[library]
root = "{}/papers"

[retrieval]
default_k = 5
"#,
        root.display(),
        root.display()
    );

    let config_path = root.join("config").join("refdesk.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rd(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rd_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rd binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_library_env();

    let (stdout, stderr, success) = run_rd(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("refdesk.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_library_env();

    let (_, _, success1) = run_rd(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_rd(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_index_library() {
    let (_tmp, config_path) = setup_library_env();

    run_rd(&config_path, &["init"]);
    let (stdout, stderr, success) = run_rd(&config_path, &["index", "--progress", "off"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("discovered:      2"), "{}", stdout);
    assert!(stdout.contains("newly indexed:   2"), "{}", stdout);
    assert!(stdout.contains("already indexed: 0"), "{}", stdout);
    assert!(!stdout.contains("failed:"), "{}", stdout);
}

#[test]
fn test_index_idempotent() {
    let (_tmp, config_path) = setup_library_env();

    run_rd(&config_path, &["init"]);
    let (stdout1, _, _) = run_rd(&config_path, &["index", "--progress", "off"]);
    assert!(stdout1.contains("newly indexed:   2"), "{}", stdout1);

    let (stdout2, _, _) = run_rd(&config_path, &["index", "--progress", "off"]);
    assert!(stdout2.contains("newly indexed:   0"), "{}", stdout2);
    assert!(stdout2.contains("already indexed: 2"), "{}", stdout2);
}

#[test]
fn test_index_isolates_corrupt_pdf() {
    let (tmp, config_path) = setup_library_env();
    fs::write(
        tmp.path().join("papers").join("AI").join("bad.pdf"),
        b"not a valid pdf",
    )
    .unwrap();

    run_rd(&config_path, &["init"]);
    let (stdout, stderr, success) = run_rd(&config_path, &["index", "--progress", "off"]);
    assert!(success, "index must succeed despite one corrupt paper");
    assert!(stdout.contains("discovered:      3"), "{}", stdout);
    assert!(stdout.contains("newly indexed:   2"), "{}", stdout);
    assert!(stdout.contains("failed:          1"), "{}", stdout);
    assert!(
        stderr.contains("bad.pdf"),
        "corrupt paper should be named on stderr: {}",
        stderr
    );
}

#[test]
fn test_index_rebuild() {
    let (_tmp, config_path) = setup_library_env();

    run_rd(&config_path, &["init"]);
    run_rd(&config_path, &["index", "--progress", "off"]);

    let (stdout, _, success) =
        run_rd(&config_path, &["index", "--rebuild", "--progress", "off"]);
    assert!(success);
    assert!(stdout.contains("Cleared existing index."), "{}", stdout);
    assert!(stdout.contains("newly indexed:   2"), "{}", stdout);
}

#[test]
fn test_probe_empty_corpus_reports_not_found() {
    let (_tmp, config_path) = setup_library_env();

    run_rd(&config_path, &["init"]);
    let (stdout, stderr, success) = run_rd(&config_path, &["probe", "What is attention?"]);
    assert!(success, "probe failed: stdout={}, stderr={}", stdout, stderr);
    assert!(
        stdout.contains("No documents found matching the specified filters."),
        "{}",
        stdout
    );
    assert!(
        stdout.contains("Confidence: 0.00 | Category: Not Found"),
        "{}",
        stdout
    );
}

#[test]
fn test_probe_filters_accepted() {
    let (_tmp, config_path) = setup_library_env();

    run_rd(&config_path, &["init"]);
    run_rd(&config_path, &["index", "--progress", "off"]);

    // No vectors exist while the provider is disabled, so every probe
    // degrades to the not-found report rather than erroring.
    let (stdout, _, success) = run_rd(
        &config_path,
        &[
            "probe",
            "How do agents use tools?",
            "--subject",
            "AI",
            "--topic",
            "Agents",
            "--year",
            "2023",
            "--k",
            "3",
        ],
    );
    assert!(success);
    assert!(
        stdout.contains("No documents found matching the specified filters."),
        "{}",
        stdout
    );
    assert!(stdout.contains("Category: Not Found"), "{}", stdout);
}

#[test]
fn test_stats_empty_database() {
    let (_tmp, config_path) = setup_library_env();

    run_rd(&config_path, &["init"]);
    let (stdout, _, success) = run_rd(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Library Stats"), "{}", stdout);
    assert!(stdout.contains("Papers:     0 (0 unique titles)"), "{}", stdout);
}

#[test]
fn test_stats_reports_corpus() {
    let (_tmp, config_path) = setup_library_env();

    run_rd(&config_path, &["init"]);
    run_rd(&config_path, &["index", "--progress", "off"]);

    let (stdout, _, success) = run_rd(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Papers:     2 (2 unique titles)"), "{}", stdout);
    assert!(stdout.contains("By subject:"), "{}", stdout);
    assert!(stdout.contains("AI"), "{}", stdout);
}

#[test]
fn test_fetch_requires_title() {
    let (_tmp, config_path) = setup_library_env();

    let (_, stderr, success) = run_rd(&config_path, &["fetch", "http://example.com/x.pdf"]);
    assert!(!success, "fetch without --title should fail");
    assert!(stderr.contains("--title"), "{}", stderr);
}

#[test]
fn test_fetch_unreachable_url_fails() {
    let (_tmp, config_path) = setup_library_env();

    run_rd(&config_path, &["init"]);
    let (_, stderr, success) = run_rd(
        &config_path,
        &[
            "fetch",
            "http://127.0.0.1:1/paper.pdf",
            "--title",
            "Unreachable",
        ],
    );
    assert!(!success, "fetch from an unreachable host should fail");
    assert!(
        stderr.contains("Download failed"),
        "should report the download error: {}",
        stderr
    );
}

#[test]
fn test_arxiv_unreachable_api_fails() {
    let tmp = TempDir::new().unwrap();
    let config_content = format!(
        r#"[db]
path = "{}/refdesk.sqlite"

[library]
root = "{}/papers"

[arxiv]
api_url = "http://127.0.0.1:1/api/query"
"#,
        tmp.path().display(),
        tmp.path().display()
    );
    let config_path = tmp.path().join("refdesk.toml");
    fs::write(&config_path, config_content).unwrap();

    let (_, stderr, success) = run_rd(&config_path, &["arxiv", "attention"]);
    assert!(!success);
    assert!(stderr.contains("arXiv request failed"), "{}", stderr);
}

#[test]
fn test_unknown_progress_mode_errors() {
    let (_tmp, config_path) = setup_library_env();

    run_rd(&config_path, &["init"]);
    let (_, stderr, success) = run_rd(&config_path, &["index", "--progress", "loud"]);
    assert!(!success, "unknown progress mode should fail");
    assert!(stderr.contains("Unknown progress mode"), "{}", stderr);
}

#[test]
fn test_missing_config_errors() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("missing.toml");

    let (_, stderr, success) = run_rd(&config_path, &["stats"]);
    assert!(!success, "missing config should fail");
    assert!(stderr.contains("Failed to read config"), "{}", stderr);
}
