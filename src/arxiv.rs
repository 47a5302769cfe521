//! Corpus expansion: search arXiv and pull papers into the library.
//!
//! Search hits the arXiv Atom API, relevance-sorted. Fetch downloads a PDF
//! into the subject/topic directory layout and optionally indexes it in the
//! same call. Both report outcomes as data rather than errors, because the
//! payloads go straight back to tool callers.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use crate::config::Config;
use crate::index::LibraryIndex;
use crate::metadata;

const MAX_ABSTRACT_CHARS: usize = 500;
const MAX_AUTHORS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct ArxivPaper {
    pub source: String,
    /// The entry id, an abs URL.
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub summary: String,
    pub year: Option<i64>,
    pub venue: String,
    pub authors: Vec<String>,
    pub pdf_url: Option<String>,
    pub landing_url: String,
    /// Echo of the search request, so callers can thread them into a fetch.
    pub subject: Option<String>,
    pub topic: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchReport {
    pub query: String,
    pub subject: Option<String>,
    pub topic: Option<String>,
    pub count: usize,
    pub papers: Vec<ArxivPaper>,
}

#[derive(Debug, Serialize)]
pub struct FetchReport {
    pub success: bool,
    pub file_path: Option<String>,
    pub indexed: bool,
    pub message: String,
}

// ============ Search ============

pub async fn search(
    config: &Config,
    query: &str,
    subject: Option<&str>,
    topic: Option<&str>,
    max_results: usize,
) -> Result<SearchReport> {
    let term = search_term(query, subject, topic);
    let n = max_results.clamp(1, 50);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.arxiv.timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;
    let response = client
        .get(&config.arxiv.api_url)
        .query(&[
            ("search_query", format!("all:{}", term)),
            ("start", "0".to_string()),
            ("max_results", n.to_string()),
            ("sortBy", "relevance".to_string()),
        ])
        .send()
        .await
        .with_context(|| format!("arXiv request failed: {}", config.arxiv.api_url))?
        .error_for_status()
        .context("arXiv returned an error status")?;
    let body = response
        .bytes()
        .await
        .context("Failed to read arXiv response")?;

    let papers = parse_atom_feed(&body, subject, topic)?;
    Ok(SearchReport {
        query: query.to_string(),
        subject: subject.map(String::from),
        topic: topic.map(String::from),
        count: papers.len(),
        papers,
    })
}

/// Topic and subject sharpen the relevance sort when present.
fn search_term(query: &str, subject: Option<&str>, topic: Option<&str>) -> String {
    [topic, subject, Some(query)]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ============ Atom feed parsing ============

#[derive(Default)]
struct EntryDraft {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    pdf_url: Option<String>,
}

impl EntryDraft {
    fn finish(self, subject: Option<&str>, topic: Option<&str>) -> ArxivPaper {
        let year = self.published.get(..4).and_then(|y| y.parse().ok());
        let pdf_url = self.pdf_url.or_else(|| {
            if self.id.contains("/abs/") {
                Some(self.id.replace("/abs/", "/pdf/"))
            } else {
                None
            }
        });
        ArxivPaper {
            source: "arxiv".to_string(),
            id: self.id.clone(),
            title: self.title,
            summary: truncate_abstract(&self.summary),
            year,
            venue: "arXiv".to_string(),
            authors: self.authors.into_iter().take(MAX_AUTHORS).collect(),
            pdf_url,
            landing_url: self.id,
            subject: subject.map(String::from),
            topic: topic.map(String::from),
        }
    }
}

fn truncate_abstract(summary: &str) -> String {
    if summary.chars().count() <= MAX_ABSTRACT_CHARS {
        return summary.to_string();
    }
    let head: String = summary.chars().take(MAX_ABSTRACT_CHARS).collect();
    format!("{}...", head)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_atom_feed(
    xml: &[u8],
    subject: Option<&str>,
    topic: Option<&str>,
) -> Result<Vec<ArxivPaper>> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut papers = Vec::new();
    let mut draft: Option<EntryDraft> = None;
    let mut in_author = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"entry" => {
                        draft = Some(EntryDraft::default());
                        in_author = false;
                    }
                    b"author" => {
                        if draft.is_some() {
                            in_author = true;
                        }
                    }
                    b"link" => {
                        let href = pdf_link_href(&e);
                        if let Some(d) = draft.as_mut() {
                            if href.is_some() {
                                d.pdf_url = href;
                            }
                        }
                    }
                    b"id" => {
                        if draft.is_some() {
                            if let Ok(quick_xml::events::Event::Text(te)) =
                                reader.read_event_into(&mut buf)
                            {
                                if let Some(d) = draft.as_mut() {
                                    d.id = te.unescape().unwrap_or_default().trim().to_string();
                                }
                            }
                        }
                    }
                    b"title" => {
                        if draft.is_some() {
                            if let Ok(quick_xml::events::Event::Text(te)) =
                                reader.read_event_into(&mut buf)
                            {
                                if let Some(d) = draft.as_mut() {
                                    d.title =
                                        collapse_whitespace(&te.unescape().unwrap_or_default());
                                }
                            }
                        }
                    }
                    b"summary" => {
                        if draft.is_some() {
                            if let Ok(quick_xml::events::Event::Text(te)) =
                                reader.read_event_into(&mut buf)
                            {
                                if let Some(d) = draft.as_mut() {
                                    d.summary =
                                        collapse_whitespace(&te.unescape().unwrap_or_default());
                                }
                            }
                        }
                    }
                    b"published" => {
                        if draft.is_some() {
                            if let Ok(quick_xml::events::Event::Text(te)) =
                                reader.read_event_into(&mut buf)
                            {
                                if let Some(d) = draft.as_mut() {
                                    d.published =
                                        te.unescape().unwrap_or_default().trim().to_string();
                                }
                            }
                        }
                    }
                    b"name" => {
                        if in_author {
                            if let Ok(quick_xml::events::Event::Text(te)) =
                                reader.read_event_into(&mut buf)
                            {
                                if let Some(d) = draft.as_mut() {
                                    let author =
                                        te.unescape().unwrap_or_default().trim().to_string();
                                    if !author.is_empty() {
                                        d.authors.push(author);
                                    }
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"link" {
                    let href = pdf_link_href(&e);
                    if let Some(d) = draft.as_mut() {
                        if href.is_some() {
                            d.pdf_url = href;
                        }
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"entry" => {
                    if let Some(d) = draft.take() {
                        papers.push(d.finish(subject, topic));
                    }
                }
                b"author" => in_author = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => bail!("Failed to parse arXiv feed: {}", e),
            _ => {}
        }
        buf.clear();
    }
    Ok(papers)
}

/// href of a `<link title="pdf" ...>` element, or None for any other link.
fn pdf_link_href(e: &quick_xml::events::BytesStart<'_>) -> Option<String> {
    let mut href = None;
    let mut is_pdf = false;
    for attr in e.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(String::from_utf8_lossy(&attr.value).into_owned()),
            b"title" => is_pdf = attr.value.as_ref() == b"pdf",
            _ => {}
        }
    }
    if is_pdf {
        href
    } else {
        None
    }
}

// ============ Fetch ============

/// Download a PDF into the library and optionally index it.
///
/// `success` reflects the download alone; an indexing failure after a good
/// download still reports success with `indexed: false`.
pub async fn fetch(
    index: &LibraryIndex,
    pdf_url: &str,
    title: &str,
    year: Option<i64>,
    subject: Option<&str>,
    topic: Option<&str>,
    index_after: bool,
) -> FetchReport {
    if pdf_url.trim().is_empty() {
        return FetchReport {
            success: false,
            file_path: None,
            indexed: false,
            message: "No PDF URL provided".to_string(),
        };
    }

    let relpath = metadata::download_relpath(subject, topic, title, year);
    let dest = index.config().library.root.join(&relpath);
    if let Err(message) = download_to(index.config(), pdf_url, &dest).await {
        return FetchReport {
            success: false,
            file_path: None,
            indexed: false,
            message,
        };
    }

    let mut message = format!("Downloaded: {}", dest.display());
    let mut indexed = false;
    if index_after {
        match index.index_paper(&dest).await {
            Ok(true) => {
                indexed = true;
                message.push_str(" | Added to vector database ✓ | Retriever refreshed ✓");
            }
            Ok(false) => message.push_str(" | already indexed"),
            Err(e) => message.push_str(&format!(" | indexing failed: {}", e)),
        }
    }

    FetchReport {
        success: true,
        file_path: Some(dest.display().to_string()),
        indexed,
        message,
    }
}

/// Errors come back pre-formatted for the fetch report: transport and HTTP
/// status problems as "Download failed: ...", everything else as "Error: ...".
async fn download_to(config: &Config, url: &str, dest: &Path) -> Result<(), String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.arxiv.timeout_secs))
        .build()
        .map_err(|e| format!("Error: {}", e))?;
    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| format!("Download failed: {}", e))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| format!("Download failed: {}", e))?;

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("Error: {}", e))?;
    }
    std::fs::write(dest, &bytes).map_err(|e| format!("Error: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::test_pdf;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query Results</title>
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All
      You Need</title>
    <summary>The dominant sequence transduction models are based on complex
      recurrent networks.</summary>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
    <author><name>Niki Parmar</name></author>
    <author><name>Jakob Uszkoreit</name></author>
    <author><name>Llion Jones</name></author>
    <author><name>Aidan Gomez</name></author>
    <author><name>Lukasz Kaiser</name></author>
    <link href="http://arxiv.org/abs/1706.03762v7" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/1706.03762v7" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2005.11401v4</id>
    <published>2020-05-22T21:34:34Z</published>
    <title>Retrieval-Augmented Generation</title>
    <summary>Short abstract.</summary>
    <author><name>Patrick Lewis</name></author>
    <link href="http://arxiv.org/abs/2005.11401v4" rel="alternate" type="text/html"/>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_entries() {
        let papers = parse_atom_feed(FEED.as_bytes(), Some("AI"), Some("Transformers")).unwrap();
        assert_eq!(papers.len(), 2);

        let first = &papers[0];
        assert_eq!(first.title, "Attention Is All You Need");
        assert_eq!(first.year, Some(2017));
        assert_eq!(first.venue, "arXiv");
        assert_eq!(first.source, "arxiv");
        assert_eq!(first.authors.len(), 5, "authors cap at five");
        assert_eq!(
            first.pdf_url.as_deref(),
            Some("http://arxiv.org/pdf/1706.03762v7")
        );
        assert_eq!(first.landing_url, "http://arxiv.org/abs/1706.03762v7");
        assert_eq!(first.subject.as_deref(), Some("AI"));
        assert_eq!(first.topic.as_deref(), Some("Transformers"));
    }

    #[test]
    fn test_parse_feed_derives_pdf_url() {
        let papers = parse_atom_feed(FEED.as_bytes(), None, None).unwrap();
        assert_eq!(
            papers[1].pdf_url.as_deref(),
            Some("http://arxiv.org/pdf/2005.11401v4"),
            "abs id rewrites to a pdf url when no pdf link is present"
        );
    }

    #[test]
    fn test_abstract_truncation() {
        let long = "a".repeat(600);
        let truncated = truncate_abstract(&long);
        assert_eq!(truncated.chars().count(), 503);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate_abstract("short"), "short");
    }

    #[test]
    fn test_search_term_order() {
        assert_eq!(
            search_term("attention", Some("AI"), Some("Transformers")),
            "Transformers AI attention"
        );
        assert_eq!(search_term("attention", None, None), "attention");
        assert_eq!(search_term("attention", Some("  "), None), "attention");
    }

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub"
        }

        fn dims(&self) -> usize {
            2
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn test_config(tmp: &TempDir) -> Config {
        let content = format!(
            r#"
[db]
path = "{}/refdesk.sqlite"

[library]
root = "{}/papers"
"#,
            tmp.path().display(),
            tmp.path().display()
        );
        toml::from_str(&content).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_rejects_empty_url() {
        let tmp = TempDir::new().unwrap();
        let cfg = test_config(&tmp);
        let index = LibraryIndex::open_with(&cfg, Arc::new(StubEmbedder))
            .await
            .unwrap();

        let report = fetch(&index, "  ", "Title", None, None, None, true).await;
        assert!(!report.success);
        assert!(!report.indexed);
        assert_eq!(report.message, "No PDF URL provided");
    }

    #[tokio::test]
    async fn test_fetch_reports_download_failure() {
        let tmp = TempDir::new().unwrap();
        let cfg = test_config(&tmp);
        let index = LibraryIndex::open_with(&cfg, Arc::new(StubEmbedder))
            .await
            .unwrap();

        let report = fetch(
            &index,
            "http://127.0.0.1:1/paper.pdf",
            "Unreachable",
            None,
            None,
            None,
            true,
        )
        .await;
        assert!(!report.success);
        assert!(report.file_path.is_none());
        assert!(report.message.starts_with("Download failed:"), "{}", report.message);
    }

    #[tokio::test]
    async fn test_fetch_downloads_and_indexes() {
        let tmp = TempDir::new().unwrap();
        let cfg = test_config(&tmp);
        let index = LibraryIndex::open_with(&cfg, Arc::new(StubEmbedder))
            .await
            .unwrap();

        let bytes = test_pdf::pdf_bytes("fetched paper text");
        let app = axum::Router::new().route(
            "/paper.pdf",
            axum::routing::get(move || {
                let bytes = bytes.clone();
                async move { bytes }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let url = format!("http://{}/paper.pdf", addr);
        let report = fetch(
            &index,
            &url,
            "Fetched Paper",
            Some(2024),
            Some("AI"),
            Some("Agents"),
            true,
        )
        .await;

        assert!(report.success, "{}", report.message);
        assert!(report.indexed, "{}", report.message);
        assert!(report.message.contains("Downloaded:"));
        assert!(report.message.contains("Added to vector database ✓"));
        let path = report.file_path.unwrap();
        assert!(path.ends_with("AI/Agents/Fetched Paper - 2024.pdf"), "{}", path);
        assert!(std::path::Path::new(&path).exists());

        // The same fetch again downloads but does not duplicate the paper.
        let again = fetch(
            &index,
            &url,
            "Fetched Paper",
            Some(2024),
            Some("AI"),
            Some("Agents"),
            true,
        )
        .await;
        assert!(again.success);
        assert!(!again.indexed);
        assert!(again.message.contains("already indexed"));
    }
}
