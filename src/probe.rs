//! Probe: retrieve, answer over the retrieved context, and score the result.
//!
//! `run_probe` never returns an error. Anything that goes wrong inside
//! retrieval or synthesis is folded into a "Not Found" report so tool
//! callers always get a well-formed payload.

use anyhow::Result;
use serde::Serialize;

use crate::index::LibraryIndex;
use crate::llm::{self, ChatModel};
use crate::models::ScoredChunk;
use crate::retrieval::{self, QueryFilter};

const NO_MATCH_TEXT: &str = "No documents found matching the specified filters.";

const ANSWER_PROMPT: &str = "Use the following pieces of context to answer the question at the end. \nIf you don't know the answer, just say that you don't know, don't try to make up an answer.\n\nContext:\n{context}\n\nQuestion: {question}\n\nAnswer:";

/// One retrieved chunk, reduced to what a citation needs. `page` is 1-based.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub paper_title: Option<String>,
    pub year: Option<i64>,
    pub topic: Option<String>,
    pub subject: Option<String>,
    pub page: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub topic: String,
    pub category: String,
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub confidence: f64,
    pub query: String,
    /// Echo of the caller-supplied filters only; planner-inferred filters
    /// are not reported here.
    pub filters_applied: serde_json::Value,
}

/// Answer a question against the corpus.
pub async fn run_probe(
    index: &LibraryIndex,
    chat: &dyn ChatModel,
    query: &str,
    filter: &QueryFilter,
    k: usize,
) -> ProbeReport {
    match probe_inner(index, chat, query, filter, k).await {
        Ok(report) => report,
        Err(e) => ProbeReport {
            topic: short_topic(query),
            category: "Not Found".to_string(),
            response: format!("## Error\n\n{}", e),
            sources: Vec::new(),
            confidence: 0.0,
            query: query.to_string(),
            filters_applied: filter.to_json(),
        },
    }
}

async fn probe_inner(
    index: &LibraryIndex,
    chat: &dyn ChatModel,
    query: &str,
    filter: &QueryFilter,
    k: usize,
) -> Result<ProbeReport> {
    let chunks = retrieval::retrieve(index, chat, query, filter, k).await?;
    if chunks.is_empty() {
        return Ok(no_match_report(query, filter));
    }

    let context = chunks
        .iter()
        .map(|s| s.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");
    let prompt = ANSWER_PROMPT
        .replace("{context}", &context)
        .replace("{question}", query);
    let answer = llm::complete_text(chat, &prompt).await?;
    let answer = answer.trim().to_string();

    let sources: Vec<SourceRef> = chunks.iter().map(source_ref).collect();
    let confidence = confidence_score(&answer, sources.len());
    let category = resolve_category(&answer, &sources, filter);
    let response = render_markdown(&answer, &sources);

    Ok(ProbeReport {
        topic: short_topic(query),
        category,
        response,
        sources,
        confidence,
        query: query.to_string(),
        filters_applied: filter.to_json(),
    })
}

fn no_match_report(query: &str, filter: &QueryFilter) -> ProbeReport {
    ProbeReport {
        topic: short_topic(query),
        category: "Not Found".to_string(),
        response: NO_MATCH_TEXT.to_string(),
        sources: Vec::new(),
        confidence: 0.0,
        query: query.to_string(),
        filters_applied: filter.to_json(),
    }
}

fn source_ref(scored: &ScoredChunk) -> SourceRef {
    let c = &scored.chunk;
    SourceRef {
        paper_title: if c.title.trim().is_empty() {
            None
        } else {
            Some(c.title.clone())
        },
        year: c.year,
        topic: c.topic.clone(),
        subject: Some(c.subject.clone()),
        page: c.page + 1,
    }
}

// ============ Scoring and categorization ============

/// 0.1 per source, plus 0.3 when the answer is substantive, capped at 1.0.
pub fn confidence_score(answer: &str, source_count: usize) -> f64 {
    let mut score = 0.1 * source_count as f64;
    if !answer.trim().is_empty() && !admits_unknown(answer) {
        score += 0.3;
    }
    score.min(1.0)
}

fn admits_unknown(answer: &str) -> bool {
    answer.to_lowercase().contains("don't know")
}

/// Category comes from the caller's topic filter when given, else from the
/// first source's topic. Zero sources always categorize as "Not Found", as
/// does an I-don't-know answer when no topic filter pinned the category.
fn resolve_category(answer: &str, sources: &[SourceRef], filter: &QueryFilter) -> String {
    let mut category = String::from("General");
    if let Some(topic) = &filter.topic {
        category = topic.clone();
    } else if let Some(first) = sources.first() {
        if let Some(t) = &first.topic {
            category = t.clone();
        }
    }
    if sources.is_empty() || (admits_unknown(answer) && filter.topic.is_none()) {
        category = "Not Found".to_string();
    }
    category
}

/// Render the markdown report. Citation numbers follow retrieval order;
/// titleless sources keep their number but emit no line.
fn render_markdown(answer: &str, sources: &[SourceRef]) -> String {
    let mut out = String::from("## Answer\n\n");
    if answer.is_empty() {
        out.push_str("*No answer available.*\n");
    } else {
        out.push_str(answer);
        out.push('\n');
    }

    if !sources.is_empty() {
        out.push_str("\n## Sources\n\n");
        for (i, source) in sources.iter().enumerate() {
            let Some(title) = &source.paper_title else {
                continue;
            };
            out.push_str(&format!("{}. *{}*", i + 1, title));
            if let Some(year) = source.year {
                out.push_str(&format!(" ({})", year));
            }
            out.push_str(&format!(" p.{}", source.page));
            if let Some(topic) = &source.topic {
                out.push_str(&format!(" [{}]", topic));
            }
            out.push('\n');
        }
    }
    out
}

/// Report label: the question up to its first '?', capped at 50 chars.
fn short_topic(query: &str) -> String {
    let head = match query.split('?').next() {
        Some(h) => h,
        None => query,
    };
    head.trim().chars().take(50).collect()
}
