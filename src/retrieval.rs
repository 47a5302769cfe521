//! Retrieval: metadata-filtered vector search over the chunk store.
//!
//! Two entry paths. A caller-supplied filter goes straight to filtered
//! search. An empty filter first runs the query planner, which may rewrite
//! the query and infer filters from the corpus's known subjects and topics;
//! any planner failure falls back to the original query unfiltered.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::Row;
use std::cmp::Ordering;

use crate::embedding::{self, blob_to_vec, cosine_similarity};
use crate::index::LibraryIndex;
use crate::llm::{self, ChatModel};
use crate::models::{PaperChunk, ScoredChunk};

/// Equality filters over chunk metadata. All present fields must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub subject: Option<String>,
    pub topic: Option<String>,
    pub year: Option<i64>,
}

impl QueryFilter {
    pub fn is_empty(&self) -> bool {
        self.subject.is_none() && self.topic.is_none() && self.year.is_none()
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "subject": self.subject,
            "topic": self.topic,
            "year": self.year,
        })
    }
}

/// Top-k chunks for a query. Planner runs only when the filter is empty and
/// a chat provider is configured.
pub async fn retrieve(
    index: &LibraryIndex,
    chat: &dyn ChatModel,
    query: &str,
    filter: &QueryFilter,
    k: usize,
) -> Result<Vec<ScoredChunk>> {
    if !filter.is_empty() {
        return search_filtered(index, query, filter, k).await;
    }

    let (planned_query, planned_filter) = if index.config().chat.is_enabled() {
        plan_query(index, chat, query).await
    } else {
        (query.to_string(), QueryFilter::default())
    };
    search_filtered(index, &planned_query, &planned_filter, k).await
}

/// Embed the query and rank every chunk that passes the filter.
pub async fn search_filtered(
    index: &LibraryIndex,
    query: &str,
    filter: &QueryFilter,
    k: usize,
) -> Result<Vec<ScoredChunk>> {
    index.initialize().await?;
    let k = k.clamp(1, index.config().retrieval.max_k);

    // An empty store matches nothing; skip the embedding call.
    let embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
        .fetch_one(index.pool())
        .await?;
    if embedded == 0 {
        return Ok(Vec::new());
    }

    let query_vec = embedding::embed_query(index.embedder(), query).await?;

    let rows = sqlx::query(
        r#"
        SELECT c.id, c.paper_id, c.chunk_index, c.page, c.text, c.hash,
               c.subject, c.topic, c.title, c.year, c.relpath,
               v.embedding
        FROM chunks c
        JOIN chunk_vectors v ON v.chunk_id = c.id
        WHERE (?1 IS NULL OR c.subject = ?1)
          AND (?2 IS NULL OR c.topic = ?2)
          AND (?3 IS NULL OR c.year = ?3)
        "#,
    )
    .bind(&filter.subject)
    .bind(&filter.topic)
    .bind(filter.year)
    .fetch_all(index.pool())
    .await?;

    let mut candidates = Vec::with_capacity(rows.len());
    for row in &rows {
        let chunk = PaperChunk {
            id: row.get("id"),
            paper_id: row.get("paper_id"),
            chunk_index: row.get("chunk_index"),
            page: row.get("page"),
            text: row.get("text"),
            hash: row.get("hash"),
            subject: row.get("subject"),
            topic: row.get("topic"),
            title: row.get("title"),
            year: row.get("year"),
            relpath: row.get("relpath"),
        };
        let vector = blob_to_vec(row.get::<Vec<u8>, _>("embedding").as_slice());
        candidates.push((chunk, vector));
    }

    Ok(rank_chunks(candidates, &query_vec, k))
}

/// Cosine ranking with a stable order: score descending, chunk id ascending
/// on ties.
fn rank_chunks(
    candidates: Vec<(PaperChunk, Vec<f32>)>,
    query_vec: &[f32],
    k: usize,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .map(|(chunk, vector)| {
            let score = cosine_similarity(query_vec, &vector) as f64;
            ScoredChunk { chunk, score }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    scored.truncate(k);
    scored
}

// ============ Query planner ============

const PLANNER_PROMPT: &str = r#"You are a query planner for a research paper database.
Rewrite the user's question as a focused search query, and propose metadata
filters only when the question clearly implies them.

Known subjects: {subjects}
Known topics: {topics}

Respond with JSON only, in exactly this shape:
{"query": "<search query>", "filters": {"subject": null, "topic": null, "year": null}}

Only use subject and topic values from the known lists. Use null when unsure.

Question: {question}"#;

/// Ask the chat model to rewrite the query and infer filters. Every failure
/// mode (transport, refusal, malformed JSON) falls back to the original
/// query with no filters.
async fn plan_query(
    index: &LibraryIndex,
    chat: &dyn ChatModel,
    query: &str,
) -> (String, QueryFilter) {
    let hints = match index.planner_hints().await {
        Ok(h) => h,
        Err(_) => return (query.to_string(), QueryFilter::default()),
    };

    let prompt = PLANNER_PROMPT
        .replace("{subjects}", &hints.subjects.join(", "))
        .replace("{topics}", &hints.topics.join(", "))
        .replace("{question}", query);

    match llm::complete_text(chat, &prompt).await {
        Ok(reply) => parse_planned(&reply, query),
        Err(_) => (query.to_string(), QueryFilter::default()),
    }
}

/// Parse the planner reply. Models wrap JSON in code fences often enough
/// that we strip them first.
fn parse_planned(reply: &str, original_query: &str) -> (String, QueryFilter) {
    let cleaned = strip_code_fences(reply);
    let value: serde_json::Value = match serde_json::from_str(cleaned) {
        Ok(v) => v,
        Err(_) => return (original_query.to_string(), QueryFilter::default()),
    };

    let planned_query = value
        .get("query")
        .and_then(|q| q.as_str())
        .filter(|q| !q.trim().is_empty())
        .unwrap_or(original_query)
        .to_string();

    let mut filter = QueryFilter::default();
    if let Some(filters) = value.get("filters") {
        filter.subject = non_empty_str(filters.get("subject"));
        filter.topic = non_empty_str(filters.get("topic"));
        filter.year = filters.get("year").and_then(coerce_year);
    }
    (planned_query, filter)
}

fn non_empty_str(value: Option<&serde_json::Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Planners return years as numbers or strings interchangeably.
fn coerce_year(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the fence line (may carry a language tag), then the closing fence.
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    body.trim().strip_suffix("```").unwrap_or(body).trim()
}
