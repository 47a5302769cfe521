//! Built-in tools and the registry the server exposes them through.
//!
//! Every tool declares an OpenAI function-calling JSON Schema. Incoming
//! parameters are validated against that schema before execution, so a tool
//! body can assume required fields exist with the right types.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::arxiv;
use crate::config::Config;
use crate::index::LibraryIndex;
use crate::llm::ChatModel;
use crate::probe;
use crate::retrieval::QueryFilter;

/// Shared services handed to every tool execution.
#[derive(Clone)]
pub struct ToolContext {
    pub config: Arc<Config>,
    pub index: Arc<LibraryIndex>,
    pub chat: Arc<dyn ChatModel>,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> serde_json::Value;

    fn is_builtin(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value>;
}

/// Serializable tool info for the `/tools/list` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub builtin: bool,
    pub parameters: serde_json::Value,
}

// ============ Registry ============

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ProbeTool));
        registry.register(Arc::new(SearchArxivTool));
        registry.register(Arc::new(DownloadPaperTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                builtin: t.is_builtin(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ============ Parameter validation ============

/// Validate parameters against a tool schema: required fields, types, enum
/// constraints. Explicit nulls are treated as absent, and defaults are
/// injected for missing optional fields. Returns the enriched parameters.
pub fn validate_params(
    schema: &serde_json::Value,
    params: &serde_json::Value,
) -> Result<serde_json::Value> {
    let mut out = match params.as_object() {
        Some(map) => map.clone(),
        None if params.is_null() => serde_json::Map::new(),
        None => bail!(
            "parameters must be a JSON object, got {}",
            json_type_name(params)
        ),
    };
    out.retain(|_, v| !v.is_null());

    let empty = serde_json::Map::new();
    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .unwrap_or(&empty);

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|v| v.as_str()) {
            if !out.contains_key(field) {
                bail!("missing required parameter: {}", field);
            }
        }
    }

    for (name, prop) in properties {
        let Some(value) = out.get(name) else {
            if let Some(default) = prop.get("default") {
                out.insert(name.clone(), default.clone());
            }
            continue;
        };

        if let Some(expected) = prop.get("type").and_then(|t| t.as_str()) {
            let type_ok = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !type_ok {
                bail!(
                    "parameter '{}' must be of type '{}', got {}",
                    name,
                    expected,
                    json_type_name(value)
                );
            }
        }

        if let Some(allowed) = prop.get("enum").and_then(|e| e.as_array()) {
            if !allowed.contains(value) {
                let list: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                bail!(
                    "parameter '{}' must be one of [{}], got {}",
                    name,
                    list.join(", "),
                    value
                );
            }
        }
    }

    Ok(serde_json::Value::Object(out))
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn opt_int(params: &serde_json::Value, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| v.as_i64())
}

fn check_range(name: &str, value: i64, min: i64, max: i64) -> Result<()> {
    if !(min..=max).contains(&value) {
        bail!(
            "parameter '{}' must be between {} and {}, got {}",
            name,
            min,
            max,
            value
        );
    }
    Ok(())
}

// ============ research_paper_probe ============

pub struct ProbeTool;

#[async_trait]
impl Tool for ProbeTool {
    fn name(&self) -> &str {
        "research_paper_probe"
    }

    fn description(&self) -> &str {
        "Answer a research question from the local paper library, with cited sources and a confidence score"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The research question to answer" },
                "topic": { "type": "string", "description": "Restrict retrieval to one topic, e.g. \"Agents\"" },
                "subject": { "type": "string", "description": "Restrict retrieval to one subject, e.g. \"Artificial Intelligence\"" },
                "year": { "type": "integer", "description": "Restrict retrieval to papers from one year (1900-2100)" },
                "k": { "type": "integer", "description": "Number of chunks to retrieve (1-50, default 10)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value> {
        let params = validate_params(&self.parameters_schema(), &params)?;
        let query = params
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let filter = QueryFilter {
            subject: opt_str(&params, "subject"),
            topic: opt_str(&params, "topic"),
            year: opt_int(&params, "year"),
        };
        if let Some(year) = filter.year {
            check_range("year", year, 1900, 2100)?;
        }
        let k = opt_int(&params, "k").unwrap_or(ctx.config.retrieval.default_k as i64);
        check_range("k", k, 1, 50)?;

        let report =
            probe::run_probe(&ctx.index, ctx.chat.as_ref(), &query, &filter, k as usize).await;
        Ok(serde_json::to_value(report)?)
    }
}

// ============ search_arxiv ============

pub struct SearchArxivTool;

#[async_trait]
impl Tool for SearchArxivTool {
    fn name(&self) -> &str {
        "search_arxiv"
    }

    fn description(&self) -> &str {
        "Search arXiv for papers, relevance-sorted, returning titles, abstracts, and PDF links"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Free-text search terms" },
                "subject": { "type": "string", "description": "Subject used to sharpen the search and label results" },
                "topic": { "type": "string", "description": "Topic used to sharpen the search and label results" },
                "max_results": { "type": "integer", "description": "Number of papers to return (1-50, default 10)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value> {
        let params = validate_params(&self.parameters_schema(), &params)?;
        let query = params
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let subject = opt_str(&params, "subject");
        let topic = opt_str(&params, "topic");
        let n = opt_int(&params, "max_results").unwrap_or(ctx.config.arxiv.max_results as i64);
        check_range("max_results", n, 1, 50)?;

        let report = arxiv::search(
            &ctx.config,
            &query,
            subject.as_deref(),
            topic.as_deref(),
            n as usize,
        )
        .await?;
        Ok(serde_json::to_value(report)?)
    }
}

// ============ download_paper ============

pub struct DownloadPaperTool;

#[async_trait]
impl Tool for DownloadPaperTool {
    fn name(&self) -> &str {
        "download_paper"
    }

    fn description(&self) -> &str {
        "Download a paper PDF into the library and index it for retrieval"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "pdf_url": { "type": "string", "description": "Direct PDF link, e.g. an arXiv pdf url" },
                "title": { "type": "string", "description": "Paper title, used to name the file" },
                "year": { "type": "integer", "description": "Publication year (1900-2100)" },
                "subject": { "type": "string", "description": "Library subject directory" },
                "topic": { "type": "string", "description": "Library topic directory" },
                "index": { "type": "boolean", "description": "Index the paper after download", "default": true }
            },
            "required": ["pdf_url", "title"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value> {
        let params = validate_params(&self.parameters_schema(), &params)?;
        let pdf_url = params
            .get("pdf_url")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let title = params
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let year = opt_int(&params, "year");
        if let Some(y) = year {
            check_range("year", y, 1900, 2100)?;
        }
        let subject = opt_str(&params, "subject");
        let topic = opt_str(&params, "topic");
        let index_after = params
            .get("index")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        let report = arxiv::fetch(
            &ctx.index,
            &pdf_url,
            &title,
            year,
            subject.as_deref(),
            topic.as_deref(),
            index_after,
        )
        .await;
        Ok(serde_json::to_value(report)?)
    }
}
