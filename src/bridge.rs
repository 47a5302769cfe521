//! Client side of the tool protocol.
//!
//! `ToolBridge` connects to a tool host, caches the advertised tool
//! descriptors, and validates arguments against them before anything goes
//! over the wire. Argument values are deliberately flat: text, number, or
//! flag. Arrays and nested objects are rejected at the bridge so malformed
//! model output fails with a message the model can act on.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Mutex;

use crate::llm::ToolSpec;

/// What the agent needs from a tool host. `ToolBridge` is the HTTP
/// implementation; tests drive the agent with in-memory fakes.
#[async_trait]
pub trait ToolDispatch: Send + Sync {
    /// Fetch and cache tool descriptors. Safe to call repeatedly; only the
    /// first call talks to the host.
    async fn connect(&self) -> Result<()>;

    /// Function-calling specs for every known tool.
    async fn tool_specs(&self) -> Result<Vec<ToolSpec>>;

    fn has_tool(&self, name: &str) -> bool;

    /// Validate arguments and invoke the tool. Returns the result payload
    /// rendered as a string for the model.
    async fn dispatch(&self, name: &str, arguments: &Value) -> Result<String>;

    /// Drop the descriptor cache. Idempotent.
    fn close(&self);

    fn is_connected(&self) -> bool;
}

// ============ Argument model ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Text,
    Number,
    Flag,
    /// Schema types the bridge does not model; passed through unchecked.
    Opaque,
}

impl ArgKind {
    fn label(self) -> &'static str {
        match self {
            ArgKind::Text => "text",
            ArgKind::Number => "a number",
            ArgKind::Flag => "a flag",
            ArgKind::Opaque => "any value",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ArgKind,
    pub required: bool,
    pub description: String,
}

/// A single argument value after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Text(String),
    Number(f64),
    Flag(bool),
    Unset,
}

impl ArgValue {
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::Unset),
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Number(n) => n
                .as_f64()
                .map(Self::Number)
                .ok_or_else(|| anyhow!("number out of range")),
            Value::Bool(b) => Ok(Self::Flag(*b)),
            Value::Array(_) => bail!("arrays are not supported"),
            Value::Object(_) => bail!("nested objects are not supported"),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ArgValue::Text(_) => "text",
            ArgValue::Number(_) => "a number",
            ArgValue::Flag(_) => "a flag",
            ArgValue::Unset => "nothing",
        }
    }

    fn check_kind(&self, spec: &ArgSpec) -> Result<()> {
        if matches!(self, ArgValue::Unset) || matches!(spec.kind, ArgKind::Opaque) {
            return Ok(());
        }
        let ok = matches!(
            (self, spec.kind),
            (ArgValue::Text(_), ArgKind::Text)
                | (ArgValue::Number(_), ArgKind::Number)
                | (ArgValue::Flag(_), ArgKind::Flag)
        );
        if !ok {
            bail!(
                "argument '{}' expects {}, got {}",
                spec.name,
                spec.kind.label(),
                self.label()
            );
        }
        Ok(())
    }

    /// Integral numbers serialize as integers so hosts that type-check
    /// "integer" parameters accept values a model wrote as 5.0.
    fn into_json(self) -> Value {
        match self {
            Self::Text(s) => Value::String(s),
            Self::Number(f) => {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
                    json!(f as i64)
                } else {
                    json!(f)
                }
            }
            Self::Flag(b) => Value::Bool(b),
            Self::Unset => Value::Null,
        }
    }
}

// ============ Remote descriptors ============

#[derive(Debug, Clone)]
pub struct RemoteTool {
    pub name: String,
    pub description: String,
    /// The advertised JSON Schema, passed through to the model untouched.
    pub schema: Value,
    pub args: Vec<ArgSpec>,
}

fn parse_tool(value: &Value) -> Option<RemoteTool> {
    let name = value.get("name")?.as_str()?.to_string();
    let description = value
        .get("description")
        .and_then(|d| d.as_str())
        .unwrap_or_default()
        .to_string();
    let schema = value
        .get("parameters")
        .cloned()
        .unwrap_or_else(|| json!({ "type": "object", "properties": {} }));
    let args = parse_args(&schema);
    Some(RemoteTool {
        name,
        description,
        schema,
        args,
    })
}

fn parse_args(schema: &Value) -> Vec<ArgSpec> {
    let required: HashSet<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let mut args = Vec::new();
    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        for (name, prop) in props {
            let kind = match prop.get("type").and_then(|t| t.as_str()) {
                Some("string") => ArgKind::Text,
                Some("integer") | Some("number") => ArgKind::Number,
                Some("boolean") => ArgKind::Flag,
                _ => ArgKind::Opaque,
            };
            args.push(ArgSpec {
                name: name.clone(),
                kind,
                required: required.contains(name.as_str()),
                description: prop
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or_default()
                    .to_string(),
            });
        }
    }
    args
}

fn validate_args(tool: &RemoteTool, arguments: &Value) -> Result<Value> {
    let provided = match arguments {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        _ => bail!("arguments for '{}' must be a JSON object", tool.name),
    };

    for key in provided.keys() {
        if !tool.args.iter().any(|a| a.name == *key) {
            bail!("unknown argument '{}' for tool '{}'", key, tool.name);
        }
    }

    let mut body = serde_json::Map::new();
    for spec in &tool.args {
        let raw = provided.get(&spec.name).unwrap_or(&Value::Null);
        let value = ArgValue::from_json(raw)
            .with_context(|| format!("argument '{}' of tool '{}'", spec.name, tool.name))?;
        if matches!(value, ArgValue::Unset) {
            if spec.required {
                bail!(
                    "missing required argument '{}' for tool '{}'",
                    spec.name,
                    tool.name
                );
            }
            continue;
        }
        value.check_kind(spec)?;
        body.insert(spec.name.clone(), value.into_json());
    }
    Ok(Value::Object(body))
}

// ============ HTTP bridge ============

pub struct ToolBridge {
    base_url: String,
    client: reqwest::Client,
    tools: Mutex<Option<Vec<RemoteTool>>>,
}

impl ToolBridge {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            tools: Mutex::new(None),
        })
    }

    fn cached(&self) -> Option<Vec<RemoteTool>> {
        self.tools.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl ToolDispatch for ToolBridge {
    async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let url = format!("{}/tools/list", self.base_url);
        let payload: Value = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach tool host: {}", url))?
            .error_for_status()
            .context("tool host returned an error status")?
            .json()
            .await
            .context("tool host returned invalid JSON")?;

        let tools: Vec<RemoteTool> = payload
            .get("tools")
            .and_then(|t| t.as_array())
            .map(|arr| arr.iter().filter_map(parse_tool).collect())
            .unwrap_or_default();

        if let Ok(mut guard) = self.tools.lock() {
            *guard = Some(tools);
        }
        Ok(())
    }

    async fn tool_specs(&self) -> Result<Vec<ToolSpec>> {
        self.connect().await?;
        Ok(self
            .cached()
            .unwrap_or_default()
            .into_iter()
            .map(|t| ToolSpec {
                name: t.name,
                description: t.description,
                parameters: t.schema,
            })
            .collect())
    }

    fn has_tool(&self, name: &str) -> bool {
        self.cached()
            .map(|tools| tools.iter().any(|t| t.name == name))
            .unwrap_or(false)
    }

    async fn dispatch(&self, name: &str, arguments: &Value) -> Result<String> {
        self.connect().await?;
        let tools = self.cached().unwrap_or_default();
        let tool = tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| anyhow!("unknown tool: {}", name))?;

        let body = validate_args(tool, arguments)?;
        let url = format!("{}/tools/{}", self.base_url, name);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("tool call failed: {}", url))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .context("tool host returned invalid JSON")?;

        if !status.is_success() {
            let code = payload["error"]["code"].as_str().unwrap_or("error");
            let message = payload["error"]["message"]
                .as_str()
                .unwrap_or("tool call failed");
            bail!("{}: {}", code, message);
        }

        match payload.get("result") {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Ok(other.to_string()),
            None => bail!("tool host response missing result"),
        }
    }

    fn close(&self) {
        if let Ok(mut guard) = self.tools.lock() {
            *guard = None;
        }
    }

    fn is_connected(&self) -> bool {
        self.tools
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}
