//! HTTP tool host.
//!
//! Exposes the built-in research tools over a JSON HTTP API that the agent's
//! tool bridge (and any other HTTP client) can drive.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call a registered tool by name |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Error responses carry a machine-readable code and a message:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "missing required parameter: query" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `provider_disabled` (400),
//! `timeout` (408), `tool_error` (500). Successful calls wrap the payload as
//! `{ "result": ... }`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-based clients
//! can call tools directly.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::index::LibraryIndex;
use crate::llm::{self, ChatModel};
use crate::progress::ProgressMode;
use crate::tools::{ToolContext, ToolInfo, ToolRegistry};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    index: Arc<LibraryIndex>,
    chat: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
}

/// Start the tool server with the providers named in config.
///
/// Reconciles the library against the index before accepting requests, so a
/// freshly started server always serves the papers on disk.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let index = LibraryIndex::open(config).await?;
    let chat = llm::create_chat_model(&config.chat)?;
    run_server_with(config, index, chat).await
}

/// Start the tool server with explicit services. Tests inject stub
/// embedding and chat providers here.
pub async fn run_server_with(
    config: &Config,
    index: Arc<LibraryIndex>,
    chat: Arc<dyn ChatModel>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    index.initialize().await?;
    let reporter = ProgressMode::default_for_tty().reporter();
    let report = index.reconcile(reporter.as_ref()).await?;
    if report.indexed > 0 || !report.failed.is_empty() {
        println!(
            "Indexed {} new papers ({} chunks), {} failed",
            report.indexed,
            report.chunks_written,
            report.failed.len()
        );
    }
    let summary = index.summary().await?;
    println!(
        "Loaded {} chunks from {} papers",
        summary.chunks, summary.unique_titles
    );

    let registry = Arc::new(ToolRegistry::with_builtins());
    println!("Registered {} tools:", registry.len());
    for t in registry.infos() {
        println!("  POST /tools/{} — {}", t.name, t.description);
    }

    let state = AppState {
        config: Arc::new(config.clone()),
        index,
        chat,
        tools: registry,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("Tool server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn timeout_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::REQUEST_TIMEOUT,
        code: "timeout".to_string(),
        message: message.into(),
    }
}

fn tool_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "tool_error".to_string(),
        message: message.into(),
    }
}

/// Map tool execution errors to HTTP statuses by message shape, so tools
/// signal client errors without a custom error type in the `Tool` trait.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let msg = err.to_string();

    if msg.contains("missing required parameter")
        || msg.contains("must be of type")
        || msg.contains("must be between")
        || msg.contains("must be one of")
        || msg.contains("unknown parameter")
        || msg.contains("must be a JSON object")
    {
        bad_request(format!("{}: {}", tool_name, msg))
    } else if msg.contains("provider is disabled") {
        let mut e = bad_request(format!("{}: {}", tool_name, msg));
        e.code = "provider_disabled".to_string();
        e
    } else if msg.contains("timed out") {
        timeout_error(format!("{}: {}", tool_name, msg))
    } else {
        tool_error(format!("{}: {}", tool_name, msg))
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: state.tools.infos(),
    })
}

// ============ POST /tools/{name} ============

async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let ctx = ToolContext {
        config: state.config.clone(),
        index: state.index.clone(),
        chat: state.chat.clone(),
    };
    let result = tool
        .execute(params, &ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(json!({ "result": result })))
}
