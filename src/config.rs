use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub library: LibraryConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub arxiv: ArxivConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where the PDF corpus lives on disk.
#[derive(Debug, Deserialize, Clone)]
pub struct LibraryConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: 1500,
            overlap_chars: 250,
        }
    }
}

fn default_chunk_chars() -> usize {
    1500
}
fn default_overlap_chars() -> usize {
    250
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 400,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    400
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Chat-completion model used for answer synthesis, query planning, and the
/// agent loop.
#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: default_chat_model(),
            max_retries: 5,
            timeout_secs: 60,
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_chat_timeout_secs() -> u64 {
    60
}

impl ChatConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_max_k")]
    pub max_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: 10,
            max_k: 50,
        }
    }
}

fn default_k() -> usize {
    10
}
fn default_max_k() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArxivConfig {
    #[serde(default = "default_arxiv_api_url")]
    pub api_url: String,
    #[serde(default = "default_arxiv_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_arxiv_max_results")]
    pub max_results: usize,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            api_url: default_arxiv_api_url(),
            timeout_secs: 60,
            max_results: 10,
        }
    }
}

fn default_arxiv_api_url() -> String {
    "http://export.arxiv.org/api/query".to_string()
}
fn default_arxiv_timeout_secs() -> u64 {
    60
}
fn default_arxiv_max_results() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_tool_host")]
    pub tool_host: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tool_host: default_tool_host(),
            system_prompt: None,
        }
    }
}

fn default_tool_host() -> String {
    "http://127.0.0.1:8787".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_chars == 0 {
        anyhow::bail!("chunking.chunk_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.chunk_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.chunk_chars");
    }

    // Validate retrieval
    if config.retrieval.default_k < 1 {
        anyhow::bail!("retrieval.default_k must be >= 1");
    }
    if config.retrieval.max_k < config.retrieval.default_k {
        anyhow::bail!("retrieval.max_k must be >= retrieval.default_k");
    }

    // Validate embedding
    if !(1..=400).contains(&config.embedding.batch_size) {
        anyhow::bail!("embedding.batch_size must be in 1..=400");
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    match config.chat.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown chat provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Validate arxiv
    if !(1..=50).contains(&config.arxiv.max_results) {
        anyhow::bail!("arxiv.max_results must be in 1..=50");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Runs the full load path, validations included.
    fn load(content: &str) -> Result<Config> {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("refdesk.toml");
        std::fs::write(&path, content).unwrap();
        load_config(&path)
    }

    const MINIMAL: &str = r#"
[db]
path = "data/refdesk.sqlite"

[library]
root = "Papers"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let cfg = parse(MINIMAL).unwrap();
        assert_eq!(cfg.chunking.chunk_chars, 1500);
        assert_eq!(cfg.chunking.overlap_chars, 250);
        assert_eq!(cfg.embedding.provider, "disabled");
        assert_eq!(cfg.embedding.batch_size, 400);
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(cfg.chat.model, "gpt-4o-mini");
        assert_eq!(cfg.retrieval.default_k, 10);
        assert_eq!(cfg.retrieval.max_k, 50);
        assert_eq!(cfg.server.bind, "127.0.0.1:8787");
        assert_eq!(cfg.agent.tool_host, "http://127.0.0.1:8787");
        assert_eq!(cfg.library.include_globs, vec!["**/*.pdf".to_string()]);
    }

    #[test]
    fn test_minimal_config_passes_validation() {
        assert!(load(MINIMAL).is_ok());
    }

    #[test]
    fn test_rejects_zero_chunk_chars() {
        let content = format!("{}\n[chunking]\nchunk_chars = 0\n", MINIMAL);
        let err = load(&content).unwrap_err();
        assert!(err.to_string().contains("chunk_chars must be > 0"));
    }

    #[test]
    fn test_rejects_overlap_not_below_chunk_size() {
        let content = format!(
            "{}\n[chunking]\nchunk_chars = 100\noverlap_chars = 100\n",
            MINIMAL
        );
        let err = load(&content).unwrap_err();
        assert!(err
            .to_string()
            .contains("overlap_chars must be < chunking.chunk_chars"));
    }

    #[test]
    fn test_rejects_unknown_embedding_provider() {
        let content = format!("{}\n[embedding]\nprovider = \"cohere\"\n", MINIMAL);
        let err = load(&content).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_enabled_embedding_requires_dims_and_model() {
        let content = format!("{}\n[embedding]\nprovider = \"openai\"\n", MINIMAL);
        let err = load(&content).unwrap_err();
        assert!(err.to_string().contains("embedding.dims must be > 0"));

        let content = format!(
            "{}\n[embedding]\nprovider = \"openai\"\ndims = 1536\n",
            MINIMAL
        );
        let err = load(&content).unwrap_err();
        assert!(err.to_string().contains("embedding.model must be specified"));
    }

    #[test]
    fn test_rejects_max_k_below_default_k() {
        let content = format!("{}\n[retrieval]\ndefault_k = 20\nmax_k = 5\n", MINIMAL);
        let err = load(&content).unwrap_err();
        assert!(err.to_string().contains("max_k must be >="));
    }

    #[test]
    fn test_rejects_out_of_range_arxiv_max_results() {
        let content = format!("{}\n[arxiv]\nmax_results = 100\n", MINIMAL);
        let err = load(&content).unwrap_err();
        assert!(err.to_string().contains("arxiv.max_results"));
    }

    #[test]
    fn test_missing_file_error_names_path() {
        let err = load_config(Path::new("/nonexistent/refdesk.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
