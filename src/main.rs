//! # Refdesk CLI (`rd`)
//!
//! The `rd` binary is the primary interface for Refdesk. It provides commands
//! for database initialization, library indexing, retrieval probes with cited
//! answers, arXiv discovery and fetching, agent chat, and starting the HTTP
//! tool server.
//!
//! ## Usage
//!
//! ```bash
//! rd --config ./config/refdesk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rd init` | Create the SQLite database and run schema migrations |
//! | `rd index` | Scan the library root and index new PDFs |
//! | `rd probe "<question>"` | Answer a question from the indexed corpus |
//! | `rd arxiv "<query>"` | Search arXiv for papers |
//! | `rd fetch <pdf-url>` | Download a paper into the library and index it |
//! | `rd ask "<message>"` | Chat with the research agent via the tool server |
//! | `rd serve` | Start the HTTP tool server |
//! | `rd stats` | Show library statistics |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! rd init --config ./config/refdesk.toml
//!
//! # Index everything under the library root
//! rd index
//!
//! # Probe the corpus with metadata filters
//! rd probe "How does attention scale with sequence length?" --subject AI --topic Transformers
//!
//! # Discover papers on arXiv
//! rd arxiv "retrieval augmented generation" --subject AI --max-results 5
//!
//! # Fetch a specific paper into the library
//! rd fetch https://arxiv.org/pdf/1706.03762 --title "Attention Is All You Need" --year 2017 --subject AI
//!
//! # Start the tool server, then chat with the agent from another shell
//! rd serve
//! rd ask "Find and summarize recent work on sparse attention"
//! ```

mod agent;
mod arxiv;
mod bridge;
mod chunk;
mod config;
mod db;
mod embedding;
mod extract;
mod index;
mod llm;
mod metadata;
mod migrate;
mod models;
mod probe;
mod progress;
mod retrieval;
mod server;
mod stats;
#[cfg(test)]
mod test_pdf;
mod tools;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::ResearchAgent;
use crate::bridge::ToolBridge;
use crate::index::LibraryIndex;
use crate::progress::ProgressMode;
use crate::retrieval::QueryFilter;

/// Refdesk CLI: a local-first research paper library with filtered
/// retrieval and agent tooling.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/refdesk.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rd",
    about = "Refdesk — a local-first research paper library with retrieval and agent tooling",
    version,
    long_about = "Refdesk indexes a directory tree of research PDFs into SQLite, answers \
    questions with filtered semantic retrieval and cited sources, discovers and fetches new \
    papers from arXiv, and exposes the whole pipeline as HTTP tools for an autonomous \
    research agent."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/refdesk.toml`. All library, database, model,
    /// and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/refdesk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (papers, chunks, chunk_vectors). This command is idempotent;
    /// running it multiple times is safe.
    Init,

    /// Scan the library and index new papers.
    ///
    /// Walks the configured library root, extracts text from PDFs that are
    /// not yet indexed, chunks and embeds them, and stores everything in
    /// SQLite. Already-indexed papers are skipped. Papers that fail to
    /// parse are reported and retried on the next run.
    Index {
        /// Clear the database first and reindex every paper from scratch.
        #[arg(long)]
        rebuild: bool,

        /// Progress reporting: `off`, `human`, or `json`.
        /// Defaults to `human` when stderr is a TTY, otherwise `off`.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Answer a question from the indexed corpus.
    ///
    /// Retrieves the most relevant chunks (optionally restricted by
    /// subject, topic, and year), synthesizes a cited answer with the
    /// configured chat model, and prints a markdown report.
    Probe {
        /// The research question.
        query: String,

        /// Only consider papers filed under this subject.
        #[arg(long)]
        subject: Option<String>,

        /// Only consider papers filed under this topic.
        #[arg(long)]
        topic: Option<String>,

        /// Only consider papers published in this year.
        #[arg(long)]
        year: Option<i64>,

        /// Number of chunks to retrieve.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Search arXiv for papers.
    ///
    /// Queries the arXiv API sorted by relevance and prints the matching
    /// papers with authors, abstracts, and PDF links.
    Arxiv {
        /// The search query.
        query: String,

        /// Subject term prepended to the query (echoed into results).
        #[arg(long)]
        subject: Option<String>,

        /// Topic term prepended to the query (echoed into results).
        #[arg(long)]
        topic: Option<String>,

        /// Maximum number of results (1-50).
        #[arg(long)]
        max_results: Option<usize>,
    },

    /// Download a paper into the library and index it.
    ///
    /// Fetches the PDF, files it under `<subject>/<topic>/` in the library
    /// root, and indexes it into the vector database unless `--no-index`
    /// is given.
    Fetch {
        /// Direct URL of the PDF (an arXiv abs URL also works).
        pdf_url: String,

        /// Paper title, used for the filename.
        #[arg(long)]
        title: String,

        /// Publication year, used for the filename.
        #[arg(long)]
        year: Option<i64>,

        /// Subject directory to file the paper under.
        #[arg(long)]
        subject: Option<String>,

        /// Topic directory to file the paper under.
        #[arg(long)]
        topic: Option<String>,

        /// Download only; skip indexing.
        #[arg(long)]
        no_index: bool,
    },

    /// Chat with the research agent.
    ///
    /// Sends one message through the agent loop. The agent discovers the
    /// tool server's tools, probes the local corpus, searches arXiv, and
    /// downloads papers as needed before answering. Requires a running
    /// `rd serve` and a configured chat provider.
    Ask {
        /// The message to send.
        message: String,

        /// Tool server base URL. Defaults to `[agent].tool_host` from config.
        #[arg(long)]
        host: Option<String>,
    },

    /// Start the HTTP tool server.
    ///
    /// Reconciles the library, then binds to the address configured in
    /// `[server].bind` and serves the tool endpoints used by agents and
    /// the `rd ask` command.
    Serve,

    /// Show library statistics.
    ///
    /// Prints paper, chunk, and embedding coverage counts plus a
    /// per-subject breakdown.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index { rebuild, progress } => {
            let mode = match progress.as_deref() {
                Some(flag) => ProgressMode::from_flag(flag)?,
                None => ProgressMode::default_for_tty(),
            };
            let index = LibraryIndex::open(&cfg).await?;
            if rebuild {
                index.clear().await?;
                println!("Cleared existing index.");
            }
            let reporter = mode.reporter();
            let report = index.reconcile(reporter.as_ref()).await?;
            println!("Scan complete:");
            println!("  discovered:      {}", report.discovered);
            println!("  newly indexed:   {}", report.indexed);
            println!("  already indexed: {}", report.already_indexed);
            println!("  chunks written:  {}", report.chunks_written);
            if !report.failed.is_empty() {
                println!("  failed:          {}", report.failed.len());
                for (relpath, err) in &report.failed {
                    eprintln!("    {}: {}", relpath, err);
                }
            }
        }
        Commands::Probe {
            query,
            subject,
            topic,
            year,
            k,
        } => {
            let index = LibraryIndex::open(&cfg).await?;
            let chat = llm::create_chat_model(&cfg.chat)?;
            let filter = QueryFilter {
                subject,
                topic,
                year,
            };
            let k = k.unwrap_or(cfg.retrieval.default_k);
            let report = probe::run_probe(&index, chat.as_ref(), &query, &filter, k).await;
            println!("{}", report.response);
            println!();
            println!(
                "Confidence: {:.2} | Category: {}",
                report.confidence, report.category
            );
        }
        Commands::Arxiv {
            query,
            subject,
            topic,
            max_results,
        } => {
            let n = max_results.unwrap_or(cfg.arxiv.max_results);
            let report =
                arxiv::search(&cfg, &query, subject.as_deref(), topic.as_deref(), n).await?;
            if report.papers.is_empty() {
                println!("No papers found for \"{}\"", report.query);
            } else {
                println!(
                    "Found {} paper{} for \"{}\"",
                    report.count,
                    if report.count == 1 { "" } else { "s" },
                    report.query
                );
                for (i, paper) in report.papers.iter().enumerate() {
                    println!();
                    match paper.year {
                        Some(year) => println!("{}. {} ({})", i + 1, paper.title, year),
                        None => println!("{}. {}", i + 1, paper.title),
                    }
                    if !paper.authors.is_empty() {
                        println!("   {}", paper.authors.join(", "));
                    }
                    if let Some(url) = &paper.pdf_url {
                        println!("   pdf: {}", url);
                    }
                    println!("   {}", paper.summary);
                }
            }
        }
        Commands::Fetch {
            pdf_url,
            title,
            year,
            subject,
            topic,
            no_index,
        } => {
            let index = LibraryIndex::open(&cfg).await?;
            let report = arxiv::fetch(
                &index,
                &pdf_url,
                &title,
                year,
                subject.as_deref(),
                topic.as_deref(),
                !no_index,
            )
            .await;
            if report.success {
                println!("{}", report.message);
            } else {
                anyhow::bail!("{}", report.message);
            }
        }
        Commands::Ask { message, host } => {
            let chat = llm::create_chat_model(&cfg.chat)?;
            let host = host.unwrap_or_else(|| cfg.agent.tool_host.clone());
            let bridge = Arc::new(ToolBridge::new(&host)?);
            let mut agent = match &cfg.agent.system_prompt {
                Some(prompt) => ResearchAgent::with_system_prompt(chat, bridge, prompt.clone()),
                None => ResearchAgent::new(chat, bridge),
            };
            let reply = agent.chat(&message).await?;
            println!("{}", reply);
            agent.close();
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
