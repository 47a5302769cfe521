//! # Refdesk
//!
//! A local-first research paper library with filtered retrieval and agent
//! tooling.
//!
//! Refdesk indexes a directory tree of research PDFs into SQLite, answers
//! questions with filtered semantic retrieval and cited sources, discovers
//! and fetches new papers from arXiv, and exposes the whole pipeline as
//! HTTP tools for an autonomous research agent.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │ PDF library │──▶│   Indexer    │──▶│  SQLite   │
//! │subject/topic│   │ Chunk+Embed  │   │  Vectors  │
//! └─────────────┘   └──────────────┘   └─────┬─────┘
//!        ▲                                   │
//!        │ fetch                 ┌───────────┤
//!   ┌────┴────┐                  ▼           ▼
//!   │  arXiv  │            ┌──────────┐ ┌──────────┐
//!   │   API   │◀───────────│   HTTP   │ │   CLI    │
//!   └─────────┘   search   │  tools   │ │   (rd)   │
//!                          └────┬─────┘ └──────────┘
//!                               │
//!                          ┌────┴─────┐
//!                          │  Agent   │
//!                          │  (ask)   │
//!                          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rd init                       # create database
//! rd index                      # index PDFs under the library root
//! rd probe "What is attention?" --subject AI
//! rd arxiv "sparse attention"   # discover papers
//! rd serve                      # start the HTTP tool server
//! rd ask "Find recent work on KV-cache compression"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`metadata`] | Paper metadata derived from library paths |
//! | [`extract`] | PDF text extraction |
//! | [`chunk`] | Page-aware text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Library scanning and the vector index |
//! | [`progress`] | Index progress reporting |
//! | [`retrieval`] | Filtered semantic retrieval and query planning |
//! | [`probe`] | Answer synthesis with citations and confidence |
//! | [`arxiv`] | arXiv search and paper fetching |
//! | [`llm`] | Chat model abstraction and tool-call wire types |
//! | [`tools`] | Tool registry and parameter validation |
//! | [`server`] | HTTP tool server |
//! | [`bridge`] | HTTP client for remote tool dispatch |
//! | [`agent`] | The research agent loop |
//! | [`stats`] | Library statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod agent;
pub mod arxiv;
pub mod bridge;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod llm;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod probe;
pub mod progress;
pub mod retrieval;
pub mod server;
pub mod stats;
#[cfg(test)]
pub(crate) mod test_pdf;
pub mod tools;
