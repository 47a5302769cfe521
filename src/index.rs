//! The paper index: corpus discovery, reconciliation, and the write path.
//!
//! `LibraryIndex` is the one shared service object. Initialization is lazy
//! and idempotent; initialization and every write serialize through a single
//! async mutex, while reads go straight to the pool once the schema exists.

use anyhow::{Context, Result};
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunk;
use crate::config::Config;
use crate::db;
use crate::embedding::{self, Embedder};
use crate::extract;
use crate::metadata;
use crate::migrate;
use crate::progress::{IndexProgressEvent, IndexProgressReporter};

/// Outcome of one reconcile pass.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub discovered: usize,
    pub indexed: usize,
    pub already_indexed: usize,
    /// (relpath, error) per paper that failed and was skipped.
    pub failed: Vec<(String, String)>,
    pub chunks_written: usize,
}

/// Distinct metadata values currently indexed, fed to the query planner.
#[derive(Debug, Clone, Default)]
pub struct PlannerHints {
    pub subjects: Vec<String>,
    pub topics: Vec<String>,
}

/// Counts reported at server startup and by `rd stats`.
#[derive(Debug)]
pub struct CorpusSummary {
    pub papers: i64,
    pub unique_titles: i64,
    pub chunks: i64,
}

pub struct LibraryIndex {
    config: Config,
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    write_lock: Mutex<()>,
    initialized: AtomicBool,
    planner_hints: RwLock<Option<PlannerHints>>,
}

impl LibraryIndex {
    /// Open with the provider named in config.
    pub async fn open(config: &Config) -> Result<Arc<Self>> {
        let embedder = embedding::create_embedder(&config.embedding)?;
        Self::open_with(config, embedder).await
    }

    /// Open with an explicit embedding provider. Tests inject stubs here.
    pub async fn open_with(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Arc<Self>> {
        let pool = db::connect(config).await?;
        Ok(Arc::new(Self {
            config: config.clone(),
            pool,
            embedder,
            write_lock: Mutex::new(()),
            initialized: AtomicBool::new(false),
            planner_hints: RwLock::new(None),
        }))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ensure the schema exists. Concurrent callers collapse into one pass;
    /// later calls return immediately.
    pub async fn initialize(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        migrate::run_migrations_on(&self.pool).await?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Index everything on disk that is not in the corpus yet.
    ///
    /// A paper that fails anywhere in extract/chunk/embed/persist is logged
    /// and skipped; the pass continues. A second pass over an unchanged tree
    /// indexes nothing.
    pub async fn reconcile(
        &self,
        progress: &dyn IndexProgressReporter,
    ) -> Result<ReconcileReport> {
        self.initialize().await?;
        let _guard = self.write_lock.lock().await;

        progress.report(IndexProgressEvent::Scanning {
            root: self.config.library.root.display().to_string(),
        });
        let on_disk = self.discover_pdfs()?;
        let indexed = self.indexed_relpaths().await?;

        let mut report = ReconcileReport {
            discovered: on_disk.len(),
            ..Default::default()
        };
        let missing: Vec<(PathBuf, String)> = on_disk
            .into_iter()
            .filter(|(_, rel)| !indexed.contains(rel))
            .collect();
        report.already_indexed = report.discovered - missing.len();

        let total = missing.len() as u64;
        for (i, (path, rel)) in missing.iter().enumerate() {
            progress.report(IndexProgressEvent::Indexing {
                n: i as u64 + 1,
                total,
                relpath: rel.clone(),
            });
            match self.index_file(path).await {
                Ok(written) => {
                    report.indexed += 1;
                    report.chunks_written += written;
                }
                Err(e) => {
                    eprintln!("skipping {}: {:#}", rel, e);
                    report.failed.push((rel.clone(), format!("{:#}", e)));
                }
            }
        }

        if report.indexed > 0 {
            self.invalidate_planner_hints();
        }
        Ok(report)
    }

    /// Index one paper by path. Returns false when the paper is already in
    /// the corpus (recognized by relpath).
    pub async fn index_paper(&self, path: &Path) -> Result<bool> {
        self.initialize().await?;
        let _guard = self.write_lock.lock().await;

        let meta = metadata::parse_paper_meta(&self.config.library.root, path);
        let indexed = self.indexed_relpaths().await?;
        if indexed.contains(&meta.relpath) {
            return Ok(false);
        }
        self.index_file(path).await?;
        self.invalidate_planner_hints();
        Ok(true)
    }

    /// Remove every indexed row. The next reconcile rebuilds from disk.
    pub async fn clear(&self) -> Result<()> {
        self.initialize().await?;
        let _guard = self.write_lock.lock().await;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunk_vectors").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM papers").execute(&mut *tx).await?;
        tx.commit().await?;

        self.invalidate_planner_hints();
        Ok(())
    }

    // ============ Discovery ============

    fn discover_pdfs(&self) -> Result<Vec<(PathBuf, String)>> {
        let root = &self.config.library.root;
        let glob_set = build_glob_set(&self.config.library.include_globs)?;
        let mut found = Vec::new();
        if !root.exists() {
            return Ok(found);
        }
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    eprintln!("skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = match entry.path().strip_prefix(root) {
                Ok(r) => r,
                Err(_) => continue,
            };
            if !glob_set.is_match(rel) {
                continue;
            }
            found.push((
                entry.path().to_path_buf(),
                rel.to_string_lossy().to_string(),
            ));
        }
        // Deterministic pass order
        found.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(found)
    }

    async fn indexed_relpaths(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT relpath FROM papers")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get::<String, _>("relpath")).collect())
    }

    // ============ Write path ============

    /// Extract, chunk, embed, and persist one paper. Rows land in a single
    /// transaction only after every batch embedded, so a failure leaves no
    /// partial paper behind. When the embedding provider is disabled, chunk
    /// rows still land; only the vectors are skipped.
    async fn index_file(&self, path: &Path) -> Result<usize> {
        let meta = metadata::parse_paper_meta(&self.config.library.root, path);
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let pages = extract::pdf_pages(&bytes)?;

        let paper_id = Uuid::new_v4().to_string();
        let chunks = chunk::chunk_pages(
            &meta,
            &paper_id,
            &pages,
            self.config.chunking.chunk_chars,
            self.config.chunking.overlap_chars,
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = if texts.is_empty() || !self.config.embedding.is_enabled() {
            Vec::new()
        } else {
            embedding::embed_in_batches(
                self.embedder.as_ref(),
                &texts,
                self.config.embedding.batch_size,
            )
            .await?
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO papers (id, relpath, subject, topic, title, year, pages, indexed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&paper_id)
        .bind(&meta.relpath)
        .bind(&meta.subject)
        .bind(&meta.topic)
        .bind(&meta.title)
        .bind(meta.year)
        .bind(pages.len() as i64)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        for (i, chunk_row) in chunks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO chunks
                    (id, paper_id, chunk_index, page, text, hash,
                     subject, topic, title, year, relpath)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk_row.id)
            .bind(&chunk_row.paper_id)
            .bind(chunk_row.chunk_index)
            .bind(chunk_row.page)
            .bind(&chunk_row.text)
            .bind(&chunk_row.hash)
            .bind(&chunk_row.subject)
            .bind(&chunk_row.topic)
            .bind(&chunk_row.title)
            .bind(chunk_row.year)
            .bind(&chunk_row.relpath)
            .execute(&mut *tx)
            .await?;

            if let Some(vector) = vectors.get(i) {
                sqlx::query(
                    "INSERT INTO chunk_vectors (chunk_id, model, dims, embedding) VALUES (?, ?, ?, ?)",
                )
                .bind(&chunk_row.id)
                .bind(self.embedder.model_name())
                .bind(vector.len() as i64)
                .bind(embedding::vec_to_blob(vector))
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;

        Ok(chunks.len())
    }

    // ============ Planner hints ============

    /// Distinct subject/topic values for the planner prompt. Cached until
    /// the next index write.
    pub async fn planner_hints(&self) -> Result<PlannerHints> {
        if let Ok(guard) = self.planner_hints.read() {
            if let Some(hints) = guard.as_ref() {
                return Ok(hints.clone());
            }
        }

        let subjects: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT subject FROM papers ORDER BY subject")
                .fetch_all(&self.pool)
                .await?;
        let topics: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT topic FROM papers WHERE topic IS NOT NULL ORDER BY topic",
        )
        .fetch_all(&self.pool)
        .await?;

        let hints = PlannerHints { subjects, topics };
        if let Ok(mut guard) = self.planner_hints.write() {
            *guard = Some(hints.clone());
        }
        Ok(hints)
    }

    pub fn invalidate_planner_hints(&self) {
        if let Ok(mut guard) = self.planner_hints.write() {
            *guard = None;
        }
    }

    // ============ Summary ============

    pub async fn summary(&self) -> Result<CorpusSummary> {
        self.initialize().await?;
        let papers = sqlx::query_scalar("SELECT COUNT(*) FROM papers")
            .fetch_one(&self.pool)
            .await?;
        let unique_titles = sqlx::query_scalar("SELECT COUNT(DISTINCT title) FROM papers")
            .fetch_one(&self.pool)
            .await?;
        let chunks = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(CorpusSummary {
            papers,
            unique_titles,
            chunks,
        })
    }
}

fn build_glob_set(globs: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for g in globs {
        builder.add(Glob::new(g).with_context(|| format!("Invalid glob: {}", g))?);
    }
    Ok(builder.build()?)
}
