use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Run migrations on a fresh pool. Used by `rd init`.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    run_migrations_on(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema to an existing pool. Safe to run repeatedly; the index
/// service calls this during lazy initialization.
pub async fn run_migrations_on(pool: &SqlitePool) -> Result<()> {
    // Paper registry: one row per indexed PDF, relpath is the dedup identity
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS papers (
            id TEXT PRIMARY KEY,
            relpath TEXT NOT NULL UNIQUE,
            subject TEXT NOT NULL,
            topic TEXT,
            title TEXT NOT NULL,
            year INTEGER,
            pages INTEGER NOT NULL,
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Chunk rows carry the paper metadata so one row answers a filtered query
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            paper_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            page INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            subject TEXT NOT NULL,
            topic TEXT,
            title TEXT NOT NULL,
            year INTEGER,
            relpath TEXT NOT NULL,
            UNIQUE(paper_id, chunk_index),
            FOREIGN KEY (paper_id) REFERENCES papers(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_paper_id ON chunks(paper_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_subject ON chunks(subject)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_topic ON chunks(topic)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_year ON chunks(year)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_papers_subject ON papers(subject)")
        .execute(pool)
        .await?;

    Ok(())
}
