//! Library statistics overview.
//!
//! A quick summary of what's indexed: paper and chunk counts, embedding
//! coverage, and a per-subject breakdown. Used by `rd stats` to confirm
//! indexing and embeddings are working as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::migrate;

struct SubjectStats {
    subject: String,
    paper_count: i64,
    chunk_count: i64,
    embedded_count: i64,
    last_indexed_ts: Option<i64>,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    // The schema may not exist yet on a fresh database.
    migrate::run_migrations_on(&pool).await?;

    let total_papers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM papers")
        .fetch_one(&pool)
        .await?;
    let unique_titles: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT title) FROM papers")
        .fetch_one(&pool)
        .await?;
    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;
    let total_embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("refdesk — Library Stats");
    println!("=======================");
    println!();
    println!("  Database:   {}", config.db.path.display());
    println!("  Size:       {}", format_bytes(db_size));
    println!("  Library:    {}", config.library.root.display());
    println!();
    println!("  Papers:     {} ({} unique titles)", total_papers, unique_titles);
    println!("  Chunks:     {}", total_chunks);
    println!(
        "  Embedded:   {} / {} ({}%)",
        total_embedded,
        total_chunks,
        if total_chunks > 0 {
            (total_embedded * 100) / total_chunks
        } else {
            0
        }
    );

    let subject_rows = sqlx::query(
        r#"
        SELECT
            p.subject,
            COUNT(DISTINCT p.id) AS paper_count,
            COUNT(DISTINCT c.id) AS chunk_count,
            COUNT(DISTINCT cv.chunk_id) AS embedded_count,
            MAX(p.indexed_at) AS last_indexed
        FROM papers p
        LEFT JOIN chunks c ON c.paper_id = p.id
        LEFT JOIN chunk_vectors cv ON cv.chunk_id = c.id
        GROUP BY p.subject
        ORDER BY paper_count DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let subject_stats: Vec<SubjectStats> = subject_rows
        .iter()
        .map(|row| SubjectStats {
            subject: row.get("subject"),
            paper_count: row.get("paper_count"),
            chunk_count: row.get("chunk_count"),
            embedded_count: row.get("embedded_count"),
            last_indexed_ts: row.get("last_indexed"),
        })
        .collect();

    if !subject_stats.is_empty() {
        println!();
        println!("  By subject:");
        println!(
            "  {:<28} {:>6} {:>8} {:>10}   {}",
            "SUBJECT", "PAPERS", "CHUNKS", "EMBEDDED", "LAST INDEXED"
        );
        println!("  {}", "-".repeat(76));

        for s in &subject_stats {
            let indexed_display = match s.last_indexed_ts {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<28} {:>6} {:>8} {:>10}   {}",
                s.subject, s.paper_count, s.chunk_count, s.embedded_count, indexed_display
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
