/// Paper-level metadata derived from the corpus path and filename.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperMeta {
    /// Path relative to the corpus root. Stable identity for dedup.
    pub relpath: String,
    pub subject: String,
    pub topic: Option<String>,
    pub title: String,
    pub year: Option<i64>,
}

/// One chunk row: a window of page text plus the paper metadata it is
/// filtered on. Metadata is denormalized so a single row answers a query.
#[derive(Debug, Clone)]
pub struct PaperChunk {
    pub id: String,
    pub paper_id: String,
    pub chunk_index: i64,
    /// 0-based page the window came from. Citations render it 1-based.
    pub page: i64,
    pub text: String,
    pub hash: String,
    pub subject: String,
    pub topic: Option<String>,
    pub title: String,
    pub year: Option<i64>,
    pub relpath: String,
}

/// A retrieved chunk with its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: PaperChunk,
    pub score: f64,
}
