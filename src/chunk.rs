//! Character-window chunking of page text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{PaperChunk, PaperMeta};

/// Split `text` into overlapping windows of at most `max_chars` characters.
///
/// Windows prefer to break at a paragraph boundary, then a line break, then a
/// space, falling back to a hard split. Consecutive windows share up to
/// `overlap_chars` characters of context.
pub fn chunk_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    // Work over char boundaries so multibyte input never splits mid-char.
    let bounds: Vec<usize> = trimmed.char_indices().map(|(i, _)| i).collect();
    let n = bounds.len();
    if n <= max_chars {
        return vec![trimmed.to_string()];
    }
    let byte_at = |char_idx: usize| -> usize {
        if char_idx >= n {
            trimmed.len()
        } else {
            bounds[char_idx]
        }
    };

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < n {
        let hard_end = (start + max_chars).min(n);
        let mut end = hard_end;
        if hard_end < n {
            let window = &trimmed[byte_at(start)..byte_at(hard_end)];
            let cut = window
                .rfind("\n\n")
                .or_else(|| window.rfind('\n'))
                .or_else(|| window.rfind(' '));
            if let Some(pos) = cut {
                let cut_chars = window[..pos].chars().count();
                // A boundary in the first half wastes too much window.
                if cut_chars > max_chars / 2 {
                    end = start + cut_chars;
                }
            }
        }

        let piece = trimmed[byte_at(start)..byte_at(end)].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        if end >= n {
            break;
        }
        let next = end.saturating_sub(overlap_chars);
        start = if next > start { next } else { end };
    }
    chunks
}

/// Build a chunk row for one window of page text.
pub fn make_chunk(
    meta: &PaperMeta,
    paper_id: &str,
    chunk_index: i64,
    page: i64,
    text: &str,
) -> PaperChunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    PaperChunk {
        id: Uuid::new_v4().to_string(),
        paper_id: paper_id.to_string(),
        chunk_index,
        page,
        text: text.to_string(),
        hash,
        subject: meta.subject.clone(),
        topic: meta.topic.clone(),
        title: meta.title.clone(),
        year: meta.year,
        relpath: meta.relpath.clone(),
    }
}

/// Chunk every page of a paper, assigning contiguous chunk indices across
/// page boundaries.
pub fn chunk_pages(
    meta: &PaperMeta,
    paper_id: &str,
    pages: &[String],
    max_chars: usize,
    overlap_chars: usize,
) -> Vec<PaperChunk> {
    let mut chunks = Vec::new();
    let mut index: i64 = 0;
    for (page_no, page_text) in pages.iter().enumerate() {
        for piece in chunk_text(page_text, max_chars, overlap_chars) {
            chunks.push(make_chunk(meta, paper_id, index, page_no as i64, &piece));
            index += 1;
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> PaperMeta {
        PaperMeta {
            relpath: "AI/Agents/Test - 2024.pdf".to_string(),
            subject: "AI".to_string(),
            topic: Some("Agents".to_string()),
            title: "Test".to_string(),
            year: Some(2024),
        }
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_text("", 1500, 250).is_empty());
        assert!(chunk_text("   \n\t  ", 1500, 250).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("just a short paragraph", 1500, 250);
        assert_eq!(chunks, vec!["just a short paragraph".to_string()]);
    }

    #[test]
    fn test_windows_respect_max() {
        let text = "word ".repeat(1000);
        let chunks = chunk_text(&text, 200, 40);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 200, "chunk too long: {}", c.len());
        }
    }

    #[test]
    fn test_windows_overlap() {
        let text = "a".repeat(1000);
        // No boundaries anywhere: hard splits with fixed overlap.
        let chunks = chunk_text(&text, 300, 50);
        assert!(chunks.len() >= 3);
        let tail: String = chunks[0].chars().rev().take(50).collect();
        let head: String = chunks[1].chars().take(50).collect();
        assert_eq!(tail, head);
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let first = "x".repeat(180);
        let second = "y".repeat(180);
        let text = format!("{}\n\n{}", first, second);
        let chunks = chunk_text(&text, 200, 20);
        assert!(chunks[0].ends_with('x'), "first chunk: {:?}", &chunks[0]);
        assert!(!chunks[0].contains('y'));
    }

    #[test]
    fn test_deterministic() {
        let text = "lorem ipsum dolor sit amet ".repeat(200);
        assert_eq!(chunk_text(&text, 500, 100), chunk_text(&text, 500, 100));
    }

    #[test]
    fn test_multibyte_safe() {
        let text = "日本語のテキスト ".repeat(300);
        let chunks = chunk_text(&text, 100, 20);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 100);
        }
    }

    #[test]
    fn test_chunk_indices_contiguous_across_pages() {
        let pages = vec![
            "first page text ".repeat(40),
            String::new(),
            "third page text ".repeat(40),
        ];
        let chunks = chunk_pages(&meta(), "paper-1", &pages, 200, 40);
        assert!(!chunks.is_empty());
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
        // The empty page contributes nothing but page numbers stay put.
        assert!(chunks.iter().any(|c| c.page == 0));
        assert!(chunks.iter().any(|c| c.page == 2));
        assert!(chunks.iter().all(|c| c.page != 1));
    }

    #[test]
    fn test_chunk_carries_metadata() {
        let chunks = chunk_pages(&meta(), "paper-1", &["short text".to_string()], 1500, 250);
        assert_eq!(chunks.len(), 1);
        let c = &chunks[0];
        assert_eq!(c.paper_id, "paper-1");
        assert_eq!(c.subject, "AI");
        assert_eq!(c.topic.as_deref(), Some("Agents"));
        assert_eq!(c.year, Some(2024));
        assert_eq!(c.hash.len(), 64);
    }
}
