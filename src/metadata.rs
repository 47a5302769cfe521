//! Corpus layout conventions.
//!
//! Papers live at `<root>/<subject>/<topic>/<title> - <year>.pdf`. Every
//! function here is pure: the same path always yields the same metadata and
//! the same metadata always yields the same download path.

use std::path::{Path, PathBuf};

use crate::models::PaperMeta;

/// Subject assigned when a paper sits directly under the corpus root.
pub const DEFAULT_SUBJECT: &str = "Artificial Intelligence";

/// Character cap for generated file names (before the year suffix).
pub const MAX_FILENAME_CHARS: usize = 100;

/// Character cap for generated directory names.
pub const MAX_DIR_CHARS: usize = 50;

const FORBIDDEN: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Derive paper metadata from a file path.
///
/// The first directory under the root is the subject, the second the topic.
/// The filename stem splits on `" - "`: first segment title, second segment
/// year when it holds a 4-digit run, otherwise both segments rejoin as the
/// title. Files outside the root fall back to their bare filename.
pub fn parse_paper_meta(root: &Path, path: &Path) -> PaperMeta {
    let rel: PathBuf = match path.strip_prefix(root) {
        Ok(r) => r.to_path_buf(),
        Err(_) => PathBuf::from(
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        ),
    };

    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();

    let mut subject = DEFAULT_SUBJECT.to_string();
    let mut topic = None;
    if parts.len() >= 2 {
        subject = parts[0].clone();
    }
    if parts.len() >= 3 {
        topic = Some(parts[1].clone());
    }

    let stem = rel
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let (title, year) = split_title_year(&stem);

    PaperMeta {
        relpath: rel.to_string_lossy().to_string(),
        subject,
        topic,
        title,
        year,
    }
}

fn split_title_year(stem: &str) -> (String, Option<i64>) {
    let parts: Vec<&str> = stem.split(" - ").map(|p| p.trim()).collect();
    let mut title = parts[0].to_string();
    let mut year = None;
    if parts.len() >= 2 {
        match find_year(parts[1]) {
            Some(y) => year = Some(y),
            // No year in the second segment: it is part of the title.
            None => title = format!("{} - {}", parts[0], parts[1]),
        }
    }
    (title, year)
}

/// First run of four consecutive ASCII digits in `s`, if any.
pub fn find_year(s: &str) -> Option<i64> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i - start >= 4 {
                return s[start..start + 4].parse().ok();
            }
        } else {
            i += 1;
        }
    }
    None
}

/// Strip filesystem-hostile characters, collapse whitespace runs, and cap
/// the length in characters.
pub fn sanitize_component(name: &str, max_chars: usize) -> String {
    let cleaned: String = name.chars().filter(|c| !FORBIDDEN.contains(c)).collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, max_chars)
}

/// Shorten a long title, preferring the segment before a colon when that
/// segment is a usable length on its own.
pub fn shorten_title(title: &str, max_chars: usize) -> String {
    if title.chars().count() <= max_chars {
        return title.to_string();
    }
    if let Some((head, _)) = title.split_once(':') {
        let short = head.trim();
        let n = short.chars().count();
        if n > 10 && n <= max_chars {
            return short.to_string();
        }
    }
    truncate_chars(title, max_chars).trim().to_string()
}

/// Destination path, relative to the corpus root, for a downloaded paper.
pub fn download_relpath(
    subject: Option<&str>,
    topic: Option<&str>,
    title: &str,
    year: Option<i64>,
) -> PathBuf {
    let subject_dir = match subject {
        Some(s) if !s.is_empty() => sanitize_component(s, MAX_DIR_CHARS),
        _ => "General".to_string(),
    };
    let topic_dir = match topic {
        Some(t) if !t.is_empty() => sanitize_component(t, MAX_DIR_CHARS),
        _ => "Uncategorized".to_string(),
    };
    let base = sanitize_component(&shorten_title(title, MAX_FILENAME_CHARS), MAX_FILENAME_CHARS);
    let file = match year {
        Some(y) => format!("{} - {}.pdf", base, y),
        None => format!("{}.pdf", base),
    };
    PathBuf::from(subject_dir).join(topic_dir).join(file)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
