//! Sliding-window word chunker.
//!
//! Purely positional: whitespace-delimited words, fixed window size,
//! fixed overlap. No sentence or semantic boundary awareness.

pub const DEFAULT_CHUNK_SIZE: usize = 300;
pub const DEFAULT_OVERLAP: usize = 50;

/// Split `text` into overlapping word windows. Each window holds up to
/// `chunk_size` words and starts `chunk_size - overlap` words after the
/// previous one. `overlap >= chunk_size` is clamped so the window always
/// advances.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        start += step;
    }

    chunks
}
