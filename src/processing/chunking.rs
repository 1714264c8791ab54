//! Character-budgeted semantic chunking.
//!
//! Text is first split by `semchunk-rs`, which prefers paragraph, sentence, and word
//! boundaries, using a character counter as its size function. Each chunk after the first is
//! then prefixed with up to `overlap` trailing characters of the previous chunk so spans around
//! a boundary stay visible to retrieval. The splitter can overshoot the budget on long runs
//! without a boundary, so oversized chunks are re-packed by word before the overlap is added.
//! The overlap only fills the room a chunk leaves under the budget; chunk text is never cut.

use semchunk_rs::Chunker;

use super::types::ChunkingError;

/// Split `text` into chunks of at most `chunk_size` characters with a sliding overlap.
///
/// Returns an empty vector when the input is all whitespace.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chunker = Chunker::new(chunk_size, Box::new(|segment: &str| segment.chars().count()));
    let base_chunks = chunker
        .chunk(text)
        .into_iter()
        .flat_map(|chunk| enforce_budget(chunk, chunk_size))
        .collect();
    Ok(apply_overlap(base_chunks, chunk_size, overlap))
}

/// Re-pack a chunk longer than `chunk_size` characters word by word.
///
/// Words longer than the budget are split at character boundaries.
fn enforce_budget(chunk: String, chunk_size: usize) -> Vec<String> {
    if chunk.chars().count() <= chunk_size {
        return vec![chunk];
    }

    let mut packed = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for word in chunk.split_whitespace() {
        let mut word = word;
        let mut word_len = word.chars().count();
        while word_len > chunk_size {
            if !current.is_empty() {
                packed.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let split = word
                .char_indices()
                .nth(chunk_size)
                .map_or(word.len(), |(offset, _)| offset);
            packed.push(word[..split].to_string());
            word = &word[split..];
            word_len -= chunk_size;
        }
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() { word_len } else { word_len + 1 };
        if current_len + needed > chunk_size {
            packed.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        packed.push(current);
    }
    packed
}

fn apply_overlap(chunks: Vec<String>, chunk_size: usize, overlap: usize) -> Vec<String> {
    let overlap = overlap.min(chunk_size.saturating_sub(1));
    if overlap == 0 || chunks.len() < 2 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;
    for current in chunks {
        let next = match previous.as_deref() {
            Some(prev) => join_with_tail(prev, &current, overlap, chunk_size),
            None => current.clone(),
        };
        overlapped.push(next);
        previous = Some(current);
    }
    overlapped
}

/// Prefix `current` with the end of `previous`, using only the room left under `chunk_size`.
fn join_with_tail(previous: &str, current: &str, overlap: usize, chunk_size: usize) -> String {
    let room = chunk_size.saturating_sub(current.chars().count());
    let mut tail = last_chars(previous, overlap.min(room)).trim_start();
    let needs_space =
        !tail.ends_with(char::is_whitespace) && !current.starts_with(char::is_whitespace);
    if needs_space && tail.chars().count() + 1 > room {
        tail = last_chars(tail, room.saturating_sub(1)).trim_start();
    }
    if tail.is_empty() {
        return current.to_string();
    }

    let mut combined = String::with_capacity(tail.len() + current.len() + 1);
    combined.push_str(tail);
    if needs_space {
        combined.push(' ');
    }
    combined.push_str(current);
    combined
}

/// Suffix of `text` holding at most `limit` characters.
fn last_chars(text: &str, limit: usize) -> &str {
    if limit == 0 {
        return "";
    }
    match text.char_indices().rev().nth(limit - 1) {
        Some((offset, _)) => &text[offset..],
        None => text,
    }
}
