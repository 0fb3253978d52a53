//! Line-aware sliding-window chunker for markdown import.
//!
//! Chunks never split a line (lines longer than the window are pre-split
//! into window-sized segments), and consecutive chunks overlap by a
//! configurable tail so context survives the cut. Line numbers refer to the
//! original file, 1-based inclusive.

use sha2::{Digest, Sha256};

/// One emitted chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Lines joined with `\n`.
    pub text: String,
    /// 1-based first original line covered.
    pub start_line: usize,
    /// 1-based last original line covered.
    pub end_line: usize,
    /// Hex SHA-256 of `text`.
    pub hash: String,
}

/// A line segment carrying its original line number. Long lines produce
/// several segments with the same number.
#[derive(Debug, Clone)]
struct Segment {
    line: usize,
    text: String,
}

/// Convert token budgets to character windows.
pub fn window_chars(chunk_tokens: usize, overlap_tokens: usize) -> (usize, usize) {
    ((chunk_tokens * 4).max(32), overlap_tokens * 4)
}

/// Split `text` into overlapping chunks of at most `max_chars` characters.
///
/// Whitespace-only chunks are dropped.
pub fn chunk_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    let segments = split_segments(text, max_chars);

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current: Vec<Segment> = Vec::new();
    let mut current_len = 0usize;

    for segment in segments {
        let seg_len = segment.text.chars().count();
        let joined_len = if current.is_empty() {
            seg_len
        } else {
            current_len + 1 + seg_len
        };

        if !current.is_empty() && joined_len > max_chars {
            emit(&mut chunks, &current);

            // Carry the overlap tail into the next window, whole lines only.
            let tail = overlap_tail(&current, overlap_chars);
            current = tail;
            current_len = joined_length(&current);

            // Drop the carry when it would immediately overflow again.
            if !current.is_empty() && current_len + 1 + seg_len > max_chars {
                current.clear();
                current_len = 0;
            }
        }

        if current.is_empty() {
            current_len = seg_len;
        } else {
            current_len += 1 + seg_len;
        }
        current.push(segment);
    }

    if !current.is_empty() {
        emit(&mut chunks, &current);
    }

    chunks
}

/// Lines of `text`, with lines longer than `max_chars` split into
/// `max_chars`-wide pieces that keep the original line number.
fn split_segments(text: &str, max_chars: usize) -> Vec<Segment> {
    let mut segments = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let chars: Vec<char> = line.chars().collect();
        if chars.len() <= max_chars {
            segments.push(Segment {
                line: line_no,
                text: line.to_string(),
            });
        } else {
            for piece in chars.chunks(max_chars) {
                segments.push(Segment {
                    line: line_no,
                    text: piece.iter().collect(),
                });
            }
        }
    }
    segments
}

/// The suffix of `segments` whose total length first reaches
/// `overlap_chars`, counted on segment text alone.
fn overlap_tail(segments: &[Segment], overlap_chars: usize) -> Vec<Segment> {
    if overlap_chars == 0 {
        return Vec::new();
    }
    let mut total = 0usize;
    let mut start = segments.len();
    while start > 0 {
        let len = segments[start - 1].text.chars().count();
        if total >= overlap_chars {
            break;
        }
        total += len;
        start -= 1;
    }
    segments[start..].to_vec()
}

fn joined_length(segments: &[Segment]) -> usize {
    if segments.is_empty() {
        return 0;
    }
    let text_len: usize = segments.iter().map(|s| s.text.chars().count()).sum();
    text_len + segments.len() - 1
}

fn emit(chunks: &mut Vec<Chunk>, segments: &[Segment]) {
    let text: String = segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    if text.trim().is_empty() {
        return;
    }
    let digest = Sha256::digest(text.as_bytes());
    let hash: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    chunks.push(Chunk {
        text,
        start_line: segments.first().map(|s| s.line).unwrap_or(1),
        end_line: segments.last().map(|s| s.line).unwrap_or(1),
        hash,
    });
}
