//! C2 — Chunker. Sentence-boundary-aware sliding window with overlap.

/// How far back from a tentative chunk end the algorithm searches for a
/// "good" break point (period, newline, space).
const BREAK_SEARCH_WINDOW: usize = 200;

/// Splits `text` into chunks of at most `chunk_size` characters (plus a
/// small tolerance from the backward break search), overlapping by at most
/// `overlap` characters between consecutive chunks. Chunks at or below
/// `min_size` characters (after trimming) are dropped as noise.
///
/// Operates on `char` boundaries throughout, not bytes, so it is safe on
/// any UTF-8 input (HR documents in this system are Russian-language).
pub fn split(text: &str, chunk_size: usize, overlap: usize, min_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.trim().chars().collect();
    let len = chars.len();
    if len == 0 {
        return Vec::new();
    }
    if len <= chunk_size {
        return vec![chars.into_iter().collect()];
    }

    let min_step = (chunk_size / 4).max(50);
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let tentative_end = (start + chunk_size).min(len);
        let is_last = tentative_end >= len;
        let end = if is_last {
            tentative_end
        } else {
            find_break_point(&chars, start, tentative_end).unwrap_or(tentative_end)
        };

        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if trimmed.chars().count() > min_size {
            chunks.push(trimmed.to_string());
        }

        if end >= len {
            break;
        }

        let mut next_start = (start + min_step).max(end.saturating_sub(overlap));
        if next_start <= start {
            next_start = start + min_step;
        }
        start = next_start;
    }

    chunks
}

/// Searches backward from `end` within the last [`BREAK_SEARCH_WINDOW`]
/// characters of `[start, end)` for a "good" break point, in priority
/// order: `. `, `! `/`? `, `\n\n`, `\n`, ` `. Returns the index just after
/// the matched separator, or `None` if no separator was found in range.
fn find_break_point(chars: &[char], start: usize, end: usize) -> Option<usize> {
    let window_start = start.max(end.saturating_sub(BREAK_SEARCH_WINDOW));

    let two_char_patterns: [[char; 2]; 3] = [['.', ' '], ['!', ' '], ['?', ' ']];
    if let Some(pos) = rfind_pair_in(chars, window_start, end, &two_char_patterns) {
        return Some(pos + 2);
    }
    if let Some(pos) = rfind_str_in(chars, window_start, end, &['\n', '\n']) {
        return Some(pos + 2);
    }
    if let Some(pos) = rfind_char_in(chars, window_start, end, '\n') {
        return Some(pos + 1);
    }
    if let Some(pos) = rfind_char_in(chars, window_start, end, ' ') {
        return Some(pos + 1);
    }
    None
}

fn rfind_pair_in(chars: &[char], from: usize, to: usize, pairs: &[[char; 2]]) -> Option<usize> {
    if to < from + 2 {
        return None;
    }
    for i in (from..=to - 2).rev() {
        for pair in pairs {
            if chars[i] == pair[0] && chars[i + 1] == pair[1] {
                return Some(i);
            }
        }
    }
    None
}

fn rfind_str_in(chars: &[char], from: usize, to: usize, needle: &[char; 2]) -> Option<usize> {
    rfind_pair_in(chars, from, to, &[*needle])
}

fn rfind_char_in(chars: &[char], from: usize, to: usize, needle: char) -> Option<usize> {
    if to <= from {
        return None;
    }
    (from..to).rev().find(|&i| chars[i] == needle)
}
