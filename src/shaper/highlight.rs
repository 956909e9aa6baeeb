// Highlight extraction
//
// Builds short fragments around query-term matches in stored content.
// Matching is case-insensitive over code-analyzed terms, so "usersession"
// highlights inside "UserSession" too.

use crate::search::tokenizers::tokenize_code;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_FRAGMENTS: usize = 3;
pub const DEFAULT_FRAGMENT_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fragment {
    /// 1-based line of the first match in this fragment
    pub line: u32,
    pub text: String,
}

/// Up to `max_fragments` windows of `fragment_size` chars containing query
/// term matches, in document order, at most one per line.
pub fn extract_fragments(
    content: &str,
    query: &str,
    max_fragments: usize,
    fragment_size: usize,
) -> Vec<Fragment> {
    let terms: Vec<String> = tokenize_code(query)
        .into_iter()
        .map(|t| t.text)
        .filter(|t| t.len() >= 2)
        .collect();
    if terms.is_empty() {
        return Vec::new();
    }

    let mut fragments = Vec::new();

    for (line_idx, line) in content.lines().enumerate() {
        if fragments.len() >= max_fragments {
            break;
        }
        let line_lower = line.to_lowercase();
        let Some(match_pos) = terms.iter().filter_map(|t| line_lower.find(t.as_str())).min()
        else {
            continue;
        };

        fragments.push(Fragment {
            line: line_idx as u32 + 1,
            text: window(line, match_pos, fragment_size),
        });
    }

    fragments
}

/// A `size`-char window of `line` centered near the match, snapped to char
/// boundaries
fn window(line: &str, match_pos: usize, size: usize) -> String {
    let trimmed = line.trim();
    if trimmed.chars().count() <= size {
        return trimmed.to_string();
    }

    let chars: Vec<char> = line.chars().collect();
    // Convert the byte position to a char index conservatively
    let match_char_idx = line[..match_pos].chars().count();
    let half = size / 2;
    let start = match_char_idx.saturating_sub(half);
    let end = (start + size).min(chars.len());

    let mut text: String = chars[start..end].iter().collect();
    if start > 0 {
        text = format!("…{}", text.trim_start());
    }
    if end < chars.len() {
        text = format!("{}…", text.trim_end());
    }
    text
}
