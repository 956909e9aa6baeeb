// Token estimation
//
// Response shaping needs a fast, tokenizer-free estimate of how many tokens
// a payload will cost downstream. The heuristic is characters / 3.5 for
// general text, with a denser ratio for CJK scripts where one character
// often is one token.

#[derive(Debug, Default, Clone)]
pub struct TokenEstimator;

impl TokenEstimator {
    /// Average characters per token for western text
    const CHARS_PER_TOKEN: f64 = 3.5;

    /// Average characters per token for CJK text
    const CJK_CHARS_PER_TOKEN: f64 = 2.0;

    pub fn new() -> Self {
        Self
    }

    pub fn estimate_str(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let chars_per_token = if contains_cjk(text) {
            Self::CJK_CHARS_PER_TOKEN
        } else {
            Self::CHARS_PER_TOKEN
        };
        (text.chars().count() as f64 / chars_per_token).ceil() as usize
    }

    /// Estimate for an opaque serialized payload
    pub fn estimate_json<T: serde::Serialize>(&self, value: &T) -> usize {
        match serde_json::to_string(value) {
            Ok(json) => self.estimate_str(&json),
            Err(_) => 0,
        }
    }
}

fn contains_cjk(text: &str) -> bool {
    text.chars().any(|ch| {
        let code = ch as u32;
        (0x4E00..=0x9FFF).contains(&code)      // CJK Unified Ideographs
            || (0x3400..=0x4DBF).contains(&code)  // CJK Extension A
            || (0x3040..=0x30FF).contains(&code)  // Hiragana and Katakana
            || (0xAC00..=0xD7AF).contains(&code)  // Hangul Syllables
    })
}
