// Code-aware tokenization
//
// The code analyzer chain lives in one tokenizer so sub-token positions can
// be controlled exactly: identifiers are split on CamelCase boundaries and
// snake underscores, and every sub-token is emitted at the SAME position as
// the original token. Phrase queries over original identifiers keep working
// while individual words still match.
//
// Chain, in order:
//   1. tokenize on non-identifier boundaries (Unicode letter/digit/underscore)
//   2. lowercase
//   3. emit original + camel/snake sub-tokens, positions preserved
//   4. drop tokens shorter than 2 chars unless whitelisted
// No stemming on code fields.

use tantivy::tokenizer::{Token, TokenStream, Tokenizer};

/// Single-character identifiers worth keeping despite the length filter
const SINGLE_CHAR_WHITELIST: &[&str] = &["i", "j", "k", "n", "t", "x", "y", "z"];

#[derive(Debug, Clone, Default)]
pub struct CodeTokenizer;

pub struct CodeTokenStream {
    tokens: Vec<Token>,
    current: usize,
}

impl Tokenizer for CodeTokenizer {
    type TokenStream<'a> = CodeTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        CodeTokenStream {
            tokens: tokenize_code(text),
            current: 0,
        }
    }
}

impl TokenStream for CodeTokenStream {
    fn advance(&mut self) -> bool {
        if self.current < self.tokens.len() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.current - 1]
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn keep(text: &str) -> bool {
    text.chars().count() >= 2 || SINGLE_CHAR_WHITELIST.contains(&text)
}

/// Full analysis chain over raw text
pub fn tokenize_code(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut position = 0usize;

    for (start, word) in identifier_spans(text) {
        let lowered = word.to_lowercase();
        let end = start + word.len();

        let parts = split_identifier(word);
        let emit_parts = parts.len() > 1;

        if keep(&lowered) {
            let mut token = Token::default();
            token.offset_from = start;
            token.offset_to = end;
            token.position = position;
            token.text = lowered.clone();
            tokens.push(token);
        }

        if emit_parts {
            for (part_offset, part) in parts {
                let part_lower = part.to_lowercase();
                if part_lower == lowered || !keep(&part_lower) {
                    continue;
                }
                // Same position as the original: phrase queries on the
                // original form are unaffected by the expansion.
                let mut token = Token::default();
                token.offset_from = start + part_offset;
                token.offset_to = start + part_offset + part.len();
                token.position = position;
                token.text = part_lower;
                tokens.push(token);
            }
        }

        position += 1;
    }

    tokens
}

/// Byte-offset spans of identifier runs in the input
fn identifier_spans(text: &str) -> Vec<(usize, &str)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (idx, c) in text.char_indices() {
        if is_identifier_char(c) {
            if start.is_none() {
                start = Some(idx);
            }
        } else if let Some(s) = start.take() {
            spans.push((s, &text[s..idx]));
        }
    }
    if let Some(s) = start {
        spans.push((s, &text[s..]));
    }
    spans
}

/// Split an identifier on snake underscores and CamelCase boundaries,
/// returning each part with its byte offset inside the identifier.
/// Acronym runs stay together: "XMLHttpRequest" -> XML, Http, Request.
pub fn split_identifier(word: &str) -> Vec<(usize, String)> {
    let mut parts = Vec::new();

    // Snake segments first
    let mut segment_start = 0usize;
    for segment in word.split('_') {
        if !segment.is_empty() {
            split_camel_into(segment, segment_start, &mut parts);
        }
        segment_start += segment.len() + 1;
    }

    parts
}

fn split_camel_into(segment: &str, base: usize, parts: &mut Vec<(usize, String)>) {
    let chars: Vec<(usize, char)> = segment.char_indices().collect();
    let mut word_start = 0usize;

    for i in 1..chars.len() {
        let (offset, c) = chars[i];
        let (_, prev) = chars[i - 1];

        let lower_to_upper = c.is_uppercase() && (prev.is_lowercase() || prev.is_numeric());
        // End of an acronym run: "XMLHttp" splits before "Http"
        let acronym_end = c.is_lowercase()
            && prev.is_uppercase()
            && i >= 2
            && chars[i - 2].1.is_uppercase();

        if lower_to_upper {
            parts.push((base + word_start, segment[word_start..offset].to_string()));
            word_start = offset;
        } else if acronym_end {
            let split_at = chars[i - 1].0;
            if split_at > word_start {
                parts.push((base + word_start, segment[word_start..split_at].to_string()));
                word_start = split_at;
            }
        }
    }

    parts.push((base + word_start, segment[word_start..].to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_camel_case_splitting() {
        let tokens = tokenize_code("getUserById");
        let texts = texts(&tokens);

        assert!(texts.contains(&"getuserbyid"), "original kept: {texts:?}");
        assert!(texts.contains(&"get"));
        assert!(texts.contains(&"user"));
        assert!(texts.contains(&"by"));
        assert!(texts.contains(&"id"));
    }

    #[test]
    fn test_snake_case_splitting() {
        let tokens = tokenize_code("user_data_service");
        let texts = texts(&tokens);

        assert!(texts.contains(&"user_data_service"));
        assert!(texts.contains(&"user"));
        assert!(texts.contains(&"data"));
        assert!(texts.contains(&"service"));
    }

    #[test]
    fn test_dot_separators_split() {
        let tokens = tokenize_code("config.loader.parse");
        let texts = texts(&tokens);
        assert_eq!(texts, vec!["config", "loader", "parse"]);
    }

    #[test]
    fn test_acronym_handling() {
        let tokens = tokenize_code("XMLHttpRequest");
        let texts = texts(&tokens);
        assert!(texts.contains(&"xmlhttprequest"));
        assert!(texts.contains(&"xml"));
        assert!(texts.contains(&"http"));
        assert!(texts.contains(&"request"));
    }

    #[test]
    fn test_positions_preserved_for_subtokens() {
        let tokens = tokenize_code("UserService saveAll");

        let original: Vec<&Token> = tokens
            .iter()
            .filter(|t| t.text == "userservice" || t.text == "saveall")
            .collect();
        assert_eq!(original.len(), 2);
        assert_eq!(original[0].position, 0);
        assert_eq!(original[1].position, 1);

        // Sub-tokens share the position of their original
        for token in &tokens {
            match token.text.as_str() {
                "user" | "service" => assert_eq!(token.position, 0),
                "save" | "all" => assert_eq!(token.position, 1),
                _ => {}
            }
        }
    }

    #[test]
    fn test_short_tokens_dropped_unless_whitelisted() {
        let tokens = tokenize_code("for i in a_b");
        let texts = texts(&tokens);

        assert!(texts.contains(&"for"));
        assert!(texts.contains(&"i"), "whitelisted single char kept");
        assert!(texts.contains(&"in"));
        assert!(texts.contains(&"a_b"), "original survives length filter");
        // "a" and "b" sub-tokens are too short and not whitelisted
        assert!(!texts.contains(&"a"));
        assert!(!texts.contains(&"b"));
    }

    #[test]
    fn test_lowercasing() {
        let tokens = tokenize_code("HTTPServer");
        assert!(tokens.iter().all(|t| t.text == t.text.to_lowercase()));
    }

    #[test]
    fn test_pure_function_of_input() {
        let a = tokenize_code("fetchRemoteConfig(url, retry_count)");
        let b = tokenize_code("fetchRemoteConfig(url, retry_count)");
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.position, y.position);
            assert_eq!(x.offset_from, y.offset_from);
        }
    }

    #[test]
    fn test_non_ascii_identifiers() {
        let tokens = tokenize_code("größe médias");
        let texts = texts(&tokens);
        assert!(texts.contains(&"größe"));
        assert!(texts.contains(&"médias"));
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize_code("").is_empty());
        assert!(tokenize_code("  \t\n ").is_empty());
    }
}
