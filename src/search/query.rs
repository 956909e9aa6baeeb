// Query shape classification
//
// Keyword/shape heuristics route a query to the right tier set. This is
// advisory only: misclassification widens or narrows the tier fan-out but
// never fails the query.

use regex::Regex;
use std::sync::OnceLock;

/// What the query looks like, structurally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    /// Identifier-shaped: camelCase, PascalCase, snake_case, qualified, or
    /// generic with angle brackets. Routed to exact + scored tiers.
    SymbolLike,
    /// Contains syntax characters that confuse the query parser.
    /// Routed to literal + scored tiers.
    Syntactic,
    /// Looks like a file or directory path. Routed to file search.
    PathLike,
    /// Plain words without identifier shape. Scored tier only.
    Phrase,
}

struct Patterns {
    camel: Regex,
    pascal: Regex,
    snake: Regex,
    caps: Regex,
    qualified: Regex,
    generic: Regex,
    path: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        camel: Regex::new(r"^[a-z][a-zA-Z0-9]*[A-Z][a-zA-Z0-9]*$").expect("camel pattern"),
        pascal: Regex::new(r"^[A-Z][a-zA-Z0-9]*[a-z][a-zA-Z0-9]*$").expect("pascal pattern"),
        snake: Regex::new(r"^[a-z_]+[a-z0-9_]*_[a-z0-9_]+$").expect("snake pattern"),
        caps: Regex::new(r"^[A-Z_][A-Z0-9_]{2,}$").expect("caps pattern"),
        qualified: Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*(::|\.)[a-zA-Z_][a-zA-Z0-9_.:]*$")
            .expect("qualified pattern"),
        generic: Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*<[^<>]+(<[^<>]*>)?[^<>]*>$")
            .expect("generic pattern"),
        path: Regex::new(r"^[a-zA-Z0-9_.\-]+(/[a-zA-Z0-9_.\-]+)+/?$").expect("path pattern"),
    })
}

/// Characters that the strict query parser chokes on
const SYNTAX_CHARS: &[char] = &['<', '>', ':', '[', ']', '(', ')', '{', '}', '&', '|', '!'];

pub fn classify(query: &str) -> QueryShape {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return QueryShape::Phrase;
    }

    let p = patterns();

    if !trimmed.contains(' ') {
        if p.path.is_match(trimmed) {
            return QueryShape::PathLike;
        }
        if p.generic.is_match(trimmed) || p.qualified.is_match(trimmed) {
            // Identifier shape, but the parser needs the literal tier too
            return QueryShape::SymbolLike;
        }
        if trimmed.contains(SYNTAX_CHARS) {
            return QueryShape::Syntactic;
        }
        if p.camel.is_match(trimmed)
            || p.pascal.is_match(trimmed)
            || p.snake.is_match(trimmed)
            || p.caps.is_match(trimmed)
        {
            return QueryShape::SymbolLike;
        }
        return QueryShape::Phrase;
    }

    if trimmed.contains(SYNTAX_CHARS) {
        return QueryShape::Syntactic;
    }

    // Multi-word query containing one clear identifier still fans out to
    // the symbol tier alongside text search
    let identifier_words = trimmed
        .split_whitespace()
        .filter(|w| {
            p.camel.is_match(w) || p.pascal.is_match(w) || p.snake.is_match(w) || p.caps.is_match(w)
        })
        .count();
    if identifier_words >= 1 {
        return QueryShape::SymbolLike;
    }

    QueryShape::Phrase
}

/// Whether the literal tier should run for this query in addition to the
/// scored tier
pub fn wants_literal_tier(query: &str) -> bool {
    query.contains(SYNTAX_CHARS) || query.contains("::")
}

/// Candidate symbol names to try for exact lookup: the query itself plus
/// case-convention variants, most specific first.
pub fn exact_lookup_candidates(query: &str) -> Vec<String> {
    let trimmed = query.trim();
    let mut candidates = vec![trimmed.to_string()];

    // Qualified name: also try the last segment
    if let Some(last) = trimmed.rsplit("::").next() {
        if last != trimmed {
            candidates.push(last.to_string());
        }
    }

    let mut push = |candidate: String| {
        if !candidate.is_empty() && !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    };

    push(to_pascal_case(trimmed));
    push(to_camel_case(trimmed));
    push(to_snake_case(trimmed));

    candidates
}

pub fn to_snake_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    let chars: Vec<char> = input.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_numeric());
            if prev_lower {
                out.push('_');
            }
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        } else if c.is_whitespace() {
            out.push('_');
        } else {
            out.push(*c);
        }
    }
    out
}

pub fn to_pascal_case(input: &str) -> String {
    input
        .split(|c: char| c == '_' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

pub fn to_camel_case(input: &str) -> String {
    let pascal = to_pascal_case(input);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_shapes() {
        assert_eq!(classify("getUserById"), QueryShape::SymbolLike);
        assert_eq!(classify("UserService"), QueryShape::SymbolLike);
        assert_eq!(classify("user_repository"), QueryShape::SymbolLike);
        assert_eq!(classify("MAX_RETRIES"), QueryShape::SymbolLike);
        assert_eq!(classify("std::vector"), QueryShape::SymbolLike);
        assert_eq!(classify("List<User>"), QueryShape::SymbolLike);
    }

    #[test]
    fn test_phrase_shapes() {
        assert_eq!(classify("where is the session handled"), QueryShape::Phrase);
        assert_eq!(classify("timeout"), QueryShape::Phrase);
        assert_eq!(classify(""), QueryShape::Phrase);
    }

    #[test]
    fn test_syntactic_shapes() {
        assert_eq!(classify("a && b"), QueryShape::Syntactic);
        assert_eq!(classify("x[0]"), QueryShape::Syntactic);
        assert!(wants_literal_tier("Vec<String>"));
        assert!(wants_literal_tier("foo::bar"));
        assert!(!wants_literal_tier("plain words"));
    }

    #[test]
    fn test_path_shapes() {
        assert_eq!(classify("src/services/auth.rs"), QueryShape::PathLike);
        assert_eq!(classify("lib/utils/"), QueryShape::PathLike);
    }

    #[test]
    fn test_mixed_query_keeps_symbol_tier() {
        assert_eq!(classify("find UserService here"), QueryShape::SymbolLike);
    }

    #[test]
    fn test_case_variants() {
        assert_eq!(to_snake_case("UserService"), "user_service");
        assert_eq!(to_pascal_case("user_service"), "UserService");
        assert_eq!(to_camel_case("user_service"), "userService");

        let candidates = exact_lookup_candidates("user service");
        assert!(candidates.contains(&"UserService".to_string()));
        assert!(candidates.contains(&"userService".to_string()));
        assert!(candidates.contains(&"user_service".to_string()));
    }

    #[test]
    fn test_qualified_last_segment() {
        let candidates = exact_lookup_candidates("auth::SessionManager");
        assert_eq!(candidates[0], "auth::SessionManager");
        assert!(candidates.contains(&"SessionManager".to_string()));
    }
}
