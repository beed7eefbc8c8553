//! Selector patterns.
//!
//! `*` matches any run of characters (including `/`); every other
//! character is literal. A selector without `*` is an exact match.

use glob::MatchOptions;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// A compiled selector
#[derive(Debug, Clone)]
pub enum Pattern {
    Exact(String),
    Wildcard(glob::Pattern),
}

impl Pattern {
    /// Compile a selector string
    pub fn new(selector: &str) -> Self {
        if !is_wildcard(selector) {
            return Self::Exact(selector.to_string());
        }

        // Runs of `*` collapse to one; glob rejects `**` inside a component
        let mut escaped = String::with_capacity(selector.len() * 2);
        let mut literal = String::new();
        let mut after_star = false;
        for c in selector.chars() {
            if c == '*' {
                if !after_star {
                    escaped.push_str(&glob::Pattern::escape(&literal));
                    literal.clear();
                    escaped.push('*');
                }
                after_star = true;
            } else {
                literal.push(c);
                after_star = false;
            }
        }
        escaped.push_str(&glob::Pattern::escape(&literal));

        match glob::Pattern::new(&escaped) {
            Ok(p) => Self::Wildcard(p),
            // Unreachable for escaped input
            Err(_) => Self::Exact(selector.to_string()),
        }
    }

    /// Whether `candidate` satisfies this selector
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            Self::Exact(s) => s == candidate,
            Self::Wildcard(p) => p.matches_with(candidate, MATCH_OPTIONS),
        }
    }
}

/// Whether a selector is a wildcard pattern
pub fn is_wildcard(selector: &str) -> bool {
    selector.contains('*')
}

/// Translate a wildcard selector to a SQLite `GLOB` operand. `?` and `[`
/// are bracket-escaped so only `*` is special.
pub fn to_sql_glob(selector: &str) -> String {
    let mut out = String::with_capacity(selector.len());
    for c in selector.chars() {
        match c {
            '?' => out.push_str("[?]"),
            '[' => out.push_str("[[]"),
            _ => out.push(c),
        }
    }
    out
}
