//! Glob-style patterns for registry name matching.
//!
//! Names conventionally use `:` as a segment separator (`room:lobby:users`).
//! `*` matches any run of characters that does not cross a `:` boundary,
//! `**` matches any run including separators, and `?` matches exactly one
//! character.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

/// A parsed name pattern.
///
/// # Example
/// ```rust
/// use quorum_rt::registry::NamePattern;
///
/// let p = NamePattern::new("room:*:users");
/// assert!(p.matches("room:lobby:users"));
/// assert!(!p.matches("room:a:b:users")); // `*` does not cross `:`
///
/// let p = NamePattern::new("room:**");
/// assert!(p.matches("room:a:b:users"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePattern {
    tokens: Vec<Token>,
    source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// A literal character.
    Literal(char),
    /// `?`: exactly one character.
    AnyChar,
    /// `*`: any run not containing `:`.
    AnySegment,
    /// `**`: any run, separators included.
    AnyRun,
}

impl NamePattern {
    /// Parse a pattern string.
    pub fn new(pattern: impl Into<String>) -> Self {
        let source = pattern.into();
        let mut tokens = Vec::with_capacity(source.len());
        let mut chars = source.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' => {
                    if chars.peek() == Some(&'*') {
                        chars.next();
                        tokens.push(Token::AnyRun);
                    } else {
                        tokens.push(Token::AnySegment);
                    }
                }
                '?' => tokens.push(Token::AnyChar),
                other => tokens.push(Token::Literal(other)),
            }
        }
        Self { tokens, source }
    }

    /// The original pattern string.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Test a name against the pattern.
    pub fn matches(&self, name: &str) -> bool {
        let chars: Vec<char> = name.chars().collect();
        match_at(&self.tokens, &chars, 0, 0)
    }
}

impl Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl From<&str> for NamePattern {
    fn from(pattern: &str) -> Self {
        Self::new(pattern)
    }
}

/// Recursive matcher; wildcards backtrack greedily.
fn match_at(tokens: &[Token], chars: &[char], ti: usize, ci: usize) -> bool {
    match tokens.get(ti) {
        None => ci == chars.len(),
        Some(Token::Literal(l)) => chars.get(ci) == Some(l) && match_at(tokens, chars, ti + 1, ci + 1),
        Some(Token::AnyChar) => ci < chars.len() && match_at(tokens, chars, ti + 1, ci + 1),
        Some(Token::AnySegment) => {
            // Zero or more characters, stopping at segment boundaries.
            let mut end = ci;
            loop {
                if match_at(tokens, chars, ti + 1, end) {
                    return true;
                }
                match chars.get(end) {
                    Some(c) if *c != ':' => end += 1,
                    _ => return false,
                }
            }
        }
        Some(Token::AnyRun) => {
            let mut end = ci;
            loop {
                if match_at(tokens, chars, ti + 1, end) {
                    return true;
                }
                if end >= chars.len() {
                    return false;
                }
                end += 1;
            }
        }
    }
}
