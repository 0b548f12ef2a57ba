//! Subscription pattern compilation: exact names, the `"*"` catch-all, and
//! dot-segment globs (`orders.*`, `*.created`) compiled to an anchored regex.

use regex::Regex;

/// A compiled subscription pattern, classified up front so matching an
/// incoming event name never has to re-inspect the pattern string.
#[derive(Clone)]
pub enum Pattern {
    Exact(String),
    Wildcard,
    Glob { source: String, regex: Regex },
}

impl Pattern {
    /// Compile `pattern`. A bare `*` is the catch-all; anything containing
    /// `*` is a dot-segment glob (`*` matches one segment, never a `.`);
    /// everything else is an exact match.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }
        if pattern == "*" {
            return Ok(Pattern::Wildcard);
        }
        if pattern.contains('*') {
            let escaped = regex::escape(pattern).replace("\\*", "[^.]*");
            let regex = Regex::new(&format!("^{escaped}$")).map_err(|_| PatternError::Invalid)?;
            return Ok(Pattern::Glob { source: pattern.to_string(), regex });
        }
        Ok(Pattern::Exact(pattern.to_string()))
    }

    pub fn matches(&self, event_name: &str) -> bool {
        match self {
            Pattern::Exact(name) => name == event_name,
            Pattern::Wildcard => true,
            Pattern::Glob { regex, .. } => regex.is_match(event_name),
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Pattern::Exact(name) => name,
            Pattern::Wildcard => "*",
            Pattern::Glob { source, .. } => source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternError {
    Empty,
    Invalid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_matches_only_itself() {
        let p = Pattern::compile("orders.created").unwrap();
        assert!(p.matches("orders.created"));
        assert!(!p.matches("orders.updated"));
    }

    #[test]
    fn wildcard_matches_anything() {
        let p = Pattern::compile("*").unwrap();
        assert!(p.matches("orders.created"));
        assert!(p.matches("anything"));
    }

    #[test]
    fn glob_matches_single_segment_only() {
        let p = Pattern::compile("orders.*").unwrap();
        assert!(p.matches("orders.created"));
        assert!(!p.matches("orders.created.extra"));
        assert!(!p.matches("shipments.created"));
    }

    #[test]
    fn glob_prefix_wildcard_matches_single_segment() {
        let p = Pattern::compile("*.created").unwrap();
        assert!(p.matches("orders.created"));
        assert!(!p.matches("a.b.created"));
    }

    #[test]
    fn empty_pattern_is_rejected() {
        assert_eq!(Pattern::compile("").unwrap_err(), PatternError::Empty);
    }
}
