//! Type sniffing for raw term values.
//!
//! The compiler asks a [`TypeSniffer`] whether a raw value looks numeric or
//! boolean and never inspects patterns itself, so the matching strategy can
//! be swapped without touching operator dispatch or field merging.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

use crate::config::MatchMode;

static NUMBER_ANYWHERE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(\.\d+)?").expect("numeric pattern compiles"));
static BOOLEAN_ANYWHERE: Lazy<Regex> =
    Lazy::new(|| Regex::new("true|false").expect("boolean pattern compiles"));
static NUMBER_EXACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("anchored numeric pattern compiles"));

/// Decides which literal type a raw value should become.
pub trait TypeSniffer: Send + Sync + fmt::Debug {
    /// Whether `raw` passes the numeric pattern. A `true` answer does not
    /// guarantee that `raw` parses as `f64`.
    fn is_numeric(&self, raw: &str) -> bool;

    /// The boolean `raw` denotes, if it passes the boolean pattern.
    fn boolean(&self, raw: &str) -> Option<bool>;
}

/// Substring matching: `5x` is numeric, `truest` is `true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnanchoredSniffer;

impl TypeSniffer for UnanchoredSniffer {
    fn is_numeric(&self, raw: &str) -> bool {
        NUMBER_ANYWHERE.is_match(raw)
    }

    fn boolean(&self, raw: &str) -> Option<bool> {
        BOOLEAN_ANYWHERE.find(raw).map(|m| m.as_str() == "true")
    }
}

/// Whole-value matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnchoredSniffer;

impl TypeSniffer for AnchoredSniffer {
    fn is_numeric(&self, raw: &str) -> bool {
        NUMBER_EXACT.is_match(raw)
    }

    fn boolean(&self, raw: &str) -> Option<bool> {
        match raw {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }
}

/// Build the sniffer for a configured match mode.
pub fn sniffer_for(mode: MatchMode) -> Arc<dyn TypeSniffer> {
    match mode {
        MatchMode::Unanchored => Arc::new(UnanchoredSniffer),
        MatchMode::Anchored => Arc::new(AnchoredSniffer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unanchored_numeric_matches_substrings() {
        let s = UnanchoredSniffer;
        assert!(s.is_numeric("42"));
        assert!(s.is_numeric("-3.5"));
        assert!(s.is_numeric("5x"));
        assert!(s.is_numeric("abc1"));
        assert!(!s.is_numeric("John"));
        assert!(!s.is_numeric(""));
    }

    #[test]
    fn unanchored_boolean_uses_first_match() {
        let s = UnanchoredSniffer;
        assert_eq!(s.boolean("true"), Some(true));
        assert_eq!(s.boolean("false"), Some(false));
        assert_eq!(s.boolean("truest"), Some(true));
        assert_eq!(s.boolean("isfalse"), Some(false));
        assert_eq!(s.boolean("True"), None);
        assert_eq!(s.boolean("yes"), None);
    }

    #[test]
    fn anchored_requires_whole_value() {
        let s = AnchoredSniffer;
        assert!(s.is_numeric("19.99"));
        assert!(s.is_numeric("-7"));
        assert!(!s.is_numeric("5x"));
        assert!(!s.is_numeric("1."));
        assert_eq!(s.boolean("true"), Some(true));
        assert_eq!(s.boolean("truest"), None);
    }

    #[test]
    fn sniffer_for_selects_strategy() {
        assert!(sniffer_for(MatchMode::Unanchored).is_numeric("v2"));
        assert!(!sniffer_for(MatchMode::Anchored).is_numeric("v2"));
    }
}
