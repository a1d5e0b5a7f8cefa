//! objgate search-string compiler.
//!
//! Turns the plain-text search syntax accepted by the `/search` endpoint into
//! a document-store filter:
//!
//! ```text
//! status:A weight>=50 name!:John
//!   => {"status":"A","weight":{"$gte":50},"name":{"$ne":"John"}}
//! ```
//!
//! ## Syntax
//!
//! Terms are separated by single spaces. Each term is `field<op>value` where
//! `op` is one of `>=`, `<=`, `>`, `<`, `!:` or `:` (tried in that order).
//! `:` binds the field to a literal; the others build comparison objects that
//! merge when a field is constrained more than once.
//!
//! Values become numbers, then booleans, then strings. Ordering comparisons
//! only accept numbers; `!:` accepts anything.
//!
//! ## No errors
//!
//! Terms that cannot be understood are dropped. Empty input matches
//! everything. [`QueryCompiler::compile_with_diagnostics`] reports what was
//! dropped and why.
//!
//! ## Pure function guarantee
//!
//! No I/O and no shared mutable state. A [`QueryCompiler`] can be shared
//! across threads freely.

mod compiler;
mod config;
mod error;
mod filter;
mod sniff;
mod term;

pub use crate::compiler::{CompileReport, QueryCompiler, SkipReason, SkippedTerm};
pub use crate::config::{CompilerConfig, MatchMode, DEFAULT_OPERATOR_PREFIX};
pub use crate::error::QueryError;
pub use crate::filter::{ComparisonOp, ComparisonSet, FieldFilter, FilterExpression, ScalarValue};
pub use crate::sniff::{sniffer_for, AnchoredSniffer, TypeSniffer, UnanchoredSniffer};
pub use crate::term::{parse_term, split_terms, Operator, Term};

/// Compile with the default configuration.
pub fn compile(search: &str) -> FilterExpression {
    QueryCompiler::default().compile(search)
}

/// Compile possibly-absent input with the default configuration.
pub fn compile_opt(search: Option<&str>) -> FilterExpression {
    QueryCompiler::default().compile_opt(search)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn compiled(search: &str) -> Value {
        compile(search).to_document(DEFAULT_OPERATOR_PREFIX)
    }

    #[test]
    fn equality_uses_typed_literal() {
        assert_eq!(compiled("f:v"), json!({"f": "v"}));
        assert_eq!(compiled("f:12"), json!({"f": 12}));
        assert_eq!(compiled("f:false"), json!({"f": false}));
    }

    #[test]
    fn empty_and_absent_input_match_all() {
        assert!(compile("").is_empty());
        assert!(compile_opt(None).is_empty());
        assert_eq!(compile("").to_string(), "{}");
    }

    #[test]
    fn gte_is_not_parsed_as_gt() {
        let filter = compile("age>=5");
        let Some(FieldFilter::Comparisons(set)) = filter.get("age") else {
            panic!("age should hold comparisons");
        };
        assert_eq!(set.get(ComparisonOp::Gte), Some(&ScalarValue::Number(5.0)));
        assert!(set.get(ComparisonOp::Gt).is_none());
        assert_eq!(compiled("age>=5"), json!({"age": {"$gte": 5}}));
    }

    #[test]
    fn comparisons_on_one_field_merge() {
        assert_eq!(
            compiled("age>=5 age<=10"),
            json!({"age": {"$gte": 5, "$lte": 10}})
        );
    }

    #[test]
    fn repeated_literal_last_wins() {
        assert_eq!(compiled("status:A status:B"), json!({"status": "B"}));
    }

    #[test]
    fn decimal_is_a_number() {
        assert_eq!(compiled("price:19.99"), json!({"price": 19.99}));
    }

    #[test]
    fn boolean_literal() {
        assert_eq!(compiled("active:true"), json!({"active": true}));
    }

    #[test]
    fn string_fallback() {
        assert_eq!(compiled("name:John"), json!({"name": "John"}));
    }

    #[test]
    fn non_numeric_comparison_is_dropped() {
        assert_eq!(compiled("name>John"), json!({}));
    }

    #[test]
    fn ne_accepts_strings() {
        assert_eq!(compiled("status!:A"), json!({"status": {"$ne": "A"}}));
    }

    #[test]
    fn term_without_operator_is_dropped() {
        assert_eq!(compiled("justaword"), json!({}));
    }

    #[test]
    fn multi_term_composite() {
        assert_eq!(
            compile("status:A code:400").to_string(),
            r#"{"status":"A","code":400}"#
        );
    }

    #[test]
    fn reference_example_renders_compactly() {
        assert_eq!(
            compile("status:A weight>=50").to_string(),
            r#"{"status":"A","weight":{"$gte":50}}"#
        );
    }

    #[test]
    fn negative_numbers_are_numeric() {
        assert_eq!(compiled("delta<-2.5"), json!({"delta": {"$lt": -2.5}}));
    }
}
