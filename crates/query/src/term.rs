//! Term splitting and operator detection.

use crate::filter::ComparisonOp;

/// Surface operator found inside a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gte,
    Lte,
    Gt,
    Lt,
    Ne,
    Eq,
}

impl Operator {
    /// Detection order. `>=` must be tried before `>` and `!:` before `:`
    /// because the shorter symbols are substrings of the longer ones.
    pub const PRECEDENCE: [Operator; 6] = [
        Operator::Gte,
        Operator::Lte,
        Operator::Gt,
        Operator::Lt,
        Operator::Ne,
        Operator::Eq,
    ];

    pub const fn symbol(self) -> &'static str {
        match self {
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ne => "!:",
            Operator::Eq => ":",
        }
    }

    /// Canonical comparison for this operator; `None` for plain equality.
    pub const fn comparison(self) -> Option<ComparisonOp> {
        match self {
            Operator::Gte => Some(ComparisonOp::Gte),
            Operator::Lte => Some(ComparisonOp::Lte),
            Operator::Gt => Some(ComparisonOp::Gt),
            Operator::Lt => Some(ComparisonOp::Lt),
            Operator::Ne => Some(ComparisonOp::Ne),
            Operator::Eq => None,
        }
    }
}

/// One `field<op>value` fragment of a search string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Term<'a> {
    pub field: &'a str,
    pub op: Operator,
    pub raw: &'a str,
}

/// Split a search string on single spaces. Runs of spaces yield empty terms.
pub fn split_terms(input: &str) -> impl Iterator<Item = &str> {
    input.split(' ')
}

/// Detect the operator of `term` and split it on the operator's first
/// occurrence. Returns `None` when no operator symbol appears in the term.
///
/// Detection looks at the whole term, so `name:a>b` is treated as a `>`
/// comparison on the field `name:a`.
pub fn parse_term(term: &str) -> Option<Term<'_>> {
    let op = Operator::PRECEDENCE
        .into_iter()
        .find(|op| term.contains(op.symbol()))?;
    let (field, raw) = term.split_once(op.symbol())?;
    Some(Term { field, op, raw })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gte_wins_over_gt() {
        let term = parse_term("age>=5").unwrap();
        assert_eq!(term.op, Operator::Gte);
        assert_eq!(term.field, "age");
        assert_eq!(term.raw, "5");
    }

    #[test]
    fn ne_wins_over_eq() {
        let term = parse_term("status!:A").unwrap();
        assert_eq!(term.op, Operator::Ne);
        assert_eq!(term.field, "status");
        assert_eq!(term.raw, "A");
    }

    #[test]
    fn splits_on_first_occurrence_only() {
        let term = parse_term("url:http://example.org").unwrap();
        assert_eq!(term.op, Operator::Eq);
        assert_eq!(term.field, "url");
        assert_eq!(term.raw, "http://example.org");
    }

    #[test]
    fn comparison_symbol_anywhere_takes_precedence() {
        let term = parse_term("name:a>b").unwrap();
        assert_eq!(term.op, Operator::Gt);
        assert_eq!(term.field, "name:a");
        assert_eq!(term.raw, "b");
    }

    #[test]
    fn no_operator_yields_none() {
        assert!(parse_term("justaword").is_none());
        assert!(parse_term("").is_none());
    }

    #[test]
    fn consecutive_spaces_produce_empty_terms() {
        let terms: Vec<_> = split_terms("a:1  b:2").collect();
        assert_eq!(terms, vec!["a:1", "", "b:2"]);
    }

    #[test]
    fn empty_field_and_value_are_preserved() {
        let term = parse_term(":").unwrap();
        assert_eq!(term.field, "");
        assert_eq!(term.raw, "");
    }
}
