use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::config::CompilerConfig;
use crate::error::QueryError;
use crate::filter::{ComparisonOp, FilterExpression, ScalarValue};
use crate::sniff::{sniffer_for, TypeSniffer};
use crate::term::{parse_term, split_terms, Term};

/// Why a term contributed nothing to the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Empty fragment between consecutive spaces.
    Blank,
    /// No operator symbol in the term.
    NoOperator,
    /// Ordering comparison against a value that does not look numeric.
    NonNumericOperand { op: ComparisonOp },
    /// Value looked numeric but does not parse as a number.
    MalformedNumber { op: ComparisonOp },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Blank => f.write_str("empty term"),
            SkipReason::NoOperator => f.write_str("no operator found"),
            SkipReason::NonNumericOperand { op } => {
                write!(f, "'{}' requires a numeric value", op.tag())
            }
            SkipReason::MalformedNumber { op } => {
                write!(f, "'{}' value is not a valid number", op.tag())
            }
        }
    }
}

/// A term that was dropped during compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedTerm {
    /// Zero-based index of the term in the space-split input.
    pub position: usize,
    pub term: String,
    pub reason: SkipReason,
}

/// Filter plus the terms that were ignored while building it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileReport {
    pub filter: FilterExpression,
    pub skipped: Vec<SkippedTerm>,
}

/// Translates search strings such as `status:A weight>=50` into filters.
///
/// Compilation is infallible: terms that cannot be understood are dropped.
/// Use [`QueryCompiler::compile_with_diagnostics`] to see what was dropped.
#[derive(Clone)]
pub struct QueryCompiler {
    config: CompilerConfig,
    sniffer: Arc<dyn TypeSniffer>,
}

impl fmt::Debug for QueryCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCompiler")
            .field("config", &self.config)
            .field("sniffer", &self.sniffer)
            .finish()
    }
}

impl Default for QueryCompiler {
    fn default() -> Self {
        let config = CompilerConfig::default();
        let sniffer = sniffer_for(config.matching);
        Self { config, sniffer }
    }
}

impl QueryCompiler {
    pub fn new(config: CompilerConfig) -> Result<Self, QueryError> {
        config.validate()?;
        let sniffer = sniffer_for(config.matching);
        Ok(Self { config, sniffer })
    }

    /// Replace the type sniffer selected by the configured match mode.
    pub fn with_sniffer(mut self, sniffer: Arc<dyn TypeSniffer>) -> Self {
        self.sniffer = sniffer;
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compile(&self, search: &str) -> FilterExpression {
        self.build(search, |_, _, _| {})
    }

    /// Absent input compiles to the empty (match-all) filter.
    pub fn compile_opt(&self, search: Option<&str>) -> FilterExpression {
        search.map_or_else(FilterExpression::new, |s| self.compile(s))
    }

    pub fn compile_with_diagnostics(&self, search: &str) -> CompileReport {
        let mut skipped = Vec::new();
        let filter = self.build(search, |position, term, reason| {
            skipped.push(SkippedTerm {
                position,
                term: term.to_string(),
                reason,
            });
        });
        CompileReport { filter, skipped }
    }

    /// Compile and render as a filter document with the configured prefix.
    pub fn compile_to_document(&self, search: Option<&str>) -> Value {
        self.render(&self.compile_opt(search))
    }

    /// Compile and render as compact JSON text.
    pub fn compile_to_string(&self, search: Option<&str>) -> String {
        self.compile_opt(search)
            .to_json_string(&self.config.operator_prefix)
    }

    pub fn render(&self, filter: &FilterExpression) -> Value {
        filter.to_document(&self.config.operator_prefix)
    }

    fn build(
        &self,
        search: &str,
        mut on_skip: impl FnMut(usize, &str, SkipReason),
    ) -> FilterExpression {
        let mut filter = FilterExpression::new();
        if search.is_empty() {
            return filter;
        }

        for (position, raw_term) in split_terms(search).enumerate() {
            let Some(term) = parse_term(raw_term) else {
                let reason = if raw_term.is_empty() {
                    SkipReason::Blank
                } else {
                    SkipReason::NoOperator
                };
                on_skip(position, raw_term, reason);
                continue;
            };
            if let Err(reason) = self.apply(&mut filter, term) {
                on_skip(position, raw_term, reason);
            }
        }
        filter
    }

    fn apply(&self, filter: &mut FilterExpression, term: Term<'_>) -> Result<(), SkipReason> {
        let Some(op) = term.op.comparison() else {
            filter.set_literal(term.field, self.infer_literal(term.raw));
            return Ok(());
        };

        let value = match op {
            ComparisonOp::Ne => self
                .number(term.raw)
                .map_or_else(|| ScalarValue::Text(term.raw.to_string()), ScalarValue::Number),
            _ => {
                if !self.sniffer.is_numeric(term.raw) {
                    return Err(SkipReason::NonNumericOperand { op });
                }
                let n = parse_finite(term.raw).ok_or(SkipReason::MalformedNumber { op })?;
                ScalarValue::Number(n)
            }
        };
        filter.merge_comparison(term.field, op, value);
        Ok(())
    }

    /// Type a bare value the way `field:value` terms are typed: number,
    /// then boolean, then the raw text.
    pub fn infer_literal(&self, raw: &str) -> ScalarValue {
        if let Some(n) = self.number(raw) {
            return ScalarValue::Number(n);
        }
        if let Some(b) = self.sniffer.boolean(raw) {
            return ScalarValue::Bool(b);
        }
        ScalarValue::Text(raw.to_string())
    }

    fn number(&self, raw: &str) -> Option<f64> {
        if self.sniffer.is_numeric(raw) {
            parse_finite(raw)
        } else {
            None
        }
    }
}

/// Overflowing values such as `1e999` parse to infinity, which has no JSON
/// form; they count as malformed.
fn parse_finite(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|n| n.is_finite())
}
