//! Lexical evidence checks against the source text of a run.
//!
//! The verifier answers one question: does the source mention any of these
//! terms? It gates whether an optional field may be asserted at all. It does
//! not extract values.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EvidenceError;

/// Characters of context kept on each side of a match.
pub const EXCERPT_RADIUS: usize = 50;

/// Run-scoped key of a registered source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(String);

impl SourceRef {
    /// Generates a fresh, unique reference.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("src_{}", Uuid::new_v4().simple()))
    }

    /// Borrows the reference as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
enum Slot {
    Live(Arc<str>),
    Released,
}

/// Registered source texts of one run.
///
/// Texts are immutable once registered. Released references stay known so
/// late lookups fail with [`EvidenceError::Released`] rather than looking
/// unregistered.
#[derive(Debug, Default)]
pub struct EvidenceContext {
    sources: HashMap<SourceRef, Slot>,
}

impl EvidenceContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `text` and returns its reference.
    pub fn register(&mut self, text: impl Into<Arc<str>>) -> SourceRef {
        let source_ref = SourceRef::generate();
        self.sources.insert(source_ref.clone(), Slot::Live(text.into()));
        source_ref
    }

    /// Looks up the text behind `source_ref`.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Unregistered`] or [`EvidenceError::Released`].
    pub fn resolve(&self, source_ref: &SourceRef) -> Result<&str, EvidenceError> {
        match self.sources.get(source_ref) {
            Some(Slot::Live(text)) => Ok(text.as_ref()),
            Some(Slot::Released) => Err(EvidenceError::Released(source_ref.to_string())),
            None => Err(EvidenceError::Unregistered(source_ref.to_string())),
        }
    }

    /// Drops the text behind `source_ref`. Returns whether it was live.
    pub fn release(&mut self, source_ref: &SourceRef) -> bool {
        match self.sources.get_mut(source_ref) {
            Some(slot) if matches!(slot, Slot::Live(_)) => {
                *slot = Slot::Released;
                true
            }
            _ => false,
        }
    }

    /// Number of texts still held.
    #[must_use]
    pub fn live_sources(&self) -> usize {
        self.sources
            .values()
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .count()
    }
}

/// Result of one evidence probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceOutcome {
    /// Field the probe was run for.
    pub field: String,
    /// Whether any term occurs in the source.
    pub found: bool,
    /// The first term that matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_term: Option<String>,
    /// Source text around the match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    /// Every term that was searched, in search order.
    pub searched_terms: Vec<String>,
}

/// Probes registered source text for lexical evidence.
pub struct EvidenceVerifier<'a> {
    context: &'a EvidenceContext,
}

impl<'a> EvidenceVerifier<'a> {
    /// Creates a verifier over `context`.
    #[must_use]
    pub const fn new(context: &'a EvidenceContext) -> Self {
        Self { context }
    }

    /// Searches the source for each term in order and reports the first hit.
    ///
    /// Matching is case-preserving substring search. Blank terms are dropped
    /// and duplicates are searched once. The context is never mutated, so
    /// repeated calls return identical outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError`] if the reference is unknown or released, or
    /// if no usable term was given.
    pub fn verify(
        &self,
        field: &str,
        terms: &[String],
        source_ref: &SourceRef,
    ) -> Result<EvidenceOutcome, EvidenceError> {
        let text = self.context.resolve(source_ref)?;

        let mut searched: Vec<String> = Vec::with_capacity(terms.len());
        for term in terms.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !searched.iter().any(|s| s == term) {
                searched.push(term.to_string());
            }
        }
        if searched.is_empty() {
            return Err(EvidenceError::NoProbeTerms);
        }

        let hit = searched
            .iter()
            .find_map(|term| text.find(term.as_str()).map(|pos| (term.clone(), pos)));

        Ok(match hit {
            Some((term, pos)) => EvidenceOutcome {
                field: field.to_string(),
                found: true,
                excerpt: Some(excerpt(text, pos, &term)),
                matched_term: Some(term),
                searched_terms: searched,
            },
            None => EvidenceOutcome {
                field: field.to_string(),
                found: false,
                matched_term: None,
                excerpt: None,
                searched_terms: searched,
            },
        })
    }
}

/// Cuts [`EXCERPT_RADIUS`] characters either side of the match at byte `pos`.
fn excerpt(text: &str, pos: usize, term: &str) -> String {
    let start = text[..pos].chars().count();
    let total = text.chars().count();
    let from = start.saturating_sub(EXCERPT_RADIUS);
    let to = (start + term.chars().count() + EXCERPT_RADIUS).min(total);

    let mut excerpt = String::new();
    if from > 0 {
        excerpt.push_str("...");
    }
    excerpt.extend(text.chars().skip(from).take(to - from));
    if to < total {
        excerpt.push_str("...");
    }
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBITUARY: &str = "林炳尧同志，福建晋江人，1943年出生，1961年入伍，\
                            1964年加入中国共产党，1995年晋升为少将军衔。";

    fn terms(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_found_returns_term_and_excerpt() {
        let mut context = EvidenceContext::new();
        let source = context.register(OBITUARY);
        let outcome = EvidenceVerifier::new(&context)
            .verify("hometown", &terms(&["籍贯", "晋江"]), &source)
            .unwrap();
        assert!(outcome.found);
        assert_eq!(outcome.matched_term.as_deref(), Some("晋江"));
        assert!(outcome.excerpt.unwrap().contains("福建晋江人"));
    }

    #[test]
    fn test_not_found_lists_all_terms() {
        let mut context = EvidenceContext::new();
        let source = context.register(OBITUARY);
        let outcome = EvidenceVerifier::new(&context)
            .verify("spouse_name", &terms(&["妻子", "夫人", "配偶", "妻子", " "]), &source)
            .unwrap();
        assert!(!outcome.found);
        assert!(outcome.excerpt.is_none());
        assert_eq!(outcome.searched_terms, terms(&["妻子", "夫人", "配偶"]));
    }

    #[test]
    fn test_search_is_case_preserving() {
        let mut context = EvidenceContext::new();
        let source = context.register("Awarded the Order of Merit in 1988.");
        let verifier = EvidenceVerifier::new(&context);
        assert!(!verifier.verify("awards", &terms(&["order of merit"]), &source).unwrap().found);
        assert!(verifier.verify("awards", &terms(&["Order of Merit"]), &source).unwrap().found);
    }

    #[test]
    fn test_verify_is_idempotent() {
        let mut context = EvidenceContext::new();
        let source = context.register(OBITUARY);
        let verifier = EvidenceVerifier::new(&context);
        let probe = terms(&["少将", "中将"]);
        let first = verifier.verify("promotions", &probe, &source);
        let second = verifier.verify("promotions", &probe, &source);
        assert_eq!(first, second);
    }

    #[test]
    fn test_excerpt_is_bounded_by_characters() {
        let text = format!("{}配偶张某{}", "甲".repeat(80), "乙".repeat(80));
        let mut context = EvidenceContext::new();
        let source = context.register(text);
        let outcome = EvidenceVerifier::new(&context)
            .verify("spouse_name", &terms(&["配偶"]), &source)
            .unwrap();
        let excerpt = outcome.excerpt.unwrap();
        assert!(excerpt.starts_with("..."));
        assert!(excerpt.ends_with("..."));
        assert_eq!(excerpt.chars().count(), 3 + EXCERPT_RADIUS + 2 + EXCERPT_RADIUS + 3);
    }

    #[test]
    fn test_unregistered_and_released_are_errors() {
        let mut context = EvidenceContext::new();
        let verifier_terms = terms(&["少将"]);
        let stray = SourceRef::from("src_missing");
        assert_eq!(
            EvidenceVerifier::new(&context).verify("promotions", &verifier_terms, &stray),
            Err(EvidenceError::Unregistered("src_missing".to_string()))
        );

        let source = context.register(OBITUARY);
        assert!(context.release(&source));
        assert!(!context.release(&source));
        assert_eq!(context.live_sources(), 0);
        assert!(matches!(
            EvidenceVerifier::new(&context).verify("promotions", &verifier_terms, &source),
            Err(EvidenceError::Released(_))
        ));
    }

    #[test]
    fn test_empty_probe_is_an_error() {
        let mut context = EvidenceContext::new();
        let source = context.register(OBITUARY);
        assert_eq!(
            EvidenceVerifier::new(&context).verify("awards", &[], &source),
            Err(EvidenceError::NoProbeTerms)
        );
    }
}
