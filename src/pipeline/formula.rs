//! Heuristic formula-candidate detection.
//!
//! This is a line filter, not a formula parser: it flags lines that look like
//! `identifier = expression`, lines mixing algebra with LaTeX macros, and lines
//! dense in mathematical symbols. False positives and negatives are accepted;
//! the output is deterministic and idempotent.
//!
//! The per-line test is a [`FormulaPredicate`] so a different detector (for
//! instance a model-backed one) can replace the regex heuristic without
//! touching chunking or segmentation.

use super::chunker::content_lines;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Lines shorter than this (in characters) are never candidates.
pub const MIN_CANDIDATE_CHARS: usize = 4;

/// Symbols counted by the density rule.
pub const FORMULA_SYMBOLS: [char; 10] = ['=', '+', '-', '*', '/', '^', '∑', '∫', '√', 'λ'];

/// Decides whether one stripped, non-blank line is a formula candidate.
pub trait FormulaPredicate {
    fn is_candidate(&self, line: &str) -> bool;
}

impl<F> FormulaPredicate for F
where
    F: Fn(&str) -> bool,
{
    fn is_candidate(&self, line: &str) -> bool {
        self(line)
    }
}

static RE_FORMULA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[A-Za-z]\w*\s*=\s*[^\n]+|[\d\w\s\+\-\*/\^_=<>\(\)]+(?:\\frac|\\sum|\\int)[^\n]*",
    )
    .expect("formula pattern is valid")
});

/// Default detector: assignment/LaTeX pattern, or at least two distinct
/// symbols from [`FORMULA_SYMBOLS`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicPredicate;

impl FormulaPredicate for HeuristicPredicate {
    fn is_candidate(&self, line: &str) -> bool {
        RE_FORMULA.is_match(line) || distinct_symbol_count(line) >= 2
    }
}

fn distinct_symbol_count(line: &str) -> usize {
    FORMULA_SYMBOLS
        .iter()
        .filter(|sym| line.contains(**sym))
        .count()
}

/// Detect formula candidates in raw page text with the default heuristic.
pub fn detect(page_text: &str) -> Vec<String> {
    detect_with(page_text, &HeuristicPredicate)
}

/// Detect formula candidates with a caller-supplied predicate.
///
/// Returns the stripped candidate lines, sorted and duplicate-free.
pub fn detect_with<P: FormulaPredicate + ?Sized>(page_text: &str, predicate: &P) -> Vec<String> {
    content_lines(page_text)
        .filter(|line| line.chars().count() >= MIN_CANDIDATE_CHARS)
        .filter(|line| predicate.is_candidate(line))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
