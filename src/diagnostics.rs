//! Per-request record of everything that went wrong without being fatal.
//!
//! A quiz is returned whenever at least one backend call succeeded, so the
//! caller needs another channel to learn which chunks produced garbage,
//! which items were rejected and why, and which kinds came up short. Every
//! entry names the chunk and question kind it belongs to.

use crate::error::BackendError;
use crate::pipeline::parse::ParseError;
use crate::pipeline::validate::ValidationError;
use crate::quiz::{CandidateItem, QuestionKind};
use serde::Serialize;
use std::collections::BTreeMap;

/// Backend output for one call could not be parsed at all.
#[derive(Debug, Clone, Serialize)]
pub struct ParseFailure {
    pub chunk_id: usize,
    pub kind: QuestionKind,
    pub error: ParseError,
    /// First 200 characters of the raw output.
    pub snippet: String,
}

/// One parsed candidate failed validation.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationFailure {
    pub chunk_id: usize,
    pub kind: QuestionKind,
    pub reason: ValidationError,
    pub candidate: CandidateItem,
}

/// A backend call failed after all retries.
#[derive(Debug, Clone, Serialize)]
pub struct BackendFailure {
    pub chunk_id: usize,
    pub kind: QuestionKind,
    pub error: BackendError,
    pub retries: u32,
}

/// Fewer valid unique items than requested were available for a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortfall {
    pub kind: QuestionKind,
    pub requested: usize,
    pub delivered: usize,
}

impl Shortfall {
    pub fn missing(&self) -> usize {
        self.requested.saturating_sub(self.delivered)
    }
}

/// A call still in flight when the request deadline expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbandonedCall {
    pub chunk_id: usize,
    pub kind: QuestionKind,
}

/// Failure tallies for one question kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FailureCounts {
    pub parse: usize,
    pub validation: usize,
    pub backend: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub parse_failures: Vec<ParseFailure>,
    pub validation_failures: Vec<ValidationFailure>,
    pub backend_failures: Vec<BackendFailure>,
    pub shortfalls: Vec<Shortfall>,
    /// Items dropped as duplicates, per kind.
    pub duplicates_removed: BTreeMap<QuestionKind, usize>,
    /// The request deadline expired before every call completed.
    pub deadline_exceeded: bool,
    pub abandoned_calls: Vec<AbandonedCall>,
}

impl Diagnostics {
    /// `true` when nothing at all was recorded.
    pub fn is_clean(&self) -> bool {
        self.parse_failures.is_empty()
            && self.validation_failures.is_empty()
            && self.backend_failures.is_empty()
            && self.shortfalls.is_empty()
            && !self.deadline_exceeded
    }

    pub fn failure_counts(&self) -> BTreeMap<QuestionKind, FailureCounts> {
        let mut counts: BTreeMap<QuestionKind, FailureCounts> = BTreeMap::new();
        for f in &self.parse_failures {
            counts.entry(f.kind).or_default().parse += 1;
        }
        for f in &self.validation_failures {
            counts.entry(f.kind).or_default().validation += 1;
        }
        for f in &self.backend_failures {
            counts.entry(f.kind).or_default().backend += 1;
        }
        counts
    }

    /// Total requested questions that were not delivered.
    pub fn missing_questions(&self) -> usize {
        self.shortfalls.iter().map(Shortfall::missing).sum()
    }

    pub(crate) fn sort(&mut self) {
        self.parse_failures.sort_by_key(|f| (f.chunk_id, f.kind));
        self.validation_failures.sort_by_key(|f| (f.chunk_id, f.kind));
        self.backend_failures.sort_by_key(|f| (f.chunk_id, f.kind));
        self.abandoned_calls.sort_by_key(|c| (c.chunk_id, c.kind));
    }
}

/// Leading `max_chars` characters of `raw`, on a char boundary.
pub(crate) fn snippet(raw: &str, max_chars: usize) -> String {
    match raw.char_indices().nth(max_chars) {
        Some((idx, _)) => raw[..idx].to_string(),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_group_by_kind() {
        let mut d = Diagnostics::default();
        d.parse_failures.push(ParseFailure {
            chunk_id: 1,
            kind: QuestionKind::Mcq,
            error: ParseError::NoJson,
            snippet: "sorry".into(),
        });
        d.backend_failures.push(BackendFailure {
            chunk_id: 0,
            kind: QuestionKind::Mcq,
            error: BackendError::Timeout { elapsed_ms: 5 },
            retries: 0,
        });
        d.backend_failures.push(BackendFailure {
            chunk_id: 0,
            kind: QuestionKind::FillBlank,
            error: BackendError::Timeout { elapsed_ms: 5 },
            retries: 0,
        });
        let counts = d.failure_counts();
        assert_eq!(counts[&QuestionKind::Mcq], FailureCounts { parse: 1, validation: 0, backend: 1 });
        assert_eq!(counts[&QuestionKind::FillBlank].backend, 1);
        assert!(!counts.contains_key(&QuestionKind::ShortAnswer));
        assert!(!d.is_clean());
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        assert_eq!(snippet("héllo wörld", 4), "héll");
        assert_eq!(snippet("short", 200), "short");
    }

    #[test]
    fn serialises_kinds_as_map_keys() {
        let mut d = Diagnostics::default();
        d.duplicates_removed.insert(QuestionKind::ShortAnswer, 2);
        d.shortfalls.push(Shortfall {
            kind: QuestionKind::Mcq,
            requested: 5,
            delivered: 3,
        });
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["duplicates_removed"]["short_answer"], 2);
        assert_eq!(json["shortfalls"][0]["kind"], "mcq");
        assert_eq!(d.missing_questions(), 2);
    }
}
