//! The result of a generation request: the quiz plus how it was made.

use crate::diagnostics::Diagnostics;
use crate::error::QuizGenError;
use crate::quiz::QuizDocument;
use serde::Serialize;

/// Everything a successful (possibly partial) request produces.
///
/// Serialises with the document's keys at the top level, so the JSON is a
/// valid quiz document with two extra fields.
#[derive(Debug, Clone, Serialize)]
pub struct QuizOutput {
    #[serde(flatten)]
    pub document: QuizDocument,
    pub diagnostics: Diagnostics,
    pub stats: GenerationStats,
}

impl QuizOutput {
    pub fn total_questions(&self) -> usize {
        self.document.total_questions()
    }

    /// `true` when every requested kind was filled.
    pub fn is_complete(&self) -> bool {
        self.diagnostics.shortfalls.is_empty()
    }

    /// Treat a partial quiz as an error.
    pub fn into_result(self) -> Result<QuizDocument, QuizGenError> {
        match self.diagnostics.missing_questions() {
            0 => Ok(self.document),
            missing => Err(QuizGenError::IncompleteQuiz { missing }),
        }
    }
}

/// Counters and timings for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationStats {
    pub chunks: usize,
    pub calls_dispatched: usize,
    pub calls_succeeded: usize,
    pub calls_failed: usize,
    pub calls_abandoned: usize,
    pub candidates_parsed: usize,
    pub items_accepted: usize,
    pub duplicates_removed: usize,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_retries: u64,
    pub total_duration_ms: u64,
    pub generation_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Shortfall;
    use crate::quiz::{QuestionKind, ShortAnswerItem};

    fn output() -> QuizOutput {
        let mut document = QuizDocument::default();
        document.short_answer.push(ShortAnswerItem {
            question: "Why?".into(),
            expected_answer: "Because.".into(),
        });
        QuizOutput {
            document,
            diagnostics: Diagnostics::default(),
            stats: GenerationStats::default(),
        }
    }

    #[test]
    fn serialises_flat() {
        let json = serde_json::to_value(output()).unwrap();
        assert_eq!(json["short_answer"][0]["question"], "Why?");
        assert!(json["mcq"].as_array().unwrap().is_empty());
        assert!(json["diagnostics"].is_object());
        assert_eq!(json["stats"]["chunks"], 0);
    }

    #[test]
    fn into_result_reports_missing() {
        assert!(output().into_result().is_ok());

        let mut partial = output();
        partial.diagnostics.shortfalls.push(Shortfall {
            kind: QuestionKind::ShortAnswer,
            requested: 3,
            delivered: 1,
        });
        assert!(!partial.is_complete());
        let err = partial.into_result().unwrap_err();
        assert!(matches!(err, QuizGenError::IncompleteQuiz { missing: 2 }));
    }
}
