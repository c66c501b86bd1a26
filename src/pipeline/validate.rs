//! Validation: candidate items → schema-conformant [`QuizItem`]s.
//!
//! Each candidate is checked independently against the [`QuestionSpec`] it
//! was generated for. A rejected candidate becomes a
//! [`crate::diagnostics::ValidationFailure`]; it never fails the request.
//! Accepted items come out trimmed, with MCQ options re-labelled `A) …`.

use crate::quiz::{
    letter_index, option_letter, CandidateFillBlank, CandidateItem, CandidateMcq,
    CandidateShortAnswer, FillBlankItem, McqItem, QuestionKind, QuestionSpec, QuizItem,
    ShortAnswerItem,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

static RE_BLANK: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{3,}").unwrap());

/// Why a candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("candidate is a {got} item but {expected} was requested")]
    KindMismatch {
        expected: QuestionKind,
        got: QuestionKind,
    },

    #[error("missing or empty field '{field}'")]
    MissingField { field: &'static str },

    #[error("expected {expected} options, got {got}")]
    WrongOptionCount { expected: usize, got: usize },

    #[error("option {index} is empty")]
    EmptyOption { index: usize },

    #[error("duplicate option '{option}'")]
    DuplicateOption { option: String },

    #[error("correct_answer '{answer}' is not an option letter")]
    AnswerNotALetter { answer: String },

    #[error("correct_answer '{letter}' is outside options A-{last}")]
    AnswerOutOfRange { letter: char, last: char },

    #[error("'{field}' is present but empty")]
    EmptyOptionalField { field: &'static str },

    #[error("expected_answer has {chars} chars, need at least {min}")]
    AnswerTooShort { chars: usize, min: usize },

    #[error("question must contain exactly one blank (_____), found {found}")]
    BlankCount { found: usize },
}

/// Check one candidate against its spec.
pub fn validate(candidate: &CandidateItem, spec: &QuestionSpec) -> Result<QuizItem, ValidationError> {
    if candidate.kind() != spec.kind {
        return Err(ValidationError::KindMismatch {
            expected: spec.kind,
            got: candidate.kind(),
        });
    }
    match candidate {
        CandidateItem::Mcq(c) => validate_mcq(c, spec).map(QuizItem::Mcq),
        CandidateItem::ShortAnswer(c) => validate_short_answer(c, spec).map(QuizItem::ShortAnswer),
        CandidateItem::FillBlank(c) => validate_fill_blank(c).map(QuizItem::FillBlank),
    }
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, ValidationError> {
    match value.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(ValidationError::MissingField { field }),
    }
}

/// Absent is fine; present-but-blank is not.
fn optional(value: &Option<String>, field: &'static str) -> Result<Option<String>, ValidationError> {
    match value.as_deref().map(str::trim) {
        None => Ok(None),
        Some("") => Err(ValidationError::EmptyOptionalField { field }),
        Some(s) => Ok(Some(s.to_string())),
    }
}

fn validate_mcq(c: &CandidateMcq, spec: &QuestionSpec) -> Result<McqItem, ValidationError> {
    let question = required(&c.question, "question")?;

    let expected = spec.constraints.option_count;
    if c.options.len() != expected {
        return Err(ValidationError::WrongOptionCount {
            expected,
            got: c.options.len(),
        });
    }

    let mut options: Vec<&str> = Vec::with_capacity(expected);
    let mut folded: Vec<String> = Vec::with_capacity(expected);
    for (index, option) in c.options.iter().enumerate() {
        let option = option.trim();
        if option.is_empty() {
            return Err(ValidationError::EmptyOption { index });
        }
        let lower = option.to_lowercase();
        if folded.contains(&lower) {
            return Err(ValidationError::DuplicateOption {
                option: option.to_string(),
            });
        }
        folded.push(lower);
        options.push(option);
    }

    let answer = required(&c.correct_answer, "correct_answer")?;
    let mut chars = answer.chars();
    let letter = match (chars.next(), chars.next()) {
        (Some(l), None) if l.is_ascii_alphabetic() => l.to_ascii_uppercase(),
        _ => return Err(ValidationError::AnswerNotALetter { answer }),
    };
    if letter_index(letter).is_none_or(|i| i >= expected) {
        return Err(ValidationError::AnswerOutOfRange {
            letter,
            last: option_letter(expected - 1),
        });
    }

    Ok(McqItem {
        question,
        options: options
            .iter()
            .enumerate()
            .map(|(i, o)| format!("{}) {}", option_letter(i), o))
            .collect(),
        correct_answer: letter.to_string(),
        explanation: optional(&c.explanation, "explanation")?,
    })
}

fn validate_short_answer(
    c: &CandidateShortAnswer,
    spec: &QuestionSpec,
) -> Result<ShortAnswerItem, ValidationError> {
    let question = required(&c.question, "question")?;
    let expected_answer = required(&c.expected_answer, "expected_answer")?;
    let chars = expected_answer.chars().count();
    let min = spec.constraints.min_answer_chars;
    if chars < min {
        return Err(ValidationError::AnswerTooShort { chars, min });
    }
    Ok(ShortAnswerItem {
        question,
        expected_answer,
    })
}

fn validate_fill_blank(c: &CandidateFillBlank) -> Result<FillBlankItem, ValidationError> {
    let question = required(&c.question, "question")?;
    let found = RE_BLANK.find_iter(&question).count();
    if found != 1 {
        return Err(ValidationError::BlankCount { found });
    }
    Ok(FillBlankItem {
        question,
        answer: required(&c.answer, "answer")?,
        hint: optional(&c.hint, "hint")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mcq(options: &[&str], answer: &str) -> CandidateItem {
        CandidateItem::Mcq(CandidateMcq {
            question: Some("  What is the capital of France? ".into()),
            options: options.iter().map(|s| s.to_string()).collect(),
            correct_answer: Some(answer.into()),
            explanation: None,
        })
    }

    #[test]
    fn accepts_well_formed_mcq() {
        let item = validate(&mcq(&["Paris", "Lyon", "Nice", "Lille"], "a"), &QuestionSpec::mcq(1)).unwrap();
        assert_eq!(
            item,
            QuizItem::Mcq(McqItem {
                question: "What is the capital of France?".into(),
                options: vec!["A) Paris".into(), "B) Lyon".into(), "C) Nice".into(), "D) Lille".into()],
                correct_answer: "A".into(),
                explanation: None,
            })
        );
    }

    #[test]
    fn rejects_answer_outside_options() {
        let err = validate(&mcq(&["Paris", "Lyon", "Nice", "Lille"], "E"), &QuestionSpec::mcq(1)).unwrap_err();
        assert_eq!(err, ValidationError::AnswerOutOfRange { letter: 'E', last: 'D' });
    }

    #[test]
    fn rejects_unresolved_answer_text() {
        let err = validate(&mcq(&["Paris", "Lyon", "Nice", "Lille"], "Marseille"), &QuestionSpec::mcq(1)).unwrap_err();
        assert!(matches!(err, ValidationError::AnswerNotALetter { .. }));
    }

    #[test]
    fn rejects_wrong_option_count() {
        let err = validate(&mcq(&["Paris", "Lyon", "Nice"], "A"), &QuestionSpec::mcq(1)).unwrap_err();
        assert_eq!(err, ValidationError::WrongOptionCount { expected: 4, got: 3 });
        // honours a non-default option count
        assert!(validate(&mcq(&["Paris", "Lyon", "Nice"], "C"), &QuestionSpec::mcq(1).with_option_count(3)).is_ok());
    }

    #[test]
    fn rejects_duplicate_and_empty_options() {
        let err = validate(&mcq(&["Paris", "paris", "Nice", "Lille"], "A"), &QuestionSpec::mcq(1)).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateOption { .. }));
        let err = validate(&mcq(&["Paris", " ", "Nice", "Lille"], "A"), &QuestionSpec::mcq(1)).unwrap_err();
        assert_eq!(err, ValidationError::EmptyOption { index: 1 });
    }

    #[test]
    fn duplicate_options_compare_unicode_case() {
        let err = validate(&mcq(&["Ärger", "ärger", "Freude", "Angst"], "A"), &QuestionSpec::mcq(1)).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateOption { option: "ärger".into() });
    }

    #[test]
    fn empty_explanation_is_rejected_absent_is_fine() {
        let mut c = CandidateMcq {
            question: Some("Q?".into()),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer: Some("B".into()),
            explanation: Some("  ".into()),
        };
        let spec = QuestionSpec::mcq(1);
        assert_eq!(
            validate(&CandidateItem::Mcq(c.clone()), &spec).unwrap_err(),
            ValidationError::EmptyOptionalField { field: "explanation" }
        );
        c.explanation = None;
        assert!(validate(&CandidateItem::Mcq(c), &spec).is_ok());
    }

    #[test]
    fn short_answer_minimum_length() {
        let c = CandidateItem::ShortAnswer(CandidateShortAnswer {
            question: Some("Why?".into()),
            expected_answer: Some(" ok ".into()),
        });
        assert!(validate(&c, &QuestionSpec::short_answer(1)).is_ok());
        assert_eq!(
            validate(&c, &QuestionSpec::short_answer(1).with_min_answer_chars(10)).unwrap_err(),
            ValidationError::AnswerTooShort { chars: 2, min: 10 }
        );
    }

    #[test]
    fn missing_question_is_rejected() {
        let c = CandidateItem::ShortAnswer(CandidateShortAnswer::default());
        assert_eq!(
            validate(&c, &QuestionSpec::short_answer(1)).unwrap_err(),
            ValidationError::MissingField { field: "question" }
        );
    }

    #[test]
    fn fill_blank_needs_exactly_one_blank() {
        let make = |q: &str| {
            CandidateItem::FillBlank(CandidateFillBlank {
                question: Some(q.into()),
                answer: Some("Paris".into()),
                hint: None,
            })
        };
        let spec = QuestionSpec::fill_blank(1);
        assert!(validate(&make("The capital of France is _____."), &spec).is_ok());
        assert_eq!(
            validate(&make("The capital of France is Paris."), &spec).unwrap_err(),
            ValidationError::BlankCount { found: 0 }
        );
        assert_eq!(
            validate(&make("___ is the capital of _____."), &spec).unwrap_err(),
            ValidationError::BlankCount { found: 2 }
        );
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let c = CandidateItem::ShortAnswer(CandidateShortAnswer::default());
        assert!(matches!(
            validate(&c, &QuestionSpec::mcq(1)),
            Err(ValidationError::KindMismatch { .. })
        ));
    }
}
