//! Quiz domain types: what callers ask for and what they get back.
//!
//! The serialised shape of [`QuizDocument`] is the caller-facing contract:
//!
//! ```json
//! {
//!   "mcq": [{ "question": "…", "options": ["A) …", "B) …", "C) …", "D) …"],
//!             "correct_answer": "A", "explanation": "…" }],
//!   "short_answer": [{ "question": "…", "expected_answer": "…" }],
//!   "fill_in_the_blanks": [{ "question": "… _____ …", "answer": "…", "hint": "…" }]
//! }
//! ```

use crate::error::QuizGenError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest and largest option counts an MCQ may be configured with.
pub const MIN_OPTION_COUNT: usize = 2;
pub const MAX_OPTION_COUNT: usize = 26;

/// The three question families a quiz can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Mcq,
    ShortAnswer,
    FillBlank,
}

impl QuestionKind {
    pub const ALL: [QuestionKind; 3] = [
        QuestionKind::Mcq,
        QuestionKind::ShortAnswer,
        QuestionKind::FillBlank,
    ];

    /// Key of this kind's array in the output document.
    pub fn schema_key(self) -> &'static str {
        match self {
            QuestionKind::Mcq => "mcq",
            QuestionKind::ShortAnswer => "short_answer",
            QuestionKind::FillBlank => "fill_in_the_blanks",
        }
    }

    /// Alternative keys models tend to use for the same array.
    pub(crate) fn schema_aliases(self) -> &'static [&'static str] {
        match self {
            QuestionKind::Mcq => &["mcq_questions", "multiple_choice", "questions"],
            QuestionKind::ShortAnswer => &["short_answer_questions", "short_answers", "questions"],
            QuestionKind::FillBlank => &["fill_in_the_blank", "fill_blanks", "questions"],
        }
    }

    /// Human-readable plural label used in prompts and logs.
    pub fn label(self) -> &'static str {
        match self {
            QuestionKind::Mcq => "multiple choice questions",
            QuestionKind::ShortAnswer => "short answer questions",
            QuestionKind::FillBlank => "fill in the blank questions",
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.schema_key())
    }
}

/// Per-kind knobs consumed by the prompt builder and the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecConstraints {
    /// Number of options every MCQ must carry. Default: 4.
    pub option_count: usize,
    /// Minimum trimmed length of a short-answer `expected_answer`. Default: 1.
    pub min_answer_chars: usize,
}

impl Default for SpecConstraints {
    fn default() -> Self {
        Self {
            option_count: 4,
            min_answer_chars: 1,
        }
    }
}

/// One line of a quiz request: "give me `count` questions of `kind`".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub kind: QuestionKind,
    pub count: usize,
    #[serde(default)]
    pub constraints: SpecConstraints,
}

impl QuestionSpec {
    pub fn new(kind: QuestionKind, count: usize) -> Self {
        Self {
            kind,
            count,
            constraints: SpecConstraints::default(),
        }
    }

    pub fn mcq(count: usize) -> Self {
        Self::new(QuestionKind::Mcq, count)
    }

    pub fn short_answer(count: usize) -> Self {
        Self::new(QuestionKind::ShortAnswer, count)
    }

    pub fn fill_blank(count: usize) -> Self {
        Self::new(QuestionKind::FillBlank, count)
    }

    pub fn with_option_count(mut self, n: usize) -> Self {
        self.constraints.option_count = n;
        self
    }

    pub fn with_min_answer_chars(mut self, n: usize) -> Self {
        self.constraints.min_answer_chars = n;
        self
    }

    fn check(&self) -> Result<(), QuizGenError> {
        if self.count == 0 {
            return Err(QuizGenError::InvalidQuestionSpec(format!(
                "{} count must be ≥ 1",
                self.kind
            )));
        }
        let n = self.constraints.option_count;
        if self.kind == QuestionKind::Mcq && !(MIN_OPTION_COUNT..=MAX_OPTION_COUNT).contains(&n) {
            return Err(QuizGenError::InvalidQuestionSpec(format!(
                "option_count must be {MIN_OPTION_COUNT}–{MAX_OPTION_COUNT}, got {n}"
            )));
        }
        Ok(())
    }
}

/// Check a request's specs: every count ≥ 1, option counts in range, and
/// at most one spec per kind.
pub fn validate_specs(specs: &[QuestionSpec]) -> Result<(), QuizGenError> {
    if specs.is_empty() {
        return Err(QuizGenError::InvalidQuestionSpec(
            "at least one question kind must be requested".into(),
        ));
    }
    for (i, spec) in specs.iter().enumerate() {
        spec.check()?;
        if specs[..i].iter().any(|s| s.kind == spec.kind) {
            return Err(QuizGenError::InvalidQuestionSpec(format!(
                "{} requested more than once",
                spec.kind
            )));
        }
    }
    Ok(())
}

/// Letter label for the option at `index` (0 → 'A').
pub fn option_letter(index: usize) -> char {
    (b'A' + (index % MAX_OPTION_COUNT) as u8) as char
}

/// Index of an option letter (case-insensitive), if it is a letter at all.
pub fn letter_index(letter: char) -> Option<usize> {
    let upper = letter.to_ascii_uppercase();
    upper
        .is_ascii_uppercase()
        .then(|| (upper as u8 - b'A') as usize)
}

// ── Candidates (unvalidated) ─────────────────────────────────────────────

/// A multiple-choice question as parsed, before validation.
///
/// `options` hold the bare option text (labels stripped); `correct_answer`
/// is a letter when the parser could resolve one, otherwise whatever the
/// backend emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateMcq {
    pub question: Option<String>,
    pub options: Vec<String>,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateShortAnswer {
    pub question: Option<String>,
    pub expected_answer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFillBlank {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub hint: Option<String>,
}

/// Backend output after parsing, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateItem {
    Mcq(CandidateMcq),
    ShortAnswer(CandidateShortAnswer),
    FillBlank(CandidateFillBlank),
}

impl CandidateItem {
    pub fn kind(&self) -> QuestionKind {
        match self {
            CandidateItem::Mcq(_) => QuestionKind::Mcq,
            CandidateItem::ShortAnswer(_) => QuestionKind::ShortAnswer,
            CandidateItem::FillBlank(_) => QuestionKind::FillBlank,
        }
    }
}

// ── Validated items ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqItem {
    pub question: String,
    /// Labelled options: `"A) …"`, `"B) …"`, …
    pub options: Vec<String>,
    /// Bare letter of the correct option.
    pub correct_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortAnswerItem {
    pub question: String,
    pub expected_answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillBlankItem {
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// A schema-conformant question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuizItem {
    Mcq(McqItem),
    ShortAnswer(ShortAnswerItem),
    FillBlank(FillBlankItem),
}

impl QuizItem {
    pub fn kind(&self) -> QuestionKind {
        match self {
            QuizItem::Mcq(_) => QuestionKind::Mcq,
            QuizItem::ShortAnswer(_) => QuestionKind::ShortAnswer,
            QuizItem::FillBlank(_) => QuestionKind::FillBlank,
        }
    }

    /// The question text, used for deduplication.
    pub fn question(&self) -> &str {
        match self {
            QuizItem::Mcq(q) => &q.question,
            QuizItem::ShortAnswer(q) => &q.question,
            QuizItem::FillBlank(q) => &q.question,
        }
    }
}

/// The terminal artifact of a generation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizDocument {
    #[serde(default)]
    pub mcq: Vec<McqItem>,
    #[serde(default)]
    pub short_answer: Vec<ShortAnswerItem>,
    #[serde(default)]
    pub fill_in_the_blanks: Vec<FillBlankItem>,
}

impl QuizDocument {
    /// Append a validated item to the list for its kind.
    pub fn push(&mut self, item: QuizItem) {
        match item {
            QuizItem::Mcq(q) => self.mcq.push(q),
            QuizItem::ShortAnswer(q) => self.short_answer.push(q),
            QuizItem::FillBlank(q) => self.fill_in_the_blanks.push(q),
        }
    }

    pub fn count(&self, kind: QuestionKind) -> usize {
        match kind {
            QuestionKind::Mcq => self.mcq.len(),
            QuestionKind::ShortAnswer => self.short_answer.len(),
            QuestionKind::FillBlank => self.fill_in_the_blanks.len(),
        }
    }

    pub fn total_questions(&self) -> usize {
        self.mcq.len() + self.short_answer.len() + self.fill_in_the_blanks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_questions() == 0
    }
}
