//! Parsing: raw backend text → candidate items.
//!
//! Three attempts, cheapest first:
//!
//! 1. strict — the trimmed output is already JSON of the expected shape
//! 2. normalised — the same after [`repair::normalise`] (fences, CRLF,
//!    invisible characters)
//! 3. extracted — the largest bracket-delimited block, trailing commas removed
//!
//! The first payload that parses as JSON decides: either it contains the
//! kind's list (or is a bare list / a single item) or the output is a
//! [`ParseError`]. Individual items are never rejected here; field coercion
//! does what it can and leaves the rest for the validator.

use crate::pipeline::repair;
use crate::quiz::{
    letter_index, option_letter, CandidateFillBlank, CandidateItem, CandidateMcq,
    CandidateShortAnswer, QuestionKind,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a raw output produced no candidates at all.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParseError {
    #[error("no JSON payload found in backend output")]
    NoJson,

    #[error("invalid JSON: {detail}")]
    InvalidJson { detail: String },

    #[error("JSON payload has no \"{key}\" list")]
    MissingSection { key: &'static str },
}

/// Parse a backend reply into candidate items of `kind`.
pub fn parse(raw: &str, kind: QuestionKind) -> Result<Vec<CandidateItem>, ParseError> {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return extract(&value, kind);
    }

    let cleaned = repair::normalise(raw);
    if let Ok(value) = serde_json::from_str::<Value>(cleaned.trim()) {
        return extract(&value, kind);
    }

    let mut first_err = None;
    for candidate in repair::json_candidates(&cleaned) {
        match serde_json::from_str::<Value>(&candidate) {
            Ok(value) => return extract(&value, kind),
            Err(e) => {
                first_err.get_or_insert(ParseError::InvalidJson {
                    detail: e.to_string(),
                });
            }
        }
    }
    Err(first_err.unwrap_or(ParseError::NoJson))
}

fn extract(value: &Value, kind: QuestionKind) -> Result<Vec<CandidateItem>, ParseError> {
    items_for_kind(value, kind)
        .map(|items| items.into_iter().map(|v| coerce(v, kind)).collect())
        .ok_or(ParseError::MissingSection {
            key: kind.schema_key(),
        })
}

fn items_for_kind(value: &Value, kind: QuestionKind) -> Option<Vec<&Value>> {
    match value {
        Value::Array(items) => Some(items.iter().collect()),
        Value::Object(obj) => {
            let keyed = std::iter::once(kind.schema_key())
                .chain(kind.schema_aliases().iter().copied())
                .find_map(|key| obj.get(key));
            match keyed {
                Some(Value::Array(items)) => Some(items.iter().collect()),
                Some(item @ Value::Object(_)) => Some(vec![item]),
                Some(_) => None,
                None if obj.contains_key("question") => Some(vec![value]),
                None if obj.len() == 1 => obj
                    .iter()
                    .next()
                    .filter(|(key, _)| !is_known_section(key))
                    .and_then(|(_, v)| v.as_array())
                    .map(|items| items.iter().collect()),
                None => None,
            }
        }
        _ => None,
    }
}

/// A section key (or alias) of any question kind.
fn is_known_section(key: &str) -> bool {
    QuestionKind::ALL.iter().any(|k| {
        k.schema_key() == key || k.schema_aliases().contains(&key)
    })
}

fn coerce(value: &Value, kind: QuestionKind) -> CandidateItem {
    let obj = value.as_object();
    match kind {
        QuestionKind::Mcq => CandidateItem::Mcq(coerce_mcq(obj)),
        QuestionKind::ShortAnswer => CandidateItem::ShortAnswer(CandidateShortAnswer {
            question: text_field(obj, &["question", "prompt"]),
            expected_answer: text_field(obj, &["expected_answer", "answer", "model_answer"]),
        }),
        QuestionKind::FillBlank => CandidateItem::FillBlank(CandidateFillBlank {
            question: text_field(obj, &["question", "sentence", "prompt"])
                .map(|q| repair::normalise_blank_markers(&q)),
            answer: text_field(obj, &["answer", "expected_answer", "blank"]),
            hint: text_field(obj, &["hint"]),
        }),
    }
}

/// First present, non-null field among `keys`, as trimmed text.
fn text_field(obj: Option<&Map<String, Value>>, keys: &[&str]) -> Option<String> {
    let obj = obj?;
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::Null => None,
        v => Some(value_text(v)),
    })
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Object(o) => o
            .get("text")
            .map(value_text)
            .unwrap_or_else(|| v.to_string()),
        other => other.to_string(),
    }
}

// ── MCQ coercion ─────────────────────────────────────────────────────────────

static RE_OPTION_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\(([A-Za-z])\)|([A-Za-z])[).:])\s+").unwrap());

static RE_ANSWER_LETTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:correct\s+)?(?:option|answer|choice)\s*[:\-]?\s*)?\(?([A-Z])\)?[.):]?$").unwrap()
});

fn coerce_mcq(obj: Option<&Map<String, Value>>) -> CandidateMcq {
    let options: Vec<String> = raw_options(obj)
        .into_iter()
        .enumerate()
        .map(|(i, o)| strip_label(&o, i))
        .collect();

    let correct_answer = text_field(obj, &["correct_answer", "answer", "correct", "correct_option"])
        .map(|raw| resolve_answer(&raw, &options));

    CandidateMcq {
        question: text_field(obj, &["question", "prompt", "stem"]),
        options,
        correct_answer,
        explanation: text_field(obj, &["explanation", "rationale", "reason"]),
    }
}

fn raw_options(obj: Option<&Map<String, Value>>) -> Vec<String> {
    let Some(obj) = obj else {
        return Vec::new();
    };
    let value = ["options", "choices", "answers"]
        .iter()
        .find_map(|k| obj.get(*k));
    match value {
        Some(Value::Array(items)) => items.iter().map(value_text).collect(),
        Some(Value::Object(by_letter)) => {
            let mut entries: Vec<(&String, &Value)> = by_letter.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            entries.into_iter().map(|(_, v)| value_text(v)).collect()
        }
        _ => Vec::new(),
    }
}

/// Strip a leading `A)` / `(A)` / `A.` / `A:` label, but only when the
/// letter matches the option's position.
fn strip_label(option: &str, index: usize) -> String {
    if let Some(caps) = RE_OPTION_LABEL.captures(option) {
        let letter = caps
            .get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().chars().next());
        if letter.map(|c| c.to_ascii_uppercase()) == Some(option_letter(index)) {
            return option[caps[0].len()..].trim().to_string();
        }
    }
    option.trim().to_string()
}

/// Map a correct-answer field onto an option letter.
///
/// Tried in order: a bare or decorated letter in range (`"b"`, `"(B)"`,
/// `"Option B"`), a unique option-text match, a labelled option
/// (`"B) Paris"`). When nothing matches, the raw text is kept so validation
/// rejects the item.
fn resolve_answer(raw: &str, options: &[String]) -> String {
    if let Some(caps) = RE_ANSWER_LETTER.captures(raw.trim()) {
        let letter = caps[1].to_ascii_uppercase();
        if letter
            .chars()
            .next()
            .and_then(letter_index)
            .is_some_and(|idx| idx < options.len())
        {
            return letter;
        }
    }

    let wanted = fold(raw);
    let matches: Vec<usize> = options
        .iter()
        .enumerate()
        .filter(|(_, o)| fold(o) == wanted)
        .map(|(i, _)| i)
        .collect();
    if let [only] = matches.as_slice() {
        return option_letter(*only).to_string();
    }

    if let Some(caps) = RE_ANSWER_LETTER.captures(raw.trim()) {
        return caps[1].to_ascii_uppercase();
    }

    if let Some(caps) = RE_OPTION_LABEL.captures(raw) {
        let letter = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
        if let Some(idx) = letter.and_then(|l| l.chars().next()).and_then(letter_index) {
            return option_letter(idx).to_string();
        }
    }

    raw.trim().to_string()
}

/// Case- and whitespace-insensitive form used for answer matching.
fn fold(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['.', '!', '?'])
        .to_lowercase()
}
