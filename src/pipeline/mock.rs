//! Deterministic, offline question generator.
//!
//! The mock derives questions from the chunk's own sentences: each sentence
//! yields one key term (a capitalised name, else a number, else its longest
//! word) which becomes the blank, the MCQ answer, or the short-answer topic.
//!
//! Output deliberately looks like a chatty LLM reply: a prose preamble, a
//! fenced JSON block, some options without letter labels, and some answers
//! given as option text instead of a letter. The parser therefore runs its
//! full repair and coercion path even in offline tests.

use crate::error::BackendError;
use crate::pipeline::backend::{QuestionBackend, RawOutput};
use crate::pipeline::chunk::Chunk;
use crate::quiz::{option_letter, QuestionKind, QuestionSpec};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::time::Duration;

const STOPWORDS: &[&str] = &[
    "A", "An", "And", "As", "At", "But", "By", "For", "From", "He", "Her", "His", "I", "If", "In",
    "It", "Its", "Many", "Most", "Of", "On", "Or", "She", "So", "Some", "That", "The", "Their",
    "There", "These", "They", "This", "Those", "To", "We", "When", "Which", "While", "With", "You",
];

const FALLBACK_OPTIONS: &[&str] = &[
    "None of the above",
    "Not stated in the passage",
    "All of the above",
    "Cannot be determined",
];

/// Offline backend used for tests and `--backend mock`.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    malformed_chunks: BTreeSet<usize>,
    latency: Option<Duration>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit unparseable output for these chunk ids.
    pub fn with_malformed_chunks(mut self, ids: impl IntoIterator<Item = usize>) -> Self {
        self.malformed_chunks.extend(ids);
        self
    }

    /// Sleep this long before answering, to simulate model latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

#[async_trait]
impl QuestionBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, chunk: &Chunk, spec: &QuestionSpec) -> Result<RawOutput, BackendError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.malformed_chunks.contains(&chunk.id) {
            return Ok(RawOutput::text(format!(
                "I'm sorry, I could not write {} for this passage. {{\"{}\": [",
                spec.kind.label(),
                spec.kind.schema_key()
            )));
        }
        Ok(RawOutput::text(render(chunk, spec)))
    }
}

/// Render the mock reply for one chunk. Pure.
pub fn render(chunk: &Chunk, spec: &QuestionSpec) -> String {
    let facts = facts(&chunk.text);
    let pool = term_pool(&facts);

    let items: Vec<Value> = facts
        .iter()
        .take(spec.count)
        .enumerate()
        .map(|(i, fact)| match spec.kind {
            QuestionKind::Mcq => mcq_item(fact, i, chunk.ordinal, &pool, spec.constraints.option_count),
            QuestionKind::ShortAnswer => json!({
                "question": format!("What does the passage say about {}?", fact.term),
                "expected_answer": fact.sentence,
            }),
            QuestionKind::FillBlank => json!({
                "question": blank_out(&fact.sentence, &fact.term),
                "answer": fact.term,
                "hint": hint(&fact.term),
            }),
        })
        .collect();

    let count = items.len();
    let mut body = Map::new();
    body.insert(spec.kind.schema_key().to_string(), Value::Array(items));
    let body = serde_json::to_string_pretty(&body).unwrap_or_default();

    format!(
        "Sure! Here are {} {} based on passage {}.\n\n```json\n{}\n```\n\nLet me know if you need more.",
        count,
        spec.kind.label(),
        chunk.ordinal + 1,
        body
    )
}

struct Fact {
    sentence: String,
    term: String,
}

fn facts(text: &str) -> Vec<Fact> {
    split_sentences(text)
        .into_iter()
        .filter(|s| s.split_whitespace().count() >= 3 && !s.contains("___"))
        .filter_map(|sentence| key_term(&sentence).map(|term| Fact { sentence, term }))
        .collect()
}

/// Sentences with internal whitespace collapsed.
fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        let at_end = matches!(c, '.' | '!' | '?')
            && chars.peek().is_none_or(|n| n.is_whitespace());
        if at_end || (c == '\n' && chars.peek() == Some(&'\n')) {
            push_sentence(&mut out, &current);
            current.clear();
        }
    }
    push_sentence(&mut out, &current);
    out
}

fn push_sentence(out: &mut Vec<String>, raw: &str) {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if !collapsed.is_empty() {
        out.push(collapsed);
    }
}

fn clean_word(w: &str) -> &str {
    w.trim_matches(|c: char| !c.is_alphanumeric())
}

fn is_name(word: &str) -> bool {
    word.chars().count() >= 2
        && word.chars().next().is_some_and(char::is_uppercase)
        && !STOPWORDS.contains(&word)
}

fn is_number(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| c.is_ascii_digit())
}

fn key_term(sentence: &str) -> Option<String> {
    let words: Vec<&str> = sentence.split_whitespace().map(clean_word).collect();
    words
        .iter()
        .find(|w| is_name(w))
        .or_else(|| words.iter().find(|w| is_number(w)))
        .or_else(|| {
            words
                .iter()
                .filter(|w| w.chars().count() >= 5 && w.chars().all(char::is_alphabetic))
                .max_by_key(|w| w.chars().count())
        })
        .map(|w| w.to_string())
}

/// Every name or number in the chunk, first occurrence order, case-insensitively unique.
fn term_pool(facts: &[Fact]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut pool = Vec::new();
    for fact in facts {
        for word in fact.sentence.split_whitespace().map(clean_word) {
            if (is_name(word) || is_number(word)) && seen.insert(word.to_lowercase()) {
                pool.push(word.to_string());
            }
        }
    }
    pool
}

fn distractors(answer: &str, pool: &[String], offset: usize, n: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(n);
    let take = |candidate: &str, out: &mut Vec<String>| {
        let dup = candidate.eq_ignore_ascii_case(answer)
            || out.iter().any(|o| o.eq_ignore_ascii_case(candidate));
        if !dup && out.len() < n {
            out.push(candidate.to_string());
        }
    };
    for i in 0..pool.len() {
        take(&pool[(offset + i) % pool.len()], &mut out);
    }
    for fallback in FALLBACK_OPTIONS {
        take(fallback, &mut out);
    }
    let mut extra = 1;
    while out.len() < n {
        take(&format!("Option {extra}"), &mut out);
        extra += 1;
    }
    out
}

fn mcq_item(fact: &Fact, index: usize, ordinal: usize, pool: &[String], option_count: usize) -> Value {
    let option_count = option_count.max(2);
    let correct = (index + ordinal) % option_count;
    let mut options = distractors(&fact.term, pool, index + 1, option_count - 1);
    options.insert(correct, fact.term.clone());

    // Alternate between the canonical shape and the sloppy one.
    let canonical = index % 2 == 0;
    let (options, answer): (Vec<String>, String) = if canonical {
        (
            options
                .iter()
                .enumerate()
                .map(|(i, o)| format!("{}) {}", option_letter(i), o))
                .collect(),
            option_letter(correct).to_string(),
        )
    } else {
        (options, fact.term.clone())
    };

    json!({
        "question": format!(
            "Which of the following best completes the statement: \"{}\"",
            blank_out(&fact.sentence, &fact.term)
        ),
        "options": options,
        "correct_answer": answer,
        "explanation": format!("The passage states: \"{}\"", fact.sentence),
    })
}

/// Replace the first whole-word occurrence of `term` with a blank marker.
fn blank_out(sentence: &str, term: &str) -> String {
    let is_boundary = |c: Option<char>| c.is_none_or(|c| !c.is_alphanumeric());
    for (i, _) in sentence.match_indices(term) {
        let before = sentence[..i].chars().next_back();
        let after = sentence[i + term.len()..].chars().next();
        if is_boundary(before) && is_boundary(after) {
            return format!("{}_____{}", &sentence[..i], &sentence[i + term.len()..]);
        }
    }
    format!("{sentence} _____")
}

fn hint(term: &str) -> String {
    if is_number(term) {
        "A number mentioned in the passage".to_string()
    } else {
        let first = term.chars().next().unwrap_or('?');
        format!("Starts with \"{}\" ({} letters)", first, term.chars().count())
    }
}
