//! Aggregation: validated items from every chunk → one [`QuizDocument`].
//!
//! Per kind, items are walked in chunk order (ties keep their generation
//! order), duplicates are dropped keeping the first occurrence, and the
//! survivors are cut down to the requested count. The result never holds
//! more than `count` items of a kind; fewer is reported as a [`Shortfall`].
//!
//! Two items are duplicates when their normalised question text is equal,
//! or, with a `dedup_threshold` below 1.0, when the Jaccard similarity of
//! their word sets reaches the threshold. Overlapping chunks routinely
//! produce the same question twice, so this matters even with one backend.

use crate::config::SelectionPolicy;
use crate::diagnostics::Shortfall;
use crate::quiz::{QuestionKind, QuestionSpec, QuizDocument, QuizItem};
use std::collections::{BTreeMap, BTreeSet};

/// One accepted item and the chunk it came from.
#[derive(Debug, Clone)]
pub struct SourcedItem {
    pub ordinal: usize,
    pub item: QuizItem,
}

/// Document plus the bookkeeping the aggregator produced along the way.
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub document: QuizDocument,
    pub shortfalls: Vec<Shortfall>,
    pub duplicates_removed: BTreeMap<QuestionKind, usize>,
}

/// Build the final document. `items` may arrive in any order.
pub fn assemble(
    specs: &[QuestionSpec],
    items: Vec<SourcedItem>,
    dedup_threshold: f64,
    policy: SelectionPolicy,
) -> Assembly {
    let mut by_kind: BTreeMap<QuestionKind, Vec<SourcedItem>> = BTreeMap::new();
    for item in items {
        by_kind.entry(item.item.kind()).or_default().push(item);
    }

    let mut assembly = Assembly::default();
    for spec in specs {
        let mut pool = by_kind.remove(&spec.kind).unwrap_or_default();
        // stable: equal ordinals keep generation order
        pool.sort_by_key(|s| s.ordinal);

        let before = pool.len();
        let unique = dedup(pool, dedup_threshold);
        let removed = before - unique.len();
        if removed > 0 {
            assembly.duplicates_removed.insert(spec.kind, removed);
        }

        let selected = select(unique, spec.count, policy);
        if selected.len() < spec.count {
            assembly.shortfalls.push(Shortfall {
                kind: spec.kind,
                requested: spec.count,
                delivered: selected.len(),
            });
        }
        for s in selected {
            assembly.document.push(s.item);
        }
    }
    assembly
}

/// Lowercase, punctuation → space, whitespace collapsed.
pub fn normalize_question(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Word-set Jaccard similarity of two normalised questions.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let a: BTreeSet<&str> = a.split_whitespace().collect();
    let b: BTreeSet<&str> = b.split_whitespace().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

fn dedup(pool: Vec<SourcedItem>, threshold: f64) -> Vec<SourcedItem> {
    let mut seen: Vec<String> = Vec::new();
    let mut kept = Vec::with_capacity(pool.len());
    for item in pool {
        let key = normalize_question(item.item.question());
        let duplicate = seen
            .iter()
            .any(|s| *s == key || (threshold < 1.0 && jaccard(s, &key) >= threshold));
        if !duplicate {
            seen.push(key);
            kept.push(item);
        }
    }
    kept
}

fn select(unique: Vec<SourcedItem>, count: usize, policy: SelectionPolicy) -> Vec<SourcedItem> {
    match policy {
        SelectionPolicy::EarliestChunk => unique.into_iter().take(count).collect(),
        SelectionPolicy::RoundRobin => {
            let mut per_chunk: BTreeMap<usize, Vec<SourcedItem>> = BTreeMap::new();
            for item in unique {
                per_chunk.entry(item.ordinal).or_default().push(item);
            }
            let mut queues: Vec<std::vec::IntoIter<SourcedItem>> =
                per_chunk.into_values().map(Vec::into_iter).collect();

            let mut picked = Vec::with_capacity(count);
            'rounds: loop {
                let mut progressed = false;
                for queue in queues.iter_mut() {
                    if picked.len() == count {
                        break 'rounds;
                    }
                    if let Some(item) = queue.next() {
                        picked.push(item);
                        progressed = true;
                    }
                }
                if !progressed {
                    break;
                }
            }
            // output stays in document order
            picked.sort_by_key(|s| s.ordinal);
            picked
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::{FillBlankItem, ShortAnswerItem};

    fn short(ordinal: usize, q: &str) -> SourcedItem {
        SourcedItem {
            ordinal,
            item: QuizItem::ShortAnswer(ShortAnswerItem {
                question: q.into(),
                expected_answer: "x".into(),
            }),
        }
    }

    fn questions(doc: &QuizDocument) -> Vec<&str> {
        doc.short_answer.iter().map(|q| q.question.as_str()).collect()
    }

    #[test]
    fn normalisation_ignores_case_and_punctuation() {
        assert_eq!(
            normalize_question("  What is   the Capital of France?"),
            normalize_question("what is the capital of france")
        );
    }

    #[test]
    fn jaccard_of_word_sets() {
        assert_eq!(jaccard("a b c", "a b c"), 1.0);
        assert_eq!(jaccard("a b", "c d"), 0.0);
        assert!((jaccard("a b c d", "a b c e") - 0.6).abs() < 1e-9);
    }

    #[test]
    fn duplicates_across_chunks_keep_first() {
        let items = vec![
            short(1, "What is the capital of France?"),
            short(0, "what is the capital of france"),
            short(1, "Who wrote Hamlet?"),
        ];
        let a = assemble(&[QuestionSpec::short_answer(5)], items, 1.0, SelectionPolicy::EarliestChunk);
        assert_eq!(questions(&a.document), vec!["what is the capital of france", "Who wrote Hamlet?"]);
        assert_eq!(a.duplicates_removed[&QuestionKind::ShortAnswer], 1);
        assert_eq!(
            a.shortfalls,
            vec![Shortfall {
                kind: QuestionKind::ShortAnswer,
                requested: 5,
                delivered: 2
            }]
        );
    }

    #[test]
    fn fuzzy_threshold_catches_near_duplicates() {
        let items = vec![
            short(0, "What is the capital city of France?"),
            short(1, "What is the capital of France?"),
        ];
        let exact = assemble(&[QuestionSpec::short_answer(2)], items.clone(), 1.0, SelectionPolicy::EarliestChunk);
        assert_eq!(exact.document.short_answer.len(), 2);
        let fuzzy = assemble(&[QuestionSpec::short_answer(2)], items, 0.8, SelectionPolicy::EarliestChunk);
        assert_eq!(fuzzy.document.short_answer.len(), 1);
    }

    #[test]
    fn never_exceeds_requested_count() {
        let items = (0..10).map(|i| short(i, &format!("Question {i}?"))).collect();
        let a = assemble(&[QuestionSpec::short_answer(3)], items, 1.0, SelectionPolicy::EarliestChunk);
        assert_eq!(questions(&a.document), vec!["Question 0?", "Question 1?", "Question 2?"]);
        assert!(a.shortfalls.is_empty());
    }

    #[test]
    fn round_robin_spreads_across_chunks() {
        let items = vec![
            short(0, "a1"),
            short(0, "a2"),
            short(0, "a3"),
            short(1, "b1"),
            short(2, "c1"),
        ];
        let a = assemble(&[QuestionSpec::short_answer(3)], items, 1.0, SelectionPolicy::RoundRobin);
        assert_eq!(questions(&a.document), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn kinds_are_kept_apart() {
        let mut items = vec![short(0, "Same text _____")];
        items.push(SourcedItem {
            ordinal: 0,
            item: QuizItem::FillBlank(FillBlankItem {
                question: "Same text _____".into(),
                answer: "x".into(),
                hint: None,
            }),
        });
        let specs = [QuestionSpec::short_answer(1), QuestionSpec::fill_blank(1)];
        let a = assemble(&specs, items, 1.0, SelectionPolicy::EarliestChunk);
        assert_eq!(a.document.total_questions(), 2);
        assert!(a.duplicates_removed.is_empty());
    }

    #[test]
    fn unrequested_kinds_are_ignored() {
        let a = assemble(&[QuestionSpec::mcq(1)], vec![short(0, "q")], 1.0, SelectionPolicy::EarliestChunk);
        assert!(a.document.is_empty());
        assert_eq!(a.shortfalls[0].delivered, 0);
    }
}
