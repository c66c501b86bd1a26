//! Prompts for LLM-backed question generation.
//!
//! Every prompt lives here so that wording changes touch exactly one file
//! and unit tests can inspect prompts without a live model.
//!
//! Callers can override the system prompt via
//! [`crate::config::GenerationConfig::system_prompt`]; the per-kind user
//! prompt is always built by [`question_prompt`] because the parser relies
//! on its JSON shape.

use crate::quiz::{option_letter, QuestionKind, QuestionSpec};

/// Default system prompt used when `GenerationConfig::system_prompt` is `None`.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert educator who creates high-quality \
assessment questions. Base every question strictly on the text you are given. \
Always respond with valid JSON only.";

/// Build the user prompt asking for `spec.count` questions of `spec.kind`
/// about `passage`.
pub fn question_prompt(spec: &QuestionSpec, passage: &str) -> String {
    format!(
        "Based on the following text, generate exactly {count} {label}.\n\n\
TEXT:\n\"\"\"\n{passage}\n\"\"\"\n\n\
{rules}\n\n\
Return your response as a VALID JSON object with this EXACT structure:\n{shape}\n\n\
IMPORTANT: Return ONLY valid JSON, no extra text or markdown.",
        count = spec.count,
        label = spec.kind.label(),
        passage = passage.trim(),
        rules = kind_rules(spec),
        shape = json_shape(spec),
    )
}

fn kind_rules(spec: &QuestionSpec) -> String {
    match spec.kind {
        QuestionKind::Mcq => {
            let n = spec.constraints.option_count;
            format!(
                "Rules:\n\
- Each question has exactly {n} distinct options labelled {first}) to {last}).\n\
- \"correct_answer\" is the bare letter of the single correct option.\n\
- Vary the position of the correct option across questions.\n\
- \"explanation\" briefly justifies the answer from the text.",
                first = option_letter(0),
                last = option_letter(n.saturating_sub(1)),
            )
        }
        QuestionKind::ShortAnswer => "Rules:\n\
- Each question can be answered in 2-3 sentences from the text.\n\
- \"expected_answer\" is a model answer, not a single word."
            .to_string(),
        QuestionKind::FillBlank => "Rules:\n\
- Each question is a sentence from the text with exactly ONE key term replaced by _____ (five underscores).\n\
- \"answer\" is the removed term.\n\
- \"hint\" is optional and must not reveal the answer."
            .to_string(),
    }
}

fn json_shape(spec: &QuestionSpec) -> String {
    match spec.kind {
        QuestionKind::Mcq => {
            let options = (0..spec.constraints.option_count)
                .map(|i| format!("\"{}) Option {}\"", option_letter(i), i + 1))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "{{\n  \"mcq\": [\n    {{\n      \"question\": \"Question text?\",\n      \
\"options\": [{options}],\n      \"correct_answer\": \"A\",\n      \
\"explanation\": \"Brief explanation\"\n    }}\n  ]\n}}"
            )
        }
        QuestionKind::ShortAnswer => "{\n  \"short_answer\": [\n    {\n      \
\"question\": \"Question text?\",\n      \
\"expected_answer\": \"Expected answer in 2-3 sentences\"\n    }\n  ]\n}"
            .to_string(),
        QuestionKind::FillBlank => "{\n  \"fill_in_the_blanks\": [\n    {\n      \
\"question\": \"The capital of France is _____.\",\n      \
\"answer\": \"Paris\",\n      \"hint\": \"A European city\"\n    }\n  ]\n}"
            .to_string(),
    }
}
