//! Repair: deterministic cleanup of raw backend output before JSON parsing.
//!
//! Models asked for "JSON only" still wrap it in prose, put it inside
//! ` ```json ` fences, leave trailing commas, or sprinkle zero-width
//! characters. Each rule below is a small pure function (`&str → String`),
//! independently testable, and the rules never touch the content of the
//! JSON values themselves.
//!
//! ## Rule Order
//!
//! Line endings and invisible characters are normalised first so the fence
//! regex sees clean input; the bracket-delimited block is extracted last,
//! after fences are gone.

use once_cell::sync::Lazy;
use regex::Regex;

/// Normalise raw output without changing its structure.
///
/// 1. CRLF / CR → LF
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, …)
/// 3. Strip outer markdown fences (```` ```json … ``` ````)
pub fn normalise(raw: &str) -> String {
    let s = normalise_line_endings(raw);
    let s = remove_invisible_chars(&s);
    strip_code_fences(&s)
}

/// Every plausible JSON payload inside `text`, largest first.
///
/// Candidates are the spans from the first `{` to the last `}` and from the
/// first `[` to the last `]`, each with trailing commas removed.
pub fn json_candidates(text: &str) -> Vec<String> {
    let mut spans: Vec<&str> = [('{', '}'), ('[', ']')]
        .into_iter()
        .filter_map(|(open, close)| bracket_span(text, open, close))
        .collect();
    spans.sort_by_key(|s| std::cmp::Reverse(s.len()));
    spans.into_iter().map(remove_trailing_commas).collect()
}

/// Replace the blank placeholders models invent with a canonical `_____`.
pub fn normalise_blank_markers(question: &str) -> String {
    RE_BLANK_PLACEHOLDER.replace_all(question, "_____").into_owned()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Strip markdown fences ───────────────────────────────────────────

static RE_FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\n(.*?)\n?```").unwrap());

/// Keep the body of the first fenced block if there is one; otherwise
/// return the input unchanged.
fn strip_code_fences(input: &str) -> String {
    match RE_FENCED_BLOCK.captures(input) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 4: Largest bracket-delimited block ─────────────────────────────────

fn bracket_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..end + close.len_utf8()])
}

// ── Rule 5: Trailing commas ─────────────────────────────────────────────────

static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());

fn remove_trailing_commas(input: &str) -> String {
    RE_TRAILING_COMMA.replace_all(input, "$1").into_owned()
}

// ── Blank placeholders ──────────────────────────────────────────────────────

static RE_BLANK_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[\s*blank\s*\]|\{\{\s*blank\s*\}\}|<\s*blank\s*/?>|\(\s*blank\s*\)").unwrap()
});
