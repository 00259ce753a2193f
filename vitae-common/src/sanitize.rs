//! User input sanitization and prompt-injection screening.
//!
//! Raw question text passes through two gates before it can reach a prompt:
//! `sanitize_input` strips control characters and normalizes whitespace, and
//! `check_suspicious_content` matches the result against an ordered catalogue
//! of known injection patterns. A suspicious question is rejected outright at
//! the validation boundary; its category is logged for audit, but the matched
//! pattern is never echoed back to the client.

use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum allowed length for user questions, in characters.
pub const MAX_QUESTION_LENGTH: usize = 2000;

/// Category label for a detected injection pattern.
pub type PatternCategory = &'static str;

/// Patterns that may indicate prompt injection attempts, grouped by category.
///
/// Order matters: more specific patterns come before general ones, and only
/// the first matching category is reported.
static SUSPICIOUS_PATTERNS: Lazy<Vec<(Regex, PatternCategory)>> = Lazy::new(|| {
    [
        // Direct prompt manipulation (check first - most specific)
        (r"(?i)\[\s*INST\s*\]", "prompt_format_injection"),
        (r"(?i)<\|im_start\|>", "prompt_format_injection"),
        (r"(?i)<\|system\|>", "prompt_format_injection"),
        // Markdown/formatting injection (check before role play)
        (r"```\s*(system|assistant)", "role_override_attempt"),
        // System/role override attempts
        (r"(?i)\bsystem\s*:\s*", "role_override_attempt"),
        (r"(?i)\bassistant\s*:\s*", "role_override_attempt"),
        (r"(?i)\buser\s*:\s*", "role_override_attempt"),
        // Instruction override attempts
        (
            r"(?i)\bignore\s+(all\s+)?(previous|above|prior)\s+(instructions?|prompts?)",
            "instruction_override_attempt",
        ),
        (
            r"(?i)\bdisregard\s+(all\s+)?(previous|above|prior)\s+(instructions?|prompts?)",
            "instruction_override_attempt",
        ),
        (
            r"(?i)\bforget\s+(all\s+)?(previous|above|prior)\s+(instructions?|prompts?)",
            "instruction_override_attempt",
        ),
        // New instruction injection
        (r"(?i)\bnew\s+instructions?\s*:", "instruction_override_attempt"),
        (r"(?i)\bupdated\s+instructions?\s*:", "instruction_override_attempt"),
        (r"(?i)\boverride\s+instructions?\s*:", "instruction_override_attempt"),
        // Role play attempts (check last - most general)
        (r"(?i)\byou\s+are\s+now\s+", "role_play_attempt"),
        (r"(?i)\bpretend\s+(to\s+be|you\s+are)\s+", "role_play_attempt"),
    ]
    .into_iter()
    .map(|(pattern, category)| {
        (
            Regex::new(pattern).expect("suspicious pattern must compile"),
            category,
        )
    })
    .collect()
});

/// ASCII control characters stripped by sanitization.
///
/// Tab, newline and carriage return survive; runs of horizontal whitespace
/// are collapsed afterwards.
fn is_stripped_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0b}' | '\u{0c}' | '\u{0e}'..='\u{1f}' | '\u{7f}')
}

/// Sanitize user input by removing control characters and normalizing whitespace.
///
/// Line breaks are preserved; within each line, runs of whitespace collapse to
/// a single space. Leading/trailing whitespace is trimmed. Unicode content
/// outside the ASCII control range (including emoji) passes through verbatim.
/// The function is idempotent.
pub fn sanitize_input(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let stripped: String = text.chars().filter(|c| !is_stripped_control(*c)).collect();

    let normalized = stripped
        .split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n");

    normalized.trim().to_string()
}

/// Check whether text contains a known prompt-injection pattern.
///
/// Returns the category of the first matching pattern in priority order, or
/// `None` if the text is clean. Matching is case-insensitive; empty input is
/// never suspicious. Only the first category is reported even when several
/// patterns match.
pub fn check_suspicious_content(text: &str) -> Option<PatternCategory> {
    if text.is_empty() {
        return None;
    }

    SUSPICIOUS_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(text))
        .map(|(_, category)| *category)
}
