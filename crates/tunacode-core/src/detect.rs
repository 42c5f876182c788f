// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
//! Response-quality heuristics: task-completion marker, truncation, and
//! intention-without-action detection.
//!
//! All functions are pure so each heuristic is replaceable in one place.

use std::sync::OnceLock;

use regex::Regex;

use tunacode_model::TASK_COMPLETE_MARKER;

/// If `text` begins with the task-completion marker (leading whitespace
/// allowed, case-sensitive), return the remaining text with the marker
/// stripped.
pub fn strip_task_complete(text: &str) -> Option<String> {
    let trimmed = text.trim_start();
    let rest = trimmed.strip_prefix(TASK_COMPLETE_MARKER)?;
    Some(rest.trim_start().to_string())
}

/// Mid-word suffixes that indicate the model stopped mid-token.
const TRUNCATED_SUFFIXES: &[&str] =
    &["referen", "inte", "proces", "analy", "deve", "imple", "execu"];

/// Heuristic check for a response that was cut off mid-generation.
///
/// The unterminated-fence clause is the robust signal; the ellipsis,
/// bracket, and mid-word clauses catch the remaining provider quirks.
pub fn looks_truncated(text: &str) -> bool {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        return false;
    }

    // Unclosed triple-backtick block.
    if trimmed.matches("```").count() % 2 == 1 {
        return true;
    }

    if trimmed.ends_with("...") || trimmed.ends_with('…') {
        return true;
    }

    if has_unbalanced_brackets(trimmed) {
        return true;
    }

    let last_word = trimmed.rsplit(char::is_whitespace).next().unwrap_or("");
    TRUNCATED_SUFFIXES.iter().any(|s| last_word.ends_with(s))
}

fn has_unbalanced_brackets(text: &str) -> bool {
    let mut round = 0i64;
    let mut square = 0i64;
    let mut curly = 0i64;
    for c in text.chars() {
        match c {
            '(' => round += 1,
            ')' => round -= 1,
            '[' => square += 1,
            ']' => square -= 1,
            '{' => curly += 1,
            '}' => curly -= 1,
            _ => {}
        }
    }
    // Only opens-without-closes signal truncation; stray closers are just
    // sloppy prose.
    round > 0 || square > 0 || curly > 0
}

fn intent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(let me|i'll|i will|i'm going to|i need to|i should|going to|let's|i can|i would|allow me to|about to|plan to)\b",
        )
        .unwrap()
    })
}

fn action_verb_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(read|check|search|find|look|create|write|update|modify|run|execute|analyze|examine|scan)\b",
        )
        .unwrap()
    })
}

/// True when the text announces an action ("let me read…") without the
/// iteration having produced a tool call.  Word-boundary matching, so
/// "already" never counts as "read".
pub fn announces_without_acting(text: &str) -> bool {
    intent_re().is_match(text) && action_verb_re().is_match(text)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Task-complete marker ─────────────────────────────────────────────────

    #[test]
    fn marker_at_start_is_stripped() {
        assert_eq!(
            strip_task_complete("TUNACODE_TASK_COMPLETE All done.").as_deref(),
            Some("All done.")
        );
    }

    #[test]
    fn leading_whitespace_before_marker_allowed() {
        assert_eq!(
            strip_task_complete("  \n TUNACODE_TASK_COMPLETE done").as_deref(),
            Some("done")
        );
    }

    #[test]
    fn marker_mid_text_does_not_match() {
        assert!(strip_task_complete("well, TUNACODE_TASK_COMPLETE").is_none());
    }

    #[test]
    fn marker_is_case_sensitive() {
        assert!(strip_task_complete("tunacode_task_complete done").is_none());
    }

    #[test]
    fn bare_marker_strips_to_empty() {
        assert_eq!(strip_task_complete("TUNACODE_TASK_COMPLETE").as_deref(), Some(""));
    }

    // ── Truncation ───────────────────────────────────────────────────────────

    #[test]
    fn unclosed_code_fence_is_truncated() {
        assert!(looks_truncated("here is the diff:\n```rust\nfn main() {}"));
    }

    #[test]
    fn closed_code_fence_is_fine() {
        assert!(!looks_truncated("```rust\nfn main() {}\n```\ndone"));
    }

    #[test]
    fn trailing_ellipsis_is_truncated() {
        assert!(looks_truncated("and then we..."));
        assert!(looks_truncated("and then we…"));
    }

    #[test]
    fn unbalanced_open_bracket_is_truncated() {
        assert!(looks_truncated("the result is f(x, y"));
    }

    #[test]
    fn mid_word_suffix_is_truncated() {
        assert!(looks_truncated("now I will imple"));
        assert!(looks_truncated("see the referen"));
    }

    #[test]
    fn complete_sentence_is_not_truncated() {
        assert!(!looks_truncated("The file has been read successfully."));
    }

    #[test]
    fn empty_text_is_not_truncated() {
        assert!(!looks_truncated("   "));
    }

    // ── Intention without action ─────────────────────────────────────────────

    #[test]
    fn intent_plus_verb_matches() {
        assert!(announces_without_acting("Let me read the file first."));
        assert!(announces_without_acting("I'll search for the function."));
        assert!(announces_without_acting("I'M GOING TO RUN THE TESTS"));
    }

    #[test]
    fn intent_without_verb_does_not_match() {
        assert!(!announces_without_acting("Let me think about this."));
    }

    #[test]
    fn verb_without_intent_does_not_match() {
        assert!(!announces_without_acting("The read completed."));
    }

    #[test]
    fn verb_inside_longer_word_does_not_match() {
        // "already" must not count as the verb "read".
        assert!(!announces_without_acting("I can do this already."));
    }
}
