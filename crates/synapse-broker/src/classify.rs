//! Output classification (spec §4.B step 9, §6 "recognized output forms").

use once_cell::sync::Lazy;
use regex::Regex;

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").unwrap());
static RATE_LIMIT_FORM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^|]+\|\d+$").unwrap());

const SESSION_TIMEOUT_SUBSTRINGS: &[&str] = &[
    "invalid api key",
    "please run /login",
    "api login failure",
    "authentication failed",
];

const EXECUTE_ERROR_MARKER: &str = "Execute error%";

/// Result of classifying a completed child process's output (spec §4.B
/// step 9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Exit 0, ANSI/prompt-echo stripped and trimmed.
    Success(String),
    /// Case-insensitive substring match on one of the latching phrases.
    SessionTimeout,
    /// `<message>|<epoch_seconds>`, parsed epoch in the second field.
    RateLimit { message: String, epoch_seconds: i64 },
    /// Trimmed stdout equals `Execute error%` exactly.
    ExecuteError,
    /// Any other non-zero exit.
    Failure(String),
}

/// Strip ANSI escape sequences (spec §4.B step 9 "Success").
pub fn strip_ansi(input: &str) -> String {
    ANSI_ESCAPE.replace_all(input, "").to_string()
}

/// Strip a leading prompt echo up to and including the first `claude>`
/// marker, if present.
pub fn strip_prompt_echo(input: &str) -> String {
    match input.find("claude>") {
        Some(idx) => input[idx + "claude>".len()..].to_string(),
        None => input.to_string(),
    }
}

fn is_session_timeout(stdout_lower: &str) -> bool {
    SESSION_TIMEOUT_SUBSTRINGS.iter().any(|needle| stdout_lower.contains(needle))
}

/// Parse the strict `<message>|<epoch_seconds>` rate-limit form. The whole
/// trimmed string must match `^[^|]+\|\d+$` (spec §6) — a message containing
/// a second `|` or a non-numeric tail does not match.
fn parse_rate_limit(trimmed: &str) -> Option<(String, i64)> {
    if !RATE_LIMIT_FORM.is_match(trimmed) {
        return None;
    }
    let (message, epoch) = trimmed.rsplit_once('|')?;
    let epoch_seconds: i64 = epoch.parse().ok()?;
    Some((message.to_string(), epoch_seconds))
}

/// Classify a completed invocation's raw stdout against `exit_success`
/// (spec §4.B step 9). `stderr` is only used for the generic-failure case.
pub fn classify(stdout: &str, stderr: &str, exit_success: bool) -> Outcome {
    let trimmed = stdout.trim();
    let lower = trimmed.to_ascii_lowercase();

    if is_session_timeout(&lower) {
        return Outcome::SessionTimeout;
    }

    if let Some((message, epoch_seconds)) = parse_rate_limit(trimmed) {
        return Outcome::RateLimit { message, epoch_seconds };
    }

    if trimmed == EXECUTE_ERROR_MARKER {
        return Outcome::ExecuteError;
    }

    if exit_success {
        let cleaned = strip_prompt_echo(&strip_ansi(stdout));
        return Outcome::Success(cleaned.trim().to_string());
    }

    let error = if stderr.trim().is_empty() {
        trimmed.to_string()
    } else {
        stderr.trim().to_string()
    };
    Outcome::Failure(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s3_rate_limit_parses_message_and_epoch() {
        let outcome = classify("Usage limit reached|1700000060", "", true);
        assert_eq!(
            outcome,
            Outcome::RateLimit {
                message: "Usage limit reached".to_string(),
                epoch_seconds: 1700000060,
            }
        );
    }

    #[test]
    fn s4_session_timeout_matches_case_insensitively_on_success_exit() {
        let outcome = classify("Invalid API key, please run /login", "", true);
        assert_eq!(outcome, Outcome::SessionTimeout);
    }

    #[test]
    fn execute_error_marker_requires_exact_trimmed_match() {
        assert_eq!(classify("Execute error%", "", true), Outcome::ExecuteError);
        assert_eq!(
            classify("  Execute error%  \n", "", true),
            Outcome::ExecuteError
        );
        assert!(!matches!(
            classify("Execute error% extra", "", true),
            Outcome::ExecuteError
        ));
    }

    #[test]
    fn success_strips_ansi_and_prompt_echo() {
        let raw = "\x1b[32mclaude> \x1b[0mfinal answer here";
        let outcome = classify(raw, "", true);
        assert_eq!(outcome, Outcome::Success(" final answer here".trim().to_string()));
    }

    #[test]
    fn rate_limit_pattern_does_not_match_message_with_extra_pipe() {
        assert!(parse_rate_limit("a|b|123").is_none());
    }

    #[test]
    fn rate_limit_pattern_requires_numeric_tail() {
        assert!(parse_rate_limit("message|soon").is_none());
    }

    #[test]
    fn non_zero_exit_without_known_markers_is_a_generic_failure() {
        let outcome = classify("", "boom: disk full", false);
        assert_eq!(outcome, Outcome::Failure("boom: disk full".to_string()));
    }
}
