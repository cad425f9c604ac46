//! Helpers for logging text captured from child processes.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

fn ansi_regex() -> &'static Regex {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(r"\x1B\[[0-9;]*[A-Za-z]").expect("valid ANSI regex"))
}

/// Removes ANSI colour and cursor sequences.
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ansi_regex().replace_all(text, "")
}

/// Prepares child output for a log line: no colour codes, no trailing newline.
pub fn clean_output(text: &str) -> String {
    strip_ansi(text).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[31merror\x1b[0m: bad"), "error: bad");
        assert_eq!(strip_ansi("\x1b[2K\x1b[1Gdone"), "done");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn test_clean_output() {
        assert_eq!(clean_output("\x1b[33mwarn\x1b[39m\n\n"), "warn");
    }
}
