//! Failure-reason extraction from test logs.
//!
//! The test harness frames its log with 78-character `=` rules:
//!
//! ```text
//! <preamble>
//! ==============================================================================
//! <header>
//! ==============================================================================
//! <body>
//! ==============================================================================
//! <footer ...>
//! ```
//!
//! Annotated lines in the body look like
//! `[2024-05-01T10:00:00.123] Fatal: job never started (fail in check_job at line 42)`.
//! The reason is the message of the first Fatal line, else the first Error
//! line, else the first Warning line. Each annotation only counts when it
//! ends with its matching status token: `(fail ...)`, `(subfail ...)` and
//! `(skip ...)`/`(subskip ...)` respectively.

use regex::Regex;
use std::sync::LazyLock;

/// Section delimiter written by the harness.
pub const SECTION_RULE: &str =
    "==============================================================================";

static FATAL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\[[^\]]+\][ \[]+Fatal[ \]:]+(.*?) \(fail[^)]*\)[ \t\r]*$").unwrap()
});

static ERROR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\[[^\]]+\][ \[]+Error[ \]:]+(.*?) \(subfail[^)]*\)[ \t\r]*$").unwrap()
});

static WARNING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\[[^\]]+\][ \[]+Warning[ \]:]+(.*?) \((?:sub)?skip[^)]*\)[ \t\r]*$")
        .unwrap()
});

/// A log split on [`SECTION_RULE`] lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSections {
    pub header: String,
    pub body: String,
    pub footer: String,
}

/// Split a log into header (section 1), body (section 2) and footer
/// (sections 3.. joined). `None` when there is no body section.
pub fn split_sections(log: &str) -> Option<LogSections> {
    let mut sections: Vec<String> = vec![String::new()];
    for line in log.lines() {
        if line.trim_end() == SECTION_RULE {
            sections.push(String::new());
        } else if let Some(current) = sections.last_mut() {
            current.push_str(line);
            current.push('\n');
        }
    }
    if sections.len() < 3 {
        return None;
    }
    Some(LogSections {
        header: sections[1].clone(),
        body: sections[2].clone(),
        footer: sections[3..].concat(),
    })
}

fn first_match(regex: &Regex, text: &str) -> Option<String> {
    regex
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .find(|msg| !msg.is_empty())
}

/// Extract the failure reason from a raw log, if any.
pub fn extract_reason(log: &str) -> Option<String> {
    let sections = split_sections(log)?;
    [&*FATAL_REGEX, &*ERROR_REGEX, &*WARNING_REGEX]
        .into_iter()
        .find_map(|regex| first_match(regex, &sections.body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(body: &str) -> String {
        format!(
            "preamble\n{rule}\ntest4.2 header\n{rule}\n{body}\n{rule}\nfooter one\n{rule}\nfooter two\n",
            rule = SECTION_RULE
        )
    }

    #[test]
    fn test_rule_is_78_characters() {
        assert_eq!(SECTION_RULE.len(), 78);
        assert!(SECTION_RULE.chars().all(|c| c == '='));
    }

    #[test]
    fn test_split_sections() {
        let sections = split_sections(&framed("body line")).unwrap();
        assert_eq!(sections.header, "test4.2 header\n");
        assert_eq!(sections.body, "body line\n");
        assert_eq!(sections.footer, "footer one\nfooter two\n");
    }

    #[test]
    fn test_split_sections_requires_body() {
        assert!(split_sections("no rules at all").is_none());
        assert!(split_sections(&format!("pre\n{SECTION_RULE}\nheader only\n")).is_none());
    }

    #[test]
    fn test_fatal_wins_over_error_and_warning() {
        let body = "\
[2024-05-01T10:00:00.100] Warning: partition is small (skip in setup at line 3)
[2024-05-01T10:00:01.200] Error: sacct returned nothing (subfail in check at line 20)
[2024-05-01T10:00:02.300] Fatal: job never started (fail in check_job at line 42)";
        assert_eq!(
            extract_reason(&framed(body)),
            Some("job never started".to_string())
        );
    }

    #[test]
    fn test_error_when_no_fatal() {
        let body = "\
[2024-05-01T10:00:00.100] Warning: low memory (subskip in setup at line 3)
[2024-05-01T10:00:01.200] Error: wrong exit code (subfail in check at line 20)";
        assert_eq!(
            extract_reason(&framed(body)),
            Some("wrong exit code".to_string())
        );
    }

    #[test]
    fn test_warning_when_only_warning() {
        let body = "[2024-05-01T10:00:00.100] [Warning] needs two nodes (skip in main at line 9)";
        assert_eq!(
            extract_reason(&framed(body)),
            Some("needs two nodes".to_string())
        );
    }

    #[test]
    fn test_annotation_requires_matching_status_token() {
        // A Fatal line ending in (subfail ...) does not count as Fatal.
        let body = "\
[2024-05-01T10:00:00.100] Fatal: not really fatal (subfail in x at line 1)
[2024-05-01T10:00:01.200] Error: the real error (subfail in y at line 2)";
        assert_eq!(
            extract_reason(&framed(body)),
            Some("the real error".to_string())
        );
    }

    #[test]
    fn test_annotations_outside_body_are_ignored() {
        let log = format!(
            "{rule}\n[t] Fatal: in header (fail in a at line 1)\n{rule}\nplain body\n{rule}\n[t] Fatal: in footer (fail in b at line 2)\n",
            rule = SECTION_RULE
        );
        assert_eq!(extract_reason(&log), None);
    }

    #[test]
    fn test_empty_message_is_skipped() {
        let body = "\
[t] Fatal:  (fail in a at line 1)
[t] Fatal: second one (fail in b at line 2)";
        assert_eq!(extract_reason(&framed(body)), Some("second one".to_string()));
    }
}
