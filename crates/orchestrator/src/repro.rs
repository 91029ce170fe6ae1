//! Decides whether a blocker finding carries enough evidence to reproduce.
//!
//! Only reproducible blockers are handed to the debugger role. The rest are
//! surfaced to the user, who may accept them.

use std::sync::OnceLock;

use handoff_core::ReviewFinding;
use regex::Regex;

fn evidence_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // JS/TS stack frame: "at fn (src/a.ts:12:5)"
            r"\bat\s+\S+.*:\d+(:\d+)?\)?\s*$",
            // Rust panic
            r"panicked at\s+\S+:\d+",
            // Python traceback
            r"Traceback \(most recent call last\)",
            r#"File "[^"]+", line \d+"#,
            r"(?i)steps to reproduce",
            // Shell command line
            r"^\s*\$\s+\S+",
            r"(?i)exit(ed)? (with )?(code|status) [1-9]\d*",
        ]
        .iter()
        .filter_map(|p| Regex::new(&format!("(?m){p}")).ok())
        .collect()
    })
}

/// Whether `text` looks like a stack trace, failing command or repro steps.
pub fn has_reproduction_evidence(text: &str) -> bool {
    evidence_patterns().iter().any(|re| re.is_match(text))
}

/// A finding is reproducible when it carries a reproduction or its message
/// embeds one.
pub fn is_reproducible(finding: &ReviewFinding) -> bool {
    match finding.reproduction.as_deref().map(str::trim) {
        Some(repro) if !repro.is_empty() => true,
        _ => has_reproduction_evidence(&finding.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_core::FindingSeverity;

    fn blocker(message: &str) -> ReviewFinding {
        ReviewFinding::new("F1", FindingSeverity::Blocker, message)
    }

    #[test]
    fn test_explicit_reproduction() {
        let finding = blocker("toggle crashes").with_reproduction("npm test -- Toggle");
        assert!(is_reproducible(&finding));

        let finding = blocker("toggle crashes").with_reproduction("   ");
        assert!(!is_reproducible(&finding));
    }

    #[test]
    fn test_stack_traces_in_message() {
        assert!(is_reproducible(&blocker(
            "TypeError: x is undefined\n    at render (src/Toggle.tsx:12:5)"
        )));
        assert!(is_reproducible(&blocker(
            "thread 'main' panicked at src/main.rs:10:5"
        )));
        assert!(is_reproducible(&blocker(
            "Traceback (most recent call last):\n  File \"app.py\", line 3, in <module>"
        )));
    }

    #[test]
    fn test_commands_and_steps() {
        assert!(is_reproducible(&blocker("$ cargo test settings\nfails")));
        assert!(is_reproducible(&blocker("Build exited with code 2")));
        assert!(is_reproducible(&blocker("Steps to reproduce: open settings")));
    }

    #[test]
    fn test_vague_finding_not_reproducible() {
        assert!(!is_reproducible(&blocker("The layout feels off at times")));
        assert!(!is_reproducible(&blocker("Exit code 0 but output empty")));
    }
}
