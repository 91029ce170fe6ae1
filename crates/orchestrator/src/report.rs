//! Plain-text reports for a run and its execution plan.
//!
//! Rendering is pure: the same state always produces the same bytes. Nothing
//! time-dependent is printed and every collection is emitted in a fixed order.

use std::fmt::Write;

use handoff_core::{ExecutionPlan, Phase, RunState, Stage, WorkItem};

use crate::repro::is_reproducible;

pub struct ReportFormatter;

impl ReportFormatter {
    /// Full status report for a run, including the plan if one exists.
    pub fn render(state: &RunState) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Delegation Report");
        let _ = writeln!(out);
        let _ = writeln!(out, "Request: {}", state.request);
        let _ = writeln!(out, "Stage: {}", state.stage);
        let _ = writeln!(out, "Status: {}", Self::status(state));

        if !state.pending_questions.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Clarification Needed");
            for question in &state.pending_questions {
                let _ = writeln!(out, "- {question}");
            }
        }

        let _ = writeln!(out);
        match state.plan {
            Some(ref plan) => Self::write_plan(&mut out, plan, Some(state)),
            None => {
                let _ = writeln!(out, "## Execution Plan");
                let _ = writeln!(out, "(no plan)");
            }
        }

        if !state.escalations.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Escalations");
            for entry in &state.escalations {
                let _ = writeln!(
                    out,
                    "- {}: {} -> {} ({})",
                    entry.item_id, entry.from_role, entry.to_role, entry.reason
                );
            }
        }

        if !state.findings.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Review Findings");
            let mut findings: Vec<_> = state.findings.iter().collect();
            findings.sort_by(|a, b| a.severity.cmp(&b.severity).then_with(|| a.id.cmp(&b.id)));
            for finding in findings {
                let mut line = format!("- [{}] {}", finding.severity.as_str(), finding.id);
                if let Some(ref file) = finding.file {
                    let _ = write!(line, " {file}");
                }
                let _ = write!(line, ": {}", finding.message.lines().next().unwrap_or(""));
                if state.accepted_findings.contains(&finding.id) {
                    line.push_str(" (accepted)");
                } else if finding.is_blocker() && !is_reproducible(finding) {
                    line.push_str(" (needs acceptance)");
                }
                let _ = writeln!(out, "{line}");
            }
        }

        if !state.debug_fixes.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Debug Fixes");
            for fix in &state.debug_fixes {
                let _ = writeln!(
                    out,
                    "- {}: {}{}",
                    fix.finding_ids.join(", "),
                    fix.summary,
                    Self::file_suffix(&fix.files_changed)
                );
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "## Summary");
        let total = state.plan.as_ref().map_or(0, ExecutionPlan::total_items);
        let _ = writeln!(out, "Completed: {}/{} work items", state.outputs.len(), total);
        for (item_id, reason) in &state.failures {
            let _ = writeln!(out, "Failed: {item_id} ({reason})");
        }
        let _ = writeln!(out, "Review cycles: {}", state.review_cycles);
        let changed: Vec<String> = state.changed_files().into_iter().collect();
        if changed.is_empty() {
            let _ = writeln!(out, "Changed files: (none)");
        } else {
            let _ = writeln!(out, "Changed files: {}", changed.join(", "));
        }

        out
    }

    /// The plan on its own, before any work has run.
    pub fn render_plan(plan: &ExecutionPlan) -> String {
        let mut out = String::new();
        Self::write_plan(&mut out, plan, None);
        out
    }

    fn status(state: &RunState) -> String {
        if let Some(ref reason) = state.halted {
            return format!("halted: {reason}");
        }
        if state.stage == Stage::Done {
            "completed".to_string()
        } else if !state.pending_questions.is_empty() {
            "awaiting clarification".to_string()
        } else if state.awaiting_acceptance {
            "awaiting acceptance".to_string()
        } else {
            "in progress".to_string()
        }
    }

    fn write_plan(out: &mut String, plan: &ExecutionPlan, state: Option<&RunState>) {
        let _ = writeln!(
            out,
            "## Execution Plan ({} phases, {} tasks)",
            plan.total_phases(),
            plan.total_items()
        );
        for phase in &plan.phases {
            let _ = writeln!(out, "{}", Self::phase_header(phase));
            for item in &phase.items {
                let _ = writeln!(out, "  {}", Self::item_line(item, state));
            }
        }
    }

    fn phase_header(phase: &Phase) -> String {
        let count = phase.items.len();
        let noun = if count == 1 { "task" } else { "tasks" };
        let mode = if phase.is_parallel() {
            "parallel"
        } else {
            "sequential"
        };
        format!("Phase {} ({mode}, {count} {noun})", phase.number)
    }

    fn item_line(item: &WorkItem, state: Option<&RunState>) -> String {
        let marker = match state {
            Some(s) if s.failures.contains_key(&item.id) => "[!] ",
            Some(s) => match s.outputs.get(&item.id) {
                Some(_) => "[x] ",
                None => "[ ] ",
            },
            None => "- ",
        };
        // An escalated item is reported under the role that finished it.
        let role = state
            .and_then(|s| s.outputs.get(&item.id))
            .map_or(item.role.as_str(), |o| o.role.as_str());

        let mut line = format!(
            "{marker}{} [{role}] {}{}",
            item.id,
            item.description,
            Self::file_suffix(&item.files)
        );
        if !item.depends_on.is_empty() {
            let _ = write!(line, " (after {})", item.depends_on.join(", "));
        }
        line
    }

    fn file_suffix(files: &[String]) -> String {
        if files.is_empty() {
            String::new()
        } else {
            format!(" -> {}", files.join(", "))
        }
    }
}
