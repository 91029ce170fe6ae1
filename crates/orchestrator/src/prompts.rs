use handoff_core::{Action, FindingSeverity, Role, RoleRegistry};

use crate::config::DEFAULT_CLARIFICATION_SENTINEL;
use crate::invoker::RoleContext;

/// Renders the natural-language brief handed to a role.
pub struct RolePrompts;

impl RolePrompts {
    pub fn brief(context: &RoleContext) -> String {
        let mut brief = match context.action {
            Action::Clarify => Self::clarify(context),
            Action::Plan => Self::plan(context),
            Action::Implement => Self::implement(context),
            Action::Review => Self::review(context),
            Action::Debug => Self::debug(context),
        };

        if let Some(ref feedback) = context.feedback {
            brief.push_str(&format!(
                "\n\n## Feedback on Previous Attempt\n{feedback}"
            ));
        }
        brief
    }

    fn clarify(context: &RoleContext) -> String {
        format!(
            r#"You are clarifying a development request before any work is planned.

## Request
{request}

## Conversation So Far
{conversation}

## Instructions
Ask every question you still need answered.
When nothing is left unclear, reply with a line containing only:
{sentinel}"#,
            request = context.request,
            conversation = Self::conversation(context),
            sentinel = context
                .sentinel
                .as_deref()
                .unwrap_or(DEFAULT_CLARIFICATION_SENTINEL),
        )
    }

    fn plan(context: &RoleContext) -> String {
        format!(
            r#"Break the following request into work items.

## Request
{request}

## Conversation
{conversation}

## Available Roles
{roles}

## Required Output
Each work item needs:
1. A unique id
2. A description
3. The exact files it will touch
4. The ids of items it depends on
5. The id of a role above that can implement
6. Known risks, if any

Items that touch the same file run one after another.
Do NOT implement anything yet. Only create the plan."#,
            request = context.request,
            conversation = Self::conversation(context),
            roles = Self::roles(context),
        )
    }

    fn roles(context: &RoleContext) -> String {
        let describe = |role: &Role| {
            let assignable = if role.permits(Action::Implement) {
                "can implement"
            } else {
                "cannot be assigned work items"
            };
            format!("{}: {} ({assignable})", role.id, role.description)
        };

        let lines: Vec<String> = if context.available_roles.is_empty() {
            RoleRegistry::standard().roles().iter().map(describe).collect()
        } else {
            context.available_roles.iter().map(describe).collect()
        };
        Self::bullet_list(&lines)
    }

    fn implement(context: &RoleContext) -> String {
        let (id, description) = context
            .task
            .as_ref()
            .map(|t| (t.id.as_str(), t.description.as_str()))
            .unwrap_or(("-", "-"));

        let mut brief = format!(
            r#"Implement the following work item.

## Work Item
**Id:** {id}
**Description:** {description}

## Files You Own
{files}

## Plan
{plan}

## Instructions
1. Only touch the files listed above
2. If the work is beyond your capability, escalate with your partial output

Start implementation now."#,
            files = Self::bullet_list(&context.file_scope),
            plan = context.plan_outline.as_deref().unwrap_or("(no plan)"),
        );

        if let Some(task) = context.task.as_ref().filter(|t| !t.risks.is_empty()) {
            brief.push_str(&format!("\n\n## Known Risks\n{}", Self::bullet_list(&task.risks)));
        }
        if let Some(ref partial) = context.prior_output {
            brief.push_str(&format!(
                "\n\n## Partial Output From Previous Role\n{partial}\n\nContinue from here instead of starting over."
            ));
        }
        if !context.escalation_trail.is_empty() {
            let trail: Vec<String> = context
                .escalation_trail
                .iter()
                .map(|e| format!("{} -> {}: {}", e.from_role, e.to_role, e.reason))
                .collect();
            brief.push_str(&format!(
                "\n\n## Escalation Trail\n{}",
                Self::bullet_list(&trail)
            ));
        }
        brief
    }

    fn review(context: &RoleContext) -> String {
        let artifacts: Vec<String> = context
            .artifacts
            .iter()
            .map(|a| {
                format!(
                    "{} ({}): {} [{}]",
                    a.item_id,
                    a.role,
                    a.summary,
                    a.files_changed.join(", ")
                )
            })
            .collect();

        format!(
            r#"Review the work produced for the following request. Do not edit any file.

## Request
{request}

## Artifacts
{artifacts}

## Review Criteria
1. Correctness - does it solve the request?
2. Code quality and style
3. Security concerns
4. Breaking changes

## Output
Report each issue as a finding with severity blocker, warning, suggestion or positive.
Attach a stack trace, failing command or steps to reproduce to every blocker you can reproduce."#,
            request = context.request,
            artifacts = Self::bullet_list(&artifacts),
        )
    }

    fn debug(context: &RoleContext) -> String {
        let findings: Vec<String> = context
            .findings
            .iter()
            .filter(|f| f.severity == FindingSeverity::Blocker)
            .map(|f| {
                let location = f.file.as_deref().unwrap_or("unknown file");
                match f.reproduction {
                    Some(ref repro) => format!("{} in {}: {}\n  Reproduction: {}", f.id, location, f.message, repro),
                    None => format!("{} in {}: {}", f.id, location, f.message),
                }
            })
            .collect();

        format!(
            r#"Fix the blocker findings reported in review for: {request}

## Blockers
{findings}

## Instructions
1. Reproduce each blocker first
2. Fix the root cause
3. Report the files you changed

Fix the issues now."#,
            request = context.request,
            findings = Self::bullet_list(&findings),
        )
    }

    fn conversation(context: &RoleContext) -> String {
        if context.conversation.is_empty() {
            "(none)".to_string()
        } else {
            Self::bullet_list(&context.conversation)
        }
    }

    fn bullet_list(lines: &[String]) -> String {
        if lines.is_empty() {
            return "(none)".to_string();
        }
        lines
            .iter()
            .map(|l| format!("- {l}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
