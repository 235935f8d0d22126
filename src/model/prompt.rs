//! Prompt templates and the pure helpers that fill them.
//!
//! Rendering is single-pass placeholder substitution: values inserted for one
//! placeholder are never scanned for further placeholders.

use crate::config::{ExampleFormat, HistoryFormat};
use crate::trajectory::types::{Step, StepExample};

/// Appended to any field cut short by a character cap.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

pub const PLACEHOLDER_GOAL: &str = "{goal}";
pub const PLACEHOLDER_PLAN: &str = "{plan}";
pub const PLACEHOLDER_OBSERVATION: &str = "{observation}";
pub const PLACEHOLDER_REASONING: &str = "{reasoning}";
pub const PLACEHOLDER_HISTORY: &str = "{history}";
pub const PLACEHOLDER_EXAMPLES: &str = "{examples}";

pub const DEFAULT_PLAN_TEMPLATE: &str = r#"You are an agent that solves tasks step by step.

## Goal
{goal}

## Examples from earlier successful attempts
{examples}

Write a short numbered plan for reaching the goal. Output only the plan."#;

pub const DEFAULT_REASONING_TEMPLATE: &str = r#"You are an agent that solves tasks step by step.

## Goal
{goal}

## Plan
{plan}

## Examples from earlier successful attempts
{examples}

## Previous steps
{history}

## Current observation
{observation}

Think about what to do next. Explain your reasoning briefly; do not output an action yet."#;

pub const DEFAULT_ACTION_TEMPLATE: &str = r#"You are an agent that solves tasks step by step.

## Goal
{goal}

## Plan
{plan}

## Examples from earlier successful attempts
{examples}

## Previous steps
{history}

## Current observation
{observation}

## Your reasoning
{reasoning}

Output the single next action and nothing else."#;

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Substitute `fields` into `template`.
///
/// Each entry is `(placeholder, value)` with the braces included, e.g.
/// `("{goal}", "add 9 and 1")`. Unknown placeholders are left verbatim.
pub fn render(template: &str, fields: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let candidate = &rest[open..];
        match fields
            .iter()
            .find(|(placeholder, _)| candidate.starts_with(placeholder))
        {
            Some((placeholder, value)) => {
                out.push_str(value);
                rest = &candidate[placeholder.len()..];
            }
            None => {
                out.push('{');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Whether a template consumes retrieved examples at all.
pub fn references_examples(template: &str) -> bool {
    template.contains(PLACEHOLDER_EXAMPLES)
}

/// Prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Cap `text` at `max_chars` characters, marking the cut.
pub fn truncate_field(text: &str, max_chars: usize) -> String {
    let kept = truncate_chars(text, max_chars);
    if kept.len() == text.len() {
        text.to_string()
    } else {
        format!("{kept}{TRUNCATION_MARKER}")
    }
}

// ---------------------------------------------------------------------------
// History and examples
// ---------------------------------------------------------------------------

/// Render the steps taken so far, most recent `format.recent_steps` in full
/// and older ones collapsed into one line.
pub fn format_history(steps: &[Step], format: &HistoryFormat) -> String {
    if steps.is_empty() {
        return "(no previous steps)".to_string();
    }

    let omitted = steps.len().saturating_sub(format.recent_steps);
    let mut lines = Vec::with_capacity(steps.len() - omitted + 1);
    if omitted > 0 {
        lines.push(format!("({omitted} earlier steps omitted)"));
    }
    for (index, step) in steps.iter().enumerate().skip(omitted) {
        lines.push(format!(
            "Step {}:\n  Observation: {}\n  Action: {}",
            index + 1,
            truncate_field(&step.observation, format.observation_chars),
            truncate_field(&step.action, format.action_chars),
        ));
    }
    lines.join("\n")
}

const EXAMPLE_SEPARATOR: &str = "\n\n";

/// Pack retrieved examples into the examples block.
///
/// At most `format.max_examples` are kept, in ranking order, and an example
/// that would push the block past `format.total_chars` (separators included)
/// is dropped. Every example not shown is counted in a trailing notice.
pub fn format_examples(examples: &[StepExample], format: &ExampleFormat) -> String {
    if examples.is_empty() {
        return "(no examples available)".to_string();
    }

    let mut blocks: Vec<String> = Vec::new();
    let mut used = 0usize;
    for example in examples {
        if blocks.len() >= format.max_examples {
            break;
        }
        let block = format!(
            "Example {}:\n  Goal: {}\n  Observation: {}\n  Reasoning: {}\n  Action: {}",
            blocks.len() + 1,
            truncate_field(&example.goal, format.goal_chars),
            truncate_field(&example.observation, format.observation_chars),
            truncate_field(&example.reasoning, format.reasoning_chars),
            truncate_field(&example.action, format.action_chars),
        );
        let separator = if blocks.is_empty() { 0 } else { EXAMPLE_SEPARATOR.len() };
        let cost = separator + block.chars().count();
        if used + cost > format.total_chars {
            continue;
        }
        used += cost;
        blocks.push(block);
    }

    let omitted = examples.len() - blocks.len();
    if blocks.is_empty() {
        return format!("({omitted} examples omitted)");
    }
    let mut out = blocks.join(EXAMPLE_SEPARATOR);
    if omitted > 0 {
        out.push_str(&format!("\n({omitted} examples omitted)"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(action: &str) -> StepExample {
        StepExample {
            trajectory_id: "t".into(),
            step_index: 0,
            goal: "add 1 and 2".into(),
            plan: "sum".into(),
            observation: "Task: add 1 and 2".into(),
            reasoning: "1 + 2 = 3".into(),
            action: action.into(),
        }
    }

    #[test]
    fn test_render_substitutes_known_placeholders() {
        let out = render(
            "Goal: {goal} / {unknown} / {plan}",
            &[(PLACEHOLDER_GOAL, "g"), (PLACEHOLDER_PLAN, "p")],
        );
        assert_eq!(out, "Goal: g / {unknown} / p");
    }

    #[test]
    fn test_render_is_not_recursive() {
        let out = render(
            "{goal} then {plan}",
            &[(PLACEHOLDER_GOAL, "{plan}"), (PLACEHOLDER_PLAN, "P")],
        );
        assert_eq!(out, "{plan} then P");
    }

    #[test]
    fn test_render_handles_trailing_brace() {
        assert_eq!(render("x {", &[(PLACEHOLDER_GOAL, "g")]), "x {");
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_truncate_field_marks_cut() {
        assert_eq!(truncate_field("abcdef", 3), format!("abc{TRUNCATION_MARKER}"));
        assert_eq!(truncate_field("abc", 3), "abc");
    }

    #[test]
    fn test_references_examples() {
        assert!(references_examples(DEFAULT_PLAN_TEMPLATE));
        assert!(!references_examples("Goal: {goal}"));
    }

    #[test]
    fn test_format_history_collapses_old_steps() {
        let steps: Vec<Step> = (0..7)
            .map(|i| Step::new(format!("obs {i}"), "r", format!("act {i}")))
            .collect();
        let out = format_history(&steps, &HistoryFormat::default());
        assert!(out.starts_with("(2 earlier steps omitted)"));
        assert!(!out.contains("obs 1\n"));
        assert!(out.contains("Step 3:"));
        assert!(out.contains("act 6"));
        assert_eq!(out.matches("Step ").count(), 5);
    }

    #[test]
    fn test_format_history_caps_fields() {
        let steps = vec![Step::new("o".repeat(400), "r", "a".repeat(250))];
        let out = format_history(&steps, &HistoryFormat::default());
        assert!(out.contains(&format!("{}{TRUNCATION_MARKER}", "o".repeat(300))));
        assert!(out.contains(&format!("{}{TRUNCATION_MARKER}", "a".repeat(200))));
    }

    #[test]
    fn test_format_history_empty() {
        assert_eq!(
            format_history(&[], &HistoryFormat::default()),
            "(no previous steps)"
        );
    }

    #[test]
    fn test_format_examples_respects_max() {
        let examples: Vec<_> = (0..5).map(|i| example(&format!("answer:{i}"))).collect();
        let out = format_examples(&examples, &ExampleFormat::default());
        assert!(out.contains("Example 3:"));
        assert!(!out.contains("Example 4:"));
        assert!(out.ends_with("(2 examples omitted)"));
    }

    #[test]
    fn test_format_examples_respects_budget() {
        let format = ExampleFormat {
            total_chars: 150,
            ..ExampleFormat::default()
        };
        let big = StepExample {
            observation: "x".repeat(400),
            ..example("answer:big")
        };
        let out = format_examples(&[big, example("answer:3")], &format);
        assert!(!out.contains("answer:big"));
        assert!(out.contains("answer:3"));
        assert!(out.ends_with("(1 examples omitted)"));
    }

    #[test]
    fn test_format_examples_budget_counts_separators() {
        let one = format_examples(&[example("answer:1")], &ExampleFormat::default());
        let size = one.chars().count();
        let pair = [example("answer:1"), example("answer:2")];

        let tight = ExampleFormat {
            total_chars: 2 * size + 1,
            ..ExampleFormat::default()
        };
        let out = format_examples(&pair, &tight);
        assert!(!out.contains("answer:2"));
        assert!(out.ends_with("(1 examples omitted)"));

        let exact = ExampleFormat {
            total_chars: 2 * size + 2,
            ..ExampleFormat::default()
        };
        let out = format_examples(&pair, &exact);
        assert_eq!(out.chars().count(), 2 * size + 2);
    }

    #[test]
    fn test_format_examples_empty() {
        assert_eq!(
            format_examples(&[], &ExampleFormat::default()),
            "(no examples available)"
        );
    }
}
