//! Prompts sent to the planner and generator agents.

const CHANGE_SET_SHAPE: &str = r#"{
  "repo": "<repository name>",
  "branch": "<new branch name>",
  "plan": "<one paragraph summary of the approach>",
  "changes": [
    {"file": "<path>", "action": "add|modify|delete", "content": "<full new file content>"}
  ],
  "commands": ["<command that runs the backtest>"],
  "pr": {"title": "<pull request title>", "body": "<pull request description>"}
}"#;

pub fn build_plan_prompt(task: &str) -> String {
    format!(
        r#"You are planning a change to a trading strategy repository.

## Task
{task}

## Instructions
Write a short, numbered implementation plan. Name the files to touch, the
logic to add or change, and how the backtest will be run to produce the
metrics the task cares about. Do not write code. Output only the plan."#
    )
}

/// Prompt for one generation attempt. `feedback` is the correction text from
/// the previous failing gate, if any.
pub fn build_generation_prompt(task: &str, plan: &str, feedback: Option<&str>) -> String {
    let mut prompt = format!(
        r#"You are implementing a change to a trading strategy repository.

## Task
{task}

## Plan
{plan}
"#
    );

    if let Some(feedback) = feedback {
        prompt.push_str(&format!(
            r#"
## Previous attempt
{feedback}
"#
        ));
    }

    prompt.push_str(&format!(
        r#"
## Output format
Respond with a single JSON object in a ```json fence, matching this shape:

{CHANGE_SET_SHAPE}

Every field is required. `action` must be one of add, modify or delete.
Do not include any other JSON in your response."#
    ));

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_prompt_contains_task() {
        assert!(build_plan_prompt("raise winrate").contains("raise winrate"));
    }

    #[test]
    fn test_generation_prompt_without_feedback() {
        let prompt = build_generation_prompt("task", "1. do it", None);
        assert!(prompt.contains("1. do it"));
        assert!(!prompt.contains("## Previous attempt"));
        assert!(prompt.contains("\"commands\""));
    }

    #[test]
    fn test_generation_prompt_with_feedback() {
        let prompt = build_generation_prompt("task", "plan", Some("- winrate too low"));
        assert!(prompt.contains("## Previous attempt\n- winrate too low"));
    }
}
