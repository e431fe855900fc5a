//! The structured change set produced by the generator agent.

use std::sync::LazyLock;

use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CHANGE_SET_SCHEMA: &str = include_str!("../schemas/change_set.schema.json");

/// Compiled once per process; the schema is embedded at build time.
static VALIDATOR: LazyLock<Result<Validator, String>> = LazyLock::new(|| {
    let schema: serde_json::Value =
        serde_json::from_str(CHANGE_SET_SCHEMA).map_err(|e| e.to_string())?;
    jsonschema::validator_for(&schema).map_err(|e| e.to_string())
});

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChangeSetError {
    #[error("no JSON object found in generator output")]
    NoJson,

    #[error("generator output is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("change set failed schema validation at '{field}': {message}")]
    Schema { field: String, message: String },

    #[error("change set schema could not be compiled: {0}")]
    BadSchema(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Add,
    Modify,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub file: String,
    pub action: ChangeAction,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub title: String,
    pub body: String,
}

/// Repository changes plus the commands that produce the backtest results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub repo: String,
    pub branch: String,
    #[serde(default)]
    pub plan: String,
    pub changes: Vec<Change>,
    pub commands: Vec<String>,
    pub pr: PullRequest,
}

impl ChangeSet {
    /// Extract, validate and deserialize a change set from raw agent output.
    ///
    /// The output may wrap the object in a ```json fence or surround it with
    /// prose. Schema violations report the JSON pointer of the first failing
    /// field.
    pub fn from_agent_output(raw: &str) -> Result<Self, ChangeSetError> {
        let value = extract_json(raw)?;

        validate(&value)?;

        serde_json::from_value(value).map_err(|e| ChangeSetError::InvalidJson(e.to_string()))
    }

    pub fn files_changed(&self) -> usize {
        self.changes.len()
    }
}

fn validate(value: &serde_json::Value) -> Result<(), ChangeSetError> {
    let validator = VALIDATOR
        .as_ref()
        .map_err(|e| ChangeSetError::BadSchema(e.clone()))?;

    if let Some(error) = validator.iter_errors(value).next() {
        let path = error.instance_path().to_string();
        return Err(ChangeSetError::Schema {
            field: if path.is_empty() { "/".to_string() } else { path },
            message: error.to_string(),
        });
    }
    Ok(())
}

/// The first JSON object in the output.
///
/// A non-empty ```json fence wins. Otherwise every `{` is tried in order and
/// the first one that starts a complete object is taken, so braces in the
/// surrounding prose are skipped. When nothing parses, the error from the
/// first candidate is reported.
fn extract_json(raw: &str) -> Result<serde_json::Value, ChangeSetError> {
    if let Some(start) = raw.find("```json") {
        let body = &raw[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            let fenced = body[..end].trim();
            if !fenced.is_empty() {
                return serde_json::from_str(fenced)
                    .map_err(|e| ChangeSetError::InvalidJson(e.to_string()));
            }
        }
    }

    let mut first_error = None;
    for (start, _) in raw.match_indices('{') {
        let mut stream =
            serde_json::Deserializer::from_str(&raw[start..]).into_iter::<serde_json::Value>();
        match stream.next() {
            Some(Ok(value)) if value.is_object() => return Ok(value),
            Some(Err(e)) if first_error.is_none() => first_error = Some(e.to_string()),
            _ => {}
        }
    }

    Err(first_error.map_or(ChangeSetError::NoJson, ChangeSetError::InvalidJson))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_json() -> &'static str {
        r#"{
            "repo": "quant/strategies",
            "branch": "feat/breakout-filter",
            "plan": "Add a volume filter",
            "changes": [
                {"file": "strategies/breakout.py", "action": "modify", "content": "..."},
                {"file": "tests/test_breakout.py", "action": "add"}
            ],
            "commands": ["make backtest"],
            "pr": {"title": "Add volume filter", "body": "Raises winrate"}
        }"#
    }

    #[test]
    fn test_parses_bare_object() {
        let cs = ChangeSet::from_agent_output(valid_json()).unwrap();
        assert_eq!(cs.branch, "feat/breakout-filter");
        assert_eq!(cs.files_changed(), 2);
        assert_eq!(cs.changes[0].action, ChangeAction::Modify);
        assert_eq!(cs.changes[1].content, "");
    }

    #[test]
    fn test_parses_fenced_output_with_prose() {
        let raw = format!(
            "Here is the change set:\n```json\n{}\n```\nLet me know!",
            valid_json()
        );
        let cs = ChangeSet::from_agent_output(&raw).unwrap();
        assert_eq!(cs.pr.title, "Add volume filter");
    }

    #[test]
    fn test_parses_object_inside_prose() {
        let raw = format!("Sure. {} Done.", valid_json());
        assert!(ChangeSet::from_agent_output(&raw).is_ok());
    }

    #[test]
    fn test_skips_brace_in_prose_after_object() {
        let raw = format!(
            "Here is the change set: {} Remember to use {{placeholders}} in templates.",
            valid_json()
        );
        let cs = ChangeSet::from_agent_output(&raw).unwrap();
        assert_eq!(cs.repo, "quant/strategies");
    }

    #[test]
    fn test_skips_brace_in_prose_before_object() {
        let raw = format!("I updated the {{config}} handling.\n{}", valid_json());
        let cs = ChangeSet::from_agent_output(&raw).unwrap();
        assert_eq!(cs.files_changed(), 2);
    }

    #[test]
    fn test_takes_first_of_two_objects() {
        let raw = format!("{}\n{{\"repo\": \"other\"}}", valid_json());
        let cs = ChangeSet::from_agent_output(&raw).unwrap();
        assert_eq!(cs.repo, "quant/strategies");
    }

    #[test]
    fn test_no_json() {
        assert_eq!(
            ChangeSet::from_agent_output("I could not produce a change set."),
            Err(ChangeSetError::NoJson)
        );
    }

    #[test]
    fn test_malformed_json() {
        let err = ChangeSet::from_agent_output("{\"repo\": \"a\",}").unwrap_err();
        assert!(matches!(err, ChangeSetError::InvalidJson(_)));
    }

    #[test]
    fn test_schema_error_names_field() {
        let raw = valid_json().replace("\"modify\"", "\"rename\"");
        match ChangeSet::from_agent_output(&raw).unwrap_err() {
            ChangeSetError::Schema { field, .. } => assert_eq!(field, "/changes/0/action"),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_branch_rejected() {
        let raw = valid_json().replace("\"feat/breakout-filter\"", "\"\"");
        match ChangeSet::from_agent_output(&raw).unwrap_err() {
            ChangeSetError::Schema { field, .. } => assert_eq!(field, "/branch"),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_field_reported_at_root() {
        let err = ChangeSet::from_agent_output(r#"{"repo": "r", "branch": "b"}"#).unwrap_err();
        match err {
            ChangeSetError::Schema { field, message } => {
                assert_eq!(field, "/");
                assert!(message.contains("required"));
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }
}
