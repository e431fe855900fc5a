//! Loading the criteria and result sources from disk.
//!
//! The criteria source is YAML (JSON is accepted too, being a YAML subset).
//! It is either a project spec with the thresholds under
//! `acceptance.backtest`, or a bare mapping of name to expression.

use std::io::ErrorKind;
use std::path::Path;

use serde_yaml::Value as YamlValue;
use tracing::debug;

use crate::{ArtifactError, CriteriaError, Criterion, MeasurementSet};

const ACCEPTANCE_KEY: &str = "acceptance";
const BACKTEST_KEY: &str = "backtest";

/// Parse criteria from the contents of a criteria source, keeping
/// declaration order.
pub fn parse_criteria(content: &str) -> Result<Vec<Criterion>, CriteriaError> {
    let doc: YamlValue =
        serde_yaml::from_str(content).map_err(|e| CriteriaError::Parse(e.to_string()))?;

    let mapping = match doc.get(ACCEPTANCE_KEY) {
        Some(acceptance) => acceptance.get(BACKTEST_KEY).ok_or_else(|| {
            CriteriaError::MissingSection(format!("{}.{}", ACCEPTANCE_KEY, BACKTEST_KEY))
        })?,
        None => &doc,
    };

    let mapping = match mapping {
        YamlValue::Mapping(m) => m,
        YamlValue::Null => return Err(CriteriaError::Empty),
        other => {
            return Err(CriteriaError::Parse(format!(
                "expected a mapping of criteria, got {}",
                describe(other)
            )))
        }
    };

    let mut criteria = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let name = key
            .as_str()
            .ok_or_else(|| CriteriaError::InvalidName(describe(key)))?;
        let expr = value.as_str().ok_or_else(|| CriteriaError::NotAString {
            name: name.to_string(),
            found: describe(value),
        })?;
        criteria.push(Criterion::parse(name, expr)?);
    }

    if criteria.is_empty() {
        return Err(CriteriaError::Empty);
    }

    Ok(criteria)
}

/// Read and parse the criteria source at `path`.
pub fn load_criteria(path: &Path) -> Result<Vec<Criterion>, CriteriaError> {
    let content = std::fs::read_to_string(path).map_err(|source| CriteriaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let criteria = parse_criteria(&content)?;
    debug!(path = %path.display(), count = criteria.len(), "Loaded acceptance criteria");
    Ok(criteria)
}

/// Parse a result artifact. Numeric entries become measurements; anything
/// else (notes, labels) is ignored.
pub fn parse_measurements(content: &str) -> Result<MeasurementSet, String> {
    let value: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let object = value
        .as_object()
        .ok_or_else(|| "expected a JSON object".to_string())?;

    Ok(object
        .iter()
        .filter_map(|(name, v)| v.as_f64().map(|n| (name.clone(), n)))
        .collect())
}

/// Read the result artifact at `path`.
pub fn load_measurements(path: &Path) -> Result<MeasurementSet, ArtifactError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ArtifactError::Missing(path.to_path_buf()))
        }
        Err(source) => {
            return Err(ArtifactError::Unreadable {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let measurements =
        parse_measurements(&content).map_err(|message| ArtifactError::Malformed {
            path: path.to_path_buf(),
            message,
        })?;
    debug!(path = %path.display(), count = measurements.len(), "Loaded measurements");
    Ok(measurements)
}

fn describe(value: &YamlValue) -> String {
    match value {
        YamlValue::Null => "null".to_string(),
        YamlValue::Bool(b) => b.to_string(),
        YamlValue::Number(n) => n.to_string(),
        YamlValue::String(s) => format!("\"{}\"", s),
        YamlValue::Sequence(_) => "a list".to_string(),
        YamlValue::Mapping(_) => "a mapping".to_string(),
        YamlValue::Tagged(_) => "a tagged value".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Operator;

    #[test]
    fn test_parse_project_spec_section() {
        let yaml = r#"
project: eth-breakout
acceptance:
  backtest:
    sample_out_winrate: ">=0.55"
    mae_limit: "<=0.01"
    trades_per_day: "<=10"
"#;
        let criteria = parse_criteria(yaml).unwrap();
        let names: Vec<&str> = criteria.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["sample_out_winrate", "mae_limit", "trades_per_day"]);
        assert_eq!(criteria[1].operator, Operator::LessEq);
    }

    #[test]
    fn test_parse_bare_json_mapping() {
        let json = r#"{"winrate": ">=0.6", "mae_limit": "<=0.05"}"#;
        let criteria = parse_criteria(json).unwrap();
        assert_eq!(criteria.len(), 2);
        assert_eq!(criteria[0].name, "winrate");
    }

    #[test]
    fn test_missing_backtest_section() {
        let yaml = "acceptance:\n  unit: {}\n";
        let err = parse_criteria(yaml).unwrap_err();
        assert!(matches!(err, CriteriaError::MissingSection(_)));
    }

    #[test]
    fn test_numeric_expression_is_rejected() {
        let err = parse_criteria("winrate: 0.6\n").unwrap_err();
        assert!(matches!(err, CriteriaError::NotAString { .. }));
    }

    #[test]
    fn test_empty_criteria_are_rejected() {
        assert!(matches!(parse_criteria("").unwrap_err(), CriteriaError::Empty));
        assert!(matches!(parse_criteria("{}").unwrap_err(), CriteriaError::Empty));
    }

    #[test]
    fn test_unsupported_operator_propagates() {
        let err = parse_criteria("winrate: \">0.6\"\n").unwrap_err();
        assert!(matches!(err, CriteriaError::UnsupportedOperator { .. }));
    }

    #[test]
    fn test_measurements_skip_non_numeric_entries() {
        let json = r#"{"winrate": 0.72, "trades_per_day": 4, "notes": "simulated"}"#;
        let m = parse_measurements(json).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.get("winrate"), Some(0.72));
        assert_eq!(m.get("trades_per_day"), Some(4.0));
        assert_eq!(m.get("notes"), None);
    }

    #[test]
    fn test_load_measurements_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_measurements(&dir.path().join("latest.json")).unwrap_err();
        assert!(matches!(err, ArtifactError::Missing(_)));
    }

    #[test]
    fn test_load_measurements_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        let err = load_measurements(&path).unwrap_err();
        assert!(matches!(err, ArtifactError::Malformed { .. }));
    }
}
