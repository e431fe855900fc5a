//! Project spec initialization from a template.
//!
//! Copies `<templates_dir>/<name>/template.yaml` to the project spec path.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use dialoguer::Confirm;
use std::fs;
use std::path::{Path, PathBuf};

const TEMPLATE_FILE: &str = "template.yaml";

/// Names of the template directories that contain a template file, sorted
pub fn available_templates(templates_dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(templates_dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().join(TEMPLATE_FILE).is_file())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

fn template_path(templates_dir: &Path, name: &str) -> Result<PathBuf> {
    let path = templates_dir.join(name).join(TEMPLATE_FILE);
    if path.is_file() {
        return Ok(path);
    }

    let available = available_templates(templates_dir);
    if available.is_empty() {
        bail!(
            "Template '{}' not found at {} (no templates in {})",
            name,
            path.display(),
            templates_dir.display()
        );
    }
    bail!(
        "Template '{}' not found at {}\nAvailable templates: {}",
        name,
        path.display(),
        available.join(", ")
    )
}

/// Copy the template to `target`. Asks before overwriting unless `force`.
///
/// Returns `false` when the user declined to overwrite.
pub fn handle_init(templates_dir: &Path, name: &str, target: &Path, force: bool) -> Result<bool> {
    let source = template_path(templates_dir, name)?;

    if target.exists() && !force {
        eprintln!(
            "{} {} already exists",
            "⚠".bright_yellow(),
            target.display()
        );
        let overwrite = Confirm::new()
            .with_prompt("Overwrite it?")
            .default(false)
            .interact()?;
        if !overwrite {
            eprintln!("{}", "Initialization cancelled.".dimmed());
            return Ok(false);
        }
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::copy(&source, target).with_context(|| {
        format!(
            "Failed to copy {} to {}",
            source.display(),
            target.display()
        )
    })?;

    eprintln!(
        "{} {} initialized from template '{}'",
        "✓".bright_green(),
        target.display(),
        name.bright_cyan()
    );
    eprintln!(
        "Next: fill in your .env file and run {}",
        "vibeloop run --task \"Your first task\"".bright_cyan()
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn templates() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in ["eth_breakout", "app_saas"] {
            fs::create_dir_all(dir.path().join(name)).unwrap();
            fs::write(
                dir.path().join(name).join(TEMPLATE_FILE),
                format!("strategy: {}\n", name),
            )
            .unwrap();
        }
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        dir
    }

    #[test]
    fn test_available_templates_sorted_and_filtered() {
        let dir = templates();
        assert_eq!(available_templates(dir.path()), vec!["app_saas", "eth_breakout"]);
        assert!(available_templates(&dir.path().join("missing")).is_empty());
    }

    #[test]
    fn test_copies_template() {
        let dir = templates();
        let target = dir.path().join("out/specs/ProjectSpec.yaml");

        assert!(handle_init(dir.path(), "eth_breakout", &target, false).unwrap());
        assert_eq!(fs::read_to_string(&target).unwrap(), "strategy: eth_breakout\n");
    }

    #[test]
    fn test_force_overwrites_without_prompt() {
        let dir = templates();
        let target = dir.path().join("ProjectSpec.yaml");
        fs::write(&target, "old").unwrap();

        assert!(handle_init(dir.path(), "app_saas", &target, true).unwrap());
        assert_eq!(fs::read_to_string(&target).unwrap(), "strategy: app_saas\n");
    }

    #[test]
    fn test_unknown_template_lists_available() {
        let dir = templates();
        let err = handle_init(dir.path(), "nope", &dir.path().join("x.yaml"), false).unwrap_err();
        assert!(err.to_string().contains("app_saas, eth_breakout"));
    }
}
