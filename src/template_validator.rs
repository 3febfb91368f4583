use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use tera::Tera;

/// Maximum template file size (1MB)
const MAX_TEMPLATE_SIZE: u64 = 1024 * 1024;

/// Variables a prompt template has to use, or the model gets nothing to analyse.
const REQUIRED_VARIABLES: &[&str] = &["files", "requirements"];

/// Variables worth mentioning when absent.
const OPTIONAL_VARIABLES: &[&str] = &["repository", "stats", "directories", "include_diagrams"];

/// Validates user-supplied prompt templates.
pub(crate) struct TemplateValidator;

impl TemplateValidator {
    /// Checks that the file exists, fits the size limit, compiles, and
    /// references the required variables.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file is missing or unreadable, and a
    /// template error for any other failed check.
    pub(crate) fn validate_template(path: &Path) -> Result<()> {
        let name = path.display().to_string();

        let metadata = fs::metadata(path).map_err(|e| Error::io(path, e))?;
        if !metadata.is_file() {
            return Err(Error::template_validation(name, "Path is not a file"));
        }

        if metadata.len() > MAX_TEMPLATE_SIZE {
            return Err(Error::template_validation(
                name,
                format!(
                    "Template file too large: {} bytes (max: {MAX_TEMPLATE_SIZE} bytes)",
                    metadata.len()
                ),
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        if content.trim().is_empty() {
            return Err(Error::template_validation(name, "Template file is empty"));
        }

        Tera::default()
            .add_raw_template("validation", &content)
            .map_err(|e| Error::template_validation(&name, format!("Template syntax error: {e}")))?;

        let missing: Vec<&str> = REQUIRED_VARIABLES
            .iter()
            .copied()
            .filter(|var| !references(&content, var))
            .collect();

        if !missing.is_empty() {
            return Err(Error::template_validation(
                name,
                format!(
                    "Template is missing required variables: {}",
                    missing.join(", ")
                ),
            ));
        }

        for var in OPTIONAL_VARIABLES {
            if !references(&content, var) {
                tracing::debug!("Template does not use optional variable: {var}");
            }
        }

        Ok(())
    }
}

/// Heuristic: `{{ var`, `{{var`, `in var` or `var.` / `var |` inside a tag.
fn references(content: &str, var: &str) -> bool {
    [
        format!("{{{{ {var}"),
        format!("{{{{{var}"),
        format!("in {var}"),
        format!("{var}."),
        format!("{var} |"),
        format!("{var}|"),
        format!("if {var}"),
    ]
    .iter()
    .any(|pattern| content.contains(pattern.as_str()))
}
