//! Report template records and their YAML definition form.

use std::path::Path;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::TemplateError;
use crate::types::ReportType;

/// Version assigned to newly registered templates.
pub const INITIAL_VERSION: &str = "1.0.0";

/// A stored report template.
///
/// `content` is a Tera (Jinja2-style) HTML source. Every content update
/// bumps `version`; the engine's compiled cache is keyed by `id:version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Report family this template is intended for, if any.
    #[serde(default)]
    pub report_type: Option<ReportType>,
    pub content: String,
    pub version: String,
    /// Root variable names referenced by `content`.
    #[serde(default)]
    pub placeholders: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    /// Key of the compiled form of this template in the engine cache.
    pub fn cache_key(&self) -> String {
        cache_key(&self.id, &self.version)
    }
}

pub(crate) fn cache_key(id: &str, version: &str) -> String {
    format!("{}:{}", id, version)
}

/// Input for registering a new template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub report_type: Option<ReportType>,
    pub content: String,
}

impl NewTemplate {
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            report_type: None,
            content: content.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_report_type(mut self, report_type: ReportType) -> Self {
        self.report_type = Some(report_type);
        self
    }
}

/// On-disk YAML form of a template.
///
/// The source is either inline (`content`) or a file next to the YAML
/// (`content_file`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub report_type: Option<ReportType>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_file: Option<String>,
}

impl TemplateDefinition {
    /// Resolves the template source relative to the definition file's directory.
    pub fn resolve_content(&self, base_dir: &Path) -> Result<String, TemplateError> {
        match (&self.content, &self.content_file) {
            (Some(content), None) => Ok(content.clone()),
            (None, Some(file)) => Ok(std::fs::read_to_string(base_dir.join(file))?),
            (Some(_), Some(_)) => Err(TemplateError::Invalid {
                id: self.id.clone(),
                errors: vec!["set either 'content' or 'content_file', not both".to_string()],
            }),
            (None, None) => Err(TemplateError::Invalid {
                id: self.id.clone(),
                errors: vec!["one of 'content' or 'content_file' is required".to_string()],
            }),
        }
    }
}

/// Checks a template ID: non-empty, alphanumeric plus `-` and `_`.
pub fn validate_id(id: &str) -> Result<(), TemplateError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(TemplateError::InvalidId(id.to_string()))
    }
}

/// Parses a semantic version string.
pub fn parse_version(version: &str) -> Result<Version, TemplateError> {
    Version::parse(version).map_err(|_| TemplateError::InvalidVersion(version.to_string()))
}

/// Returns `version` with its patch component incremented.
pub fn bump_patch(version: &str) -> Result<String, TemplateError> {
    let current = parse_version(version)?;
    Ok(Version::new(current.major, current.minor, current.patch + 1).to_string())
}
