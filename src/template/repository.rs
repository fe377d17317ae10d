//! Template persistence.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::schema::{parse_version, validate_id, Template, TemplateDefinition, INITIAL_VERSION};
use super::variables::validate_source;
use crate::error::TemplateError;

/// Stores templates by id.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Template, TemplateError>;

    /// All templates, ordered by id.
    async fn list(&self) -> Result<Vec<Template>, TemplateError>;

    /// Fails with `DuplicateId` if `template.id` exists.
    async fn create(&self, template: &Template) -> Result<(), TemplateError>;

    /// Replaces an existing template; `NotFound` if absent.
    async fn update(&self, template: &Template) -> Result<(), TemplateError>;

    /// `NotFound` if absent.
    async fn delete(&self, id: &str) -> Result<(), TemplateError>;

    async fn exists(&self, id: &str) -> Result<bool, TemplateError>;
}

/// In-process template store.
#[derive(Debug, Default)]
pub struct MemoryTemplateRepository {
    templates: RwLock<HashMap<String, Template>>,
}

impl MemoryTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.templates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads every `.yaml`/`.yml` template definition under `dir`, recursively.
    ///
    /// Each definition is validated (id, version and a dry compile of its
    /// source) before it is stored. Returns the number of templates loaded.
    pub fn load_yaml_dir<P: AsRef<Path>>(&self, dir: P) -> Result<usize, TemplateError> {
        let dir = dir.as_ref();
        let mut count = 0;

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| TemplateError::ParseError {
                path: dir.display().to_string(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            let is_yaml = entry.file_type().is_file()
                && path
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false);
            if !is_yaml {
                continue;
            }

            let template = load_definition(path)?;
            let mut templates = self.templates.write().unwrap_or_else(|e| e.into_inner());
            if templates.contains_key(&template.id) {
                return Err(TemplateError::DuplicateId(template.id));
            }
            debug!(template_id = %template.id, path = %path.display(), "Loaded template definition");
            templates.insert(template.id.clone(), template);
            count += 1;
        }

        info!(dir = %dir.display(), count, "Loaded template definitions");
        Ok(count)
    }
}

fn load_definition(path: &Path) -> Result<Template, TemplateError> {
    let raw = fs::read_to_string(path)?;
    let definition: TemplateDefinition =
        serde_yaml::from_str(&raw).map_err(|e| TemplateError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    validate_id(&definition.id)?;
    let version = definition
        .version
        .clone()
        .unwrap_or_else(|| INITIAL_VERSION.to_string());
    parse_version(&version)?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let content = definition.resolve_content(base_dir)?;
    let validation = validate_source(&content);
    if !validation.valid {
        return Err(TemplateError::Invalid {
            id: definition.id,
            errors: validation.errors,
        });
    }

    let now = Utc::now();
    Ok(Template {
        id: definition.id,
        name: definition.name,
        description: definition.description,
        report_type: definition.report_type,
        content,
        version,
        placeholders: validation.placeholders,
        created_at: now,
        updated_at: now,
    })
}

#[async_trait]
impl TemplateRepository for MemoryTemplateRepository {
    async fn get(&self, id: &str) -> Result<Template, TemplateError> {
        self.templates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<Template>, TemplateError> {
        let mut templates: Vec<Template> = self
            .templates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        templates.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(templates)
    }

    async fn create(&self, template: &Template) -> Result<(), TemplateError> {
        let mut templates = self.templates.write().unwrap_or_else(|e| e.into_inner());
        if templates.contains_key(&template.id) {
            return Err(TemplateError::DuplicateId(template.id.clone()));
        }
        templates.insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn update(&self, template: &Template) -> Result<(), TemplateError> {
        let mut templates = self.templates.write().unwrap_or_else(|e| e.into_inner());
        match templates.get_mut(&template.id) {
            Some(existing) => {
                *existing = template.clone();
                Ok(())
            }
            None => Err(TemplateError::NotFound(template.id.clone())),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), TemplateError> {
        self.templates
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    async fn exists(&self, id: &str) -> Result<bool, TemplateError> {
        Ok(self
            .templates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id))
    }
}
