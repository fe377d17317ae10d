//! Template engine: registration, compiled cache and rendering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tera::Tera;
use tracing::{debug, info};

use super::charts::{render_charts, ChartImages, ChartRenderer};
use super::convert::{ConverterRegistry, FormatConverter};
use super::defaults::default_templates;
use super::repository::TemplateRepository;
use super::schema::{bump_patch, cache_key, validate_id, NewTemplate, Template, INITIAL_VERSION};
use super::types::{RenderRequest, RenderResult};
use super::variables::{error_chain, validate_source, TemplateValidation, TEMPLATE_NAME};
use crate::error::TemplateError;
use crate::metrics::MetricsCollector;

/// Compiled-cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub compilations: u64,
    pub entries: usize,
}

/// Compiles, caches and renders report templates.
///
/// Compiled templates are cached by `id:version`. Any update or delete
/// evicts every cached entry of that template id.
pub struct TemplateEngine {
    repository: Arc<dyn TemplateRepository>,
    compiled: RwLock<HashMap<String, Arc<Tera>>>,
    chart_renderer: Option<Arc<dyn ChartRenderer>>,
    converters: ConverterRegistry,
    chart_timeout: Duration,
    chart_group_timeout: Duration,
    metrics: MetricsCollector,
    hits: AtomicU64,
    misses: AtomicU64,
    compilations: AtomicU64,
}

impl TemplateEngine {
    pub fn new(repository: Arc<dyn TemplateRepository>) -> Self {
        Self {
            repository,
            compiled: RwLock::new(HashMap::new()),
            chart_renderer: None,
            converters: ConverterRegistry::new(),
            chart_timeout: Duration::from_secs(10),
            chart_group_timeout: Duration::from_secs(30),
            metrics: MetricsCollector::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            compilations: AtomicU64::new(0),
        }
    }

    pub fn with_chart_renderer(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.chart_renderer = Some(renderer);
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn FormatConverter>) -> Self {
        self.converters.register(converter);
        self
    }

    pub fn with_chart_timeouts(mut self, per_chart: Duration, group: Duration) -> Self {
        self.chart_timeout = per_chart;
        self.chart_group_timeout = group;
        self
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    /// Dry-compiles `content` without touching the repository or cache.
    pub fn validate(&self, content: &str) -> TemplateValidation {
        validate_source(content)
    }

    /// Validates and stores a new template at version `1.0.0`.
    pub async fn register(&self, new: NewTemplate) -> Result<Template, TemplateError> {
        validate_id(&new.id)?;
        let validation = validate_source(&new.content);
        if !validation.valid {
            return Err(TemplateError::Invalid {
                id: new.id,
                errors: validation.errors,
            });
        }
        if self.repository.exists(&new.id).await? {
            return Err(TemplateError::DuplicateId(new.id));
        }

        let now = Utc::now();
        let template = Template {
            id: new.id,
            name: new.name,
            description: new.description,
            report_type: new.report_type,
            content: new.content,
            version: INITIAL_VERSION.to_string(),
            placeholders: validation.placeholders,
            created_at: now,
            updated_at: now,
        };
        self.repository.create(&template).await?;
        info!(template_id = %template.id, version = %template.version, "Template registered");
        Ok(template)
    }

    /// Replaces a template's content, bumping its patch version.
    pub async fn update(&self, id: &str, content: &str) -> Result<Template, TemplateError> {
        let validation = validate_source(content);
        if !validation.valid {
            return Err(TemplateError::Invalid {
                id: id.to_string(),
                errors: validation.errors,
            });
        }

        let current = self.repository.get(id).await?;
        let template = Template {
            content: content.to_string(),
            version: bump_patch(&current.version)?,
            placeholders: validation.placeholders,
            updated_at: Utc::now(),
            ..current
        };
        self.repository.update(&template).await?;
        self.evict(id);
        info!(template_id = %id, version = %template.version, "Template updated");
        Ok(template)
    }

    pub async fn delete(&self, id: &str) -> Result<(), TemplateError> {
        self.repository.delete(id).await?;
        self.evict(id);
        info!(template_id = %id, "Template deleted");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Template, TemplateError> {
        self.repository.get(id).await
    }

    pub async fn list(&self) -> Result<Vec<Template>, TemplateError> {
        self.repository.list().await
    }

    /// Registers the built-in family templates that are not present yet.
    ///
    /// Returns the ids that were installed.
    pub async fn install_defaults(&self) -> Result<Vec<String>, TemplateError> {
        let mut installed = Vec::new();
        for template in default_templates() {
            if self.repository.exists(&template.id).await? {
                continue;
            }
            installed.push(self.register(template).await?.id);
        }
        Ok(installed)
    }

    /// Renders `request` to bytes in the requested format.
    ///
    /// Chart failures become warnings; template, binding and conversion
    /// failures are errors.
    pub async fn render(&self, request: RenderRequest) -> Result<RenderResult, TemplateError> {
        let started = Instant::now();
        let template = self.repository.get(&request.template_id).await?;
        if !self.converters.supports(request.format) {
            return Err(TemplateError::UnsupportedFormat(request.format.to_string()));
        }
        let compiled = self.compiled(&template)?;

        let charts = match (&self.chart_renderer, request.options.include_charts) {
            (Some(renderer), true) => {
                render_charts(
                    Arc::clone(renderer),
                    request.payload.charts(),
                    self.chart_timeout,
                    self.chart_group_timeout,
                )
                .await
            }
            _ => ChartImages::default(),
        };
        self.metrics.record_chart_fallbacks(charts.fallbacks);

        let context = request.payload.to_context(&charts.images, &request.options)?;
        let html = compiled
            .render(TEMPLATE_NAME, &context)
            .map_err(|e| TemplateError::RenderFailed {
                id: template.id.clone(),
                message: error_chain(&e),
            })?;

        let content = self
            .converters
            .convert(html, request.format, &request.options)
            .await?;

        let duration = started.elapsed();
        self.metrics.record_render(request.format, duration);
        debug!(
            template_id = %template.id,
            version = %template.version,
            format = %request.format,
            bytes = content.len(),
            duration_ms = duration.as_millis() as u64,
            "Template rendered"
        );

        Ok(RenderResult {
            content,
            content_type: request.format.content_type().to_string(),
            format: request.format,
            template_id: template.id,
            template_version: template.version,
            duration,
            warnings: charts.warnings,
        })
    }

    /// Cache statistics since construction.
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            compilations: self.compilations.load(Ordering::Relaxed),
            entries: self.compiled.read().unwrap_or_else(|e| e.into_inner()).len(),
        }
    }

    /// Whether the compiled form of `id` at `version` is cached.
    pub fn is_cached(&self, id: &str, version: &str) -> bool {
        self.compiled
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&cache_key(id, version))
    }

    fn compiled(&self, template: &Template) -> Result<Arc<Tera>, TemplateError> {
        let key = template.cache_key();
        if let Some(tera) = self
            .compiled
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.metrics.record_template_cache(true);
            return Ok(Arc::clone(tera));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_template_cache(false);

        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, &template.content)
            .map_err(|e| TemplateError::Invalid {
                id: template.id.clone(),
                errors: vec![error_chain(&e)],
            })?;
        self.compilations.fetch_add(1, Ordering::Relaxed);
        let tera = Arc::new(tera);

        let mut compiled = self.compiled.write().unwrap_or_else(|e| e.into_inner());
        // Drop entries of older versions of the same template.
        let prefix = format!("{}:", template.id);
        compiled.retain(|k, _| !k.starts_with(&prefix));
        compiled.insert(key, Arc::clone(&tera));
        Ok(tera)
    }

    fn evict(&self, id: &str) {
        let prefix = format!("{}:", id);
        let mut compiled = self.compiled.write().unwrap_or_else(|e| e.into_inner());
        let before = compiled.len();
        compiled.retain(|k, _| !k.starts_with(&prefix));
        let evicted = before - compiled.len();
        if evicted > 0 {
            debug!(template_id = %id, evicted, "Evicted compiled templates");
        }
    }
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("charts", &self.chart_renderer.is_some())
            .field("converters", &self.converters)
            .field("cache", &self.cache_stats())
            .finish()
    }
}
