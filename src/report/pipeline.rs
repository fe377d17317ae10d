//! Shared generation pipeline.
//!
//! Every report family funnels into [`generate`], which picks the execution
//! mode, records the initial metadata and then runs the same phases either
//! inline or on a detached task:
//!
//! 1. acquire the single-flight lock for the target
//! 2. collect data and compute metrics (family-specific [`ReportBuilder`])
//! 3. render through the template engine
//! 4. persist the artifact under `reports/<family>/<id>.<FORMAT>`
//! 5. mark completed, publish the event, enforce retention, release the lock
//!
//! Failures in steps 1-4 mark the report failed and publish a failure event.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant as StdInstant;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::context::GenerationContext;
use super::execution::ExecutionPlan;
use super::retention::RetentionEnforcer;
use super::status::StatusProjection;
use super::tasks::{CancelToken, TaskDispatcher};
use crate::cache::{Cache, MemoryCache, RedisCache};
use crate::config::ReportingConfig;
use crate::error::ReportError;
use crate::events::{EventPublisher, LogEventPublisher, RedisEventPublisher, ReportEvent};
use crate::lock::{with_lock, DistributedLock, MemoryLock, RedisLock};
use crate::metrics::MetricsCollector;
use crate::repository::{MemoryReportRepository, PgReportRepository, ReportRepository};
use crate::storage::{artifact_key, FsObjectStorage, MemoryObjectStorage, ObjectStorage};
use crate::template::{
    ChartRenderer, FormatConverter, MemoryTemplateRepository, RenderOptions, RenderRequest,
    ReportPayload, TemplateEngine, TemplateRepository,
};
use crate::types::{
    ExecutionMode, GenerateResponse, Language, ReportFormat, ReportMeta, ReportRollup,
    ReportStatus, ReportStatusInfo, ReportType, StatusUpdate,
};

/// Lock key of a generation target.
pub fn lock_key(report_type: ReportType, target: &str) -> String {
    format!("report-lock:{}:{}", report_type, target)
}

/// Everything the pipeline needs besides the family-specific builder.
pub struct ReportServices {
    pub config: ReportingConfig,
    pub repository: Arc<dyn ReportRepository>,
    pub storage: Arc<dyn ObjectStorage>,
    pub cache: Arc<dyn Cache>,
    pub lock: Arc<dyn DistributedLock>,
    pub events: Arc<dyn EventPublisher>,
    pub templates: Arc<TemplateEngine>,
    pub metrics: MetricsCollector,
    pub tasks: TaskDispatcher,
}

impl ReportServices {
    /// In-process backends for every store; replace them with the `with_*`
    /// setters.
    pub fn new(config: ReportingConfig, templates: Arc<TemplateEngine>) -> Self {
        let tasks = TaskDispatcher::new(config.max_async_generations);
        Self {
            config,
            repository: Arc::new(MemoryReportRepository::new()),
            storage: Arc::new(MemoryObjectStorage::new()),
            cache: Arc::new(MemoryCache::new()),
            lock: Arc::new(MemoryLock::new()),
            events: Arc::new(LogEventPublisher),
            templates,
            metrics: MetricsCollector::new(),
            tasks,
        }
    }

    /// In-process services with the built-in templates installed and no
    /// chart renderer or converters (HTML output only, no chart images).
    pub async fn in_memory(config: ReportingConfig) -> Result<Self, ReportError> {
        Self::in_memory_with(config, RenderPlugins::default()).await
    }

    /// Like [`in_memory`](Self::in_memory) with `plugins` wired into the
    /// template engine.
    pub async fn in_memory_with(
        config: ReportingConfig,
        plugins: RenderPlugins,
    ) -> Result<Self, ReportError> {
        let templates = plugins.build_engine(Arc::new(MemoryTemplateRepository::new()), &config);
        templates.install_defaults().await?;
        Ok(Self::new(config, Arc::new(templates)))
    }

    /// Builds services from configuration without render plugins.
    pub async fn connect(config: ReportingConfig) -> Result<Self, ReportError> {
        Self::connect_with(config, RenderPlugins::default()).await
    }

    /// Builds services from configuration.
    ///
    /// Redis backs the lock, cache and events when `redis_url` is set;
    /// PostgreSQL backs the repository when `database_url` is set (migrations
    /// run on connect); artifacts go to the filesystem under `storage_root`.
    /// Templates are seeded from `template_dir` plus the built-in defaults.
    pub async fn connect_with(
        config: ReportingConfig,
        plugins: RenderPlugins,
    ) -> Result<Self, ReportError> {
        let template_repo = Arc::new(MemoryTemplateRepository::new());
        if let Some(dir) = &config.template_dir {
            template_repo.load_yaml_dir(dir)?;
        }
        let templates = plugins.build_engine(template_repo, &config);
        templates.install_defaults().await?;

        let mut services = Self::new(config.clone(), Arc::new(templates))
            .with_storage(Arc::new(FsObjectStorage::new(config.storage_root.clone())));

        if let Some(url) = &config.redis_url {
            services = services
                .with_lock(Arc::new(RedisLock::connect(url).await?))
                .with_cache(Arc::new(RedisCache::connect(url).await?))
                .with_events(Arc::new(RedisEventPublisher::connect(url).await?));
        }

        if let Some(url) = &config.database_url {
            let repository = PgReportRepository::connect(url).await?;
            repository.run_migrations().await?;
            services = services.with_repository(Arc::new(repository));
        } else {
            warn!("No database URL configured; report metadata is kept in memory only");
        }

        Ok(services)
    }

    pub fn with_repository(mut self, repository: Arc<dyn ReportRepository>) -> Self {
        self.repository = repository;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_lock(mut self, lock: Arc<dyn DistributedLock>) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    pub fn status(&self) -> StatusProjection {
        StatusProjection::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.repository),
            self.config.status_ttl,
        )
    }

    pub fn retention(&self) -> RetentionEnforcer {
        RetentionEnforcer::new(
            Arc::clone(&self.repository),
            Arc::clone(&self.storage),
            self.status(),
        )
    }

    /// Fails with `Validation` if no converter produces `format`.
    pub fn ensure_format_supported(&self, format: ReportFormat) -> Result<(), ReportError> {
        if self.templates.converters().supports(format) {
            Ok(())
        } else {
            Err(ReportError::Validation(format!(
                "output format {} is not available: no converter registered",
                format
            )))
        }
    }
}

/// Chart renderer and format converters for the template engine.
///
/// Without a renderer charts are omitted; without converters only HTML can
/// be produced.
#[derive(Clone, Default)]
pub struct RenderPlugins {
    chart_renderer: Option<Arc<dyn ChartRenderer>>,
    converters: Vec<Arc<dyn FormatConverter>>,
}

impl RenderPlugins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chart_renderer(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.chart_renderer = Some(renderer);
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn FormatConverter>) -> Self {
        self.converters.push(converter);
        self
    }

    fn build_engine(
        self,
        repository: Arc<dyn TemplateRepository>,
        config: &ReportingConfig,
    ) -> TemplateEngine {
        let mut engine = TemplateEngine::new(repository)
            .with_chart_timeouts(config.chart_timeout, config.chart_group_timeout);
        if let Some(renderer) = self.chart_renderer {
            engine = engine.with_chart_renderer(renderer);
        }
        for converter in self.converters {
            engine = engine.with_converter(converter);
        }
        engine
    }
}

/// Fixed attributes of one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescriptor {
    pub report_type: ReportType,
    /// Entity the report is filed under for listing and retention.
    pub owner_id: String,
    pub requested_by: String,
    pub title: String,
    pub format: ReportFormat,
    pub language: Language,
    pub template_id: String,
    pub lock_key: String,
    /// Sizes of the target sets; their product is the complexity.
    pub target_sizes: Vec<usize>,
}

/// Output of the data-collection phase.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltReport {
    pub payload: ReportPayload,
    pub rollup: ReportRollup,
}

/// Family-specific data collection and metric computation.
#[async_trait]
pub trait ReportBuilder: Send + Sync {
    fn descriptor(&self) -> &JobDescriptor;

    async fn build(&self, ctx: &GenerationContext) -> Result<BuiltReport, ReportError>;
}

/// Starts a generation.
///
/// Above the async threshold the report is queued and the pipeline runs on
/// a detached task; the response carries an estimated duration. Otherwise
/// the pipeline runs inline and its error, if any, is returned.
pub async fn generate(
    services: &Arc<ReportServices>,
    builder: Arc<dyn ReportBuilder>,
    cancel: CancelToken,
) -> Result<GenerateResponse, ReportError> {
    let descriptor = builder.descriptor();
    let plan = ExecutionPlan::for_sizes(&descriptor.target_sizes, &services.config);
    let initial = match plan.mode {
        ExecutionMode::Async => ReportStatus::Queued,
        ExecutionMode::Sync => ReportStatus::Processing,
    };

    let meta = ReportMeta::new(
        descriptor.report_type,
        descriptor.owner_id.clone(),
        descriptor.requested_by.clone(),
        descriptor.title.clone(),
        descriptor.format,
        initial,
    );
    services.repository.create(&meta).await?;
    services
        .status()
        .write(&ReportStatusInfo::new(&meta.report_id, initial, 0))
        .await;

    info!(
        report_id = %meta.report_id,
        report_type = %descriptor.report_type,
        mode = %plan.mode,
        complexity = plan.complexity,
        "Report generation accepted"
    );

    match plan.mode {
        ExecutionMode::Async => {
            let report_id = meta.report_id.clone();
            let task_services = Arc::clone(services);
            services.metrics.async_generation_started();
            services.tasks.spawn(report_id.clone(), move |token| async move {
                let result =
                    run_pipeline(&task_services, builder, meta, ExecutionMode::Async, token).await;
                task_services.metrics.async_generation_finished();
                result
            });
            Ok(GenerateResponse {
                report_id,
                status: ReportStatus::Queued,
                mode: ExecutionMode::Async,
                complexity: plan.complexity,
                estimated_duration: Some(plan.estimated_duration),
                rollup: None,
            })
        }
        ExecutionMode::Sync => {
            let report_id = meta.report_id.clone();
            let rollup = run_pipeline(services, builder, meta, ExecutionMode::Sync, cancel).await?;
            Ok(GenerateResponse {
                report_id,
                status: ReportStatus::Completed,
                mode: ExecutionMode::Sync,
                complexity: plan.complexity,
                estimated_duration: None,
                rollup: Some(rollup),
            })
        }
    }
}

async fn run_pipeline(
    services: &ReportServices,
    builder: Arc<dyn ReportBuilder>,
    meta: ReportMeta,
    mode: ExecutionMode,
    cancel: CancelToken,
) -> Result<ReportRollup, ReportError> {
    let started = StdInstant::now();
    let descriptor = builder.descriptor();

    let result = with_lock(
        Arc::clone(&services.lock),
        &descriptor.lock_key,
        services.config.lock_ttl,
        execute(services, builder.as_ref(), &meta, cancel),
    )
    .await;

    let status = match &result {
        Ok(_) => ReportStatus::Completed,
        Err(e) => {
            if matches!(e, ReportError::Conflict(_)) {
                services.metrics.record_lock_conflict(descriptor.report_type);
            }
            fail(services, &meta, e).await;
            ReportStatus::Failed
        }
    };
    services
        .metrics
        .record_generation(descriptor.report_type, mode, status, started.elapsed());
    result
}

async fn execute(
    services: &ReportServices,
    builder: &dyn ReportBuilder,
    meta: &ReportMeta,
    cancel: CancelToken,
) -> Result<ReportRollup, ReportError> {
    let descriptor = builder.descriptor();
    let status = services.status();
    let config = &services.config;

    if meta.status == ReportStatus::Queued {
        status
            .transition(
                &meta.report_id,
                &StatusUpdate::new(ReportStatus::Processing),
                5,
                Some("started"),
            )
            .await?;
    }

    let ctx = GenerationContext::new(
        &meta.report_id,
        descriptor.report_type,
        Instant::now() + config.generation_deadline,
        cancel,
        config.collaborator_timeout,
        config.max_concurrent_calls,
        config.min_successful_items,
        status.clone(),
        services.metrics,
    );

    ctx.progress(10, "collecting data").await;
    let built = ctx.bounded("data collection", builder.build(&ctx)).await?;

    ctx.progress(70, "rendering").await;
    let request = RenderRequest::new(descriptor.template_id.clone(), built.payload, descriptor.format)
        .with_options(RenderOptions {
            language: descriptor.language,
            title: Some(descriptor.title.clone()),
            include_charts: true,
        });
    let rendered = ctx.bounded("render", services.templates.render(request)).await?;
    for warning in &rendered.warnings {
        warn!(report_id = %meta.report_id, warning = %warning, "Render warning");
    }

    ctx.progress(85, "storing artifact").await;
    let key = artifact_key(descriptor.report_type, &meta.report_id, descriptor.format);
    ctx.bounded(
        "storage",
        services
            .storage
            .save(&key, rendered.content, &rendered.content_type),
    )
    .await?;

    let mut export_urls = BTreeMap::new();
    export_urls.insert(descriptor.format, key);
    let completed = status
        .transition(
            &meta.report_id,
            &StatusUpdate::completed(built.rollup.clone(), export_urls),
            100,
            None,
        )
        .await?;

    publish(services, &completed).await;
    if let Err(e) = services
        .retention()
        .enforce(&completed.owner_id, completed.report_type, config.retention_keep)
        .await
    {
        warn!(report_id = %meta.report_id, error = %e, "Retention enforcement failed");
    }

    info!(
        report_id = %meta.report_id,
        report_type = %descriptor.report_type,
        overall_risk = ?built.rollup.overall_risk,
        items_analyzed = built.rollup.items_analyzed,
        items_failed = built.rollup.items_failed,
        "Report generation completed"
    );
    Ok(built.rollup)
}

/// Marks the report failed and publishes the failure event.
async fn fail(services: &ReportServices, meta: &ReportMeta, cause: &ReportError) {
    error!(
        report_id = %meta.report_id,
        report_type = %meta.report_type,
        kind = %cause.kind(),
        error = %cause,
        "Report generation failed"
    );
    match services
        .status()
        .transition(&meta.report_id, &StatusUpdate::failed(cause.to_string()), 100, None)
        .await
    {
        Ok(failed) => publish(services, &failed).await,
        Err(e) => warn!(report_id = %meta.report_id, error = %e, "Failed to record failure status"),
    }
}

async fn publish(services: &ReportServices, meta: &ReportMeta) {
    let event = ReportEvent::from_meta(meta);
    if let Err(e) = services.events.publish(event.topic(), &event).await {
        warn!(report_id = %meta.report_id, error = %e, "Failed to publish report event");
    }
}
