//! End-to-end generation against in-memory backends and fake collaborators.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;

use reportforge::config::ReportingConfig;
use reportforge::report::{
    lock_key, AuxDocument, FtoOrchestrator, FtoRequest, InfringementOrchestrator,
    InfringementRequest, PortfolioCollaborators, PortfolioOrchestrator, PortfolioRequest,
    RenderPlugins, ReportQueries, ReportServices,
};
use reportforge::template::charts::png_data_uri;
use reportforge::types::{
    ExecutionMode, Page, ReportFilter, ReportFormat, ReportStatus, ReportType, RiskLevel,
};
use reportforge::{ErrorKind, ReportError};

use common::{
    fto_collaborators, infringement_collaborators, portfolio_collaborators, services,
    services_with, BrokenPdfConverter, CanonicalNameCompetitors, DigitValuator, FixedLookup,
    HeaderPdfConverter, ReadOnlyStorage, StaticChartRenderer, CHART_BYTES, PDF_MAGIC,
};

async fn read_artifact(queries: &ReportQueries, report_id: &str) -> String {
    let mut exported = queries.export(report_id, ReportFormat::Html).await.unwrap();
    let mut body = String::new();
    exported.stream.read_to_string(&mut body).await.unwrap();
    body
}

#[tokio::test]
async fn test_sync_fto_completes_with_artifact() {
    let services = services(ReportingConfig::default()).await;
    let fto = FtoOrchestrator::new(Arc::clone(&services), fto_collaborators(None));

    let response = fto
        .generate(FtoRequest::new(vec!["CCO".into()], vec!["us".into()], "alice"))
        .await
        .unwrap();

    assert_eq!(response.mode, ExecutionMode::Sync);
    assert_eq!(response.status, ReportStatus::Completed);
    let rollup = response.rollup.unwrap();
    assert_eq!(rollup.items_analyzed, 1);
    assert_eq!(rollup.overall_risk, Some(RiskLevel::High));

    let queries = ReportQueries::new(services);
    let status = queries.get_status(&response.report_id).await.unwrap();
    assert_eq!(status.status, ReportStatus::Completed);
    assert_eq!(status.progress, 100);

    let html = read_artifact(&queries, &response.report_id).await;
    assert!(html.contains("US-CCO"), "{}", html);
}

#[tokio::test]
async fn test_large_fto_runs_async() {
    let config = ReportingConfig::default().with_async_threshold(1);
    let services = services(config).await;
    let fto = FtoOrchestrator::new(Arc::clone(&services), fto_collaborators(None));

    let response = fto
        .generate(FtoRequest::new(
            vec!["CCO".into(), "CCN".into()],
            vec!["US".into()],
            "alice",
        ))
        .await
        .unwrap();

    assert_eq!(response.mode, ExecutionMode::Async);
    assert_eq!(response.status, ReportStatus::Queued);
    assert_eq!(response.complexity, 2);
    assert!(response.estimated_duration.is_some());

    let outcome = services.tasks.wait(&response.report_id).await.unwrap();
    assert_eq!(outcome.status, ReportStatus::Completed, "{:?}", outcome.error);

    let queries = ReportQueries::new(services);
    let meta = queries
        .list(&ReportFilter::new().with_owner("alice"), Page::default())
        .await
        .unwrap();
    assert_eq!(meta.items.len(), 1);
    assert_eq!(meta.items[0].rollup.items_analyzed, 2);
}

#[tokio::test]
async fn test_export_waits_for_completion() {
    let config = ReportingConfig::default().with_async_threshold(0);
    let services = services(config).await;
    let gate = Arc::new(Semaphore::new(0));
    let fto = FtoOrchestrator::new(
        Arc::clone(&services),
        fto_collaborators(Some(Arc::clone(&gate))),
    );

    let response = fto
        .generate(FtoRequest::new(vec!["CCO".into()], vec!["US".into()], "bob"))
        .await
        .unwrap();
    let queries = ReportQueries::new(Arc::clone(&services));

    let err = queries
        .export(&response.report_id, ReportFormat::Html)
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::InvalidState(_)));

    gate.add_permits(1);
    let outcome = services.tasks.wait(&response.report_id).await.unwrap();
    assert_eq!(outcome.status, ReportStatus::Completed);
    assert!(read_artifact(&queries, &response.report_id).await.contains("US-CCO"));
}

#[tokio::test]
async fn test_cancelled_generation_fails_and_releases_lock() {
    let config = ReportingConfig::default().with_async_threshold(0);
    let services = services(config).await;
    let gate = Arc::new(Semaphore::new(0));
    let fto = FtoOrchestrator::new(Arc::clone(&services), fto_collaborators(Some(gate)));

    let request = FtoRequest::new(vec!["CCO".into()], vec!["US".into()], "carol");
    let key = lock_key(ReportType::Fto, &request.lock_target());
    let response = fto.generate(request).await.unwrap();

    assert!(services.tasks.cancel(&response.report_id));
    let outcome = services.tasks.wait(&response.report_id).await.unwrap();
    assert_eq!(outcome.status, ReportStatus::Failed);

    let status = ReportQueries::new(Arc::clone(&services))
        .get_status(&response.report_id)
        .await
        .unwrap();
    assert_eq!(status.status, ReportStatus::Failed);
    assert!(services.lock.acquire(&key, Duration::from_secs(5)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_concurrent_generation_is_a_conflict() {
    let services = services(ReportingConfig::default()).await;
    let key = lock_key(ReportType::Portfolio, "pf-1");
    assert!(services.lock.acquire(&key, Duration::from_secs(60)).await.unwrap().is_some());

    let portfolio = PortfolioOrchestrator::new(Arc::clone(&services), portfolio_collaborators());
    let err = portfolio
        .generate(PortfolioRequest::new("pf-1", vec!["US100".into()], "dave"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.to_string().contains("currently running"));

    let failed = services
        .repository
        .list(
            &ReportFilter::new().with_status(ReportStatus::Failed),
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(failed.items.len(), 1);
}

#[tokio::test]
async fn test_infringement_partial_failure_still_completes() {
    let services = services(ReportingConfig::default()).await;
    let infringement =
        InfringementOrchestrator::new(Arc::clone(&services), infringement_collaborators());

    let response = infringement
        .generate(InfringementRequest::new(
            vec!["US1".into(), "BAD2".into()],
            vec!["CCO".into()],
            "legal",
        ))
        .await
        .unwrap();

    assert_eq!(response.status, ReportStatus::Completed);
    let rollup = response.rollup.unwrap();
    assert_eq!(rollup.items_failed, 1);
    assert_eq!(rollup.overall_risk, Some(RiskLevel::High));
    assert_eq!(rollup.risk_counts.get(&RiskLevel::High), Some(&1));
}

#[tokio::test]
async fn test_infringement_with_no_parsable_patent_fails() {
    let services = services(ReportingConfig::default()).await;
    let infringement =
        InfringementOrchestrator::new(Arc::clone(&services), infringement_collaborators());

    let err = infringement
        .generate(InfringementRequest::new(
            vec!["BAD1".into(), "BAD2".into()],
            vec!["CCO".into()],
            "legal",
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::InvalidState(_)));
    assert!(err.to_string().contains("owned patent parsed"), "{}", err);

    let page = services
        .repository
        .list(&ReportFilter::new().with_owner("legal"), Page::default())
        .await
        .unwrap();
    assert_eq!(page.items[0].status, ReportStatus::Failed);
    assert!(page.items[0].error_message.is_some());
}

#[tokio::test]
async fn test_infringement_dedups_document_entities() {
    let services = services(ReportingConfig::default()).await;
    let infringement =
        InfringementOrchestrator::new(Arc::clone(&services), infringement_collaborators());

    let response = infringement
        .generate(
            InfringementRequest::new(vec!["US1".into()], vec!["CCO".into()], "legal")
                .with_documents(vec![AuxDocument::new("doc-1", "OCC")]),
        )
        .await
        .unwrap();

    let rollup = response.rollup.unwrap();
    assert_eq!(rollup.items_analyzed, 1);
    assert_eq!(rollup.risk_counts.values().sum::<u32>(), 1);
}

#[tokio::test]
async fn test_portfolio_scores() {
    let services = services(ReportingConfig::default()).await;
    let portfolio = PortfolioOrchestrator::new(Arc::clone(&services), portfolio_collaborators());

    let response = portfolio
        .generate(
            PortfolioRequest::new(
                "pf-2",
                vec!["US100".into(), "US200".into(), "MISSING3".into()],
                "erin",
            )
            .with_competitors(vec!["Rival".into()]),
        )
        .await
        .unwrap();

    let rollup = response.rollup.unwrap();
    assert_eq!(rollup.items_failed, 1);
    let gini = rollup.scores["gini"];
    assert!((gini - 1.0 / 6.0).abs() < 1e-9, "gini = {}", gini);
    assert!(rollup.scores.contains_key("health"));
    assert!(rollup.scores.contains_key("competitiveness"));

    let page = services
        .repository
        .list(&ReportFilter::new().with_owner("pf-2"), Page::default())
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].report_type, ReportType::Portfolio);
}

#[tokio::test]
async fn test_unsupported_format_is_rejected_before_persisting() {
    let services = services(ReportingConfig::default()).await;
    let fto = FtoOrchestrator::new(Arc::clone(&services), fto_collaborators(None));

    let err = fto
        .generate(
            FtoRequest::new(vec!["CCO".into()], vec!["US".into()], "frank")
                .with_format(ReportFormat::Pdf),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    let page = services
        .repository
        .list(&ReportFilter::new(), Page::default())
        .await
        .unwrap();
    assert!(page.items.is_empty());
}

async fn assert_lock_free(services: &ReportServices, key: &str) {
    let token = services
        .lock
        .acquire(key, Duration::from_secs(5))
        .await
        .unwrap()
        .expect("lock should have been released");
    assert!(services.lock.release(key, &token).await.unwrap());
}

#[tokio::test]
async fn test_storage_failure_fails_report_and_releases_lock() {
    let services = Arc::new(
        ReportServices::in_memory(ReportingConfig::default())
            .await
            .unwrap()
            .with_storage(Arc::new(ReadOnlyStorage::default())),
    );
    let fto = FtoOrchestrator::new(Arc::clone(&services), fto_collaborators(None));

    let request = FtoRequest::new(vec!["CCO".into()], vec!["US".into()], "gina");
    let key = lock_key(ReportType::Fto, &request.lock_target());
    let err = fto.generate(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal, "{}", err);

    let page = services
        .repository
        .list(&ReportFilter::new().with_owner("gina"), Page::default())
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].status, ReportStatus::Failed);
    assert!(page.items[0].error_message.as_deref().unwrap_or_default().contains("read-only"));
    assert_lock_free(&services, &key).await;
}

#[tokio::test]
async fn test_render_failure_fails_report_and_releases_lock() {
    let plugins = RenderPlugins::new().with_converter(Arc::new(BrokenPdfConverter));
    let services = services_with(ReportingConfig::default(), plugins).await;
    let fto = FtoOrchestrator::new(Arc::clone(&services), fto_collaborators(None));

    let request = FtoRequest::new(vec!["CCO".into()], vec!["US".into()], "hank")
        .with_format(ReportFormat::Pdf);
    let key = lock_key(ReportType::Fto, &request.lock_target());
    let err = fto.generate(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal, "{}", err);

    let page = services
        .repository
        .list(&ReportFilter::new().with_owner("hank"), Page::default())
        .await
        .unwrap();
    assert_eq!(page.items[0].status, ReportStatus::Failed);
    assert_lock_free(&services, &key).await;
}

#[tokio::test]
async fn test_deadline_overrun_is_a_timeout() {
    let config = ReportingConfig::default().with_generation_deadline(Duration::from_millis(50));
    let services = services(config).await;
    let gate = Arc::new(Semaphore::new(0));
    let fto = FtoOrchestrator::new(Arc::clone(&services), fto_collaborators(Some(gate)));

    let request = FtoRequest::new(vec!["CCO".into()], vec!["US".into()], "ivy");
    let key = lock_key(ReportType::Fto, &request.lock_target());
    let err = fto.generate(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout, "{}", err);
    assert!(matches!(err, ReportError::Timeout(_)));

    let page = services
        .repository
        .list(&ReportFilter::new().with_owner("ivy"), Page::default())
        .await
        .unwrap();
    assert_eq!(page.items[0].status, ReportStatus::Failed);
    assert_lock_free(&services, &key).await;
}

#[tokio::test]
async fn test_async_failure_is_visible_through_status() {
    let config = ReportingConfig::default().with_async_threshold(0);
    let services = Arc::new(
        ReportServices::in_memory(config)
            .await
            .unwrap()
            .with_storage(Arc::new(ReadOnlyStorage::default())),
    );
    let fto = FtoOrchestrator::new(Arc::clone(&services), fto_collaborators(None));

    let response = fto
        .generate(FtoRequest::new(vec!["CCO".into()], vec!["US".into()], "jack"))
        .await
        .unwrap();
    assert_eq!(response.status, ReportStatus::Queued);

    let outcome = services.tasks.wait(&response.report_id).await.unwrap();
    assert_eq!(outcome.status, ReportStatus::Failed);

    let status = ReportQueries::new(Arc::clone(&services))
        .get_status(&response.report_id)
        .await
        .unwrap();
    assert_eq!(status.status, ReportStatus::Failed);
    assert!(status.message.unwrap_or_default().contains("read-only"));
}

#[tokio::test]
async fn test_lock_outlives_ttl_while_generation_runs() {
    let config = ReportingConfig::default()
        .with_async_threshold(0)
        .with_lock_ttl(Duration::from_millis(50));
    let services = services(config).await;
    let gate = Arc::new(Semaphore::new(0));
    let fto = FtoOrchestrator::new(
        Arc::clone(&services),
        fto_collaborators(Some(Arc::clone(&gate))),
    );

    let first = fto
        .generate(FtoRequest::new(vec!["CCO".into()], vec!["US".into()], "kate"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let second = fto
        .generate(FtoRequest::new(vec!["CCO".into()], vec!["US".into()], "kate"))
        .await
        .unwrap();
    let outcome = services.tasks.wait(&second.report_id).await.unwrap();
    assert_eq!(outcome.status, ReportStatus::Failed);
    assert!(
        outcome.error.as_deref().unwrap_or_default().contains("currently running"),
        "{:?}",
        outcome.error
    );

    gate.add_permits(1);
    let outcome = services.tasks.wait(&first.report_id).await.unwrap();
    assert_eq!(outcome.status, ReportStatus::Completed, "{:?}", outcome.error);
}

#[tokio::test]
async fn test_portfolio_own_standing_survives_canonical_names() {
    let services = services(ReportingConfig::default()).await;
    let collaborators = PortfolioCollaborators {
        lookup: Arc::new(FixedLookup),
        valuator: Arc::new(DigitValuator),
        competitors: Arc::new(CanonicalNameCompetitors),
    };
    let portfolio = PortfolioOrchestrator::new(Arc::clone(&services), collaborators);

    let response = portfolio
        .generate(
            PortfolioRequest::new("pf-3", vec!["US100".into()], "lena")
                .with_competitors(vec!["Rival".into()]),
        )
        .await
        .unwrap();

    let rollup = response.rollup.unwrap();
    assert!(rollup.scores.contains_key("competitiveness"), "{:?}", rollup.scores);

    let html = read_artifact(&ReportQueries::new(services), &response.report_id).await;
    assert!(html.contains("PF-3 Holdings Inc."), "{}", html);
    assert!(html.contains("RIVAL Holdings Inc."), "{}", html);
}

#[tokio::test]
async fn test_render_plugins_enable_pdf_and_charts() {
    let plugins = RenderPlugins::new()
        .with_chart_renderer(Arc::new(StaticChartRenderer))
        .with_converter(Arc::new(HeaderPdfConverter));
    let services = services_with(ReportingConfig::default(), plugins).await;
    assert!(services.ensure_format_supported(ReportFormat::Pdf).is_ok());
    let fto = FtoOrchestrator::new(Arc::clone(&services), fto_collaborators(None));

    let response = fto
        .generate(
            FtoRequest::new(vec!["CCO".into()], vec!["US".into()], "mona")
                .with_format(ReportFormat::Pdf),
        )
        .await
        .unwrap();
    assert_eq!(response.status, ReportStatus::Completed);

    let mut exported = ReportQueries::new(services)
        .export(&response.report_id, ReportFormat::Pdf)
        .await
        .unwrap();
    assert!(exported.key.ends_with(".PDF"), "{}", exported.key);
    let mut bytes = Vec::new();
    exported.stream.read_to_end(&mut bytes).await.unwrap();
    assert!(bytes.starts_with(PDF_MAGIC));
    let body = String::from_utf8_lossy(&bytes);
    assert!(body.contains(&png_data_uri(CHART_BYTES)));
}
