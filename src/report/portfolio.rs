//! Portfolio reports.
//!
//! Resolves every patent in a portfolio, values it, and positions the
//! portfolio against named competitors. Produces the health score, the Gini
//! coefficient of value and a competitiveness index per holder.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::aggregate::ItemFailure;
use super::context::GenerationContext;
use super::pipeline::{generate, lock_key, BuiltReport, JobDescriptor, ReportBuilder, ReportServices};
use super::tasks::CancelToken;
use crate::analytics::{
    competitiveness_index, gini_coefficient, top_share, HealthInputs, HealthScore,
};
use crate::collaborators::{
    CompetitorAnalyzer, CompetitorSlice, PatentDetail, PatentLookup, PatentValuation,
    PatentValuator,
};
use crate::error::{CollaboratorError, ReportError};
use crate::template::{ChartKind, ChartSpec, ReportPayload};
use crate::types::{Dimension, GenerateResponse, Language, ReportFormat, ReportRollup, ReportType};

/// Statutory patent term used when a patent carries no expiry date.
const PATENT_TERM_MONTHS: u32 = 240;
/// Remaining life at which the aging sub-score saturates.
const FULL_REMAINING_LIFE_YEARS: f64 = 20.0;
/// Filings younger than this count as recent activity.
const ACTIVITY_WINDOW_MONTHS: u32 = 60;

/// Request for a portfolio report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRequest {
    pub portfolio_id: String,
    pub patent_numbers: Vec<String>,
    /// Competitiveness dimensions to score; empty means all.
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub competitors: Vec<String>,
    #[serde(default = "default_format")]
    pub format: ReportFormat,
    #[serde(default)]
    pub language: Language,
    pub requested_by: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
}

fn default_format() -> ReportFormat {
    ReportFormat::Html
}

impl PortfolioRequest {
    pub fn new(
        portfolio_id: impl Into<String>,
        patent_numbers: Vec<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            portfolio_id: portfolio_id.into(),
            patent_numbers,
            dimensions: Vec::new(),
            competitors: Vec::new(),
            format: default_format(),
            language: Language::default(),
            requested_by: requested_by.into(),
            title: None,
            template_id: None,
        }
    }

    pub fn with_dimensions(mut self, dimensions: Vec<Dimension>) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_competitors(mut self, competitors: Vec<String>) -> Self {
        self.competitors = competitors;
        self
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = Some(template_id.into());
        self
    }

    /// Checks and normalizes the request in place.
    ///
    /// An empty dimension list expands to every dimension.
    pub fn validate(&mut self) -> Result<(), ReportError> {
        self.portfolio_id = self.portfolio_id.trim().to_string();
        if self.portfolio_id.is_empty() {
            return Err(ReportError::Validation("portfolio_id is required".to_string()));
        }

        let mut patents: Vec<String> = Vec::new();
        for patent in &self.patent_numbers {
            let patent = patent.trim().to_ascii_uppercase();
            if patent.is_empty() {
                return Err(ReportError::Validation(
                    "patent numbers must not be blank".to_string(),
                ));
            }
            if !patents.contains(&patent) {
                patents.push(patent);
            }
        }
        if patents.is_empty() {
            return Err(ReportError::Validation(
                "a portfolio report needs at least one patent".to_string(),
            ));
        }
        self.patent_numbers = patents;

        if self.competitors.iter().any(|c| c.trim().is_empty()) {
            return Err(ReportError::Validation(
                "competitor names must not be blank".to_string(),
            ));
        }
        self.competitors = self.competitors.iter().map(|c| c.trim().to_string()).collect();

        if self.requested_by.trim().is_empty() {
            return Err(ReportError::Validation("requested_by is required".to_string()));
        }

        if self.dimensions.is_empty() {
            self.dimensions = Dimension::ALL.to_vec();
        } else {
            self.dimensions.sort();
            self.dimensions.dedup();
        }
        Ok(())
    }
}

/// Collaborators used by portfolio generation.
#[derive(Clone)]
pub struct PortfolioCollaborators {
    pub lookup: Arc<dyn PatentLookup>,
    pub valuator: Arc<dyn PatentValuator>,
    pub competitors: Arc<dyn CompetitorAnalyzer>,
}

/// A resolved portfolio patent with its valuation, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPatent {
    pub patent_number: String,
    pub title: String,
    pub assignee: Option<String>,
    pub jurisdiction: String,
    pub filing_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub in_force: bool,
    pub forward_citations: u32,
    pub technology_classes: Vec<String>,
    pub value: Option<f64>,
    pub quality_score: Option<f64>,
}

impl PortfolioPatent {
    fn new(detail: PatentDetail, valuation: Option<&PatentValuation>) -> Self {
        Self {
            patent_number: detail.patent_number,
            title: detail.title,
            assignee: detail.assignee,
            jurisdiction: detail.jurisdiction,
            filing_date: detail.filing_date,
            expiry_date: detail.expiry_date,
            in_force: detail.in_force,
            forward_citations: detail.forward_citations,
            technology_classes: detail.technology_classes,
            value: valuation.map(|v| v.value),
            quality_score: valuation.map(|v| v.quality_score),
        }
    }

    /// Expiry date, or filing date plus the statutory term.
    fn effective_expiry(&self) -> Option<NaiveDate> {
        self.expiry_date.or_else(|| {
            self.filing_date
                .checked_add_months(Months::new(PATENT_TERM_MONTHS))
        })
    }
}

/// Competitive standing of one holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorStanding {
    pub name: String,
    pub patent_count: u32,
    pub index: f64,
    pub dimension_scores: BTreeMap<Dimension, f64>,
}

impl CompetitorStanding {
    /// Scores `slice` over `dimensions` only.
    pub fn from_slice(slice: CompetitorSlice, dimensions: &[Dimension]) -> Self {
        let dimension_scores: BTreeMap<Dimension, f64> = slice
            .dimension_scores
            .into_iter()
            .filter(|(dimension, _)| dimensions.contains(dimension))
            .collect();
        Self {
            name: slice.competitor,
            patent_count: slice.patent_count,
            index: competitiveness_index(&dimension_scores),
            dimension_scores,
        }
    }
}

/// Aggregated portfolio data bound into templates as `report`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReportData {
    pub title: String,
    pub generated_at: String,
    pub language: Language,
    pub portfolio_id: String,
    pub dimensions: Vec<Dimension>,
    pub patents: Vec<PortfolioPatent>,
    pub health: HealthScore,
    pub gini: f64,
    /// Value share of the top decile of patents.
    pub top_share: f64,
    pub own_standing: Option<CompetitorStanding>,
    pub competitors: Vec<CompetitorStanding>,
    pub failures: Vec<ItemFailure>,
}

impl PortfolioReportData {
    pub fn charts(&self) -> Vec<ChartSpec> {
        let values = self
            .patents
            .iter()
            .filter_map(|p| p.value.map(|v| (p.patent_number.as_str(), v)))
            .fold(
                ChartSpec::new("value_distribution", "Value by patent", ChartKind::Bar),
                |chart, (patent, value)| chart.with_point(patent, value),
            );
        let standings = self
            .own_standing
            .iter()
            .chain(self.competitors.iter())
            .fold(
                ChartSpec::new("competitiveness", "Competitiveness index", ChartKind::Bar),
                |chart, standing| chart.with_point(standing.name.as_str(), standing.index),
            );
        vec![values, standings]
    }
}

/// Health sub-scores, each on a 0-100 scale.
///
/// - coverage: share of patents in force
/// - concentration: `(1 - gini) * 100`
/// - aging: mean remaining life over a 20-year term
/// - activity: share filed within the last five years
/// - quality: mean valuation quality score
pub fn health_inputs(patents: &[PortfolioPatent], gini: f64, today: NaiveDate) -> HealthInputs {
    if patents.is_empty() {
        return HealthInputs::default();
    }
    let n = patents.len() as f64;

    let in_force = patents.iter().filter(|p| p.in_force).count() as f64;

    let remaining_years: f64 = patents
        .iter()
        .map(|p| {
            p.effective_expiry()
                .map(|expiry| ((expiry - today).num_days() as f64 / 365.25).max(0.0))
                .unwrap_or(0.0)
        })
        .sum();
    let aging = (remaining_years / n / FULL_REMAINING_LIFE_YEARS * 100.0).min(100.0);

    let window_start = today
        .checked_sub_months(Months::new(ACTIVITY_WINDOW_MONTHS))
        .unwrap_or(NaiveDate::MIN);
    let recent = patents
        .iter()
        .filter(|p| p.filing_date >= window_start)
        .count() as f64;

    let qualities: Vec<f64> = patents.iter().filter_map(|p| p.quality_score).collect();
    let quality = if qualities.is_empty() {
        0.0
    } else {
        qualities.iter().sum::<f64>() / qualities.len() as f64
    };

    HealthInputs {
        coverage: in_force / n * 100.0,
        concentration: (1.0 - gini) * 100.0,
        aging,
        activity: recent / n * 100.0,
        quality,
    }
}

/// Number of patents in the top decile, at least one.
fn top_decile(n: usize) -> usize {
    n.div_ceil(10).max(1)
}

struct PortfolioJob {
    descriptor: JobDescriptor,
    request: PortfolioRequest,
    collaborators: PortfolioCollaborators,
}

#[async_trait]
impl ReportBuilder for PortfolioJob {
    fn descriptor(&self) -> &JobDescriptor {
        &self.descriptor
    }

    async fn build(&self, ctx: &GenerationContext) -> Result<BuiltReport, ReportError> {
        let request = &self.request;
        let mut failures = Vec::new();

        let numbers: Vec<(String, String)> = request
            .patent_numbers
            .iter()
            .map(|p| (p.clone(), p.clone()))
            .collect();
        let details = ctx
            .collect("patent_lookup", numbers, |patent: String| async move {
                self.collaborators.lookup.get_patent(&patent).await
            })
            .await?
            .require(ctx.min_successful_items(), "portfolio patent resolved")?
            .drain_into(&mut failures);
        ctx.progress(25, "valuing patents").await;

        let to_value: Vec<(String, PatentDetail)> = details
            .iter()
            .map(|d| (d.patent_number.clone(), d.clone()))
            .collect();
        let valuations: HashMap<String, PatentValuation> = ctx
            .collect("valuation", to_value, |detail: PatentDetail| async move {
                self.collaborators.valuator.value(&detail).await
            })
            .await?
            .drain_into(&mut failures)
            .into_iter()
            .map(|v| (v.patent_number.clone(), v))
            .collect();
        ctx.progress(45, "analysing competitors").await;

        let mut classes: Vec<String> = details
            .iter()
            .flat_map(|d| d.technology_classes.iter().cloned())
            .collect();
        classes.sort();
        classes.dedup();

        // Each holder is tagged with whether it is the portfolio itself; the
        // analyzer may return a canonical name that differs from the request.
        let holders: Vec<(String, (String, bool))> =
            std::iter::once((request.portfolio_id.clone(), true))
                .chain(request.competitors.iter().map(|c| (c.clone(), false)))
                .map(|(name, own)| (name.clone(), (name, own)))
                .collect();
        let classes = &classes;
        let (own, rivals): (Vec<_>, Vec<_>) = ctx
            .collect(
                "competitor_analysis",
                holders,
                |(name, own): (String, bool)| async move {
                    let slice = self
                        .collaborators
                        .competitors
                        .competitor_slice(&name, classes)
                        .await?;
                    Ok::<_, CollaboratorError>((
                        own,
                        CompetitorStanding::from_slice(slice, &request.dimensions),
                    ))
                },
            )
            .await?
            .drain_into(&mut failures)
            .into_iter()
            .partition(|(own, _)| *own);

        let own_standing = own.into_iter().next().map(|(_, standing)| standing);
        let mut standings: Vec<CompetitorStanding> =
            rivals.into_iter().map(|(_, standing)| standing).collect();
        standings.sort_by(|a, b| b.index.total_cmp(&a.index));

        let patents: Vec<PortfolioPatent> = details
            .into_iter()
            .map(|detail| {
                let valuation = valuations.get(&detail.patent_number);
                PortfolioPatent::new(detail, valuation)
            })
            .collect();
        let values: Vec<f64> = patents.iter().filter_map(|p| p.value).collect();
        let gini = gini_coefficient(&values);
        let top = top_share(&values, top_decile(values.len()));
        let health = HealthScore::compute(health_inputs(&patents, gini, Utc::now().date_naive()));

        let mut scores = BTreeMap::new();
        scores.insert("health".to_string(), health.total);
        scores.insert("gini".to_string(), gini);
        scores.insert("top_share".to_string(), top);
        if let Some(own) = &own_standing {
            scores.insert("competitiveness".to_string(), own.index);
        }
        let rollup = ReportRollup {
            risk_counts: BTreeMap::new(),
            overall_risk: None,
            items_analyzed: patents.len() as u32,
            items_failed: failures.len() as u32,
            scores,
        };

        let data = PortfolioReportData {
            title: self.descriptor.title.clone(),
            generated_at: Utc::now().to_rfc3339(),
            language: request.language,
            portfolio_id: request.portfolio_id.clone(),
            dimensions: request.dimensions.clone(),
            patents,
            health,
            gini,
            top_share: top,
            own_standing,
            competitors: standings,
            failures,
        };
        Ok(BuiltReport {
            payload: ReportPayload::Portfolio(data),
            rollup,
        })
    }
}

/// Generates portfolio reports.
pub struct PortfolioOrchestrator {
    services: Arc<ReportServices>,
    collaborators: PortfolioCollaborators,
}

impl PortfolioOrchestrator {
    pub fn new(services: Arc<ReportServices>, collaborators: PortfolioCollaborators) -> Self {
        Self {
            services,
            collaborators,
        }
    }

    /// Validates `request` and checks the output format is producible.
    pub fn validate(&self, request: &mut PortfolioRequest) -> Result<(), ReportError> {
        request.validate()?;
        self.services.ensure_format_supported(request.format)
    }

    pub async fn generate(&self, request: PortfolioRequest) -> Result<GenerateResponse, ReportError> {
        self.generate_with_cancel(request, CancelToken::never()).await
    }

    /// Like [`generate`](Self::generate); `cancel` applies to the inline path.
    pub async fn generate_with_cancel(
        &self,
        mut request: PortfolioRequest,
        cancel: CancelToken,
    ) -> Result<GenerateResponse, ReportError> {
        self.validate(&mut request)?;
        let descriptor = JobDescriptor {
            report_type: ReportType::Portfolio,
            owner_id: request.portfolio_id.clone(),
            requested_by: request.requested_by.clone(),
            title: request
                .title
                .clone()
                .unwrap_or_else(|| format!("Portfolio analysis: {}", request.portfolio_id)),
            format: request.format,
            language: request.language,
            template_id: request
                .template_id
                .clone()
                .unwrap_or_else(|| ReportType::Portfolio.default_template_id().to_string()),
            lock_key: lock_key(ReportType::Portfolio, &request.portfolio_id),
            target_sizes: vec![request.patent_numbers.len(), request.competitors.len() + 1],
        };
        let job = PortfolioJob {
            descriptor,
            request,
            collaborators: self.collaborators.clone(),
        };
        generate(&self.services, Arc::new(job), cancel).await
    }
}
