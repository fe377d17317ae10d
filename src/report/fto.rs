//! Freedom-to-operate reports.
//!
//! For every requested molecule the report searches each jurisdiction for
//! structurally similar patents and compares the candidates' independent
//! claims against the molecule. Overall risk is the worst row found.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::aggregate::{ItemFailure, RiskSummary};
use super::compare::{ClaimAnalysis, ClaimComparison};
use super::context::GenerationContext;
use super::pipeline::{generate, lock_key, BuiltReport, JobDescriptor, ReportBuilder, ReportServices};
use super::tasks::CancelToken;
use crate::analytics::{dedup_targets, fingerprint, set_fingerprint, Target, TargetSource};
use crate::collaborators::{
    ClaimData, ClaimParser, EquivalentsAnalyzer, InfringementAssessor, MoleculeNormalizer,
    NormalizedMolecule, SimilarityCandidate, SimilaritySearch,
};
use crate::error::{CollaboratorError, ReportError};
use crate::template::{ChartKind, ChartSpec, ReportPayload};
use crate::types::{
    AnalysisDepth, AnalysisMode, GenerateResponse, Language, ReportFormat, ReportRollup,
    ReportType, RiskLevel,
};

/// Request for a freedom-to-operate report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FtoRequest {
    /// Molecule identifiers (SMILES, InChI or registry names).
    pub molecules: Vec<String>,
    pub jurisdictions: Vec<String>,
    #[serde(default = "default_depth")]
    pub depth: AnalysisDepth,
    /// Ask for doctrine-of-equivalents analysis regardless of depth.
    #[serde(default)]
    pub include_equivalents: bool,
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

fn default_depth() -> AnalysisDepth {
    AnalysisDepth::Standard
}

fn default_format() -> ReportFormat {
    ReportFormat::Html
}

impl FtoRequest {
    pub fn new(
        molecules: Vec<String>,
        jurisdictions: Vec<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            molecules,
            jurisdictions,
            depth: default_depth(),
            include_equivalents: false,
            format: default_format(),
            language: Language::default(),
            requested_by: requested_by.into(),
            title: None,
            template_id: None,
        }
    }

    pub fn with_depth(mut self, depth: AnalysisDepth) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_equivalents(mut self, include: bool) -> Self {
        self.include_equivalents = include;
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
    /// Jurisdictions are upper-cased and deduplicated. Quick depth combined
    /// with `include_equivalents` is upgraded to standard depth.
    pub fn validate(&mut self) -> Result<(), ReportError> {
        if self.molecules.is_empty() {
            return Err(ReportError::Validation(
                "at least one molecule is required".to_string(),
            ));
        }
        if self.molecules.iter().any(|m| m.trim().is_empty()) {
            return Err(ReportError::Validation(
                "molecule identifiers must not be blank".to_string(),
            ));
        }
        self.molecules = self.molecules.iter().map(|m| m.trim().to_string()).collect();

        let mut jurisdictions: Vec<String> = Vec::new();
        for jurisdiction in &self.jurisdictions {
            let jurisdiction = jurisdiction.trim().to_ascii_uppercase();
            if !jurisdiction.is_empty() && !jurisdictions.contains(&jurisdiction) {
                jurisdictions.push(jurisdiction);
            }
        }
        if jurisdictions.is_empty() {
            return Err(ReportError::Validation(
                "at least one jurisdiction is required".to_string(),
            ));
        }
        self.jurisdictions = jurisdictions;

        if self.requested_by.trim().is_empty() {
            return Err(ReportError::Validation("requested_by is required".to_string()));
        }

        if self.include_equivalents && !self.depth.mode().includes_equivalents() {
            info!(
                from = %self.depth,
                to = %AnalysisDepth::Standard,
                "Equivalents requested, upgrading FTO analysis depth"
            );
            self.depth = AnalysisDepth::Standard;
        }
        Ok(())
    }

    /// Lock target: the molecule set and the jurisdiction set.
    pub fn lock_target(&self) -> String {
        let mut molecules = self.molecules.clone();
        molecules.sort();
        molecules.dedup();
        fingerprint([fingerprint(molecules), set_fingerprint(&self.jurisdictions)])
    }
}

/// Collaborators used by FTO generation.
#[derive(Clone)]
pub struct FtoCollaborators {
    pub normalizer: Arc<dyn MoleculeNormalizer>,
    pub similarity: Arc<dyn SimilaritySearch>,
    pub claims: Arc<dyn ClaimParser>,
    pub assessor: Arc<dyn InfringementAssessor>,
    pub equivalents: Arc<dyn EquivalentsAnalyzer>,
}

/// One molecule × candidate patent row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FtoFinding {
    pub molecule: String,
    pub structure_hash: String,
    pub patent_number: String,
    pub title: String,
    pub assignee: Option<String>,
    pub jurisdiction: String,
    pub similarity: f64,
    /// Claim with the highest combined probability.
    pub claim_id: String,
    pub literal_probability: f64,
    pub equivalents_probability: Option<f64>,
    pub estoppel_applies: bool,
    pub risk: RiskLevel,
    pub rationale: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

/// Aggregated FTO data bound into templates as `report`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FtoReportData {
    pub title: String,
    pub generated_at: String,
    pub language: Language,
    pub depth: AnalysisDepth,
    pub mode: AnalysisMode,
    pub jurisdictions: Vec<String>,
    /// Inputs that normalized successfully, deduplicated by structure.
    pub molecules: Vec<String>,
    pub summary: RiskSummary,
    pub findings: Vec<FtoFinding>,
    pub failures: Vec<ItemFailure>,
}

impl FtoReportData {
    pub fn charts(&self) -> Vec<ChartSpec> {
        let chart = RiskLevel::ALL.into_iter().fold(
            ChartSpec::new("risk_distribution", "Findings by risk level", ChartKind::Bar),
            |chart, level| chart.with_point(level.as_str(), self.summary.count(level) as f64),
        );
        vec![chart]
    }
}

struct FtoJob {
    descriptor: JobDescriptor,
    request: FtoRequest,
    collaborators: FtoCollaborators,
    analysis: ClaimAnalysis,
    similarity_threshold: f64,
    candidate_limit: usize,
}

impl FtoJob {
    /// Best claim comparison for one candidate.
    async fn assess_candidate(
        &self,
        molecule: &NormalizedMolecule,
        candidate: &SimilarityCandidate,
        mode: AnalysisMode,
    ) -> Result<FtoFinding, CollaboratorError> {
        let claims: Vec<ClaimData> = if candidate.matched_claims.is_empty() {
            self.collaborators
                .claims
                .parse_claims(&candidate.patent_number)
                .await?
        } else {
            candidate.matched_claims.clone()
        };
        let independent: Vec<&ClaimData> = claims.iter().filter(|c| c.independent).collect();
        let claims: Vec<&ClaimData> = if independent.is_empty() {
            claims.iter().collect()
        } else {
            independent
        };

        let mut best: Option<(String, ClaimComparison)> = None;
        for claim in claims {
            let row = self.analysis.compare(claim, molecule, mode).await?;
            let better = match &best {
                Some((_, current)) => row.effective_probability() > current.effective_probability(),
                None => true,
            };
            if better {
                best = Some((claim.claim_id.clone(), row));
            }
        }

        let (claim_id, row) = best.ok_or_else(|| {
            CollaboratorError::failed(
                "claim parser",
                format!("patent {} has no claims", candidate.patent_number),
            )
        })?;
        Ok(FtoFinding {
            molecule: molecule.input.clone(),
            structure_hash: molecule.structure_hash.clone(),
            patent_number: candidate.patent_number.clone(),
            title: candidate.title.clone(),
            assignee: candidate.assignee.clone(),
            jurisdiction: candidate.jurisdiction.clone(),
            similarity: candidate.similarity,
            claim_id,
            literal_probability: row.literal_probability,
            equivalents_probability: row.equivalents_probability,
            estoppel_applies: row.estoppel_applies,
            risk: row.risk,
            rationale: row.rationale,
            expiry_date: candidate.expiry_date,
        })
    }
}

#[async_trait]
impl ReportBuilder for FtoJob {
    fn descriptor(&self) -> &JobDescriptor {
        &self.descriptor
    }

    async fn build(&self, ctx: &GenerationContext) -> Result<BuiltReport, ReportError> {
        let request = &self.request;
        let mode = request.depth.mode();
        let min = ctx.min_successful_items();
        let mut failures = Vec::new();

        let inputs: Vec<(String, String)> = request
            .molecules
            .iter()
            .map(|m| (m.clone(), m.clone()))
            .collect();
        let normalized = ctx
            .collect("molecule_normalization", inputs, |molecule: String| async move {
                self.collaborators.normalizer.normalize(&molecule).await
            })
            .await?
            .require(min, "molecule normalized")?
            .drain_into(&mut failures);
        let targets: Vec<Target> =
            dedup_targets(normalized.into_iter().map(|m| (m, TargetSource::Direct)));
        ctx.progress(25, "searching similar patents").await;

        let searches: Vec<(String, (NormalizedMolecule, String))> = targets
            .iter()
            .flat_map(|target| {
                request.jurisdictions.iter().map(move |jurisdiction| {
                    (
                        format!("{}@{}", target.molecule.input, jurisdiction),
                        (target.molecule.clone(), jurisdiction.clone()),
                    )
                })
            })
            .collect();
        let candidates = ctx
            .collect(
                "similarity_search",
                searches,
                |(molecule, jurisdiction): (NormalizedMolecule, String)| async move {
                    let found = self
                        .collaborators
                        .similarity
                        .search(
                            &molecule,
                            &jurisdiction,
                            self.similarity_threshold,
                            self.candidate_limit,
                        )
                        .await?;
                    Ok::<_, CollaboratorError>((molecule, found))
                },
            )
            .await?
            .require(min, "similarity search completed")?
            .drain_into(&mut failures);
        ctx.progress(45, "assessing claims").await;

        let pairs: Vec<(String, (NormalizedMolecule, SimilarityCandidate))> = candidates
            .into_iter()
            .flat_map(|(molecule, found)| {
                found.into_iter().map(move |candidate| {
                    (
                        format!("{} vs {}", molecule.input, candidate.patent_number),
                        (molecule.clone(), candidate),
                    )
                })
            })
            .collect();
        let mut findings = ctx
            .collect(
                "claim_assessment",
                pairs,
                |(molecule, candidate): (NormalizedMolecule, SimilarityCandidate)| async move {
                    self.assess_candidate(&molecule, &candidate, mode).await
                },
            )
            .await?
            .drain_into(&mut failures);
        findings.sort_by(|a, b| {
            b.risk
                .cmp(&a.risk)
                .then_with(|| b.similarity.total_cmp(&a.similarity))
        });

        let levels: Vec<RiskLevel> = findings.iter().map(|f| f.risk).collect();
        let summary = RiskSummary::from_levels(&levels);
        let rollup = ReportRollup {
            risk_counts: summary.risk_counts.clone(),
            overall_risk: summary.overall_risk,
            items_analyzed: targets.len() as u32,
            items_failed: failures.len() as u32,
            scores: Default::default(),
        };

        let data = FtoReportData {
            title: self.descriptor.title.clone(),
            generated_at: Utc::now().to_rfc3339(),
            language: request.language,
            depth: request.depth,
            mode,
            jurisdictions: request.jurisdictions.clone(),
            molecules: targets.iter().map(|t| t.molecule.input.clone()).collect(),
            summary,
            findings,
            failures,
        };
        Ok(BuiltReport {
            payload: ReportPayload::Fto(data),
            rollup,
        })
    }
}

/// Generates FTO reports.
pub struct FtoOrchestrator {
    services: Arc<ReportServices>,
    collaborators: FtoCollaborators,
}

impl FtoOrchestrator {
    pub fn new(services: Arc<ReportServices>, collaborators: FtoCollaborators) -> Self {
        Self {
            services,
            collaborators,
        }
    }

    /// Validates `request` and checks the output format is producible.
    pub fn validate(&self, request: &mut FtoRequest) -> Result<(), ReportError> {
        request.validate()?;
        self.services.ensure_format_supported(request.format)
    }

    pub async fn generate(&self, request: FtoRequest) -> Result<GenerateResponse, ReportError> {
        self.generate_with_cancel(request, CancelToken::never()).await
    }

    /// Like [`generate`](Self::generate); `cancel` applies to the inline path.
    pub async fn generate_with_cancel(
        &self,
        mut request: FtoRequest,
        cancel: CancelToken,
    ) -> Result<GenerateResponse, ReportError> {
        self.validate(&mut request)?;
        let config = &self.services.config;
        let descriptor = JobDescriptor {
            report_type: ReportType::Fto,
            owner_id: request.requested_by.clone(),
            requested_by: request.requested_by.clone(),
            title: request.title.clone().unwrap_or_else(|| {
                format!("Freedom-to-operate analysis ({})", request.jurisdictions.join(", "))
            }),
            format: request.format,
            language: request.language,
            template_id: request
                .template_id
                .clone()
                .unwrap_or_else(|| ReportType::Fto.default_template_id().to_string()),
            lock_key: lock_key(ReportType::Fto, &request.lock_target()),
            target_sizes: vec![request.molecules.len(), request.jurisdictions.len()],
        };
        let job = FtoJob {
            descriptor,
            request,
            analysis: ClaimAnalysis::new(
                Arc::clone(&self.collaborators.assessor),
                Arc::clone(&self.collaborators.equivalents),
            ),
            collaborators: self.collaborators.clone(),
            similarity_threshold: config.similarity_threshold,
            candidate_limit: config.candidate_limit,
        };
        generate(&self.services, Arc::new(job), cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> FtoRequest {
        FtoRequest::new(vec!["CCO".into()], vec!["us".into(), " EP".into()], "alice")
    }

    #[test]
    fn test_validate_normalizes_jurisdictions() {
        let mut req = request();
        req.validate().unwrap();
        assert_eq!(req.jurisdictions, vec!["US", "EP"]);
    }

    #[test]
    fn test_validate_rejects_empty_targets() {
        let mut req = request();
        req.molecules.clear();
        assert!(matches!(req.validate(), Err(ReportError::Validation(_))));

        let mut req = request();
        req.jurisdictions = vec!["  ".into()];
        assert!(matches!(req.validate(), Err(ReportError::Validation(_))));

        let mut req = request();
        req.requested_by = " ".into();
        assert!(matches!(req.validate(), Err(ReportError::Validation(_))));
    }

    #[test]
    fn test_equivalents_upgrades_quick_depth() {
        let mut req = request()
            .with_depth(AnalysisDepth::Quick)
            .with_equivalents(true);
        req.validate().unwrap();
        assert_eq!(req.depth, AnalysisDepth::Standard);

        let mut req = request().with_depth(AnalysisDepth::Full).with_equivalents(true);
        req.validate().unwrap();
        assert_eq!(req.depth, AnalysisDepth::Full);
    }

    #[test]
    fn test_lock_target_ignores_order() {
        let a = FtoRequest::new(vec!["CCO".into(), "CCN".into()], vec!["US".into(), "EP".into()], "a");
        let b = FtoRequest::new(vec!["CCN".into(), "CCO".into()], vec!["EP".into(), "US".into()], "b");
        assert_eq!(a.lock_target(), b.lock_target());

        let c = FtoRequest::new(vec!["CCO".into()], vec!["US".into()], "a");
        assert_ne!(a.lock_target(), c.lock_target());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let req: FtoRequest = serde_json::from_str(
            r#"{"molecules":["CCO"],"jurisdictions":["US"],"requested_by":"bob"}"#,
        )
        .unwrap();
        assert_eq!(req.depth, AnalysisDepth::Standard);
        assert_eq!(req.format, ReportFormat::Html);

        let bad = serde_json::from_str::<FtoRequest>(
            r#"{"molecules":["CCO"],"jurisdictions":["US"],"requested_by":"bob","depth":"deep"}"#,
        );
        assert!(bad.is_err());
    }
}
