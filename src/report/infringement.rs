//! Infringement reports.
//!
//! The requester's own patents are parsed into claims and every independent
//! claim is compared with every suspected third-party molecule. Targets come
//! from the request directly and from chemical entities extracted out of
//! auxiliary documents; both are deduplicated by structure hash first.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::aggregate::{ItemFailure, RiskSummary};
use super::compare::ClaimAnalysis;
use super::context::GenerationContext;
use super::pipeline::{generate, lock_key, BuiltReport, JobDescriptor, ReportBuilder, ReportServices};
use super::tasks::CancelToken;
use crate::analytics::{dedup_targets, set_fingerprint, Target, TargetSource};
use crate::collaborators::{
    ChemicalExtractor, ClaimData, ClaimParser, EquivalentsAnalyzer, InfringementAssessor,
    MoleculeNormalizer,
};
use crate::error::{CollaboratorError, ReportError};
use crate::template::{ChartKind, ChartSpec, ReportPayload};
use crate::types::{
    AnalysisMode, GenerateResponse, Language, ReportFormat, ReportRollup, ReportType, RiskLevel,
};

/// Free text that may mention suspected molecules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxDocument {
    pub id: String,
    pub text: String,
}

impl AuxDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Request for an infringement report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfringementRequest {
    pub owned_patents: Vec<String>,
    #[serde(default)]
    pub suspected_molecules: Vec<String>,
    #[serde(default)]
    pub documents: Vec<AuxDocument>,
    #[serde(default = "default_mode")]
    pub mode: AnalysisMode,
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

fn default_mode() -> AnalysisMode {
    AnalysisMode::Literal
}

fn default_format() -> ReportFormat {
    ReportFormat::Html
}

impl InfringementRequest {
    pub fn new(
        owned_patents: Vec<String>,
        suspected_molecules: Vec<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            owned_patents,
            suspected_molecules,
            documents: Vec::new(),
            mode: default_mode(),
            include_equivalents: false,
            format: default_format(),
            language: Language::default(),
            requested_by: requested_by.into(),
            title: None,
            template_id: None,
        }
    }

    pub fn with_documents(mut self, documents: Vec<AuxDocument>) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_mode(mut self, mode: AnalysisMode) -> Self {
        self.mode = mode;
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

    /// Number of target sources (direct molecules plus documents).
    pub fn target_count(&self) -> usize {
        self.suspected_molecules.len() + self.documents.len()
    }

    /// Checks and normalizes the request in place.
    ///
    /// Literal mode combined with `include_equivalents` is upgraded to
    /// equivalents mode.
    pub fn validate(&mut self) -> Result<(), ReportError> {
        let mut owned: Vec<String> = Vec::new();
        for patent in &self.owned_patents {
            let patent = patent.trim().to_ascii_uppercase();
            if patent.is_empty() {
                return Err(ReportError::Validation(
                    "owned patent numbers must not be blank".to_string(),
                ));
            }
            if !owned.contains(&patent) {
                owned.push(patent);
            }
        }
        if owned.is_empty() {
            return Err(ReportError::Validation(
                "at least one owned patent is required".to_string(),
            ));
        }
        self.owned_patents = owned;

        if self.suspected_molecules.iter().any(|m| m.trim().is_empty()) {
            return Err(ReportError::Validation(
                "suspected molecule identifiers must not be blank".to_string(),
            ));
        }
        self.suspected_molecules = self
            .suspected_molecules
            .iter()
            .map(|m| m.trim().to_string())
            .collect();
        if self.documents.iter().any(|d| d.id.trim().is_empty()) {
            return Err(ReportError::Validation(
                "auxiliary documents need an id".to_string(),
            ));
        }
        if self.target_count() == 0 {
            return Err(ReportError::Validation(
                "at least one suspected molecule or document is required".to_string(),
            ));
        }

        if self.requested_by.trim().is_empty() {
            return Err(ReportError::Validation("requested_by is required".to_string()));
        }

        if self.include_equivalents && !self.mode.includes_equivalents() {
            info!(
                from = %self.mode,
                to = %AnalysisMode::Equivalents,
                "Equivalents requested, upgrading infringement analysis mode"
            );
            self.mode = AnalysisMode::Equivalents;
        }
        Ok(())
    }
}

/// Collaborators used by infringement generation.
#[derive(Clone)]
pub struct InfringementCollaborators {
    pub claims: Arc<dyn ClaimParser>,
    pub extractor: Arc<dyn ChemicalExtractor>,
    pub normalizer: Arc<dyn MoleculeNormalizer>,
    pub assessor: Arc<dyn InfringementAssessor>,
    pub equivalents: Arc<dyn EquivalentsAnalyzer>,
}

/// One claim × target cell of the matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixEntry {
    pub patent_number: String,
    pub claim_id: String,
    /// Target molecule as first supplied.
    pub target: String,
    pub structure_hash: String,
    pub sources: Vec<TargetSource>,
    pub literal_probability: f64,
    pub equivalents_probability: Option<f64>,
    pub estoppel_applies: bool,
    pub risk: RiskLevel,
    pub rationale: Option<String>,
}

/// Aggregated infringement data bound into templates as `report`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfringementReportData {
    pub title: String,
    pub generated_at: String,
    pub language: Language,
    pub mode: AnalysisMode,
    /// Owned patents whose claims parsed.
    pub owned_patents: Vec<String>,
    pub claims_analyzed: u32,
    pub targets: Vec<Target>,
    pub summary: RiskSummary,
    pub matrix: Vec<MatrixEntry>,
    pub failures: Vec<ItemFailure>,
}

impl InfringementReportData {
    pub fn charts(&self) -> Vec<ChartSpec> {
        let chart = RiskLevel::ALL.into_iter().fold(
            ChartSpec::new("risk_distribution", "Matrix cells by risk level", ChartKind::Bar),
            |chart, level| chart.with_point(level.as_str(), self.summary.count(level) as f64),
        );
        vec![chart]
    }
}

/// Independent claims, or every claim when none is marked independent.
fn claims_to_compare(claims: Vec<ClaimData>) -> Vec<ClaimData> {
    if claims.iter().any(|c| c.independent) {
        claims.into_iter().filter(|c| c.independent).collect()
    } else {
        claims
    }
}

struct InfringementJob {
    descriptor: JobDescriptor,
    request: InfringementRequest,
    collaborators: InfringementCollaborators,
    analysis: ClaimAnalysis,
}

#[async_trait]
impl ReportBuilder for InfringementJob {
    fn descriptor(&self) -> &JobDescriptor {
        &self.descriptor
    }

    async fn build(&self, ctx: &GenerationContext) -> Result<BuiltReport, ReportError> {
        let request = &self.request;
        let mode = request.mode;
        let min = ctx.min_successful_items();
        let mut failures = Vec::new();

        let patents: Vec<(String, String)> = request
            .owned_patents
            .iter()
            .map(|p| (p.clone(), p.clone()))
            .collect();
        let parsed = ctx
            .collect("claim_parsing", patents, |patent: String| async move {
                let claims = self.collaborators.claims.parse_claims(&patent).await?;
                if claims.is_empty() {
                    return Err(CollaboratorError::failed(
                        "claim parser",
                        format!("patent {} has no claims", patent),
                    ));
                }
                Ok::<_, CollaboratorError>((patent, claims_to_compare(claims)))
            })
            .await?
            .require(min, "owned patent parsed")?
            .drain_into(&mut failures);
        let owned_patents: Vec<String> = parsed.iter().map(|(p, _)| p.clone()).collect();
        let claims: Vec<ClaimData> = parsed.into_iter().flat_map(|(_, c)| c).collect();
        ctx.progress(20, "extracting targets").await;

        let documents: Vec<(String, AuxDocument)> = request
            .documents
            .iter()
            .map(|d| (d.id.clone(), d.clone()))
            .collect();
        let extracted = ctx
            .collect("entity_extraction", documents, |document: AuxDocument| async move {
                let entities = self.collaborators.extractor.extract(&document.text).await?;
                Ok::<_, CollaboratorError>((document.id, entities))
            })
            .await?
            .drain_into(&mut failures);

        let mut candidates: Vec<(String, (String, TargetSource))> = request
            .suspected_molecules
            .iter()
            .map(|m| (m.clone(), (m.clone(), TargetSource::Direct)))
            .collect();
        for (document_id, entities) in extracted {
            for entity in entities {
                let source = TargetSource::Extracted {
                    document_id: document_id.clone(),
                };
                candidates.push((format!("{} ({})", entity, document_id), (entity, source)));
            }
        }
        let normalized = ctx
            .collect(
                "molecule_normalization",
                candidates,
                |(input, source): (String, TargetSource)| async move {
                    let molecule = self.collaborators.normalizer.normalize(&input).await?;
                    Ok::<_, CollaboratorError>((molecule, source))
                },
            )
            .await?
            .require(min, "target molecule normalized")?
            .drain_into(&mut failures);
        let targets = dedup_targets(normalized);
        ctx.progress(40, "building infringement matrix").await;

        let cells: Vec<(String, (ClaimData, Target))> = claims
            .iter()
            .flat_map(|claim| {
                targets.iter().map(move |target| {
                    (
                        format!(
                            "{} claim {} vs {}",
                            claim.patent_number, claim.claim_id, target.molecule.input
                        ),
                        (claim.clone(), target.clone()),
                    )
                })
            })
            .collect();
        let matrix = ctx
            .collect(
                "assessment",
                cells,
                |(claim, target): (ClaimData, Target)| async move {
                    let row = self.analysis.compare(&claim, &target.molecule, mode).await?;
                    Ok::<_, CollaboratorError>(MatrixEntry {
                        patent_number: claim.patent_number,
                        claim_id: claim.claim_id,
                        target: target.molecule.input,
                        structure_hash: target.molecule.structure_hash,
                        sources: target.sources,
                        literal_probability: row.literal_probability,
                        equivalents_probability: row.equivalents_probability,
                        estoppel_applies: row.estoppel_applies,
                        risk: row.risk,
                        rationale: row.rationale,
                    })
                },
            )
            .await?
            .drain_into(&mut failures);

        let levels: Vec<RiskLevel> = matrix.iter().map(|row| row.risk).collect();
        let summary = RiskSummary::from_levels(&levels);
        let mut rollup = ReportRollup {
            risk_counts: summary.risk_counts.clone(),
            overall_risk: summary.overall_risk,
            items_analyzed: targets.len() as u32,
            items_failed: failures.len() as u32,
            scores: Default::default(),
        };
        rollup
            .scores
            .insert("claims_analyzed".to_string(), claims.len() as f64);

        let data = InfringementReportData {
            title: self.descriptor.title.clone(),
            generated_at: Utc::now().to_rfc3339(),
            language: request.language,
            mode,
            owned_patents,
            claims_analyzed: claims.len() as u32,
            targets,
            summary,
            matrix,
            failures,
        };
        Ok(BuiltReport {
            payload: ReportPayload::Infringement(data),
            rollup,
        })
    }
}

/// Generates infringement reports.
pub struct InfringementOrchestrator {
    services: Arc<ReportServices>,
    collaborators: InfringementCollaborators,
}

impl InfringementOrchestrator {
    pub fn new(services: Arc<ReportServices>, collaborators: InfringementCollaborators) -> Self {
        Self {
            services,
            collaborators,
        }
    }

    /// Validates `request` and checks the output format is producible.
    pub fn validate(&self, request: &mut InfringementRequest) -> Result<(), ReportError> {
        request.validate()?;
        self.services.ensure_format_supported(request.format)
    }

    pub async fn generate(
        &self,
        request: InfringementRequest,
    ) -> Result<GenerateResponse, ReportError> {
        self.generate_with_cancel(request, CancelToken::never()).await
    }

    /// Like [`generate`](Self::generate); `cancel` applies to the inline path.
    pub async fn generate_with_cancel(
        &self,
        mut request: InfringementRequest,
        cancel: CancelToken,
    ) -> Result<GenerateResponse, ReportError> {
        self.validate(&mut request)?;
        let descriptor = JobDescriptor {
            report_type: ReportType::Infringement,
            owner_id: request.requested_by.clone(),
            requested_by: request.requested_by.clone(),
            title: request.title.clone().unwrap_or_else(|| {
                format!("Infringement analysis of {}", request.owned_patents.join(", "))
            }),
            format: request.format,
            language: request.language,
            template_id: request
                .template_id
                .clone()
                .unwrap_or_else(|| ReportType::Infringement.default_template_id().to_string()),
            lock_key: lock_key(
                ReportType::Infringement,
                &set_fingerprint(&request.owned_patents),
            ),
            target_sizes: vec![request.owned_patents.len(), request.target_count()],
        };
        let job = InfringementJob {
            descriptor,
            request,
            analysis: ClaimAnalysis::new(
                Arc::clone(&self.collaborators.assessor),
                Arc::clone(&self.collaborators.equivalents),
            ),
            collaborators: self.collaborators.clone(),
        };
        generate(&self.services, Arc::new(job), cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> InfringementRequest {
        InfringementRequest::new(vec!["us1234567b2".into()], vec!["CCO".into()], "legal")
    }

    #[test]
    fn test_validate_normalizes_patents() {
        let mut req = request();
        req.owned_patents.push(" US1234567B2 ".into());
        req.validate().unwrap();
        assert_eq!(req.owned_patents, vec!["US1234567B2"]);
    }

    #[test]
    fn test_documents_count_as_targets() {
        let mut req = InfringementRequest::new(vec!["US1".into()], vec![], "legal")
            .with_documents(vec![AuxDocument::new("doc-1", "contains ethanol")]);
        req.validate().unwrap();
        assert_eq!(req.target_count(), 1);

        let mut req = InfringementRequest::new(vec!["US1".into()], vec![], "legal");
        assert!(matches!(req.validate(), Err(ReportError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_missing_owned_patents() {
        let mut req = request();
        req.owned_patents.clear();
        assert!(matches!(req.validate(), Err(ReportError::Validation(_))));

        let mut req = request();
        req.owned_patents = vec!["".into()];
        assert!(matches!(req.validate(), Err(ReportError::Validation(_))));
    }

    #[test]
    fn test_literal_mode_upgraded() {
        let mut req = request().with_equivalents(true);
        req.validate().unwrap();
        assert_eq!(req.mode, AnalysisMode::Equivalents);

        let mut req = request().with_mode(AnalysisMode::Full).with_equivalents(true);
        req.validate().unwrap();
        assert_eq!(req.mode, AnalysisMode::Full);
    }

    #[test]
    fn test_claims_to_compare_prefers_independent() {
        let claim = |id: &str, independent: bool| ClaimData {
            patent_number: "US1".into(),
            claim_id: id.into(),
            text: String::new(),
            independent,
            elements: vec![],
        };
        let picked = claims_to_compare(vec![claim("1", true), claim("2", false)]);
        assert_eq!(picked.len(), 1);
        let all = claims_to_compare(vec![claim("2", false), claim("3", false)]);
        assert_eq!(all.len(), 2);
    }
}
