//! Deterministic in-memory collaborators for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Semaphore;

use reportforge::collaborators::{
    Assessment, ChemicalExtractor, ClaimData, ClaimParser, CompetitorAnalyzer, CompetitorSlice,
    EquivalentsAnalyzer, EquivalentsResult, InfringementAssessor, MoleculeNormalizer,
    NormalizedMolecule, PatentDetail, PatentLookup, PatentValuation, PatentValuator,
    SimilarityCandidate, SimilaritySearch,
};
use reportforge::config::ReportingConfig;
use reportforge::report::{
    FtoCollaborators, InfringementCollaborators, PortfolioCollaborators, RenderPlugins,
    ReportServices,
};
use reportforge::storage::{ByteStream, MemoryObjectStorage, ObjectStorage, StorageError};
use reportforge::template::{ChartRenderer, ChartSpec, FormatConverter, RenderOptions};
use reportforge::types::{AnalysisMode, Dimension, ReportFormat};
use reportforge::CollaboratorError;

/// Canonical form is the sorted characters, so `CCO` and `OCC` collide.
pub struct SortingNormalizer;

#[async_trait]
impl MoleculeNormalizer for SortingNormalizer {
    async fn normalize(&self, input: &str) -> Result<NormalizedMolecule, CollaboratorError> {
        if input.starts_with("bad") {
            return Err(CollaboratorError::invalid_input(
                "normalizer",
                input,
                "unparseable structure",
            ));
        }
        let mut chars: Vec<char> = input.chars().collect();
        chars.sort_unstable();
        let canonical: String = chars.into_iter().collect();
        Ok(NormalizedMolecule {
            input: input.to_string(),
            canonical_smiles: canonical.clone(),
            structure_hash: canonical,
        })
    }
}

/// One candidate per molecule and jurisdiction; optionally waits on a gate.
pub struct FixedSearch {
    pub gate: Option<Arc<Semaphore>>,
}

#[async_trait]
impl SimilaritySearch for FixedSearch {
    async fn search(
        &self,
        molecule: &NormalizedMolecule,
        jurisdiction: &str,
        _threshold: f64,
        _limit: usize,
    ) -> Result<Vec<SimilarityCandidate>, CollaboratorError> {
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| CollaboratorError::failed("similarity", "gate closed"))?;
        }
        Ok(vec![SimilarityCandidate {
            patent_number: format!("{}-{}", jurisdiction, molecule.structure_hash),
            title: format!("Compounds related to {}", molecule.canonical_smiles),
            assignee: Some("Rival Pharma".into()),
            jurisdiction: jurisdiction.to_string(),
            similarity: 0.82,
            matched_claims: vec![],
            expiry_date: NaiveDate::from_ymd_opt(2035, 6, 1),
        }])
    }
}

/// Claim 1 independent, claim 2 dependent; patents starting with `BAD` fail.
pub struct TwoClaimParser;

#[async_trait]
impl ClaimParser for TwoClaimParser {
    async fn parse_claims(&self, patent_number: &str) -> Result<Vec<ClaimData>, CollaboratorError> {
        if patent_number.starts_with("BAD") {
            return Err(CollaboratorError::failed("claim parser", "document unavailable"));
        }
        Ok(vec![
            ClaimData {
                patent_number: patent_number.to_string(),
                claim_id: "1".into(),
                text: "A compound of formula I.".into(),
                independent: true,
                elements: vec!["formula I".into()],
            },
            ClaimData {
                patent_number: patent_number.to_string(),
                claim_id: "2".into(),
                text: "The compound of claim 1, wherein R is methyl.".into(),
                independent: false,
                elements: vec!["methyl".into()],
            },
        ])
    }
}

pub struct FixedAssessor {
    pub literal: f64,
}

#[async_trait]
impl InfringementAssessor for FixedAssessor {
    async fn assess(
        &self,
        _claim: &ClaimData,
        _molecule: &NormalizedMolecule,
        _mode: AnalysisMode,
    ) -> Result<Assessment, CollaboratorError> {
        Ok(Assessment {
            literal_probability: self.literal,
            rationale: Some("all elements present".into()),
        })
    }
}

pub struct FixedEquivalents {
    pub probability: f64,
    pub estoppel: bool,
}

#[async_trait]
impl EquivalentsAnalyzer for FixedEquivalents {
    async fn analyze(
        &self,
        _claim: &ClaimData,
        _molecule: &NormalizedMolecule,
        include_estoppel: bool,
    ) -> Result<EquivalentsResult, CollaboratorError> {
        Ok(EquivalentsResult {
            probability: self.probability,
            estoppel_applies: include_estoppel && self.estoppel,
            rationale: None,
        })
    }
}

/// Every whitespace-separated token is an entity.
pub struct TokenExtractor;

#[async_trait]
impl ChemicalExtractor for TokenExtractor {
    async fn extract(&self, document: &str) -> Result<Vec<String>, CollaboratorError> {
        Ok(document.split_whitespace().map(str::to_string).collect())
    }
}

/// Resolves any patent except those starting with `MISSING`.
pub struct FixedLookup;

#[async_trait]
impl PatentLookup for FixedLookup {
    async fn get_patent(&self, patent_number: &str) -> Result<PatentDetail, CollaboratorError> {
        if patent_number.starts_with("MISSING") {
            return Err(CollaboratorError::failed("patent lookup", "unknown patent"));
        }
        Ok(PatentDetail {
            patent_number: patent_number.to_string(),
            title: format!("Patent {}", patent_number),
            assignee: Some("Acme".into()),
            jurisdiction: "US".into(),
            filing_date: NaiveDate::from_ymd_opt(2020, 3, 1).unwrap_or_default(),
            expiry_date: None,
            technology_classes: vec!["C07D".into()],
            forward_citations: 4,
            in_force: true,
        })
    }
}

/// Value is the numeric part of the patent number.
pub struct DigitValuator;

#[async_trait]
impl PatentValuator for DigitValuator {
    async fn value(&self, patent: &PatentDetail) -> Result<PatentValuation, CollaboratorError> {
        let digits: String = patent
            .patent_number
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        let value = digits
            .parse::<f64>()
            .map_err(|_| CollaboratorError::failed("valuator", "no digits"))?;
        Ok(PatentValuation {
            patent_number: patent.patent_number.clone(),
            value,
            quality_score: 70.0,
        })
    }
}

pub struct FixedCompetitors;

#[async_trait]
impl CompetitorAnalyzer for FixedCompetitors {
    async fn competitor_slice(
        &self,
        competitor: &str,
        _technology_classes: &[String],
    ) -> Result<CompetitorSlice, CollaboratorError> {
        let mut dimension_scores = BTreeMap::new();
        dimension_scores.insert(Dimension::Technology, 50.0);
        dimension_scores.insert(Dimension::Market, 70.0);
        Ok(CompetitorSlice {
            competitor: competitor.to_string(),
            patent_count: 10,
            dimension_scores,
        })
    }
}

/// Reports standings under a canonical holder name instead of the one asked for.
pub struct CanonicalNameCompetitors;

#[async_trait]
impl CompetitorAnalyzer for CanonicalNameCompetitors {
    async fn competitor_slice(
        &self,
        competitor: &str,
        technology_classes: &[String],
    ) -> Result<CompetitorSlice, CollaboratorError> {
        let mut slice = FixedCompetitors
            .competitor_slice(competitor, technology_classes)
            .await?;
        slice.competitor = format!("{} Holdings Inc.", competitor.to_uppercase());
        Ok(slice)
    }
}

/// Reads go to memory; every save fails.
#[derive(Default)]
pub struct ReadOnlyStorage {
    inner: MemoryObjectStorage,
}

#[async_trait]
impl ObjectStorage for ReadOnlyStorage {
    async fn save(
        &self,
        _key: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only volume",
        )))
    }

    async fn get_stream(&self, key: &str) -> Result<ByteStream, StorageError> {
        self.inner.get_stream(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.inner.exists(key).await
    }
}

pub const PDF_MAGIC: &[u8] = b"%PDF-1.7\n";

/// "Converts" to PDF by prefixing the HTML with a PDF header.
pub struct HeaderPdfConverter;

#[async_trait]
impl FormatConverter for HeaderPdfConverter {
    fn format(&self) -> ReportFormat {
        ReportFormat::Pdf
    }

    async fn convert(
        &self,
        html: &str,
        _options: &RenderOptions,
    ) -> Result<Vec<u8>, CollaboratorError> {
        let mut bytes = PDF_MAGIC.to_vec();
        bytes.extend_from_slice(html.as_bytes());
        Ok(bytes)
    }
}

pub struct BrokenPdfConverter;

#[async_trait]
impl FormatConverter for BrokenPdfConverter {
    fn format(&self) -> ReportFormat {
        ReportFormat::Pdf
    }

    async fn convert(
        &self,
        _html: &str,
        _options: &RenderOptions,
    ) -> Result<Vec<u8>, CollaboratorError> {
        Err(CollaboratorError::failed("pdf", "renderer process exited"))
    }
}

pub const CHART_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 7, 7, 7];

pub struct StaticChartRenderer;

#[async_trait]
impl ChartRenderer for StaticChartRenderer {
    async fn render(&self, _chart: &ChartSpec) -> Result<Vec<u8>, CollaboratorError> {
        Ok(CHART_BYTES.to_vec())
    }
}

pub async fn services(config: ReportingConfig) -> Arc<ReportServices> {
    Arc::new(ReportServices::in_memory(config).await.unwrap())
}

pub async fn services_with(
    config: ReportingConfig,
    plugins: RenderPlugins,
) -> Arc<ReportServices> {
    Arc::new(ReportServices::in_memory_with(config, plugins).await.unwrap())
}

pub fn fto_collaborators(gate: Option<Arc<Semaphore>>) -> FtoCollaborators {
    FtoCollaborators {
        normalizer: Arc::new(SortingNormalizer),
        similarity: Arc::new(FixedSearch { gate }),
        claims: Arc::new(TwoClaimParser),
        assessor: Arc::new(FixedAssessor { literal: 0.8 }),
        equivalents: Arc::new(FixedEquivalents {
            probability: 0.6,
            estoppel: false,
        }),
    }
}

pub fn infringement_collaborators() -> InfringementCollaborators {
    InfringementCollaborators {
        claims: Arc::new(TwoClaimParser),
        extractor: Arc::new(TokenExtractor),
        normalizer: Arc::new(SortingNormalizer),
        assessor: Arc::new(FixedAssessor { literal: 0.8 }),
        equivalents: Arc::new(FixedEquivalents {
            probability: 0.95,
            estoppel: true,
        }),
    }
}

pub fn portfolio_collaborators() -> PortfolioCollaborators {
    PortfolioCollaborators {
        lookup: Arc::new(FixedLookup),
        valuator: Arc::new(DigitValuator),
        competitors: Arc::new(FixedCompetitors),
    }
}
