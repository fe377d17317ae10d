//! Opaque domain analysis collaborators.
//!
//! The pipeline calls these as black boxes. Every failure they return is an
//! item-level failure: the orchestrator records it, skips the item, and
//! carries on with whatever else succeeded.

pub mod types;

pub use types::{
    Assessment, ClaimData, CompetitorSlice, EquivalentsResult, PatentDetail, PatentValuation,
    SimilarityCandidate,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::types::AnalysisMode;

/// A molecule after normalization and validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedMolecule {
    /// Identifier as supplied by the caller.
    pub input: String,
    /// Canonical structural representation.
    pub canonical_smiles: String,
    /// Canonical structure hash used as identity key.
    pub structure_hash: String,
}

/// Validates and canonicalizes molecule identifiers.
#[async_trait]
pub trait MoleculeNormalizer: Send + Sync {
    async fn normalize(&self, input: &str) -> Result<NormalizedMolecule, CollaboratorError>;
}

/// Structural similarity search over the patent corpus.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn search(
        &self,
        molecule: &NormalizedMolecule,
        jurisdiction: &str,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<SimilarityCandidate>, CollaboratorError>;
}

/// Parses a patent's claims into structured elements.
#[async_trait]
pub trait ClaimParser: Send + Sync {
    async fn parse_claims(&self, patent_number: &str) -> Result<Vec<ClaimData>, CollaboratorError>;
}

/// Literal infringement assessment of one claim against one molecule.
#[async_trait]
pub trait InfringementAssessor: Send + Sync {
    async fn assess(
        &self,
        claim: &ClaimData,
        molecule: &NormalizedMolecule,
        mode: AnalysisMode,
    ) -> Result<Assessment, CollaboratorError>;
}

/// Doctrine-of-equivalents analysis of one claim against one molecule.
#[async_trait]
pub trait EquivalentsAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        claim: &ClaimData,
        molecule: &NormalizedMolecule,
        include_estoppel: bool,
    ) -> Result<EquivalentsResult, CollaboratorError>;
}

/// Extracts chemical entity identifiers from free text.
#[async_trait]
pub trait ChemicalExtractor: Send + Sync {
    async fn extract(&self, document: &str) -> Result<Vec<String>, CollaboratorError>;
}

/// Bibliographic patent lookup.
#[async_trait]
pub trait PatentLookup: Send + Sync {
    async fn get_patent(&self, patent_number: &str) -> Result<PatentDetail, CollaboratorError>;
}

/// Patent valuation.
#[async_trait]
pub trait PatentValuator: Send + Sync {
    async fn value(&self, patent: &PatentDetail) -> Result<PatentValuation, CollaboratorError>;
}

/// Competitor portfolio slices.
#[async_trait]
pub trait CompetitorAnalyzer: Send + Sync {
    async fn competitor_slice(
        &self,
        competitor: &str,
        technology_classes: &[String],
    ) -> Result<CompetitorSlice, CollaboratorError>;
}
