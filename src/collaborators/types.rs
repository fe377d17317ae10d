//! Data returned by domain collaborators.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::Dimension;

/// A patent found by structural similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityCandidate {
    pub patent_number: String,
    pub title: String,
    #[serde(default)]
    pub assignee: Option<String>,
    pub jurisdiction: String,
    /// Structural similarity in `[0, 1]`.
    pub similarity: f64,
    /// Claims matched by the search, if the index records them.
    #[serde(default)]
    pub matched_claims: Vec<ClaimData>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

/// One parsed claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimData {
    pub patent_number: String,
    pub claim_id: String,
    pub text: String,
    pub independent: bool,
    #[serde(default)]
    pub elements: Vec<String>,
}

/// Result of a literal infringement assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Literal infringement probability in `[0, 1]`.
    pub literal_probability: f64,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// Result of a doctrine-of-equivalents analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalentsResult {
    /// Infringement-by-equivalents probability in `[0, 1]`.
    pub probability: f64,
    /// Prosecution-history estoppel bars the equivalents argument.
    pub estoppel_applies: bool,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// Bibliographic detail of a patent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatentDetail {
    pub patent_number: String,
    pub title: String,
    #[serde(default)]
    pub assignee: Option<String>,
    pub jurisdiction: String,
    pub filing_date: NaiveDate,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub technology_classes: Vec<String>,
    #[serde(default)]
    pub forward_citations: u32,
    /// True while the patent is granted and maintained.
    pub in_force: bool,
}

/// Valuation of a single patent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatentValuation {
    pub patent_number: String,
    /// Monetary or index value; only relative magnitudes matter.
    pub value: f64,
    /// Quality score on the collaborator's scale (typically 0-100+).
    pub quality_score: f64,
}

/// A competitor's standing per analysis dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorSlice {
    pub competitor: String,
    pub patent_count: u32,
    #[serde(default)]
    pub dimension_scores: BTreeMap<Dimension, f64>,
}
