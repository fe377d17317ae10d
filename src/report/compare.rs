//! Claim-versus-molecule comparison shared by FTO and infringement reports.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analytics::risk_level;
use crate::collaborators::{ClaimData, EquivalentsAnalyzer, InfringementAssessor, NormalizedMolecule};
use crate::error::CollaboratorError;
use crate::types::{AnalysisMode, RiskLevel};

/// Outcome of comparing one claim with one molecule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimComparison {
    pub literal_probability: f64,
    /// `None` when the mode skips equivalents; `Some(0.0)` when estopped.
    pub equivalents_probability: Option<f64>,
    pub estoppel_applies: bool,
    pub risk: RiskLevel,
    pub rationale: Option<String>,
}

impl ClaimComparison {
    /// Combines the literal and equivalents results.
    ///
    /// Estoppel removes the equivalents argument entirely, so the row risk
    /// falls back to the literal probability.
    pub fn combine(
        literal_probability: f64,
        equivalents: Option<(f64, bool)>,
        rationale: Option<String>,
    ) -> Self {
        let (equivalents_probability, estoppel_applies) = match equivalents {
            Some((_, true)) => (Some(0.0), true),
            Some((p, false)) => (Some(p), false),
            None => (None, false),
        };
        let effective = literal_probability.max(equivalents_probability.unwrap_or(0.0));
        Self {
            literal_probability,
            equivalents_probability,
            estoppel_applies,
            risk: risk_level(effective),
            rationale,
        }
    }

    /// Highest of the two probabilities after estoppel.
    pub fn effective_probability(&self) -> f64 {
        self.literal_probability
            .max(self.equivalents_probability.unwrap_or(0.0))
    }
}

/// Collaborators needed to compare claims.
#[derive(Clone)]
pub struct ClaimAnalysis {
    pub assessor: Arc<dyn InfringementAssessor>,
    pub equivalents: Arc<dyn EquivalentsAnalyzer>,
}

impl ClaimAnalysis {
    pub fn new(
        assessor: Arc<dyn InfringementAssessor>,
        equivalents: Arc<dyn EquivalentsAnalyzer>,
    ) -> Self {
        Self {
            assessor,
            equivalents,
        }
    }

    /// Literal assessment, then equivalents when `mode` asks for it.
    pub async fn compare(
        &self,
        claim: &ClaimData,
        molecule: &NormalizedMolecule,
        mode: AnalysisMode,
    ) -> Result<ClaimComparison, CollaboratorError> {
        let literal = self.assessor.assess(claim, molecule, mode).await?;
        let equivalents = if mode.includes_equivalents() {
            let result = self
                .equivalents
                .analyze(claim, molecule, mode.includes_estoppel())
                .await?;
            Some(result)
        } else {
            None
        };

        let rationale = literal
            .rationale
            .or_else(|| equivalents.as_ref().and_then(|e| e.rationale.clone()));
        Ok(ClaimComparison::combine(
            literal.literal_probability,
            equivalents.map(|e| (e.probability, e.estoppel_applies)),
            rationale,
        ))
    }
}
