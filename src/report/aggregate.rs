//! Accumulation of per-item collaborator results.
//!
//! A failed item is a row failure: it is recorded and skipped. Only a
//! mandatory category with too few successes fails the whole generation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analytics::{overall_risk, risk_counts};
use crate::error::{CollaboratorError, ReportError};
use crate::types::RiskLevel;

/// One skipped item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Collection category, e.g. `claim_parsing`.
    pub category: String,
    /// Identifier of the item that failed.
    pub item: String,
    pub error: String,
}

/// Successes and failures of one collection category.
#[derive(Debug, Clone, PartialEq)]
pub struct Collected<T> {
    pub category: String,
    pub successes: Vec<T>,
    pub failures: Vec<ItemFailure>,
}

impl<T> Collected<T> {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            successes: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Records the outcome for `item`.
    pub fn record(&mut self, item: impl Into<String>, outcome: Result<T, CollaboratorError>) {
        match outcome {
            Ok(value) => self.successes.push(value),
            Err(e) => self.failures.push(ItemFailure {
                category: self.category.clone(),
                item: item.into(),
                error: e.to_string(),
            }),
        }
    }

    pub fn attempted(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    /// Fails with `InvalidState` unless at least `min` items succeeded.
    ///
    /// `what` names the entity in the error, e.g. "owned patent parsed".
    pub fn require(self, min: usize, what: &str) -> Result<Self, ReportError> {
        if self.successes.len() >= min.max(1) {
            return Ok(self);
        }
        let detail = self
            .failures
            .first()
            .map(|f| format!("; first error: {}", f.error))
            .unwrap_or_default();
        Err(ReportError::InvalidState(format!(
            "no valid {} ({} of {} succeeded, {} required){}",
            what,
            self.successes.len(),
            self.attempted(),
            min.max(1),
            detail
        )))
    }

    /// Splits into successes, moving failures into `failures`.
    pub fn drain_into(self, failures: &mut Vec<ItemFailure>) -> Vec<T> {
        failures.extend(self.failures);
        self.successes
    }
}

/// Risk rollup over a comparison matrix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub risk_counts: BTreeMap<RiskLevel, u32>,
    pub overall_risk: Option<RiskLevel>,
    pub rows: u32,
}

impl RiskSummary {
    pub fn from_levels(levels: &[RiskLevel]) -> Self {
        Self {
            risk_counts: risk_counts(levels.iter().copied()),
            overall_risk: overall_risk(levels.iter().copied()),
            rows: levels.len() as u32,
        }
    }

    /// Count for `level`, zero when absent.
    pub fn count(&self, level: RiskLevel) -> u32 {
        self.risk_counts.get(&level).copied().unwrap_or(0)
    }
}
