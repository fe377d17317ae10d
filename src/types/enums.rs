//! Closed enumerations shared by requests, metadata and templates.
//!
//! Each enum owns its allowed value set through `ALL` and a single
//! `FromStr` implementation, so request validators never keep their own
//! lists of accepted strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReportError;

/// Builds the validation error for an unrecognised enum token.
fn unknown_value(field: &str, value: &str, allowed: &[&str]) -> ReportError {
    ReportError::Validation(format!(
        "unknown {} '{}': expected one of {}",
        field,
        value,
        allowed.join(", ")
    ))
}

/// Output format of a rendered report.
///
/// The uppercase token is used in artifact keys
/// (`reports/<family>/<reportID>.<FORMAT>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportFormat {
    Html,
    Pdf,
    Docx,
    Pptx,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 4] = [
        ReportFormat::Html,
        ReportFormat::Pdf,
        ReportFormat::Docx,
        ReportFormat::Pptx,
    ];

    /// Uppercase token used in keys and on the wire.
    pub fn token(&self) -> &'static str {
        match self {
            ReportFormat::Html => "HTML",
            ReportFormat::Pdf => "PDF",
            ReportFormat::Docx => "DOCX",
            ReportFormat::Pptx => "PPTX",
        }
    }

    /// MIME type of artifacts in this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Html => "text/html; charset=utf-8",
            ReportFormat::Pdf => "application/pdf",
            ReportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ReportFormat::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        ReportFormat::ALL
            .into_iter()
            .find(|f| f.token() == upper)
            .ok_or_else(|| unknown_value("format", s, &["HTML", "PDF", "DOCX", "PPTX"]))
    }
}

/// Report family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Fto,
    Infringement,
    Portfolio,
}

impl ReportType {
    pub const ALL: [ReportType; 3] = [
        ReportType::Fto,
        ReportType::Infringement,
        ReportType::Portfolio,
    ];

    /// Family segment used in artifact keys and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Fto => "fto",
            ReportType::Infringement => "infringement",
            ReportType::Portfolio => "portfolio",
        }
    }

    /// Built-in template used when a request does not name one.
    pub fn default_template_id(&self) -> &'static str {
        match self {
            ReportType::Fto => "fto-default",
            ReportType::Infringement => "infringement-default",
            ReportType::Portfolio => "portfolio-default",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        ReportType::ALL
            .into_iter()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| unknown_value("report type", s, &["fto", "infringement", "portfolio"]))
    }
}

/// Lifecycle status of a report.
///
/// `Queued → Processing → {Completed | Failed}`. `Failed` is reachable from
/// any non-terminal state; no state is re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 4] = [
        ReportStatus::Queued,
        ReportStatus::Processing,
        ReportStatus::Completed,
        ReportStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Queued => "queued",
            ReportStatus::Processing => "processing",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Completed | ReportStatus::Failed)
    }

    /// Returns true if `self → next` is a legal transition.
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        use ReportStatus::*;
        matches!(
            (self, next),
            (Queued, Processing) | (Queued, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }

    /// Validates and performs a transition.
    pub fn transition(self, next: ReportStatus) -> Result<ReportStatus, ReportError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ReportError::InvalidState(format!(
                "illegal status transition {} -> {}",
                self, next
            )))
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        ReportStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == lower)
            .ok_or_else(|| {
                unknown_value(
                    "status",
                    s,
                    &["queued", "processing", "completed", "failed"],
                )
            })
    }
}

/// FTO analysis depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    /// Literal comparison only.
    Quick,
    /// Literal plus doctrine of equivalents.
    Standard,
    /// Literal, equivalents and prosecution-history estoppel.
    Full,
}

impl AnalysisDepth {
    pub const ALL: [AnalysisDepth; 3] = [
        AnalysisDepth::Quick,
        AnalysisDepth::Standard,
        AnalysisDepth::Full,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisDepth::Quick => "quick",
            AnalysisDepth::Standard => "standard",
            AnalysisDepth::Full => "full",
        }
    }

    /// Comparison mode implied by this depth.
    pub fn mode(&self) -> AnalysisMode {
        match self {
            AnalysisDepth::Quick => AnalysisMode::Literal,
            AnalysisDepth::Standard => AnalysisMode::Equivalents,
            AnalysisDepth::Full => AnalysisMode::Full,
        }
    }
}

impl fmt::Display for AnalysisDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AnalysisDepth {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        AnalysisDepth::ALL
            .into_iter()
            .find(|d| d.as_str() == lower)
            .ok_or_else(|| unknown_value("analysis depth", s, &["quick", "standard", "full"]))
    }
}

/// Claim comparison mode, in increasing analytical depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Literal,
    Equivalents,
    Full,
}

impl AnalysisMode {
    pub const ALL: [AnalysisMode; 3] = [
        AnalysisMode::Literal,
        AnalysisMode::Equivalents,
        AnalysisMode::Full,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Literal => "literal",
            AnalysisMode::Equivalents => "equivalents",
            AnalysisMode::Full => "full",
        }
    }

    pub fn includes_equivalents(&self) -> bool {
        *self >= AnalysisMode::Equivalents
    }

    pub fn includes_estoppel(&self) -> bool {
        *self == AnalysisMode::Full
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AnalysisMode {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        AnalysisMode::ALL
            .into_iter()
            .find(|m| m.as_str() == lower)
            .ok_or_else(|| unknown_value("analysis mode", s, &["literal", "equivalents", "full"]))
    }
}

/// Report language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::Zh];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Language {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Language::ALL
            .into_iter()
            .find(|l| l.as_str() == lower)
            .ok_or_else(|| unknown_value("language", s, &["en", "zh"]))
    }
}

/// Ordered risk level of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Negligible,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 5] = [
        RiskLevel::Negligible,
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Negligible => "negligible",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Portfolio analysis dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Technology,
    Legal,
    Market,
    Citation,
    Geographic,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Technology,
        Dimension::Legal,
        Dimension::Market,
        Dimension::Citation,
        Dimension::Geographic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Technology => "technology",
            Dimension::Legal => "legal",
            Dimension::Market => "market",
            Dimension::Citation => "citation",
            Dimension::Geographic => "geographic",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Dimension::ALL
            .into_iter()
            .find(|d| d.as_str() == lower)
            .ok_or_else(|| {
                unknown_value(
                    "dimension",
                    s,
                    &["technology", "legal", "market", "citation", "geographic"],
                )
            })
    }
}
