//! Render envelopes and the closed set of report payloads.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tera::Context;

use super::charts::ChartSpec;
use crate::error::TemplateError;
use crate::report::fto::FtoReportData;
use crate::report::infringement::InfringementReportData;
use crate::report::portfolio::PortfolioReportData;
use crate::types::{Language, ReportFormat, ReportType};

/// Options that do not change the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub title: Option<String>,
    /// Render embedded charts. Off means the `charts` context map is empty.
    #[serde(default = "default_include_charts")]
    pub include_charts: bool,
}

fn default_include_charts() -> bool {
    true
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            language: Language::En,
            title: None,
            include_charts: true,
        }
    }
}

/// Data bound into a template.
///
/// Each report family has its own variant; `Custom` carries arbitrary JSON
/// for ad hoc templates and is bound at the top level of the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ReportPayload {
    Fto(FtoReportData),
    Infringement(InfringementReportData),
    Portfolio(PortfolioReportData),
    Custom(serde_json::Value),
}

impl ReportPayload {
    /// Report family of a structured payload.
    pub fn report_type(&self) -> Option<ReportType> {
        match self {
            ReportPayload::Fto(_) => Some(ReportType::Fto),
            ReportPayload::Infringement(_) => Some(ReportType::Infringement),
            ReportPayload::Portfolio(_) => Some(ReportType::Portfolio),
            ReportPayload::Custom(_) => None,
        }
    }

    /// Charts embedded by this payload's family.
    pub fn charts(&self) -> Vec<ChartSpec> {
        match self {
            ReportPayload::Fto(data) => data.charts(),
            ReportPayload::Infringement(data) => data.charts(),
            ReportPayload::Portfolio(data) => data.charts(),
            ReportPayload::Custom(_) => Vec::new(),
        }
    }

    /// Parses caller-supplied JSON, keeping untagged documents as `Custom`.
    pub fn from_json(value: serde_json::Value) -> Self {
        match serde_json::from_value::<ReportPayload>(value.clone()) {
            Ok(payload) => payload,
            Err(_) => ReportPayload::Custom(value),
        }
    }

    /// Builds the Tera context.
    ///
    /// Structured payloads are bound as `report`. Every context also has
    /// `charts` (chart id → data URI), `options` and `generated_at`.
    pub(crate) fn to_context(
        &self,
        charts: &BTreeMap<String, String>,
        options: &RenderOptions,
    ) -> Result<Context, TemplateError> {
        let mut context = match self {
            ReportPayload::Fto(data) => Context::from_serialize(ReportContext { report: data })?,
            ReportPayload::Infringement(data) => {
                Context::from_serialize(ReportContext { report: data })?
            }
            ReportPayload::Portfolio(data) => {
                Context::from_serialize(ReportContext { report: data })?
            }
            ReportPayload::Custom(value) if value.is_object() => Context::from_value(value.clone())?,
            ReportPayload::Custom(value) => {
                let mut context = Context::new();
                context.insert("data", value);
                context
            }
        };
        context.insert("charts", charts);
        context.insert("options", options);
        context.insert("generated_at", &Utc::now().to_rfc3339());
        Ok(context)
    }
}

#[derive(Serialize)]
struct ReportContext<'a, T: Serialize> {
    report: &'a T,
}

/// A render call.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub template_id: String,
    pub payload: ReportPayload,
    pub format: ReportFormat,
    pub options: RenderOptions,
}

impl RenderRequest {
    pub fn new(template_id: impl Into<String>, payload: ReportPayload, format: ReportFormat) -> Self {
        Self {
            template_id: template_id.into(),
            payload,
            format,
            options: RenderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }
}

/// Output of a render call.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderResult {
    pub content: Vec<u8>,
    pub content_type: String,
    pub format: ReportFormat,
    pub template_id: String,
    pub template_version: String,
    pub duration: Duration,
    /// Non-fatal problems, e.g. charts replaced by placeholders.
    pub warnings: Vec<String>,
}
