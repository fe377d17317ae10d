//! Report template engine.
//!
//! Templates are Tera (Jinja2-style) HTML sources stored in a
//! [`TemplateRepository`]. The [`TemplateEngine`] validates them before
//! they are persisted, caches compiled forms by `id:version`, renders
//! embedded charts concurrently and converts the HTML into the requested
//! output format.
//!
//! # Example
//!
//! ```ignore
//! use reportforge::template::{MemoryTemplateRepository, NewTemplate, TemplateEngine};
//!
//! let engine = TemplateEngine::new(Arc::new(MemoryTemplateRepository::new()));
//! engine.install_defaults().await?;
//! let result = engine.render(request).await?;
//! ```

pub mod charts;
pub mod convert;
pub mod defaults;
pub mod engine;
pub mod repository;
pub mod schema;
pub mod types;
pub mod variables;

pub use charts::{ChartImages, ChartKind, ChartRenderer, ChartSpec};
pub use convert::{ConverterRegistry, FormatConverter};
pub use defaults::{default_template, default_templates};
pub use engine::{CacheStats, TemplateEngine};
pub use repository::{MemoryTemplateRepository, TemplateRepository};
pub use schema::{NewTemplate, Template, TemplateDefinition, INITIAL_VERSION};
pub use types::{RenderOptions, RenderRequest, RenderResult, ReportPayload};
pub use variables::{extract_placeholders, validate_source, TemplateValidation};
