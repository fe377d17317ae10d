//! Placeholder extraction and dry-compile validation for template sources.

use std::collections::BTreeSet;
use std::error::Error as _;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tera::Tera;

/// Name under which a template source is compiled.
pub const TEMPLATE_NAME: &str = "report.html";

/// Names that are never treated as caller-supplied placeholders.
const RESERVED: [&str; 7] = ["loop", "true", "false", "none", "not", "super", "__tera_context"];

static EXPRESSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{-?\s*([A-Za-z_][A-Za-z0-9_]*)").expect("Invalid regex for expressions")
});

static FOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\{%-?\s*for\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s*,\s*([A-Za-z_][A-Za-z0-9_]*))?\s+in\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("Invalid regex for for-loops")
});

static CONDITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{%-?\s*(?:if|elif)\s+(?:not\s+)?([A-Za-z_][A-Za-z0-9_]*)")
        .expect("Invalid regex for conditions")
});

static SET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{%-?\s*set(?:_global)?\s+([A-Za-z_][A-Za-z0-9_]*)\s*=")
        .expect("Invalid regex for set statements")
});

/// Collects the root variable names a template reads from its context.
///
/// Sources are `{{ var... }}` expressions, `{% if var %}` conditions and
/// `{% for x in var %}` iterables. Loop and `set` bindings are excluded.
pub fn extract_placeholders(content: &str) -> Vec<String> {
    let mut bound: BTreeSet<&str> = BTreeSet::new();
    let mut roots: BTreeSet<&str> = BTreeSet::new();

    for caps in FOR_RE.captures_iter(content) {
        if let Some(m) = caps.get(1) {
            bound.insert(m.as_str());
        }
        if let Some(m) = caps.get(2) {
            bound.insert(m.as_str());
        }
        if let Some(m) = caps.get(3) {
            roots.insert(m.as_str());
        }
    }
    for caps in SET_RE.captures_iter(content) {
        if let Some(m) = caps.get(1) {
            bound.insert(m.as_str());
        }
    }
    for re in [&*EXPRESSION_RE, &*CONDITION_RE] {
        for caps in re.captures_iter(content) {
            if let Some(m) = caps.get(1) {
                roots.insert(m.as_str());
            }
        }
    }

    roots
        .into_iter()
        .filter(|name| !bound.contains(name) && !RESERVED.contains(name))
        .map(str::to_string)
        .collect()
}

/// Outcome of a dry compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub placeholders: Vec<String>,
}

/// Compiles `content` without registering it anywhere.
pub fn validate_source(content: &str) -> TemplateValidation {
    let mut errors = Vec::new();

    if content.trim().is_empty() {
        errors.push("template content is empty".to_string());
    } else {
        let mut tera = Tera::default();
        if let Err(e) = tera.add_raw_template(TEMPLATE_NAME, content) {
            errors.push(error_chain(&e));
        }
    }

    TemplateValidation {
        valid: errors.is_empty(),
        errors,
        placeholders: extract_placeholders(content),
    }
}

/// Flattens a Tera error and its sources into one line.
pub(crate) fn error_chain(err: &tera::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_placeholders() {
        let content = r#"
            <h1>{{ title | upper }}</h1>
            {% if report.summary %}{{ report.summary.overall_risk }}{% endif %}
            {% for row in rows %}<td>{{ row.claim_id }}</td><td>{{ loop.index }}</td>{% endfor %}
            {% set total = rows | length %}{{ total }}
            {% for key, value in scores %}{{ key }}={{ value }}{% endfor %}
        "#;
        assert_eq!(
            extract_placeholders(content),
            vec!["report", "rows", "scores", "title"]
        );
    }

    #[test]
    fn test_validate_source_ok() {
        let result = validate_source("<p>{{ report.title }}</p>");
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert_eq!(result.placeholders, vec!["report"]);
    }

    #[test]
    fn test_validate_source_reports_syntax_errors() {
        let result = validate_source("{% for x in items %}{{ x }}");
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);

        let result = validate_source("   ");
        assert!(!result.valid);
        assert!(result.errors[0].contains("empty"));
    }
}
