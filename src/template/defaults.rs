//! Built-in templates for the three report families.

use crate::types::ReportType;

use super::schema::NewTemplate;

const STYLE: &str = r#"<style>
body { font-family: sans-serif; margin: 2em; color: #222; }
table { border-collapse: collapse; width: 100%; margin: 1em 0; }
th, td { border: 1px solid #ccc; padding: 4px 8px; text-align: left; }
.risk-critical { background: #f8d7da; } .risk-high { background: #fde2c8; }
.risk-medium { background: #fff3cd; } .risk-low { background: #e2f0d9; }
img.chart { max-width: 640px; display: block; margin: 1em 0; }
</style>"#;

const FTO_BODY: &str = r#"<h1>{{ report.title }}</h1>
<p>Generated {{ report.generated_at }} · depth {{ report.depth }} · jurisdictions {{ report.jurisdictions | join(sep=", ") }}</p>
<h2>{% if options.language == "zh" %}风险概览{% else %}Risk overview{% endif %}</h2>
<p>Overall risk: <strong>{% if report.summary.overall_risk %}{{ report.summary.overall_risk }}{% else %}none{% endif %}</strong> across {{ report.summary.rows }} findings.</p>
{% if charts.risk_distribution is defined %}<img class="chart" alt="Risk distribution" src="{{ charts.risk_distribution | safe }}">{% endif %}
<table>
<tr><th>Molecule</th><th>Patent</th><th>Jurisdiction</th><th>Similarity</th><th>Literal</th><th>Equivalents</th><th>Risk</th></tr>
{% for f in report.findings %}<tr class="risk-{{ f.risk }}">
<td>{{ f.molecule }}</td><td>{{ f.patent_number }} {{ f.title }}</td><td>{{ f.jurisdiction }}</td>
<td>{{ f.similarity | round(precision=2) }}</td><td>{{ f.literal_probability | round(precision=2) }}</td>
<td>{% if f.estoppel_applies %}estopped{% elif f.equivalents_probability is number %}{{ f.equivalents_probability | round(precision=2) }}{% else %}n/a{% endif %}</td>
<td>{{ f.risk }}</td></tr>
{% endfor %}</table>
{% if report.failures | length > 0 %}<h2>Skipped items</h2><ul>
{% for item in report.failures %}<li>{{ item.category }} · {{ item.item }}: {{ item.error }}</li>{% endfor %}
</ul>{% endif %}"#;

const INFRINGEMENT_BODY: &str = r#"<h1>{{ report.title }}</h1>
<p>Generated {{ report.generated_at }} · mode {{ report.mode }} · {{ report.claims_analyzed }} claims of {{ report.owned_patents | length }} patents against {{ report.targets | length }} targets</p>
<h2>{% if options.language == "zh" %}侵权矩阵{% else %}Infringement matrix{% endif %}</h2>
<p>Overall risk: <strong>{% if report.summary.overall_risk %}{{ report.summary.overall_risk }}{% else %}none{% endif %}</strong></p>
{% if charts.risk_distribution is defined %}<img class="chart" alt="Risk distribution" src="{{ charts.risk_distribution | safe }}">{% endif %}
<table>
<tr><th>Patent</th><th>Claim</th><th>Target</th><th>Literal</th><th>Equivalents</th><th>Estoppel</th><th>Risk</th></tr>
{% for row in report.matrix %}<tr class="risk-{{ row.risk }}">
<td>{{ row.patent_number }}</td><td>{{ row.claim_id }}</td><td>{{ row.target }}</td>
<td>{{ row.literal_probability | round(precision=2) }}</td>
<td>{% if row.equivalents_probability is number %}{{ row.equivalents_probability | round(precision=2) }}{% else %}n/a{% endif %}</td>
<td>{% if row.estoppel_applies %}yes{% else %}no{% endif %}</td><td>{{ row.risk }}</td></tr>
{% endfor %}</table>
{% if report.failures | length > 0 %}<h2>Skipped items</h2><ul>
{% for item in report.failures %}<li>{{ item.category }} · {{ item.item }}: {{ item.error }}</li>{% endfor %}
</ul>{% endif %}"#;

const PORTFOLIO_BODY: &str = r#"<h1>{{ report.title }}</h1>
<p>Portfolio {{ report.portfolio_id }} · generated {{ report.generated_at }} · {{ report.patents | length }} patents</p>
<h2>{% if options.language == "zh" %}组合健康度{% else %}Portfolio health{% endif %}</h2>
<table>
<tr><th>Health</th><td>{{ report.health.total | round(precision=2) }}</td></tr>
<tr><th>Coverage</th><td>{{ report.health.inputs.coverage | round(precision=2) }}</td></tr>
<tr><th>Concentration</th><td>{{ report.health.inputs.concentration | round(precision=3) }}</td></tr>
<tr><th>Aging</th><td>{{ report.health.inputs.aging | round(precision=2) }}</td></tr>
<tr><th>Activity</th><td>{{ report.health.inputs.activity | round(precision=2) }}</td></tr>
<tr><th>Quality</th><td>{{ report.health.inputs.quality | round(precision=2) }}</td></tr>
<tr><th>Gini</th><td>{{ report.gini | round(precision=3) }}</td></tr>
<tr><th>Top-decile value share</th><td>{{ report.top_share | round(precision=3) }}</td></tr>
</table>
{% if charts.value_distribution is defined %}<img class="chart" alt="Value distribution" src="{{ charts.value_distribution | safe }}">{% endif %}
<h2>Competitiveness</h2>
{% if charts.competitiveness is defined %}<img class="chart" alt="Competitiveness" src="{{ charts.competitiveness | safe }}">{% endif %}
<table>
<tr><th>Holder</th><th>Patents</th><th>Index</th></tr>
{% if report.own_standing %}<tr><td><strong>{{ report.own_standing.name }}</strong></td><td>{{ report.own_standing.patent_count }}</td><td>{{ report.own_standing.index | round(precision=2) }}</td></tr>{% endif %}
{% for c in report.competitors %}<tr><td>{{ c.name }}</td><td>{{ c.patent_count }}</td><td>{{ c.index | round(precision=2) }}</td></tr>
{% endfor %}</table>
<h2>Patents</h2>
<table>
<tr><th>Patent</th><th>Title</th><th>Jurisdiction</th><th>Filed</th><th>In force</th><th>Value</th></tr>
{% for p in report.patents %}<tr><td>{{ p.patent_number }}</td><td>{{ p.title }}</td><td>{{ p.jurisdiction }}</td><td>{{ p.filing_date }}</td>
<td>{% if p.in_force %}yes{% else %}no{% endif %}</td><td>{% if p.value is number %}{{ p.value | round(precision=2) }}{% else %}n/a{% endif %}</td></tr>
{% endfor %}</table>
{% if report.failures | length > 0 %}<h2>Skipped items</h2><ul>
{% for item in report.failures %}<li>{{ item.category }} · {{ item.item }}: {{ item.error }}</li>{% endfor %}
</ul>{% endif %}"#;

fn page(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"{{{{ options.language }}}}\">\n<head><meta charset=\"utf-8\"><title>{{{{ report.title }}}}</title>\n{}\n</head>\n<body>\n{}\n</body>\n</html>\n",
        STYLE, body
    )
}

/// Default template for `report_type`.
pub fn default_template(report_type: ReportType) -> NewTemplate {
    let (name, body) = match report_type {
        ReportType::Fto => ("Freedom-to-operate report", FTO_BODY),
        ReportType::Infringement => ("Infringement report", INFRINGEMENT_BODY),
        ReportType::Portfolio => ("Portfolio report", PORTFOLIO_BODY),
    };
    NewTemplate::new(report_type.default_template_id(), name, page(body))
        .with_description("Built-in template")
        .with_report_type(report_type)
}

/// Default templates for every report family.
pub fn default_templates() -> Vec<NewTemplate> {
    ReportType::ALL.into_iter().map(default_template).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::variables::validate_source;

    #[test]
    fn test_defaults_compile() {
        for template in default_templates() {
            let validation = validate_source(&template.content);
            assert!(validation.valid, "{}: {:?}", template.id, validation.errors);
            assert!(validation.placeholders.contains(&"report".to_string()));
            assert!(validation.placeholders.contains(&"charts".to_string()));
        }
    }

    #[test]
    fn test_default_ids() {
        let ids: Vec<String> = default_templates().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["fto-default", "infringement-default", "portfolio-default"]);
    }
}
