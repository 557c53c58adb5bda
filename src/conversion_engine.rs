use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::debug;

use crate::{
    automation,
    conversion_rule::{standard_definitions, AppliedRule, RuleTable},
    model_config::ModelConfig,
    settings::ConverterSettings,
    target_platform::{ConversionPattern, TargetPlatform},
};

static VAR_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*var\(\s*'(?P<name>\w+)'\s*\)\s*\}\}")
        .expect("var reference pattern is a valid regex")
});

const VAR_CHECK_TEMPLATE: &str = r#"{%- set referenced_vars = __VARS__ -%}
{%- for name in referenced_vars -%}
  {%- if var(name, none) is none -%}
    {{ log("Variable '" ~ name ~ "' is not set for model __MODEL__", info=True) }}
  {%- endif -%}
{%- endfor -%}"#;

const REGION_FILTER_TEMPLATE: &str = r#"-- Regional access: filter with {{ regional_filter('__COLUMN__') }}
{%- set region_clause = regional_filter('__COLUMN__') -%}"#;

/// One conversion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub source_text: String,
    pub model_name: String,
    pub target_platform: TargetPlatform,
    pub conversion_pattern: ConversionPattern,
}

/// Rendered model plus what went into it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub model_name: String,
    pub platform: TargetPlatform,
    pub pattern: ConversionPattern,
    /// Substituted and augmented SQL, without banner or config header
    pub body: String,
    /// Complete model file content
    pub model_sql: String,
    pub applied_rules: Vec<AppliedRule>,
}

/// Applies the pattern table and renders dbt models. Holds no mutable state.
#[derive(Debug, Clone)]
pub struct ConversionEngine {
    rules: RuleTable,
    settings: ConverterSettings,
}

impl ConversionRequest {
    pub fn new(
        source_text: impl Into<String>,
        model_name: impl Into<String>,
        target_platform: TargetPlatform,
        conversion_pattern: ConversionPattern,
    ) -> Self {
        Self {
            source_text: source_text.into(),
            model_name: model_name.into(),
            target_platform,
            conversion_pattern,
        }
    }
}

impl ConversionEngine {
    pub fn new(rules: RuleTable, settings: ConverterSettings) -> Self {
        Self { rules, settings }
    }

    /// Standard table followed by `settings.extra_rules`
    pub fn from_settings(settings: ConverterSettings) -> Self {
        let definitions = standard_definitions()
            .into_iter()
            .chain(settings.extra_rules.iter().cloned());
        Self::new(RuleTable::from_definitions(definitions), settings)
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn settings(&self) -> &ConverterSettings {
        &self.settings
    }

    pub fn convert(&self, request: &ConversionRequest) -> ConversionOutput {
        let source = if self.settings.normalize_whitespace {
            normalize_whitespace(&request.source_text)
        } else {
            request.source_text.clone()
        };

        let (substituted, applied_rules) = self.rules.apply_traced(&source);
        let body = self.augment(substituted, request.conversion_pattern);

        let config = ModelConfig::resolve(
            &request.model_name,
            request.target_platform,
            request.conversion_pattern,
            &self.settings,
        );

        let mut model_sql = banner(request);
        model_sql.push_str(&config.render());
        model_sql.push_str("\n\n");
        for snippet in self.snippets(&request.model_name, &body) {
            model_sql.push_str(&snippet);
            model_sql.push_str("\n\n");
        }
        model_sql.push_str(body.trim());
        model_sql.push('\n');

        debug!(
            model = %request.model_name,
            platform = %request.target_platform,
            rules_applied = applied_rules.len(),
            "converted model"
        );

        ConversionOutput {
            model_name: request.model_name.clone(),
            platform: request.target_platform,
            pattern: request.conversion_pattern,
            body,
            model_sql,
            applied_rules,
        }
    }

    /// Diagnostic score for a conversion, see [`automation::estimate_automation`]
    pub fn estimate_automation(&self, original: &str, transformed: &str) -> f64 {
        automation::estimate_automation(&self.rules, &self.settings.scoring, original, transformed)
    }

    fn augment(&self, body: String, pattern: ConversionPattern) -> String {
        let column = &self.settings.incremental_column;
        let key = &self.settings.history_key;

        match pattern {
            ConversionPattern::UpsertMerge => format!(
                "{}\n\n{{% if is_incremental() %}}\nWHERE {column} > (SELECT MAX({column}) FROM {{{{ this }}}})\n{{% endif %}}",
                statement_end(&body)
            ),
            ConversionPattern::HistoryUpsert => format!(
                "{}\n-- History tracking columns\n\
                 , ROW_NUMBER() OVER (PARTITION BY {key} ORDER BY {column} DESC) AS version_rank\n\
                 , CASE WHEN ROW_NUMBER() OVER (PARTITION BY {key} ORDER BY {column} DESC) = 1 THEN TRUE ELSE FALSE END AS is_current",
                statement_end(&body)
            ),
            ConversionPattern::SnapshotAppend => format!(
                "{}\n-- Snapshot columns\n\
                 , CURRENT_TIMESTAMP AS snapshot_captured_at\n\
                 , '{{{{ invocation_id }}}}' AS snapshot_run_id",
                statement_end(&body)
            ),
            ConversionPattern::MultipleDmlUpsert | ConversionPattern::FullLoad => body,
        }
    }

    fn snippets(&self, model_name: &str, body: &str) -> Vec<String> {
        let mut snippets = Vec::new();

        let vars = referenced_vars(body);
        if !vars.is_empty() {
            let list: Vec<String> = vars.iter().map(|v| format!("'{}'", v)).collect();
            snippets.push(
                VAR_CHECK_TEMPLATE
                    .replace("__VARS__", &format!("[{}]", list.join(", ")))
                    .replace("__MODEL__", model_name),
            );
        }

        let region = &self.settings.columns.region;
        if contains_word(body, region) {
            snippets.push(REGION_FILTER_TEMPLATE.replace("__COLUMN__", region));
        }

        snippets
    }
}

impl Default for ConversionEngine {
    fn default() -> Self {
        Self::from_settings(ConverterSettings::default())
    }
}

/// Collapse whitespace runs to single spaces and trim. Idempotent.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Distinct `{{ var('...') }}` names, sorted
pub fn referenced_vars(text: &str) -> BTreeSet<String> {
    VAR_REFERENCE
        .captures_iter(text)
        .map(|caps| caps["name"].to_string())
        .collect()
}

fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|token| token.eq_ignore_ascii_case(word))
}

/// Body with trailing whitespace and statement terminators removed
fn statement_end(body: &str) -> &str {
    body.trim_end().trim_end_matches(';').trim_end()
}

fn banner(request: &ConversionRequest) -> String {
    format!(
        "-- dbt model: {} (converted from T-SQL stored procedure)\n\
         -- Platform: {}\n\
         -- Conversion pattern: {}\n\
         -- Pattern-based conversion; review before deploying\n\n",
        request.model_name, request.target_platform, request.conversion_pattern
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE_PROCEDURE: &str = r#"
    CREATE PROCEDURE sp_test_analytics
        @start_date DATE,
        @end_date DATE,
        @region VARCHAR(50) = NULL
    AS
    BEGIN
        SET NOCOUNT ON;

        SELECT
            customer_id,
            SUM(order_amount) as total_revenue,
            DATEDIFF(day, order_date, GETDATE()) as days_ago
        FROM customers c
        JOIN orders o ON c.customer_id = o.customer_id
        WHERE order_date BETWEEN @start_date AND @end_date
        GROUP BY customer_id
        ORDER BY total_revenue DESC;
    END
    "#;

    fn request(pattern: ConversionPattern) -> ConversionRequest {
        ConversionRequest::new(SAMPLE_PROCEDURE, "customer_analytics", TargetPlatform::Redshift, pattern)
    }

    #[test]
    fn test_convert_full_load() {
        let engine = ConversionEngine::default();
        let output = engine.convert(&request(ConversionPattern::FullLoad));

        assert!(output.model_sql.starts_with("-- dbt model: customer_analytics"));
        assert!(output.model_sql.contains("-- Platform: redshift"));
        assert!(output.model_sql.contains("materialized='table'"));
        assert!(output.model_sql.contains("tags=['customer', 'pii']"));
        assert!(output.body.contains("FROM {{ ref('customers') }} c"));
        assert!(output.body.contains("JOIN {{ ref('orders') }} o"));
        assert!(output.body.contains("DATE_DIFF('day', order_date, CURRENT_TIMESTAMP)"));
        assert!(output.body.contains("BETWEEN {{ var('start_date') }} AND {{ var('end_date') }}"));
        assert!(!output.body.contains("PROCEDURE"));
        assert!(!output.applied_rules.is_empty());
    }

    #[test]
    fn test_var_snippet_lists_referenced_vars() {
        let engine = ConversionEngine::default();
        let output = engine.convert(&request(ConversionPattern::FullLoad));
        assert!(output
            .model_sql
            .contains("{%- set referenced_vars = ['end_date', 'start_date'] -%}"));
        assert!(output.model_sql.contains("not set for model customer_analytics"));
    }

    #[test]
    fn test_region_snippet_only_when_region_appears() {
        let engine = ConversionEngine::default();

        let with_region = ConversionRequest::new(
            "SELECT * FROM orders WHERE region = @region",
            "orders",
            TargetPlatform::Glue,
            ConversionPattern::FullLoad,
        );
        let output = engine.convert(&with_region);
        assert!(output.model_sql.contains("regional_filter('region')"));

        let without_region = ConversionRequest::new(
            "SELECT * FROM orders",
            "orders",
            TargetPlatform::Glue,
            ConversionPattern::FullLoad,
        );
        let output = engine.convert(&without_region);
        assert!(!output.model_sql.contains("regional_filter"));
        assert!(!output.model_sql.contains("referenced_vars"));
    }

    #[test]
    fn test_upsert_merge_appends_incremental_filter() {
        let engine = ConversionEngine::default();
        let output = engine.convert(&request(ConversionPattern::UpsertMerge));

        assert!(output.body.ends_with(
            "ORDER BY total_revenue DESC\n\n{% if is_incremental() %}\nWHERE updated_at > (SELECT MAX(updated_at) FROM {{ this }})\n{% endif %}"
        ));
        assert!(output.model_sql.contains("materialized='incremental'"));
        assert!(output.model_sql.contains("unique_key='id'"));
    }

    #[test]
    fn test_history_upsert_appends_versioning_columns() {
        let engine = ConversionEngine::default();
        let output = engine.convert(&request(ConversionPattern::HistoryUpsert));

        assert!(output.body.contains(
            ", ROW_NUMBER() OVER (PARTITION BY id ORDER BY updated_at DESC) AS version_rank"
        ));
        assert!(output.body.contains("THEN TRUE ELSE FALSE END AS is_current"));
    }

    #[test]
    fn test_snapshot_append_adds_capture_columns() {
        let engine = ConversionEngine::default();
        let output = engine.convert(&request(ConversionPattern::SnapshotAppend));

        assert!(output.body.contains(", CURRENT_TIMESTAMP AS snapshot_captured_at"));
        assert!(output.body.contains(", '{{ invocation_id }}' AS snapshot_run_id"));
    }

    #[test]
    fn test_identity_patterns_leave_body_unchanged() {
        let engine = ConversionEngine::default();
        let full = engine.convert(&request(ConversionPattern::FullLoad));
        let multiple = engine.convert(&request(ConversionPattern::MultipleDmlUpsert));
        assert_eq!(full.body, multiple.body);
        assert_eq!(full.body, engine.rules().apply(SAMPLE_PROCEDURE));
    }

    #[test]
    fn test_convert_is_deterministic() {
        let engine = ConversionEngine::default();
        let first = engine.convert(&request(ConversionPattern::HistoryUpsert));
        let second = engine.convert(&request(ConversionPattern::HistoryUpsert));
        assert_eq!(first, second);
    }

    #[test]
    fn test_normalize_whitespace_is_idempotent() {
        let text = "  SELECT\t a,\n\n   b   FROM  t  ";
        let once = normalize_whitespace(text);
        assert_eq!(once, "SELECT a, b FROM t");
        assert_eq!(normalize_whitespace(&once), once);
    }

    #[test]
    fn test_normalize_setting_is_applied() {
        let settings = ConverterSettings {
            normalize_whitespace: true,
            ..ConverterSettings::default()
        };
        let engine = ConversionEngine::from_settings(settings);
        let output = engine.convert(&ConversionRequest::new(
            "SELECT a\n\n  FROM   orders",
            "orders",
            TargetPlatform::Athena,
            ConversionPattern::FullLoad,
        ));
        assert_eq!(output.body, "SELECT a FROM {{ ref('orders') }}");
    }

    #[test]
    fn test_extra_rules_run_after_standard_table() {
        let settings = ConverterSettings::from_yaml_str(
            r#"
            extra_rules:
              - rule_id: isnull
                group: custom
                pattern: '\bISNULL\s*\('
                replacement: 'COALESCE('
              - rule_id: broken
                group: custom
                pattern: '(unclosed'
                replacement: ''
            "#,
        )
        .unwrap();
        let engine = ConversionEngine::from_settings(settings);
        assert_eq!(engine.rules().skipped().len(), 1);

        let output = engine.convert(&ConversionRequest::new(
            "SELECT ISNULL(amount, 0) FROM orders",
            "orders",
            TargetPlatform::Redshift,
            ConversionPattern::FullLoad,
        ));
        assert_eq!(output.body, "SELECT COALESCE(amount, 0) FROM {{ ref('orders') }}");
    }

    #[test]
    fn test_estimate_automation_on_sample() {
        let engine = ConversionEngine::default();
        let output = engine.convert(&request(ConversionPattern::FullLoad));
        let score = engine.estimate_automation(SAMPLE_PROCEDURE, &output.model_sql);
        assert!(score > 0.0 && score < 100.0);
        assert!(automation::ManualIndicators::detect(&output.model_sql).group_by);
    }

    #[test]
    fn test_referenced_vars_are_distinct_and_sorted() {
        let vars = referenced_vars("{{ var('b') }} {{ var('a') }} {{ var('b') }}");
        assert_eq!(vars.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
