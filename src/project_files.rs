use serde::{Deserialize, Serialize};

use crate::settings::{ColumnConventions, ConverterSettings};
use crate::target_platform::TargetPlatform;

const MACRO_TEMPLATE: &str = r#"{% macro validate_region_access(region) %}
  {% set allowed_regions = var('allowed_regions', __ALLOWED__) %}
  {% if region is not none and region not in allowed_regions %}
    {{ exceptions.raise_compiler_error("Region '" ~ region ~ "' is not permitted") }}
  {% endif %}
{% endmacro %}

{% macro regional_filter(column_name) %}
  {% if var('region', none) is not none %}
    {{ validate_region_access(var('region')) }}
    {{ column_name }} = '{{ var('region') }}'
  {% else %}
    1 = 1
  {% endif %}
{% endmacro %}

{% macro incremental_filter(column_name) %}
  {% if is_incremental() %}
    AND {{ column_name }} > (SELECT MAX({{ column_name }}) FROM {{ this }})
  {% endif %}
{% endmacro %}
"#;

/// Column test annotation: a bare test name or `accepted_values`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnTest {
    Named(String),
    AcceptedValues { accepted_values: AcceptedValues },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedValues {
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub tests: Vec<ColumnTest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub description: String,
    pub columns: Vec<ColumnDescriptor>,
}

/// `schema.yml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub version: u32,
    pub models: Vec<ModelDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTable {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub schema: String,
    pub tables: Vec<SourceTable>,
}

/// `sources.yml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesDescriptor {
    pub version: u32,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectVars {
    pub start_date: String,
    pub end_date: String,
    pub region: Option<String>,
    pub allowed_regions: Vec<String>,
    pub min_order_amount: f64,
    pub high_value_threshold: f64,
}

/// `dbt_project.yml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectDescriptor {
    pub name: String,
    pub version: String,
    pub config_version: u32,
    pub profile: String,
    pub model_paths: Vec<String>,
    pub macro_paths: Vec<String>,
    pub test_paths: Vec<String>,
    pub target_path: String,
    pub clean_targets: Vec<String>,
    pub vars: ProjectVars,
}

/// Column tests shared by models and sources
pub fn column_tests(columns: &ColumnConventions) -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor {
            name: columns.id.clone(),
            tests: vec![
                ColumnTest::Named("unique".to_string()),
                ColumnTest::Named("not_null".to_string()),
            ],
        },
        ColumnDescriptor {
            name: columns.timestamp.clone(),
            tests: vec![ColumnTest::Named("not_null".to_string())],
        },
        ColumnDescriptor {
            name: columns.region.clone(),
            tests: vec![
                ColumnTest::Named("not_null".to_string()),
                ColumnTest::AcceptedValues {
                    accepted_values: AcceptedValues {
                        values: columns.allowed_regions.clone(),
                    },
                },
            ],
        },
    ]
}

pub fn schema_descriptor(model_names: &[String], settings: &ConverterSettings) -> SchemaDescriptor {
    SchemaDescriptor {
        version: 2,
        models: model_names
            .iter()
            .map(|name| ModelDescriptor {
                name: name.clone(),
                description: format!("Converted from stored procedure {}", name),
                columns: column_tests(&settings.columns),
            })
            .collect(),
    }
}

pub fn sources_descriptor(model_names: &[String], settings: &ConverterSettings) -> SourcesDescriptor {
    SourcesDescriptor {
        version: 2,
        sources: vec![Source {
            name: settings.project.source_name.clone(),
            schema: settings.project.source_schema.clone(),
            tables: model_names
                .iter()
                .map(|name| SourceTable {
                    name: name.clone(),
                    columns: column_tests(&settings.columns),
                })
                .collect(),
        }],
    }
}

pub fn project_descriptor(platform: TargetPlatform, settings: &ConverterSettings) -> ProjectDescriptor {
    let project = &settings.project;
    ProjectDescriptor {
        name: format!("{}_{}", project.name_prefix, platform),
        version: project.version.clone(),
        config_version: 2,
        profile: platform.to_string(),
        model_paths: vec!["models".to_string()],
        macro_paths: vec!["macros".to_string()],
        test_paths: vec!["tests".to_string()],
        target_path: "target".to_string(),
        clean_targets: vec!["target".to_string(), "dbt_packages".to_string()],
        vars: ProjectVars {
            start_date: project.start_date.clone(),
            end_date: project.end_date.clone(),
            region: project.region.clone(),
            allowed_regions: settings.columns.allowed_regions.clone(),
            min_order_amount: project.min_order_amount,
            high_value_threshold: project.high_value_threshold,
        },
    }
}

/// Companion macro file with the region and incremental helpers
pub fn macro_file(model_name: &str, settings: &ConverterSettings) -> String {
    let allowed: Vec<String> = settings
        .columns
        .allowed_regions
        .iter()
        .map(|region| format!("'{}'", region))
        .collect();

    format!(
        "-- Macros for {}\n{}",
        model_name,
        MACRO_TEMPLATE.replace("__ALLOWED__", &format!("[{}]", allowed.join(", ")))
    )
}
