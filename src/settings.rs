use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::automation::ScoringPolicy;
use crate::conversion_rule::RuleDefinition;

/// Converter configuration, loaded from YAML. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterSettings {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Extension (without the dot) of source files to pick up
    pub source_extension: String,
    pub normalize_whitespace: bool,
    /// Timestamp column compared by the incremental filter
    pub incremental_column: String,
    /// Key the history ranking partitions by
    pub history_key: String,
    pub columns: ColumnConventions,
    pub defaults: ProfileDefaults,
    pub model_rules: Vec<ModelRule>,
    pub project: ProjectSettings,
    pub scoring: ScoringPolicy,
    /// Appended after the standard pattern table
    pub extra_rules: Vec<RuleDefinition>,
}

/// Column names used by the generated tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConventions {
    pub id: String,
    pub timestamp: String,
    pub region: String,
    pub allowed_regions: Vec<String>,
}

/// Config header defaults per profile kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileDefaults {
    pub materialized: String,
    pub file_format: String,
    pub partition_by: Vec<String>,
    pub cluster_by: Vec<String>,
    pub bucket_count: u32,
    pub sort: Vec<String>,
    pub dist: String,
}

/// Override applied when the model name contains `contains` (case-insensitive)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelRule {
    pub contains: String,
    pub materialized: Option<String>,
    pub tags: Vec<String>,
    pub partition_by: Option<Vec<String>>,
    pub cluster_by: Option<Vec<String>>,
    pub sort: Option<Vec<String>>,
    pub dist: Option<String>,
}

/// Values written to the project and source descriptors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub name_prefix: String,
    pub version: String,
    pub source_name: String,
    pub source_schema: String,
    pub start_date: String,
    pub end_date: String,
    pub region: Option<String>,
    pub min_order_amount: f64,
    pub high_value_threshold: f64,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConverterSettings {
    pub fn from_yaml_str(content: &str) -> Result<Self, SettingsError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("mssql_original"),
            output_dir: PathBuf::from("dbt_models_enhanced"),
            source_extension: "sql".to_string(),
            normalize_whitespace: false,
            incremental_column: "updated_at".to_string(),
            history_key: "id".to_string(),
            columns: ColumnConventions::default(),
            defaults: ProfileDefaults::default(),
            model_rules: default_model_rules(),
            project: ProjectSettings::default(),
            scoring: ScoringPolicy::default(),
            extra_rules: Vec::new(),
        }
    }
}

impl Default for ColumnConventions {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            timestamp: "created_at".to_string(),
            region: "region".to_string(),
            allowed_regions: ["north", "south", "east", "west"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl Default for ProfileDefaults {
    fn default() -> Self {
        Self {
            materialized: "table".to_string(),
            file_format: "parquet".to_string(),
            partition_by: vec!["created_date".to_string()],
            cluster_by: vec!["id".to_string()],
            bucket_count: 8,
            sort: vec!["created_at".to_string()],
            dist: "even".to_string(),
        }
    }
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            name_prefix: "mssql_conversion".to_string(),
            version: "1.0.0".to_string(),
            source_name: "mssql".to_string(),
            source_schema: "dbo".to_string(),
            start_date: "2024-01-01".to_string(),
            end_date: "2024-12-31".to_string(),
            region: None,
            min_order_amount: 100.0,
            high_value_threshold: 10000.0,
        }
    }
}

fn default_model_rules() -> Vec<ModelRule> {
    vec![
        ModelRule {
            contains: "reporting".to_string(),
            materialized: Some("view".to_string()),
            ..ModelRule::default()
        },
        ModelRule {
            contains: "summary".to_string(),
            materialized: Some("view".to_string()),
            ..ModelRule::default()
        },
        ModelRule {
            contains: "customer".to_string(),
            tags: vec!["customer".to_string(), "pii".to_string()],
            cluster_by: Some(vec!["customer_id".to_string()]),
            sort: Some(vec!["total_revenue".to_string()]),
            dist: Some("customer_id".to_string()),
            ..ModelRule::default()
        },
        ModelRule {
            contains: "inventory".to_string(),
            tags: vec!["inventory".to_string()],
            cluster_by: Some(vec!["product_id".to_string()]),
            sort: Some(vec!["available_stock".to_string()]),
            dist: Some("product_id".to_string()),
            ..ModelRule::default()
        },
    ]
}
