use serde::{Deserialize, Serialize};

use crate::settings::ConverterSettings;
use crate::target_platform::{ConversionPattern, TargetPlatform};

/// Resolved `{{ config(...) }}` values for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub materialized: String,
    pub keys: ProfileKeys,
    pub unique_key: Option<String>,
    pub incremental_strategy: Option<String>,
    pub tags: Vec<String>,
}

/// Layout keys; lake profiles partition and cluster, the warehouse sorts and distributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProfileKeys {
    Glue {
        file_format: String,
        partition_by: Vec<String>,
        clustered_by: Vec<String>,
    },
    Athena {
        format: String,
        partitioned_by: Vec<String>,
        bucketed_by: Vec<String>,
        bucket_count: u32,
    },
    Redshift {
        sort: Vec<String>,
        dist: String,
    },
}

impl ModelConfig {
    pub fn resolve(
        model_name: &str,
        platform: TargetPlatform,
        pattern: ConversionPattern,
        settings: &ConverterSettings,
    ) -> Self {
        let defaults = &settings.defaults;
        let mut materialized = defaults.materialized.clone();
        let mut unique_key = None;
        let mut incremental_strategy = None;

        match pattern {
            ConversionPattern::UpsertMerge | ConversionPattern::HistoryUpsert => {
                materialized = "incremental".to_string();
                unique_key = Some(settings.columns.id.clone());
            }
            ConversionPattern::SnapshotAppend => {
                materialized = "incremental".to_string();
                incremental_strategy = Some("append".to_string());
            }
            ConversionPattern::FullLoad | ConversionPattern::MultipleDmlUpsert => {}
        }

        let mut partition_by = defaults.partition_by.clone();
        let mut cluster_by = defaults.cluster_by.clone();
        let mut sort = defaults.sort.clone();
        let mut dist = defaults.dist.clone();
        let mut tags: Vec<String> = Vec::new();

        let name = model_name.to_lowercase();
        for rule in &settings.model_rules {
            if rule.contains.is_empty() || !name.contains(&rule.contains.to_lowercase()) {
                continue;
            }
            if let Some(value) = &rule.materialized {
                materialized = value.clone();
            }
            if let Some(value) = &rule.partition_by {
                partition_by = value.clone();
            }
            if let Some(value) = &rule.cluster_by {
                cluster_by = value.clone();
            }
            if let Some(value) = &rule.sort {
                sort = value.clone();
            }
            if let Some(value) = &rule.dist {
                dist = value.clone();
            }
            for tag in &rule.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }

        let keys = match platform {
            TargetPlatform::Glue => ProfileKeys::Glue {
                file_format: defaults.file_format.clone(),
                partition_by,
                clustered_by: cluster_by,
            },
            TargetPlatform::Athena => ProfileKeys::Athena {
                format: defaults.file_format.clone(),
                partitioned_by: partition_by,
                bucketed_by: cluster_by,
                bucket_count: defaults.bucket_count,
            },
            TargetPlatform::Redshift => ProfileKeys::Redshift { sort, dist },
        };

        Self {
            materialized,
            keys,
            unique_key,
            incremental_strategy,
            tags,
        }
    }

    pub fn render(&self) -> String {
        let mut entries = vec![format!("materialized='{}'", self.materialized)];

        if let Some(unique_key) = &self.unique_key {
            entries.push(format!("unique_key='{}'", unique_key));
        }
        if let Some(strategy) = &self.incremental_strategy {
            entries.push(format!("incremental_strategy='{}'", strategy));
        }

        match &self.keys {
            ProfileKeys::Glue { file_format, partition_by, clustered_by } => {
                entries.push(format!("file_format='{}'", file_format));
                entries.push(format!("partition_by={}", render_list(partition_by)));
                entries.push(format!("clustered_by={}", render_list(clustered_by)));
            }
            ProfileKeys::Athena { format, partitioned_by, bucketed_by, bucket_count } => {
                entries.push(format!("format='{}'", format));
                entries.push(format!("partitioned_by={}", render_list(partitioned_by)));
                entries.push(format!("bucketed_by={}", render_list(bucketed_by)));
                entries.push(format!("bucket_count={}", bucket_count));
            }
            ProfileKeys::Redshift { sort, dist } => {
                entries.push(format!("sort={}", render_list(sort)));
                entries.push(format!("dist='{}'", dist));
            }
        }

        if !self.tags.is_empty() {
            entries.push(format!("tags={}", render_list(&self.tags)));
        }

        format!("{{{{ config(\n    {}\n) }}}}", entries.join(",\n    "))
    }
}

fn render_list(values: &[String]) -> String {
    let quoted: Vec<String> = values.iter().map(|v| format!("'{}'", v)).collect();
    format!("[{}]", quoted.join(", "))
}
