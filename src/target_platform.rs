use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Output profile a model is generated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPlatform {
    /// Columnar lake (Spark SQL on Glue)
    Glue,
    /// Federated query (Presto/Trino on Athena)
    Athena,
    /// Warehouse (Redshift)
    Redshift,
}

impl TargetPlatform {
    pub const ALL: [TargetPlatform; 3] = [
        TargetPlatform::Glue,
        TargetPlatform::Athena,
        TargetPlatform::Redshift,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetPlatform::Glue => "glue",
            TargetPlatform::Athena => "athena",
            TargetPlatform::Redshift => "redshift",
        }
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetPlatform {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "glue" => Ok(TargetPlatform::Glue),
            "athena" => Ok(TargetPlatform::Athena),
            "redshift" => Ok(TargetPlatform::Redshift),
            _ => Err(TargetParseError::UnknownPlatform(s.to_string())),
        }
    }
}

/// Structural augmentation appended after the base substitutions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionPattern {
    #[default]
    FullLoad,
    UpsertMerge,
    HistoryUpsert,
    MultipleDmlUpsert,
    SnapshotAppend,
}

impl ConversionPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionPattern::FullLoad => "full_load",
            ConversionPattern::UpsertMerge => "upsert_merge",
            ConversionPattern::HistoryUpsert => "history_upsert",
            ConversionPattern::MultipleDmlUpsert => "multiple_dml_upsert",
            ConversionPattern::SnapshotAppend => "snapshot_append",
        }
    }
}

impl fmt::Display for ConversionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversionPattern {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "full_load" => Ok(ConversionPattern::FullLoad),
            "upsert_merge" => Ok(ConversionPattern::UpsertMerge),
            "history_upsert" => Ok(ConversionPattern::HistoryUpsert),
            "multiple_dml_upsert" => Ok(ConversionPattern::MultipleDmlUpsert),
            "snapshot_append" => Ok(ConversionPattern::SnapshotAppend),
            _ => Err(TargetParseError::UnknownPattern(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum TargetParseError {
    #[error("Unknown target platform: {0} (expected glue, athena or redshift)")]
    UnknownPlatform(String),

    #[error("Unknown conversion pattern: {0}")]
    UnknownPattern(String),
}
