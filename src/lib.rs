// T-SQL stored procedure to dbt model conversion
pub mod target_platform;
pub mod conversion_rule;
pub mod automation;
pub mod settings;
pub mod model_config;
pub mod conversion_engine;
pub mod project_files;
pub mod validation;
pub mod reporter;
pub mod batch;

// Re-export core types for convenience
pub use target_platform::{ConversionPattern, TargetPlatform};
pub use conversion_rule::{AppliedRule, RuleDefinition, RuleGroup, RuleTable, SkippedRule};
pub use automation::{estimate_automation, ManualIndicators, ScoringPolicy};
pub use settings::ConverterSettings;
pub use model_config::ModelConfig;
pub use conversion_engine::{ConversionEngine, ConversionOutput, ConversionRequest};
pub use validation::{DescriptorKind, ValidationReport};
pub use reporter::{ConversionReporter, PlatformReport, ReportFormat};
pub use batch::{BatchError, PlatformRun};
