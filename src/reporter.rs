use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{
    conversion_rule::SkippedRule,
    target_platform::{ConversionPattern, TargetPlatform},
    validation::ValidationReport,
};

/// Reporter for per-platform conversion runs
pub struct ConversionReporter {
    output_format: ReportFormat,
}

/// Available output formats for conversion reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Console,
    Json,
    Yaml,
}

/// Result of converting one source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub source_file: String,
    pub model_name: String,
    pub automation: Option<f64>,
    pub rules_applied: usize,
    pub error: Option<String>,
}

/// Report for one target platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformReport {
    pub platform: TargetPlatform,
    pub pattern: ConversionPattern,
    pub outcomes: Vec<FileOutcome>,
    pub summary: RunSummary,
    pub validation: ValidationReport,
    pub skipped_rules: Vec<SkippedRule>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_files: usize,
    pub converted: usize,
    pub failed: usize,
    /// Mean automation over converted files; `None` when nothing converted
    pub average_automation: Option<f64>,
}

impl FileOutcome {
    pub fn converted(source_file: String, model_name: String, automation: f64, rules_applied: usize) -> Self {
        Self {
            source_file,
            model_name,
            automation: Some(automation),
            rules_applied,
            error: None,
        }
    }

    pub fn failed(source_file: String, model_name: String, error: String) -> Self {
        Self {
            source_file,
            model_name,
            automation: None,
            rules_applied: 0,
            error: Some(error),
        }
    }

    pub fn is_converted(&self) -> bool {
        self.error.is_none()
    }
}

impl ConversionReporter {
    pub fn new() -> Self {
        Self {
            output_format: ReportFormat::Console,
        }
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn generate_report(
        &self,
        platform: TargetPlatform,
        pattern: ConversionPattern,
        outcomes: Vec<FileOutcome>,
        validation: ValidationReport,
        skipped_rules: Vec<SkippedRule>,
    ) -> PlatformReport {
        let summary = summarize(&outcomes);
        let recommendations = self.generate_recommendations(&summary, &validation, &skipped_rules);

        PlatformReport {
            platform,
            pattern,
            outcomes,
            summary,
            validation,
            skipped_rules,
            recommendations,
        }
    }

    pub fn format_report(&self, report: &PlatformReport) -> Result<String, ReportError> {
        match self.output_format {
            ReportFormat::Console => Ok(self.format_console_report(report)),
            ReportFormat::Json => serde_json::to_string_pretty(report)
                .map_err(|e| ReportError::SerializationError(e.to_string())),
            ReportFormat::Yaml => serde_yaml::to_string(report)
                .map_err(|e| ReportError::SerializationError(e.to_string())),
        }
    }

    fn generate_recommendations(
        &self,
        summary: &RunSummary,
        validation: &ValidationReport,
        skipped_rules: &[SkippedRule],
    ) -> Vec<String> {
        let mut recommendations = Vec::new();

        if summary.failed > 0 {
            recommendations.push("Fix the read/write errors above and re-run the failed files".to_string());
        }

        if validation.has_errors() {
            recommendations.push("Correct the generated descriptors before running dbt".to_string());
        }

        if !skipped_rules.is_empty() {
            recommendations.push("Fix or remove the malformed extra_rules in the settings file".to_string());
        }

        recommendations.push("Review every generated model; conversion is pattern-based and unvalidated".to_string());

        recommendations
    }

    fn format_console_report(&self, report: &PlatformReport) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "=== Conversion Report: {} ({}) ===\n\n",
            report.platform, report.pattern
        ));
        output.push_str(&format!("Files processed: {}\n", report.summary.total_files));
        output.push_str(&format!("Converted: {}\n", report.summary.converted));
        output.push_str(&format!("Failed: {}\n", report.summary.failed));
        match report.summary.average_automation {
            Some(average) => output.push_str(&format!("Average automation: {:.1}%\n", average)),
            None => output.push_str("Average automation: n/a\n"),
        }
        output.push_str(&format!(
            "Descriptor validation: {}\n",
            if report.validation.is_valid { "VALID" } else { "INVALID" }
        ));

        if !report.outcomes.is_empty() {
            output.push_str("\nFiles:\n");
            for outcome in &report.outcomes {
                match (&outcome.error, outcome.automation) {
                    (Some(error), _) => {
                        output.push_str(&format!("  ✗ {}: {}\n", outcome.source_file, error));
                    }
                    (None, automation) => {
                        output.push_str(&format!(
                            "  ✓ {} → {} ({:.1}% automated, {} rules)\n",
                            outcome.source_file,
                            outcome.model_name,
                            automation.unwrap_or_default(),
                            outcome.rules_applied
                        ));
                    }
                }
            }
        }

        if !report.validation.errors.is_empty() {
            output.push_str("\nDescriptor errors:\n");
            for error in &report.validation.errors {
                output.push_str(&format!(
                    "  • {} {}: {}\n",
                    error.document.file_name(),
                    error.instance_path,
                    error.message
                ));
            }
        }

        if report.validation.has_warnings() {
            output.push_str("\nDescriptor warnings:\n");
            for warning in &report.validation.warnings {
                output.push_str(&format!("  • {}: {}\n", warning.document.file_name(), warning.message));
            }
        }

        if !report.skipped_rules.is_empty() {
            output.push_str("\nSkipped rules:\n");
            for rule in &report.skipped_rules {
                output.push_str(&format!("  • {}: {}\n", rule.rule_id, rule.reason));
            }
        }

        if !report.recommendations.is_empty() {
            output.push_str("\nRecommendations:\n");
            for rec in &report.recommendations {
                output.push_str(&format!("  • {}\n", rec));
            }
        }

        output
    }
}

impl Default for ConversionReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn summarize(outcomes: &[FileOutcome]) -> RunSummary {
    let scores: Vec<f64> = outcomes.iter().filter_map(|o| o.automation).collect();
    let converted = outcomes.iter().filter(|o| o.is_converted()).count();

    RunSummary {
        total_files: outcomes.len(),
        converted,
        failed: outcomes.len() - converted,
        average_automation: if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        },
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportFormat::Console => "console",
            ReportFormat::Json => "json",
            ReportFormat::Yaml => "yaml",
        };
        f.write_str(name)
    }
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(ReportFormat::Console),
            "json" => Ok(ReportFormat::Json),
            "yaml" | "yml" => Ok(ReportFormat::Yaml),
            _ => Err(ReportError::FormatError(format!("Unknown report format: {}", s))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Format error: {0}")]
    FormatError(String),
}
