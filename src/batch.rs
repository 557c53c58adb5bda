//! Directory-level conversion: discover sources, convert each file on its own
//! task, write models, macros and descriptors for one platform.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::{
    conversion_engine::{ConversionEngine, ConversionRequest},
    project_files,
    reporter::FileOutcome,
    target_platform::{ConversionPattern, TargetPlatform},
    validation::{DescriptorKind, ValidationReport},
};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Input directory {0} not found")]
    MissingInputDir(PathBuf),

    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON conversion error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of one platform run
#[derive(Debug, Clone)]
pub struct PlatformRun {
    pub platform_dir: PathBuf,
    pub outcomes: Vec<FileOutcome>,
    pub validation: ValidationReport,
}

/// Source files with the given extension, sorted by path
pub async fn discover_sources(input_dir: &Path, extension: &str) -> Result<Vec<PathBuf>, BatchError> {
    if !fs::try_exists(input_dir).await.unwrap_or(false) {
        return Err(BatchError::MissingInputDir(input_dir.to_path_buf()));
    }

    let read_dir_error = |source| BatchError::ReadDir {
        path: input_dir.to_path_buf(),
        source,
    };

    let mut entries = fs::read_dir(input_dir).await.map_err(read_dir_error)?;
    let mut sources = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_dir_error)? {
        let path = entry.path();
        let matches = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if matches && is_file {
            sources.push(path);
        }
    }

    sources.sort();
    Ok(sources)
}

/// Convert every source for one platform under `<output_dir>/<platform>/`.
///
/// Per-file failures are recorded in the outcomes and never stop the run.
/// Only failures to create the output layout or write descriptors are errors.
pub async fn convert_platform(
    engine: Arc<ConversionEngine>,
    sources: &[PathBuf],
    output_dir: &Path,
    platform: TargetPlatform,
    pattern: ConversionPattern,
) -> Result<PlatformRun, BatchError> {
    let platform_dir = output_dir.join(platform.as_str());
    for dir in [platform_dir.join("models"), platform_dir.join("macros")] {
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| BatchError::CreateDir { path: dir.clone(), source })?;
    }

    let mut tasks = JoinSet::new();
    for source in sources {
        tasks.spawn(convert_file(
            Arc::clone(&engine),
            source.clone(),
            platform_dir.clone(),
            platform,
            pattern,
        ));
    }

    let mut outcomes = Vec::with_capacity(sources.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => error!(error = %e, "conversion task did not complete"),
        }
    }
    outcomes.sort_by(|a, b| a.source_file.cmp(&b.source_file));

    let model_names: Vec<String> = outcomes
        .iter()
        .filter(|o| o.is_converted())
        .map(|o| o.model_name.clone())
        .collect();

    let settings = engine.settings();
    let mut validation = ValidationReport::new();
    write_descriptor(
        &platform_dir,
        DescriptorKind::Schema,
        &project_files::schema_descriptor(&model_names, settings),
        &mut validation,
    )
    .await?;
    write_descriptor(
        &platform_dir,
        DescriptorKind::Sources,
        &project_files::sources_descriptor(&model_names, settings),
        &mut validation,
    )
    .await?;
    write_descriptor(
        &platform_dir,
        DescriptorKind::Project,
        &project_files::project_descriptor(platform, settings),
        &mut validation,
    )
    .await?;

    if validation.has_errors() {
        warn!(platform = %platform, errors = validation.errors.len(), "generated descriptors failed validation");
    }

    Ok(PlatformRun {
        platform_dir,
        outcomes,
        validation,
    })
}

async fn convert_file(
    engine: Arc<ConversionEngine>,
    source: PathBuf,
    platform_dir: PathBuf,
    platform: TargetPlatform,
    pattern: ConversionPattern,
) -> FileOutcome {
    let source_file = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let model_name = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let content = match fs::read_to_string(&source).await {
        Ok(content) => content,
        Err(e) => {
            error!(file = %source.display(), error = %e, "failed to read source");
            return FileOutcome::failed(source_file, model_name, format!("read failed: {}", e));
        }
    };

    let request = ConversionRequest::new(content, model_name.clone(), platform, pattern);
    let output = engine.convert(&request);
    let automation = engine.estimate_automation(&request.source_text, &output.model_sql);

    let model_path = platform_dir.join("models").join(format!("{}.sql", model_name));
    let macro_path = platform_dir.join("macros").join(format!("{}_macro.sql", model_name));
    let macro_content = project_files::macro_file(&model_name, engine.settings());

    for (path, content) in [(&model_path, &output.model_sql), (&macro_path, &macro_content)] {
        if let Err(e) = fs::write(path, content).await {
            error!(file = %path.display(), error = %e, "failed to write output");
            return FileOutcome::failed(
                source_file,
                model_name,
                format!("write to {} failed: {}", path.display(), e),
            );
        }
    }

    info!(
        file = %source_file,
        platform = %platform,
        automation,
        "converted"
    );

    FileOutcome::converted(source_file, model_name, automation, output.applied_rules.len())
}

async fn write_descriptor<T: Serialize>(
    platform_dir: &Path,
    kind: DescriptorKind,
    descriptor: &T,
    validation: &mut ValidationReport,
) -> Result<(), BatchError> {
    validation.validate_descriptor(kind, &serde_json::to_value(descriptor)?);

    let path = platform_dir.join(kind.file_name());
    let yaml = serde_yaml::to_string(descriptor)?;
    if let Err(source) = fs::write(&path, yaml).await {
        return Err(BatchError::Write { path, source });
    }
    Ok(())
}
