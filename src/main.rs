use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use sproc2dbt::{
    batch::{self, BatchError},
    ConversionEngine, ConversionPattern, ConversionReporter, ConverterSettings, ReportFormat,
    TargetPlatform,
};

#[derive(Parser, Debug)]
#[command(name = "sproc2dbt")]
#[command(about = "Convert T-SQL stored procedures into dbt models for Glue, Athena and Redshift")]
struct Args {
    /// Directory containing the stored procedure sources
    #[arg(long, value_name = "DIR")]
    input_dir: Option<PathBuf>,

    /// Directory the per-platform dbt projects are written to
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Target platform; repeat for several (default: all three)
    #[arg(long = "platform", value_name = "PLATFORM")]
    platforms: Vec<TargetPlatform>,

    /// Conversion pattern applied to every model
    #[arg(long, value_name = "PATTERN", default_value = "full_load")]
    pattern: ConversionPattern,

    /// Collapse whitespace in the source before conversion
    #[arg(long)]
    normalize_whitespace: bool,

    /// YAML settings file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Report format: console, json or yaml
    #[arg(long, value_name = "FORMAT", default_value = "console")]
    report_format: ReportFormat,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => match ConverterSettings::from_file(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("\n❌ Error: {}", e);
                process::exit(1);
            }
        },
        None => ConverterSettings::default(),
    };
    if let Some(dir) = args.input_dir {
        settings.input_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        settings.output_dir = dir;
    }
    if args.normalize_whitespace {
        settings.normalize_whitespace = true;
    }

    let platforms = if args.platforms.is_empty() {
        TargetPlatform::ALL.to_vec()
    } else {
        args.platforms
    };

    println!("MSSQL to dbt Multi-Platform Converter");

    let sources = match batch::discover_sources(&settings.input_dir, &settings.source_extension).await {
        Ok(sources) => sources,
        Err(e @ BatchError::MissingInputDir(_)) => {
            eprintln!("\n❌ {}", e);
            eprintln!("Nothing was converted.");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("\n❌ Error: {}", e);
            process::exit(1);
        }
    };

    let output_dir = settings.output_dir.clone();
    let engine = Arc::new(ConversionEngine::from_settings(settings));
    let reporter = ConversionReporter::new().with_format(args.report_format);

    let mut all_scores = Vec::new();
    for platform in platforms {
        let run = match batch::convert_platform(
            Arc::clone(&engine),
            &sources,
            &output_dir,
            platform,
            args.pattern,
        )
        .await
        {
            Ok(run) => run,
            Err(e) => {
                eprintln!("\n❌ {} conversion failed: {}", platform, e);
                continue;
            }
        };

        all_scores.extend(run.outcomes.iter().filter_map(|o| o.automation));

        let report = reporter.generate_report(
            platform,
            args.pattern,
            run.outcomes,
            run.validation,
            engine.rules().skipped().to_vec(),
        );
        match reporter.format_report(&report) {
            Ok(formatted) => println!("\n{}", formatted),
            Err(e) => eprintln!("\n❌ Failed to format report: {}", e),
        }
        println!("  ✓ Output directory: {}", run.platform_dir.display());
    }

    println!("\n=== Conversion Complete ===");
    println!("  ✓ Source files: {}", sources.len());
    if all_scores.is_empty() {
        println!("  ℹ Average automation: n/a");
    } else {
        let average = all_scores.iter().sum::<f64>() / all_scores.len() as f64;
        println!("  ✓ Average automation: {:.1}% (heuristic, not a correctness measure)", average);
    }
}
