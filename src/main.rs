//! fNIRS Toolkit CLI
//!
//! Block-segmented hemoglobin aggregation and region reports.

use clap::{Parser, Subcommand};
use fnirs_toolkit::{
    config::{Config, ConfigOverrides},
    ledger::{create_shared_ledger, ledger_path, CumulativeStats},
    run::{discover_inputs, MappingStatus, Pipeline, RunReport, TrialStatus},
    source::JsonExportConverter,
    HeatmapSpecRenderer, VERSION,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fnirs-toolkit")]
#[command(version = VERSION)]
#[command(about = "Block-segmented hemoglobin aggregation for fNIRS research", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a directory of converted recordings
    Process {
        /// Directory of input files (defaults to the configured input_dir)
        input_dir: Option<PathBuf>,

        /// Output root; tables go to data/, heatmaps to figures/
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Channel-to-region mapping file
        #[arg(long, short)]
        mapping: Option<PathBuf>,

        /// Input file extension
        #[arg(long)]
        ext: Option<String>,

        /// Number of extraction workers
        #[arg(long)]
        jobs: Option<usize>,
    },

    /// Show cumulative run statistics
    Status,

    /// Show configuration; any option given is saved to the config file
    Config {
        /// Default input directory
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Default output root
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Default channel-to-region mapping file
        #[arg(long, short)]
        mapping: Option<PathBuf>,

        /// Default input file extension
        #[arg(long)]
        ext: Option<String>,

        /// Default number of extraction workers
        #[arg(long)]
        jobs: Option<usize>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            input_dir,
            output,
            mapping,
            ext,
            jobs,
        } => {
            cmd_process(ConfigOverrides {
                input_dir,
                output_dir: output,
                mapping_path: mapping,
                input_extension: ext,
                workers: jobs,
            });
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config {
            input_dir,
            output,
            mapping,
            ext,
            jobs,
        } => {
            cmd_config(ConfigOverrides {
                input_dir,
                output_dir: output,
                mapping_path: mapping,
                input_extension: ext,
                workers: jobs,
            });
        }
    }
}

fn cmd_process(overrides: ConfigOverrides) {
    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = overrides.apply_to(&mut config) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let Some(input_dir) = config.input_dir.clone() else {
        eprintln!("Error: no input directory given and none configured");
        std::process::exit(1);
    };

    let files = match discover_inputs(&input_dir, &config.input_extension) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    println!("fNIRS Toolkit v{VERSION}");
    println!();
    println!("Input: {} ({} files)", input_dir.display(), files.len());
    println!("Output: {}", config.output_dir.display());
    println!("Workers: {}", config.workers);

    let mapping = MappingStatus::resolve(config.mapping_path.as_deref());
    match &mapping {
        MappingStatus::NotConfigured => println!("Mapping: none (region reports disabled)"),
        MappingStatus::Missing(path) => {
            println!("Mapping: {} not found (region reports disabled)", path.display())
        }
        MappingStatus::Invalid { path, reason } => println!(
            "Mapping: {} is invalid: {} (region reports disabled)",
            path.display(),
            reason
        ),
        MappingStatus::Loaded { path, map } => {
            println!("Mapping: {} ({} channels)", path.display(), map.len())
        }
    }
    println!();

    let layout = config.layout();
    let renderer = HeatmapSpecRenderer::new(&layout.figures_dir);
    let converter = JsonExportConverter::new();
    let ledger = create_shared_ledger();

    let result = Pipeline::new(&converter)
        .with_workers(config.workers)
        .with_ledger(ledger.clone())
        .run(&files, mapping.map(), &layout, &renderer);

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    print_report(&report);

    println!();
    println!("{}", ledger.summary());

    if let Err(e) = ledger.append_to(&ledger_path(&config.data_path)) {
        tracing::warn!("Could not update run ledger: {}", e);
    }
}

fn print_report(report: &RunReport) {
    let analysis = &report.analysis;

    println!("Trials");
    println!("======");
    for trial in &analysis.trials {
        match &trial.status {
            TrialStatus::Succeeded => println!(
                "  ✓ {} ({} blocks, {} measurements)",
                trial.trial, trial.block_count, trial.measurement_count
            ),
            TrialStatus::Failed(reason) => println!("  ✗ {}: {}", trial.trial, reason),
        }
    }
    println!();

    println!("Blocks: {}", analysis.block_order.labels().join(", "));
    println!();

    println!("Outputs");
    println!("=======");
    if let Some(path) = &report.written.measurements {
        println!("  Measurements: {}", path.display());
    }
    if let Some(path) = &report.written.detailed {
        let (rows, cols) = analysis.detailed.shape();
        println!(
            "  Detailed table ({} x {}): {}",
            rows,
            cols,
            path.display()
        );
    }
    if let Some(rollup) = &analysis.regions {
        for (region, path) in &report.written.regions {
            match rollup.table(region) {
                Some(t) => {
                    let (rows, cols) = t.table.shape();
                    println!(
                        "  Region {} ({} x {}, {} channels): {}",
                        region,
                        rows,
                        cols,
                        t.channel_count,
                        path.display()
                    );
                }
                None => println!("  Region {}: {}", region, path.display()),
            }
        }
    }
    println!("  Region tables: {}", report.region_table_count());
    for (region, path) in &report.figures {
        println!("  Heatmap {}: {}", region, path.display());
    }
    for (region, reason) in &report.region_failures {
        println!("  Region {} failed: {}", region, reason);
    }
    for (region, reason) in &report.render_failures {
        println!("  Heatmap {} failed: {}", region, reason);
    }

    if let Some(rollup) = &analysis.regions {
        if !rollup.unmapped_channels.is_empty() {
            println!();
            println!(
                "Unmapped channels ({}): {}",
                rollup.unmapped_channels.len(),
                rollup
                    .unmapped_channels
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("fNIRS Toolkit Status");
    println!("====================");
    println!();

    println!("Configuration:");
    match &config.input_dir {
        Some(dir) => println!("  Input directory: {}", dir.display()),
        None => println!("  Input directory: not set"),
    }
    println!("  Output directory: {}", config.output_dir.display());
    match &config.mapping_path {
        Some(path) => println!("  Mapping: {}", path.display()),
        None => println!("  Mapping: not set"),
    }
    println!("  Workers: {}", config.workers);
    println!();

    let path = ledger_path(&config.data_path);
    match CumulativeStats::load(&path) {
        Ok(Some(totals)) => {
            println!("Cumulative Statistics:");
            println!("  Runs: {}", totals.runs);
            println!("  Files processed: {}", totals.files_succeeded);
            println!("  Files failed: {}", totals.files_failed);
            println!("  Measurements: {}", totals.measurements);
            println!("  Region tables: {}", totals.region_tables);
            println!("  Figures handed off: {}", totals.figures_rendered);
            if let Some(updated) = totals.last_updated {
                println!("  Last run: {}", updated.to_rfc3339());
            }
        }
        Ok(None) => println!("No runs recorded yet."),
        Err(e) => println!("Could not read ledger {}: {}", path.display(), e),
    }
}

fn cmd_config(overrides: ConfigOverrides) {
    let mut config = Config::load().unwrap_or_default();

    if !overrides.is_empty() {
        if let Err(e) = overrides.apply_to(&mut config) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        if let Err(e) = config.save() {
            eprintln!("Error saving config: {e}");
            std::process::exit(1);
        }
        println!("Configuration saved.");
        println!();
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}
