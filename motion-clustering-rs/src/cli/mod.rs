//! Command-line interface for motion clustering.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::processors::scan;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "motion-clustering")]
#[command(about = "Cluster dynamic voxels in lidar scans", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster a prepared scan CSV (x, y, z, ever_free)
    Cluster {
        /// Input scan CSV
        scan_file: PathBuf,
        /// Output directory for labels and cluster summary
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Minimum points per cluster
        #[arg(long)]
        min_cluster_size: Option<usize>,
        /// Maximum points per cluster
        #[arg(long)]
        max_cluster_size: Option<usize>,
        /// Voxel edge length in meters
        #[arg(long)]
        voxel_size: Option<f32>,
    },

    /// Validate and print the effective configuration as YAML
    Config {
        /// Write the configuration to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<60} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 38 {
            let head: String = value.chars().take(35).collect();
            format!("{}...", head)
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<38} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

fn load_config(path: Option<&Path>) -> PipelineConfig {
    let Some(path) = path else {
        return PipelineConfig::default();
    };
    match PipelineConfig::from_yaml(path) {
        Ok(cfg) => {
            info!("Loaded config from: {}", path.display());
            cfg
        }
        Err(e) => {
            error!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Cluster {
            scan_file,
            output_dir,
            min_cluster_size,
            max_cluster_size,
            voxel_size,
        } => {
            let mut config = config;
            if let Some(min) = min_cluster_size {
                config.clustering.min_cluster_size = min;
            }
            if let Some(max) = max_cluster_size {
                config.clustering.max_cluster_size = max;
            }
            if let Some(size) = voxel_size {
                config.grid.voxel_size = size;
            }
            cmd_cluster(&scan_file, output_dir, &config);
        }
        Commands::Config { output } => {
            cmd_config(output, &config);
        }
    }
}

fn cmd_cluster(scan_file: &Path, output_dir: Option<PathBuf>, config: &PipelineConfig) {
    let start = Instant::now();

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    println!("Clustering dynamic voxels...");
    println!("Input: {}", scan_file.display());
    println!("Parameters:");
    println!("  voxel_size: {}", config.grid.voxel_size);
    println!("  voxels_per_side: {}", config.grid.voxels_per_side);
    println!("  min_cluster_size: {}", config.clustering.min_cluster_size);
    println!("  max_cluster_size: {}", config.clustering.max_cluster_size);

    let spinner = create_spinner("Clustering scan...");

    match scan::process_scan_file(scan_file, output_dir.as_deref(), config) {
        Ok(report) => {
            spinner.finish_and_clear();

            print_summary(
                "Clustering Complete",
                &[
                    ("Input file", scan_file.display().to_string()),
                    ("Labels CSV", report.labels_path.display().to_string()),
                    ("Clusters CSV", report.summary_path.display().to_string()),
                    ("Points", report.num_points.to_string()),
                    ("Seed voxels", report.num_seeds.to_string()),
                    ("Clusters kept", report.clusters.len().to_string()),
                    ("Dynamic points", report.num_dynamic_points().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Clustering failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_config(output: Option<PathBuf>, config: &PipelineConfig) {
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    match output {
        Some(path) => match config.to_yaml(&path) {
            Ok(()) => println!("Wrote configuration to {}", path.display()),
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        },
        None => match serde_yaml::to_string(config) {
            Ok(yaml) => print!("{}", yaml),
            Err(e) => {
                error!("Failed to serialize configuration: {}", e);
                std::process::exit(1);
            }
        },
    }
}
