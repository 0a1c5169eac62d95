//! label-scan - read nutrition labels from photos
//!
//! Scans one or more label images with the configured OCR engine and prints
//! the recognized text row by row.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use label_scan::config::{self, AppConfig};
use label_scan::{CancelToken, ScanError, ScanPipeline, ScanReport};

/// label-scan - turn nutrition label photos into text rows
#[derive(Parser, Debug)]
#[command(name = "label-scan")]
#[command(about = "Reconstructs the row layout of nutrition labels from OCR output")]
struct Args {
    /// Label images to scan
    #[arg(required_unless_present = "write_default_config")]
    images: Vec<PathBuf>,

    /// Configuration file (defaults to config.toml in the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write an annotated copy of each image into this directory
    #[arg(short, long)]
    overlay_dir: Option<PathBuf>,

    /// Override the minimum detection confidence
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Override the row overlap fraction
    #[arg(long)]
    overlap_fraction: Option<f64>,

    /// Number of images scanned at once
    #[arg(short, long, default_value = "2")]
    jobs: usize,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Lowercase recognized text
    #[arg(long)]
    lowercase: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Write the default configuration file and exit
    #[arg(long)]
    write_default_config: bool,
}

struct Job {
    image: PathBuf,
    overlay: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins when set
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder().with_writer(std::io::stderr);
    if std::env::var_os("RUST_LOG").is_some() {
        tracing::subscriber::set_global_default(builder.with_env_filter(EnvFilter::from_default_env()).finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.with_max_level(level).finish())?;
    }

    if args.write_default_config {
        let path = match &args.config {
            Some(path) => path.clone(),
            None => config::default_config_path()?,
        };
        config::save_config(&AppConfig::default(), &path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let mut config = load_or_default_config(args.config.as_deref())?;
    if let Some(min_confidence) = args.min_confidence {
        config.layout.min_confidence = min_confidence;
    }
    if let Some(overlap_fraction) = args.overlap_fraction {
        config.layout.overlap_fraction = overlap_fraction;
    }

    let jobs = plan_jobs(&args.images, args.overlay_dir.as_deref())?;
    let failures = run_jobs(jobs, &config, args.jobs.max(1), &args)?;

    if failures > 0 {
        bail!("{} of {} images failed", failures, args.images.len());
    }
    Ok(())
}

/// Load configuration from an explicit path, the default location, or defaults
fn load_or_default_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(path) = config::default_config_path() {
        if path.exists() {
            let config = config::load_config(&path)?;
            info!("Loaded configuration from {:?}", path);
            return Ok(config);
        }
    }

    info!("Using default configuration");
    Ok(AppConfig::default())
}

/// Pair each image with its overlay destination, rejecting clashes up front
fn plan_jobs(images: &[PathBuf], overlay_dir: Option<&Path>) -> Result<Vec<Job>> {
    if let Some(dir) = overlay_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create overlay directory {:?}", dir))?;
    }

    let mut destinations = HashSet::new();
    let mut jobs = Vec::with_capacity(images.len());

    for image in images {
        let overlay = match overlay_dir {
            Some(dir) => {
                let path = overlay_path(dir, image);
                if !destinations.insert(path.clone()) {
                    bail!("Two images would write the same overlay {:?}", path);
                }
                Some(path)
            }
            None => None,
        };
        jobs.push(Job {
            image: image.clone(),
            overlay,
        });
    }

    Ok(jobs)
}

/// `<dir>/<stem>.overlay.<ext>`
fn overlay_path(dir: &Path, image: &Path) -> PathBuf {
    let stem = image.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match image.extension() {
        Some(ext) => format!("{}.overlay.{}", stem, ext.to_string_lossy()),
        None => format!("{}.overlay.png", stem),
    };
    dir.join(name)
}

/// Scan all images on a small worker pool and report each as it finishes.
/// Returns the number of images that failed.
fn run_jobs(jobs: Vec<Job>, config: &AppConfig, workers: usize, args: &Args) -> Result<usize> {
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
    let (result_tx, result_rx) = crossbeam_channel::unbounded::<Result<ScanReport, ScanError>>();
    let cancel = CancelToken::new();

    for job in jobs {
        job_tx.send(job)?;
    }
    drop(job_tx);

    let mut failures = 0;
    std::thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let cancel = cancel.clone();
            scope.spawn(move || {
                let pipeline = ScanPipeline::from_config(config).with_cancel_token(cancel);
                for job in job_rx {
                    let result = pipeline.scan_with_overlay(&job.image, job.overlay.as_deref());
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        for result in result_rx {
            match result {
                Ok(report) => print_report(&report, args),
                Err(e) if e.is_no_text() => print_no_text(e.image(), args),
                Err(e) => {
                    error!("{}", e);
                    failures += 1;
                }
            }
        }
    });

    Ok(failures)
}

fn print_report(report: &ScanReport, args: &Args) {
    let lines: Vec<String> = report
        .rows
        .lines()
        .into_iter()
        .map(|line| if args.lowercase { line.to_lowercase() } else { line })
        .collect();

    if args.json {
        let overlay = match &report.overlay {
            Some(Ok(path)) => serde_json::json!({ "path": path }),
            Some(Err(e)) => serde_json::json!({ "error": e.to_string() }),
            None => serde_json::Value::Null,
        };
        let value = serde_json::json!({
            "image": report.image,
            "lines": lines,
            "rows": report.rows,
            "skipped_lines": report.skipped_lines.len(),
            "low_confidence": report.low_confidence,
            "overlay": overlay,
            "processing_time_ms": report.processing_time_ms,
        });
        println!("{}", value);
        return;
    }

    println!("== {}", report.image.display());
    for line in &lines {
        println!("{}", line);
    }
    if let Some(Err(e)) = &report.overlay {
        println!("(overlay failed: {})", e);
    }
}

fn print_no_text(image: &Path, args: &Args) {
    if args.json {
        println!("{}", serde_json::json!({ "image": image, "lines": [], "no_text": true }));
    } else {
        println!("== {}", image.display());
        println!("(no text found)");
    }
}
