use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{LevelFilter, info};
use mart2d_backend_cpu::SlabFft;
use mart2d_core::{
    comm::{Communicator, run_workers},
    config::SimulationConfig,
    simulation::{LoadStepReport, RunObserver, Simulation},
};

#[derive(Parser, Debug)]
#[command(
    name = "mart2d",
    about = "Elasticity-coupled phase-field solver for multi-variant martensite"
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: PathBuf,
    /// Number of workers; the grid rows are split between them
    #[arg(short, long, default_value_t = 1)]
    workers: usize,
    /// Override the configured output directory
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Override the configured noise seed
    #[arg(long)]
    seed: Option<u64>,
    /// Only log warnings and errors; no progress bar
    #[arg(long)]
    quiet: bool,
}

fn init_logging(quiet: bool) {
    let level = if quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };
    // RUST_LOG, when set, takes precedence over the flag.
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

/// Load-step progress bar, drawn by rank 0 only.
struct Progress {
    bar: Option<ProgressBar>,
}

impl Progress {
    fn new(enabled: bool, nsteps: usize) -> Self {
        let bar = enabled.then(|| {
            let bar = ProgressBar::new(nsteps as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▓░"),
            );
            bar
        });
        Self { bar }
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

impl RunObserver for Progress {
    fn on_iteration(&mut self, step: usize, iteration: usize, max_change: f64) {
        if let Some(bar) = &self.bar {
            if iteration % 100 == 0 {
                bar.set_message(format!("step {step} iter {iteration} change={max_change:.2e}"));
            }
        }
    }

    fn on_load_step(&mut self, report: &LoadStepReport) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
            bar.set_message(format!("area={:.6}", report.area_fraction));
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.quiet);
    if cli.workers == 0 {
        return Err("--workers must be at least 1".into());
    }

    info!("[cli] loading config {}", cli.config.display());
    let mut config = SimulationConfig::from_path(&cli.config)?;
    if let Some(dir) = cli.output_dir.clone() {
        config.output_dir = dir;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    let config = config.with_resolved_seed();
    let metrics = config.metrics.build_recorder()?;
    info!(
        "[cli] {} worker(s), writing to {}",
        cli.workers,
        config.output_dir.display()
    );

    let results = run_workers(cli.workers, |comm| {
        let show_progress = comm.is_root() && !cli.quiet;
        let engine = SlabFft::new(config.grid(), comm);
        let mut sim = Simulation::new(engine, config.clone())?;
        let mut progress = Progress::new(show_progress, config.nsteps);
        let summary = sim.run(metrics.as_ref(), &mut progress);
        progress.finish();
        summary
    });
    // Every worker reaches the same outcome; report rank 0's.
    let summary = results
        .into_iter()
        .next()
        .ok_or("worker group produced no result")??;

    if let Some((step, area)) = summary.area_fractions().last() {
        info!(
            "[cli] finished {} load steps ({} relaxation iterations) in {:.2?}; final area fraction {area:.6} at step {step}",
            summary.steps.len(),
            summary.total_iterations,
            summary.duration
        );
    }
    info!("[cli] area log: {}", config.area_log_path().display());
    Ok(())
}
