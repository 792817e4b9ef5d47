use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{ArgGroup, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use mediastage_core::status;
use mediastage_core::{run_stage, ExifTool, GroupMode, ProgressCallback, Settings, StageRun};
use regex::Regex;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mediastage", version, about = "Move photos, videos and audio through a staged workflow")]
struct Cli {
    /// Settings file (.yaml, .yml or .json)
    #[arg(short, long, env = "MEDIASTAGE_CONFIG", default_value = "mediastage.yaml")]
    config: PathBuf,

    /// Actually move files and write tags; without this nothing is changed
    #[arg(long, global = true)]
    execute: bool,

    /// Only process paths (relative to the stage source) matching this regex
    #[arg(long, global = true)]
    filter: Option<String>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Hide the progress bar
    #[arg(short, long, global = true)]
    quiet: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Prefix files with their capture time
    Rename,
    /// Convert raw-only images and transcode videos
    Convert,
    /// Move correctly grouped files on, or maintain group folders
    #[command(group(ArgGroup::new("mode").args(["auto", "undo", "backfill", "check"])))]
    Group {
        /// Cluster loose files into TODO_<timestamp> folders
        #[arg(long)]
        auto: bool,
        /// Dissolve TODO_<timestamp> folders
        #[arg(long)]
        undo: bool,
        /// Prefix undated folders with their earliest timestamp
        #[arg(long)]
        backfill: bool,
        /// Report overlapping groups and wrong group timestamps
        #[arg(long)]
        check: bool,
    },
    /// Reconcile ratings across companion files
    Rate,
    /// Move items whose tags are complete and consistent
    Aggregate,
    /// Add positions from GPS tracks
    Localize,
    /// Show what is waiting in each stage
    Status,
}

impl Command {
    fn stage_run(&self) -> Option<StageRun> {
        Some(match self {
            Command::Rename => StageRun::Rename,
            Command::Convert => StageRun::Convert,
            Command::Group {
                auto,
                undo,
                backfill,
                check,
            } => {
                let mode = if *auto {
                    GroupMode::Cluster
                } else if *undo {
                    GroupMode::Undo
                } else if *backfill {
                    GroupMode::Backfill
                } else if *check {
                    GroupMode::Check
                } else {
                    GroupMode::Transition
                };
                StageRun::Group(mode)
            }
            Command::Rate => StageRun::Rate,
            Command::Aggregate => StageRun::Aggregate,
            Command::Localize => StageRun::Localize,
            Command::Status => return None,
        })
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:>8} [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let t_total = std::time::Instant::now();

    let mut settings = Settings::load(&cli.config)
        .with_context(|| format!("cannot load settings from {}", cli.config.display()))?;
    if let Some(filter) = &cli.filter {
        Regex::new(filter).with_context(|| format!("invalid --filter '{}'", filter))?;
        settings.engine.path_filter = Some(filter.clone());
    }

    let Some(run) = cli.command.stage_run() else {
        let all = status::status(&settings)?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&all)?);
        } else {
            for stage in &all {
                println!("{}", stage);
            }
        }
        tracing::info!("status of {} stages in {:.2}s", all.len(), t_total.elapsed().as_secs_f64());
        return Ok(());
    };

    let port = ExifTool::new(&settings.metadata.exiftool);
    if !port.available() {
        bail!(
            "{} not found; install exiftool or set metadata.exiftool",
            settings.metadata.exiftool.display()
        );
    }

    let pb = progress_bar(cli.quiet || cli.json);
    let callback: Box<ProgressCallback> = {
        let pb = pb.clone();
        Box::new(move |phase: &str, current: u64, total: u64, message: &str| {
            pb.set_prefix(phase.to_string());
            pb.set_length(total);
            pb.set_position(current + 1);
            pb.set_message(message.to_string());
        })
    };

    let dry_run = !cli.execute;
    let output = run_stage(run, &settings, &port, dry_run, Some(callback.as_ref()));
    pb.finish_and_clear();
    let output = output?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", output);
        if dry_run {
            eprintln!("Dry run: nothing was changed. Re-run with --execute to apply.");
        }
    }
    tracing::info!("{} in {:.2}s", output.summary(), t_total.elapsed().as_secs_f64());

    if output.has_problems() {
        std::process::exit(1);
    }
    Ok(())
}
