//! Hardsub - Batch Subtitle Burning
//!
//! Entry point: validates the environment, discovers the videos that have
//! subtitles and hands them to the workflow one by one.

use anyhow::{anyhow, Result};
use chrono::{Local, TimeDelta};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use hardsub::cli::Args;
use hardsub::config::{Config, FailurePolicy};
use hardsub::discovery::{confirm_video, kinds_present, scan};
use hardsub::error::HardsubError;
use hardsub::media::HandlerSet;
use hardsub::process::{ProcessSupervisor, RunOptions, TRANSCRIPT_TARGET};
use hardsub::setup::{check_directories, check_platform, resolve_tools};
use hardsub::workflow::{check_output_dir, failed_candidates, Workflow};

/// Exit code for failures that carry no HardsubError
const GENERIC_FAILURE: u8 = 6;

#[tokio::main]
async fn main() -> ExitCode {
    println!(
        "{} {} - burn subtitles into videos (GPL-3.0)",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // help and version are printed through the same path
            let code = if e.use_stderr() { 3 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    match run(args).await {
        Ok(code) => code,
        Err(e) => ExitCode::from(report(&e)),
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    check_platform()?;

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(scale) = args.subtitle_scale {
        config.pipeline.subtitle_scale = scale;
    }
    if args.keep_going {
        config.pipeline.failure_policy = FailurePolicy::Continue;
    }
    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(ExitCode::SUCCESS);
    }

    let debug_log = args.debug.then_some(config.pipeline.debug_log.as_path());
    let _guard = setup_logging(args.verbose, debug_log)?;

    check_directories(&args.source_dir, &args.output)?;
    check_output_dir(&args.output, args.force, args.verbose)?;

    // Only the tools for the container kinds actually present are required
    let matches = scan(&args.source_dir, &config.pipeline.subtitle_extension)?;
    if matches.is_empty() {
        return Err(HardsubError::NoCandidates(args.source_dir.display().to_string()).into());
    }
    config.tools = resolve_tools(&config.tools, &kinds_present(&matches))?;

    let supervisor = Arc::new(ProcessSupervisor::new(RunOptions {
        verbose: args.verbose,
        debug: args.debug,
        show_progress: true,
    }));
    let handlers = HandlerSet::new(&config, supervisor);

    let candidates = confirm_video(matches, &handlers).await?;
    if candidates.is_empty() {
        return Err(HardsubError::NoCandidates(args.source_dir.display().to_string()).into());
    }

    println!("Files to process:");
    for candidate in &candidates {
        println!("  {} ({})", candidate.file_name(), candidate.kind);
    }

    let started = Local::now();
    let workflow = Workflow::new(handlers, config.pipeline.failure_policy);
    let outcomes = workflow
        .run(&candidates, &args.output, config.pipeline.subtitle_scale)
        .await?;

    let elapsed = format_elapsed(Local::now() - started);
    let failed = failed_candidates(&outcomes);
    if failed.is_empty() {
        println!(
            "Done: {} file(s) written to {} in {}",
            candidates.len(),
            args.output.display(),
            elapsed
        );
        info!("Hardsub run completed successfully");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} of {} file(s) failed after {}:", failed.len(), candidates.len(), elapsed);
    for outcome in outcomes.iter().filter(|o| o.is_failure()) {
        println!(
            "  {} ({}): {}",
            outcome.candidate.file_name(),
            outcome.stage,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(ExitCode::from(GENERIC_FAILURE))
}

/// Format a duration as a short human readable string
fn format_elapsed(elapsed: TimeDelta) -> String {
    let seconds = elapsed.num_seconds().max(0);
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

/// Print the diagnostic for a fatal error and pick the exit code
fn report(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<HardsubError>() {
        Some(e @ HardsubError::Process(_)) => {
            eprintln!("Error in execution of command. Try again with -v switch to see the executed command.");
            eprintln!("{}", e);
            GENERIC_FAILURE
        }
        Some(e) => {
            eprintln!("Error: {}", e);
            u8::try_from(e.exit_code()).unwrap_or(GENERIC_FAILURE)
        }
        None => {
            eprintln!("Error: {:#}", error);
            GENERIC_FAILURE
        }
    }
}

/// Console logging, plus the debug transcript file when `debug_log` is set.
/// The returned guard must live until the end of the run so the file is flushed.
fn setup_logging(verbose: bool, debug_log: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let log_level = if verbose { Level::DEBUG } else { Level::WARN };

    // The transcript only ever goes to the file
    let console_filter = EnvFilter::from_default_env()
        .add_directive(log_level.into())
        .add_directive(format!("{}=off", TRANSCRIPT_TARGET).parse()?);
    let console_layer = fmt::layer()
        .with_target(false)
        .with_filter(console_filter);

    let (file_layer, guard) = match debug_log {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow!("Invalid debug log path: {}", path.display()))?;

            // Rotation::NEVER appends to the one file across runs
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(file_name.to_string_lossy().as_ref())
                .build(directory)?;
            let (writer, guard) = non_blocking(appender);

            let layer = fmt::layer()
                .with_writer(writer)
                .with_timer(ChronoLocal::rfc_3339())
                .with_ansi(false)
                .with_filter(EnvFilter::new("hardsub=debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    if let Some(path) = debug_log {
        info!("Debug transcript appended to {}", path.display());
    }
    Ok(guard)
}
