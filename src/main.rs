//! medialibchecker - Seek-Minimizing Media Library Checksummer
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use humansize::{format_size, BINARY};
use medialibchecker::config::{CliArgs, ScanConfig};
use medialibchecker::progress::{
    format_elapsed, format_number, print_header, print_summary, ProgressReporter,
};
use medialibchecker::scan::{ScanStats, Traversal};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments; a usage error exits 1
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    setup_logging(args.verbose)?;

    let config = ScanConfig::from_args(args).context("Invalid configuration")?;

    // the extent utility's stderr capture lands under logs/
    if let Err(e) = std::fs::create_dir_all("logs") {
        tracing::warn!("Cannot create logs directory: {}", e);
    }

    if config.show_progress {
        print_header(&config.root.display().to_string());
    }

    let result = run_traversal(config)?;

    print_summary(&result);

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("medialibchecker=debug,performance=debug")
    } else {
        EnvFilter::new("medialibchecker=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}

fn run_traversal(config: ScanConfig) -> Result<ScanStats> {
    let show_progress = config.show_progress;
    let mut traversal = Traversal::new(config);

    // First Ctrl+C asks the scan to wind down at the next safe point; a
    // second one stops waiting for it
    let shared = traversal.shared();
    let already_interrupted = AtomicBool::new(false);
    ctrlc::set_handler(move || {
        if already_interrupted.swap(true, Ordering::SeqCst) {
            eprintln!("\nAborting.");
            std::process::exit(130);
        }
        eprintln!("\nStopping the scan (Ctrl+C again to abort at once)...");
        shared.request_shutdown();
    })
    .context("Failed to set signal handler")?;

    let result = if show_progress {
        let reporter = ProgressReporter::new();
        reporter.set_status("Gathering extent maps...");

        let stats = {
            let reporter = reporter.clone();
            traversal.run_with_progress(move |progress| {
                let msg = format!(
                    "Dirs: {} | Hashed: {} files, {} | Pass: {} | {}",
                    format_number(progress.directories),
                    format_number(progress.files_hashed),
                    format_size(progress.bytes_hashed, BINARY),
                    progress.pass,
                    format_elapsed(progress.elapsed),
                );
                reporter.set_status(&msg);
            })
        };

        if stats.completed {
            reporter.finish("Scan completed");
        } else {
            reporter.finish("Scan interrupted");
        }
        stats
    } else {
        traversal.run()
    };

    Ok(result)
}
