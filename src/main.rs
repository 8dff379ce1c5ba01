//! machound - Mach-O binary inspector for security assessment.
//!
//! Parses one or more Mach-O files and prints their structure: headers,
//! load commands, segments, libraries, code signature and symbols.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use machound::print::{write_report, PrintOptions};
use machound::{parse_with_options, MachOFile, ParseOptions};

/// Mach-O binary inspector for security assessment.
#[derive(Parser, Debug)]
#[command(name = "machound")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Mach-O files to inspect (thin or fat)
    paths: Vec<PathBuf>,

    /// Fail on any warning
    #[arg(long)]
    strict: bool,

    /// Skip symbol table decoding and printing
    #[arg(long)]
    no_symbols: bool,

    /// Print at most N symbols per architecture
    #[arg(long, value_name = "N")]
    max_symbols: Option<usize>,

    /// Verbosity level (0=quiet, 1=warnings, 2=info, 3=debug)
    #[arg(short, long, default_value = "1")]
    verbosity: u8,

    /// Number of parallel jobs when scanning several files (default: number of CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(cli.verbosity);

    if cli.paths.is_empty() {
        Cli::command().print_help().context("Failed to print usage")?;
        return Ok(ExitCode::FAILURE);
    }

    let parse_options = ParseOptions {
        strict: cli.strict,
        skip_symbols: cli.no_symbols,
        skip_code_signature: false,
    };
    let print_options = PrintOptions {
        show_symbols: !cli.no_symbols,
        max_symbols: cli.max_symbols,
    };

    let start = Instant::now();
    let results = if cli.paths.len() == 1 {
        vec![parse_with_options(&cli.paths[0], &parse_options)]
    } else {
        scan_parallel(&cli.paths, &parse_options, cli.jobs)?
    };
    debug!("Parsed {} file(s) in {:.2?}", cli.paths.len(), start.elapsed());

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut failed = 0usize;

    for (i, (path, result)) in cli.paths.iter().zip(results).enumerate() {
        match result {
            Ok(file) => {
                if i > 0 {
                    writeln!(out)?;
                }
                write_report(&mut out, path, &file, &print_options)
                    .with_context(|| format!("Failed to write report for {}", path.display()))?;
            }
            Err(e) => {
                // Keep report and error ordering consistent on a shared terminal.
                out.flush()?;
                eprintln!("error: {}: {}", path.display(), e);
                failed += 1;
            }
        }
    }
    out.flush()?;

    if failed > 0 {
        if cli.paths.len() > 1 {
            warn!("{} of {} files failed to parse", failed, cli.paths.len());
        }
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

/// Parses every path on the rayon pool, returning results in argument order.
fn scan_parallel(
    paths: &[PathBuf],
    options: &ParseOptions,
    jobs: Option<usize>,
) -> Result<Vec<machound::Result<MachOFile>>> {
    if let Some(n) = jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .ok();
    }

    info!("Scanning {} files", paths.len());

    let progress = ProgressBar::new(paths.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );

    let results: Vec<_> = paths
        .par_iter()
        .map(|path| {
            let result = parse_with_options(path, options);
            progress.inc(1);
            result
        })
        .collect();

    progress.finish_and_clear();

    Ok(results)
}
