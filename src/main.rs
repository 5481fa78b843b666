//! Entry point for nc-subset.
//! Handles CLI parsing and logging setup, then dispatches to list, extract or batch.

use clap::Parser;
use nc_subset::batch::{run_isolated, BatchExecutor, BatchReport, LogProgress};
use nc_subset::cli::{Args, BatchArgs, Commands, ExtractArgs, Isolation};
use nc_subset::prelude::*;
use nc_subset::{metadata::print_variable_paths, subset::ExtractJob};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr. `RUST_LOG` applies unless -v or -q is given.
fn init_logging(verbose: u8, quiet: bool) {
    let filter = match (quiet, verbose) {
        (true, _) => EnvFilter::new("error"),
        (false, 0) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        (false, 1) => EnvFilter::new("debug"),
        (false, _) => EnvFilter::new("trace"),
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("⚠ Logging disabled: {e}");
    }
}

fn run(args: Args) -> Result<ExitCode> {
    match args.command {
        Commands::List { file } => list(&file),
        Commands::Extract(extract_args) => extract(&extract_args),
        Commands::Batch(batch_args) => batch(&batch_args),
    }
}

fn list(file: &Path) -> Result<ExitCode> {
    let source = NetcdfSource::open_for_read(file)?;
    print_variable_paths(&source.group_tree()?);
    Ok(ExitCode::SUCCESS)
}

fn extract(args: &ExtractArgs) -> Result<ExitCode> {
    let job = ExtractJob {
        specs: args.subset.specs()?,
        output_dir: args.subset.output_dir.clone(),
        output_name: args.output_name.clone(),
        options: args.subset.write_options()?,
    };
    let summary = extract_and_write(&args.file, &job)?;
    if !summary.stripped.is_empty() {
        println!("⚠ Not written: {}", summary.stripped.join(", "));
    }
    println!("✅ Saved subset to {}", summary.output_path.display());
    Ok(ExitCode::SUCCESS)
}

fn batch(args: &BatchArgs) -> Result<ExitCode> {
    // Validate everything once before any worker starts.
    let job = ExtractJob {
        specs: args.subset.specs()?,
        output_dir: args.subset.output_dir.clone(),
        output_name: None,
        options: args.subset.write_options()?,
    };
    job.check_distinct_outputs(&args.files)?;
    let executor = BatchExecutor::new(ParallelConfig::new(args.workers)).with_progress(LogProgress);
    println!(
        "🚀 Processing {} files with {} workers",
        args.files.len(),
        executor.config().workers()
    );

    let report: BatchReport<PathBuf, String> = match args.isolation {
        Isolation::Thread => executor.run(args.files.clone(), &job, |file, job| {
            extract_and_write(file, job).map(|summary| summary.output_path.display().to_string())
        })?,
        Isolation::Process => {
            let exe = std::env::current_exe()?;
            let child_args = args.subset.to_cli_args();
            executor.run(args.files.clone(), &child_args, |file, child_args| {
                run_isolated(
                    Command::new(&exe)
                        .arg("--quiet")
                        .arg("extract")
                        .arg(file)
                        .args(child_args),
                )
            })?
        }
    };

    let summary = report.summary_with(|file| file.display().to_string());
    summary.print();
    if let Some(path) = &args.report {
        fs::write(path, summary.to_json()?)?;
        println!("📝 Report written to {}", path.display());
    }

    Ok(if summary.failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
