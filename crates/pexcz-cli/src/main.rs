//! pexcz - Command-line driver for fast-booting PEX archives
//!
//! This crate provides the `pexcz` binary, including:
//! - Rewriting a PEX into a `.czex` archive
//! - Parallel extraction of an archive
//! - Booting an archive with a Python interpreter
//! - Archive inspection and configuration display

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use pexcz_core::archive::entry::method_name;
use pexcz_core::boot::cache_dir;
use pexcz_core::config::Config;
use pexcz_core::{
    extract_all, inject, BootRequest, BootSequencer, HostEnv, NoProgress, ProgressSink,
    SourceArchive, BOOT_ERROR_CODE,
};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod progress;

use progress::BarProgress;

/// Environment variable that turns on debug logging
const VERBOSE_ENV: &str = "PEX_VERBOSE";

/// Interpreter used when neither the command line nor the config names one
const DEFAULT_PYTHON: &str = "python3";

/// pexcz - Fast-booting PEX archives
///
/// Rewrites PEX archives so their entry points hand off to a native
/// launcher, and boots or extracts the result.
#[derive(Parser)]
#[command(name = "pexcz")]
#[command(author, version, about = "Rewrites PEX archives into fast-booting .czex archives", long_about = None)]
struct Cli {
    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show progress bar during operations
    #[arg(long, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite a PEX into a .czex archive beside it
    Inject {
        /// PEX file to transform
        pex: PathBuf,
    },

    /// Extract every file of an archive in parallel
    Extract {
        /// Archive file to extract
        archive: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of extraction workers (defaults to one per CPU)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Boot an archive by replacing this process with Python
    Boot {
        /// Archive to boot
        archive: PathBuf,

        /// Python interpreter to boot with
        #[arg(long)]
        python: Option<PathBuf>,

        /// Arguments passed through to the archive's entry point
        #[arg(last = true)]
        args: Vec<OsString>,
    },

    /// List the entries of an archive
    Inspect {
        /// Archive file to inspect
        archive: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Show configuration file path
        #[arg(long, conflicts_with = "show")]
        path: bool,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

fn verbose_from_env() -> bool {
    std::env::var_os(VERBOSE_ENV).is_some_and(|value| !value.is_empty() && value != "0")
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let exit_code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            process::exit(exit_code);
        }
    };

    setup_logging(cli.verbose || verbose_from_env(), cli.quiet);

    match run(cli) {
        Ok(_) => process::exit(0),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(map_error_to_exit_code(&e));
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Inject { pex } => {
            let config = Config::load()?;
            let mut sink: Box<dyn ProgressSink> = if cli.progress {
                Box::new(BarProgress::new("Injecting"))
            } else {
                Box::new(NoProgress)
            };

            let report = inject(&pex, &config, sink.as_mut())?;
            info!(
                "Created {:?} ({} entries, {} byte prefix)",
                report.path,
                report.entries(),
                report.prefix_len
            );
        }

        Commands::Extract {
            archive,
            output,
            workers,
        } => {
            let config = Config::load()?;
            let mut options = config.extract.options();
            if workers.is_some() {
                options.workers = workers;
            }
            let output_dir = output.unwrap_or_else(|| PathBuf::from("."));

            info!("Extracting {:?} to {:?}", archive, output_dir);
            let summary = extract_all(&archive, &output_dir, &options)?;
            info!(
                "Extracted {} of {} files",
                summary.extracted, summary.scheduled
            );

            if summary.failed > 0 {
                anyhow::bail!(
                    "{} of {} files failed to extract",
                    summary.failed,
                    summary.scheduled
                );
            }
        }

        Commands::Boot {
            archive,
            python,
            args,
        } => {
            let config = Config::load_or_default();
            let python = python
                .or(config.boot.python)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PYTHON));

            let cache_dir = cache_dir(&HostEnv, config.boot.cache_dir.as_deref());
            let request = BootRequest::new(archive, python)
                .args(args)
                .cache_dir(cache_dir);
            match BootSequencer::new().boot(&request, &HostEnv)? {}
        }

        Commands::Inspect { archive, json } => {
            info!("Inspecting archive: {:?}", archive);

            let mut source = SourceArchive::open(&archive)?;
            let prefix_len = source.prefix_len()?;
            let entries = source.entries().collect::<pexcz_core::Result<Vec<_>>>()?;
            source.close()?;

            if json {
                let json_output = serde_json::to_string_pretty(&serde_json::json!({
                    "archive": archive,
                    "prefix_len": prefix_len,
                    "entries": entries,
                }))?;
                println!("{}", json_output);
            } else {
                println!("Prefix: {} bytes", prefix_len);
                println!(
                    "{:<50} {:>15} {:>15} {:>10} {:>8}",
                    "Path", "Size", "Compressed", "Method", "Mode"
                );
                println!("{}", "-".repeat(102));

                for entry in &entries {
                    let mode_str = entry
                        .unix_mode
                        .map(|mode| format!("{:o}", mode & 0o7777))
                        .unwrap_or_else(|| "-".to_string());

                    println!(
                        "{:<50} {:>15} {:>15} {:>10} {:>8}",
                        entry.name,
                        entry.size,
                        entry.compressed_size,
                        method_name(entry.compression),
                        mode_str
                    );
                }

                println!("{}", "-".repeat(102));
                println!("Total: {} entries", entries.len());
            }
        }

        Commands::Config { show, path } => {
            if show {
                let config = Config::load()?;
                println!("{}", toml::to_string_pretty(&config)?);
            } else if path {
                println!("{}", Config::config_path()?.display());
            } else {
                warn!("No option given, printing the default configuration");
                print!("{}", Config::default_config_content());
            }
        }
    }

    Ok(())
}

fn map_error_to_exit_code(err: &anyhow::Error) -> i32 {
    if let Some(core_err) = err.downcast_ref::<pexcz_core::Error>() {
        use pexcz_core::Error;

        match core_err {
            Error::ManifestInvalid { .. }
            | Error::InterpreterResolutionFailed { .. }
            | Error::UnpackFailed { .. }
            | Error::ExecFailed { .. } => BOOT_ERROR_CODE,
            Error::Io(_) => 2,
            Error::OpenFailed { .. } => 2,
            Error::InvalidPath(_) => 3,
            Error::EntryMetadataUnavailable { .. }
            | Error::EntryOpenFailed { .. }
            | Error::EntryAddFailed { .. }
            | Error::CompressionSetFailed { .. }
            | Error::PrefixTooLarge { .. }
            | Error::PrefixWriteFailed(_)
            | Error::CloseFailed { .. }
            | Error::Zip(_) => 4,
            Error::Config(_) => 1,
        }
    } else if err.is::<std::io::Error>() {
        2
    } else {
        1
    }
}
