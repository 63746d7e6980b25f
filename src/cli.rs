use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Parser, Debug)]
#[command(
    name = "digitization",
    version,
    about = "Reconcile archive inventories against object storage and maintain MARCXML exports"
)]
struct Cli {
    /// Print the command report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug-level progress logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build one MARCXML export per inventory file and reconcile it against storage
    Import {
        /// Directory holding one inventory file per box
        #[arg(short = 'd', long = "data")]
        data_dir: PathBuf,
        /// Destination for box exports and finding logs
        #[arg(short = 'o', long = "output")]
        out_dir: PathBuf,
    },
    /// Write reconciliation finding logs without building exports
    Reconcile {
        #[arg(short = 'd', long = "data")]
        data_dir: PathBuf,
        #[arg(short = 'o', long = "output")]
        out_dir: PathBuf,
    },
    /// Rewrite placeholder paths in legacy record XML to public URLs
    FixEosPaths {
        /// Tree to walk; defaults to the configured legacy storage root
        #[arg(short = 'd', long = "dir")]
        root: Option<PathBuf>,
        /// Where missing-metadata and error logs go; defaults to the logs dir
        #[arg(short = 'r', long = "report-dir")]
        report_dir: Option<PathBuf>,
    },
    /// Merge single-record XML files into numbered collection files
    CreateCollectionFile {
        #[arg(short = 'd', long = "dir")]
        input_dir: PathBuf,
        #[arg(short = 'o', long = "output")]
        output_dir: PathBuf,
        /// Members per collection file
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Replace spaces in names under the input dir first
        #[arg(long)]
        fix_white_spaces: bool,
    },
    /// Replace spaces in file and directory names with underscores
    FixWhiteSpaces {
        #[arg(short = 'd', long = "dir")]
        dir: PathBuf,
    },
    /// Validate stored PDFs under a prefix
    VerifyPdfs {
        #[arg(long)]
        prefix: String,
        /// PDFs sit directly under the prefix instead of in record folders
        #[arg(long)]
        flat: bool,
        #[arg(short = 'o', long = "log")]
        log_file: Option<PathBuf>,
    },
    /// Show resolved paths and effective configuration
    Status,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let state = if report.ok { "ok" } else { "issues" };
    println!("{}: {state}", report.command);
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  ! {issue}");
    }
    Ok(())
}

fn dispatch(command: Command) -> Result<CommandReport> {
    match command {
        Command::Import { data_dir, out_dir } => {
            commands::import::run(&commands::import::ImportOptions { data_dir, out_dir })
        }
        Command::Reconcile { data_dir, out_dir } => {
            commands::reconcile::run(&commands::import::ImportOptions { data_dir, out_dir })
        }
        Command::FixEosPaths { root, report_dir } => {
            commands::fix_eos_paths::run(&commands::fix_eos_paths::FixEosPathsOptions {
                root,
                report_dir,
            })
        }
        Command::CreateCollectionFile {
            input_dir,
            output_dir,
            chunk_size,
            fix_white_spaces,
        } => commands::create_collection::run(&commands::create_collection::CreateCollectionOptions {
            input_dir,
            output_dir,
            chunk_size,
            fix_white_spaces,
        }),
        Command::FixWhiteSpaces { dir } => commands::fix_white_spaces::run(&dir),
        Command::VerifyPdfs {
            prefix,
            flat,
            log_file,
        } => commands::verify_pdfs::run(&commands::verify_pdfs::VerifyPdfsOptions {
            prefix,
            flat,
            log_file,
        }),
        Command::Status => commands::status::run(),
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let report = dispatch(cli.command)?;
    print_report(&report, cli.json)?;
    if !report.ok {
        std::process::exit(2);
    }
    Ok(())
}
