mod config;
mod controller;
mod error;
mod first_prior;
mod layout;
mod log_reader;
mod render;
mod snapshot;
mod statistics;
mod viewer;
mod views;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::FigSize;
use crate::snapshot::SnapshotRequest;
use crate::views::{ViewKind, ViewSource};

#[derive(Parser)]
#[command(name = "prior-viz")]
#[command(about = "Plot how logged Beta and EMA priors evolve")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save one page of EMA priors as a PNG
    Snapshot(SnapshotArgs),

    /// Browse the final Beta density of every key/value, page by page
    Bayes(ViewArgs),

    /// Watch EMA priors while the log grows (space pauses)
    Live(ViewArgs),

    /// Extract the first old_prior of every key
    FirstPrior(FirstPriorArgs),
}

#[derive(Args)]
struct SnapshotArgs {
    /// CSV input file
    #[arg(short, long, default_value = config::EMA_LOG)]
    input: PathBuf,

    /// Page index (0-based, wraps)
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    page: isize,

    /// Output PNG path
    #[arg(short, long, default_value = config::SNAPSHOT_OUTPUT)]
    output: PathBuf,

    /// Figure size as 'w,h' (inches)
    #[arg(long, default_value = "8,4")]
    figsize: String,

    /// Substring to filter keys
    #[arg(short = 't', long)]
    pattern: Option<String>,

    /// Maximum iteration to plot (inclusive)
    #[arg(long)]
    max_iter: Option<u64>,

    #[arg(long, default_value = ",", value_parser = config::parse_delimiter)]
    delimiter: u8,
}

#[derive(Args)]
struct ViewArgs {
    /// CSV log; defaults to the Bayes or EMA log in the working directory
    #[arg(short, long)]
    input: Option<PathBuf>,

    #[arg(long, default_value = ",", value_parser = config::parse_delimiter)]
    delimiter: u8,

    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,
}

#[derive(Args)]
struct FirstPriorArgs {
    /// Tab-delimited log
    #[arg(short, long, default_value = config::EMA_LOG)]
    input: PathBuf,

    #[arg(short, long, default_value = config::FIRST_PRIOR_OUTPUT)]
    output: PathBuf,

    #[arg(long, default_value = "\\t", value_parser = config::parse_delimiter)]
    delimiter: u8,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("INFO"));

    let cli = Cli::parse();

    match cli.command {
        Command::Snapshot(args) => {
            let req = SnapshotRequest {
                input: args.input,
                page: args.page,
                output: args.output,
                figsize: FigSize::parse_or_fallback(&args.figsize),
                pattern: args.pattern,
                max_iter: args.max_iter,
                delimiter: args.delimiter,
            };
            log::info!("Reading log file: {}", req.input.display());
            snapshot::make_snapshot(&req)?;
        }
        Command::Bayes(args) => {
            let source = view_source(ViewKind::Bayes, &args, config::BAYES_LOG);
            log::info!("Reading log file: {}", source.path.display());
            viewer::serve(source, &args.bind, args.port).await?;
        }
        Command::Live(args) => {
            let source = view_source(ViewKind::Live, &args, config::EMA_LOG);
            viewer::serve(source, &args.bind, args.port).await?;
        }
        Command::FirstPrior(args) => {
            let priors = first_prior::first_old_priors(&args.input, args.delimiter)?;
            for (key, prior) in &priors {
                println!("{}\t{}", key, prior);
            }
            first_prior::write_first_priors(&priors, &args.output)?;
            log::info!("Saved {} keys to {}", priors.len(), args.output.display());
        }
    }
    Ok(())
}

fn view_source(kind: ViewKind, args: &ViewArgs, default_log: &str) -> ViewSource {
    ViewSource {
        kind,
        path: args.input.clone().unwrap_or_else(|| PathBuf::from(default_log)),
        delimiter: args.delimiter,
    }
}
