//! skillcast CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "skillcast",
    version,
    about = "Assessment progress summaries and score forecasts"
)]
struct Cli {
    /// Config file path (default: ./skillcast.toml, then ~/.config/skillcast/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create starter config and example dataset
    Init,

    /// Validate dataset files
    Validate {
        /// Path to .toml/.csv dataset or directory
        #[arg(long)]
        data: PathBuf,
    },

    /// Summarize participant progress
    Summary {
        /// Path to .toml/.csv dataset or directory
        #[arg(long)]
        data: PathBuf,

        /// Show the full history of one participant
        #[arg(long)]
        participant: Option<String>,

        /// Only assessments on or after this date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Only assessments on or before this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Forecast one participant's total score
    Forecast {
        /// Path to .toml/.csv dataset or directory
        #[arg(long)]
        data: PathBuf,

        /// Participant id
        #[arg(long)]
        participant: String,

        /// Days to project past the last assessment
        #[arg(long)]
        horizon: Option<u32>,

        /// Trend model: linear, robust
        #[arg(long)]
        model: Option<String>,

        /// Prediction band coverage, e.g. 0.8
        #[arg(long)]
        level: Option<f64>,

        /// Output format: text, json, csv
        #[arg(long, default_value = "text")]
        format: String,

        /// Write output to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Summarize and forecast every participant
    Cohort {
        /// Path to .toml/.csv dataset or directory
        #[arg(long)]
        data: PathBuf,

        /// Output directory (default from config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: json, markdown, html, csv, all
        #[arg(long, default_value = "json")]
        format: String,

        /// Max participants analysed concurrently
        #[arg(long)]
        parallelism: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                    "skillcast=info"
                        .parse()
                        .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
                ),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { data } => commands::validate::execute(data, config),
        Commands::Summary {
            data,
            participant,
            from,
            to,
            format,
        } => commands::summary::execute(data, participant, from, to, format, config),
        Commands::Forecast {
            data,
            participant,
            horizon,
            model,
            level,
            format,
            out,
        } => commands::forecast::execute(
            data,
            participant,
            horizon,
            model,
            level,
            format,
            out,
            config,
        ),
        Commands::Cohort {
            data,
            output,
            format,
            parallelism,
        } => commands::cohort::execute(data, output, format, parallelism, config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
