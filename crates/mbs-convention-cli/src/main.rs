mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::convention::CalculateArgs;
use commands::macro_model::RatePathArgs;

/// Mortgage-backed security cash flow projection and pricing
#[derive(Parser)]
#[command(
    name = "mbsc",
    version,
    about = "Mortgage-backed security cash flow projection and pricing",
    long_about = "Projects the reference-rate path, the mortgage pool cash flows and the \
                  bond waterfall of one or more MBS issues, then prices each bond. All \
                  amounts use decimal arithmetic."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log stage progress to stderr (overrides RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full calculation for the issues in an input file
    Calculate(CalculateArgs),
    /// Project a reference-rate path from a macro scenario
    RatePath(RatePathArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("mbs_convention_core=debug,mbsc=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Calculate(args) => commands::convention::run_calculate(args),
        Commands::RatePath(args) => commands::macro_model::run_rate_path(args),
        Commands::Version => {
            println!("mbsc {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
