//! qtt - render Go text/template templates from the command line

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "qtt")]
#[command(version)]
#[command(about = "Render Go text/template templates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template collection against JSON data
    Render {
        /// Template files; all are parsed into one collection
        #[arg(required = true)]
        templates: Vec<PathBuf>,

        /// JSON data file ('-' for stdin)
        #[arg(short, long)]
        data: Option<String>,

        /// Template to execute (defaults to the first file's stem)
        #[arg(short, long)]
        name: Option<String>,

        /// Text printed for missing values
        #[arg(long)]
        no_value: Option<String>,

        /// Missing key policy: default, invalid, zero or error
        #[arg(long)]
        missing_key: Option<String>,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Log every missing value substitution
        #[arg(long)]
        notify: bool,
    },

    /// List the fully parsed templates of a collection
    List {
        /// Template files; all are parsed into one collection
        #[arg(required = true)]
        templates: Vec<PathBuf>,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qtt=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            templates,
            data,
            name,
            no_value,
            missing_key,
            config,
            notify,
        } => commands::render::execute(commands::render::RenderArgs {
            templates,
            data,
            name,
            no_value,
            missing_key,
            config,
            notify,
        }),
        Commands::List { templates, config } => {
            commands::list::execute(commands::list::ListArgs { templates, config })
        }
    }
}
