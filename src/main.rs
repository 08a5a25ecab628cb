// ABOUTME: CLI entry point for seminars-export
// ABOUTME: Parses commands and routes to the export and plan handlers

use clap::{Parser, Subcommand};
use seminars_export::commands;

#[derive(Parser)]
#[command(name = "seminars-export")]
#[command(about = "Sanitized flat-file export of the seminars database", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump and sanitize every exported table into a directory
    Export {
        /// PostgreSQL URL or SQLite database file
        #[arg(long)]
        source: String,
        /// Directory receiving the export files
        #[arg(long)]
        output: String,
        /// Keep this user's identity unmasked (repeatable)
        #[arg(long = "retain-user")]
        retain_user: Vec<String>,
        /// TOML file with retained users, safe columns, and delimiter
        #[arg(long)]
        config: Option<String>,
        /// Single-character field delimiter (default '|')
        #[arg(long)]
        delimiter: Option<String>,
        /// Write a JSON manifest of the run to this path
        #[arg(long)]
        manifest: Option<String>,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Show which columns each table keeps or masks, without exporting
    Plan {
        /// PostgreSQL URL or SQLite database file
        #[arg(long)]
        source: String,
        /// Directory an export would write to (checked for stale temp files)
        #[arg(long, default_value = ".")]
        output: String,
        /// TOML file with retained users, safe columns, and delimiter
        #[arg(long)]
        config: Option<String>,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            source,
            output,
            retain_user,
            config,
            delimiter,
            manifest,
            yes,
        } => {
            commands::export(
                &source,
                &output,
                retain_user,
                config.as_deref(),
                delimiter.as_deref(),
                manifest.as_deref(),
                yes,
            )
            .await?;
            Ok(())
        }
        Commands::Plan {
            source,
            output,
            config,
            json,
        } => commands::plan(&source, &output, config.as_deref(), json).await,
    }
}
