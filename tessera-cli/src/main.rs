mod commands;
mod config;

use clap::{Parser, Subcommand};
use config::Config;
use std::path::PathBuf;
use tessera_core::Version;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Chunked dataset versions on object storage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload every file in a directory as one version, then publish its index
    Upload {
        /// Path to configuration file
        #[arg(short, long, default_value = "tessera.yaml")]
        config: String,

        /// Directory whose files become the chunks
        dir: PathBuf,

        /// Version identifier (a new ULID when omitted)
        #[arg(long)]
        version: Option<String>,

        /// Lowest key covered by the version
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        low: i64,

        /// Highest key covered by the version
        #[arg(long, default_value_t = i64::MAX, allow_hyphen_values = true)]
        high: i64,
    },

    /// Show whether a version is published
    Status {
        #[arg(short, long, default_value = "tessera.yaml")]
        config: String,

        version: String,
    },

    /// Print the merged index of a published version
    Index {
        #[arg(short, long, default_value = "tessera.yaml")]
        config: String,

        version: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tessera=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Err(error) = run(cli.command).await {
        tracing::error!("{}", error);
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> tessera_core::Result<()> {
    match command {
        Commands::Upload {
            config,
            dir,
            version,
            low,
            high,
        } => {
            let cfg = load_config(&config)?;
            let version = version.map(|v| v.parse::<Version>()).transpose()?;

            let outcome = commands::upload_dir(&cfg, &dir, version, low, high).await?;
            tracing::info!(
                "Published version {} ({} records, {} partial deletes failed)",
                outcome.version,
                outcome.summary.records,
                outcome.summary.failed_deletes
            );
            println!("{}", outcome.version);
        }
        Commands::Status { config, version } => {
            let cfg = load_config(&config)?;
            let version: Version = version.parse()?;

            let status = commands::version_status(&cfg, &version).await?;
            match status.records {
                Some(records) if status.published => {
                    println!("{}: published, {} records", version, records)
                }
                _ => println!("{}: not published", version),
            }
        }
        Commands::Index { config, version } => {
            let cfg = load_config(&config)?;
            let version: Version = version.parse()?;

            for range in commands::version_index(&cfg, &version).await? {
                println!("{}\t{}\t{}", range.id, range.low, range.high);
            }
        }
    }

    Ok(())
}

fn load_config(path: &str) -> tessera_core::Result<Config> {
    tracing::debug!("Loading config from {}", path);
    Config::from_file(path)
}
