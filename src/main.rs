//! qcloud-upload -- store, inspect, and delete uploads in a COS bucket.
//!
//! Every command loads the YAML configuration, binds a signed client to
//! the configured credentials, and prints the result as JSON on stdout.
//! Logs go to stderr.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use qcloud_upload::config::LoggingConfig;
use qcloud_upload::storage::cos::CosClientFactory;
use qcloud_upload::storage::file::LocalFile;
use qcloud_upload::{metrics, ConfiguredUploader, QcloudStorage};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "qcloud-upload",
    version,
    about = "Store files in a Tencent Cloud COS bucket"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "qcloud.yaml")]
    config: String,

    /// Print Prometheus metrics to stdout after the command.
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a local file.
    Store {
        /// File to upload.
        file: PathBuf,
        /// Identifier used for the object key (defaults to the file name).
        #[arg(short, long)]
        identifier: Option<String>,
    },
    /// Look up an object and print its handle.
    Retrieve { identifier: String },
    /// Print object metadata.
    Stat { identifier: String },
    /// Print the public URL of an object.
    Url { identifier: String },
    /// Delete an object.
    Delete { identifier: String },
    /// Download object content.
    Download { identifier: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = qcloud_upload::config::load_config(&cli.config)?;
    init_tracing(&config.logging);
    info!("Loaded configuration from {}", cli.config);

    if config.observability.metrics {
        metrics::init_metrics()?;
        metrics::describe_metrics();
    }

    let factory = CosClientFactory::new(&config.client)?;
    let storage = QcloudStorage::new(factory);
    let mut uploader = ConfiguredUploader::from_config(&config);

    let result = run(&storage, &mut uploader, cli.command).await;

    if cli.print_metrics {
        if let Some(text) = metrics::render() {
            print!("{text}");
        }
    }

    result
}

async fn run(
    storage: &QcloudStorage<CosClientFactory>,
    uploader: &mut ConfiguredUploader,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Store { file, identifier } => {
            let local = LocalFile::open(&file).await?;
            let identifier = identifier.unwrap_or_else(|| local.filename().to_string());
            let stored = uploader.store_file(storage, local, &identifier).await?;
            print_json(&json!({
                "path": stored.file.path(),
                "url": stored.file.url(),
                "outcome": stored.outcome,
            }))?;
            if !stored.outcome.success {
                anyhow::bail!("upload rejected with HTTP {}", stored.outcome.status);
            }
        }
        Command::Retrieve { identifier } => {
            let retrieved = uploader.retrieve_from_store(storage, &identifier).await?;
            print_json(&json!({
                "path": retrieved.file.path(),
                "url": retrieved.file.url(),
                "stat": retrieved.stat,
            }))?;
        }
        Command::Stat { identifier } => {
            let handle = storage.handle(&*uploader, &identifier)?;
            let stat = handle.stat().await?;
            print_json(&json!({ "path": handle.path(), "stat": stat }))?;
        }
        Command::Url { identifier } => {
            let handle = storage.handle(&*uploader, &identifier)?;
            println!("{}", handle.url());
        }
        Command::Delete { identifier } => {
            let handle = storage.handle(&*uploader, &identifier)?;
            let outcome = handle.delete().await?;
            print_json(&json!({ "path": handle.path(), "outcome": outcome }))?;
            if !outcome.success {
                anyhow::bail!("delete rejected with HTTP {}", outcome.status);
            }
        }
        Command::Download { identifier } => {
            let handle = storage.handle(&*uploader, &identifier)?;
            let file = handle.retrieve().await?;
            std::io::stdout().write_all(file.content())?;
        }
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize tracing from `RUST_LOG`, falling back to the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
