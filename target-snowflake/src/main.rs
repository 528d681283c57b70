//! Singer target for Snowflake.
//!
//! Reads protocol messages from stdin, loads them into Snowflake, and writes
//! checkpoint messages to stdout once their data is durable. All logging goes
//! to stderr; stdout carries nothing but checkpoints.

use std::path::PathBuf;

use clap::Parser;
use config::shared::TargetConfig;
use sink::error::{ErrorKind, SinkResult};
use sink::pipeline::Pipeline;
use sink::sink_error;
use sink::warehouse::snowflake::SnowflakeFactory;
use sink::warehouse::{Session, WarehouseLocation};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "target-snowflake", about = "Loads Singer messages into Snowflake")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long)]
    config: PathBuf,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(%err, "target failed");
        std::process::exit(1);
    }
}

async fn run() -> SinkResult<()> {
    let cli = Cli::parse();

    let config = TargetConfig::load(&cli.config).map_err(|err| {
        sink_error!(ErrorKind::ConfigError, "Failed to load configuration", err)
    })?;

    let location = WarehouseLocation {
        database: config.connection.database.clone(),
        schema: config.connection.schema.clone(),
        role: config.connection.role.clone(),
    };

    let session = Session::connect(SnowflakeFactory::new(config.connection.clone())).await?;
    let mut pipeline = Pipeline::new(session, location, config.batch.clone(), std::io::stdout());

    info!(account = %config.connection.account, "target started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        pipeline.process_line(&line).await?;
    }

    pipeline.drain().await?;
    info!("all streams drained");

    Ok(())
}
