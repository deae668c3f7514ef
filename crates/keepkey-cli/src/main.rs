//! keepkey: approve bridge requests from the terminal

use clap::Parser;
use keepkey_cli::{run, Cli};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keepkey_cli=warn,keepkey_daemon=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    tracing::debug!("Running {}", env!("CARGO_PKG_NAME"));
    run(cli).await?;
    Ok(())
}
