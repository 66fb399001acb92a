use anyhow::Context;
use clap::Parser;
use tracing::info;

use fairedge::app::App;
use fairedge::cli::{Cli, Command};
use fairedge::config::{Config, FeedSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.logging.init();

    if let Command::Replay { recording } = &cli.command {
        config.feed.source = FeedSource::Replay;
        config.feed.replay_path = Some(recording.display().to_string());
    }

    let app = App::new(config);
    tokio::select! {
        result = app.run() => {
            let summary = result?;
            info!(
                ticks = summary.ticks,
                detected = summary.detected,
                confirmed = summary.confirmed,
                "done"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
        }
    }
    Ok(())
}
