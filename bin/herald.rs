use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use herald::HeraldConfig;
use herald_common::{SenderId, log::Logger};
use herald_delivery::{
    CampaignStore, MailTransport, MemoryCampaignStore, MemorySettings, QueueService,
    SettingsStore, SmtpMailTransport,
};
use herald_store::{MemoryQueueStore, QueueStore};
use tracing::info;

/// Campaign delivery queue daemon.
#[derive(Debug, Parser)]
#[command(name = "herald", version, about)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "herald.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    Logger::init();

    let args = Args::parse();
    let config = HeraldConfig::from_path(&args.config)?;

    let settings = Arc::new(MemorySettings::new());
    for (key, value) in &config.settings {
        settings.set(key, value);
    }

    let transport = SmtpMailTransport::new(&config.smtp).context("building smtp transport")?;

    let service = QueueService::new(
        Arc::new(MemoryQueueStore::new()) as Arc<dyn QueueStore>,
        Arc::new(MemoryCampaignStore::new()) as Arc<dyn CampaignStore>,
        settings as Arc<dyn SettingsStore>,
        Arc::new(transport) as Arc<dyn MailTransport>,
        SenderId::new(config.sender_id.clone()),
        config.delivery.clone(),
    )
    .await;

    service.start();
    info!("herald running, ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    service.stop().await;
    info!("herald stopped");

    Ok(())
}
