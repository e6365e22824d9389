#![forbid(unsafe_code)]
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

mod blame;
mod cli;
mod config;
mod content;
mod mapping;
mod message;
mod network;
mod pipeline;
mod plugin;
mod slack;
mod utils;

use config::ValidatedSettings;
use content::ContentResolver;
use network::Network;
use pipeline::Pipeline;
use plugin::{Plugin, PluginError};
use slack::SlackClient;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = cli::Cli::parse().into_settings();
    utils::logging::init_tracing(&settings.logging.level, settings.logging.format);

    let pipeline = Pipeline::from_env();
    info!(
        repo = %format!("{}/{}", pipeline.repo.owner, pipeline.repo.name),
        build = pipeline.build.number,
        status = %pipeline.build.status,
        "slack blame plugin starting"
    );

    let network = Network::new(&settings.network).context("failed to build http client")?;
    let max_attempts = settings.network.max_attempts;

    let resolver = ContentResolver::new(network.clone());
    let settings = ValidatedSettings::validate(settings, &resolver)
        .await
        .map_err(PluginError::from)?;

    let token = SecretString::from(settings.token.expose_secret().to_string());
    let platform = Arc::new(SlackClient::new(network.clone(), token, max_attempts));
    let plugin = Plugin::new(settings, pipeline, platform, network);

    let mut rng = StdRng::from_entropy();
    tokio::select! {
        result = plugin.execute(&mut rng) => {
            let report = result.context("exec failed")?;
            info!(
                user = report.user.as_deref().unwrap_or("-"),
                direct = ?report.direct,
                channel = ?report.channel,
                "slack blame plugin finished"
            );
        }
        _ = shutdown_signal() => {
            warn!("run cancelled, notifications not delivered");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
