//! Bot runtime: validate config, resolve identity, then run the transport and dispatcher until
//! the process is asked to stop.

use crate::channels::slack::{SlackApiClient, SocketModeTransport};
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::identity::{resolve_identity, Identity};
use crate::publish::PostGateway;
use crate::twitter::TwitterClient;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

struct Clients {
    slack: SlackApiClient,
    twitter: TwitterClient,
}

fn build_clients(config: &Config) -> Result<Clients> {
    let creds = config.credentials()?;
    let timeout = config.request_timeout();
    let slack = SlackApiClient::new(config.slack_api_url(), &creds.slack, timeout)?;
    let twitter = TwitterClient::new(config.twitter_api_url(), &creds.twitter, timeout)
        .context("failed to create twitter client")?;
    Ok(Clients { slack, twitter })
}

/// Validate the config and resolve the bot's identity on both services, without connecting
/// the event stream.
pub async fn check(config: &Config) -> Result<Identity> {
    let clients = build_clients(config)?;
    resolve_identity(&clients.slack, &clients.twitter).await
}

/// Run the bot until SIGINT/SIGTERM. Startup failures (config, identity) are returned;
/// after startup, errors are handled per event and per connection.
pub async fn run_bot(config: Config) -> Result<()> {
    let clients = build_clients(&config)?;
    let identity = resolve_identity(&clients.slack, &clients.twitter).await?;

    let twitter = Arc::new(clients.twitter);
    let gateway = PostGateway::new(
        twitter,
        identity.public_handle.clone(),
        config.twitter_web_url(),
    );
    let (transport, acker) =
        SocketModeTransport::new(clients.slack.clone(), config.reconnect_delay());
    let dispatcher = Dispatcher::new(
        identity,
        gateway,
        Arc::new(acker),
        Arc::new(clients.slack),
    );

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let transport_task = tokio::spawn(transport.run(event_tx));

    tokio::select! {
        _ = dispatcher.run(event_rx) => {
            log::warn!("event stream ended");
        }
        _ = shutdown_signal() => {
            log::info!("shutdown requested");
        }
    }

    transport_task.abort();
    log::info!("poast stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
