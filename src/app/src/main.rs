use crate::config::{AppConfig, ChannelSpec};
use std::collections::HashMap;
use std::io;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use xf_subscriber::{Subscriber, SubscriptionManager};
use xf_types::{ChannelDescriptor, Exchange, MarketRef, OpenOptions};

mod config;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt().with_writer(io::stdout).init();

    info!("Service started");

    abort_on_panic();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            error!("Invalid configuration: {error}");
            return;
        }
    };

    let shutdown = CancellationToken::new();
    let mut subscriber = Subscriber::new(config.exchanges.clone(), config.connection.clone());
    if let Some(credentials) = config.bitfinex_credentials.clone() {
        subscriber = subscriber.with_options(
            Exchange::Bitfinex,
            OpenOptions {
                credentials: Some(credentials),
                ..OpenOptions::default()
            },
        );
    }

    let manager = match subscriber.run(shutdown.clone()) {
        Ok(manager) => manager,
        Err(error) => {
            error!("Failed to start: {error}");
            return;
        }
    };

    tokio::spawn(log_updates(&manager, shutdown.clone()));

    let descriptors = resolve_channels(&manager, &config.channels).await;
    for (descriptor, result) in manager.subscribe_all(descriptors).await {
        match result {
            Ok(id) => info!("Subscribed to {} as {id}", descriptor.key()),
            Err(error) => warn!("Failed to subscribe to {}: {error}", descriptor.key()),
        }
    }

    if let Err(error) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for shutdown signal: {error}");
    }

    info!("Service stopping");
    manager.close();
    shutdown.cancel();
    info!("Service stopped");
}

/// Maps each configured UI symbol onto the market its exchange lists.
async fn resolve_channels(
    manager: &SubscriptionManager,
    channels: &[ChannelSpec],
) -> Vec<ChannelDescriptor> {
    let mut markets: HashMap<Exchange, Vec<MarketRef>> = HashMap::new();
    let mut descriptors = Vec::new();

    for spec in channels {
        let Some(connection) = manager.connection(spec.exchange) else {
            warn!("{}: Not enabled, skipping {}", spec.exchange, spec.ui_id);
            continue;
        };
        if !markets.contains_key(&spec.exchange) {
            match connection.get_markets().await {
                Ok(list) => {
                    info!("{}: {} markets", spec.exchange, list.len());
                    markets.insert(spec.exchange, list);
                }
                Err(error) => {
                    error!("{}: Failed to get markets: {error}", spec.exchange);
                    continue;
                }
            }
        }
        let market = markets
            .get(&spec.exchange)
            .and_then(|list| list.iter().find(|m| m.ui_id == spec.ui_id));
        match market {
            Some(market) => descriptors.push(spec.descriptor(market.clone())),
            None => warn!("{}: Unknown market {}", spec.exchange, spec.ui_id),
        }
    }
    descriptors
}

fn log_updates(
    manager: &SubscriptionManager,
    shutdown: CancellationToken,
) -> impl std::future::Future<Output = ()> + Send + 'static {
    let mut updates = manager.subscribe_updates();
    async move {
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Ok(update) => match serde_json::to_string(update.as_ref()) {
                        Ok(json) => info!("{json}"),
                        Err(error) => error!("Failed to serialize update: {error}"),
                    },
                    Err(RecvError::Lagged(count)) => warn!("Dropped {count} updates"),
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown.cancelled() => break,
            }
        }
    }
}

pub fn abort_on_panic() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        std::process::abort();
    }));
}
