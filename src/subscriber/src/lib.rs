use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{channel, Receiver};
use tokio_util::sync::CancellationToken;
use tracing::info;
use xf_connection::ConnectionConfig;
use xf_types::{
    ChannelDescriptor, ChannelId, Error, Exchange, ExchangeConnection, OpenOptions, Payload,
    Result,
};

/// One classified message, tagged with where it came from.
#[derive(Clone, Debug, Serialize)]
pub struct FeedUpdate {
    pub exchange: Exchange,
    pub channel: ChannelId,
    pub payload: Payload,
}

pub struct Subscriber {
    exchanges: Vec<Exchange>,
    config: ConnectionConfig,
    options: HashMap<Exchange, OpenOptions>,
}

pub struct SubscriptionManager {
    connections: HashMap<Exchange, Arc<dyn ExchangeConnection>>,
    updates: Receiver<Arc<FeedUpdate>>,
}

impl Subscriber {
    pub fn new(exchanges: Vec<Exchange>, config: ConnectionConfig) -> Subscriber {
        Subscriber {
            exchanges,
            config,
            options: HashMap::new(),
        }
    }

    pub fn with_options(mut self, exchange: Exchange, options: OpenOptions) -> Subscriber {
        self.options.insert(exchange, options);
        self
    }

    /// Starts one connection per exchange and opens its socket.
    pub fn run(mut self, cancellation_token: CancellationToken) -> Result<SubscriptionManager> {
        let mut connections: Vec<Arc<dyn ExchangeConnection>> = Vec::new();
        for exchange in self.exchanges {
            let connection: Arc<dyn ExchangeConnection> = match exchange {
                Exchange::Bitfinex => Arc::new(xf_exchanges_bitfinex::connection(
                    self.config.clone(),
                    cancellation_token.clone(),
                )),
                Exchange::Kraken => Arc::new(xf_exchanges_kraken::connection(
                    self.config.clone(),
                    cancellation_token.clone(),
                )),
            };
            connections.push(connection);
        }

        let manager = SubscriptionManager::new(connections)?;
        for (exchange, connection) in manager.connections.iter() {
            let options = self.options.remove(exchange).unwrap_or_default();
            connection.open_ws(options)?;
            info!("{exchange}: Started");
        }
        Ok(manager)
    }
}

impl SubscriptionManager {
    /// Forwards every message of `connections` into one broadcast channel.
    pub fn new(connections: Vec<Arc<dyn ExchangeConnection>>) -> Result<SubscriptionManager> {
        let (sender, updates) = channel(1024);
        let mut by_exchange = HashMap::new();

        for connection in connections {
            let exchange = connection.exchange();
            let sender = sender.clone();
            connection.on_data(Box::new(move |channel: &ChannelId, payload: &Payload| {
                // no receivers is fine, updates are simply dropped
                let _ = sender.send(Arc::new(FeedUpdate {
                    exchange,
                    channel: channel.clone(),
                    payload: payload.clone(),
                }));
            }))?;
            by_exchange.insert(exchange, connection);
        }

        Ok(SubscriptionManager {
            connections: by_exchange,
            updates,
        })
    }

    pub fn connection(&self, exchange: Exchange) -> Option<Arc<dyn ExchangeConnection>> {
        self.connections.get(&exchange).cloned()
    }

    pub fn subscribe_updates(&self) -> Receiver<Arc<FeedUpdate>> {
        self.updates.resubscribe()
    }

    /// Subscribes every descriptor on the connection of its market's exchange.
    pub async fn subscribe_all(
        &self,
        descriptors: Vec<ChannelDescriptor>,
    ) -> Vec<(ChannelDescriptor, Result<ChannelId>)> {
        let futures = descriptors.into_iter().map(|descriptor| async move {
            let exchange = descriptor.market().exchange;
            let result = match self.connections.get(&exchange) {
                Some(connection) => connection.subscribe(descriptor.clone()).await,
                None => Err(Error::Config(format!("no connection for {exchange}"))),
            };
            (descriptor, result)
        });
        futures::future::join_all(futures).await
    }

    pub fn close(&self) {
        for (exchange, connection) in self.connections.iter() {
            if let Err(error) = connection.close() {
                info!("{exchange}: Already stopped: {error}");
            }
        }
    }
}
