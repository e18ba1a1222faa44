use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

mod channel;
mod error;
pub mod fields;
mod order;
mod payload;

pub use channel::{ChannelDescriptor, ChannelId, ChannelKey, ChannelKind, MarketRef};
pub use error::{Error, Result};
pub use order::{NewOrder, OrderOp, HIDDEN, OCO, POST_ONLY, REDUCE_ONLY};
pub use payload::{BookLevel, Candle, Order, Payload, Ticker, Trade};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Bitfinex,
    Kraken,
}

impl Exchange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Bitfinex => "bitfinex",
            Exchange::Kraken => "kraken",
        }
    }
}

impl Display for Exchange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Exchange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bitfinex" => Ok(Exchange::Bitfinex),
            "kraken" => Ok(Exchange::Kraken),
            other => Err(Error::Config(format!("unknown exchange: {other}"))),
        }
    }
}

/// Receives every classified message of a connection, in registration order.
pub type DataListener = Box<dyn Fn(&ChannelId, &Payload) + Send + 'static>;

#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct OpenOptions {
    pub auto_reconnect: bool,
    pub reconnect_delay: Duration,
    pub credentials: Option<Credentials>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            auto_reconnect: true,
            reconnect_delay: Duration::from_secs(5),
            credentials: None,
        }
    }
}

/// The capability set every exchange connection exposes, whatever its wire protocol.
#[async_trait]
pub trait ExchangeConnection: Send + Sync {
    fn exchange(&self) -> Exchange;

    /// Starts the transport. Returns immediately, the socket connects in the background.
    fn open_ws(&self, options: OpenOptions) -> Result<()>;

    /// Resolves with the transport channel id once the exchange acknowledges the
    /// subscription. Subscribing to a key that is already subscribed or pending never
    /// issues a second request.
    async fn subscribe(&self, descriptor: ChannelDescriptor) -> Result<ChannelId>;

    async fn unsubscribe(&self, descriptor: ChannelDescriptor) -> Result<ChannelId>;

    fn on_data(&self, listener: DataListener) -> Result<()>;

    fn close(&self) -> Result<()>;

    fn reconnect(&self) -> Result<()>;

    async fn get_markets(&self) -> Result<Vec<MarketRef>>;

    async fn submit_order(&self, order: NewOrder) -> Result<()>;

    async fn cancel_order(&self, id: String) -> Result<()>;

    async fn submit_order_multi_op(&self, ops: Vec<OrderOp>) -> Result<()>;
}

/// Typed public REST calls, used for market lists and by the poller.
#[async_trait]
pub trait MarketDataRest: Send + Sync {
    async fn markets(&self) -> Result<Vec<MarketRef>>;

    async fn ticker(&self, market: &MarketRef) -> Result<Ticker>;

    async fn trades(&self, market: &MarketRef) -> Result<Vec<Trade>>;

    async fn candles(&self, market: &MarketRef, timeframe: &str) -> Result<Vec<Candle>>;

    async fn book(&self, market: &MarketRef) -> Result<Vec<BookLevel>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("bitfinex", Exchange::Bitfinex)]
    #[test_case("Kraken", Exchange::Kraken)]
    #[test_case(" KRAKEN ", Exchange::Kraken)]
    fn parse_exchange(s: &str, expected: Exchange) {
        assert_eq!(Exchange::from_str(s).unwrap(), expected);
    }

    #[test]
    fn unknown_exchange_is_a_config_error() {
        assert!(matches!(Exchange::from_str("lbank"), Err(Error::Config(_))));
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let credentials = Credentials {
            api_key: "key".to_string(),
            api_secret: "very-secret".to_string(),
        };
        let printed = format!("{credentials:?}");
        assert!(printed.contains("key"));
        assert!(!printed.contains("very-secret"));
    }
}
