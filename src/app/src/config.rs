use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use xf_connection::ConnectionConfig;
use xf_types::{ChannelDescriptor, ChannelKind, Credentials, Error, Exchange, MarketRef, Result};

/// A channel as configured, before its market has been resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelSpec {
    pub exchange: Exchange,
    pub kind: ChannelKind,
    pub ui_id: String,
    pub timeframe: Option<String>,
}

impl ChannelSpec {
    pub fn descriptor(&self, market: MarketRef) -> ChannelDescriptor {
        ChannelDescriptor::new(self.kind, market, self.timeframe.clone())
    }
}

/// `exchange:kind:UI/SYMBOL[:timeframe]`
impl FromStr for ChannelSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        let (exchange, kind, ui_id, timeframe) = match parts.as_slice() {
            [exchange, kind, ui_id] => (exchange, kind, ui_id, None),
            [exchange, kind, ui_id, timeframe] => (exchange, kind, ui_id, Some(timeframe)),
            _ => return Err(Error::Config(format!("invalid channel: {s}"))),
        };
        Ok(ChannelSpec {
            exchange: exchange.parse()?,
            kind: kind.parse()?,
            ui_id: ui_id.to_string(),
            timeframe: timeframe.map(|t| t.to_string()),
        })
    }
}

#[derive(Debug)]
pub struct AppConfig {
    pub exchanges: Vec<Exchange>,
    pub channels: Vec<ChannelSpec>,
    pub connection: ConnectionConfig,
    pub bitfinex_credentials: Option<Credentials>,
}

impl AppConfig {
    pub fn from_env() -> Result<AppConfig> {
        AppConfig::from_vars(std::env::vars().collect())
    }

    pub fn from_vars(vars: HashMap<String, String>) -> Result<AppConfig> {
        let var = |name: &str| vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());
        let millis = |name: &str, default: Duration| -> Result<Duration> {
            match var(name).map(|v| (v, v.parse::<u64>())) {
                Some((_, Ok(0))) => Err(Error::Config(format!("{name} must be positive"))),
                Some((_, Ok(millis))) => Ok(Duration::from_millis(millis)),
                Some((v, Err(_))) => Err(Error::Config(format!(
                    "{name} is not a number of milliseconds: {v}"
                ))),
                None => Ok(default),
            }
        };

        let exchanges = match var("XF_EXCHANGES") {
            Some(list) => list
                .split(',')
                .map(Exchange::from_str)
                .collect::<Result<Vec<_>>>()?,
            None => vec![Exchange::Bitfinex, Exchange::Kraken],
        };
        let channels = match var("XF_CHANNELS") {
            Some(list) => list
                .split(',')
                .map(ChannelSpec::from_str)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let defaults = ConnectionConfig::default();
        let connection = ConnectionConfig {
            book_throttle: millis("XF_BOOK_THROTTLE_MS", defaults.book_throttle)?,
            poll_interval: millis("XF_POLL_INTERVAL_MS", defaults.poll_interval)?,
            rest_only: match var("XF_REST_ONLY") {
                Some(v) => v
                    .parse()
                    .map_err(|_| Error::Config(format!("XF_REST_ONLY is not a bool: {v}")))?,
                None => defaults.rest_only,
            },
        };

        let bitfinex_credentials = match (
            var("XF_BITFINEX_API_KEY"),
            var("XF_BITFINEX_API_SECRET"),
        ) {
            (Some(api_key), Some(api_secret)) => Some(Credentials {
                api_key: api_key.to_string(),
                api_secret: api_secret.to_string(),
            }),
            (None, None) => None,
            _ => {
                return Err(Error::Config(
                    "XF_BITFINEX_API_KEY and XF_BITFINEX_API_SECRET must be set together"
                        .to_string(),
                ))
            }
        };

        Ok(AppConfig {
            exchanges,
            channels,
            connection,
            bitfinex_credentials,
        })
    }
}
