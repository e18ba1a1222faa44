use crate::{Error, Exchange, Result};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::json;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Ticker,
    Trades,
    Candles,
    Book,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Ticker => "ticker",
            ChannelKind::Trades => "trades",
            ChannelKind::Candles => "candles",
            ChannelKind::Book => "book",
        }
    }
}

impl Display for ChannelKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ticker" => Ok(ChannelKind::Ticker),
            "trades" => Ok(ChannelKind::Trades),
            "candles" => Ok(ChannelKind::Candles),
            "book" => Ok(ChannelKind::Book),
            other => Err(Error::UnknownChannelType(other.to_string())),
        }
    }
}

/// A market as one exchange names it.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRef {
    pub exchange: Exchange,
    /// Display symbol, e.g. `BTC/USD`.
    pub ui_id: String,
    /// Symbol used on the socket, e.g. `tBTCUSD` or `XBT/USD`.
    pub ws_id: String,
    /// Symbol used by the REST API, e.g. `tBTCUSD` or `XXBTZUSD`.
    pub rest_id: String,
    pub base: String,
    pub quote: String,
}

/// A requested data feed. Immutable once built.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChannelDescriptor {
    kind: ChannelKind,
    market: MarketRef,
    timeframe: Option<String>,
}

impl ChannelDescriptor {
    pub fn new(kind: ChannelKind, market: MarketRef, timeframe: Option<String>) -> Self {
        ChannelDescriptor {
            kind,
            market,
            timeframe,
        }
    }

    pub fn ticker(market: MarketRef) -> Self {
        Self::new(ChannelKind::Ticker, market, None)
    }

    pub fn trades(market: MarketRef) -> Self {
        Self::new(ChannelKind::Trades, market, None)
    }

    pub fn book(market: MarketRef) -> Self {
        Self::new(ChannelKind::Book, market, None)
    }

    pub fn candles(market: MarketRef, timeframe: impl Into<String>) -> Self {
        Self::new(ChannelKind::Candles, market, Some(timeframe.into()))
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn market(&self) -> &MarketRef {
        &self.market
    }

    pub fn timeframe(&self) -> Option<&str> {
        self.timeframe.as_deref()
    }

    /// The timeframe of a candles channel, which cannot be subscribed without one.
    pub fn required_timeframe(&self) -> Result<&str> {
        self.timeframe().ok_or_else(|| {
            Error::UnknownChannelType(format!(
                "{} on {} requires a timeframe",
                self.kind, self.market.ws_id
            ))
        })
    }

    pub fn key(&self) -> ChannelKey {
        ChannelKey::new(
            self.market.exchange,
            self.kind,
            &self.market.ws_id,
            self.timeframe(),
        )
    }
}

/// Deduplication identity of a [`ChannelDescriptor`]. Not a transport channel id.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ChannelKey(String);

impl ChannelKey {
    /// Only candles keys carry the timeframe. The key is encoded as a JSON array so
    /// that no symbol content can make two different tuples collide.
    pub fn new(
        exchange: Exchange,
        kind: ChannelKind,
        ws_id: &str,
        timeframe: Option<&str>,
    ) -> ChannelKey {
        let timeframe = match kind {
            ChannelKind::Candles => timeframe,
            _ => None,
        };
        ChannelKey(json!([kind.as_str(), exchange.as_str(), ws_id, timeframe]).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChannelKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Exchange-assigned (or synthetic) id of a live subscription, valid for one
/// connection lifetime.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ChannelId {
    Numeric(u64),
    Named(String),
    Poll(u64),
}

impl ChannelId {
    pub fn is_poll(&self) -> bool {
        matches!(self, ChannelId::Poll(_))
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelId::Numeric(id) => write!(f, "{id}"),
            ChannelId::Named(name) => f.write_str(name),
            ChannelId::Poll(id) => write!(f, "poll-{id}"),
        }
    }
}

impl Serialize for ChannelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn market(exchange: Exchange, ws_id: &str) -> MarketRef {
        MarketRef {
            exchange,
            ui_id: "BTC/USD".to_string(),
            ws_id: ws_id.to_string(),
            rest_id: ws_id.to_string(),
            base: "BTC".to_string(),
            quote: "USD".to_string(),
        }
    }

    #[test]
    fn equal_descriptors_share_a_key() {
        let a = ChannelDescriptor::candles(market(Exchange::Bitfinex, "tBTCUSD"), "1m");
        let b = ChannelDescriptor::candles(market(Exchange::Bitfinex, "tBTCUSD"), "1m".to_string());
        assert_eq!(a.key(), b.key());
    }

    #[test_case(ChannelKind::Ticker, ChannelKind::Trades)]
    #[test_case(ChannelKind::Trades, ChannelKind::Book)]
    #[test_case(ChannelKind::Book, ChannelKind::Ticker)]
    fn kind_changes_key(a: ChannelKind, b: ChannelKind) {
        let m = market(Exchange::Kraken, "XBT/USD");
        assert_ne!(
            ChannelDescriptor::new(a, m.clone(), None).key(),
            ChannelDescriptor::new(b, m, None).key()
        );
    }

    #[test]
    fn market_changes_key() {
        let a = ChannelDescriptor::trades(market(Exchange::Bitfinex, "tBTCUSD"));
        let b = ChannelDescriptor::trades(market(Exchange::Bitfinex, "tETHUSD"));
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn exchange_changes_key() {
        let a = ChannelDescriptor::trades(market(Exchange::Bitfinex, "BTCUSD"));
        let b = ChannelDescriptor::trades(market(Exchange::Kraken, "BTCUSD"));
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn timeframe_changes_candles_key() {
        let m = market(Exchange::Bitfinex, "tBTCUSD");
        assert_ne!(
            ChannelDescriptor::candles(m.clone(), "1m").key(),
            ChannelDescriptor::candles(m, "5m").key()
        );
    }

    #[test]
    fn timeframe_is_ignored_outside_candles() {
        let m = market(Exchange::Bitfinex, "tBTCUSD");
        assert_eq!(
            ChannelDescriptor::new(ChannelKind::Trades, m.clone(), Some("1m".to_string())).key(),
            ChannelDescriptor::trades(m).key()
        );
    }

    #[test]
    fn separator_characters_in_symbols_do_not_collide() {
        let a = ChannelDescriptor::candles(market(Exchange::Bitfinex, "tTEST:USD"), "1m");
        let b = ChannelDescriptor::candles(market(Exchange::Bitfinex, "tTEST"), "USD:1m");
        assert_ne!(a.key(), b.key());
    }

    #[test_case("ticker", ChannelKind::Ticker)]
    #[test_case("trades", ChannelKind::Trades)]
    #[test_case("candles", ChannelKind::Candles)]
    #[test_case("book", ChannelKind::Book)]
    fn parse_kind(s: &str, expected: ChannelKind) {
        assert_eq!(ChannelKind::from_str(s).unwrap(), expected);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(matches!(
            ChannelKind::from_str("funding"),
            Err(Error::UnknownChannelType(kind)) if kind == "funding"
        ));
    }

    #[test]
    fn candles_without_timeframe_fail_when_required() {
        let d = ChannelDescriptor::new(
            ChannelKind::Candles,
            market(Exchange::Kraken, "XBT/USD"),
            None,
        );
        assert!(matches!(d.required_timeframe(), Err(Error::UnknownChannelType(_))));
    }

    #[test_case(ChannelId::Numeric(17), "17")]
    #[test_case(ChannelId::Named("ohlc-1|XBT/USD".to_string()), "ohlc-1|XBT/USD")]
    #[test_case(ChannelId::Poll(3), "poll-3")]
    fn channel_id_display(id: ChannelId, expected: &str) {
        assert_eq!(id.to_string(), expected);
    }
}
