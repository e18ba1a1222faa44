use crate::protocol::BOOK_LEN;
use crate::transform;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::trace;
use xf_types::{
    BookLevel, Candle, Error, Exchange, MarketDataRest, MarketRef, Result, Ticker, Trade,
};

const BASE_URL: &str = "https://api-pub.bitfinex.com/v2";

#[derive(Default)]
pub struct BitfinexClient {
    client: Client,
}

impl BitfinexClient {
    pub fn new() -> BitfinexClient {
        BitfinexClient::default()
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{BASE_URL}/{path}");
        trace!("Bitfinex: GET {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Rest(format!("{url}: {e}")))?;
        let status = response.status();
        let content = response
            .text()
            .await
            .map_err(|e| Error::Rest(format!("{url}: {e}")))?;

        if !status.is_success() {
            return Err(Error::Rest(format!("{url}: {status} {content}")));
        }
        let value: Value = serde_json::from_str(&content)?;
        if value.get(0).and_then(Value::as_str) == Some("error") {
            return Err(Error::Rest(format!("{url}: {content}")));
        }
        Ok(value)
    }
}

/// Splits a trading pair such as `BTCUSD` or `TESTBTC:TESTUSD`.
pub(crate) fn market(pair: &str) -> Option<MarketRef> {
    let (base, quote) = match pair.split_once(':') {
        Some(split) => split,
        None if pair.len() == 6 && pair.is_ascii() => pair.split_at(3),
        None => return None,
    };
    let symbol = format!("t{pair}");
    Some(MarketRef {
        exchange: Exchange::Bitfinex,
        ui_id: format!("{base}/{quote}"),
        ws_id: symbol.clone(),
        rest_id: symbol,
        base: base.to_string(),
        quote: quote.to_string(),
    })
}

#[async_trait]
impl MarketDataRest for BitfinexClient {
    async fn markets(&self) -> Result<Vec<MarketRef>> {
        let value = self.get("conf/pub:list:pair:exchange").await?;
        let pairs = value
            .get(0)
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Rest(format!("unexpected pair list: {value}")))?;
        Ok(pairs.iter().filter_map(Value::as_str).filter_map(market).collect())
    }

    async fn ticker(&self, market: &MarketRef) -> Result<Ticker> {
        let value = self.get(&format!("ticker/{}", market.rest_id)).await?;
        transform::ticker(&value)
    }

    async fn trades(&self, market: &MarketRef) -> Result<Vec<Trade>> {
        let value = self
            .get(&format!("trades/{}/hist?limit=120", market.rest_id))
            .await?;
        transform::rows(&value, transform::trade)
    }

    async fn candles(&self, market: &MarketRef, timeframe: &str) -> Result<Vec<Candle>> {
        let value = self
            .get(&format!(
                "candles/trade:{timeframe}:{}/hist?limit=10",
                market.rest_id
            ))
            .await?;
        transform::rows(&value, transform::candle)
    }

    async fn book(&self, market: &MarketRef) -> Result<Vec<BookLevel>> {
        let value = self
            .get(&format!("book/{}/P0?len={BOOK_LEN}", market.rest_id))
            .await?;
        transform::rows(&value, transform::book_level)
    }
}
