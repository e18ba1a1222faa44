use crate::protocol::BOOK_DEPTH;
use crate::transform::{self, interval, CandleLayout};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::trace;
use xf_types::{
    BookLevel, Candle, Error, Exchange, MarketDataRest, MarketRef, Result, Ticker, Trade,
};

const BASE_URL: &str = "https://api.kraken.com/0/public";

#[derive(Default)]
pub struct KrakenClient {
    client: Client,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    error: Vec<String>,
    result: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct AssetPair {
    wsname: Option<String>,
}

impl KrakenClient {
    pub fn new() -> KrakenClient {
        KrakenClient::default()
    }

    async fn get(&self, path: &str) -> Result<Map<String, Value>> {
        let url = format!("{BASE_URL}/{path}");
        trace!("Kraken: GET {url}");

        let content = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Rest(format!("{url}: {e}")))?
            .text()
            .await
            .map_err(|e| Error::Rest(format!("{url}: {e}")))?;

        unwrap_result(&content).map_err(|e| match e {
            Error::Rest(reason) => Error::Rest(format!("{url}: {reason}")),
            other => other,
        })
    }

    /// Results are keyed by the pair, next to bookkeeping fields such as `last`.
    async fn get_pair(&self, path: &str, market: &MarketRef) -> Result<Value> {
        let mut result = self.get(path).await?;
        result
            .remove(&market.rest_id)
            .or_else(|| {
                let key = result.keys().find(|k| k.as_str() != "last")?.clone();
                result.remove(&key)
            })
            .ok_or_else(|| Error::Rest(format!("no data for {}", market.rest_id)))
    }
}

fn unwrap_result(content: &str) -> Result<Map<String, Value>> {
    let response: Response = serde_json::from_str(content)?;
    if !response.error.is_empty() {
        return Err(Error::Rest(response.error.join(", ")));
    }
    response
        .result
        .ok_or_else(|| Error::Rest("response without result".to_string()))
}

/// Kraken's legacy asset codes, shown by their common names.
fn common_name(asset: &str) -> &str {
    match asset {
        "XBT" => "BTC",
        "XDG" => "DOGE",
        other => other,
    }
}

pub(crate) fn market(rest_id: &str, pair: AssetPair) -> Option<MarketRef> {
    let wsname = pair.wsname?;
    let (base, quote) = wsname.split_once('/')?;
    let (base, quote) = (common_name(base).to_string(), common_name(quote).to_string());
    Some(MarketRef {
        exchange: Exchange::Kraken,
        ui_id: format!("{base}/{quote}"),
        rest_id: rest_id.to_string(),
        base,
        quote,
        ws_id: wsname,
    })
}

fn rows(value: &Value) -> Result<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| Error::MalformedMessage(format!("expected rows: {value}")))
}

#[async_trait]
impl MarketDataRest for KrakenClient {
    async fn markets(&self) -> Result<Vec<MarketRef>> {
        let result = self.get("AssetPairs").await?;
        let mut markets = Vec::new();
        for (rest_id, value) in result {
            let pair: AssetPair = serde_json::from_value(value)?;
            if let Some(market) = market(&rest_id, pair) {
                markets.push(market);
            }
        }
        Ok(markets)
    }

    async fn ticker(&self, market: &MarketRef) -> Result<Ticker> {
        let value = self
            .get_pair(&format!("Ticker?pair={}", market.rest_id), market)
            .await?;
        transform::ticker(&value)
    }

    async fn trades(&self, market: &MarketRef) -> Result<Vec<Trade>> {
        let value = self
            .get_pair(&format!("Trades?pair={}", market.rest_id), market)
            .await?;
        rows(&value)?.iter().map(transform::trade).collect()
    }

    async fn candles(&self, market: &MarketRef, timeframe: &str) -> Result<Vec<Candle>> {
        let minutes = interval(timeframe).ok_or_else(|| {
            Error::UnknownChannelType(format!("candles timeframe {timeframe} on kraken"))
        })?;
        let value = self
            .get_pair(
                &format!("OHLC?pair={}&interval={minutes}", market.rest_id),
                market,
            )
            .await?;
        rows(&value)?
            .iter()
            .map(|row| transform::candle(row, CandleLayout::Rest))
            .collect()
    }

    async fn book(&self, market: &MarketRef) -> Result<Vec<BookLevel>> {
        let value = self
            .get_pair(
                &format!("Depth?pair={}&count={BOOK_DEPTH}", market.rest_id),
                market,
            )
            .await?;
        transform::depth(&value)
    }
}
