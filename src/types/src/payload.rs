use crate::ChannelKind;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub bid: Decimal,
    pub ask: Decimal,
    pub daily_change: Decimal,
    pub daily_change_perc: Decimal,
    pub last_price: Decimal,
    pub volume: Decimal,
    pub high: Decimal,
    pub low: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: Option<u64>,
    pub price: Decimal,
    /// Negative for sells.
    pub amount: Decimal,
    /// Milliseconds since the epoch. Fractional because Kraken reports sub-millisecond times.
    pub mts: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub mts: u64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// One price level. Positive `amount` is a bid, negative an ask, `count == 0` a removal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub count: u32,
    pub amount: Decimal,
}

impl BookLevel {
    pub fn new(price: Decimal, count: u32, amount: Decimal) -> BookLevel {
        BookLevel {
            price,
            count,
            amount,
        }
    }

    pub fn is_bid(&self) -> bool {
        self.amount.is_sign_positive()
    }

    pub fn is_removal(&self) -> bool {
        self.count == 0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: u64,
    pub gid: Option<u64>,
    pub cid: u64,
    pub symbol: String,
    pub mts_create: u64,
    pub mts_update: u64,
    pub amount: Decimal,
    pub amount_orig: Decimal,
    #[serde(rename = "type")]
    pub order_type: String,
    pub flags: u64,
    pub hidden: bool,
    #[serde(rename = "postonly")]
    pub post_only: bool,
    pub oco: bool,
    #[serde(rename = "reduceonly")]
    pub reduce_only: bool,
    pub visible_on_hit: bool,
    pub price: Decimal,
    pub price_avg: Option<Decimal>,
    pub price_trailing: Option<Decimal>,
    pub price_aux_limit: Option<Decimal>,
    pub status: String,
    pub lev: Option<u32>,
}

/// The normalized shape every downstream consumer receives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Payload {
    Ticker(Ticker),
    Trades(Vec<Trade>),
    Candles(Vec<Candle>),
    Book(Vec<BookLevel>),
    Order(Order),
}

impl Payload {
    pub fn kind(&self) -> Option<ChannelKind> {
        match self {
            Payload::Ticker(_) => Some(ChannelKind::Ticker),
            Payload::Trades(_) => Some(ChannelKind::Trades),
            Payload::Candles(_) => Some(ChannelKind::Candles),
            Payload::Book(_) => Some(ChannelKind::Book),
            Payload::Order(_) => None,
        }
    }
}
