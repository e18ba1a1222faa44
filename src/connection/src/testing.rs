//! In-memory stand-ins for the socket and the REST client, used by the session
//! tests here and in the exchange crates.

use crate::socket::Socket;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use xf_types::{BookLevel, Candle, Exchange, MarketDataRest, MarketRef, Result, Ticker, Trade};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records every packet instead of sending it.
#[derive(Clone, Default)]
pub struct RecordingSocket {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl RecordingSocket {
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Socket for RecordingSocket {
    fn send(&self, text: String) -> Result<()> {
        lock(&self.sent).push(text);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Serves whatever was last stored. Ticker requests get an all-zero ticker.
#[derive(Default)]
pub struct StubRest {
    markets: Mutex<Vec<MarketRef>>,
    trades: Mutex<Vec<Trade>>,
    candles: Mutex<Vec<Candle>>,
    book: Mutex<Vec<BookLevel>>,
}

impl StubRest {
    pub fn set_markets(&self, markets: Vec<MarketRef>) {
        *lock(&self.markets) = markets;
    }

    pub fn set_trades(&self, trades: Vec<Trade>) {
        *lock(&self.trades) = trades;
    }

    pub fn set_candles(&self, candles: Vec<Candle>) {
        *lock(&self.candles) = candles;
    }

    pub fn set_book(&self, book: Vec<BookLevel>) {
        *lock(&self.book) = book;
    }
}

#[async_trait]
impl MarketDataRest for StubRest {
    async fn markets(&self) -> Result<Vec<MarketRef>> {
        Ok(lock(&self.markets).clone())
    }

    async fn ticker(&self, _market: &MarketRef) -> Result<Ticker> {
        Ok(Ticker {
            bid: Decimal::ZERO,
            ask: Decimal::ZERO,
            daily_change: Decimal::ZERO,
            daily_change_perc: Decimal::ZERO,
            last_price: Decimal::ZERO,
            volume: Decimal::ZERO,
            high: Decimal::ZERO,
            low: Decimal::ZERO,
        })
    }

    async fn trades(&self, _market: &MarketRef) -> Result<Vec<Trade>> {
        Ok(lock(&self.trades).clone())
    }

    async fn candles(&self, _market: &MarketRef, _timeframe: &str) -> Result<Vec<Candle>> {
        Ok(lock(&self.candles).clone())
    }

    async fn book(&self, _market: &MarketRef) -> Result<Vec<BookLevel>> {
        Ok(lock(&self.book).clone())
    }
}

/// A BTC/USD market whose socket and REST symbols are both `ws_id`.
pub fn market(exchange: Exchange, ws_id: &str) -> MarketRef {
    MarketRef {
        exchange,
        ui_id: "BTC/USD".to_string(),
        ws_id: ws_id.to_string(),
        rest_id: ws_id.to_string(),
        base: "BTC".to_string(),
        quote: "USD".to_string(),
    }
}
