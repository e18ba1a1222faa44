use crate::session::Event;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use xf_types::{
    BookLevel, Candle, ChannelDescriptor, ChannelId, ChannelKind, MarketDataRest, Result, Ticker,
    Trade,
};

/// One REST fetch, already normalized.
#[derive(Debug)]
pub enum PollData {
    Ticker(Ticker),
    Trades(Vec<Trade>),
    Candles(Vec<Candle>),
    Book(Vec<BookLevel>),
}

pub(crate) async fn fetch(
    rest: &dyn MarketDataRest,
    descriptor: &ChannelDescriptor,
) -> Result<PollData> {
    let market = descriptor.market();
    match descriptor.kind() {
        ChannelKind::Ticker => rest.ticker(market).await.map(PollData::Ticker),
        ChannelKind::Trades => rest.trades(market).await.map(PollData::Trades),
        ChannelKind::Candles => {
            let timeframe = descriptor.required_timeframe()?;
            rest.candles(market, timeframe).await.map(PollData::Candles)
        }
        ChannelKind::Book => rest.book(market).await.map(PollData::Book),
    }
}

/// Polls one channel until `cancellation_token` fires. Results go back through the
/// connection's event queue so the session stays the only writer of its state.
pub(crate) fn spawn(
    id: ChannelId,
    descriptor: ChannelDescriptor,
    rest: Arc<dyn MarketDataRest>,
    interval: Duration,
    events: UnboundedSender<Event>,
    cancellation_token: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let in_flight = Arc::new(AtomicBool::new(false));

        loop {
            select! {
                _ = ticker.tick() => {
                    if in_flight.swap(true, Ordering::AcqRel) {
                        debug!("Poller {id}: previous fetch still running, skipping tick");
                        continue;
                    }
                    trace!("Poller {id}: fetching {}", descriptor.key());

                    let id = id.clone();
                    let descriptor = descriptor.clone();
                    let rest = rest.clone();
                    let events = events.clone();
                    let in_flight = in_flight.clone();
                    let cancellation_token = cancellation_token.clone();
                    tokio::spawn(async move {
                        select! {
                            result = fetch(rest.as_ref(), &descriptor) => {
                                let _ = events.send(Event::Poll(id, result));
                            }
                            _ = cancellation_token.cancelled() => (),
                        }
                        in_flight.store(false, Ordering::Release);
                    });
                }
                _ = cancellation_token.cancelled() => break,
            }
        }

        debug!("Poller {id} stopped");
    });
}
