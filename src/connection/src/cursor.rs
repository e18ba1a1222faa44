use rust_decimal::Decimal;
use xf_types::{Candle, Trade};

/// Remembers the newest trade a poll channel has emitted.
#[derive(Debug, Default)]
pub struct TradeCursor {
    last: Decimal,
}

impl TradeCursor {
    pub fn last(&self) -> Decimal {
        self.last
    }

    /// Returns the trades newer than the cursor, oldest first, and moves the cursor
    /// to the newest of them.
    ///
    /// Trades sharing a timestamp are spread apart by 0.001 ms so that both survive
    /// the strict comparison. This keeps them distinct, it does not recover their
    /// true order.
    pub fn advance(&mut self, mut trades: Vec<Trade>) -> Vec<Trade> {
        let nudge = Decimal::new(1, 3);
        trades.sort_by(|a, b| a.mts.cmp(&b.mts));

        let mut previous: Option<Decimal> = None;
        for trade in trades.iter_mut() {
            if let Some(previous) = previous {
                if trade.mts <= previous {
                    trade.mts = previous + nudge;
                }
            }
            previous = Some(trade.mts);
        }

        let fresh: Vec<Trade> = trades.into_iter().filter(|t| t.mts > self.last).collect();
        if let Some(newest) = fresh.last() {
            self.last = newest.mts;
        }
        fresh
    }
}

/// The last closed bar followed by the bar in progress.
pub fn recent_candles(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.sort_by_key(|c| c.mts);
    let skip = candles.len().saturating_sub(2);
    candles.split_off(skip)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(mts: i64) -> Trade {
        Trade {
            id: None,
            price: Decimal::from(100),
            amount: Decimal::ONE,
            mts: Decimal::from(mts),
        }
    }

    fn candle(mts: u64) -> Candle {
        Candle {
            mts,
            open: Decimal::ONE,
            high: Decimal::ONE,
            low: Decimal::ONE,
            close: Decimal::ONE,
            volume: Decimal::ONE,
        }
    }

    #[test]
    fn dedups_across_ticks() {
        let mut cursor = TradeCursor::default();

        let first = cursor.advance(vec![trade(100), trade(100), trade(105)]);
        assert_eq!(first.len(), 3);
        assert!(first[0].mts < first[1].mts);
        assert!(cursor.last() >= Decimal::from(105));

        let second = cursor.advance(vec![trade(105), trade(110)]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].mts, Decimal::from(110));
        assert_eq!(cursor.last(), Decimal::from(110));
    }

    #[test]
    fn unsorted_pages_are_ordered() {
        let mut cursor = TradeCursor::default();
        let fresh = cursor.advance(vec![trade(30), trade(10), trade(20)]);
        let times: Vec<Decimal> = fresh.iter().map(|t| t.mts).collect();
        assert_eq!(times, vec![Decimal::from(10), Decimal::from(20), Decimal::from(30)]);
    }

    #[test]
    fn empty_page_keeps_cursor() {
        let mut cursor = TradeCursor::default();
        cursor.advance(vec![trade(50)]);
        assert!(cursor.advance(vec![]).is_empty());
        assert!(cursor.advance(vec![trade(40), trade(50)]).is_empty());
        assert_eq!(cursor.last(), Decimal::from(50));
    }

    #[test]
    fn keeps_two_most_recent_candles() {
        let recent = recent_candles(vec![candle(3), candle(1), candle(2)]);
        let times: Vec<u64> = recent.iter().map(|c| c.mts).collect();
        assert_eq!(times, vec![2, 3]);
        assert_eq!(recent_candles(vec![candle(1)]).len(), 1);
    }
}
