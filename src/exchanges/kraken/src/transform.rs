use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use xf_connection::Update;
use xf_types::fields::{to_decimal, Fields};
use xf_types::{
    BookLevel, Candle, ChannelDescriptor, ChannelKind, Error, Payload, Result, Ticker, Trade,
};

/// Minutes per bar, keyed by timeframe.
const INTERVALS: [(&str, u32); 9] = [
    ("1m", 1),
    ("5m", 5),
    ("15m", 15),
    ("30m", 30),
    ("1h", 60),
    ("4h", 240),
    ("1D", 1440),
    ("7D", 10080),
    ("14D", 21600),
];

pub(crate) fn interval(timeframe: &str) -> Option<u32> {
    INTERVALS
        .iter()
        .find(|(tf, _)| *tf == timeframe)
        .map(|(_, minutes)| *minutes)
}

pub(crate) fn required_interval(descriptor: &ChannelDescriptor) -> Result<u32> {
    let timeframe = descriptor.required_timeframe()?;
    interval(timeframe).ok_or_else(|| {
        Error::UnknownChannelType(format!("candles timeframe {timeframe} on kraken"))
    })
}

#[derive(Copy, Clone, Debug)]
pub(crate) enum CandleLayout {
    /// `[time, etime, open, high, low, close, vwap, volume, count]`, where `time` is
    /// the last update and `etime` the end of the bar.
    Push { interval: u32 },
    /// `[time, open, high, low, close, vwap, volume, count]`, `time` is the bar start.
    Rest,
}

fn seconds_to_millis(seconds: Decimal) -> Decimal {
    seconds * Decimal::ONE_THOUSAND
}

fn whole_millis(seconds: Decimal) -> Result<u64> {
    seconds_to_millis(seconds.trunc())
        .to_u64()
        .ok_or_else(|| Error::MalformedMessage(format!("timestamp out of range: {seconds}")))
}

pub(crate) fn candle(value: &Value, layout: CandleLayout) -> Result<Candle> {
    let f = Fields::new(value)?;
    let (mts, first) = match layout {
        CandleLayout::Push { interval } => {
            let end = whole_millis(f.decimal(1)?)?;
            (end.saturating_sub(u64::from(interval) * 60_000), 2)
        }
        CandleLayout::Rest => (whole_millis(f.decimal(0)?)?, 1),
    };
    Ok(Candle {
        mts,
        open: f.decimal(first)?,
        high: f.decimal(first + 1)?,
        low: f.decimal(first + 2)?,
        close: f.decimal(first + 3)?,
        volume: f.decimal(first + 5)?,
    })
}

/// `[price, volume, time, side, orderType, misc, tradeId?]`. REST rows carry the id.
pub(crate) fn trade(value: &Value) -> Result<Trade> {
    let f = Fields::new(value)?;
    let volume = f.decimal(1)?;
    let amount = match f.str(3)? {
        "s" | "sell" => -volume,
        _ => volume,
    };
    Ok(Trade {
        id: f.opt_u64(6)?,
        price: f.decimal(0)?,
        amount,
        mts: seconds_to_millis(f.decimal(2)?),
    })
}

fn field<'a>(value: &'a Value, key: &str) -> Result<&'a Value> {
    value
        .get(key)
        .ok_or_else(|| Error::MalformedMessage(format!("ticker without {key}: {value}")))
}

/// Element `index` of an array field, or the field itself when it is a scalar.
fn ticker_decimal(value: &Value, key: &str, index: usize) -> Result<Decimal> {
    match field(value, key)? {
        Value::Array(entries) => entries
            .get(index)
            .ok_or_else(|| Error::MalformedMessage(format!("ticker {key} too short")))
            .and_then(to_decimal),
        scalar => to_decimal(scalar),
    }
}

/// Both the socket and REST ticker objects. The 24h open is a pair on the socket
/// and a single value over REST.
pub(crate) fn ticker(value: &Value) -> Result<Ticker> {
    let last_price = ticker_decimal(value, "c", 0)?;
    let open = ticker_decimal(value, "o", 1)?;
    let daily_change = last_price - open;
    let daily_change_perc = if open.is_zero() {
        Decimal::ZERO
    } else {
        daily_change / open
    };

    Ok(Ticker {
        bid: ticker_decimal(value, "b", 0)?,
        ask: ticker_decimal(value, "a", 0)?,
        daily_change,
        daily_change_perc,
        last_price,
        volume: ticker_decimal(value, "v", 1)?,
        high: ticker_decimal(value, "h", 1)?,
        low: ticker_decimal(value, "l", 1)?,
    })
}

/// Depth rows have no order count. Bids come first, asks are negated.
pub(crate) fn depth(value: &Value) -> Result<Vec<BookLevel>> {
    let mut levels = Vec::new();
    for (key, sign) in [("bids", Decimal::ONE), ("asks", Decimal::NEGATIVE_ONE)] {
        let rows = value
            .get(key)
            .and_then(Value::as_array)
            .ok_or_else(|| Error::MalformedMessage(format!("depth without {key}")))?;
        for row in rows {
            let f = Fields::new(row)?;
            levels.push(BookLevel::new(f.decimal(0)?, 1, f.decimal(1)? * sign));
        }
    }
    Ok(levels)
}

pub(crate) fn transform(descriptor: &ChannelDescriptor, data: Value) -> Result<Update> {
    let payload = match descriptor.kind() {
        ChannelKind::Ticker => Payload::Ticker(ticker(&data)?),
        ChannelKind::Trades => {
            let rows = data
                .as_array()
                .ok_or_else(|| Error::MalformedMessage(format!("trades: {data}")))?;
            Payload::Trades(rows.iter().map(trade).collect::<Result<_>>()?)
        }
        ChannelKind::Candles => {
            let layout = CandleLayout::Push {
                interval: required_interval(descriptor)?,
            };
            Payload::Candles(vec![candle(&data, layout)?])
        }
        // served by the poller
        ChannelKind::Book => return Ok(Update::Ignore),
    };
    Ok(Update::Payload(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;
    use test_case::test_case;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test_case("1m", Some(1))]
    #[test_case("1h", Some(60))]
    #[test_case("14D", Some(21600))]
    #[test_case("3h", None)]
    fn intervals(timeframe: &str, expected: Option<u32>) {
        assert_eq!(interval(timeframe), expected);
    }

    #[test]
    fn push_candle_starts_one_interval_before_its_end() {
        let row = json!(["1542057314.748456", "1542057360.435743", "3586.70000", "3586.70000",
            "3586.60000", "3586.60000", "3586.68894", "0.03373000", 2]);
        let candle = candle(&row, CandleLayout::Push { interval: 1 }).unwrap();
        assert_eq!(candle.mts, 1542057300000);
        assert_eq!(candle.open, d("3586.7"));
        assert_eq!(candle.close, d("3586.6"));
        assert_eq!(candle.volume, d("0.03373"));
    }

    #[test]
    fn rest_candle_uses_bar_start() {
        let row = json!([1688671200, "30306.1", "30306.2", "30305.7", "30305.7", "30306.1", "3.39243896", 23]);
        let candle = candle(&row, CandleLayout::Rest).unwrap();
        assert_eq!(candle.mts, 1688671200000);
        assert_eq!(candle.high, d("30306.2"));
        assert_eq!(candle.low, d("30305.7"));
        assert_eq!(candle.volume, d("3.39243896"));
    }

    #[test]
    fn sells_are_negative() {
        let t = trade(&json!(["5541.20000", "0.15850568", "1534614057.321597", "s", "l", ""])).unwrap();
        assert_eq!(t.amount, d("-0.15850568"));
        assert_eq!(t.mts, d("1534614057321.597"));
        assert_eq!(t.id, None);

        let t = trade(&json!(["30243.40000", "0.34507674", 1688669597.8277369, "b", "m", "", 61186])).unwrap();
        assert_eq!(t.amount, d("0.34507674"));
        assert_eq!(t.id, Some(61186));
    }

    #[test]
    fn push_and_rest_tickers() {
        let push = json!({
            "a": ["5525.40000", 1, "1.000"], "b": ["5525.10000", 1, "1.000"],
            "c": ["5525.10000", "0.00398963"], "v": ["2634.11501494", "3591.17907851"],
            "p": ["5631.44067", "5653.78939"], "t": [11493, 16267],
            "l": ["5505.00000", "5505.00000"], "h": ["5783.00000", "5783.00000"],
            "o": ["5760.70000", "5763.40000"]
        });
        let t = ticker(&push).unwrap();
        assert_eq!(t.bid, d("5525.1"));
        assert_eq!(t.ask, d("5525.4"));
        assert_eq!(t.volume, d("3591.17907851"));
        assert_eq!(t.daily_change, d("-238.3"));

        let mut rest = push.clone();
        rest["o"] = json!("5763.40000");
        assert_eq!(ticker(&rest).unwrap(), t);
    }

    #[test]
    fn depth_signs_by_side() {
        let value = json!({
            "asks": [["30384.10000", "2.059", 1688671659]],
            "bids": [["30297.00000", "0.115", 1688671505]]
        });
        let levels = depth(&value).unwrap();
        assert_eq!(
            levels,
            vec![
                BookLevel::new(d("30297"), 1, d("0.115")),
                BookLevel::new(d("30384.1"), 1, d("-2.059")),
            ]
        );
    }
}
