use serde_json::Value;
use xf_connection::{classify_book, Update};
use xf_types::fields::Fields;
use xf_types::{
    BookLevel, Candle, ChannelDescriptor, ChannelKind, Order, Payload, Result, Ticker, Trade,
    HIDDEN, OCO, POST_ONLY, REDUCE_ONLY,
};

// [BID, BID_SIZE, ASK, ASK_SIZE, DAILY_CHANGE, DAILY_CHANGE_RELATIVE, LAST_PRICE, VOLUME, HIGH, LOW]
pub(crate) fn ticker(value: &Value) -> Result<Ticker> {
    let f = Fields::new(value)?;
    Ok(Ticker {
        bid: f.decimal(0)?,
        ask: f.decimal(2)?,
        daily_change: f.decimal(4)?,
        daily_change_perc: f.decimal(5)?,
        last_price: f.decimal(6)?,
        volume: f.decimal(7)?,
        high: f.decimal(8)?,
        low: f.decimal(9)?,
    })
}

// [ID, MTS, AMOUNT, PRICE]
pub(crate) fn trade(value: &Value) -> Result<Trade> {
    let f = Fields::new(value)?;
    Ok(Trade {
        id: f.opt_u64(0)?,
        mts: f.decimal(1)?,
        amount: f.decimal(2)?,
        price: f.decimal(3)?,
    })
}

// [MTS, OPEN, CLOSE, HIGH, LOW, VOLUME]
pub(crate) fn candle(value: &Value) -> Result<Candle> {
    let f = Fields::new(value)?;
    Ok(Candle {
        mts: f.u64(0)?,
        open: f.decimal(1)?,
        close: f.decimal(2)?,
        high: f.decimal(3)?,
        low: f.decimal(4)?,
        volume: f.decimal(5)?,
    })
}

// [PRICE, COUNT, AMOUNT]
pub(crate) fn book_level(value: &Value) -> Result<BookLevel> {
    let f = Fields::new(value)?;
    let count = u32::try_from(f.u64(1)?).unwrap_or(u32::MAX);
    Ok(BookLevel::new(f.decimal(0)?, count, f.decimal(2)?))
}

const ORDER_ID: usize = 0;
const ORDER_GID: usize = 1;
const ORDER_CID: usize = 2;
const ORDER_SYMBOL: usize = 3;
const ORDER_MTS_CREATE: usize = 4;
const ORDER_MTS_UPDATE: usize = 5;
const ORDER_AMOUNT: usize = 6;
const ORDER_AMOUNT_ORIG: usize = 7;
const ORDER_TYPE: usize = 8;
const ORDER_FLAGS: usize = 12;
const ORDER_STATUS: usize = 13;
const ORDER_PRICE: usize = 16;
const ORDER_PRICE_AVG: usize = 17;
const ORDER_PRICE_TRAILING: usize = 18;
const ORDER_PRICE_AUX_LIMIT: usize = 19;
const ORDER_META: usize = 31;

pub(crate) fn order(value: &Value) -> Result<Order> {
    let f = Fields::new(value)?;
    let flags = f.opt_u64(ORDER_FLAGS)?.unwrap_or_default();
    let meta = f.get(ORDER_META);

    Ok(Order {
        id: f.u64(ORDER_ID)?,
        gid: f.opt_u64(ORDER_GID)?,
        cid: f.opt_u64(ORDER_CID)?.unwrap_or_default(),
        symbol: f.str(ORDER_SYMBOL)?.to_string(),
        mts_create: f.opt_u64(ORDER_MTS_CREATE)?.unwrap_or_default(),
        mts_update: f.opt_u64(ORDER_MTS_UPDATE)?.unwrap_or_default(),
        amount: f.decimal(ORDER_AMOUNT)?,
        amount_orig: f.decimal(ORDER_AMOUNT_ORIG)?,
        order_type: f.str(ORDER_TYPE)?.to_string(),
        flags,
        hidden: flags & HIDDEN != 0,
        post_only: flags & POST_ONLY != 0,
        oco: flags & OCO != 0,
        reduce_only: flags & REDUCE_ONLY != 0,
        visible_on_hit: meta
            .and_then(|m| m.get("make_visible"))
            .and_then(Value::as_u64)
            .is_some_and(|v| v == 1),
        price: f.opt_decimal(ORDER_PRICE)?.unwrap_or_default(),
        price_avg: f.opt_decimal(ORDER_PRICE_AVG)?,
        price_trailing: f.opt_decimal(ORDER_PRICE_TRAILING)?,
        price_aux_limit: f.opt_decimal(ORDER_PRICE_AUX_LIMIT)?,
        status: f.opt_str(ORDER_STATUS).unwrap_or_default().to_string(),
        lev: meta
            .and_then(|m| m.get("lev"))
            .and_then(Value::as_u64)
            .and_then(|lev| u32::try_from(lev).ok()),
    })
}

/// An array of arrays (or an empty array) holds many rows, anything else is one.
pub(crate) fn rows<T>(value: &Value, row: impl Fn(&Value) -> Result<T>) -> Result<Vec<T>> {
    match value.as_array() {
        Some(entries) if entries.is_empty() || entries[0].is_array() => {
            entries.iter().map(row).collect()
        }
        _ => row(value).map(|r| vec![r]),
    }
}

/// Channel data arrives either as the payload alone or as `[event, payload]` where
/// the event is a short string such as `te`, `tu` or `cs`.
fn event(value: &Value) -> Option<(&str, Option<&Value>)> {
    let entries = value.as_array()?;
    let name = entries.first()?.as_str()?;
    Some((name, entries.get(1)))
}

pub(crate) fn transform(descriptor: &ChannelDescriptor, data: Value) -> Result<Update> {
    let payload = match descriptor.kind() {
        ChannelKind::Ticker => Payload::Ticker(ticker(&data)?),
        ChannelKind::Trades => match event(&data) {
            // "tu" repeats an executed trade with its final id
            Some(("te", Some(trade_data))) => Payload::Trades(vec![trade(trade_data)?]),
            Some(_) => return Ok(Update::Ignore),
            None => Payload::Trades(rows(&data, trade)?),
        },
        ChannelKind::Candles => Payload::Candles(rows(&data, candle)?),
        ChannelKind::Book => {
            if event(&data).is_some() {
                return Ok(Update::Ignore);
            }
            return classify_book(&data, book_level).map(Update::Book);
        }
    };
    Ok(Update::Payload(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;
    use test_case::test_case;
    use xf_connection::testing::market;
    use xf_connection::BookUpdate;
    use xf_types::{Error, Exchange};

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn descriptor(kind: ChannelKind) -> ChannelDescriptor {
        ChannelDescriptor::new(kind, market(Exchange::Bitfinex, "tBTCUSD"), Some("1m".into()))
    }

    fn payload(kind: ChannelKind, data: Value) -> Payload {
        match transform(&descriptor(kind), data).unwrap() {
            Update::Payload(payload) => payload,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ticker_fields() {
        let data = json!([7616.5, 31.9, 7617.5, 43.1, -15.1, -0.0028, 7617.1, 5461.2, 7757.9, 7550]);
        let Payload::Ticker(t) = payload(ChannelKind::Ticker, data) else {
            panic!()
        };
        assert_eq!(t.bid, d("7616.5"));
        assert_eq!(t.ask, d("7617.5"));
        assert_eq!(t.daily_change_perc, d("-0.0028"));
        assert_eq!(t.last_price, d("7617.1"));
        assert_eq!(t.low, d("7550"));
    }

    #[test]
    fn trade_snapshot_and_execution() {
        let snapshot = json!([[401, 1574694478808u64, 0.005, 7245.3], [400, 1574694475039u64, -0.1, 7245.2]]);
        let Payload::Trades(trades) = payload(ChannelKind::Trades, snapshot) else {
            panic!()
        };
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[1].amount, d("-0.1"));

        let executed = json!(["te", [402, 1574694479000u64, 0.2, 7246]]);
        let Payload::Trades(trades) = payload(ChannelKind::Trades, executed) else {
            panic!()
        };
        assert_eq!(trades[0].id, Some(402));
        assert_eq!(trades[0].mts, Decimal::from(1574694479000u64));
    }

    #[test]
    fn trade_update_is_dropped() {
        let update = json!(["tu", [402, 1574694479000u64, 0.2, 7246]]);
        assert!(matches!(
            transform(&descriptor(ChannelKind::Trades), update).unwrap(),
            Update::Ignore
        ));
    }

    #[test]
    fn candle_column_order() {
        let Payload::Candles(candles) =
            payload(ChannelKind::Candles, json!([1574698260000u64, 7379.8, 7380.1, 7381, 7379.7, 0.67]))
        else {
            panic!()
        };
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].open, d("7379.8"));
        assert_eq!(candles[0].close, d("7380.1"));
        assert_eq!(candles[0].high, d("7381"));
        assert_eq!(candles[0].low, d("7379.7"));
    }

    #[test_case(json!([]), BookUpdate::Snapshot(vec![]) ; "empty snapshot")]
    #[test_case(json!([4000, 1, -1]), BookUpdate::Diff(BookLevel::new(Decimal::from(4000), 1, Decimal::from(-1))) ; "diff")]
    fn book_updates(data: Value, expected: BookUpdate) {
        match transform(&descriptor(ChannelKind::Book), data).unwrap() {
            Update::Book(update) => assert_eq!(update, expected),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn checksum_is_ignored() {
        assert!(matches!(
            transform(&descriptor(ChannelKind::Book), json!(["cs", -1234])).unwrap(),
            Update::Ignore
        ));
    }

    #[test]
    fn malformed_ticker() {
        assert!(matches!(
            transform(&descriptor(ChannelKind::Ticker), json!([1, 2])),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn order_flags_and_meta() {
        let mut row = vec![Value::Null; 32];
        row[0] = json!(1185815098);
        row[2] = json!(1574703063722u64);
        row[3] = json!("tBTCUSD");
        row[4] = json!(1574703063723u64);
        row[5] = json!(1574703063724u64);
        row[6] = json!(-0.5);
        row[7] = json!(-1);
        row[8] = json!("EXCHANGE LIMIT");
        row[12] = json!(HIDDEN | POST_ONLY);
        row[13] = json!("PARTIALLY FILLED @ 7400.0(-0.5)");
        row[16] = json!(7400);
        row[17] = json!(7400);
        row[31] = json!({"lev": 10, "make_visible": 1});

        let order = order(&Value::Array(row)).unwrap();

        assert_eq!(order.id, 1185815098);
        assert_eq!(order.gid, None);
        assert_eq!(order.amount, d("-0.5"));
        assert_eq!(order.amount_orig, Decimal::from(-1));
        assert!(order.hidden);
        assert!(order.post_only);
        assert!(!order.oco);
        assert!(!order.reduce_only);
        assert!(order.visible_on_hit);
        assert_eq!(order.lev, Some(10));
        assert_eq!(order.price_trailing, None);
    }
}
