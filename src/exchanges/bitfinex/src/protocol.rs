use crate::auth::{self, Auth};
use crate::serialize_to_json;
use crate::transform;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use xf_connection::{Ack, Inbound, Protocol, Update};
use xf_types::fields::Fields;
use xf_types::{
    ChannelDescriptor, ChannelId, ChannelKind, Credentials, Error, Exchange, NewOrder, OrderOp,
    Payload, Result,
};

const URL: &str = "wss://api-pub.bitfinex.com/ws/2";

const TIMEFRAMES: [&str; 12] = [
    "1m", "5m", "15m", "30m", "1h", "3h", "6h", "12h", "1D", "1W", "14D", "1M",
];

pub(crate) const BOOK_LEN: &str = "25";

/// Bitfinex WebSocket v2. Channels are identified by the numeric `chanId` the
/// exchange assigns in its `subscribed` event.
#[derive(Default)]
pub struct BitfinexProtocol {}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum Request<'a> {
    Subscribe(Subscribe<'a>),
    Unsubscribe {
        #[serde(rename = "chanId")]
        chan_id: u64,
    },
    Auth(Auth),
}

#[derive(Serialize)]
struct Subscribe<'a> {
    channel: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    symbol: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prec: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    len: Option<&'static str>,
}

#[derive(Serialize)]
struct OrderBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    gid: Option<u64>,
    cid: u64,
    #[serde(rename = "type")]
    order_type: &'a str,
    symbol: &'a str,
    amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<String>,
    flags: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    lev: Option<u32>,
}

impl<'a> From<&'a NewOrder> for OrderBody<'a> {
    fn from(order: &'a NewOrder) -> Self {
        OrderBody {
            gid: order.gid,
            cid: order.cid,
            order_type: &order.order_type,
            symbol: &order.symbol,
            amount: order.amount.to_string(),
            price: order.price.as_ref().map(Decimal::to_string),
            flags: order.flags,
            lev: order.lev,
        }
    }
}

fn order_op(op: &OrderOp) -> Result<(&'static str, Value)> {
    match op {
        OrderOp::Submit(order) => Ok(("on", serde_json::to_value(OrderBody::from(order))?)),
        OrderOp::Cancel { id } => {
            let id: u64 = id
                .parse()
                .map_err(|_| Error::MalformedMessage(format!("order id is not numeric: {id}")))?;
            Ok(("oc", json!({ "id": id })))
        }
    }
}

fn channel_kind(channel: &str) -> Option<ChannelKind> {
    match channel {
        "ticker" => Some(ChannelKind::Ticker),
        "trades" => Some(ChannelKind::Trades),
        "candles" => Some(ChannelKind::Candles),
        "book" => Some(ChannelKind::Book),
        _ => None,
    }
}

/// Object frames, tagged by their `event` field.
#[derive(Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum Message {
    Subscribed(ChannelEvent),
    Unsubscribed(ChannelEvent),
    Error(ChannelEvent),
    Auth {
        status: String,
        msg: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelEvent {
    chan_id: Option<u64>,
    channel: Option<String>,
    symbol: Option<String>,
    key: Option<String>,
    msg: Option<String>,
}

impl ChannelEvent {
    fn id(&self, text: &str) -> Result<ChannelId> {
        self.chan_id
            .map(ChannelId::Numeric)
            .ok_or_else(|| Error::MalformedMessage(format!("missing chanId: {text}")))
    }

    /// Rebuilds what the event refers to. Candle events carry a
    /// `trade:<timeframe>:<symbol>` key instead of a symbol.
    fn ack(&self) -> Option<Ack> {
        let kind = channel_kind(self.channel.as_deref()?)?;
        if kind == ChannelKind::Candles {
            let mut parts = self.key.as_deref()?.splitn(3, ':');
            let _ = parts.next()?;
            let timeframe = parts.next()?.to_string();
            let symbol = parts.next()?.to_string();
            return Some(Ack {
                kind,
                symbol,
                timeframe: Some(timeframe),
            });
        }
        Some(Ack {
            kind,
            symbol: self.symbol.clone()?,
            timeframe: None,
        })
    }
}

fn decode_event(text: &str) -> Result<Inbound> {
    match serde_json::from_str(text)? {
        Message::Subscribed(event) => {
            let ack = event
                .ack()
                .ok_or_else(|| Error::MalformedMessage(format!("unrecognised ack: {text}")))?;
            Ok(Inbound::Subscribed {
                ack,
                id: event.id(text)?,
            })
        }
        Message::Unsubscribed(event) => Ok(Inbound::Unsubscribed { id: event.id(text)? }),
        Message::Error(event) => Ok(Inbound::Rejected {
            ack: event.ack(),
            reason: event.msg.unwrap_or_else(|| "unknown error".to_string()),
        }),
        Message::Auth { status, .. } if status == "OK" => Ok(Inbound::Authenticated),
        Message::Auth { msg, .. } => Ok(Inbound::AuthFailed(
            msg.unwrap_or_else(|| "no reason given".to_string()),
        )),
        Message::Other => Ok(Inbound::Info(text.to_string())),
    }
}

/// Channel 0 carries the account stream. Only order events are surfaced.
fn decode_account(f: &Fields, text: &str) -> Result<Inbound> {
    let id = ChannelId::Numeric(0);
    let payloads = match f.opt_str(1) {
        Some("os") => transform::rows(f.get(2).unwrap_or(&Value::Null), transform::order)?,
        Some("on" | "ou" | "oc") => {
            let order = f
                .get(2)
                .ok_or_else(|| Error::MalformedMessage(text.to_string()))?;
            vec![transform::order(order)?]
        }
        Some("hb") => return Ok(Inbound::Heartbeat),
        _ => return Ok(Inbound::Info(text.to_string())),
    };
    Ok(Inbound::Account {
        id,
        payloads: payloads.into_iter().map(Payload::Order).collect(),
    })
}

impl Protocol for BitfinexProtocol {
    fn exchange(&self) -> Exchange {
        Exchange::Bitfinex
    }

    fn url(&self) -> &str {
        URL
    }

    fn streams(&self, _kind: ChannelKind) -> bool {
        true
    }

    fn subscribe_packet(&self, descriptor: &ChannelDescriptor) -> Result<String> {
        let symbol = descriptor.market().ws_id.as_str();
        let subscribe = match descriptor.kind() {
            ChannelKind::Ticker | ChannelKind::Trades => Subscribe {
                channel: descriptor.kind().as_str(),
                symbol: Some(symbol),
                key: None,
                prec: None,
                len: None,
            },
            ChannelKind::Book => Subscribe {
                channel: "book",
                symbol: Some(symbol),
                key: None,
                prec: Some("P0"),
                len: Some(BOOK_LEN),
            },
            ChannelKind::Candles => {
                let timeframe = descriptor.required_timeframe()?;
                if !TIMEFRAMES.contains(&timeframe) {
                    return Err(Error::UnknownChannelType(format!(
                        "candles timeframe {timeframe} on bitfinex"
                    )));
                }
                Subscribe {
                    channel: "candles",
                    symbol: None,
                    key: Some(format!("trade:{timeframe}:{symbol}")),
                    prec: None,
                    len: None,
                }
            }
        };
        serialize_to_json(&Request::Subscribe(subscribe))
    }

    fn unsubscribe_packet(
        &self,
        id: &ChannelId,
        _descriptor: Option<&ChannelDescriptor>,
    ) -> Option<String> {
        match id {
            ChannelId::Numeric(chan_id) => {
                serialize_to_json(&Request::Unsubscribe { chan_id: *chan_id }).ok()
            }
            _ => None,
        }
    }

    fn auth_packet(&self, credentials: &Credentials) -> Result<Option<String>> {
        let auth = Auth::new(credentials, auth::nonce()?)?;
        serialize_to_json(&Request::Auth(auth)).map(Some)
    }

    /// A single op goes out as `on`/`oc`, several as one `ox_multi`.
    fn order_packets(&self, ops: &[OrderOp]) -> Result<Vec<String>> {
        match ops {
            [] => Ok(Vec::new()),
            [op] => {
                let (name, body) = order_op(op)?;
                Ok(vec![json!([0, name, null, body]).to_string()])
            }
            ops => {
                let batch = ops
                    .iter()
                    .map(|op| order_op(op).map(|(name, body)| json!([name, body])))
                    .collect::<Result<Vec<_>>>()?;
                Ok(vec![json!([0, "ox_multi", null, batch]).to_string()])
            }
        }
    }

    fn decode(&self, text: &str) -> Result<Inbound> {
        let value: Value = serde_json::from_str(text)?;
        if value.is_object() {
            return decode_event(text);
        }

        let f = Fields::new(&value)?;
        let chan_id = f.u64(0)?;
        if chan_id == 0 {
            return decode_account(&f, text);
        }

        let id = ChannelId::Numeric(chan_id);
        let data = match value.as_array().and_then(|entries| entries.get(1..)) {
            Some([Value::String(event)]) if event == "hb" => return Ok(Inbound::Heartbeat),
            Some([data]) => data.clone(),
            Some(tail) if tail.len() > 1 => Value::Array(tail.to_vec()),
            _ => return Err(Error::MalformedMessage(text.to_string())),
        };
        Ok(Inbound::Data { id, data })
    }

    fn transform(&self, descriptor: &ChannelDescriptor, data: Value) -> Result<Update> {
        transform::transform(descriptor, data)
    }
}
