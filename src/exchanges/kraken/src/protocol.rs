use crate::serialize_to_json;
use crate::transform::{self, interval, required_interval};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use xf_connection::{Ack, Inbound, Protocol, Update};
use xf_types::{ChannelDescriptor, ChannelId, ChannelKind, Error, Exchange, Result};

const URL: &str = "wss://ws.kraken.com";

pub(crate) const BOOK_DEPTH: u32 = 25;

/// Kraken WebSocket v1.
///
/// Subscription acks do not always carry a usable channel id, so channels are
/// identified by `"<channelName>|<pair>"`, which every data frame repeats in its
/// last two elements.
#[derive(Default)]
pub struct KrakenProtocol {}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum Request<'a> {
    Subscribe {
        pair: [&'a str; 1],
        subscription: Subscription,
    },
    Unsubscribe {
        pair: [&'a str; 1],
        subscription: Subscription,
    },
}

#[derive(Serialize)]
struct Subscription {
    name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    depth: Option<u32>,
}

impl Subscription {
    fn for_descriptor(descriptor: &ChannelDescriptor) -> Result<Subscription> {
        Ok(match descriptor.kind() {
            ChannelKind::Ticker => Subscription::named("ticker"),
            ChannelKind::Trades => Subscription::named("trade"),
            ChannelKind::Candles => Subscription {
                interval: Some(required_interval(descriptor)?),
                ..Subscription::named("ohlc")
            },
            ChannelKind::Book => Subscription {
                depth: Some(BOOK_DEPTH),
                ..Subscription::named("book")
            },
        })
    }

    /// Parses a channel name such as `ticker`, `ohlc-5` or `book-25`.
    fn from_channel_name(channel_name: &str) -> Option<Subscription> {
        let (name, parameter) = match channel_name.split_once('-') {
            Some((name, parameter)) => (name, Some(parameter.parse::<u32>().ok()?)),
            None => (channel_name, None),
        };
        match name {
            "ticker" => Some(Subscription::named("ticker")),
            "trade" => Some(Subscription::named("trade")),
            "spread" => Some(Subscription::named("spread")),
            "ohlc" => Some(Subscription {
                interval: parameter,
                ..Subscription::named("ohlc")
            }),
            "book" => Some(Subscription {
                depth: parameter,
                ..Subscription::named("book")
            }),
            _ => None,
        }
    }

    fn named(name: &'static str) -> Subscription {
        Subscription {
            name,
            interval: None,
            depth: None,
        }
    }
}

fn channel_kind(name: &str) -> Option<ChannelKind> {
    match name {
        "ticker" => Some(ChannelKind::Ticker),
        "trade" => Some(ChannelKind::Trades),
        "ohlc" => Some(ChannelKind::Candles),
        "book" => Some(ChannelKind::Book),
        _ => None,
    }
}

fn channel_id(channel_name: &str, pair: &str) -> ChannelId {
    ChannelId::Named(format!("{channel_name}|{pair}"))
}

/// Object frames, tagged by their `event` field.
#[derive(Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum Message {
    Heartbeat,
    SubscriptionStatus(SubscriptionStatus),
    Error {
        #[serde(rename = "errorMessage")]
        error_message: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Status {
    Subscribed,
    Unsubscribed,
    Error,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionStatus {
    status: Status,
    pair: Option<String>,
    channel_name: Option<String>,
    error_message: Option<String>,
    subscription: Option<SubscriptionInfo>,
}

#[derive(Deserialize)]
struct SubscriptionInfo {
    name: String,
    interval: Option<u64>,
}

impl SubscriptionStatus {
    /// For candles the ack's timeframe holds the interval in minutes, as Kraken
    /// reports it.
    fn ack(&self) -> Option<Ack> {
        let subscription = self.subscription.as_ref()?;
        Some(Ack {
            kind: channel_kind(&subscription.name)?,
            symbol: self.pair.clone()?,
            timeframe: subscription.interval.map(|minutes| minutes.to_string()),
        })
    }

    fn id(&self) -> Option<ChannelId> {
        Some(channel_id(self.channel_name.as_deref()?, self.pair.as_deref()?))
    }
}

fn decode_event(text: &str) -> Result<Inbound> {
    let malformed = || Error::MalformedMessage(text.to_string());
    match serde_json::from_str(text)? {
        Message::Heartbeat => Ok(Inbound::Heartbeat),
        Message::SubscriptionStatus(status) => match status.status {
            Status::Subscribed => Ok(Inbound::Subscribed {
                ack: status.ack().ok_or_else(malformed)?,
                id: status.id().ok_or_else(malformed)?,
            }),
            Status::Unsubscribed => Ok(Inbound::Unsubscribed {
                id: status.id().ok_or_else(malformed)?,
            }),
            Status::Error => Ok(Inbound::Rejected {
                ack: status.ack(),
                reason: status
                    .error_message
                    .unwrap_or_else(|| "unknown error".to_string()),
            }),
        },
        Message::Error { error_message } => Ok(Inbound::Rejected {
            ack: None,
            reason: error_message.unwrap_or_else(|| "unknown error".to_string()),
        }),
        Message::Other => Ok(Inbound::Info(text.to_string())),
    }
}

impl Protocol for KrakenProtocol {
    fn exchange(&self) -> Exchange {
        Exchange::Kraken
    }

    fn url(&self) -> &str {
        URL
    }

    fn streams(&self, kind: ChannelKind) -> bool {
        kind != ChannelKind::Book
    }

    /// Dropped Kraken sockets are brought back by an explicit `reconnect()`.
    fn auto_reconnect(&self) -> bool {
        false
    }

    fn subscribe_packet(&self, descriptor: &ChannelDescriptor) -> Result<String> {
        serialize_to_json(&Request::Subscribe {
            pair: [descriptor.market().ws_id.as_str()],
            subscription: Subscription::for_descriptor(descriptor)?,
        })
    }

    fn unsubscribe_packet(
        &self,
        id: &ChannelId,
        descriptor: Option<&ChannelDescriptor>,
    ) -> Option<String> {
        let ChannelId::Named(name) = id else {
            return None;
        };
        let (channel_name, pair) = name.split_once('|')?;
        let subscription = match descriptor {
            Some(descriptor) => Subscription::for_descriptor(descriptor).ok()?,
            None => Subscription::from_channel_name(channel_name)?,
        };
        serialize_to_json(&Request::Unsubscribe {
            pair: [pair],
            subscription,
        })
        .ok()
    }

    fn decode(&self, text: &str) -> Result<Inbound> {
        let value: Value = serde_json::from_str(text)?;
        if value.is_object() {
            return decode_event(text);
        }

        // [channelID, payload.., channelName, pair]
        let entries = value
            .as_array()
            .filter(|entries| entries.len() >= 4)
            .ok_or_else(|| Error::MalformedMessage(text.to_string()))?;
        let n = entries.len();
        let (Some(channel_name), Some(pair)) = (entries[n - 2].as_str(), entries[n - 1].as_str())
        else {
            return Err(Error::MalformedMessage(text.to_string()));
        };

        let data = match &entries[1..n - 2] {
            [payload] => payload.clone(),
            payloads => Value::Array(payloads.to_vec()),
        };
        Ok(Inbound::Data {
            id: channel_id(channel_name, pair),
            data,
        })
    }

    /// Kraken acks report candles by interval, so timeframes with the same
    /// interval match.
    fn matches_ack(&self, ack: &Ack, pending: &ChannelDescriptor) -> bool {
        if ack.kind != pending.kind() || ack.symbol != pending.market().ws_id {
            return false;
        }
        if ack.kind != ChannelKind::Candles {
            return true;
        }
        let pending = pending.timeframe().and_then(interval);
        let acked = ack.timeframe.as_deref().and_then(|t| t.parse::<u32>().ok());
        pending.is_some() && pending == acked
    }

    fn transform(&self, descriptor: &ChannelDescriptor, data: Value) -> Result<Update> {
        transform::transform(descriptor, data)
    }
}
