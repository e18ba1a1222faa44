use crate::book::BookUpdate;
use serde_json::Value;
use xf_types::{
    ChannelDescriptor, ChannelId, ChannelKind, Credentials, Error, Exchange, OrderOp, Payload,
    Result,
};

/// What a subscription acknowledgement or rejection says it is about.
#[derive(Clone, Debug, PartialEq)]
pub struct Ack {
    pub kind: ChannelKind,
    pub symbol: String,
    pub timeframe: Option<String>,
}

/// One decoded inbound frame.
#[derive(Debug)]
pub enum Inbound {
    Heartbeat,
    Subscribed { ack: Ack, id: ChannelId },
    Rejected { ack: Option<Ack>, reason: String },
    Unsubscribed { id: ChannelId },
    Data { id: ChannelId, data: Value },
    Account { id: ChannelId, payloads: Vec<Payload> },
    Authenticated,
    AuthFailed(String),
    Info(String),
}

#[derive(Debug)]
pub enum Update {
    Payload(Payload),
    Book(BookUpdate),
    Ignore,
}

/// The wire-specific half of an exchange connection.
pub trait Protocol: Send + 'static {
    fn exchange(&self) -> Exchange;

    fn url(&self) -> &str;

    /// Kinds the exchange does not stream are served by the REST poller.
    fn streams(&self, kind: ChannelKind) -> bool;

    /// Whether the transport may reconnect on its own. When false a dropped socket
    /// stays down until `reconnect()`.
    fn auto_reconnect(&self) -> bool {
        true
    }

    fn subscribe_packet(&self, descriptor: &ChannelDescriptor) -> Result<String>;

    /// `descriptor` is `None` when unsubscribing a channel this connection never
    /// registered.
    fn unsubscribe_packet(
        &self,
        id: &ChannelId,
        descriptor: Option<&ChannelDescriptor>,
    ) -> Option<String>;

    fn auth_packet(&self, _credentials: &Credentials) -> Result<Option<String>> {
        Ok(None)
    }

    fn order_packets(&self, _ops: &[OrderOp]) -> Result<Vec<String>> {
        Err(Error::Unsupported(format!(
            "order pass-through on {}",
            self.exchange()
        )))
    }

    fn decode(&self, text: &str) -> Result<Inbound>;

    fn matches_ack(&self, ack: &Ack, pending: &ChannelDescriptor) -> bool {
        ack.kind == pending.kind()
            && ack.symbol == pending.market().ws_id
            && (ack.kind != ChannelKind::Candles || ack.timeframe.as_deref() == pending.timeframe())
    }

    fn transform(&self, descriptor: &ChannelDescriptor, data: Value) -> Result<Update>;
}
