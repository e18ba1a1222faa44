use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use xf_connection::{Connection, ConnectionConfig};
use xf_types::Result;

mod client;
mod protocol;
mod transform;

pub use client::KrakenClient;
pub use protocol::KrakenProtocol;

/// A Kraken connection. Order books are polled over REST.
pub fn connection(config: ConnectionConfig, cancellation_token: CancellationToken) -> Connection {
    Connection::new(
        KrakenProtocol::default(),
        Arc::new(KrakenClient::new()),
        config,
        cancellation_token,
    )
}

fn serialize_to_json<S: Serialize>(value: &S) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::{mpsc, oneshot};
    use xf_connection::testing::{market, RecordingSocket, StubRest};
    use xf_connection::{Event, Session, SocketEvent};
    use xf_types::{ChannelDescriptor, ChannelId, Error, Exchange, OpenOptions, OrderOp, Payload};

    type Seen = Arc<Mutex<Vec<(ChannelId, Payload)>>>;

    fn session() -> (Session<KrakenProtocol>, RecordingSocket, Seen) {
        let (events, _) = mpsc::unbounded_channel();
        let mut session = Session::new(
            KrakenProtocol::default(),
            Arc::new(StubRest::default()),
            ConnectionConfig::default(),
            events,
            CancellationToken::new(),
        );
        let seen: Seen = Arc::default();
        let sink = seen.clone();
        session.handle(Event::OnData(Box::new(
            move |id: &ChannelId, payload: &Payload| {
                sink.lock().unwrap().push((id.clone(), payload.clone()));
            },
        )));

        let socket = RecordingSocket::default();
        session.handle(Event::Socket(0, SocketEvent::Attached(Box::new(socket.clone()))));
        session.handle(Event::Socket(0, SocketEvent::Connected));
        (session, socket, seen)
    }

    fn receive(session: &mut Session<KrakenProtocol>, text: &str) {
        let generation = session.generation();
        session.handle(Event::Socket(generation, SocketEvent::Text(text.to_string())));
    }

    #[tokio::test]
    async fn ohlc_ack_resolves_pending_candles() {
        let (mut session, socket, seen) = session();
        let (tx, mut rx) = oneshot::channel();
        session.handle(Event::Subscribe(
            ChannelDescriptor::candles(market(Exchange::Kraken, "XBT/USD"), "1m"),
            tx,
        ));
        assert_eq!(socket.sent().len(), 1);

        receive(
            &mut session,
            r#"{"channelID":42,"channelName":"ohlc-1","event":"subscriptionStatus","pair":"XBT/USD","status":"subscribed","subscription":{"interval":1,"name":"ohlc"}}"#,
        );
        let id = rx.try_recv().unwrap().unwrap();
        assert_eq!(id, ChannelId::Named("ohlc-1|XBT/USD".to_string()));

        receive(&mut session, r#"{"event":"heartbeat"}"#);
        receive(
            &mut session,
            r#"[42,["1542057314.748456","1542057360.435743","3586.7","3586.7","3586.6","3586.6","3586.68894","0.03373",2],"ohlc-1","XBT/USD"]"#,
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, id);
        assert!(matches!(&seen[0].1, Payload::Candles(c) if c[0].mts == 1542057300000));
    }

    #[tokio::test]
    async fn book_subscription_is_polled() {
        let (mut session, socket, _) = session();
        let (tx, mut rx) = oneshot::channel();
        session.handle(Event::Subscribe(
            ChannelDescriptor::book(market(Exchange::Kraken, "XBT/USD")),
            tx,
        ));

        assert!(rx.try_recv().unwrap().unwrap().is_poll());
        assert!(socket.sent().is_empty());
        session.close();
    }

    #[tokio::test]
    async fn orders_are_unsupported() {
        let (mut session, _, _) = session();
        let (tx, mut rx) = oneshot::channel();
        session.handle(Event::Orders(vec![OrderOp::Cancel { id: "1".to_string() }], tx));
        assert!(matches!(rx.try_recv().unwrap(), Err(Error::Unsupported(_))));
    }

    #[tokio::test]
    async fn dropped_socket_waits_for_reconnect() {
        let (events, _events) = mpsc::unbounded_channel();
        let mut session = Session::new(
            KrakenProtocol::default(),
            Arc::new(StubRest::default()),
            ConnectionConfig::default(),
            events,
            CancellationToken::new(),
        );
        session.handle(Event::Open(OpenOptions::default()));
        assert!(!session.auto_reconnect());

        let generation = session.generation();
        let socket = RecordingSocket::default();
        session.handle(Event::Socket(generation, SocketEvent::Attached(Box::new(socket.clone()))));
        session.handle(Event::Socket(generation, SocketEvent::Connected));
        session.handle(Event::Socket(generation, SocketEvent::Disconnected));
        assert!(!session.is_connected());

        let (tx, _rx) = oneshot::channel();
        session.handle(Event::Subscribe(
            ChannelDescriptor::ticker(market(Exchange::Kraken, "XBT/USD")),
            tx,
        ));
        assert!(socket.sent().is_empty());

        session.handle(Event::Reconnect);
        assert!(session.generation() > generation);
        assert!(socket.closed());
        assert!(!session.auto_reconnect());
        session.close();
    }
}
