use crate::config::ConnectionConfig;
use crate::protocol::Protocol;
use crate::session::{Event, Session};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use xf_types::{
    ChannelDescriptor, ChannelId, DataListener, Error, Exchange, ExchangeConnection,
    MarketDataRest, MarketRef, NewOrder, OpenOptions, OrderOp, Result,
};

/// Handle to one exchange session. Cheap to share behind an `Arc`; every call is
/// queued to the session task.
pub struct Connection {
    exchange: Exchange,
    events: UnboundedSender<Event>,
    rest: Arc<dyn MarketDataRest>,
}

impl Connection {
    /// Spawns the session. Must be called from within a tokio runtime.
    pub fn new<P: Protocol>(
        protocol: P,
        rest: Arc<dyn MarketDataRest>,
        config: ConnectionConfig,
        cancellation_token: CancellationToken,
    ) -> Connection {
        let exchange = protocol.exchange();
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Session::new(
            protocol,
            rest.clone(),
            config,
            events.clone(),
            cancellation_token,
        );
        tokio::spawn(session.run(receiver));

        Connection {
            exchange,
            events,
            rest,
        }
    }

    fn send(&self, event: Event) -> Result<()> {
        self.events.send(event).map_err(|_| Error::ConnectionClosed)
    }

    async fn orders(&self, ops: Vec<OrderOp>) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Event::Orders(ops, reply))?;
        response.await.map_err(|_| Error::ConnectionClosed)?
    }
}

#[async_trait]
impl ExchangeConnection for Connection {
    fn exchange(&self) -> Exchange {
        self.exchange
    }

    fn open_ws(&self, options: OpenOptions) -> Result<()> {
        self.send(Event::Open(options))
    }

    async fn subscribe(&self, descriptor: ChannelDescriptor) -> Result<ChannelId> {
        let (reply, response) = oneshot::channel();
        self.send(Event::Subscribe(descriptor, reply))?;
        response.await.map_err(|_| Error::ConnectionClosed)?
    }

    async fn unsubscribe(&self, descriptor: ChannelDescriptor) -> Result<ChannelId> {
        let (reply, response) = oneshot::channel();
        self.send(Event::Unsubscribe(descriptor, reply))?;
        response.await.map_err(|_| Error::ConnectionClosed)?
    }

    fn on_data(&self, listener: DataListener) -> Result<()> {
        self.send(Event::OnData(listener))
    }

    fn close(&self) -> Result<()> {
        self.send(Event::Close)
    }

    fn reconnect(&self) -> Result<()> {
        self.send(Event::Reconnect)
    }

    async fn get_markets(&self) -> Result<Vec<MarketRef>> {
        self.rest.markets().await
    }

    async fn submit_order(&self, order: NewOrder) -> Result<()> {
        self.orders(vec![OrderOp::Submit(order)]).await
    }

    async fn cancel_order(&self, id: String) -> Result<()> {
        self.orders(vec![OrderOp::Cancel { id }]).await
    }

    async fn submit_order_multi_op(&self, ops: Vec<OrderOp>) -> Result<()> {
        self.orders(ops).await
    }
}
