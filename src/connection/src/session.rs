use crate::book::OrderBook;
use crate::config::ConnectionConfig;
use crate::cursor::{recent_candles, TradeCursor};
use crate::poller::{self, PollData};
use crate::protocol::{Inbound, Protocol, Update};
use crate::registry::{Lookup, Registry, Reply};
use crate::socket::{self, Socket};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::select;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use xf_types::{
    ChannelDescriptor, ChannelId, ChannelKey, DataListener, Error, MarketDataRest, OpenOptions,
    OrderOp, Payload, Result,
};

/// Everything that can change the state of a connection.
pub enum Event {
    Subscribe(ChannelDescriptor, Reply),
    Unsubscribe(ChannelDescriptor, oneshot::Sender<Result<ChannelId>>),
    OnData(DataListener),
    Open(OpenOptions),
    Close,
    Reconnect,
    Orders(Vec<OrderOp>, oneshot::Sender<Result<()>>),
    /// Tagged with the generation of the socket that produced it.
    Socket(u64, SocketEvent),
    Poll(ChannelId, Result<PollData>),
}

pub enum SocketEvent {
    Attached(Box<dyn Socket>),
    Connected,
    Text(String),
    Disconnected,
    Failed(String),
}

/// The single owner of a connection's state. Runs as one task and applies events
/// in arrival order.
pub struct Session<P> {
    protocol: P,
    config: ConnectionConfig,
    rest: Arc<dyn MarketDataRest>,
    events: UnboundedSender<Event>,
    cancellation_token: CancellationToken,
    registry: Registry,
    books: HashMap<ChannelId, OrderBook>,
    cursors: HashMap<ChannelId, TradeCursor>,
    pollers: HashMap<ChannelId, CancellationToken>,
    next_poll_id: u64,
    healing: HashSet<ChannelId>,
    listeners: Vec<DataListener>,
    socket: Option<Box<dyn Socket>>,
    socket_token: Option<CancellationToken>,
    generation: u64,
    connected: bool,
    authenticated: bool,
    options: Option<OpenOptions>,
    buffer: Vec<String>,
}

impl<P: Protocol> Session<P> {
    pub fn new(
        protocol: P,
        rest: Arc<dyn MarketDataRest>,
        config: ConnectionConfig,
        events: UnboundedSender<Event>,
        cancellation_token: CancellationToken,
    ) -> Session<P> {
        Session {
            protocol,
            config,
            rest,
            events,
            cancellation_token,
            registry: Registry::default(),
            books: HashMap::new(),
            cursors: HashMap::new(),
            pollers: HashMap::new(),
            next_poll_id: 0,
            healing: HashSet::new(),
            listeners: Vec::new(),
            socket: None,
            socket_token: None,
            generation: 0,
            connected: false,
            authenticated: false,
            options: None,
            buffer: Vec::new(),
        }
    }

    /// Socket events carrying any other generation are dropped.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Whether the open socket reconnects by itself after a drop.
    pub fn auto_reconnect(&self) -> bool {
        self.options.as_ref().is_some_and(|o| o.auto_reconnect)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub async fn run(mut self, mut events: UnboundedReceiver<Event>) {
        let exchange = self.protocol.exchange();
        let cancellation_token = self.cancellation_token.clone();
        let mut flush = tokio::time::interval(self.config.book_flush_interval());
        flush.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("{exchange}: Session started");
        loop {
            select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                _ = flush.tick() => self.flush_books(Instant::now()),
                _ = cancellation_token.cancelled() => break,
            }
        }

        self.close();
        info!("{exchange}: Session stopped");
    }

    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Subscribe(descriptor, reply) => self.subscribe(descriptor, reply),
            Event::Unsubscribe(descriptor, reply) => {
                let _ = reply.send(self.unsubscribe(&descriptor));
            }
            Event::OnData(listener) => self.listeners.push(listener),
            Event::Open(options) => self.open(options),
            Event::Close => self.close(),
            Event::Reconnect => self.reconnect(),
            Event::Orders(ops, reply) => {
                let _ = reply.send(self.submit_orders(&ops));
            }
            Event::Socket(generation, event) if generation == self.generation => {
                self.handle_socket(event)
            }
            Event::Socket(generation, _) => {
                trace!(
                    "{}: Dropping event from replaced socket {generation}",
                    self.protocol.exchange()
                );
            }
            Event::Poll(id, result) => self.handle_poll(id, result),
        }
    }

    fn subscribe(&mut self, descriptor: ChannelDescriptor, reply: Reply) {
        let key = descriptor.key();
        match self.registry.lookup(&key) {
            Lookup::Subscribed(id) => {
                let _ = reply.send(Ok(id));
                return;
            }
            Lookup::Pending => {
                self.registry.join(&key, reply);
                return;
            }
            Lookup::Absent => {}
        }

        if descriptor.market().exchange != self.protocol.exchange() {
            let _ = reply.send(Err(Error::UnknownChannelType(format!(
                "{} market on a {} connection",
                descriptor.market().exchange,
                self.protocol.exchange()
            ))));
            return;
        }

        let packet = match self.protocol.subscribe_packet(&descriptor) {
            Ok(packet) => packet,
            Err(error) => {
                let _ = reply.send(Err(error));
                return;
            }
        };

        if self.config.rest_only || !self.protocol.streams(descriptor.kind()) {
            let id = self.start_poller(key, descriptor);
            let _ = reply.send(Ok(id));
            return;
        }

        debug!("{}: Subscribing {key}", self.protocol.exchange());
        self.registry.begin(key, descriptor, reply);
        self.send(packet);
    }

    fn unsubscribe(&mut self, descriptor: &ChannelDescriptor) -> Result<ChannelId> {
        let key = descriptor.key();
        let (id, meta) = self
            .registry
            .remove(&key)
            .ok_or_else(|| Error::NotSubscribed(key.to_string()))?;

        if id.is_poll() {
            self.stop_poller(&id);
        } else if meta.is_some() {
            if let Some(packet) = self.protocol.unsubscribe_packet(&id, Some(descriptor)) {
                self.send(packet);
            }
        }
        self.books.remove(&id);
        self.cursors.remove(&id);

        debug!("{}: Unsubscribed {key} ({id})", self.protocol.exchange());
        Ok(id)
    }

    fn start_poller(&mut self, key: ChannelKey, descriptor: ChannelDescriptor) -> ChannelId {
        self.next_poll_id += 1;
        let id = ChannelId::Poll(self.next_poll_id);
        let cancellation_token = self.cancellation_token.child_token();

        poller::spawn(
            id.clone(),
            descriptor.clone(),
            self.rest.clone(),
            self.config.poll_period(),
            self.events.clone(),
            cancellation_token.clone(),
        );

        info!("{}: Polling {key} as {id}", self.protocol.exchange());
        self.pollers.insert(id.clone(), cancellation_token);
        self.registry.insert(key, id.clone(), descriptor);
        id
    }

    fn stop_poller(&mut self, id: &ChannelId) {
        if let Some(cancellation_token) = self.pollers.remove(id) {
            cancellation_token.cancel();
        }
    }

    fn submit_orders(&mut self, ops: &[OrderOp]) -> Result<()> {
        let packets = self.protocol.order_packets(ops)?;
        if !self.authenticated {
            return Err(Error::NotAuthenticated);
        }
        let socket = self.socket.as_ref().ok_or(Error::ConnectionClosed)?;
        for packet in packets {
            socket.send(packet)?;
        }
        Ok(())
    }

    fn handle_socket(&mut self, event: SocketEvent) {
        let exchange = self.protocol.exchange();
        match event {
            SocketEvent::Attached(socket) => {
                self.socket = Some(socket);
                if self.connected {
                    self.on_ready();
                }
            }
            SocketEvent::Connected => {
                self.connected = true;
                if self.socket.is_some() {
                    self.on_ready();
                }
            }
            SocketEvent::Text(text) => self.handle_text(&text, Instant::now()),
            SocketEvent::Disconnected => {
                info!("{exchange}: Socket dropped, invalidating channels");
                self.connected = false;
                self.authenticated = false;
                self.invalidate_socket_channels();
            }
            SocketEvent::Failed(reason) => {
                error!("{exchange}: {}", Error::Transport(reason));
                self.connected = false;
                self.authenticated = false;
            }
        }
    }

    /// Runs once per established connection: authenticate, then flush what was
    /// queued while the socket was down.
    fn on_ready(&mut self) {
        let exchange = self.protocol.exchange();
        let credentials = self.options.as_ref().and_then(|o| o.credentials.clone());
        if let Some(credentials) = credentials {
            match self.protocol.auth_packet(&credentials) {
                Ok(Some(packet)) => self.send(packet),
                Ok(None) => {}
                Err(error) => error!("{exchange}: Failed to build auth packet: {error}"),
            }
        }

        let buffered = std::mem::take(&mut self.buffer);
        if !buffered.is_empty() {
            debug!("{exchange}: Flushing {} buffered packets", buffered.len());
        }
        for packet in buffered {
            self.send(packet);
        }
    }

    fn send(&mut self, packet: String) {
        if self.connected {
            if let Some(socket) = &self.socket {
                match socket.send(packet.clone()) {
                    Ok(()) => return,
                    Err(error) => warn!("{}: {error}", self.protocol.exchange()),
                }
            }
        }
        trace!("{}: Buffering {packet}", self.protocol.exchange());
        self.buffer.push(packet);
    }

    pub fn handle_text(&mut self, text: &str, now: Instant) {
        let exchange = self.protocol.exchange();
        let inbound = match self.protocol.decode(text) {
            Ok(inbound) => inbound,
            Err(error) => {
                warn!("{exchange}: {error}");
                return;
            }
        };

        match inbound {
            Inbound::Heartbeat => trace!("{exchange}: Heartbeat"),
            Inbound::Subscribed { ack, id } => {
                let protocol = &self.protocol;
                match self.registry.find_pending(|d| protocol.matches_ack(&ack, d)) {
                    Some(key) => {
                        debug!("{exchange}: Subscribed {key} as {id}");
                        self.healing.remove(&id);
                        self.registry.commit(&key, id);
                    }
                    None => warn!("{exchange}: Ack for {id} matches no pending request"),
                }
            }
            Inbound::Rejected { ack, reason } => {
                let protocol = &self.protocol;
                let key = ack.and_then(|ack| {
                    self.registry
                        .find_pending(|d| protocol.matches_ack(&ack, d))
                });
                match key {
                    Some(key) => {
                        warn!("{exchange}: Subscription {key} rejected: {reason}");
                        self.registry.reject(&key, &reason);
                    }
                    None => warn!("{exchange}: Error event: {reason}"),
                }
            }
            Inbound::Unsubscribed { id } => {
                debug!("{exchange}: Channel {id} unsubscribed");
                self.healing.remove(&id);
            }
            Inbound::Data { id, data } => self.handle_data(id, data, now),
            Inbound::Account { id, payloads } => {
                for payload in payloads {
                    self.emit(&id, &payload);
                }
            }
            Inbound::Authenticated => {
                info!("{exchange}: Authenticated");
                self.authenticated = true;
            }
            Inbound::AuthFailed(reason) => {
                error!("{exchange}: Authentication failed: {reason}");
                self.authenticated = false;
            }
            Inbound::Info(message) => debug!("{exchange}: {message}"),
        }
    }

    fn handle_data(&mut self, id: ChannelId, data: Value, now: Instant) {
        let exchange = self.protocol.exchange();
        let Some(meta) = self.registry.meta(&id) else {
            self.heal(id);
            return;
        };

        match self.protocol.transform(&meta.descriptor, data) {
            Ok(Update::Payload(payload)) => self.emit(&id, &payload),
            Ok(Update::Book(update)) => {
                let window = self.config.book_throttle;
                let book = self
                    .books
                    .entry(id.clone())
                    .or_insert_with(|| OrderBook::new(window));
                if book.apply(update, now) {
                    let payload = Payload::Book(book.levels().to_vec());
                    self.emit(&id, &payload);
                }
            }
            Ok(Update::Ignore) => trace!("{exchange}: Ignoring update on {id}"),
            Err(error) => warn!("{exchange}: Dropping message on {id}: {error}"),
        }
    }

    /// One unsubscribe per stray channel id until the exchange confirms it.
    fn heal(&mut self, id: ChannelId) {
        let exchange = self.protocol.exchange();
        let error = Error::UnknownChannelData(id.clone());
        if !self.healing.insert(id.clone()) {
            debug!("{exchange}: {error}, unsubscribe already sent");
            return;
        }

        warn!("{exchange}: {error}, unsubscribing");
        if let Some(packet) = self.protocol.unsubscribe_packet(&id, None) {
            self.send(packet);
        }
    }

    pub fn flush_books(&mut self, now: Instant) {
        let due: Vec<(ChannelId, Payload)> = self
            .books
            .iter_mut()
            .filter_map(|(id, book)| {
                book.take_due(now)
                    .then(|| (id.clone(), Payload::Book(book.levels().to_vec())))
            })
            .collect();

        for (id, payload) in due {
            self.emit(&id, &payload);
        }
    }

    fn handle_poll(&mut self, id: ChannelId, result: Result<PollData>) {
        let exchange = self.protocol.exchange();
        if !self.pollers.contains_key(&id) {
            trace!("{exchange}: Dropping result of stopped poller {id}");
            return;
        }

        let payload = match result {
            Ok(PollData::Ticker(ticker)) => Payload::Ticker(ticker),
            Ok(PollData::Trades(trades)) => {
                let fresh = self.cursors.entry(id.clone()).or_default().advance(trades);
                if fresh.is_empty() {
                    return;
                }
                Payload::Trades(fresh)
            }
            Ok(PollData::Candles(candles)) => {
                let recent = recent_candles(candles);
                if recent.is_empty() {
                    return;
                }
                Payload::Candles(recent)
            }
            Ok(PollData::Book(levels)) => Payload::Book(levels),
            Err(error) => {
                let error = Error::PollFailure {
                    channel: id,
                    reason: error.to_string(),
                };
                warn!("{exchange}: {error}");
                return;
            }
        };
        self.emit(&id, &payload);
    }

    fn emit(&self, id: &ChannelId, payload: &Payload) {
        for listener in &self.listeners {
            listener(id, payload);
        }
    }

    fn open(&mut self, options: OpenOptions) {
        let exchange = self.protocol.exchange();
        let options = OpenOptions {
            auto_reconnect: options.auto_reconnect && self.protocol.auto_reconnect(),
            ..options
        };
        if self.socket_token.is_some() || self.socket.is_some() {
            self.teardown_socket();
            self.invalidate_socket_channels();
        }

        self.generation += 1;
        let cancellation_token = self.cancellation_token.child_token();
        socket::open(
            exchange,
            self.protocol.url(),
            self.generation,
            &options,
            self.events.clone(),
            cancellation_token.clone(),
        );

        info!("{exchange}: Opening {}", self.protocol.url());
        self.socket_token = Some(cancellation_token);
        self.options = Some(options);
    }

    fn reconnect(&mut self) {
        match self.options.clone() {
            Some(options) => {
                info!("{}: Reconnecting", self.protocol.exchange());
                self.open(options);
            }
            None => warn!("{}: Reconnect requested before open", self.protocol.exchange()),
        }
    }

    /// Stops the transport and forgets every live channel. Subscription keys stay
    /// registered and are re-subscribed on demand.
    pub fn close(&mut self) {
        self.teardown_socket();
        self.registry.drop_pending();
        self.registry.drop_channels(|_| true);
        self.books.clear();
        self.cursors.clear();
        self.healing.clear();
        for (_, cancellation_token) in self.pollers.drain() {
            cancellation_token.cancel();
        }
        info!("{}: Closed", self.protocol.exchange());
    }

    fn teardown_socket(&mut self) {
        self.generation += 1;
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
        if let Some(cancellation_token) = self.socket_token.take() {
            cancellation_token.cancel();
        }
        self.connected = false;
        self.authenticated = false;
        self.buffer.clear();
    }

    fn invalidate_socket_channels(&mut self) {
        self.registry.drop_pending();
        self.buffer.clear();
        self.healing.clear();
        for id in self.registry.drop_channels(|id| !id.is_poll()) {
            self.books.remove(&id);
        }
    }
}
