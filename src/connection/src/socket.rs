use crate::session::{Event, SocketEvent};
use async_trait::async_trait;
use ezsockets::client::ClientCloseMode;
use ezsockets::{ClientConfig, ClientExt, Error, WSError};
use tokio::select;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};
use xf_types::{Exchange, OpenOptions};

/// The outbound half of a live socket, as seen by the session.
pub trait Socket: Send {
    fn send(&self, text: String) -> xf_types::Result<()>;

    fn close(&self);
}

struct EzSocket {
    exchange: Exchange,
    handle: ezsockets::Client<WebSocketClient>,
}

impl Socket for EzSocket {
    fn send(&self, text: String) -> xf_types::Result<()> {
        trace!("{}: Sending message: {text}", self.exchange);
        self.handle
            .text(text)
            .map(|_| ())
            .map_err(|e| xf_types::Error::Transport(e.to_string()))
    }

    fn close(&self) {
        if let Err(error) = self.handle.close(None) {
            trace!("{}: Close on a finished socket: {error}", self.exchange);
        }
    }
}

struct WebSocketClient {
    exchange: Exchange,
    generation: u64,
    events: UnboundedSender<Event>,
    reconnect: bool,
}

impl WebSocketClient {
    fn forward(&self, event: SocketEvent) {
        let _ = self.events.send(Event::Socket(self.generation, event));
    }

    fn close_mode(&self) -> ClientCloseMode {
        if self.reconnect {
            ClientCloseMode::Reconnect
        } else {
            ClientCloseMode::Close
        }
    }
}

#[async_trait]
impl ClientExt for WebSocketClient {
    type Call = ();

    async fn on_text(&mut self, text: String) -> Result<(), Error> {
        trace!("{}: Received text: {text}", self.exchange);
        self.forward(SocketEvent::Text(text));
        Ok(())
    }

    async fn on_binary(&mut self, bytes: Vec<u8>) -> Result<(), Error> {
        trace!("{}: Ignoring {} binary bytes", self.exchange, bytes.len());
        Ok(())
    }

    async fn on_call(&mut self, _: Self::Call) -> Result<(), Error> {
        Ok(())
    }

    async fn on_connect(&mut self) -> Result<(), Error> {
        info!("{}: Connected", self.exchange);
        self.forward(SocketEvent::Connected);
        Ok(())
    }

    async fn on_disconnect(&mut self) -> Result<ClientCloseMode, Error> {
        info!("{}: Disconnected", self.exchange);
        self.forward(SocketEvent::Disconnected);
        Ok(self.close_mode())
    }

    async fn on_connect_fail(&mut self, error: WSError) -> Result<ClientCloseMode, Error> {
        error!("{}: Failed to connect: {error:?}", self.exchange);
        self.forward(SocketEvent::Failed(error.to_string()));
        Ok(self.close_mode())
    }
}

/// Connects in the background. Every callback is tagged with `generation` so the
/// session can discard events from a socket it has already replaced.
pub(crate) fn open(
    exchange: Exchange,
    url: &str,
    generation: u64,
    options: &OpenOptions,
    events: UnboundedSender<Event>,
    cancellation_token: CancellationToken,
) {
    let config = ClientConfig::new(url).reconnect_interval(options.reconnect_delay);
    let reconnect = options.auto_reconnect;

    tokio::spawn(async move {
        let client_events = events.clone();
        let (handle, future) = ezsockets::connect(
            |_| WebSocketClient {
                exchange,
                generation,
                events: client_events,
                reconnect,
            },
            config,
        )
        .await;

        let socket = EzSocket {
            exchange,
            handle: handle.clone(),
        };
        let _ = events.send(Event::Socket(
            generation,
            SocketEvent::Attached(Box::new(socket)),
        ));

        select! {
            result = future => {
                if let Err(error) = result {
                    error!("{exchange}: Socket stopped: {error}");
                    let _ = events.send(Event::Socket(generation, SocketEvent::Failed(error.to_string())));
                }
            }
            _ = cancellation_token.cancelled() => {
                let _ = handle.close(None);
            }
        }

        info!("{exchange}: Socket task finished");
    });
}
