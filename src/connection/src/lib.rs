mod book;
mod config;
mod connection;
mod cursor;
mod poller;
mod protocol;
mod registry;
mod session;
mod socket;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use book::{classify_book, BookUpdate, OrderBook};
pub use config::ConnectionConfig;
pub use connection::Connection;
pub use cursor::{recent_candles, TradeCursor};
pub use poller::PollData;
pub use protocol::{Ack, Inbound, Protocol, Update};
pub use registry::{ChannelMeta, Lookup, Registry, Reply};
pub use session::{Event, Session, SocketEvent};
pub use socket::Socket;
