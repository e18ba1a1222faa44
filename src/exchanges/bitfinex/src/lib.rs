use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use xf_connection::{Connection, ConnectionConfig};
use xf_types::Result;

mod auth;
mod client;
mod protocol;
mod transform;

pub use client::BitfinexClient;
pub use protocol::BitfinexProtocol;

/// A Bitfinex connection backed by the public REST API for markets and polling.
pub fn connection(config: ConnectionConfig, cancellation_token: CancellationToken) -> Connection {
    Connection::new(
        BitfinexProtocol::default(),
        Arc::new(BitfinexClient::new()),
        config,
        cancellation_token,
    )
}

fn serialize_to_json<S: Serialize>(value: &S) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}
