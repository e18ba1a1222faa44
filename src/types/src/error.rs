use crate::ChannelId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown channel type: {0}")]
    UnknownChannelType(String),

    #[error("Not subscribed: {0}")]
    NotSubscribed(String),

    #[error("Data for unknown channel: {0}")]
    UnknownChannelData(ChannelId),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Poll failed for channel {channel}: {reason}")]
    PollFailure { channel: ChannelId, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Subscription rejected: {0}")]
    SubscribeRejected(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("REST error: {0}")]
    Rest(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::MalformedMessage(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
