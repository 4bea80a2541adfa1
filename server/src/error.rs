//! Error types shared by the server modules.

use chat_shared::{no_such_nickname, SELF_MESSAGE};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the server process itself or of one session's transport.
///
/// Bind, config and accept failures are fatal for the whole server. The
/// remaining variants only ever end the session that produced them.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("listener failed: {0}")]
    Accept(#[source] io::Error),

    #[error("received bytes are not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Outcome of a private message that could not be delivered.
///
/// The display text is exactly what the sender gets back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("{}", SELF_MESSAGE)]
    ToSelf,

    #[error("{}", no_such_nickname(.0))]
    NoSuchNickname(String),

    #[error("sender is no longer registered")]
    UnknownSender,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("delay of {0} minutes is out of range")]
    OutOfRange(u64),
}
