use std::{
    error::Error,
    fmt::{self, Display},
};

use comms::msg::ErrorKind;

use crate::{dataset::DatasetErr, trainer::TrainerErr};

/// Failures talking to the coordinator.
///
/// Network failures and error statuses are transient, the round is skipped. A successful
/// answer that can't be decoded is not.
#[derive(Debug)]
pub enum TransportErr {
    /// The request couldn't be sent or it's response couldn't be read.
    Http(reqwest::Error),
    /// The coordinator answered with a non success status.
    Status {
        status: u16,
        kind: Option<ErrorKind>,
        message: String,
    },
    /// The coordinator answered with a success status and a body we don't understand.
    Decode(serde_json::Error),
}

impl TransportErr {
    /// Whether the session may skip the round and carry on.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

impl From<reqwest::Error> for TransportErr {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

impl From<serde_json::Error> for TransportErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value)
    }
}

impl Display for TransportErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "http error: {e}"),
            Self::Status {
                status,
                kind: Some(kind),
                message,
            } => write!(f, "coordinator answered {status} ({kind:?}): {message}"),
            Self::Status {
                status, message, ..
            } => write!(f, "coordinator answered {status}: {message}"),
            Self::Decode(e) => write!(f, "unexpected answer from the coordinator: {e}"),
        }
    }
}

impl Error for TransportErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            Self::Status { .. } => None,
            Self::Decode(e) => Some(e),
        }
    }
}

/// Failures that end a client session.
#[derive(Debug)]
pub enum ClientErr {
    /// The local model or dataset couldn't be set up.
    Initialization(String),
    /// The coordinator couldn't be reached to register.
    Registration(TransportErr),
    Trainer(TrainerErr),
    Transport(TransportErr),
}

impl ClientErr {
    /// The process exit code this error maps to.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Registration(_) => 2,
            _ => 1,
        }
    }
}

impl From<TrainerErr> for ClientErr {
    fn from(value: TrainerErr) -> Self {
        Self::Trainer(value)
    }
}

impl From<DatasetErr> for ClientErr {
    fn from(value: DatasetErr) -> Self {
        Self::Initialization(value.to_string())
    }
}

impl Display for ClientErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialization(e) => write!(f, "failed to initialize: {e}"),
            Self::Registration(e) => write!(f, "failed to register with the coordinator: {e}"),
            Self::Trainer(e) => write!(f, "local training failed: {e}"),
            Self::Transport(e) => e.fmt(f),
        }
    }
}

impl Error for ClientErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Initialization(_) => None,
            Self::Registration(e) | Self::Transport(e) => Some(e),
            Self::Trainer(e) => Some(e),
        }
    }
}
