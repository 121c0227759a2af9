use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

use comms::{ClientId, ShapeMismatchErr, msg::ErrorKind};

/// Errors the round coordinator reports back to it's callers.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorErr {
    /// The client never registered.
    UnregisteredClient(ClientId),
    /// The submitted weights don't match the global model's shape signature.
    ShapeMismatch {
        client_id: ClientId,
        source: ShapeMismatchErr,
    },
    /// Aggregation was requested on a round with no submissions.
    EmptyAggregation { round: u64 },
    /// The round holds submissions of different shapes, which the per submission check rules out.
    InconsistentRound {
        round: u64,
        source: ShapeMismatchErr,
    },
}

impl CoordinatorErr {
    /// The wire kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnregisteredClient(_) => ErrorKind::UnregisteredClient,
            Self::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            Self::EmptyAggregation { .. } => ErrorKind::EmptyAggregation,
            Self::InconsistentRound { .. } => ErrorKind::Internal,
        }
    }
}

impl Display for CoordinatorErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnregisteredClient(client_id) => {
                write!(f, "client {client_id} is not registered")
            }
            Self::ShapeMismatch { client_id, source } => {
                write!(f, "update from client {client_id} rejected: {source}")
            }
            Self::EmptyAggregation { round } => {
                write!(f, "round {round} has no submissions to aggregate")
            }
            Self::InconsistentRound { round, source } => {
                write!(f, "round {round} holds submissions of different shapes: {source}")
            }
        }
    }
}

impl Error for CoordinatorErr {}

/// Errors loading or validating the coordinator's configuration.
#[derive(Debug)]
pub enum ConfigErr {
    Io { path: PathBuf, source: io::Error },
    Parse(serde_json::Error),
    Invalid(String),
}

impl From<serde_json::Error> for ConfigErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            Self::Parse(e) => write!(f, "failed to parse config: {e}"),
            Self::Invalid(reason) => write!(f, "invalid config: {reason}"),
        }
    }
}

impl Error for ConfigErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(e) => Some(e),
            Self::Invalid(_) => None,
        }
    }
}
