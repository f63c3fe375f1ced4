//! Error types for the client runtime.

use rom_types::{ObjectId, ServerError};
use thiserror::Error;

/// A parameter rejected before any message was built.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Operation {operation} is not declared by {entity}")]
    UnknownOperation { entity: String, operation: String },

    #[error("Unexpected parameter {param} for {operation}")]
    UnknownParam { operation: String, param: String },

    #[error("Missing required parameter {param}")]
    MissingParam { param: String },

    #[error("{param} param should be {expected}, not {actual}")]
    WrongKind {
        param: String,
        expected: String,
        actual: String,
    },

    #[error("{param} value {value} is outside [{min}, {max}]")]
    OutOfRange {
        param: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("{param} value {value:?} is not a member of {enumeration}")]
    NotInEnum {
        param: String,
        enumeration: String,
        value: String,
    },

    #[error("{param} param should be a {capability}, not a {actual}")]
    MissingCapability {
        param: String,
        capability: String,
        actual: String,
    },
}

impl ValidationError {
    /// Name of the offending parameter, if the error concerns one.
    pub fn param(&self) -> Option<&str> {
        match self {
            Self::UnknownOperation { .. } => None,
            Self::UnknownParam { param, .. }
            | Self::MissingParam { param }
            | Self::WrongKind { param, .. }
            | Self::OutOfRange { param, .. }
            | Self::NotInEnum { param, .. }
            | Self::MissingCapability { param, .. } => Some(param),
        }
    }
}

/// Which subscription control message failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

impl std::fmt::Display for SubscriptionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subscribe => write!(f, "subscribe"),
            Self::Unsubscribe => write!(f, "unsubscribe"),
        }
    }
}

/// Failure reported by the transport layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Server error: {0}")]
    Server(ServerError),

    #[error("Transport closed: {0}")]
    Closed(String),
}

/// Errors surfaced by proxies, transactions and the session.
///
/// Cloneable so a single batch failure can reject every outcome of the batch
/// with the same error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("Invalid arguments: {0}")]
    Validation(#[from] ValidationError),

    #[error("Remote invocation of {operation} failed: {error}")]
    RemoteInvocation {
        operation: String,
        error: ServerError,
    },

    #[error("Object {id} has been released")]
    ObjectReleased { id: ObjectId },

    #[error("Transaction is already committed or discarded")]
    TransactionClosed,

    #[error("Transaction was discarded")]
    TransactionDiscarded,

    #[error("Failed to {action} {kind}: {error}")]
    Subscription {
        kind: String,
        action: SubscriptionAction,
        error: TransportError,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected reply: {0}")]
    Protocol(String),

    #[error("Operation was abandoned before completing")]
    Abandoned,
}

impl ClientError {
    /// Map a transport failure of `operation` into a client error.
    pub(crate) fn from_transport(operation: &str, error: TransportError) -> Self {
        match error {
            TransportError::Server(error) => Self::RemoteInvocation {
                operation: operation.to_string(),
                error,
            },
            TransportError::Closed(reason) => Self::Transport(reason),
        }
    }

    /// Map a failed subscribe/unsubscribe into a client error. The event
    /// kind and action are kept whatever the cause.
    pub(crate) fn from_subscription(
        kind: &str,
        action: SubscriptionAction,
        error: TransportError,
    ) -> Self {
        Self::Subscription {
            kind: kind.to_string(),
            action,
            error,
        }
    }

    /// Failure for work that needs a tokio runtime when none is running.
    pub(crate) fn no_runtime() -> Self {
        Self::Transport(NO_RUNTIME.to_string())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub(crate) const NO_RUNTIME: &str = "no async runtime to send request";

pub type Result<T> = std::result::Result<T, ClientError>;
