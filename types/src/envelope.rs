//! Control messages exchanged with the media server.

use crate::ids::{ObjectId, SubscriptionToken};
use crate::value::ParamMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Requests
// ============================================================================

/// One operation call on a server-side object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invocation {
    pub target: ObjectId,
    pub operation: String,
    #[serde(rename = "operationParams", skip_serializing_if = "Option::is_none")]
    pub operation_params: Option<ParamMap>,
}

impl Invocation {
    /// Build an invocation; an empty parameter map is left out of the message.
    pub fn new(target: ObjectId, operation: impl Into<String>, params: ParamMap) -> Self {
        Self {
            target,
            operation: operation.into(),
            operation_params: if params.is_empty() { None } else { Some(params) },
        }
    }
}

/// Control message emitted towards the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum Request {
    Create {
        #[serde(rename = "type")]
        type_name: String,
        #[serde(rename = "constructorParams")]
        constructor_params: ParamMap,
    },
    Invoke(Invocation),
    Subscribe {
        target: ObjectId,
        #[serde(rename = "type")]
        kind: String,
    },
    Unsubscribe {
        target: ObjectId,
        token: SubscriptionToken,
    },
    Release {
        target: ObjectId,
    },
    InvokeBatch {
        operations: Vec<Invocation>,
    },
}

impl Request {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Invoke(_) => "invoke",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Release { .. } => "release",
            Self::InvokeBatch { .. } => "invokeBatch",
        }
    }

    /// Object the message is addressed to, if it has exactly one.
    pub fn target(&self) -> Option<&ObjectId> {
        match self {
            Self::Invoke(invocation) => Some(&invocation.target),
            Self::Subscribe { target, .. }
            | Self::Unsubscribe { target, .. }
            | Self::Release { target } => Some(target),
            Self::Create { .. } | Self::InvokeBatch { .. } => None,
        }
    }
}

// ============================================================================
// Replies
// ============================================================================

/// Successful reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    /// Reply to `subscribe`.
    Token { token: SubscriptionToken },
    /// Reply to `invokeBatch`: one entry per operation, in order.
    Values { values: Vec<Option<serde_json::Value>> },
    /// Reply to everything else; no value for `release`/`unsubscribe` and for
    /// operations returning nothing.
    Value {
        #[serde(default)]
        value: Option<serde_json::Value>,
    },
}

impl Reply {
    pub fn empty() -> Self {
        Self::Value { value: None }
    }

    pub fn value(value: serde_json::Value) -> Self {
        Self::Value { value: Some(value) }
    }

    pub fn token(token: impl Into<String>) -> Self {
        Self::Token {
            token: SubscriptionToken::new(token),
        }
    }

    pub fn values(values: Vec<Option<serde_json::Value>>) -> Self {
        Self::Values { values }
    }
}

/// Failure reported by the server for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ServerError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for ServerError {}
