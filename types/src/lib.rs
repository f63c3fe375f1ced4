//! Shared types for the rom remote object model.
//!
//! This crate contains the wire-level data model used between the client
//! runtime and any transport: identifiers, control message envelopes,
//! argument values and the schemas that describe entity kinds.

pub mod descriptor;
pub mod envelope;
pub mod ids;
pub mod notification;
pub mod schema;
pub mod value;

// Re-export commonly used types
pub use descriptor::EntityDescriptor;
pub use envelope::{Invocation, Reply, Request, ServerError};
pub use ids::{ObjectId, SubscriptionToken};
pub use notification::{is_reserved, Notification, RELEASE_EVENT, TRANSPORT_EVENT};
pub use schema::{OperationSpec, ParamSpec, ParamType};
pub use value::{ComplexValue, ObjectRef, ParamMap, ParamValue};
