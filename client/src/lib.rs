//! Client runtime for the rom remote object model.
//!
//! Server-side media objects are driven through local [`RemoteObject`]
//! proxies. Each call is validated against the object's
//! [`EntityDescriptor`] before a control message is built, and settles
//! exactly once through an [`Outcome`], which can be awaited or handed a
//! callback. Event listeners are multiplexed onto one server subscription
//! per event kind, and invocations can be batched in a [`Transaction`].
//!
//! The wire itself is out of scope: anything implementing [`Transport`]
//! can carry the messages. [`ChannelTransport`] is an in-process
//! implementation.

pub mod catalog;
pub mod config;
pub mod error;
pub mod gate;
pub mod logging;
pub mod outcome;
pub mod proxy;
pub mod session;
pub mod subscription;
pub mod transaction;
pub mod transport;

pub use config::ClientConfig;
pub use error::{ClientError, Result, SubscriptionAction, TransportError, ValidationError};
pub use outcome::Outcome;
pub use proxy::{ListenerId, NotificationStream, RemoteObject, Returned};
pub use session::Session;
pub use subscription::SubscriptionState;
pub use transaction::Transaction;
pub use transport::{ChannelTransport, PendingRequest, ServerEnd, Transport};

pub use rom_types::{
    params, ComplexValue, EntityDescriptor, Invocation, Notification, ObjectId, ObjectRef,
    OperationSpec, ParamMap, ParamSpec, ParamType, ParamValue, Reply, Request, ServerError,
    SubscriptionToken, RELEASE_EVENT, TRANSPORT_EVENT,
};
