//! Local handles to server-side objects.
//!
//! A [`RemoteObject`] turns every call into a control message for the server
//! and multiplexes local event listeners onto a single server subscription
//! per event kind.

use crate::error::{ClientError, SubscriptionAction, TransportError, NO_RUNTIME};
use crate::gate;
use crate::outcome::{deliver, Outcome};
use crate::session::SessionShared;
use crate::subscription::{Action, SubscriptionState, SubscriptionTable};
use crate::transaction::Transaction;
use futures::Stream;
use parking_lot::Mutex;
use rom_types::{
    is_reserved, EntityDescriptor, Invocation, ObjectId, ObjectRef, ParamMap, ParamType,
    ParamValue, Reply, Request, SubscriptionToken, RELEASE_EVENT, TRANSPORT_EVENT,
};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

/// Callback invoked with the payload of each delivered event.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle returned by [`RemoteObject::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Value produced by a successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Returned {
    /// Plain value returned by the server.
    Value(Value),
    /// Object reference returned by the server, resolved to a proxy.
    Object(RemoteObject),
    /// List of object references, each resolved to a proxy.
    Objects(Vec<RemoteObject>),
    /// No value was returned; the invoked object itself, for chaining.
    This(RemoteObject),
}

impl Returned {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The returned object, or the invoked object when nothing was returned.
    pub fn object(&self) -> Option<&RemoteObject> {
        match self {
            Self::Object(o) | Self::This(o) => Some(o),
            Self::Value(_) | Self::Objects(_) => None,
        }
    }

    pub fn objects(&self) -> Option<&[RemoteObject]> {
        match self {
            Self::Objects(list) => Some(list),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Live,
    Releasing,
    Released,
}

struct ObjectState {
    lifecycle: Lifecycle,
    listeners: HashMap<String, Vec<(ListenerId, Listener)>>,
    subscriptions: SubscriptionTable,
}

impl ObjectState {
    fn has_listeners(&self, kind: &str) -> bool {
        self.listeners.get(kind).is_some_and(|l| !l.is_empty())
    }
}

pub(crate) struct ObjectInner {
    id: ObjectId,
    descriptor: Arc<EntityDescriptor>,
    session: Weak<SessionShared>,
    state: Mutex<ObjectState>,
    errors: broadcast::Sender<ClientError>,
}

/// Handle to a server-side object. Clones share the same state.
#[derive(Clone)]
pub struct RemoteObject {
    inner: Arc<ObjectInner>,
}

impl RemoteObject {
    pub(crate) fn new(
        id: ObjectId,
        descriptor: Arc<EntityDescriptor>,
        session: Weak<SessionShared>,
        error_buffer: usize,
    ) -> Self {
        let (errors, _) = broadcast::channel(error_buffer.max(1));
        Self {
            inner: Arc::new(ObjectInner {
                id,
                descriptor,
                session,
                state: Mutex::new(ObjectState {
                    lifecycle: Lifecycle::Live,
                    listeners: HashMap::new(),
                    subscriptions: SubscriptionTable::new(),
                }),
                errors,
            }),
        }
    }

    pub fn id(&self) -> &ObjectId {
        &self.inner.id
    }

    pub fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.inner.descriptor
    }

    pub fn type_name(&self) -> &str {
        &self.inner.descriptor.name
    }

    pub fn implements(&self, capability: &str) -> bool {
        self.inner.descriptor.implements(capability)
    }

    pub fn is_released(&self) -> bool {
        self.inner.state.lock().lifecycle == Lifecycle::Released
    }

    /// Reference to this object for use as an operation argument.
    pub fn as_ref_value(&self) -> ObjectRef {
        self.inner.descriptor.object_ref(self.inner.id.clone())
    }

    fn session(&self) -> Result<Arc<SessionShared>, ClientError> {
        self.inner
            .session
            .upgrade()
            .ok_or_else(|| ClientError::Transport("session closed".to_string()))
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Invoke `operation` on the server.
    ///
    /// Arguments are validated first; a malformed call settles the outcome
    /// with [`ClientError::Validation`] right away and sends nothing. With a
    /// transaction, the call is queued and settles when the transaction
    /// commits.
    pub fn invoke(
        &self,
        transaction: Option<&Transaction>,
        operation: &str,
        params: ParamMap,
    ) -> Outcome<Returned> {
        let label = format!("{}.{}", self.type_name(), operation);

        if self.is_released() {
            return Outcome::failed(label, self.released_error());
        }

        let returns = match gate::check_operation(&self.inner.descriptor, operation, &params) {
            Ok(spec) => spec.and_then(|s| s.returns.clone()),
            Err(e) => {
                debug!("Rejected {} on {}: {}", operation, self.id(), e);
                return Outcome::failed(label, e.into());
            }
        };

        let invocation = Invocation::new(self.id().clone(), operation, params);

        if let Some(transaction) = transaction {
            return transaction.enqueue(self.clone(), invocation, returns, label);
        }

        if Handle::try_current().is_err() {
            return Outcome::failed(label, ClientError::no_runtime());
        }

        let request = Request::Invoke(invocation);
        self.emit_transport(&request);
        debug!("Invoking {} on {}", operation, self.id());

        let this = self.clone();
        let operation = operation.to_string();
        deliver(label, async move {
            let reply = this
                .send(request)
                .await
                .map_err(|e| ClientError::from_transport(&operation, e))?;
            match reply {
                Reply::Value { value } => Ok(this.returned(value, returns.as_ref())),
                other => Err(ClientError::Protocol(format!(
                    "unexpected reply to {}: {:?}",
                    operation, other
                ))),
            }
        })
    }

    /// Invoke an operation without arguments.
    pub fn call(&self, operation: &str) -> Outcome<Returned> {
        self.invoke(None, operation, ParamMap::new())
    }

    /// Map the server's value for a call on this object.
    pub(crate) fn returned(&self, value: Option<Value>, returns: Option<&ParamType>) -> Returned {
        let value = match value {
            None | Some(Value::Null) => return Returned::This(self.clone()),
            Some(value) => value,
        };
        let Some(session) = self.inner.session.upgrade() else {
            return Returned::Value(value);
        };

        match (value, returns) {
            (Value::String(id), Some(ParamType::Object { capability })) => {
                Returned::Object(SessionShared::resolve(&session, ObjectId::new(id), capability))
            }
            (Value::Array(items), Some(ParamType::List(inner))) => match inner.as_ref() {
                ParamType::Object { capability } if items.iter().all(Value::is_string) => {
                    let objects = items
                        .into_iter()
                        .filter_map(|item| match item {
                            Value::String(id) => Some(SessionShared::resolve(
                                &session,
                                ObjectId::new(id),
                                capability,
                            )),
                            _ => None,
                        })
                        .collect();
                    Returned::Objects(objects)
                }
                _ => Returned::Value(Value::Array(items)),
            },
            (value, _) => Returned::Value(value),
        }
    }

    async fn send(&self, request: Request) -> Result<Reply, TransportError> {
        let session = self
            .session()
            .map_err(|e| TransportError::Closed(e.to_string()))?;
        session.transport().send(request).await
    }

    fn released_error(&self) -> ClientError {
        ClientError::ObjectReleased {
            id: self.id().clone(),
        }
    }

    // ========================================================================
    // Release
    // ========================================================================

    /// Release the object on the server.
    ///
    /// On success every local listener is removed, subscriptions are
    /// forgotten without unsubscribing, and objects owned by this one are
    /// released locally as well (unless disabled in the configuration).
    pub fn release(&self) -> Outcome<()> {
        let label = format!("{}.release", self.type_name());

        {
            let mut state = self.inner.state.lock();
            if state.lifecycle != Lifecycle::Live {
                return Outcome::failed(label, self.released_error());
            }
            if Handle::try_current().is_err() {
                return Outcome::failed(label, ClientError::no_runtime());
            }
            state.lifecycle = Lifecycle::Releasing;
        }

        let request = Request::Release {
            target: self.id().clone(),
        };
        self.emit_transport(&request);
        debug!("Sending release for {}", self.id());

        let this = self.clone();
        deliver(label, async move {
            match this.send(request).await {
                Ok(_) => {
                    info!("Released {} {}", this.type_name(), this.id());
                    this.mark_released();
                    if let Some(session) = this.inner.session.upgrade() {
                        session.forget(this.id());
                    }
                    Ok(())
                }
                Err(e) => {
                    this.inner.state.lock().lifecycle = Lifecycle::Live;
                    Err(ClientError::from_transport("release", e))
                }
            }
        })
    }

    /// Local side of a release: notify `release` listeners, then drop every
    /// listener and subscription record.
    pub(crate) fn mark_released(&self) {
        let notify = {
            let mut state = self.inner.state.lock();
            if state.lifecycle == Lifecycle::Released {
                return;
            }
            state.lifecycle = Lifecycle::Released;
            let dropped = state.subscriptions.clear();
            if dropped > 0 {
                debug!("Dropped {} subscriptions of {}", dropped, self.id());
            }
            let notify: Vec<Listener> = state
                .listeners
                .get(RELEASE_EVENT)
                .map(|l| l.iter().map(|(_, f)| f.clone()).collect())
                .unwrap_or_default();
            state.listeners.clear();
            notify
        };

        for listener in notify {
            listener(&Value::Null);
        }
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Register a listener for events of `kind`.
    ///
    /// The first listener of a kind subscribes on the server in the
    /// background; a failure is published on [`RemoteObject::errors`].
    pub fn add_listener<F>(&self, kind: &str, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        let listener: Listener = Arc::new(listener);

        let action = {
            let mut state = self.inner.state.lock();
            if state.lifecycle == Lifecycle::Released {
                warn!("Ignoring {} listener on released object {}", kind, self.id());
                return id;
            }
            let first = !state.has_listeners(kind);
            state
                .listeners
                .entry(kind.to_string())
                .or_default()
                .push((id, listener));

            if first && !is_reserved(kind) {
                state.subscriptions.listeners_started(kind)
            } else {
                None
            }
        };

        if !is_reserved(kind)
            && !self.inner.descriptor.opaque
            && !self.inner.descriptor.declares_event(kind)
        {
            warn!("{} does not declare event {}", self.type_name(), kind);
        }

        if let Some(action) = action {
            self.perform(action);
        }
        id
    }

    /// Remove one listener. Returns whether it was registered.
    pub fn remove_listener(&self, kind: &str, id: ListenerId) -> bool {
        let action = {
            let mut state = self.inner.state.lock();
            let Some(list) = state.listeners.get_mut(kind) else {
                return false;
            };
            let before = list.len();
            list.retain(|(lid, _)| *lid != id);
            if list.len() == before {
                return false;
            }
            if !list.is_empty() {
                return true;
            }
            state.listeners.remove(kind);
            if is_reserved(kind) {
                None
            } else {
                state.subscriptions.listeners_stopped(kind)
            }
        };

        if let Some(action) = action {
            self.perform(action);
        }
        true
    }

    /// Remove every listener of every kind.
    pub fn remove_all_listeners(&self) {
        let actions: Vec<Action> = {
            let mut state = self.inner.state.lock();
            let kinds: Vec<String> = state.listeners.drain().map(|(kind, _)| kind).collect();
            kinds
                .iter()
                .filter(|kind| !is_reserved(kind))
                .filter_map(|kind| state.subscriptions.listeners_stopped(kind))
                .collect()
        };

        for action in actions {
            self.perform(action);
        }
    }

    pub fn listener_count(&self, kind: &str) -> usize {
        self.inner
            .state
            .lock()
            .listeners
            .get(kind)
            .map_or(0, Vec::len)
    }

    pub fn subscription_state(&self, kind: &str) -> SubscriptionState {
        self.inner.state.lock().subscriptions.state(kind)
    }

    /// Stream of event payloads of `kind`. The listener backing the stream is
    /// removed when the stream is dropped; the stream ends once the object is
    /// released.
    pub fn notifications(&self, kind: &str) -> NotificationStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.add_listener(kind, move |data| {
            let _ = tx.send(data.clone());
        });
        NotificationStream {
            events: UnboundedReceiverStream::new(rx),
            object: self.clone(),
            kind: kind.to_string(),
            listener: id,
        }
    }

    /// Channel on which asynchronous failures (subscribe/unsubscribe) are
    /// published.
    pub fn errors(&self) -> broadcast::Receiver<ClientError> {
        self.inner.errors.subscribe()
    }

    /// Deliver an event to local listeners. Returns how many were called.
    pub(crate) fn emit(&self, kind: &str, data: &Value) -> usize {
        let listeners: Vec<Listener> = {
            let state = self.inner.state.lock();
            state
                .listeners
                .get(kind)
                .map(|l| l.iter().map(|(_, f)| f.clone()).collect())
                .unwrap_or_default()
        };
        for listener in &listeners {
            listener(data);
        }
        listeners.len()
    }

    pub(crate) fn emit_transport(&self, request: &Request) {
        if self.listener_count(TRANSPORT_EVENT) == 0 {
            return;
        }
        match serde_json::to_value(request) {
            Ok(message) => {
                self.emit(TRANSPORT_EVENT, &message);
            }
            Err(e) => warn!("Failed to serialize {} request: {}", request.method(), e),
        }
    }

    fn report(&self, error: ClientError) {
        if self.inner.errors.send(error.clone()).is_err() {
            error!("Unhandled error on {} {}: {}", self.type_name(), self.id(), error);
        }
    }

    // ========================================================================
    // Subscription control
    // ========================================================================

    fn perform(&self, action: Action) {
        let request = match &action {
            Action::Subscribe { kind } => Request::Subscribe {
                target: self.id().clone(),
                kind: kind.clone(),
            },
            Action::Unsubscribe { token, .. } => Request::Unsubscribe {
                target: self.id().clone(),
                token: token.clone(),
            },
        };
        self.emit_transport(&request);
        debug!("Sending {} for {}", request.method(), self.id());

        let Ok(runtime) = Handle::try_current() else {
            self.settle(action, Err(TransportError::Closed(NO_RUNTIME.to_string())));
            return;
        };

        let this = self.clone();
        runtime.spawn(async move {
            let result = this.send(request).await;
            this.settle(action, result);
        });
    }

    fn settle(&self, action: Action, result: Result<Reply, TransportError>) {
        match action {
            Action::Subscribe { kind } => {
                let result = match result {
                    Ok(Reply::Token { token }) => Ok(token),
                    Ok(other) => Err(ClientError::Protocol(format!(
                        "unexpected reply to subscribe: {:?}",
                        other
                    ))),
                    Err(e) => Err(ClientError::from_subscription(
                        &kind,
                        SubscriptionAction::Subscribe,
                        e,
                    )),
                };
                self.subscribe_settled(&kind, result);
            }
            Action::Unsubscribe { kind, .. } => {
                let result = result
                    .map(|_| ())
                    .map_err(|e| {
                        ClientError::from_subscription(&kind, SubscriptionAction::Unsubscribe, e)
                    });
                self.unsubscribe_settled(&kind, result);
            }
        }
    }

    fn subscribe_settled(&self, kind: &str, result: Result<SubscriptionToken, ClientError>) {
        let (next, failure) = {
            let mut state = self.inner.state.lock();
            if state.lifecycle == Lifecycle::Released {
                debug!("Ignoring {} subscription reply for released {}", kind, self.id());
                return;
            }
            let has_listeners = state.has_listeners(kind);
            match result {
                Ok(token) => {
                    debug!("Subscribed to {} on {}", kind, self.id());
                    let next = state.subscriptions.subscribe_settled(kind, Ok(token), has_listeners);
                    (next, None)
                }
                Err(e) => {
                    let next = state.subscriptions.subscribe_settled(kind, Err(()), has_listeners);
                    (next, Some(e))
                }
            }
        };

        if let Some(error) = failure {
            self.report(error);
        }
        if let Some(action) = next {
            self.perform(action);
        }
    }

    fn unsubscribe_settled(&self, kind: &str, result: Result<(), ClientError>) {
        let (next, failure) = {
            let mut state = self.inner.state.lock();
            if state.lifecycle == Lifecycle::Released {
                return;
            }
            let has_listeners = state.has_listeners(kind);
            let succeeded = result.is_ok();
            if succeeded {
                debug!("Unsubscribed from {} on {}", kind, self.id());
            }
            let next = state
                .subscriptions
                .unsubscribe_settled(kind, succeeded, has_listeners);
            (next, result.err())
        };

        if let Some(error) = failure {
            self.report(error);
        }
        if let Some(action) = next {
            self.perform(action);
        }
    }
}

impl PartialEq for RemoteObject {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteObject")
            .field("id", &self.inner.id)
            .field("type", &self.inner.descriptor.name)
            .finish()
    }
}

impl From<&RemoteObject> for ParamValue {
    fn from(object: &RemoteObject) -> Self {
        ParamValue::Object(object.as_ref_value())
    }
}

impl From<RemoteObject> for ParamValue {
    fn from(object: RemoteObject) -> Self {
        ParamValue::Object(object.as_ref_value())
    }
}

/// Events of one kind on one object, as a [`Stream`].
pub struct NotificationStream {
    events: UnboundedReceiverStream<Value>,
    object: RemoteObject,
    kind: String,
    listener: ListenerId,
}

impl Stream for NotificationStream {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl Drop for NotificationStream {
    fn drop(&mut self) {
        self.object.remove_listener(&self.kind, self.listener);
    }
}
