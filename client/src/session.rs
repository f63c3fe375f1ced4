//! Session: the transport handle plus the registry of live proxies.

use crate::catalog;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::gate;
use crate::outcome::{deliver, Outcome};
use crate::proxy::RemoteObject;
use crate::transaction::Transaction;
use crate::transport::Transport;
use parking_lot::Mutex;
use rom_types::{EntityDescriptor, Notification, ObjectId, ParamMap, ParamValue, Reply, Request};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Default)]
struct Registry {
    objects: HashMap<ObjectId, RemoteObject>,
    /// Objects created with another object as their owner.
    children: HashMap<ObjectId, Vec<ObjectId>>,
}

impl Registry {
    /// Remove `id` and, when `cascade` is set, everything it owns.
    fn remove(&mut self, id: &ObjectId, cascade: bool) -> Vec<RemoteObject> {
        let mut removed = Vec::new();
        let mut queue = vec![id.clone()];
        while let Some(current) = queue.pop() {
            if let Some(object) = self.objects.remove(&current) {
                removed.push(object);
            }
            if let Some(children) = self.children.remove(&current) {
                if cascade {
                    queue.extend(children);
                }
            }
            if !cascade {
                break;
            }
        }
        for siblings in self.children.values_mut() {
            siblings.retain(|child| child != id);
        }
        removed
    }
}

pub(crate) struct SessionShared {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    registry: Mutex<Registry>,
}

impl SessionShared {
    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn register(
        shared: &Arc<Self>,
        id: ObjectId,
        descriptor: Arc<EntityDescriptor>,
    ) -> RemoteObject {
        let mut registry = shared.registry.lock();
        if let Some(existing) = registry.objects.get(&id) {
            return existing.clone();
        }
        let object = RemoteObject::new(
            id.clone(),
            descriptor,
            Arc::downgrade(shared),
            shared.config.error_buffer,
        );
        registry.objects.insert(id, object.clone());
        object
    }

    /// Proxy for a reference returned by the server, typed after the
    /// declared capability.
    pub(crate) fn resolve(shared: &Arc<Self>, id: ObjectId, capability: &str) -> RemoteObject {
        if let Some(existing) = shared.registry.lock().objects.get(&id) {
            return existing.clone();
        }
        let descriptor = catalog::by_name(capability)
            .unwrap_or_else(|| Arc::new(EntityDescriptor::opaque(capability)));
        debug!("Discovered {} {}", capability, id);
        Self::register(shared, id, descriptor)
    }

    /// Unregister a released object and release what it owns locally.
    pub(crate) fn forget(&self, id: &ObjectId) {
        let removed = self.registry.lock().remove(id, self.config.cascade_release);
        for object in removed.iter().filter(|o| o.id() != id) {
            debug!("Releasing {} owned by {}", object.id(), id);
            object.mark_released();
        }
    }

    fn adopt(&self, parent: &ObjectId, child: &ObjectId) {
        self.registry
            .lock()
            .children
            .entry(parent.clone())
            .or_default()
            .push(child.clone());
    }
}

/// Connection-level state shared by every proxy created through it.
#[derive(Clone)]
pub struct Session {
    shared: Arc<SessionShared>,
}

impl Session {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: impl Transport + 'static, config: ClientConfig) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                transport: Arc::new(transport),
                config,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Create an object of the kind described by `descriptor` on the server.
    ///
    /// Constructor arguments are validated first. When the kind names an
    /// owner parameter, the new object is released along with its owner.
    pub fn create(
        &self,
        descriptor: Arc<EntityDescriptor>,
        params: ParamMap,
    ) -> Outcome<RemoteObject> {
        let label = format!("create {}", descriptor.name);

        if let Err(e) = gate::check_params(&descriptor.constructor, &params) {
            debug!("Rejected constructor of {}: {}", descriptor.name, e);
            return Outcome::failed(label, e.into());
        }

        let owner = descriptor
            .parent_param
            .as_deref()
            .and_then(|name| params.get(name))
            .and_then(|value| match value {
                ParamValue::Object(owner) => Some(owner.id.clone()),
                _ => None,
            });

        let request = Request::Create {
            type_name: descriptor.name.clone(),
            constructor_params: params,
        };
        debug!("Sending create for {}", descriptor.name);

        let shared = self.shared.clone();
        deliver(label, async move {
            let reply = shared
                .transport
                .send(request)
                .await
                .map_err(|e| ClientError::from_transport("create", e))?;

            let id = match reply {
                Reply::Value {
                    value: Some(Value::String(id)),
                } => ObjectId::new(id),
                other => {
                    return Err(ClientError::Protocol(format!(
                        "create answered without an object id: {:?}",
                        other
                    )))
                }
            };

            let object = SessionShared::register(&shared, id.clone(), descriptor);
            if let Some(owner) = owner {
                shared.adopt(&owner, &id);
            }
            info!("Created {} {}", object.type_name(), id);
            Ok(object)
        })
    }

    /// Live proxy for `id`, registering one typed by `descriptor` if none
    /// exists yet.
    pub fn object(&self, id: ObjectId, descriptor: Arc<EntityDescriptor>) -> RemoteObject {
        SessionShared::register(&self.shared, id, descriptor)
    }

    pub fn get(&self, id: &ObjectId) -> Option<RemoteObject> {
        self.shared.registry.lock().objects.get(id).cloned()
    }

    /// Number of live proxies.
    pub fn len(&self) -> usize {
        self.shared.registry.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn begin_transaction(&self) -> Transaction {
        Transaction::new(self.shared.clone())
    }

    /// Route a server notification to the listeners of its target. Returns
    /// how many listeners were called.
    pub fn dispatch(&self, notification: Notification) -> usize {
        let Some(target) = self.get(&notification.target) else {
            debug!(
                "Dropping {} notification for unknown object {}",
                notification.kind, notification.target
            );
            return 0;
        };
        target.emit(&notification.kind, &notification.data)
    }

    /// Dispatch every notification received on `rx` until the channel closes.
    /// Must be called within a tokio runtime.
    pub fn attach_notifications(
        &self,
        mut rx: mpsc::UnboundedReceiver<Notification>,
    ) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                session.dispatch(notification);
            }
            debug!("Notification channel closed");
        })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("objects", &self.len())
            .field("config", &self.shared.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;
    use futures::FutureExt;
    use rom_types::params;
    use serde_json::json;

    #[test]
    fn test_registry_cascade() {
        let mut registry = Registry::default();
        let (transport, _server) = ChannelTransport::pair();
        let session = Session::new(transport);
        for id in ["p", "p/a", "p/b", "p/a/x"] {
            let object = session.object(ObjectId::new(id), catalog::media_element());
            registry.objects.insert(ObjectId::new(id), object);
        }
        registry
            .children
            .insert(ObjectId::new("p"), vec![ObjectId::new("p/a"), ObjectId::new("p/b")]);
        registry
            .children
            .insert(ObjectId::new("p/a"), vec![ObjectId::new("p/a/x")]);

        let mut shallow = Registry {
            objects: registry.objects.clone(),
            children: registry.children.clone(),
        };
        assert_eq!(shallow.remove(&ObjectId::new("p/a"), false).len(), 1);
        assert!(shallow.objects.contains_key(&ObjectId::new("p/a/x")));
        assert_eq!(shallow.children[&ObjectId::new("p")], vec![ObjectId::new("p/b")]);

        assert_eq!(registry.remove(&ObjectId::new("p"), true).len(), 4);
        assert!(registry.objects.is_empty());
        assert!(registry.children.is_empty());
    }

    #[tokio::test]
    async fn test_object_returns_existing_proxy() {
        let (transport, _server) = ChannelTransport::pair();
        let session = Session::new(transport);
        let a = session.object(ObjectId::new("p1"), catalog::media_pipeline());
        let b = session.object(ObjectId::new("p1"), catalog::media_object());
        assert_eq!(a, b);
        assert!(b.implements("MediaPipeline"));
        assert_eq!(session.len(), 1);
    }

    #[tokio::test]
    async fn test_create_validates_constructor() {
        let (transport, mut server) = ChannelTransport::pair();
        let session = Session::new(transport);

        let outcome = session.create(catalog::uri_endpoint(), params! { "uri" => "file:///a.webm" });
        assert!(matches!(
            outcome.now_or_never(),
            Some(Err(ClientError::Validation(_)))
        ));
        assert!(server.try_next().is_none());
    }

    #[tokio::test]
    async fn test_create_registers_proxy() {
        let (transport, mut server) = ChannelTransport::pair();
        let session = Session::new(transport);

        let outcome = session.create(catalog::media_pipeline(), ParamMap::new());
        let pending = server.next().await.unwrap();
        assert_eq!(
            serde_json::to_value(&pending.request).unwrap(),
            json!({
                "method": "create",
                "params": {"type": "MediaPipeline", "constructorParams": {}}
            })
        );
        pending.reply(Reply::value(json!("p1")));

        let pipeline = outcome.await.unwrap();
        assert_eq!(pipeline.id().as_str(), "p1");
        assert_eq!(session.get(&ObjectId::new("p1")), Some(pipeline));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_target() {
        let (transport, _server) = ChannelTransport::pair();
        let session = Session::new(transport);
        let n = Notification::new(ObjectId::new("ghost"), "Error", Value::Null);
        assert_eq!(session.dispatch(n), 0);
    }
}
