//! Entity descriptors: what a kind of server-side object can do.
//!
//! Instead of a class hierarchy, every entity kind is described by the set of
//! capabilities it implements (its own name plus all ancestors), the
//! operations it accepts and the events it can emit. A descriptor built with
//! [`EntityDescriptor::extends`] inherits everything from its parent.

use crate::ids::ObjectId;
use crate::schema::{OperationSpec, ParamSpec};
use crate::value::ObjectRef;

#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    /// Entity type name as known by the server (e.g. "WebRtcEndpoint").
    pub name: String,
    /// Server module defining the type.
    pub module: String,
    /// Own name followed by every ancestor name.
    pub capabilities: Vec<String>,
    /// Constructor parameters.
    pub constructor: OperationSpec,
    /// Operations, inherited ones first.
    pub operations: Vec<OperationSpec>,
    /// Event kinds, inherited ones first.
    pub events: Vec<String>,
    /// Constructor parameter naming the object that owns a new instance.
    pub parent_param: Option<String>,
    /// Accept operations that are not declared, without validating them.
    pub opaque: bool,
}

impl EntityDescriptor {
    /// Descriptor without a parent kind.
    pub fn root(name: impl Into<String>, module: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            constructor: OperationSpec::new(name.clone()),
            capabilities: vec![name.clone()],
            name,
            module: module.into(),
            operations: Vec::new(),
            events: Vec::new(),
            parent_param: None,
            opaque: false,
        }
    }

    /// Descriptor inheriting capabilities, operations, events and constructor
    /// parameters of `parent`.
    pub fn extends(parent: &EntityDescriptor, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut capabilities = Vec::with_capacity(parent.capabilities.len() + 1);
        capabilities.push(name.clone());
        capabilities.extend(parent.capabilities.iter().cloned());

        let mut constructor = OperationSpec::new(name.clone());
        constructor.params = parent.constructor.params.clone();

        Self {
            constructor,
            capabilities,
            name,
            module: parent.module.clone(),
            operations: parent.operations.clone(),
            events: parent.events.clone(),
            parent_param: parent.parent_param.clone(),
            opaque: false,
        }
    }

    /// Descriptor for a reference whose concrete kind is unknown locally.
    pub fn opaque(name: impl Into<String>) -> Self {
        let mut descriptor = Self::root(name, "");
        descriptor.opaque = true;
        descriptor
    }

    pub fn operation(mut self, spec: OperationSpec) -> Self {
        self.operations.push(spec);
        self
    }

    pub fn event(mut self, kind: impl Into<String>) -> Self {
        let kind = kind.into();
        if !self.events.contains(&kind) {
            self.events.push(kind);
        }
        self
    }

    pub fn constructor_param(mut self, spec: ParamSpec) -> Self {
        self.constructor.params.push(spec);
        self
    }

    /// Mark `param` (an object reference among the constructor parameters)
    /// as the owner of new instances.
    pub fn parent_param(mut self, param: impl Into<String>) -> Self {
        self.parent_param = Some(param.into());
        self
    }

    /// Look up an operation; definitions added later shadow inherited ones.
    pub fn operation_spec(&self, name: &str) -> Option<&OperationSpec> {
        self.operations.iter().rev().find(|op| op.name == name)
    }

    pub fn implements(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    pub fn declares_event(&self, kind: &str) -> bool {
        self.events.iter().any(|e| e == kind)
    }

    /// Reference to an instance of this kind, usable as an argument.
    pub fn object_ref(&self, id: ObjectId) -> ObjectRef {
        ObjectRef {
            id,
            capabilities: self.capabilities.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ParamType;

    #[test]
    fn test_extends_composes_capabilities() {
        let object = EntityDescriptor::root("MediaObject", "kurento")
            .operation(OperationSpec::getter("parent", ParamType::object("MediaObject")))
            .event("Error");
        let element = EntityDescriptor::extends(&object, "MediaElement").event("Error");

        assert_eq!(element.capabilities, vec!["MediaElement", "MediaObject"]);
        assert!(element.implements("MediaObject"));
        assert!(!object.implements("MediaElement"));
        assert!(element.operation_spec("getParent").is_some());
        assert_eq!(element.events, vec!["Error"]);
        assert_eq!(element.module, "kurento");
    }

    #[test]
    fn test_extends_inherits_constructor_and_parent() {
        let element = EntityDescriptor::root("MediaElement", "kurento")
            .constructor_param(ParamSpec::required(
                "mediaPipeline",
                ParamType::object("MediaPipeline"),
            ))
            .parent_param("mediaPipeline");
        let player = EntityDescriptor::extends(&element, "PlayerEndpoint")
            .constructor_param(ParamSpec::required("uri", ParamType::String));

        assert_eq!(player.constructor.name, "PlayerEndpoint");
        assert_eq!(player.constructor.params.len(), 2);
        assert_eq!(player.parent_param.as_deref(), Some("mediaPipeline"));
    }

    #[test]
    fn test_later_operation_shadows_inherited() {
        let base = EntityDescriptor::root("A", "m").operation(OperationSpec::new("run"));
        let derived = EntityDescriptor::extends(&base, "B").operation(
            OperationSpec::new("run").param(ParamSpec::required("fast", ParamType::Bool)),
        );
        assert_eq!(derived.operation_spec("run").unwrap().params.len(), 1);
    }

    #[test]
    fn test_object_ref_carries_capabilities() {
        let d = EntityDescriptor::root("MediaPipeline", "kurento");
        let r = d.object_ref(ObjectId::new("p1"));
        assert!(r.implements("MediaPipeline"));
        assert_eq!(r.type_name(), "MediaPipeline");
    }
}
