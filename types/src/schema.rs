//! Declared shapes of operation parameters.

use std::fmt;

/// Types of parameters that operations can declare.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    /// Accepts any value.
    Any,
    Bool,
    Int { min: i64, max: i64 },
    /// Accepts integers as well.
    Float,
    String,
    Enum {
        name: String,
        values: Vec<String>,
    },
    /// Reference to an object implementing `capability`.
    Object { capability: String },
    /// Data carrier of the named type.
    Complex { type_name: String },
    List(Box<ParamType>),
}

impl ParamType {
    /// Unbounded 32-bit integer, the media server's `int`.
    pub fn int() -> Self {
        Self::Int {
            min: i64::from(i32::MIN),
            max: i64::from(i32::MAX),
        }
    }

    /// Unbounded 64-bit integer, the media server's `int64`.
    pub fn int64() -> Self {
        Self::Int {
            min: i64::MIN,
            max: i64::MAX,
        }
    }

    pub fn object(capability: impl Into<String>) -> Self {
        Self::Object {
            capability: capability.into(),
        }
    }

    pub fn complex(type_name: impl Into<String>) -> Self {
        Self::Complex {
            type_name: type_name.into(),
        }
    }

    pub fn enumeration(name: impl Into<String>, values: &[&str]) -> Self {
        Self::Enum {
            name: name.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn list(inner: ParamType) -> Self {
        Self::List(Box::new(inner))
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Bool => write!(f, "boolean"),
            Self::Int { .. } => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::Enum { name, .. } => write!(f, "{}", name),
            Self::Object { capability } => write!(f, "{}", capability),
            Self::Complex { type_name } => write!(f, "{}", type_name),
            Self::List(inner) => write!(f, "list of {}", inner),
        }
    }
}

/// One declared parameter of an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
        }
    }
}

/// Declared signature of a remote operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSpec {
    pub name: String,
    pub params: Vec<ParamSpec>,
    /// Declared return type; `None` for operations returning nothing.
    pub returns: Option<ParamType>,
}

impl OperationSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: None,
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn returns(mut self, param_type: ParamType) -> Self {
        self.returns = Some(param_type);
        self
    }

    pub fn param_spec(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Getter for a property: `get<Name>` returning `param_type`.
    pub fn getter(property: &str, param_type: ParamType) -> Self {
        Self::new(format!("get{}", capitalize(property))).returns(param_type)
    }

    /// Setter for a property: `set<Name>(<name>: param_type)`.
    pub fn setter(property: &str, param_type: ParamType) -> Self {
        Self::new(format!("set{}", capitalize(property)))
            .param(ParamSpec::required(property, param_type))
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
