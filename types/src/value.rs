//! Argument values passed to remote operations.

use crate::ids::ObjectId;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;

/// Named arguments of one operation, ordered by name.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Argument value that can be various types.
///
/// Media server operations take primitives, enum names, references to other
/// server-side objects and tagged data carriers.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
    /// Reference to another server-side object.
    Object(ObjectRef),
    /// Structured data carrier the server reconstructs from its type tags.
    Complex(ComplexValue),
}

impl ParamValue {
    /// Short name of the value's shape, used in validation messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Object(_) => "object reference",
            Self::Complex(_) => "complex value",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Reference to a server-side object together with what it is capable of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub id: ObjectId,
    /// Entity name and every ancestor name, most specific first.
    pub capabilities: Vec<String>,
}

impl ObjectRef {
    pub fn implements(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Most specific entity name, if known.
    pub fn type_name(&self) -> &str {
        self.capabilities.first().map(String::as_str).unwrap_or("unknown")
    }
}

/// A plain data carrier such as `Fraction` or `RembParams`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexValue {
    pub module: String,
    pub type_name: String,
    pub fields: BTreeMap<String, ParamValue>,
}

impl ComplexValue {
    pub fn new(module: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

// Object references travel as the bare id; complex values carry the
// `__module__` and `__type__` tags next to their fields.
impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::List(items) => items.serialize(serializer),
            Self::Map(map) => map.serialize(serializer),
            Self::Object(object) => object.id.serialize(serializer),
            Self::Complex(complex) => {
                let mut map = serializer.serialize_map(Some(complex.fields.len() + 2))?;
                for (name, value) in &complex.fields {
                    map.serialize_entry(name, value)?;
                }
                map.serialize_entry("__module__", &complex.module)?;
                map.serialize_entry("__type__", &complex.type_name)?;
                map.end()
            }
        }
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::String(s)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::String(s.to_string())
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<i32> for ParamValue {
    fn from(i: i32) -> Self {
        ParamValue::Int(i64::from(i))
    }
}

impl From<f64> for ParamValue {
    fn from(f: f64) -> Self {
        ParamValue::Float(f)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<ObjectRef> for ParamValue {
    fn from(object: ObjectRef) -> Self {
        ParamValue::Object(object)
    }
}

impl From<ComplexValue> for ParamValue {
    fn from(complex: ComplexValue) -> Self {
        ParamValue::Complex(complex)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(items: Vec<T>) -> Self {
        ParamValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Plain JSON never produces object references or complex values; strings
/// stay strings.
impl From<serde_json::Value> for ParamValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ParamValue::Null,
            serde_json::Value::Bool(b) => ParamValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ParamValue::Int(i),
                None => ParamValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => ParamValue::String(s),
            serde_json::Value::Array(items) => {
                ParamValue::List(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(map) => {
                ParamValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Build a [`ParamMap`] from `name => value` pairs.
#[macro_export]
macro_rules! params {
    () => { $crate::ParamMap::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::ParamMap::new();
        $( map.insert(::std::string::String::from($name), $crate::ParamValue::from($value)); )+
        map
    }};
}
