//! Argument validation performed before any message is built.
//!
//! Every check is pure: a call either passes completely or is rejected with
//! the first violation found, and nothing reaches the transport.

use crate::error::ValidationError;
use rom_types::{EntityDescriptor, OperationSpec, ParamMap, ParamType, ParamValue};

/// Validate `params` of `operation` on an entity described by `descriptor`.
///
/// Returns the operation's declared signature when there is one; opaque
/// descriptors let undeclared operations through unchecked.
pub fn check_operation<'d>(
    descriptor: &'d EntityDescriptor,
    operation: &str,
    params: &ParamMap,
) -> Result<Option<&'d OperationSpec>, ValidationError> {
    match descriptor.operation_spec(operation) {
        Some(spec) => {
            check_params(spec, params)?;
            Ok(Some(spec))
        }
        None if descriptor.opaque => Ok(None),
        None => Err(ValidationError::UnknownOperation {
            entity: descriptor.name.clone(),
            operation: operation.to_string(),
        }),
    }
}

/// Validate `params` against the declared parameters of `spec`.
pub fn check_params(spec: &OperationSpec, params: &ParamMap) -> Result<(), ValidationError> {
    if let Some(unknown) = params.keys().find(|name| spec.param_spec(name).is_none()) {
        return Err(ValidationError::UnknownParam {
            operation: spec.name.clone(),
            param: unknown.clone(),
        });
    }

    for param in &spec.params {
        match params.get(&param.name) {
            None | Some(ParamValue::Null) => {
                if param.required {
                    return Err(ValidationError::MissingParam {
                        param: param.name.clone(),
                    });
                }
            }
            Some(value) => check_value(&param.name, &param.param_type, value)?,
        }
    }

    Ok(())
}

/// Validate one value against a declared type.
pub fn check_value(
    name: &str,
    expected: &ParamType,
    value: &ParamValue,
) -> Result<(), ValidationError> {
    let wrong_kind = || ValidationError::WrongKind {
        param: name.to_string(),
        expected: expected.to_string(),
        actual: value.kind().to_string(),
    };

    match (expected, value) {
        (ParamType::Any, _) => Ok(()),
        (ParamType::Bool, ParamValue::Bool(_)) => Ok(()),
        (ParamType::Int { min, max }, ParamValue::Int(i)) => {
            if i < min || i > max {
                Err(ValidationError::OutOfRange {
                    param: name.to_string(),
                    value: *i,
                    min: *min,
                    max: *max,
                })
            } else {
                Ok(())
            }
        }
        (ParamType::Float, ParamValue::Float(_) | ParamValue::Int(_)) => Ok(()),
        (ParamType::String, ParamValue::String(_)) => Ok(()),
        (ParamType::Enum { name: enumeration, values }, ParamValue::String(s)) => {
            if values.iter().any(|v| v == s) {
                Ok(())
            } else {
                Err(ValidationError::NotInEnum {
                    param: name.to_string(),
                    enumeration: enumeration.clone(),
                    value: s.clone(),
                })
            }
        }
        (ParamType::Object { capability }, ParamValue::Object(object)) => {
            if object.implements(capability) {
                Ok(())
            } else {
                Err(ValidationError::MissingCapability {
                    param: name.to_string(),
                    capability: capability.clone(),
                    actual: object.type_name().to_string(),
                })
            }
        }
        (ParamType::Complex { type_name }, ParamValue::Complex(complex))
            if &complex.type_name == type_name =>
        {
            Ok(())
        }
        (ParamType::List(inner), ParamValue::List(items)) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| check_value(&format!("{}[{}]", name, i), inner, item)),
        _ => Err(wrong_kind()),
    }
}
