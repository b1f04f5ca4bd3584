//! Structural records built from sample payloads.
//!
//! [`Schema::infer`] walks a JSON object and records the type of every
//! field. [`Schema::validate`] checks a payload against that shape and
//! returns a [`DynamicRecord`], or a [`SchemaError`] naming the first
//! offending field. A failed validation never yields a partial record.
//!
//! All fields are optional: a field that is missing or `null` validates
//! against any type. Fields whose name starts with `_` (such as those added
//! by response middleware) are skipped. Nesting deeper than [`MAX_DEPTH`]
//! is typed as [`FieldType::Any`].
//!
//! The executor never touches this module; clients use it only for
//! `custom_endpoint_model` and [`decode`].

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::metrics::normalize_endpoint;

/// Maximum nesting inferred before falling back to [`FieldType::Any`].
pub const MAX_DEPTH: usize = 5;

/// Payload does not fit the expected shape.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// The payload root is not a JSON object.
    #[error("{model}: expected a JSON object, found {found}")]
    NotAnObject {
        /// Model name.
        model: String,
        /// JSON type found instead.
        found: &'static str,
    },

    /// A field holds a value of the wrong type.
    #[error("{model}: field `{field}` expected {expected}, found {found}")]
    TypeMismatch {
        /// Model name.
        model: String,
        /// Dotted path of the field.
        field: String,
        /// Expected type.
        expected: String,
        /// JSON type found.
        found: &'static str,
    },

    /// Typed deserialization failed.
    #[error("{model}: {message}")]
    Decode {
        /// Target type name.
        model: String,
        /// Deserializer message.
        message: String,
    },
}

/// Inferred type of a field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Anything, including `null`.
    Any,
    /// `true` or `false`.
    Bool,
    /// Whole number.
    Integer,
    /// Any number.
    Float,
    /// String.
    String,
    /// Array whose elements share one type.
    List(Box<FieldType>),
    /// Nested object.
    Object(BTreeMap<String, FieldType>),
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Any => f.write_str("any"),
            FieldType::Bool => f.write_str("bool"),
            FieldType::Integer => f.write_str("integer"),
            FieldType::Float => f.write_str("float"),
            FieldType::String => f.write_str("string"),
            FieldType::List(item) => write!(f, "list<{item}>"),
            FieldType::Object(_) => f.write_str("object"),
        }
    }
}

impl FieldType {
    fn infer(value: &Value, depth: usize) -> Self {
        match value {
            Value::Null => FieldType::Any,
            Value::Bool(_) => FieldType::Bool,
            Value::Number(n) if n.is_f64() => FieldType::Float,
            Value::Number(_) => FieldType::Integer,
            Value::String(_) => FieldType::String,
            Value::Array(items) => {
                let item = match items.first() {
                    Some(first) if depth < MAX_DEPTH => Self::infer(first, depth + 1),
                    _ => FieldType::Any,
                };
                FieldType::List(Box::new(item))
            }
            Value::Object(map) if depth < MAX_DEPTH => {
                FieldType::Object(infer_fields(map, depth + 1))
            }
            Value::Object(_) => FieldType::Any,
        }
    }

    fn check(&self, value: &Value, path: &str) -> Result<(), (String, String, &'static str)> {
        let mismatch = || Err((path.to_owned(), self.to_string(), json_type(value)));
        match (self, value) {
            (_, Value::Null) | (FieldType::Any, _) => Ok(()),
            (FieldType::Bool, Value::Bool(_)) => Ok(()),
            (FieldType::Integer, Value::Number(n)) if !n.is_f64() => Ok(()),
            (FieldType::Float, Value::Number(_)) => Ok(()),
            (FieldType::String, Value::String(_)) => Ok(()),
            (FieldType::List(item), Value::Array(values)) => {
                values.iter().enumerate().try_for_each(|(index, value)| {
                    item.check(value, &format!("{path}[{index}]"))
                })
            }
            (FieldType::Object(fields), Value::Object(map)) => check_fields(fields, map, path),
            _ => mismatch(),
        }
    }
}

fn infer_fields(map: &Map<String, Value>, depth: usize) -> BTreeMap<String, FieldType> {
    map.iter()
        .filter(|(name, _)| !name.starts_with('_'))
        .map(|(name, value)| (name.clone(), FieldType::infer(value, depth)))
        .collect()
}

fn check_fields(
    fields: &BTreeMap<String, FieldType>,
    map: &Map<String, Value>,
    prefix: &str,
) -> Result<(), (String, String, &'static str)> {
    for (name, field_type) in fields {
        if let Some(value) = map.get(name) {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            field_type.check(value, &path)?;
        }
    }
    Ok(())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Builds a model name such as `ClansMembersModel` from an endpoint path.
pub fn model_name(endpoint: &str) -> String {
    let mut name: String = normalize_endpoint(endpoint)
        .split(['/', '-', '_'])
        .filter(|part| !part.is_empty() && !part.contains('{'))
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect();
    name.push_str("Model");
    name
}

/// Structural record type: field name to [`FieldType`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    name: String,
    fields: BTreeMap<String, FieldType>,
}

impl Schema {
    /// Infers a schema named after `endpoint` from a sample object.
    pub fn infer(endpoint: &str, sample: &Value) -> Result<Self, SchemaError> {
        let name = model_name(endpoint);
        match sample {
            Value::Object(map) => Ok(Self {
                fields: infer_fields(map, 1),
                name,
            }),
            other => Err(SchemaError::NotAnObject {
                model: name,
                found: json_type(other),
            }),
        }
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields.
    pub fn fields(&self) -> &BTreeMap<String, FieldType> {
        &self.fields
    }

    /// Checks `payload` and builds a record holding the declared fields.
    pub fn validate(&self, payload: &Value) -> Result<DynamicRecord, SchemaError> {
        let Value::Object(map) = payload else {
            return Err(SchemaError::NotAnObject {
                model: self.name.clone(),
                found: json_type(payload),
            });
        };
        check_fields(&self.fields, map, "").map_err(|(field, expected, found)| {
            SchemaError::TypeMismatch {
                model: self.name.clone(),
                field,
                expected,
                found,
            }
        })?;
        let fields = self
            .fields
            .keys()
            .map(|name| (name.clone(), map.get(name).cloned().unwrap_or(Value::Null)))
            .collect();
        Ok(DynamicRecord {
            model: self.name.clone(),
            fields,
        })
    }
}

/// Validated record produced by [`Schema::validate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamicRecord {
    model: String,
    fields: BTreeMap<String, Value>,
}

impl DynamicRecord {
    /// Name of the schema the record was validated against.
    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Field value; `None` when the schema does not declare it.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Every declared field, missing ones as `null`.
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Converts the record back into a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields.into_iter().collect())
    }
}

/// Deserializes a payload into a typed model.
pub fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, SchemaError> {
    serde_json::from_value(payload).map_err(|err| SchemaError::Decode {
        model: std::any::type_name::<T>().to_owned(),
        message: err.to_string(),
    })
}
