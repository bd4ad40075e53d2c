//! Dynamic values carried by method-channel invocations and responses.
//!
//! The host channel only knows a handful of value kinds. [`Value`] is the
//! closed set of them; [`FromValue`] and the `From` impls convert between it
//! and native Rust types, failing with a [`ValueError`] instead of guessing.

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// A string-to-string mapping as carried on the channel.
pub type StringMap = BTreeMap<String, String>;

/// One dynamically-typed value.
///
/// Serialized untagged, so the JSON form is the natural one: `null`, `true`,
/// `5`, `0.5`, `"text"`, `{"key":"value"}`. Integral JSON numbers decode as
/// [`Value::Int`] and must fit in an `i64`; anything with a fraction or
/// exponent decodes as [`Value::Float`]. Non-finite floats have no JSON form,
/// see [`Value::ensure_encodable`].
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    StringMap(StringMap),
}

/// The kind of a [`Value`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    StringMap,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::StringMap => "string map",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversion failures between [`Value`] and native types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: ValueKind, found: ValueKind },
    #[error("value {value} does not fit in {target}")]
    OutOfRange { target: &'static str, value: String },
    #[error("float {value} cannot be encoded on the channel")]
    NonFinite { value: f64 },
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::StringMap(_) => ValueKind::StringMap,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Converts this value into `T`, see [`FromValue`].
    pub fn get<T: FromValue>(&self) -> Result<T, ValueError> {
        T::from_value(self)
    }

    /// Fails for values that would not survive encoding, i.e. NaN and
    /// infinite floats, which JSON writes as `null`.
    pub fn ensure_encodable(&self) -> Result<(), ValueError> {
        match self {
            Value::Float(v) if !v.is_finite() => Err(ValueError::NonFinite { value: *v }),
            _ => Ok(()),
        }
    }

    fn mismatch(&self, expected: ValueKind) -> ValueError {
        ValueError::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("null, a bool, a number, a string or a map of strings")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| E::custom(format!("integer {v} does not fit in i64")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
        let mut map = StringMap::new();
        while let Some((key, value)) = access.next_entry::<String, String>()? {
            map.insert(key, value);
        }
        Ok(Value::StringMap(map))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

/// Extraction of a native type from a [`Value`].
///
/// Only exact kinds convert: a float target given [`Value::Int`] is a
/// mismatch, as is an int target given [`Value::Float`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, ValueError>;
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Int(v) => Ok(*v),
            other => Err(other.mismatch(ValueKind::Int)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| ValueError::OutOfRange {
            target: "i32",
            value: wide.to_string(),
        })
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Float(v) => Ok(*v),
            other => Err(other.mismatch(ValueKind::Float)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        let wide = f64::from_value(value)?;
        let narrow = wide as f32;
        if wide.is_finite() && narrow.is_infinite() {
            return Err(ValueError::OutOfRange {
                target: "f32",
                value: wide.to_string(),
            });
        }
        Ok(narrow)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Bool(v) => Ok(*v),
            other => Err(other.mismatch(ValueKind::Bool)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::String(v) => Ok(v.clone()),
            other => Err(other.mismatch(ValueKind::String)),
        }
    }
}

impl FromValue for StringMap {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::StringMap(map) => Ok(map.clone()),
            other => Err(other.mismatch(ValueKind::StringMap)),
        }
    }
}

impl FromValue for HashMap<String, String> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::StringMap(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            other => Err(other.mismatch(ValueKind::StringMap)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        Ok(value.clone())
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<StringMap> for Value {
    fn from(map: StringMap) -> Self {
        Value::StringMap(map)
    }
}

impl From<HashMap<String, String>> for Value {
    fn from(map: HashMap<String, String>) -> Self {
        Value::StringMap(map.into_iter().collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
