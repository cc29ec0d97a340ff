//! Body conversion between call-site values and wire payloads.
//!
//! Converters are resolved through an ordered registry: converter factories
//! added by the user sit at the front (highest priority), and the
//! JSON-backed [`StandardConverter`] is appended exactly once when the
//! consumer configuration is created, so it is always present and always
//! consulted last.

use crate::{Error, Result};
use bytes::Bytes;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// The conversion slot a converter is being resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// Turn an assembled body value into wire bytes.
    RequestBody,
    /// Turn raw response bytes into a decoded value.
    ResponseBody,
    /// Render a value as a plain string, for query or header fields.
    Display,
}

/// A type-erased value passing through converters, hooks, and responses.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw bytes, as read from or written to the wire.
    Bytes(Bytes),
    /// A decoded JSON value.
    Json(Value),
    /// Plain text.
    Text(String),
}

impl Payload {
    /// Returns the decoded JSON value, if this payload holds one.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the raw bytes, if this payload holds them.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the text, if this payload holds it.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

/// Converts a payload for one [`Purpose`].
pub trait Converter: Send + Sync {
    /// Converts `value`, returning the transformed payload.
    fn convert(&self, value: Payload) -> Result<Payload>;
}

/// Produces converters on demand, one purpose at a time.
///
/// A factory that does not handle a purpose returns `None`, and resolution
/// falls through to the next (lower-priority) factory in the registry.
pub trait ConverterFactory: Send + Sync {
    /// Returns a converter for `purpose`, or `None` to decline.
    fn converter(&self, purpose: Purpose) -> Option<Arc<dyn Converter>>;
}

/// The default JSON converter factory.
///
/// Serializes request bodies with `serde_json`, deserializes response bodies
/// from JSON, and renders display values as their unquoted string form. It
/// handles every purpose, which is what makes the registry invariant hold:
/// resolution can never come up empty while this factory sits at the back.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardConverter;

impl ConverterFactory for StandardConverter {
    fn converter(&self, purpose: Purpose) -> Option<Arc<dyn Converter>> {
        match purpose {
            Purpose::RequestBody => Some(Arc::new(JsonRequestBody)),
            Purpose::ResponseBody => Some(Arc::new(JsonResponseBody)),
            Purpose::Display => Some(Arc::new(DisplayValue)),
        }
    }
}

struct JsonRequestBody;

impl Converter for JsonRequestBody {
    fn convert(&self, value: Payload) -> Result<Payload> {
        match value {
            Payload::Json(value) => {
                let bytes = serde_json::to_vec(&value).map_err(|e| Error::Convert {
                    message: e.to_string(),
                    body: None,
                    status: None,
                })?;
                Ok(Payload::Bytes(Bytes::from(bytes)))
            }
            Payload::Text(text) => Ok(Payload::Bytes(Bytes::from(text))),
            bytes @ Payload::Bytes(_) => Ok(bytes),
        }
    }
}

struct JsonResponseBody;

impl Converter for JsonResponseBody {
    fn convert(&self, value: Payload) -> Result<Payload> {
        match value {
            // Empty bodies (204s, HEAD responses) pass through untouched.
            Payload::Bytes(bytes) if bytes.is_empty() => Ok(Payload::Bytes(bytes)),
            Payload::Bytes(bytes) => {
                let value: Value =
                    serde_json::from_slice(&bytes).map_err(|e| Error::Convert {
                        message: e.to_string(),
                        body: Some(String::from_utf8_lossy(&bytes).into_owned()),
                        status: None,
                    })?;
                Ok(Payload::Json(value))
            }
            Payload::Text(text) => {
                let value: Value =
                    serde_json::from_str(&text).map_err(|e| Error::Convert {
                        message: e.to_string(),
                        body: Some(text.clone()),
                        status: None,
                    })?;
                Ok(Payload::Json(value))
            }
            json @ Payload::Json(_) => Ok(json),
        }
    }
}

struct DisplayValue;

impl Converter for DisplayValue {
    fn convert(&self, value: Payload) -> Result<Payload> {
        let text = match value {
            Payload::Text(text) => text,
            Payload::Json(Value::String(s)) => s,
            Payload::Json(value) => value.to_string(),
            Payload::Bytes(bytes) => String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::Convert {
                    message: e.to_string(),
                    body: None,
                    status: None,
                })?,
        };
        Ok(Payload::Text(text))
    }
}

/// An ordered, definition-scoped view over converter factories.
///
/// Resolution walks the factories front to back and takes the first one that
/// accepts the purpose. The registry is cheap to create: one is built per
/// request definition when a call is prepared.
#[derive(Clone)]
pub struct ConverterRegistry {
    factories: Vec<Arc<dyn ConverterFactory>>,
}

impl ConverterRegistry {
    /// Creates a registry over the given factories, highest priority first.
    pub fn new(factories: Vec<Arc<dyn ConverterFactory>>) -> Self {
        Self { factories }
    }

    /// Resolves the converter for `purpose`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no factory accepts the purpose. With
    /// the standard converter present (which consumer configuration
    /// guarantees) this cannot happen.
    pub fn get(&self, purpose: Purpose) -> Result<Arc<dyn Converter>> {
        self.factories
            .iter()
            .find_map(|factory| factory.converter(purpose))
            .ok_or_else(|| {
                Error::Configuration(format!("no converter registered for {purpose:?}"))
            })
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("factories", &self.factories.len())
            .finish()
    }
}
