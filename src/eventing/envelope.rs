//! CloudEvents envelope.
//!
//! # Responsibilities
//! - Represent an event (context attributes + data)
//! - Parse inbound HTTP requests in structured or binary content mode
//! - Validate the required attributes
//!
//! # Design Decisions
//! - Only spec version 1.0 is accepted
//! - Binary-mode data is kept as raw bytes and relayed unchanged
//! - Batch mode is rejected; one request publishes one event

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::http::{header, HeaderMap};
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::http::request::RequestDescriptor;

pub const SPEC_VERSION: &str = "1.0";
pub const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents+json";
pub const BATCH_CONTENT_TYPE: &str = "application/cloudevents-batch+json";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Prefix of binary-mode attribute headers.
const CE_PREFIX: &str = "ce-";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("body is not a JSON object: {0}")]
    NotAnObject(String),

    #[error("missing required attribute '{0}'")]
    MissingAttribute(&'static str),

    #[error("attribute '{0}' must be a non-empty string")]
    InvalidAttribute(String),

    #[error("unsupported specversion '{0}'")]
    UnsupportedSpecVersion(String),

    #[error("invalid extension name '{0}'")]
    InvalidExtensionName(String),

    #[error("{0} is not supported")]
    Unsupported(&'static str),
}

impl From<EventError> for GatewayError {
    fn from(err: EventError) -> Self {
        GatewayError::InvalidEvent(err.to_string())
    }
}

/// Fresh, never reused event id.
pub fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}

/// Event payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    Json(Value),
    Binary(Bytes),
}

impl EventData {
    pub fn to_bytes(&self) -> Bytes {
        match self {
            // Serializing a Value cannot fail.
            EventData::Json(value) => Bytes::from(serde_json::to_vec(value).unwrap_or_default()),
            EventData::Binary(bytes) => bytes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub source: String,
    pub ty: String,
    pub specversion: String,
    pub datacontenttype: Option<String>,
    pub subject: Option<String>,
    pub time: Option<String>,
    pub extensions: BTreeMap<String, String>,
    pub data: Option<EventData>,
}

impl Event {
    /// New event with a freshly generated id.
    pub fn new(source: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            id: new_event_id(),
            source: source.into(),
            ty: ty.into(),
            specversion: SPEC_VERSION.to_string(),
            datacontenttype: None,
            subject: None,
            time: None,
            extensions: BTreeMap::new(),
            data: None,
        }
    }

    pub fn with_json_data(mut self, data: Value) -> Self {
        self.datacontenttype = Some(JSON_CONTENT_TYPE.to_string());
        self.data = Some(EventData::Json(data));
        self
    }

    pub fn validate(&self) -> Result<(), EventError> {
        if self.specversion != SPEC_VERSION {
            return Err(EventError::UnsupportedSpecVersion(self.specversion.clone()));
        }
        for (name, value) in [("id", &self.id), ("source", &self.source), ("type", &self.ty)] {
            if value.is_empty() {
                return Err(EventError::InvalidAttribute(name.to_string()));
            }
        }
        for name in self.extensions.keys() {
            if !is_valid_extension_name(name) {
                return Err(EventError::InvalidExtensionName(name.clone()));
            }
        }
        Ok(())
    }

    /// Read an event from an inbound request, picking the content mode from
    /// `content-type`.
    pub fn from_request(descriptor: &RequestDescriptor) -> Result<Self, EventError> {
        let content_type = descriptor
            .header_str(header::CONTENT_TYPE)
            .map(media_type)
            .unwrap_or_default();

        let event = if content_type.eq_ignore_ascii_case(STRUCTURED_CONTENT_TYPE) {
            Self::from_structured(&descriptor.body)?
        } else if content_type.eq_ignore_ascii_case(BATCH_CONTENT_TYPE) {
            return Err(EventError::Unsupported("batch content mode"));
        } else {
            Self::from_binary(&descriptor.headers, &descriptor.body)?
        };

        event.validate()?;
        Ok(event)
    }

    fn from_structured(body: &[u8]) -> Result<Self, EventError> {
        let mut object: Map<String, Value> = serde_json::from_slice(body)
            .map_err(|e| EventError::NotAnObject(e.to_string()))?;

        if object.contains_key("data_base64") {
            return Err(EventError::Unsupported("data_base64"));
        }

        let specversion = take_required(&mut object, "specversion")?;
        let id = take_required(&mut object, "id")?;
        let source = take_required(&mut object, "source")?;
        let ty = take_required(&mut object, "type")?;
        let mut datacontenttype = take_optional(&mut object, "datacontenttype")?;
        let subject = take_optional(&mut object, "subject")?;
        let time = take_optional(&mut object, "time")?;

        // JSON data without a declared type is JSON; a string under any
        // other type is the payload itself.
        let data = match object.remove("data") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let content_type =
                    datacontenttype.get_or_insert_with(|| JSON_CONTENT_TYPE.to_string());
                match value {
                    Value::String(s) if !is_json_content_type(content_type) => {
                        Some(EventData::Binary(Bytes::from(s.into_bytes())))
                    }
                    value => Some(EventData::Json(value)),
                }
            }
        };

        let mut extensions = BTreeMap::new();
        for (name, value) in object {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err(EventError::InvalidAttribute(name)),
            };
            extensions.insert(name, value);
        }

        Ok(Self {
            id,
            source,
            ty,
            specversion,
            datacontenttype,
            subject,
            time,
            extensions,
            data,
        })
    }

    fn from_binary(headers: &HeaderMap, body: &Bytes) -> Result<Self, EventError> {
        let mut attributes = BTreeMap::new();
        for (name, value) in headers.iter() {
            if let Some(attribute) = name.as_str().strip_prefix(CE_PREFIX) {
                let value = value
                    .to_str()
                    .ok()
                    .and_then(|raw| percent_decode_str(raw).decode_utf8().ok())
                    .ok_or_else(|| EventError::InvalidAttribute(attribute.to_string()))?;
                attributes.insert(attribute.to_string(), value.into_owned());
            }
        }

        let mut required = |name: &'static str| {
            attributes
                .remove(name)
                .ok_or(EventError::MissingAttribute(name))
        };
        let specversion = required("specversion")?;
        let id = required("id")?;
        let source = required("source")?;
        let ty = required("type")?;
        let subject = attributes.remove("subject");
        let time = attributes.remove("time");

        let datacontenttype = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let data = (!body.is_empty()).then(|| EventData::Binary(body.clone()));

        Ok(Self {
            id,
            source,
            ty,
            specversion,
            datacontenttype,
            subject,
            time,
            extensions: attributes,
            data,
        })
    }
}

/// `application/json; charset=utf-8` → `application/json`.
fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

/// `application/json` or any `+json` structured suffix.
pub fn is_json_content_type(content_type: &str) -> bool {
    let media = media_type(content_type).to_ascii_lowercase();
    media == JSON_CONTENT_TYPE || media.ends_with("+json")
}

/// Extension names are lowercase ASCII letters and digits.
pub fn is_valid_extension_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

fn take_required(object: &mut Map<String, Value>, name: &'static str) -> Result<String, EventError> {
    take_optional(object, name)?.ok_or(EventError::MissingAttribute(name))
}

fn take_optional(
    object: &mut Map<String, Value>,
    name: &'static str,
) -> Result<Option<String>, EventError> {
    match object.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(EventError::InvalidAttribute(name.to_string())),
    }
}
