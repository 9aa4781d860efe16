//! Robots as reported by the Beehive cloud, and their schema-checked decoding.

use chrono::{DateTime, NaiveDateTime, Utc};
use log::*;
use serde_json::{Map, Value};
use std::fmt;

/// A robot registered to a Neato account.
///
/// `serial` is the identity key used when reconciling with the device registry.
#[derive(Clone, PartialEq)]
pub struct Robot {
    pub serial: String,
    pub prefix: String,
    pub name: String,
    pub model: String,
    /// Per-robot secret used to sign local API calls. Treated as sensitive.
    pub secret_key: String,
    pub purchased_at: Option<DateTime<Utc>>,
    pub linked_at: Option<DateTime<Utc>>,
    /// Capability flags. Not decoded from the cloud response yet, always empty.
    pub traits: Vec<String>,
}

impl fmt::Debug for Robot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Robot")
            .field("serial", &self.serial)
            .field("prefix", &self.prefix)
            .field("name", &self.name)
            .field("model", &self.model)
            .field("secret_key", &"[REDACTED]")
            .field("purchased_at", &self.purchased_at)
            .field("linked_at", &self.linked_at)
            .field("traits", &self.traits)
            .finish()
    }
}

/// Why a robot record could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The element is not a JSON object.
    NotAnObject,
    /// Required fields were absent, or present with the wrong type or empty.
    Fields {
        missing: Vec<&'static str>,
        invalid: Vec<&'static str>,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::NotAnObject => write!(f, "robot entry is not an object"),
            DecodeError::Fields { missing, invalid } => {
                write!(f, "robot entry rejected")?;
                if !missing.is_empty() {
                    write!(f, ", missing: {}", missing.join(", "))?;
                }
                if !invalid.is_empty() {
                    write!(f, ", invalid: {}", invalid.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Collects field problems while reading a robot object so every problem
/// gets reported at once.
struct FieldReader<'a> {
    object: &'a Map<String, Value>,
    missing: Vec<&'static str>,
    invalid: Vec<&'static str>,
}

impl<'a> FieldReader<'a> {
    fn new(object: &'a Map<String, Value>) -> Self {
        Self {
            object,
            missing: Vec::new(),
            invalid: Vec::new(),
        }
    }

    /// A non-empty string field.
    fn required_str(&mut self, field: &'static str) -> String {
        match self.object.get(field) {
            None | Some(Value::Null) => {
                self.missing.push(field);
                String::new()
            }
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(_) => {
                self.invalid.push(field);
                String::new()
            }
        }
    }

    /// An optional timestamp field. Malformed values are dropped, not rejected.
    fn optional_timestamp(&self, field: &'static str) -> Option<DateTime<Utc>> {
        let value = self.object.get(field)?;
        let parsed = value.as_str().and_then(parse_timestamp);
        if parsed.is_none() && !value.is_null() {
            debug!("Ignoring malformed {} value: {}", field, value);
        }
        parsed
    }

    fn finish(self) -> Result<(), DecodeError> {
        if self.missing.is_empty() && self.invalid.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::Fields {
                missing: self.missing,
                invalid: self.invalid,
            })
        }
    }
}

/// ISO-8601 timestamps as Beehive sends them. Values without an offset are UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Decode one element of the Beehive robot list.
pub fn decode(value: &Value) -> Result<Robot, DecodeError> {
    let object = value.as_object().ok_or(DecodeError::NotAnObject)?;
    let mut reader = FieldReader::new(object);

    let serial = reader.required_str("serial");
    let prefix = reader.required_str("prefix");
    let name = reader.required_str("name");
    let model = reader.required_str("model");
    let secret_key = reader.required_str("secret_key");
    let purchased_at = reader.optional_timestamp("purchased_at");
    let linked_at = reader.optional_timestamp("linked_at");
    reader.finish()?;

    Ok(Robot {
        serial,
        prefix,
        name,
        model,
        secret_key,
        purchased_at,
        linked_at,
        traits: Vec::new(),
    })
}

/// Decode a Beehive robot list, skipping and logging elements that fail
/// validation. Order of the valid elements is kept.
pub fn decode_list(elements: &[Value]) -> Vec<Robot> {
    elements
        .iter()
        .enumerate()
        .filter_map(|(index, element)| match decode(element) {
            Ok(robot) => Some(robot),
            Err(e) => {
                warn!("Skipping robot entry {}: {}", index, e);
                None
            }
        })
        .collect()
}
