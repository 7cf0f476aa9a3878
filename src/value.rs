//! Values flowing between data sources, handlers and templates.
//!
//! Rows fetched through a [`DataSource`](crate::DataSource), handler reply data
//! and template contexts are all [`ContextMap`]s. Temporal and decimal values
//! keep their native type until serialization, where the [`Displayable`] trait
//! turns them into the textual or numeric form pages and JSON clients expect.

use {
    rust_decimal::{Decimal, prelude::ToPrimitive},
    serde::{Serialize, Serializer, ser::SerializeMap, ser::SerializeSeq},
    std::collections::BTreeMap,
    time::{Date, OffsetDateTime, PrimitiveDateTime, format_description::BorrowedFormatItem,
        macros::format_description},
};

/// Ordered string-keyed map of context values.
pub type ContextMap = BTreeMap<String, ContextValue>;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const DATETIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Normalization of a non-JSON-native value into its serialized form.
pub trait Displayable {
    /// Returns the JSON value used when this value is rendered or serialized.
    fn display(&self) -> serde_json::Value;
}

impl Displayable for Decimal {
    fn display(&self) -> serde_json::Value {
        match self.to_f64().and_then(serde_json::Number::from_f64) {
            Some(number) => serde_json::Value::Number(number),
            None => serde_json::Value::String(self.to_string()),
        }
    }
}

impl Displayable for Date {
    fn display(&self) -> serde_json::Value {
        match self.format(DATE_FORMAT) {
            Ok(text) => serde_json::Value::String(text),
            Err(_) => serde_json::Value::String(self.to_string()),
        }
    }
}

impl Displayable for PrimitiveDateTime {
    fn display(&self) -> serde_json::Value {
        match self.format(DATETIME_FORMAT) {
            Ok(text) => serde_json::Value::String(text),
            Err(_) => serde_json::Value::String(self.to_string()),
        }
    }
}

impl Displayable for OffsetDateTime {
    fn display(&self) -> serde_json::Value {
        PrimitiveDateTime::new(self.date(), self.time()).display()
    }
}

/// A dynamically typed value in a row or template context.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ContextValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Decimal(Decimal),
    Date(Date),
    DateTime(PrimitiveDateTime),
    DateTimeTz(OffsetDateTime),
    List(Vec<ContextValue>),
    Map(ContextMap),
}

impl ContextValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ContextValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ContextValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ContextValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ContextMap> {
        match self {
            ContextValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Converts into a plain JSON value, normalizing every [`Displayable`] leaf.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ContextValue::Null => serde_json::Value::Null,
            ContextValue::Bool(b) => serde_json::Value::Bool(*b),
            ContextValue::Int(i) => serde_json::Value::from(*i),
            ContextValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ContextValue::Text(s) => serde_json::Value::String(s.clone()),
            ContextValue::Decimal(d) => d.display(),
            ContextValue::Date(d) => d.display(),
            ContextValue::DateTime(dt) => dt.display(),
            ContextValue::DateTimeTz(dt) => dt.display(),
            ContextValue::List(items) => {
                serde_json::Value::Array(items.iter().map(ContextValue::to_json).collect())
            }
            ContextValue::Map(map) => map_to_json(map),
        }
    }
}

/// Converts a whole context map into a JSON object.
pub fn map_to_json(map: &ContextMap) -> serde_json::Value {
    serde_json::Value::Object(
        map.iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect(),
    )
}

impl Serialize for ContextValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ContextValue::Null => serializer.serialize_unit(),
            ContextValue::Bool(b) => serializer.serialize_bool(*b),
            ContextValue::Int(i) => serializer.serialize_i64(*i),
            ContextValue::Float(f) => serializer.serialize_f64(*f),
            ContextValue::Text(s) => serializer.serialize_str(s),
            ContextValue::Decimal(d) => d.display().serialize(serializer),
            ContextValue::Date(d) => d.display().serialize(serializer),
            ContextValue::DateTime(dt) => dt.display().serialize(serializer),
            ContextValue::DateTimeTz(dt) => dt.display().serialize(serializer),
            ContextValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ContextValue::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

// ============================================================================
// From implementations
// ============================================================================

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        ContextValue::Bool(value)
    }
}

impl From<i32> for ContextValue {
    fn from(value: i32) -> Self {
        ContextValue::Int(value.into())
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        ContextValue::Int(value)
    }
}

impl From<f64> for ContextValue {
    fn from(value: f64) -> Self {
        ContextValue::Float(value)
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        ContextValue::Text(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        ContextValue::Text(value)
    }
}

impl From<Decimal> for ContextValue {
    fn from(value: Decimal) -> Self {
        ContextValue::Decimal(value)
    }
}

impl From<Date> for ContextValue {
    fn from(value: Date) -> Self {
        ContextValue::Date(value)
    }
}

impl From<PrimitiveDateTime> for ContextValue {
    fn from(value: PrimitiveDateTime) -> Self {
        ContextValue::DateTime(value)
    }
}

impl From<OffsetDateTime> for ContextValue {
    fn from(value: OffsetDateTime) -> Self {
        ContextValue::DateTimeTz(value)
    }
}

impl From<ContextMap> for ContextValue {
    fn from(value: ContextMap) -> Self {
        ContextValue::Map(value)
    }
}

impl From<Vec<String>> for ContextValue {
    fn from(value: Vec<String>) -> Self {
        ContextValue::List(value.into_iter().map(ContextValue::Text).collect())
    }
}

impl<T: Into<ContextValue>> From<Option<T>> for ContextValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ContextValue::Null)
    }
}

impl From<serde_json::Value> for ContextValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ContextValue::Null,
            serde_json::Value::Bool(b) => ContextValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ContextValue::Int(i),
                None => ContextValue::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => ContextValue::Text(s),
            serde_json::Value::Array(items) => {
                ContextValue::List(items.into_iter().map(ContextValue::from).collect())
            }
            serde_json::Value::Object(map) => ContextValue::Map(
                map.into_iter()
                    .map(|(key, value)| (key, ContextValue::from(value)))
                    .collect(),
            ),
        }
    }
}
