//! Data types shared by all store clients

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field holding store-internal bookkeeping that must not reach the target
pub const METADATA_FIELD: &str = "metadata";

/// A single entity document
///
/// Field order is preserved so that a record written to the target looks
/// like the one read from the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Convert a JSON value into a record (only objects qualify)
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// The `name` field, when it is a string
    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    /// The unique identifier: `uuid`, falling back to `id`
    pub fn id(&self) -> Option<&str> {
        self.str_field("uuid").or_else(|| self.str_field("id"))
    }

    /// The key a create is idempotent on: id if present, else name
    pub fn natural_key(&self) -> Option<&str> {
        self.id().or_else(|| self.name())
    }

    /// Remove the store-internal metadata field, returning it if present
    pub fn strip_metadata(&mut self) -> Option<Value> {
        self.fields.shift_remove(METADATA_FIELD)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names in document order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Client credentials for one org
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,

    /// Any extra keys present in the config file
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            extra: Map::new(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// One page of query results
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Record>,

    /// Cursor for the next page, `None` on the last page
    pub cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn test_record_accessors() {
        let r = record(json!({"uuid": "u-1", "name": "alice", "age": 30}));
        assert_eq!(r.name(), Some("alice"));
        assert_eq!(r.id(), Some("u-1"));
        assert_eq!(r.natural_key(), Some("u-1"));

        let by_id = record(json!({"id": "i-9", "name": "bob"}));
        assert_eq!(by_id.id(), Some("i-9"));

        let name_only = record(json!({"name": "carol"}));
        assert_eq!(name_only.id(), None);
        assert_eq!(name_only.natural_key(), Some("carol"));
    }

    #[test]
    fn test_strip_metadata_keeps_order() {
        let mut r = record(json!({
            "uuid": "u-1",
            "metadata": {"path": "/users/u-1"},
            "name": "alice",
            "email": "a@example.com"
        }));

        assert!(r.strip_metadata().is_some());
        assert!(!r.contains(METADATA_FIELD));
        assert_eq!(r.keys().collect::<Vec<_>>(), vec!["uuid", "name", "email"]);
        assert!(r.strip_metadata().is_none());
    }

    #[test]
    fn test_non_object_is_not_a_record() {
        assert!(Record::from_value(json!([1, 2, 3])).is_none());
        assert!(Record::from_value(json!("text")).is_none());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = Credentials::new("id", "hunter2");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("id"));
        assert!(!rendered.contains("hunter2"));
    }
}
