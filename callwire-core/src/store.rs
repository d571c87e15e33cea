//! # Document Store
//!
//! The narrow interface the blog service needs from a persistent store, plus the identifier
//! type the store assigns.
//!
//! Records are schemaless JSON objects ([`Document`]). The store owns the `_id` field: it is
//! set on insert and never changed afterwards. Connecting to a real database is left to the
//! embedding application, which only has to implement [`DocumentStore`]; the crate ships the
//! [`memory::InMemoryStore`] adapter.
pub mod memory;

use futures_util::stream::BoxStream;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub use memory::InMemoryStore;

/// Field under which the store keeps the record identifier.
pub const ID_FIELD: &str = "_id";

pub type Document = serde_json::Map<String, serde_json::Value>;

/// Lazy, finite sequence of stored records.
pub type DocumentStream = BoxStream<'static, Result<Document, StoreError>>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("failed to decode record: {0}")]
    Decode(#[from] serde_json::Error),
}

#[tonic::async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Stores a new record and returns the identifier assigned to it.
    async fn insert(&self, document: Document) -> Result<ObjectId, StoreError>;

    async fn find_one(&self, id: &ObjectId) -> Result<Option<Document>, StoreError>;

    /// Replaces the record with the given identifier. Returns `false` if no record matched.
    async fn replace(&self, id: &ObjectId, document: Document) -> Result<bool, StoreError>;

    /// Deletes the record with the given identifier and returns the number of records removed.
    async fn delete(&self, id: &ObjectId) -> Result<u64, StoreError>;

    /// Streams every stored record in the store's natural order.
    async fn iterate(&self) -> Result<DocumentStream, StoreError>;
}

/// A 12-byte record identifier, written as 24 lowercase hex characters.
///
/// Layout: 4 bytes of seconds since the epoch, 5 random bytes and a 3-byte counter, so that
/// identifiers created by one process never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid identifier, expected 24 hex characters")]
pub struct InvalidObjectId(pub String);

static COUNTER: AtomicU32 = AtomicU32::new(0);

impl ObjectId {
    pub fn new() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as u32)
            .unwrap_or_default();
        let random = uuid::Uuid::new_v4();
        let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(&random.as_bytes()[..5]);
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
        Self(bytes)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for ObjectId {
    type Err = InvalidObjectId;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidObjectId(value.to_string());

        if value.len() != 24 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = &value[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_hex_roundtrip() {
        let id = ObjectId::new();
        let hex = id.to_string();

        assert_eq!(hex.len(), 24);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(hex.parse::<ObjectId>().unwrap(), id);
    }

    #[test]
    fn test_object_ids_are_unique() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_ids_are_rejected() {
        assert!("".parse::<ObjectId>().is_err());
        assert!("not-an-id".parse::<ObjectId>().is_err());
        assert!("5f1d7c3e9a1b2c3d4e5f6a7".parse::<ObjectId>().is_err());
        assert!("5f1d7c3e9a1b2c3d4e5f6a7z".parse::<ObjectId>().is_err());
        assert!("5f1d7c3e9a1b2c3d4e5f6a7b9".parse::<ObjectId>().is_err());
        assert!("+f+f+f+f+f+f+f+f+f+f+f+f".parse::<ObjectId>().is_err());
        // Multi-byte characters must not panic on slicing.
        assert!("éééééééééééé".parse::<ObjectId>().is_err());
    }

    #[test]
    fn test_uppercase_hex_is_accepted() {
        let id: ObjectId = "5F1D7C3E9A1B2C3D4E5F6A7B".parse().unwrap();
        assert_eq!(id.to_string(), "5f1d7c3e9a1b2c3d4e5f6a7b");
    }

    #[test]
    fn test_object_id_serde_as_string() {
        let id: ObjectId = "5f1d7c3e9a1b2c3d4e5f6a7b".parse().unwrap();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::json!("5f1d7c3e9a1b2c3d4e5f6a7b"));

        let back: ObjectId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }
}
