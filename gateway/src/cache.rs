//! The shared cache store, keyed by entity namespace and id.
//!
//! Entries are hashes of field name to JSON-encoded value, with no expiry:
//! they are written on a read miss and deleted on a successful write. Every
//! key is derived through [`CacheKey`], on the read path and the
//! write-invalidation path alike, so the two can never drift apart.
use crate::config::CacheConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::AsyncCommands;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("could not encode cache entry: {0}")]
    Encode(String),

    #[error("could not decode cache entry: {0}")]
    Decode(String),
}

/// Canonical cache key for an entity.
///
/// User and profile data for the same id live in distinct namespaces;
/// invalidating one must never remove the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheKey {
    User(i64),
    Profile(i64),
    DueTo(i64),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::User(id) => write!(f, "user:{id}:users"),
            CacheKey::Profile(id) => write!(f, "user:{id}:profiles"),
            CacheKey::DueTo(id) => write!(f, "due_to:{id}"),
        }
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns all fields stored under the key, or None when the entry is absent.
    async fn read_hash(&self, key: CacheKey) -> Result<Option<HashMap<String, String>>, CacheError>;

    /// Stores fields under the key, merging with any existing ones. No expiry.
    async fn write_hash(&self, key: CacheKey, fields: &[(String, String)]) -> Result<(), CacheError>;

    /// Deletes the entry for the key.
    async fn invalidate(&self, key: CacheKey) -> Result<(), CacheError>;
}

/// Builds the store selected by the config.
pub async fn get_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    match config {
        CacheConfig::Redis { url } => Ok(Arc::new(RedisStore::connect(url).await?)),
        CacheConfig::Memory => Ok(Arc::new(MemoryStore::default())),
    }
}

pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    /// Connects once at startup; the manager reconnects on its own afterwards.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(RedisStore { conn })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn read_hash(&self, key: CacheKey) -> Result<Option<HashMap<String, String>>, CacheError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(key.to_string()).await?;
        // A hash with no fields does not exist in redis
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(fields))
    }

    async fn write_hash(&self, key: CacheKey, fields: &[(String, String)]) -> Result<(), CacheError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn.hset_multiple(key.to_string(), fields).await?;
        Ok(())
    }

    async fn invalidate(&self, key: CacheKey) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key.to_string()).await?;
        Ok(())
    }
}

/// Process-local store backed by a plain map. Used in tests and as the
/// single-instance fallback when no redis is configured.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, HashMap<String, String>>>,
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn read_hash(&self, key: CacheKey) -> Result<Option<HashMap<String, String>>, CacheError> {
        Ok(self.entries.lock().get(&key.to_string()).cloned())
    }

    async fn write_hash(&self, key: CacheKey, fields: &[(String, String)]) -> Result<(), CacheError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn invalidate(&self, key: CacheKey) -> Result<(), CacheError> {
        self.entries.lock().remove(&key.to_string());
        Ok(())
    }
}

/// Serializes a value's fields into JSON-encoded hash values.
/// The value must serialize to a JSON object.
pub fn encode_fields<T: Serialize>(value: &T) -> Result<Vec<(String, String)>, CacheError> {
    let value = serde_json::to_value(value).map_err(|e| CacheError::Encode(e.to_string()))?;
    let serde_json::Value::Object(object) = value else {
        return Err(CacheError::Encode("expected a JSON object".into()));
    };

    object
        .into_iter()
        .map(|(field, value)| {
            serde_json::to_string(&value)
                .map(|encoded| (field, encoded))
                .map_err(|e| CacheError::Encode(e.to_string()))
        })
        .collect()
}

/// Rebuilds a value from the JSON-encoded hash fields written by [`encode_fields`].
pub fn decode_fields<T: DeserializeOwned>(
    fields: HashMap<String, String>,
) -> Result<T, CacheError> {
    let mut object = serde_json::Map::with_capacity(fields.len());
    for (field, raw) in fields {
        let value =
            serde_json::from_str(&raw).map_err(|e| CacheError::Decode(format!("{field}: {e}")))?;
        object.insert(field, value);
    }

    serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| CacheError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DueToRecord, Language, Topic, UserData};

    #[test]
    fn test_canonical_keys() {
        assert_eq!(CacheKey::User(42).to_string(), "user:42:users");
        assert_eq!(CacheKey::Profile(42).to_string(), "user:42:profiles");
        assert_eq!(CacheKey::DueTo(7).to_string(), "due_to:7");
    }

    #[test]
    fn test_encode_json_values() {
        let record: DueToRecord =
            serde_json::from_str(r#"{"rent": "2024-05-01", "fee": 3}"#).unwrap();

        let mut fields = encode_fields(&record).unwrap();
        fields.sort();
        assert_eq!(
            fields,
            vec![
                ("fee".to_string(), "3".to_string()),
                ("rent".to_string(), "\"2024-05-01\"".to_string()),
            ]
        );
    }

    #[test]
    fn test_decode_user_with_null_fields() {
        let fields = HashMap::from([
            ("user_id".to_string(), "42".to_string()),
            ("username".to_string(), "null".to_string()),
            ("camefrom".to_string(), "\"organic\"".to_string()),
            ("first_name".to_string(), "\"Sam\"".to_string()),
            ("language".to_string(), "\"en\"".to_string()),
            ("fluency".to_string(), "3".to_string()),
            ("topics".to_string(), "[\"music\"]".to_string()),
            ("lang_code".to_string(), "\"en-US\"".to_string()),
            ("nickname".to_string(), "null".to_string()),
            ("age".to_string(), "null".to_string()),
            ("about".to_string(), "null".to_string()),
            ("status".to_string(), "null".to_string()),
        ]);

        let user: UserData = decode_fields(fields).unwrap();
        assert_eq!(user.user_id, 42);
        assert_eq!(user.username, None);
        assert_eq!(user.language, Language::En);
        assert_eq!(user.topics, vec![Topic::Music]);
        assert_eq!(user.age, None);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let fields = HashMap::from([("user_id".to_string(), "not json".to_string())]);
        assert!(matches!(
            decode_fields::<UserData>(fields),
            Err(CacheError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::default();
        let key = CacheKey::User(1);

        assert!(store.read_hash(key).await.unwrap().is_none());

        store
            .write_hash(key, &[("user_id".into(), "1".into())])
            .await
            .unwrap();
        store
            .write_hash(key, &[("fluency".into(), "3".into())])
            .await
            .unwrap();

        let fields = store.read_hash(key).await.unwrap().unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("fluency").map(String::as_str), Some("3"));

        store.invalidate(key).await.unwrap();
        assert!(store.read_hash(key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_namespaces_do_not_collide() {
        let store = MemoryStore::default();
        store
            .write_hash(CacheKey::User(5), &[("user_id".into(), "5".into())])
            .await
            .unwrap();
        store
            .write_hash(CacheKey::Profile(5), &[("nickname".into(), "\"sam\"".into())])
            .await
            .unwrap();

        store.invalidate(CacheKey::Profile(5)).await.unwrap();

        assert!(store.read_hash(CacheKey::Profile(5)).await.unwrap().is_none());
        assert!(store.read_hash(CacheKey::User(5)).await.unwrap().is_some());
    }
}
