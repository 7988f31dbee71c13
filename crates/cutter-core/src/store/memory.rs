//! In-memory [`ObjectStore`] with real conditional-write semantics.
//!
//! Backs the mutation-protocol tests: every write bumps a monotonic
//! revision counter rendered as the object's version token, and `if_match`
//! is checked atomically under the same lock, so interleaved writers race
//! exactly the way they do against a real store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::{Object, ObjectStore, PutOptions, StoreError};

#[derive(Debug, Clone)]
struct StoredObject {
    payload: Vec<u8>,
    version: String,
}

/// In-memory store keyed by `(bucket, key)`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    revision: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current payload of an object, if present.
    pub fn payload(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.payload.clone())
    }

    /// The current version token of an object, if present.
    pub fn version(&self, bucket: &str, key: &str) -> Option<String> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.version.clone())
    }

    /// All keys currently stored under a bucket, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    fn next_version(&self) -> String {
        format!("\"rev-{}\"", self.revision.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Object, StoreError> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        match objects.get(&(bucket.to_string(), key.to_string())) {
            Some(stored) => Ok(Object {
                payload: stored.payload.clone(),
                version: Some(stored.version.clone()),
            }),
            None => Err(StoreError::NotFound),
        }
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        payload: Vec<u8>,
        opts: PutOptions,
    ) -> Result<(), StoreError> {
        let version = self.next_version();
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        let entry = objects.entry((bucket.to_string(), key.to_string()));

        if let Some(expected) = opts.if_match {
            // Conditional write: the check and the swap happen under one
            // lock hold, matching the store-side atomicity real backends
            // guarantee.
            match entry {
                std::collections::hash_map::Entry::Occupied(mut occupied)
                    if occupied.get().version == expected =>
                {
                    occupied.insert(StoredObject { payload, version });
                    Ok(())
                }
                _ => Err(StoreError::PreconditionFailed),
            }
        } else if opts.if_none_match {
            // Create-exclusive: the existence check and the insert happen
            // under the same lock hold.
            match entry {
                std::collections::hash_map::Entry::Vacant(vacant) => {
                    vacant.insert(StoredObject { payload, version });
                    Ok(())
                }
                std::collections::hash_map::Entry::Occupied(_) => {
                    Err(StoreError::PreconditionFailed)
                }
            }
        } else {
            entry
                .and_modify(|o| {
                    o.payload.clone_from(&payload);
                    o.version.clone_from(&version);
                })
                .or_insert(StoredObject { payload, version });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_missing_reports_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get("b", "k").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn put_assigns_fresh_version_tokens() {
        let store = MemoryStore::new();
        store
            .put("b", "k", b"one".to_vec(), PutOptions::default())
            .await
            .unwrap();
        let first = store.get("b", "k").await.unwrap().version.unwrap();
        store
            .put("b", "k", b"two".to_vec(), PutOptions::default())
            .await
            .unwrap();
        let second = store.get("b", "k").await.unwrap().version.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn conditional_put_rejects_stale_token() {
        let store = MemoryStore::new();
        store
            .put("b", "k", b"one".to_vec(), PutOptions::default())
            .await
            .unwrap();
        let stale = store.get("b", "k").await.unwrap().version.unwrap();
        store
            .put("b", "k", b"two".to_vec(), PutOptions::default())
            .await
            .unwrap();

        let result = store
            .put(
                "b",
                "k",
                b"three".to_vec(),
                PutOptions {
                    if_match: Some(stale),
                    ..PutOptions::default()
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::PreconditionFailed)));
        assert_eq!(store.payload("b", "k").unwrap(), b"two");
    }

    #[tokio::test]
    async fn create_exclusive_put_rejects_existing_object() {
        let store = MemoryStore::new();
        store
            .put("b", "k", b"first".to_vec(), PutOptions::default())
            .await
            .unwrap();

        let result = store
            .put(
                "b",
                "k",
                b"second".to_vec(),
                PutOptions {
                    if_none_match: true,
                    ..PutOptions::default()
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::PreconditionFailed)));
        assert_eq!(store.payload("b", "k").unwrap(), b"first");
    }

    #[tokio::test]
    async fn create_exclusive_put_creates_missing_object() {
        let store = MemoryStore::new();
        store
            .put(
                "b",
                "k",
                b"seeded".to_vec(),
                PutOptions {
                    if_none_match: true,
                    ..PutOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(store.payload("b", "k").unwrap(), b"seeded");
    }

    #[tokio::test]
    async fn conditional_put_on_missing_object_fails() {
        let store = MemoryStore::new();
        let result = store
            .put(
                "b",
                "k",
                b"x".to_vec(),
                PutOptions {
                    if_match: Some("\"rev-1\"".to_string()),
                    ..PutOptions::default()
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::PreconditionFailed)));
    }
}
