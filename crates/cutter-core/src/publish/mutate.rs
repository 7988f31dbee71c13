//! Read-modify-write protocol for shared remote objects.
//!
//! Object stores of this class have no native read-modify-write primitive,
//! so updating a shared object (a helm repo `index.yaml`, say) from several
//! publishers needs client-side optimistic concurrency: fetch the object
//! and its version token, mutate a local staging copy, then write it back
//! conditioned on the token. A racing writer invalidates the token, the
//! conditional write is rejected, and the loser re-fetches and retries from
//! the now-current state. The bound on retries prevents livelock under
//! sustained contention.

use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::store::{ObjectStore, PutOptions, StoreError};

/// How many fetch-mutate-write cycles a single [`mutate_object`] call will
/// run before giving up. Only write conflicts consume attempts.
pub const MAX_CONFLICT_RETRIES: usize = 10;

/// Cache directives stamped on every mutated object. These objects change
/// frequently and must never be served stale by an intermediary.
const CACHE_CONTROL: &str = "no-cache, max-age=0, no-transform";

/// Content type stamped on mutated objects. The protocol's current
/// consumers all maintain YAML indexes.
const CONTENT_TYPE: &str = "text/yaml";

/// Errors from [`mutate_object`].
#[derive(Debug, Error)]
pub enum MutateError {
    /// The initial fetch failed for a reason other than the object being
    /// absent. Never retried.
    #[error("failed to fetch {key}: {source}")]
    Fetch {
        /// Object key the fetch targeted.
        key: String,
        /// Underlying store failure.
        source: StoreError,
    },

    /// The caller's mutation closure failed. Never retried.
    #[error("mutation of {key} failed: {source}")]
    Mutation {
        /// Object key being mutated.
        key: String,
        /// The closure's error.
        source: anyhow::Error,
    },

    /// The conditional write was rejected because the remote version token
    /// changed after the fetch. Retried internally; surfaces only from the
    /// single-attempt path.
    #[error("write conflict on {key}: remote object changed since fetch")]
    Conflict {
        /// Object key the write targeted.
        key: String,
    },

    /// The write failed for a reason other than a version conflict. Never
    /// retried.
    #[error("failed to write {key}: {source}")]
    Write {
        /// Object key the write targeted.
        key: String,
        /// Underlying store failure.
        source: StoreError,
    },

    /// Every attempt ended in a write conflict. Sustained contention;
    /// distinct from a single [`MutateError::Conflict`] so callers can
    /// alert on it.
    #[error("max conflicts attempted for {key} ({attempts} attempts)")]
    MaxConflictsExceeded {
        /// Object key being mutated.
        key: String,
        /// Number of full cycles that were run.
        attempts: usize,
    },

    /// Local staging-file I/O failed.
    #[error("staging file error for {key}: {source}")]
    Staging {
        /// Object key being mutated.
        key: String,
        /// Underlying filesystem error.
        source: std::io::Error,
    },
}

/// Fetch a remote object, mutate a local staging copy of it, and write it
/// back conditioned on the version token observed at fetch time. Conflicts
/// with concurrent writers are retried (re-fetching first) up to
/// [`MAX_CONFLICT_RETRIES`] times; every other failure surfaces after a
/// single attempt.
///
/// Per attempt:
///
/// 1. Get `(bucket, prefix/filename)`. An absent object is a valid state:
///    no token is held and the staging file keeps whatever content is
///    already on disk, so the first write creates the object. On success
///    the payload overwrites `staging_dir/filename` and the token is kept.
/// 2. Run `mutation`. It takes no arguments and is expected to read and
///    rewrite the staging file in place.
/// 3. Re-read the staging file and put it back, `if_match`-conditioned on
///    the held token. When the object did not exist the write is
///    create-exclusive instead, so two publishers bootstrapping the same
///    object conflict rather than overwrite each other.
///
/// # Caller obligations
///
/// Under contention the closure runs once per attempt, each time against a
/// freshly fetched base state -- it must be safely re-runnable, and any
/// side effects beyond the staging file (counters, appended logs elsewhere)
/// will be repeated. The staging dir must not be shared with a concurrent
/// invocation on the same host. The staging file persists after return,
/// success or failure; callers wanting cleanup do it themselves.
///
/// # Errors
///
/// See [`MutateError`]. Only conflicts are handled internally; everything
/// else propagates unchanged from the failing attempt.
pub async fn mutate_object(
    staging_dir: &Path,
    store: &dyn ObjectStore,
    bucket: &str,
    object_prefix: &str,
    filename: &str,
    mut mutation: impl FnMut() -> anyhow::Result<()>,
) -> Result<(), MutateError> {
    let key = join_key(object_prefix, filename);
    for attempt in 1..=MAX_CONFLICT_RETRIES {
        match mutate_object_once(staging_dir, store, bucket, &key, filename, &mut mutation).await {
            Err(MutateError::Conflict { .. }) => {
                warn!(%key, attempt, "write conflict, trying again");
            }
            other => return other,
        }
    }
    Err(MutateError::MaxConflictsExceeded {
        key,
        attempts: MAX_CONFLICT_RETRIES,
    })
}

/// One fetch-mutate-write cycle. Split out so the retry decision stays a
/// plain match on the typed error.
async fn mutate_object_once(
    staging_dir: &Path,
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    filename: &str,
    mutation: &mut (impl FnMut() -> anyhow::Result<()>),
) -> Result<(), MutateError> {
    let staging_file = staging_dir.join(filename);

    let version = match store.get(bucket, key).await {
        Ok(object) => {
            debug!(key, version = object.version.as_deref(), "fetched object");
            tokio::fs::write(&staging_file, &object.payload)
                .await
                .map_err(|source| MutateError::Staging {
                    key: key.to_string(),
                    source,
                })?;
            object.version
        }
        Err(StoreError::NotFound) => {
            // Missing is fine: first write creates the object. Whatever is
            // already staged locally is left for the mutation to build on.
            warn!(key, "remote object does not exist yet");
            None
        }
        Err(source) => {
            return Err(MutateError::Fetch {
                key: key.to_string(),
                source,
            });
        }
    };

    mutation().map_err(|source| MutateError::Mutation {
        key: key.to_string(),
        source,
    })?;

    let payload = tokio::fs::read(&staging_file)
        .await
        .map_err(|source| MutateError::Staging {
            key: key.to_string(),
            source,
        })?;

    // With no token held the write must be create-exclusive: two
    // bootstrapping publishers both observe the absent object, and without
    // the existence condition the later accepted write would silently
    // erase the earlier one.
    let create_only = version.is_none();
    let opts = PutOptions {
        content_type: Some(CONTENT_TYPE.to_string()),
        cache_control: Some(CACHE_CONTROL.to_string()),
        if_match: version,
        if_none_match: create_only,
    };
    match store.put(bucket, key, payload, opts).await {
        Ok(()) => {
            info!(key, "wrote object");
            Ok(())
        }
        Err(StoreError::PreconditionFailed) => Err(MutateError::Conflict {
            key: key.to_string(),
        }),
        Err(source) => Err(MutateError::Write {
            key: key.to_string(),
            source,
        }),
    }
}

/// Join a key prefix and filename, skipping the separator for an empty
/// prefix.
pub(crate) fn join_key(prefix: &str, filename: &str) -> String {
    if prefix.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Object};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Store double whose conditional writes always conflict.
    #[derive(Debug, Default)]
    struct AlwaysConflict {
        puts: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for AlwaysConflict {
        async fn get(&self, _bucket: &str, _key: &str) -> Result<Object, StoreError> {
            Ok(Object {
                payload: b"base".to_vec(),
                version: Some("\"etag\"".to_string()),
            })
        }

        async fn put(
            &self,
            _bucket: &str,
            _key: &str,
            _payload: Vec<u8>,
            _opts: PutOptions,
        ) -> Result<(), StoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::PreconditionFailed)
        }
    }

    /// Store double that fails hard on the chosen operation.
    #[derive(Debug)]
    struct Broken {
        fail_get: bool,
    }

    #[async_trait]
    impl ObjectStore for Broken {
        async fn get(&self, _bucket: &str, _key: &str) -> Result<Object, StoreError> {
            if self.fail_get {
                Err(StoreError::other(anyhow::anyhow!("connection reset")))
            } else {
                Err(StoreError::NotFound)
            }
        }

        async fn put(
            &self,
            _bucket: &str,
            _key: &str,
            _payload: Vec<u8>,
            _opts: PutOptions,
        ) -> Result<(), StoreError> {
            Err(StoreError::other(anyhow::anyhow!("access denied")))
        }
    }

    /// Store double whose gets always report the object as absent while
    /// puts hit a real backing store: a publisher acting on a stale
    /// "doesn't exist" observation.
    #[derive(Debug, Default)]
    struct BlindGet {
        inner: MemoryStore,
    }

    #[async_trait]
    impl ObjectStore for BlindGet {
        async fn get(&self, _bucket: &str, _key: &str) -> Result<Object, StoreError> {
            Err(StoreError::NotFound)
        }

        async fn put(
            &self,
            bucket: &str,
            key: &str,
            payload: Vec<u8>,
            opts: PutOptions,
        ) -> Result<(), StoreError> {
            self.inner.put(bucket, key, payload, opts).await
        }
    }

    /// Store wrapper that performs one interleaved external write between a
    /// mutator's get and its put, then gets out of the way.
    #[derive(Debug)]
    struct Interposer {
        inner: Arc<MemoryStore>,
        interposed: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for Interposer {
        async fn get(&self, bucket: &str, key: &str) -> Result<Object, StoreError> {
            self.inner.get(bucket, key).await
        }

        async fn put(
            &self,
            bucket: &str,
            key: &str,
            payload: Vec<u8>,
            opts: PutOptions,
        ) -> Result<(), StoreError> {
            if self.interposed.fetch_add(1, Ordering::SeqCst) == 0 {
                self.inner
                    .put(bucket, key, b"interleaved".to_vec(), PutOptions::default())
                    .await?;
            }
            self.inner.put(bucket, key, payload, opts).await
        }
    }

    fn append_to(path: std::path::PathBuf, suffix: &'static str) -> impl FnMut() -> anyhow::Result<()> {
        move || {
            let mut content = std::fs::read_to_string(&path).unwrap_or_default();
            content.push_str(suffix);
            std::fs::write(&path, content)?;
            Ok(())
        }
    }

    // Scenario from the protocol contract: bootstrap write with no token,
    // then a conditioned update against the observed etag.
    #[tokio::test]
    async fn bootstrap_then_conditioned_update() {
        let staging = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let file = staging.path().join("index.yaml");

        mutate_object(
            staging.path(),
            &store,
            "bucket",
            "charts",
            "index.yaml",
            append_to(file.clone(), "v1"),
        )
        .await
        .unwrap();
        assert_eq!(store.payload("bucket", "charts/index.yaml").unwrap(), b"v1");

        mutate_object(
            staging.path(),
            &store,
            "bucket",
            "charts",
            "index.yaml",
            append_to(file.clone(), ",v2"),
        )
        .await
        .unwrap();
        assert_eq!(
            store.payload("bucket", "charts/index.yaml").unwrap(),
            b"v1,v2"
        );
    }

    #[tokio::test]
    async fn not_found_put_carries_no_token() {
        let staging = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let file = staging.path().join("index.yaml");
        let invoked = AtomicUsize::new(0);

        mutate_object(staging.path(), &store, "b", "", "index.yaml", || {
            invoked.fetch_add(1, Ordering::SeqCst);
            std::fs::write(&file, "seeded")?;
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(invoked.load(Ordering::SeqCst), 1);
        assert_eq!(store.payload("b", "index.yaml").unwrap(), b"seeded");
    }

    #[tokio::test]
    async fn not_found_keeps_preexisting_staging_content() {
        let staging = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let file = staging.path().join("index.yaml");
        std::fs::write(&file, "local").unwrap();

        mutate_object(
            staging.path(),
            &store,
            "b",
            "",
            "index.yaml",
            append_to(file.clone(), "+more"),
        )
        .await
        .unwrap();

        assert_eq!(store.payload("b", "index.yaml").unwrap(), b"local+more");
    }

    #[tokio::test]
    async fn interleaved_write_conflicts_then_converges() {
        let staging = TempDir::new().unwrap();
        let inner = Arc::new(MemoryStore::new());
        inner
            .put("b", "index.yaml", b"base".to_vec(), PutOptions::default())
            .await
            .unwrap();
        let store = Interposer {
            inner: Arc::clone(&inner),
            interposed: AtomicUsize::new(0),
        };
        let file = staging.path().join("index.yaml");

        mutate_object(
            staging.path(),
            &store,
            "b",
            "",
            "index.yaml",
            append_to(file.clone(), "+mine"),
        )
        .await
        .unwrap();

        // The retry re-fetched the interleaved content instead of silently
        // overwriting it.
        assert_eq!(
            inner.payload("b", "index.yaml").unwrap(),
            b"interleaved+mine"
        );
    }

    #[tokio::test]
    async fn racing_bootstrap_conflicts_then_converges() {
        let staging = TempDir::new().unwrap();
        // Object starts absent; another publisher creates it between our
        // fetch and our create-exclusive write.
        let inner = Arc::new(MemoryStore::new());
        let store = Interposer {
            inner: Arc::clone(&inner),
            interposed: AtomicUsize::new(0),
        };
        let file = staging.path().join("index.yaml");

        mutate_object(
            staging.path(),
            &store,
            "b",
            "",
            "index.yaml",
            append_to(file.clone(), "+mine"),
        )
        .await
        .unwrap();

        // The first attempt's create was rejected; the retry picked up the
        // other publisher's content instead of erasing it.
        assert_eq!(
            inner.payload("b", "index.yaml").unwrap(),
            b"interleaved+mine"
        );
    }

    #[tokio::test]
    async fn stale_not_found_never_overwrites_existing_object() {
        let store = BlindGet::default();

        let staging_a = TempDir::new().unwrap();
        mutate_object(staging_a.path(), &store, "b", "", "index.yaml", {
            let file = staging_a.path().join("index.yaml");
            move || {
                std::fs::write(&file, "A;")?;
                Ok(())
            }
        })
        .await
        .unwrap();
        assert_eq!(store.inner.payload("b", "index.yaml").unwrap(), b"A;");

        // The second publisher keeps observing "absent" even though the
        // object now exists. Its creates must be rejected every time; a
        // lost update is never an acceptable outcome.
        let staging_b = TempDir::new().unwrap();
        let err = mutate_object(staging_b.path(), &store, "b", "", "index.yaml", {
            let file = staging_b.path().join("index.yaml");
            move || {
                std::fs::write(&file, "B;")?;
                Ok(())
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, MutateError::MaxConflictsExceeded { .. }));
        assert_eq!(store.inner.payload("b", "index.yaml").unwrap(), b"A;");
    }

    #[tokio::test]
    async fn sustained_conflict_exhausts_retry_bound() {
        let staging = TempDir::new().unwrap();
        let store = AlwaysConflict::default();
        let invoked = AtomicUsize::new(0);
        let file = staging.path().join("index.yaml");

        let err = mutate_object(staging.path(), &store, "b", "", "index.yaml", || {
            invoked.fetch_add(1, Ordering::SeqCst);
            std::fs::write(&file, "x")?;
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            MutateError::MaxConflictsExceeded { attempts: 10, .. }
        ));
        assert_eq!(invoked.load(Ordering::SeqCst), 10);
        assert_eq!(store.puts.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn fetch_failure_is_not_retried() {
        let staging = TempDir::new().unwrap();
        let store = Broken { fail_get: true };
        let invoked = AtomicUsize::new(0);

        let err = mutate_object(staging.path(), &store, "b", "", "index.yaml", || {
            invoked.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, MutateError::Fetch { .. }));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn write_failure_is_not_retried() {
        let staging = TempDir::new().unwrap();
        let store = Broken { fail_get: false };
        let invoked = AtomicUsize::new(0);
        let file = staging.path().join("index.yaml");

        let err = mutate_object(staging.path(), &store, "b", "", "index.yaml", || {
            invoked.fetch_add(1, Ordering::SeqCst);
            std::fs::write(&file, "x")?;
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, MutateError::Write { .. }));
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mutation_failure_surfaces_immediately() {
        let staging = TempDir::new().unwrap();
        let store = MemoryStore::new();

        let err = mutate_object(staging.path(), &store, "b", "", "index.yaml", || {
            anyhow::bail!("closure exploded")
        })
        .await
        .unwrap_err();

        assert!(matches!(err, MutateError::Mutation { .. }));
        assert!(store.payload("b", "index.yaml").is_none());
    }

    #[test]
    fn join_key_handles_empty_prefix() {
        assert_eq!(join_key("", "index.yaml"), "index.yaml");
        assert_eq!(join_key("charts", "index.yaml"), "charts/index.yaml");
        assert_eq!(join_key("charts/", "index.yaml"), "charts/index.yaml");
    }
}
