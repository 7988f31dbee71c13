//! Object store client abstraction.
//!
//! The publish steps talk to an S3-compatible blob store through the
//! [`ObjectStore`] trait: whole-object get and put, with put supporting a
//! conditional `if_match` version token for optimistic concurrency. The
//! version token is an opaque string -- an S3 ETag today, any CAS-capable
//! token tomorrow -- and callers never interpret it.

use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod s3;

pub use memory::MemoryStore;
pub use s3::S3Store;

/// Errors reported by an [`ObjectStore`].
///
/// `NotFound` and `PreconditionFailed` are distinguishable from all other
/// failures; the mutation protocol's retry decisions hinge on exactly that
/// distinction.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested object does not exist.
    #[error("object not found")]
    NotFound,

    /// A conditional write was rejected: the remote version token no longer
    /// matches the supplied `if_match` value.
    #[error("precondition failed: remote version token changed")]
    PreconditionFailed,

    /// Any other client or transport failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub(crate) fn other(err: impl Into<anyhow::Error>) -> Self {
        Self::Other(err.into())
    }
}

/// A fetched object: its payload and the version token the store assigned
/// to this revision. A successful get always carries a token.
#[derive(Debug, Clone)]
pub struct Object {
    /// The object's full byte payload.
    pub payload: Vec<u8>,
    /// Opaque version token (entity tag) for the fetched revision.
    pub version: Option<String>,
}

/// Transport metadata for a put.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// MIME type recorded on the object.
    pub content_type: Option<String>,
    /// Cache directives recorded on the object.
    pub cache_control: Option<String>,
    /// Conditional-write token: when set, the store must reject the write
    /// with [`StoreError::PreconditionFailed`] if the object's current
    /// version token differs.
    pub if_match: Option<String>,
    /// Create-exclusive flag (`If-None-Match: *`): when set, the store
    /// must reject the write with [`StoreError::PreconditionFailed`] if
    /// the object already exists.
    pub if_none_match: bool,
}

/// Client for an S3-compatible object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's payload and version token.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the key does not exist; any other
    /// failure as [`StoreError::Other`].
    async fn get(&self, bucket: &str, key: &str) -> Result<Object, StoreError>;

    /// Write an object, subject to the options' conditional token.
    ///
    /// # Errors
    ///
    /// [`StoreError::PreconditionFailed`] when `if_match` was supplied and
    /// the remote version differs; any other failure as
    /// [`StoreError::Other`].
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        payload: Vec<u8>,
        opts: PutOptions,
    ) -> Result<(), StoreError>;
}
