//! Production [`ObjectStore`] backed by `aws-sdk-s3`.
//!
//! Credentials and region come from the standard AWS environment
//! (`AWS_ACCESS_KEY_ID`, `AWS_REGION`, shared config files); no credential
//! handling of our own. Conditional writes map `if_match` onto the
//! `If-Match` header and the create-exclusive flag onto `If-None-Match: *`;
//! S3 answers either with HTTP 412 when the condition no longer holds.

use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::operation::get_object::GetObjectError;
use tracing::debug;

use super::{Object, ObjectStore, PutOptions, StoreError};

/// [`ObjectStore`] implementation over any S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: s3::Client,
}

impl S3Store {
    /// Create a store client from the ambient AWS environment.
    pub async fn from_env() -> Self {
        let config = aws_config::load_from_env().await;
        Self {
            client: s3::Client::new(&config),
        }
    }

    /// Wrap an existing SDK client (custom endpoint, test harness, etc.).
    pub fn new(client: s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get(&self, bucket: &str, key: &str) -> Result<Object, StoreError> {
        let result = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                // Buckets without ListBucket permission answer a bare 404
                // instead of NoSuchKey, so check both.
                let not_found = matches!(
                    err.as_service_error(),
                    Some(GetObjectError::NoSuchKey(_))
                ) || err
                    .raw_response()
                    .is_some_and(|r| r.status().as_u16() == 404);
                if not_found {
                    return Err(StoreError::NotFound);
                }
                return Err(StoreError::other(err));
            }
        };

        let version = output.e_tag().map(str::to_string);
        let payload = output
            .body
            .collect()
            .await
            .map_err(StoreError::other)?
            .to_vec();

        debug!(key, version = version.as_deref(), "fetched object");
        Ok(Object { payload, version })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        payload: Vec<u8>,
        opts: PutOptions,
    ) -> Result<(), StoreError> {
        let mut req = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(s3::primitives::ByteStream::from(payload));

        if let Some(content_type) = opts.content_type {
            req = req.content_type(content_type);
        }
        if let Some(cache_control) = opts.cache_control {
            req = req.cache_control(cache_control);
        }
        let conditional = opts.if_match.is_some() || opts.if_none_match;
        if let Some(token) = opts.if_match {
            req = req.if_match(token);
        }
        if opts.if_none_match {
            req = req.if_none_match("*");
        }

        match req.send().await {
            Ok(_) => Ok(()),
            Err(err) => {
                // S3 reports a failed If-Match/If-None-Match as HTTP 412
                // (PreconditionFailed), surfaced by the SDK as an unmodeled
                // service error. Concurrent conditional writers on one key
                // can also draw a 409 (ConditionalRequestConflict); both
                // mean "re-read and retry".
                let precondition = conditional
                    && err
                        .raw_response()
                        .is_some_and(|r| matches!(r.status().as_u16(), 412 | 409));
                if precondition {
                    Err(StoreError::PreconditionFailed)
                } else {
                    Err(StoreError::other(err))
                }
            }
        }
    }
}
