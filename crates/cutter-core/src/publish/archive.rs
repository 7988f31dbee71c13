//! Release archive upload: the whole `out/` tree plus alias markers.

use anyhow::{Context, Result};
use tracing::info;
use walkdir::WalkDir;

use super::mutate::join_key;
use crate::store::{ObjectStore, PutOptions, StoreError};
use cutter_model::Manifest;

/// Split a `bucket/folder/subfolder` reference into the bucket name and the
/// object key prefix (empty when no prefix is given).
pub fn split_bucket(bucket_ref: &str) -> (&str, &str) {
    bucket_ref
        .split_once('/')
        .map_or((bucket_ref, ""), |(bucket, prefix)| (bucket, prefix))
}

/// Publish the release `out/` tree to the object store.
///
/// Every file lands under `prefix/<version>/<path relative to out/>`. Each
/// alias is then written as `prefix/<alias>` with the version string as its
/// payload -- a lightweight "latest" pointer for consumers that resolve
/// the current release before downloading.
pub async fn archive(
    manifest: &Manifest,
    store: &dyn ObjectStore,
    bucket_ref: &str,
    aliases: &[String],
) -> Result<()> {
    let (bucket, prefix) = split_bucket(bucket_ref);
    let out_dir = manifest.out_dir();

    for entry in WalkDir::new(&out_dir) {
        let entry = entry.with_context(|| format!("Failed to walk {}", out_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(&out_dir)
            .context("walked path escaped the out dir")?;
        let key = join_key(
            &join_key(prefix, manifest.version.as_str()),
            &relative.to_string_lossy(),
        );

        let payload = tokio::fs::read(entry.path())
            .await
            .with_context(|| format!("Failed to read {}", entry.path().display()))?;
        store
            .put(bucket, &key, payload, PutOptions::default())
            .await
            .with_context(|| format!("Failed to put object {key}"))?;

        info!("Wrote {} to s3://{bucket}/{key}", entry.path().display());
    }

    for alias in aliases {
        let key = join_key(prefix, alias);
        store
            .put(
                bucket,
                &key,
                manifest.version.as_str().as_bytes().to_vec(),
                PutOptions::default(),
            )
            .await
            .with_context(|| format!("Failed to write alias {alias}"))?;
        info!("Wrote {alias} to s3://{bucket}/{key}");
    }

    Ok(())
}

/// Fetch a single object's payload from under a key prefix.
pub async fn fetch_object(
    store: &dyn ObjectStore,
    bucket: &str,
    object_prefix: &str,
    filename: &str,
) -> Result<Vec<u8>, StoreError> {
    let key = join_key(object_prefix, filename);
    Ok(store.get(bucket, &key).await?.payload)
}
