//! Helm repo publishing: chart tarballs plus a shared `index.yaml`.
//!
//! The index is the contended object: every release publisher rewrites it,
//! so it goes through [`mutate_object`] with a closure that regenerates the
//! index via `helm repo index`, merging whatever revision the fetch staged
//! locally.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use super::archive::split_bucket;
use super::mutate::{join_key, mutate_object};
use crate::store::{ObjectStore, PutOptions};
use crate::util;
use cutter_model::Manifest;

/// Publish packaged charts from `out/helm/` and update the repo's
/// `index.yaml`.
///
/// Chart tarballs are immutable (versioned filenames) and upload
/// unconditionally; only the index needs the conditional-write protocol.
pub async fn charts(manifest: &Manifest, store: &dyn ObjectStore, bucket_ref: &str) -> Result<()> {
    let (bucket, prefix) = split_bucket(bucket_ref);
    let helm_dir = manifest.out_dir().join("helm");

    for tarball in chart_tarballs(&helm_dir)? {
        let filename = tarball
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let key = join_key(prefix, &filename);
        let payload = tokio::fs::read(&tarball)
            .await
            .with_context(|| format!("Failed to read {}", tarball.display()))?;
        store
            .put(
                bucket,
                &key,
                payload,
                PutOptions {
                    content_type: Some("application/gzip".to_string()),
                    ..PutOptions::default()
                },
            )
            .await
            .with_context(|| format!("Failed to upload chart {filename}"))?;
        info!("Wrote {filename} to s3://{bucket}/{key}");
    }

    let repo_url = manifest
        .publish
        .chart_repo_url
        .clone()
        .context("publish.chart_repo_url must be set to publish charts")?;

    let index_path = helm_dir.join("index.yaml");
    mutate_object(&helm_dir, store, bucket, prefix, "index.yaml", || {
        let dir = helm_dir.to_string_lossy().to_string();
        let mut args = vec!["repo", "index", dir.as_str(), "--url", repo_url.as_str()];
        let merge_path = index_path.to_string_lossy().to_string();
        if index_path.exists() {
            args.extend(["--merge", merge_path.as_str()]);
        }
        util::run(&mut util::verbose_command("helm", &args))
    })
    .await
    .context("Failed to update helm repo index")?;

    Ok(())
}

/// The packaged chart tarballs directly under a helm output dir, sorted.
fn chart_tarballs(helm_dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut tarballs = Vec::new();
    let entries = std::fs::read_dir(helm_dir)
        .with_context(|| format!("Failed to read {}", helm_dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "tgz") {
            tarballs.push(path);
        }
    }
    tarballs.sort();
    Ok(tarballs)
}
