//! `cutter publish` - push release artifacts to the object store.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use cutter_core::publish;
use cutter_core::S3Store;
use cutter_model::Manifest;

/// Run the publish stage: archive upload, aliases, helm repo.
///
/// `bucket` and `aliases` override the manifest's `[publish]` section when
/// given.
pub async fn publish(
    manifest_path: &Path,
    bucket: Option<String>,
    aliases: Vec<String>,
) -> Result<()> {
    let manifest = Manifest::load(manifest_path).await?;
    let bucket_ref = bucket
        .or_else(|| manifest.publish.bucket.clone())
        .context("no bucket given: pass --bucket or set publish.bucket in the manifest")?;
    let aliases = if aliases.is_empty() {
        manifest.publish.aliases.clone()
    } else {
        aliases
    };

    let store = S3Store::from_env().await;
    info!("Publishing release {} to {bucket_ref}", manifest.version);

    publish::archive(&manifest, &store, &bucket_ref, &aliases)
        .await
        .context("archive upload failed")?;

    if manifest.publish.chart_repo_url.is_some() {
        publish::charts(&manifest, &store, &bucket_ref)
            .await
            .context("helm repo publish failed")?;
    }

    info!("Release {} published", manifest.version);
    Ok(())
}
