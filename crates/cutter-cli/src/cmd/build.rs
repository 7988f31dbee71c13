//! `cutter build` - produce release artifacts under `out/`.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use cutter_core::build::{helm, rpm};
use cutter_model::Manifest;

/// Run the build stage: stamp charts, package them, build rpms.
pub async fn build(manifest_path: &Path) -> Result<()> {
    let manifest = Manifest::load(manifest_path).await?;
    info!("Building release {}", manifest.version);

    helm::stamp_charts(&manifest).context("chart stamping failed")?;
    helm::package_charts(&manifest).context("chart packaging failed")?;
    rpm::build(&manifest).context("rpm build failed")?;

    info!(
        "Release {} built into {}",
        manifest.version,
        manifest.out_dir().display()
    );
    Ok(())
}
