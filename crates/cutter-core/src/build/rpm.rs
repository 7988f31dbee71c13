//! Sidecar rpm packaging, one package per target architecture.

use anyhow::{Context, Result};

use crate::util;
use cutter_model::{platform_arch, Manifest};

/// Build the sidecar rpm for every architecture in the manifest.
///
/// Each build runs the repo's `rpm/fpm` make target with `TARGET_ARCH`
/// set, then copies the produced package into `out/rpm/` (arch-suffixed
/// for everything but amd64) and writes its `.sha256` companion.
pub fn build(manifest: &Manifest) -> Result<()> {
    for platform in &manifest.architectures {
        let arch = platform_arch(platform);
        let output = if arch == "amd64" {
            "sidecar.rpm".to_string()
        } else {
            format!("sidecar-{arch}.rpm")
        };
        build_arch(manifest, arch, &output)
            .with_context(|| format!("failed to build rpm for arch {arch}"))?;
    }
    Ok(())
}

fn build_arch(manifest: &Manifest, arch: &str, output: &str) -> Result<()> {
    let repo = manifest.repo.as_str();
    util::run_make(manifest, repo, &[("TARGET_ARCH", arch)], &["rpm/fpm"])
        .context("failed to build sidecar.rpm")?;

    let built = manifest.repo_arch_out_dir(repo, arch).join("sidecar.rpm");
    let dst = manifest.out_dir().join("rpm").join(output);
    util::copy_file(&built, &dst)
        .with_context(|| format!("failed to package {output}"))?;
    util::create_sha(&dst).with_context(|| format!("failed to checksum {output}"))?;
    Ok(())
}
