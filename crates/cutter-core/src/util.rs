//! External command and filesystem helpers shared by the build and publish
//! steps.
//!
//! The pipeline is mostly orchestration: run a tool, move its output into
//! place, write a checksum next to it. Commands run with inherited stdio so
//! CI logs show the underlying tool output directly.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::process::Command;
use tracing::info;

use cutter_model::Manifest;

/// Build a [`Command`] that logs its invocation and streams output to the
/// caller's stdio.
pub fn verbose_command(program: &str, args: &[&str]) -> Command {
    info!("Running command: {program} {}", args.join(" "));
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}

/// Run a command to completion, surfacing a non-zero exit as an error.
pub fn run(cmd: &mut Command) -> Result<()> {
    let program = cmd.get_program().to_string_lossy().to_string();
    let status = cmd
        .status()
        .with_context(|| format!("Failed to execute {program}"))?;
    if !status.success() {
        anyhow::bail!("{program} failed with exit code: {:?}", status.code());
    }
    Ok(())
}

/// Run `make` targets inside a repo checkout with extra environment
/// variables.
pub fn run_make(manifest: &Manifest, repo: &str, envs: &[(&str, &str)], targets: &[&str]) -> Result<()> {
    let repo_dir = manifest.repo_dir(repo);
    let mut cmd = verbose_command("make", targets);
    cmd.current_dir(&repo_dir);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    run(&mut cmd).with_context(|| format!("make {} in {}", targets.join(" "), repo_dir.display()))
}

/// Copy a single file, creating the destination's parent directories.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::copy(src, dst)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(())
}

/// Recursively copy a directory's contents into `dst` (created if missing).
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create directory {}", dst.display()))?;
    let mut options = fs_extra::dir::CopyOptions::new();
    options.overwrite = true;
    options.content_only = true;
    fs_extra::dir::copy(src, dst, &options)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(())
}

/// Write a `<path>.sha256` companion file in coreutils `sha256sum` format
/// (`<hex>  <filename>`).
pub fn create_sha(path: &Path) -> Result<()> {
    let contents = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let digest = hex::encode(Sha256::digest(&contents));
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let sha_path = path.with_extension(format!(
        "{}sha256",
        path.extension()
            .map(|e| format!("{}.", e.to_string_lossy()))
            .unwrap_or_default()
    ));
    std::fs::write(&sha_path, format!("{digest}  {filename}\n"))
        .with_context(|| format!("Failed to write {}", sha_path.display()))?;
    Ok(())
}
