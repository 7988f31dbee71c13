//! Release manifest parsing and directory layout helpers.
//!
//! The manifest (`release.toml`) declares everything the pipeline needs to
//! cut a release: the version, the docker hub to stamp into charts, the
//! source repo checkout, and the chart and architecture lists. The directory
//! layout is derived from a single `directory` root:
//!
//! ```text
//! <directory>/
//! ├── work/           # scratch space: repo checkout, staged charts
//! │   └── <repo>/     # source repo the build targets run in
//! └── out/            # release artifacts: rpm/, helm/, ...
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;

/// A release version string (e.g. `1.24.2`).
///
/// Kept opaque: the pipeline stamps it into charts and object keys but
/// never interprets its structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub String);

impl Version {
    /// The version as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Top-level release manifest parsed from a `release.toml` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// The version being released; stamped into charts and object keys.
    pub version: Version,
    /// Docker hub stamped into chart values (replaces the dev hubs).
    pub docker: String,
    /// Root directory for this release; `work/` and `out/` live under it.
    pub directory: PathBuf,
    /// Name of the source repo checkout under `work/`.
    pub repo: String,
    /// Target platforms as `os/arch` strings (e.g. `linux/amd64`).
    pub architectures: Vec<String>,
    /// Helm chart lists, as paths relative to the repo checkout.
    #[serde(default)]
    pub charts: ChartSet,
    /// Publish defaults (bucket reference, aliases, chart repo URL).
    #[serde(default)]
    pub publish: PublishConfig,
}

/// The `[charts]` section: which charts get stamped, packaged, and
/// published.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartSet {
    /// Every chart that gets version/hub stamping.
    #[serde(default)]
    pub all: Vec<String>,
    /// The core subset packaged into the release helm repo.
    #[serde(default)]
    pub repo: Vec<String>,
    /// Charts packaged as samples rather than core charts.
    #[serde(default)]
    pub samples: Vec<String>,
}

/// The `[publish]` section: defaults for the publish stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Default bucket reference, optionally with a key prefix
    /// (`bucket/folder/subfolder`).
    #[serde(default)]
    pub bucket: Option<String>,
    /// Alias objects written alongside the versioned artifacts; each holds
    /// the version string (e.g. `latest`).
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Public base URL of the helm repo, embedded in `index.yaml` entries.
    #[serde(default)]
    pub chart_repo_url: Option<String>,
}

impl Manifest {
    /// Asynchronously load and parse a `Manifest` from the given file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if its contents are
    /// not valid TOML conforming to the manifest schema.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;

        let manifest: Manifest =
            toml::from_str(&content).context("Failed to parse release.toml")?;

        Ok(manifest)
    }

    /// Scratch directory for intermediate build state.
    pub fn work_dir(&self) -> PathBuf {
        self.directory.join("work")
    }

    /// Directory that release artifacts are written into.
    pub fn out_dir(&self) -> PathBuf {
        self.directory.join("out")
    }

    /// Path of a source repo checkout under the work dir.
    pub fn repo_dir(&self, repo: &str) -> PathBuf {
        self.work_dir().join(repo)
    }

    /// Per-architecture build output dir inside a repo checkout
    /// (`<repo>/out/linux_<arch>`).
    pub fn repo_arch_out_dir(&self, repo: &str, arch: &str) -> PathBuf {
        self.repo_dir(repo).join("out").join(format!("linux_{arch}"))
    }
}

/// Extract the architecture from an `os/arch` platform string
/// (`linux/arm64` -> `arm64`). Bare architectures pass through unchanged.
pub fn platform_arch(platform: &str) -> &str {
    platform.split_once('/').map_or(platform, |(_, arch)| arch)
}
