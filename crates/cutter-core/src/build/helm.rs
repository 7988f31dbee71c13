//! Helm chart stamping and packaging.
//!
//! Source checkouts carry development hubs and floating tags; before
//! packaging, every chart gets the release version and hub stamped into
//! `Chart.yaml` and `values.yaml`. Stamping is deliberately line-level
//! rewriting: the fields involved are flat scalars, and rewriting them in
//! place preserves every comment and ordering choice in the source charts.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::info;

use crate::util;
use cutter_model::Manifest;

/// Development hubs that stamping replaces with the manifest's hub.
const DEV_HUBS: &[&str] = &["gcr.io/mesh-testing", "gcr.io/mesh-release"];

/// Floating dev tags rewritten to the release version
/// (`tag: release-1.x-latest-daily`, `tag: latest`, `tag: 1.x-dev`).
static DEV_TAG_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"tag: .*-latest-daily", r"tag: latest", r"tag: 1\..-dev"]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

/// Same, for JSON-quoted values files.
static QUOTED_DEV_TAG_RES: LazyLock<Vec<Regex>> =
    LazyLock::new(|| vec![Regex::new(r#""tag": "latest""#).unwrap()]);

/// `version:`/`appVersion:` lines at the top level of a Chart.yaml.
static CHART_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(version|appVersion): .*$").unwrap());

/// A dependency entry's `version:` line (list-indented, with or without
/// the leading dash).
static DEP_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*(?:- )?)version:.*$").unwrap());

/// Stamp the release version and hub into every chart in the manifest.
pub fn stamp_charts(manifest: &Manifest) -> Result<()> {
    for chart in &manifest.charts.all {
        let chart_dir = manifest.repo_dir(&manifest.repo).join(chart);
        stamp_chart(manifest, &chart_dir)
            .with_context(|| format!("failed to stamp chart {chart}"))?;
    }
    Ok(())
}

/// Stamp a single chart directory: versions in `Chart.yaml`, hub and tags
/// in `values.yaml`.
fn stamp_chart(manifest: &Manifest, chart_dir: &Path) -> Result<()> {
    let chart_yaml = chart_dir.join("Chart.yaml");
    let contents = std::fs::read_to_string(&chart_yaml)
        .with_context(|| format!("Failed to read {}", chart_yaml.display()))?;
    let stamped = CHART_VERSION_RE
        .replace_all(&contents, |caps: &regex::Captures<'_>| {
            format!("{}: {}", &caps[1], manifest.version)
        })
        .into_owned();
    let stamped = stamp_local_dependency_pins(&stamped, manifest.version.as_str());
    std::fs::write(&chart_yaml, stamped)
        .with_context(|| format!("Failed to write {}", chart_yaml.display()))?;

    update_values(manifest, &chart_dir.join("values.yaml"))
}

/// Rewrite the `version:` pins of `file://` subchart dependencies to the
/// release version. Local subcharts are built from this same checkout, so
/// their pins must track the release; remote dependencies keep theirs.
/// The full dep trees get inlined into the `.tgz` either way, so the
/// `file://` repository refs themselves can stay.
fn stamp_local_dependency_pins(contents: &str, release: &str) -> String {
    let lines: Vec<&str> = contents.lines().collect();
    let mut out: Vec<String> = lines.iter().map(|l| (*l).to_string()).collect();

    let Some(deps_start) = lines.iter().position(|l| l.trim_end() == "dependencies:") else {
        return contents.to_string();
    };
    // The list runs until the next top-level key.
    let deps_end = lines[deps_start + 1..]
        .iter()
        .position(|l| !l.is_empty() && !l.starts_with(' '))
        .map_or(lines.len(), |offset| deps_start + 1 + offset);

    // Entry boundaries: each `- ` line starts one.
    let mut entry_starts: Vec<usize> = (deps_start + 1..deps_end)
        .filter(|&i| lines[i].trim_start().starts_with("- "))
        .collect();
    entry_starts.push(deps_end);

    for bounds in entry_starts.windows(2) {
        let (start, end) = (bounds[0], bounds[1]);
        if !lines[start..end].iter().any(|l| l.contains("file://")) {
            continue;
        }
        for i in start..end {
            if let Some(caps) = DEP_VERSION_RE.captures(lines[i]) {
                out[i] = format!("{}version: {release}", &caps[1]);
            }
        }
    }

    let mut result = out.join("\n");
    if contents.ends_with('\n') {
        result.push('\n');
    }
    result
}

/// Rewrite the hub and tag fields of a single values file. Works on
/// generic templates as well as chart values.
pub fn update_values(manifest: &Manifest, path: &Path) -> Result<()> {
    let mut contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    for hub in DEV_HUBS {
        contents = contents.replace(
            &format!("hub: {hub}"),
            &format!("hub: {}", manifest.docker),
        );
        contents = contents.replace(
            &format!("\"hub\": \"{hub}\""),
            &format!("\"hub\": \"{}\"", manifest.docker),
        );
    }
    for re in DEV_TAG_RES.iter() {
        contents = re
            .replace_all(&contents, format!("tag: {}", manifest.version))
            .into_owned();
    }
    for re in QUOTED_DEV_TAG_RES.iter() {
        contents = re
            .replace_all(&contents, format!("\"tag\": \"{}\"", manifest.version))
            .into_owned();
    }

    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Package the repo and sample charts into `out/helm/` with
/// `helm package`, updating chart dependencies first.
pub fn package_charts(manifest: &Manifest) -> Result<()> {
    which::which("helm").context("helm not found on PATH")?;

    let dst = manifest.out_dir().join("helm");
    let samples_dst = dst.join("samples");
    std::fs::create_dir_all(&samples_dst)
        .with_context(|| format!("failed to make destination directory {}", dst.display()))?;

    for chart in &manifest.charts.samples {
        package_chart(manifest, chart, &samples_dst)?;
    }
    for chart in &manifest.charts.repo {
        package_chart(manifest, chart, &dst)?;
    }
    Ok(())
}

fn package_chart(manifest: &Manifest, chart: &str, dst: &Path) -> Result<()> {
    let in_dir = manifest.repo_dir(&manifest.repo).join(chart);
    let out_dir = manifest.work_dir().join("charts").join(chart);

    // Inline subchart deps before copying out of the repo; helm skips
    // charts without any.
    let mut dep = util::verbose_command("helm", &["dep", "update"]);
    dep.current_dir(&in_dir);
    util::run(&mut dep).with_context(|| format!("dep update {}", in_dir.display()))?;

    util::copy_dir(&in_dir, &out_dir)?;

    let mut package =
        util::verbose_command("helm", &["package", &out_dir.to_string_lossy()]);
    package.current_dir(dst);
    util::run(&mut package).with_context(|| format!("package {chart}"))?;

    info!("Packaged chart {chart} into {}", dst.display());
    Ok(())
}
