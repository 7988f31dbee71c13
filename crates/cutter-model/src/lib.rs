//! Release manifest model shared by the build and publish stages.
//!
//! A release is described by a `release.toml` manifest: the version being
//! cut, the image hub to stamp into charts, the directory layout the
//! pipeline works in, and the chart/architecture lists that drive the
//! build steps.

pub mod manifest;

pub use manifest::{platform_arch, ChartSet, Manifest, PublishConfig, Version};
