//! Publish steps: pushing release artifacts into the object store.
//!
//! `archive` uploads the release tree and alias markers; `charts` maintains
//! the helm repo, keeping `index.yaml` consistent through the
//! [`mutate_object`] read-modify-write protocol.

mod archive;
mod charts;
mod mutate;

pub use archive::{archive, fetch_object, split_bucket};
pub use charts::charts;
pub use mutate::{mutate_object, MutateError, MAX_CONFLICT_RETRIES};
