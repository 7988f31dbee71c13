//! Core library for the cutter release pipeline.
//!
//! The build modules are thin orchestration over external tools (`make`,
//! `helm`); the publish modules talk to an S3-compatible object store. The
//! one piece with a real correctness contract is
//! [`publish::mutate_object`]: a read-modify-write cycle over a shared
//! remote object, guarded by conditional writes so concurrent publishers
//! never silently clobber each other.

pub mod build;
pub mod publish;
pub mod store;
pub mod util;

pub use store::{MemoryStore, Object, ObjectStore, PutOptions, S3Store, StoreError};
