//! Build steps: everything that turns a stamped source tree into release
//! artifacts under `out/`.

pub mod helm;
pub mod rpm;
