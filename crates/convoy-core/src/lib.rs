//! Core convoy primitives shared across crates.
//!
//! Includes kind-tagged hierarchical paths and their validation errors.

pub mod error;
pub mod path;

pub use error::PathError;
pub use path::{EntityKind, Path, PATH_SEPARATOR};
