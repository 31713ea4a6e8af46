//! Transport abstractions for convoy.
//!
//! The sync engine only depends on the text-frame session and link traits
//! defined in this crate.

pub mod error;
pub mod link;

pub use error::TransportError;
pub use link::{InMemoryLink, InMemorySink, Link, LinkEvent, SessionSink, TransportHealthSnapshot};
