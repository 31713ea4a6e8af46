//! Convoy client engine.
//!
//! This crate keeps a local mirror of remote clusters, transports and
//! commodities in sync over one pluggable link: it runs the authentication
//! handshake, queues outbound operations until they can flow, and routes
//! inbound frames to registered entities or discovers new ones.

pub mod auth;
pub mod capability;
pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
pub mod events;
pub mod kinds;
pub mod registry;
pub mod route;
pub mod router;
pub mod schema;
pub mod service;
pub mod state;

pub use auth::{AuthEvent, AuthHttp, AuthState, UreqAuthHttp};
pub use capability::{Creatable, Model, Readable, RouteSubscribable, Subscribable};
pub use config::SyncConfig;
pub use entity::Lifecycle;
pub use error::{AuthFailure, RegistryError, SyncError};
pub use events::{EntityEvent, ListenerId};
pub use kinds::{Cluster, Commodity, Transport};
pub use route::{Route, RouteAction, RouteStop};
pub use service::{SyncClient, SyncStats};
