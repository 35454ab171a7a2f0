//! Synchronous client for a Swift-style object-storage service.
//!
//! # Overview
//! One auth handshake yields an [`AuthSession`] (storage URL + token);
//! [`AccountClient`] and [`ContainerClient`] then turn high-level operations
//! (create container, upload object, set metadata, generate temp URL) into
//! single blocking HTTP requests through a [`RequestExecutor`], and map
//! remote status codes into structured results.
//!
//! # Design
//! - Every operation builds a fresh [`RequestSpec`] that the executor
//!   consumes, so no query or body state survives a call.
//! - Clients compose: account and container clients each hold their own
//!   executor handle and session clone; nothing is process-global.
//! - Failures are typed ([`StorageError`]): transport, auth, unexpected
//!   remote status and protocol violations are distinct variants, and none
//!   are retried internally.
//! - Temp URLs are pure computation ([`signer`]): HMAC-SHA1 over the exact
//!   canonical string the server recomputes.

pub mod account;
pub mod auth;
pub mod container;
pub mod error;
pub mod executor;
pub mod http;
pub mod signer;

pub use account::{AccountClient, ArchiveExtraction};
pub use auth::AuthSession;
pub use container::{ContainerClient, ContainerDescriptor, ListFiles};
pub use error::{Result, StorageError};
pub use executor::RequestExecutor;
pub use http::{Body, Format, Listing, Method, RequestSpec, ResponseEnvelope};
