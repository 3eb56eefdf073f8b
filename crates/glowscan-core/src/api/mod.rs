//! HTTP clients for the glowscan services.
//!
//! `ApiClient` wraps a shared `reqwest::Client` and runs every outgoing
//! request through the `RequestAuthenticator`, which attaches the best
//! valid bearer token from the credential store unless the caller already
//! set an `Authorization` header.
//!
//! `ScanClient` and `ChatClient` are thin wrappers over the same client for
//! the scan-model and chat services.

pub mod authenticator;
pub mod chat;
pub mod client;
pub mod error;
pub mod scan;

pub use authenticator::RequestAuthenticator;
pub use chat::ChatClient;
pub use client::ApiClient;
pub use error::ApiError;
pub use scan::{ImagePart, ScanClient};
