//! Core library for glowscan.
//!
//! This crate holds everything the front ends share:
//!
//! - `auth`: credential store, encrypted vault, profile store and the auth gateway
//! - `api`: HTTP client, request authenticator, analysis and chat clients
//! - `feed`: paged recommendation feed with refresh-key computation
//! - `scheduler`: deferred background token refresh
//! - `models`: wire and domain types
//! - `config`: base URLs and persisted settings

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod feed;
pub mod models;
pub mod scheduler;
pub mod utils;

pub use api::{ApiClient, ApiError, RequestAuthenticator};
pub use auth::{AuthGateway, AuthSession, CredentialKind, CredentialStore, ProfileStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, Endpoints};
pub use feed::{FeedPage, FeedPager, ItemFilter, LoadState, PagingState};
pub use models::{ContentKind, Item, ItemContent};
pub use scheduler::{RefreshWorker, WorkRequest, WorkResult, WorkScheduler};
