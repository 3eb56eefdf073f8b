//! Data models for glowscan.
//!
//! - `Item`, `ItemContent`, `ContentKind`: recommendation feed entries
//! - Auth request/response envelopes for the identity service
//! - `AnalysisResult`: skin-scan response
//! - `ChatReply`: chat bot response

pub mod analysis;
pub mod auth;
pub mod chat;
pub mod item;

pub use analysis::AnalysisResult;
pub use auth::{AuthEnvelope, AuthRequest, OtpRequest, TokenPayload};
pub use chat::{ChatReply, ChatRequest};
pub use item::{CatalogEnvelope, ContentKind, Item, ItemContent, RawItem};
