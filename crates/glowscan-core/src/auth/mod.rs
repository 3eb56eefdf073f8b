//! Authentication module for managing credentials and the identity service.
//!
//! This module provides:
//! - `CredentialStore`: access/session tokens with kind-specific lifetimes
//!   (access 5 minutes, session 1 hour), persisted through a `SecretBackend`
//! - `EncryptedFileVault`: encrypted-at-rest backend keyed from the OS keychain
//! - `ProfileStore`: cached login pair for OTP resend and the verified flag
//! - `AuthGateway`: register, login, OTP and token refresh

pub mod credentials;
pub mod gateway;
pub mod header;
pub mod profile;
pub mod vault;

pub use credentials::{Credential, CredentialKind, CredentialSet, CredentialStore};
pub use gateway::{AuthGateway, AuthOutcome, AuthSession, OtpVerification};
pub use header::{format_bearer, strip_bearer};
pub use profile::{ProfileData, ProfileStore, PROFILE_FILE};
pub use vault::{vault_passphrase, EncryptedFileVault, MemoryVault, SecretBackend, StorageError};
