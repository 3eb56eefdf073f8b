//! Identity service operations.
//!
//! Every operation returns a tagged `Result`; nothing panics or throws across
//! this boundary. A failed operation never touches the credential store.

use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{format_bearer, CredentialKind, CredentialStore, ProfileStore};
use crate::api::{ApiClient, ApiError};
use crate::models::{AuthEnvelope, AuthRequest, OtpRequest};

const REGISTER_PATH: &str = "/auths/register";
const LOGIN_PATH: &str = "/auths/login";
const VERIFY_OTP_PATH: &str = "/auths/verify-otp";
const REFRESH_PATH: &str = "/auths/refresh-token";

/// Successful auth operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSession {
    /// Bearer token returned by the server, if it sent one.
    pub token: Option<String>,
    pub verified: bool,
}

/// Result of submitting an OTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtpVerification {
    pub verified: bool,
    pub message: Option<String>,
}

pub type AuthOutcome = Result<AuthSession, ApiError>;

pub struct AuthGateway {
    api: ApiClient,
    store: Arc<CredentialStore>,
    profile: Arc<ProfileStore>,
}

impl AuthGateway {
    pub fn new(api: ApiClient, store: Arc<CredentialStore>, profile: Arc<ProfileStore>) -> Self {
        Self { api, store, profile }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn profile(&self) -> &Arc<ProfileStore> {
        &self.profile
    }

    pub fn is_logged_in(&self) -> bool {
        self.store.is_logged_in()
    }

    pub fn is_verified(&self) -> bool {
        self.profile.is_verified()
    }

    async fn post_credentials(&self, path: &str, email: &str, password: &str) -> Result<AuthEnvelope, ApiError> {
        let url = self.api.endpoints().api(path);
        let builder = self.api.post(&url).json(&AuthRequest { email, password });
        let response = self.api.execute(builder).await?;
        let response = ApiClient::check_response(response).await?;
        ApiClient::decode(response).await
    }

    /// Create an account. The returned access token is stored.
    pub async fn register(&self, email: &str, password: &str) -> AuthOutcome {
        let envelope = self.post_credentials(REGISTER_PATH, email, password).await?;
        let token = envelope.access_token().ok_or(ApiError::EmptyBody)?.to_string();

        self.store.save(CredentialKind::Access, &token)?;
        if let Err(e) = self.profile.set_verified(envelope.is_verified) {
            warn!(error = %e, "Failed to persist verified flag");
        }

        info!(verified = envelope.is_verified, "Registration successful");
        Ok(AuthSession {
            token: Some(token),
            verified: envelope.is_verified,
        })
    }

    /// Log in. On "User fetched" the pair is cached for `resend_otp`.
    ///
    /// No bearer credential is written here; the token arrives through the
    /// OTP flow.
    pub async fn login(&self, email: &str, password: &str) -> AuthOutcome {
        let envelope = self.post_credentials(LOGIN_PATH, email, password).await?;

        if envelope.is_user_fetched() {
            if let Err(e) = self.profile.save_login_pair(email, password) {
                warn!(error = %e, "Failed to cache login for OTP resend");
            }
            debug!("Login pair cached for OTP resend");
        }

        info!(code = ?envelope.code, "Login accepted");
        Ok(AuthSession {
            token: envelope.access_token().map(str::to_string),
            verified: envelope.is_verified,
        })
    }

    /// Submit an OTP using the token stored by `register`.
    pub async fn verify_otp(&self, code: &str) -> Result<OtpVerification, ApiError> {
        let Some((_, token)) = self.store.stored() else {
            return Err(ApiError::CredentialsNotFound);
        };

        let url = self.api.endpoints().api(VERIFY_OTP_PATH);
        let builder = self
            .api
            .post(&url)
            .header(AUTHORIZATION, format_bearer(&token))
            .json(&OtpRequest { otp: code });
        let response = self.api.execute(builder).await?;
        let response = ApiClient::check_response(response).await?;
        let envelope: AuthEnvelope = ApiClient::decode(response).await?;

        let verified = envelope.success.unwrap_or(false) || envelope.is_verified;
        if verified {
            let before = self.store.snapshot();
            if let Some(session) = envelope.access_token() {
                self.store.save(CredentialKind::Session, session)?;
            }
            if let Err(e) = self.profile.set_verified(true) {
                if let Err(undo) = self.store.restore(before) {
                    warn!(error = %undo, "Failed to roll back session credential");
                }
                return Err(e.into());
            }
            info!("OTP verified");
        } else {
            debug!(message = ?envelope.message, "OTP rejected");
        }

        Ok(OtpVerification {
            verified,
            message: envelope.message,
        })
    }

    /// Ask for a new OTP by replaying the cached login.
    pub async fn resend_otp(&self) -> AuthOutcome {
        let (email, password) = self
            .profile
            .login_pair()
            .ok_or(ApiError::CredentialsNotFound)?;
        self.login(&email, &password).await
    }

    /// Exchange the stored token (access preferred) for a fresh one of the
    /// same kind.
    ///
    /// A 401 comes back as `SessionExpired`; clearing the store is left to
    /// the caller.
    pub async fn refresh_token(&self) -> AuthOutcome {
        let Some((kind, token)) = self.store.stored() else {
            return Err(ApiError::NoValidToken);
        };

        let url = self.api.endpoints().api(REFRESH_PATH);
        let builder = self
            .api
            .post(&url)
            .header(AUTHORIZATION, format_bearer(&token));
        let response = self.api.execute(builder).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(%kind, "Refresh rejected, session expired");
            return Err(ApiError::SessionExpired);
        }
        let response = ApiClient::check_response(response).await?;
        let envelope: AuthEnvelope = ApiClient::decode(response).await?;
        let fresh = envelope.access_token().ok_or(ApiError::EmptyBody)?.to_string();

        self.store.save(kind, &fresh)?;
        info!(%kind, "Token refreshed");
        Ok(AuthSession {
            token: Some(fresh),
            verified: self.profile.is_verified(),
        })
    }

    /// Drop every local trace of the session.
    pub fn logout(&self) -> Result<(), ApiError> {
        self.store.clear()?;
        self.profile.clear()?;
        info!("Logged out");
        Ok(())
    }

    /// Apply the failure policy for user-facing callers: errors that mean the
    /// session is gone clear the credential store. Returns true when the
    /// user must log in again.
    pub fn handle_failure(&self, error: &ApiError) -> bool {
        if !error.requires_login() {
            return false;
        }
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear credentials after session loss");
        }
        true
    }
}
