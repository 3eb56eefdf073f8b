use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Request;
use tracing::{debug, warn};

use crate::auth::{format_bearer, CredentialStore};

/// Per-request policy that decorates outgoing calls with a bearer token.
///
/// 1. A request that already carries `Authorization` is left alone.
/// 2. Otherwise the access token is used if valid, else the session token.
/// 3. With no valid token the request goes out unauthenticated.
#[derive(Clone)]
pub struct RequestAuthenticator {
    store: Arc<CredentialStore>,
}

impl RequestAuthenticator {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }

    /// Returns true if a header was attached.
    pub fn authorize(&self, request: &mut Request) -> bool {
        if request.headers().contains_key(AUTHORIZATION) {
            debug!(url = %request.url(), "Caller supplied Authorization, passing through");
            return false;
        }

        let Some(token) = self.store.bearer() else {
            debug!(url = %request.url(), "No valid token, sending unauthenticated");
            return false;
        };

        match HeaderValue::from_str(&format_bearer(&token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, value);
                true
            }
            Err(e) => {
                warn!(error = %e, "Stored token is not a valid header value");
                false
            }
        }
    }
}
