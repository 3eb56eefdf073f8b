use serde::{Deserialize, Serialize};

/// Body for `/auths/register` and `/auths/login`.
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Body for `/auths/verify-otp`.
#[derive(Debug, Clone, Serialize)]
pub struct OtpRequest<'a> {
    pub otp: &'a str,
}

/// Response shape shared by every identity service endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthEnvelope {
    pub code: Option<i64>,
    pub message: Option<String>,
    pub status: Option<String>,
    pub data: Option<AuthData>,
    #[serde(default)]
    pub is_verified: bool,
    /// Set by verify-otp.
    pub success: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthData {
    pub token: Option<TokenPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenPayload {
    pub access: Option<String>,
}

impl AuthEnvelope {
    /// The nested `data.token.access` value, if non-empty.
    pub fn access_token(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.token.as_ref())
            .and_then(|t| t.access.as_deref())
            .filter(|t| !t.trim().is_empty())
    }

    /// The login response that means "account found, OTP sent".
    pub fn is_user_fetched(&self) -> bool {
        self.code == Some(200) && self.message.as_deref() == Some("User fetched")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_register_response() {
        let json = r#"{"code":201,"message":"User created","data":{"token":{"access":"eyJhbGciOi.abc.def"}},"status":"success","is_verified":false}"#;
        let env: AuthEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.code, Some(201));
        assert_eq!(env.access_token(), Some("eyJhbGciOi.abc.def"));
        assert!(!env.is_verified);
        assert!(!env.is_user_fetched());
    }

    #[test]
    fn test_parse_login_response_without_token() {
        let json = r#"{"code":200,"message":"User fetched","status":"success"}"#;
        let env: AuthEnvelope = serde_json::from_str(json).unwrap();
        assert!(env.is_user_fetched());
        assert_eq!(env.access_token(), None);
    }

    #[test]
    fn test_empty_access_token_is_absent() {
        let json = r#"{"data":{"token":{"access":"  "}}}"#;
        let env: AuthEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.access_token(), None);
    }

    #[test]
    fn test_user_fetched_requires_exact_message() {
        let env = AuthEnvelope {
            code: Some(200),
            message: Some("user fetched".to_string()),
            ..Default::default()
        };
        assert!(!env.is_user_fetched());
    }
}
