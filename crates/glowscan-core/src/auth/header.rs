const BEARER_PREFIX: &str = "Bearer ";

/// Turn a stored token into an `Authorization` header value.
///
/// A raw token gets the `Bearer ` prefix. A value that already starts with
/// it, in any casing, is rewritten to the canonical `Bearer ` casing.
pub fn format_bearer(token: &str) -> String {
    match strip_bearer(token) {
        Some(rest) => format!("{}{}", BEARER_PREFIX, rest),
        None => format!("{}{}", BEARER_PREFIX, token),
    }
}

/// The token part of a `Bearer ` value, if the prefix is present.
pub fn strip_bearer(value: &str) -> Option<&str> {
    let prefix = value.get(..BEARER_PREFIX.len())?;
    prefix
        .eq_ignore_ascii_case(BEARER_PREFIX)
        .then(|| &value[BEARER_PREFIX.len()..])
}
