//! HTTP Basic authentication against the configured user list.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::config::AuthConfig;

/// Split a `Basic` authorization header value into user and password.
pub fn parse_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_owned(), password.to_owned()))
}

/// Check a user's password, and group membership when a group is required.
pub fn validate_user(config: &AuthConfig, username: &str, password: &str) -> bool {
    let Some(user) = config.users.iter().find(|u| u.username == username) else {
        tracing::debug!(username, "Unknown user");
        return false;
    };

    if let Some(group) = &config.require_group {
        if !user.groups.contains(group) {
            tracing::debug!(username, group, "User not in required group");
            return false;
        }
    }

    match bcrypt::verify(password, &user.password_hash) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::warn!(username, "Password verification error: {e}");
            false
        }
    }
}

/// Decide whether a request carrying `authorization` may proceed.
pub fn authorize(config: &AuthConfig, authorization: Option<&str>) -> bool {
    if !config.enabled {
        return true;
    }

    match authorization.and_then(parse_basic) {
        Some((user, password)) => validate_user(config, &user, &password),
        None => false,
    }
}

/// The 401 response asking the client for credentials.
pub fn unauthorized(realm: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 401 Unauthorized\r\nWWW-Authenticate: Basic realm=\"{realm}\"\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    )
    .into_bytes()
}

/// Generate a bcrypt password hash
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}
