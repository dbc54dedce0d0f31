//! Anti-forgery tokens required by the mutating endpoints.
//!
//! One token is issued per session and kept in it; a request passes only
//! when the token it carries matches the one stored in its own session.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use tower_sessions::session;
use tower_sessions::Session;

/// Random bytes per token before encoding.
const NONCE_BYTES: usize = 32;

/// Session key under which the token is stored.
pub const NONCE_SESSION_KEY: &str = "nonce";

/// Generate a random URL-safe token.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0_u8; NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Return the session's token, creating and storing one if needed.
///
/// # Errors
/// Returns an error if the session cannot be read or written.
pub async fn issue(session: &Session) -> Result<String, session::Error> {
    if let Some(token) = session.get::<String>(NONCE_SESSION_KEY).await? {
        return Ok(token);
    }

    let token = generate_token();
    session.insert(NONCE_SESSION_KEY, token.clone()).await?;
    Ok(token)
}

/// Whether `token` is the one stored in `session`.
pub async fn verify(session: &Session, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }

    match session.get::<String>(NONCE_SESSION_KEY).await {
        Ok(Some(expected)) => expected == token,
        Ok(None) => false,
        Err(err) => {
            tracing::warn!(error = %err, "failed to read session token");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique_and_url_safe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
