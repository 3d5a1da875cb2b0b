//! Token authentication for the dotfile server
//!
//! Users authenticate with `username:token`. Tokens are random and only
//! their bcrypt hash is stored.

/// bcrypt cost for stored token hashes
pub const TOKEN_HASH_COST: u32 = 8;

/// Authentication result
#[derive(Debug, Clone, PartialEq)]
pub enum AuthResult {
    /// Authentication successful with the user id
    Success(i64),
    /// Unknown user or wrong token
    Failed,
}

/// Create a new random API token
pub fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Hash a token for storage
pub fn hash_token(token: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(token, TOKEN_HASH_COST)
}

/// Check a token against its stored hash; malformed hashes never verify
pub fn verify_token(token: &str, hash: &str) -> bool {
    bcrypt::verify(token, hash).unwrap_or(false)
}

/// Split an HTTP Basic `Authorization` header value into username and token
pub fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    use base64::Engine;

    let encoded = header.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, token) = decoded.split_once(':')?;
    if username.is_empty() || token.is_empty() {
        return None;
    }
    Some((username.to_string(), token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_hash_verify() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        let hash = hash_token(&token).unwrap();
        assert!(verify_token(&token, &hash));
        assert!(!verify_token("wrong", &hash));
        assert!(!verify_token(&token, "not a bcrypt hash"));
    }

    #[test]
    fn test_parse_basic_auth() {
        // "alice:s3cret"
        let parsed = parse_basic_auth("Basic YWxpY2U6czNjcmV0").unwrap();
        assert_eq!(parsed, ("alice".to_string(), "s3cret".to_string()));
        assert!(parse_basic_auth("Bearer abc").is_none());
        assert!(parse_basic_auth("Basic !!!").is_none());
    }
}
