use subtle::ConstantTimeEq;

/// Cryptographically secure token used to avoid CSRF attacks. Sent as the `state` parameter of
/// an authorization request and expected back unchanged on the callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CsrfToken {
    csrf_token: String,
}

impl CsrfToken {
    /// Generate a new cryptographically secure CSRF token, using 32 bytes of cryptographically
    /// secure random data, base64 url encoded as a 43 character string.
    pub fn new() -> Self {
        use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
        use rand::Rng;

        let mut rng = rand::rng();
        let bytes: [u8; 32] = rng.random();
        let csrf_token = URL_SAFE_NO_PAD.encode(bytes);

        Self { csrf_token }
    }

    pub fn as_str(&self) -> &str {
        &self.csrf_token
    }

    /// Compare against a returned value in constant time.
    pub fn matches(&self, returned: &str) -> bool {
        self.csrf_token.as_bytes().ct_eq(returned.as_bytes()).into()
    }
}

impl Default for CsrfToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn generate_token_on_creation() {
        let token = CsrfToken::new();
        assert_that(token.as_str()).is_not_empty().has_length(43);
    }

    #[test]
    fn tokens_are_unique() {
        let mut tokens = HashSet::new();

        for _ in 0..100 {
            assert_that(tokens.insert(CsrfToken::new()))
                .with_detail_message("Generated duplicate token.")
                .with_detail_message(format!("{tokens:?}"))
                .is_true();
        }
    }

    #[test]
    fn matches_only_its_own_value() {
        let token = CsrfToken::new();
        let other = CsrfToken::new();
        assert_that(token.matches(token.as_str())).is_true();
        assert_that(token.matches(other.as_str())).is_false();
        assert_that(token.matches("")).is_false();
        assert_that(token.matches(&token.as_str()[..42])).is_false();
    }
}
