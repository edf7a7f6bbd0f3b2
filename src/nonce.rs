use subtle::ConstantTimeEq;

/// Random value bound to a single authorization request. The provider copies it into the ID
/// token, which ties the token to the login attempt that requested it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Nonce {
    nonce: String,
}

impl Nonce {
    /// 32 bytes of cryptographically secure random data, base64 url encoded.
    pub fn new() -> Self {
        use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
        use rand::Rng;

        let bytes: [u8; 32] = rand::rng().random();
        Self {
            nonce: URL_SAFE_NO_PAD.encode(bytes),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.nonce
    }

    pub fn matches(&self, claimed: &str) -> bool {
        self.nonce.as_bytes().ct_eq(claimed.as_bytes()).into()
    }
}

impl Default for Nonce {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;

    #[test]
    fn nonces_differ() {
        let a = Nonce::new();
        let b = Nonce::new();
        assert_that(a.as_str()).has_length(43);
        assert_that(a.matches(b.as_str())).is_false();
        assert_that(a.matches(a.as_str())).is_true();
    }
}
