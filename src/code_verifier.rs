/// PKCE code verifier, see <https://datatracker.ietf.org/doc/html/rfc7636>.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CodeVerifier<const LENGTH: usize> {
    code_verifier: String,
}

impl<const LENGTH: usize> CodeVerifier<LENGTH> {
    const VALID_LENGTH: () = assert!(
        LENGTH >= 43 && LENGTH <= 128,
        "Invalid code verifier length"
    );

    pub(crate) fn generate() -> Self {
        use rand::Rng;

        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_LENGTH;

        const CHARSET: &[u8] =
            b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
        let mut rng = rand::rng();

        let code_verifier = (0..LENGTH)
            .map(|_i| CHARSET[rng.random_range(0..CHARSET.len())] as char)
            .collect::<String>();

        Self { code_verifier }
    }

    pub(crate) fn to_code_challenge(&self) -> CodeChallenge {
        use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
        use sha2::Digest;

        let mut hasher = sha2::Sha256::new();
        hasher.update(self.code_verifier.as_bytes());
        let digest = hasher.finalize();

        let code_challenge = URL_SAFE_NO_PAD.encode(digest);

        CodeChallenge {
            code_challenge,
            code_challenge_method: CodeChallengeMethod::S256,
        }
    }

    pub fn code_verifier(&self) -> &str {
        self.code_verifier.as_str()
    }
}

impl<const LENGTH: usize> std::fmt::Debug for CodeVerifier<LENGTH> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeVerifier")
            .field("code_verifier", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeChallengeMethod {
    S256,
}

impl CodeChallengeMethod {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            CodeChallengeMethod::S256 => "S256",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChallenge {
    code_challenge: String,
    code_challenge_method: CodeChallengeMethod,
}

impl CodeChallenge {
    pub fn code_challenge(&self) -> &str {
        self.code_challenge.as_str()
    }

    pub fn code_challenge_method(&self) -> CodeChallengeMethod {
        self.code_challenge_method
    }
}
