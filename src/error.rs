use crate::config::ConfigError;
use crate::internal::derived_urls::DerivedUrlError;
use crate::request::RequestError;
use crate::response::ErrorResponse;
use crate::step_up::StepUpPolicyError;
use crate::token_claims::UserinfoClaimsError;
use crate::token_validation::JwtValidationError;
use snafu::Snafu;

/// Failures while resolving the provider's discovery document or signing keys.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DiscoveryError {
    #[snafu(display("DiscoveryError: Could not build discovery endpoint from issuer"))]
    DiscoveryEndpoint { source: url::ParseError },

    #[snafu(display("DiscoveryError: Could not retrieve provider metadata"))]
    Metadata { source: RequestError },

    #[snafu(display(
        "DiscoveryError: Provider metadata names issuer {found:?}, expected {expected:?}"
    ))]
    IssuerMismatch { expected: String, found: String },

    #[snafu(display("DiscoveryError: Provider metadata lacks a usable endpoint"))]
    Endpoint { source: DerivedUrlError },

    #[snafu(display("DiscoveryError: Could not retrieve JWK set"))]
    JwkSet { source: RequestError },
}

/// Errors returned by the relying party. Every variant rejects the current login attempt.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AuthError {
    #[snafu(display("AuthError: Invalid configuration"))]
    Config { source: ConfigError },

    #[snafu(display("AuthError: Could not create HTTP client"))]
    HttpClient { source: reqwest::Error },

    #[snafu(display("AuthError: Provider discovery failed"))]
    Discovery { source: DiscoveryError },

    #[snafu(display("AuthError: No signing key found for 'kid' {kid:?} after refresh"))]
    UnknownKey { kid: Option<String> },

    #[snafu(display("AuthError: Returned state does not match the pending login"))]
    StateMismatch,

    #[snafu(display("AuthError: No pending login in session"))]
    MissingPendingLogin,

    #[snafu(display("AuthError: ID token nonce does not match the pending login"))]
    NonceMismatch,

    #[snafu(display(
        "AuthError: Authorization response issuer {found:?} does not match {expected:?}"
    ))]
    ResponseIssuerMismatch {
        expected: String,
        found: Option<String>,
    },

    #[snafu(display("AuthError: Provider returned an error: {error_response}"))]
    AuthorizationResponse { error_response: ErrorResponse },

    #[snafu(display("AuthError: Callback carries neither 'code' nor 'error'"))]
    MalformedCallback,

    #[snafu(display("AuthError: Code exchange failed"))]
    TokenExchange { source: RequestError },

    #[snafu(display("AuthError: ID token validation failed"))]
    TokenValidation { source: JwtValidationError },

    #[snafu(display("AuthError: Could not fetch user claims"))]
    Userinfo { source: RequestError },

    #[snafu(display("AuthError: Signed userinfo response failed validation"))]
    UserinfoValidation { source: JwtValidationError },

    #[snafu(display("AuthError: Unusable userinfo claims"))]
    UserinfoClaims { source: UserinfoClaimsError },

    #[snafu(display("AuthError: Unknown step-up policy"))]
    StepUpPolicy { source: StepUpPolicyError },
}

impl AuthError {
    /// Whether this error was caused by an IdP call that did not answer in time.
    pub fn is_timeout(&self) -> bool {
        match self {
            AuthError::Discovery { source } => match source {
                DiscoveryError::Metadata { source } | DiscoveryError::JwkSet { source } => {
                    source.is_timeout()
                }
                _ => false,
            },
            AuthError::TokenExchange { source } => source.is_timeout(),
            AuthError::Userinfo { source } => source.is_timeout(),
            _ => false,
        }
    }

    /// Whether this error is one of the CSRF correlation failures.
    pub fn is_csrf_failure(&self) -> bool {
        matches!(
            self,
            AuthError::StateMismatch
                | AuthError::MissingPendingLogin
                | AuthError::NonceMismatch
                | AuthError::ResponseIssuerMismatch { .. }
        )
    }
}
