//! # oidc-relying-party
//!
//! OpenID Connect relying party (authorization code flow) with support for step-up
//! authentication through ACR/AMR claims.
//!
//! Create a single [`RelyingParty`] at startup and share it. Per user-agent state lives in a
//! [`Session`], which your application stores wherever it keeps session data.
//!
//! ```no_run
//! use oidc_relying_party::{CallbackQuery, Options, RelyingParty, Session};
//!
//! # async fn run(callback_url: oidc_relying_party::url::Url) -> Result<(), Box<dyn std::error::Error>> {
//! let rp = RelyingParty::new(Options::from_env()?)?;
//! let mut session = Session::new();
//!
//! // Redirect the user agent here. Ask for two factors this time.
//! let login_url = rp.begin_login(&mut session, Some("force-2fa")).await?;
//!
//! // ... and handle the redirect back to `CALLBACK_URL`.
//! let claims = rp
//!     .complete_login(&mut session, &CallbackQuery::from_url(&callback_url))
//!     .await?;
//! println!("Hello, {}", claims.subject);
//!
//! if let Some(evaluation) = rp.evaluate_step_up(&session) {
//!     println!("Step-up satisfied: {}", evaluation.satisfied);
//! }
//!
//! let logout_url = rp.logout(session).await?;
//! # Ok(())
//! # }
//! ```

mod authorization;
mod code_verifier;
mod config;
mod csrf_token;
mod error;
mod internal;
mod login;
mod logout;
mod nonce;
mod oidc;
mod pending_login;
mod provider;
mod request;
mod response;
mod session;
mod state;
mod step_up;
mod time_ext;
mod token;
mod token_claims;
mod token_validation;

// Library exports.
pub use authorization::*;
pub use code_verifier::{CodeChallenge, CodeChallengeMethod, CodeVerifier};
pub use config::*;
pub use csrf_token::CsrfToken;
pub use error::{AuthError, DiscoveryError};
pub use internal::derived_urls::DerivedUrlError;
pub use internal::{JwkSetWithTimestamp, OidcConfigWithTimestamp};
pub use login::login_url;
pub use logout::end_session_url;
pub use nonce::Nonce;
pub use oidc::{OidcConfig, RpInitiatedLogoutClaims, StandardDiscoveryClaims};
pub use pending_login::PendingLogin;
pub use provider::ProviderMetadataResolver;
pub use request::RequestError;
pub use response::{CallbackQuery, ErrorResponse, KnownOidcErrorCode, OidcErrorCode};
pub use session::{EstablishedLogin, Session};
pub use state::{LoginPhase, RelyingParty};
pub use step_up::*;
pub use token::{IdToken, TokenSet};
pub use token_claims::{Audiences, IdentityClaims, UserinfoClaimsError};
pub use token_validation::JwtValidationError;
pub mod url {
    pub use url::Url;
}

type DiscoveryEndpoint = url::Url;
type JwkSetEndpoint = url::Url;
type AuthorizationEndpoint = url::Url;
type TokenEndpoint = url::Url;
type UserinfoEndpoint = url::Url;
type EndSessionEndpoint = url::Url;
