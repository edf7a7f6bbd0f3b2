use crate::DiscoveryEndpoint;
use jsonwebtoken::Algorithm;
use snafu::{OptionExt, ResultExt, Snafu};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("ConfigError: Missing required value {key:?}"))]
    Missing { key: &'static str },

    #[snafu(display("ConfigError: Value of {key:?} is not a valid URL"))]
    InvalidUrl {
        key: &'static str,
        source: url::ParseError,
    },

    #[snafu(display("ConfigError: Value of {key:?} is not a supported JWS algorithm: {value:?}"))]
    InvalidAlgorithm { key: &'static str, value: String },

    #[snafu(display("ConfigError: Issuer {issuer} cannot be used as a base URL"))]
    CannotBeABase { issuer: Url },
}

/// Decides whether a set of `amr` values counts as multi-factor authentication.
///
/// Which method names express "MFA" is provider specific, so this is configurable.
#[derive(Clone)]
pub enum MfaPredicate {
    /// Satisfied if any of the listed methods was used.
    AnyOf(Vec<String>),

    /// Satisfied if at least this many distinct methods were used.
    DistinctMethods(usize),

    Custom(Arc<dyn Fn(&[String]) -> bool + Send + Sync>),
}

impl MfaPredicate {
    pub fn is_satisfied_by(&self, amr: &[String]) -> bool {
        match self {
            MfaPredicate::AnyOf(methods) => amr.iter().any(|it| methods.contains(it)),
            MfaPredicate::DistinctMethods(count) => {
                let mut distinct = amr.to_vec();
                distinct.sort();
                distinct.dedup();
                distinct.len() >= *count
            }
            MfaPredicate::Custom(predicate) => predicate(amr),
        }
    }
}

impl Default for MfaPredicate {
    fn default() -> Self {
        MfaPredicate::AnyOf(
            ["mfa", "otp", "totp", "hwk", "swk", "pop"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
        )
    }
}

impl Debug for MfaPredicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MfaPredicate::AnyOf(methods) => f.debug_tuple("AnyOf").field(methods).finish(),
            MfaPredicate::DistinctMethods(count) => {
                f.debug_tuple("DistinctMethods").field(count).finish()
            }
            MfaPredicate::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// ACR values accepted for each of the step-up policies requesting a specific assurance level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcrValueSets {
    pub consistency_checked_2fa: Vec<String>,
    pub self_asserted_2fa: Vec<String>,
    pub certification_dirigeant: Vec<String>,
}

/// Immutable relying party configuration. Build it once at startup and hand it to
/// [`crate::RelyingParty::new`].
#[derive(Clone)]
pub struct Options {
    /// Issuer identifier of the identity provider, e.g. "https://idp.example.com/api/v2".
    pub issuer: Url,

    pub client_id: String,

    /// Secret used for `client_secret_post` authentication at the token endpoint.
    pub client_secret: String,

    /// Public base URL of this application. Logout redirects back to its root.
    pub host: Url,

    /// Path on `host` the provider redirects to after login.
    pub callback_path: String,

    pub scopes: Vec<String>,

    pub login_hint: Option<String>,

    /// `acr_values` sent with every non step-up authorization request.
    pub acr_values: Option<Vec<String>>,

    pub id_token_signed_response_alg: Algorithm,

    /// When set, userinfo responses are expected as JWTs signed with this algorithm.
    pub userinfo_signed_response_alg: Option<Algorithm>,

    pub acr_value_sets: AcrValueSets,

    /// Provider specific `sp_name` parameter appended to every authorization request.
    pub extra_sp_name: Option<String>,

    /// Permit `http://` endpoints. Only meant for local development against a test provider.
    pub allow_plaintext_http: bool,

    /// Send a PKCE (S256) challenge with authorization requests.
    pub use_pkce: bool,

    pub mfa_predicate: MfaPredicate,

    pub advanced: AdvancedOptions,
}

impl Debug for Options {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("issuer", &self.issuer.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("host", &self.host.as_str())
            .field("callback_path", &self.callback_path)
            .field("scopes", &self.scopes)
            .field("login_hint", &self.login_hint)
            .field("acr_values", &self.acr_values)
            .field(
                "id_token_signed_response_alg",
                &self.id_token_signed_response_alg,
            )
            .field(
                "userinfo_signed_response_alg",
                &self.userinfo_signed_response_alg,
            )
            .field("acr_value_sets", &self.acr_value_sets)
            .field("extra_sp_name", &self.extra_sp_name)
            .field("allow_plaintext_http", &self.allow_plaintext_http)
            .field("use_pkce", &self.use_pkce)
            .field("mfa_predicate", &self.mfa_predicate)
            .field("advanced", &self.advanced)
            .finish()
    }
}

impl Options {
    pub(crate) fn discovery_endpoint(&self) -> Result<DiscoveryEndpoint, url::ParseError> {
        let issuer = self.issuer.as_str().trim_end_matches('/');
        Url::parse(&format!("{issuer}/.well-known/openid-configuration"))
    }

    /// Issuer as it must appear in `iss` claims. Trailing slashes are kept as configured.
    pub(crate) fn expected_issuer(&self) -> String {
        let raw = self.issuer.as_str();
        match self.issuer.path() {
            // `Url` always adds a slash to an empty path. The issuer usually has none.
            "/" => raw.trim_end_matches('/').to_owned(),
            _ => raw.to_owned(),
        }
    }

    /// `host` followed by the callback path. A path already present in `host` is kept.
    pub fn redirect_uri(&self) -> Result<Url, url::ParseError> {
        let mut host = self.host.clone();
        host.set_query(None);
        host.set_fragment(None);
        Url::parse(&format!(
            "{}/{}",
            host.as_str().trim_end_matches('/'),
            self.callback_path.trim_start_matches('/')
        ))
    }

    /// Where the user ends up after logout: `host` with a trailing slash.
    pub fn post_logout_redirect_uri(&self) -> Url {
        let mut url = self.host.clone();
        let path = format!("{}/", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);
        url
    }

    /// Build options from key/value pairs using the well known variable names
    /// (`PC_PROVIDER`, `PC_CLIENT_ID`, ...).
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Result<Self, ConfigError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();
        let get = |key: &'static str| vars.get(key).map(|it| it.trim().to_owned());
        let require = |key: &'static str| get(key).context(MissingSnafu { key });
        let url = |key: &'static str| -> Result<Url, ConfigError> {
            Url::parse(&require(key)?).context(InvalidUrlSnafu { key })
        };
        let algorithm = |key: &'static str, value: String| -> Result<Algorithm, ConfigError> {
            Algorithm::from_str(&value).map_err(|_| InvalidAlgorithmSnafu { key, value }.build())
        };

        let issuer = url("PC_PROVIDER")?;
        if issuer.cannot_be_a_base() {
            return CannotBeABaseSnafu { issuer }.fail();
        }

        let id_token_signed_response_alg = match get("PC_ID_TOKEN_SIGNED_RESPONSE_ALG") {
            Some(value) => algorithm("PC_ID_TOKEN_SIGNED_RESPONSE_ALG", value)?,
            None => Algorithm::RS256,
        };
        let userinfo_signed_response_alg = get("PC_USERINFO_SIGNED_RESPONSE_ALG")
            .map(|value| algorithm("PC_USERINFO_SIGNED_RESPONSE_ALG", value))
            .transpose()?;

        let scopes = get("PC_SCOPES")
            .map(|it| split_list(&it))
            .unwrap_or_else(|| vec!["openid".to_owned()]);

        Ok(Self {
            issuer,
            client_id: require("PC_CLIENT_ID")?,
            client_secret: require("PC_CLIENT_SECRET")?,
            host: url("HOST")?,
            callback_path: require("CALLBACK_URL")?,
            scopes,
            login_hint: get("LOGIN_HINT"),
            acr_values: get("ACR_VALUES").map(|it| split_list(&it)),
            id_token_signed_response_alg,
            userinfo_signed_response_alg,
            acr_value_sets: AcrValueSets {
                consistency_checked_2fa: get("ACR_VALUE_FOR_CONSISTENCY_CHECKED_2FA")
                    .map(|it| split_list(&it))
                    .unwrap_or_default(),
                self_asserted_2fa: get("ACR_VALUE_FOR_SELF_ASSERTED_2FA")
                    .map(|it| split_list(&it))
                    .unwrap_or_default(),
                certification_dirigeant: get("ACR_VALUE_FOR_CERTIFICATION_DIRIGEANT")
                    .map(|it| split_list(&it))
                    .unwrap_or_default(),
            },
            extra_sp_name: get("EXTRA_PARAM_SP_NAME"),
            // Plaintext is an explicit opt-in. Anything but "False" forbids it.
            allow_plaintext_http: get("IS_HTTP_PROTOCOL_FORBIDDEN").as_deref() == Some("False"),
            use_pkce: get("USE_PKCE").as_deref() == Some("True"),
            mfa_predicate: get("MFA_AMR_VALUES")
                .map(|it| MfaPredicate::AnyOf(split_list(&it)))
                .unwrap_or_default(),
            advanced: AdvancedOptions::default(),
        })
    }

    /// Read options from the process environment, loading a `.env` file first if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            tracing::debug!(?err, "No .env file loaded");
        }
        Self::from_vars(std::env::vars())
    }
}

/// Splits comma or whitespace separated lists, dropping empty entries.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|it| !it.is_empty())
        .map(str::to_owned)
        .collect()
}

#[derive(Debug, Clone)]
pub struct AdvancedOptions {
    /// Upper bound for every single call to the identity provider.
    /// Defaults to `Duration::from_secs(10)`.
    pub request_timeout: Duration,

    /// Time after which a discovered OIDC config is considered too old.
    /// Defaults to `Duration::from_secs(60 * 5)`.
    pub max_oidc_config_age: Duration,

    /// Time after which the loaded JWK set is considered too old.
    /// Defaults to `Duration::from_secs(60 * 5)`.
    pub max_jwk_set_age: Duration,

    /// Allowed clock skew when checking `exp` and `auth_time`.
    /// Defaults to `Duration::from_secs(60)`.
    pub leeway: Duration,

    /// Query the userinfo endpoint after the ID token was validated.
    /// Defaults to `true`.
    pub fetch_userinfo: bool,
}

impl Default for AdvancedOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_oidc_config_age: Duration::from_secs(60 * 5),
            max_jwk_set_age: Duration::from_secs(60 * 5),
            leeway: Duration::from_secs(60),
            fetch_userinfo: true,
        }
    }
}
