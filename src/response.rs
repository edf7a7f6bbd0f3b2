use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use url::Url;

/// Query parameters received on the redirect URI after the user returned from the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CallbackQuery(HashMap<String, String>);

impl CallbackQuery {
    pub fn new(params: HashMap<String, String>) -> Self {
        Self(params)
    }

    /// Collect the query parameters of the full callback URL.
    pub fn from_url(url: &Url) -> Self {
        Self(url.query_pairs().into_owned().collect())
    }

    /// Parse a raw query string, with or without a leading `?`.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self(
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|it| !it.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallbackQuery {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// An enumeration representing the different callback responses of the authorization endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CallbackResponse {
    SuccessfulLogin(SuccessLoginResponse),
    Error(ErrorResponse),
}

/// A structure representing a successful login callback response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SuccessLoginResponse {
    pub code: String,
    pub state: Option<String>,

    /// Issuer identifier as of RFC 9207. Only sent by providers supporting it.
    pub iss: Option<String>,
}

impl CallbackResponse {
    /// An `error` parameter always wins. A callback carrying one never reaches the code exchange.
    pub(crate) fn from_query(query: &CallbackQuery) -> Option<Self> {
        if let Some(error) = query.get("error") {
            return Some(CallbackResponse::Error(ErrorResponse {
                error: OidcErrorCode::parse(error),
                error_description: query.get("error_description").map(str::to_owned),
                error_uri: query.get("error_uri").map(str::to_owned),
            }));
        }
        let code = query.get("code")?;
        Some(CallbackResponse::SuccessfulLogin(SuccessLoginResponse {
            code: code.to_owned(),
            state: query.get("state").map(str::to_owned),
            iss: query.get("iss").map(str::to_owned),
        }))
    }
}

/// An enumeration representing the response to token requests, including
/// success and error responses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub(crate) enum TokenResponse {
    Success(SuccessTokenResponse),
    Error(ErrorResponse),
}

/// A structure representing a successful token response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) struct SuccessTokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub scope: Option<String>,
}

/// See [RFC 6749 Section 4.1.2.1](https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1),
/// [Section 5.2](https://datatracker.ietf.org/doc/html/rfc6749#section-5.2) and
/// [OIDC Core 3.1.2.6](https://openid.net/specs/openid-connect-core-1_0.html#AuthError).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum KnownOidcErrorCode {
    /// The request is missing a required parameter, includes an unsupported parameter value
    /// (other than grant type), repeats a parameter, includes multiple credentials,
    /// utilizes more than one mechanism for authenticating the client, or is otherwise malformed.
    #[serde(rename = "invalid_request")]
    InvalidRequest,

    /// Client authentication failed (e.g., unknown client, no client authentication included,
    /// or unsupported authentication method).
    #[serde(rename = "invalid_client")]
    InvalidClient,

    /// The provided authorization grant (e.g., authorization code, resource owner credentials) or
    /// refresh token is invalid, expired, revoked, does not match the redirection URI used in the
    /// authorization request, or was issued to another client.
    #[serde(rename = "invalid_grant")]
    InvalidGrant,

    /// The authenticated client is not authorized to use this authorization grant type.
    #[serde(rename = "unauthorized_client")]
    UnauthorizedClient,

    /// The authorization grant type is not supported by the authorization server.
    #[serde(rename = "unsupported_grant_type")]
    UnsupportedGrantType,

    /// The requested scope is invalid, unknown, malformed, or exceeds the scope granted by the
    /// resource owner.
    #[serde(rename = "invalid_scope")]
    InvalidScope,

    /// The resource owner or authorization server denied the request.
    #[serde(rename = "access_denied")]
    AccessDenied,

    #[serde(rename = "server_error")]
    ServerError,

    #[serde(rename = "temporarily_unavailable")]
    TemporarilyUnavailable,

    /// The provider requires some form of end-user interaction to proceed.
    #[serde(rename = "interaction_required")]
    InteractionRequired,

    #[serde(rename = "login_required")]
    LoginRequired,

    #[serde(rename = "consent_required")]
    ConsentRequired,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OidcErrorCode {
    Known(KnownOidcErrorCode),
    Unknown(String),
}

impl OidcErrorCode {
    pub(crate) fn parse(raw: &str) -> Self {
        serde_json::from_value(serde_json::Value::String(raw.to_owned()))
            .unwrap_or_else(|_| OidcErrorCode::Unknown(raw.to_owned()))
    }

    pub fn as_str(&self) -> String {
        match self {
            OidcErrorCode::Known(known) => serde_json::to_value(known)
                .ok()
                .and_then(|it| it.as_str().map(str::to_owned))
                .unwrap_or_default(),
            OidcErrorCode::Unknown(raw) => raw.clone(),
        }
    }
}

/// OAuth/OIDC error response received from the provider, either as callback query parameters
/// or as the body of a failed token request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorResponse {
    /// The error code (e.g., `access_denied` or `invalid_grant`).
    pub error: OidcErrorCode,

    /// OPTIONAL. Human-readable ASCII text providing additional information.
    pub error_description: Option<String>,

    /// OPTIONAL. A URI identifying a human-readable web page with information about the error.
    pub error_uri: Option<String>,
}

impl Display for ErrorResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{} - {description}", self.error.as_str()),
            None => write!(f, "{}", self.error.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;

    #[test]
    fn deserialize_known_error_code() {
        let error = "invalid_grant";
        let parsed = serde_json::from_str::<OidcErrorCode>(&format!("\"{error}\"")).unwrap();
        assert_that(parsed).is_equal_to(OidcErrorCode::Known(KnownOidcErrorCode::InvalidGrant));
    }

    #[test]
    fn deserialize_unknown_error_code() {
        let parsed = OidcErrorCode::parse("some_unknown_error");
        assert_that(parsed).is_equal_to(OidcErrorCode::Unknown("some_unknown_error".to_owned()));
    }

    #[test]
    fn error_code_round_trips_to_its_wire_name() {
        assert_that(OidcErrorCode::parse("access_denied").as_str()).is_equal_to("access_denied");
        assert_that(OidcErrorCode::parse("custom").as_str()).is_equal_to("custom");
    }

    #[test]
    fn error_parameter_takes_precedence_over_code() {
        let query = CallbackQuery::parse(
            "?code=abc&state=xyz&error=access_denied&error_description=User%20cancelled",
        );
        let response = CallbackResponse::from_query(&query).unwrap();
        assert_that(response).is_equal_to(CallbackResponse::Error(ErrorResponse {
            error: OidcErrorCode::Known(KnownOidcErrorCode::AccessDenied),
            error_description: Some("User cancelled".to_owned()),
            error_uri: None,
        }));
    }

    #[test]
    fn parses_successful_login() {
        let url = Url::parse("http://localhost:3000/login-callback?code=abc&state=xyz").unwrap();
        let response = CallbackResponse::from_query(&CallbackQuery::from_url(&url)).unwrap();
        assert_that(response).is_equal_to(CallbackResponse::SuccessfulLogin(
            SuccessLoginResponse {
                code: "abc".to_owned(),
                state: Some("xyz".to_owned()),
                iss: None,
            },
        ));
    }

    #[test]
    fn empty_values_count_as_absent() {
        let query: CallbackQuery = [("code", ""), ("state", "xyz")].into_iter().collect();
        assert_that(CallbackResponse::from_query(&query).is_none()).is_true();
    }

    #[test]
    fn display_matches_provider_message() {
        let err = ErrorResponse {
            error: OidcErrorCode::Known(KnownOidcErrorCode::LoginRequired),
            error_description: Some("session expired".to_owned()),
            error_uri: None,
        };
        assert_that(err.to_string()).is_equal_to("login_required - session expired");
    }

    #[test]
    fn token_error_body_is_decoded_as_error() {
        let body = r#"{"error":"invalid_grant","error_description":"Code expired"}"#;
        let parsed = serde_json::from_str::<TokenResponse>(body).unwrap();
        assert_that(matches!(parsed, TokenResponse::Error(_))).is_true();
    }
}
