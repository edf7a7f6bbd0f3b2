use crate::{
    config::Options,
    oidc::OidcConfig,
    response::{ErrorResponse, TokenResponse},
    token::TokenData,
};
use http::StatusCode;
use serde::Deserialize;
use snafu::{ResultExt, Snafu};
use std::collections::HashMap;
use url::Url;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RequestError {
    #[snafu(display("RequestError: Refusing plaintext request to {url}"))]
    PlaintextForbidden { url: Url },

    #[snafu(display("RequestError: Could not send request"))]
    Send { source: reqwest::Error },

    #[snafu(display("RequestError: Could not decode payload"))]
    Decode { source: reqwest::Error },

    #[snafu(display("RequestError: Received an error response ({status}): {error_response}"))]
    ErrResponse {
        status: StatusCode,
        error_response: ErrorResponse,
    },

    #[snafu(display("RequestError: Received unexpected status {status}"))]
    Status { status: StatusCode },

    #[snafu(display("RequestError: Malformed response: {reason}"))]
    Malformed { reason: String },
}

impl RequestError {
    pub fn is_timeout(&self) -> bool {
        match self {
            RequestError::Send { source } | RequestError::Decode { source } => {
                source.is_timeout()
            }
            _ => false,
        }
    }
}

/// Shared HTTP client for all calls to the identity provider.
///
/// Every request is bounded by the configured timeout. Unless plaintext was explicitly allowed,
/// `http://` endpoints are refused before anything is sent.
#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    client: reqwest::Client,
    allow_plaintext_http: bool,
}

impl HttpClient {
    pub(crate) fn new(options: &Options) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(options.advanced.request_timeout)
            .https_only(!options.allow_plaintext_http)
            .build()?;
        Ok(Self {
            client,
            allow_plaintext_http: options.allow_plaintext_http,
        })
    }

    fn guard(&self, url: &Url) -> Result<(), RequestError> {
        match (url.scheme(), self.allow_plaintext_http) {
            ("https", _) | ("http", true) => Ok(()),
            _ => PlaintextForbiddenSnafu { url: url.clone() }.fail(),
        }
    }
}

pub(crate) async fn retrieve_jwk_set(
    http: &HttpClient,
    jwk_set_endpoint: &Url,
) -> Result<jsonwebtoken::jwk::JwkSet, RequestError> {
    #[derive(Deserialize)]
    pub struct RawJwkSet {
        pub keys: Vec<serde_json::Value>,
    }
    http.guard(jwk_set_endpoint)?;
    let response = http
        .client
        .get(jwk_set_endpoint.clone())
        .send()
        .await
        .context(SendSnafu {})?;
    if !response.status().is_success() {
        return StatusSnafu {
            status: response.status(),
        }
        .fail();
    }
    let raw_set = response
        .json::<RawJwkSet>()
        .await
        .context(DecodeSnafu {})?;
    let mut set = jsonwebtoken::jwk::JwkSet { keys: Vec::new() };
    for key in raw_set.keys {
        match serde_json::from_value::<jsonwebtoken::jwk::Jwk>(key) {
            Ok(parsed) => set.keys.push(parsed),
            Err(err) => tracing::warn!(?err, "Found non-decodable JWK"),
        }
    }
    Ok(set)
}

pub(crate) async fn retrieve_oidc_config(
    http: &HttpClient,
    discovery_endpoint: &Url,
) -> Result<OidcConfig, RequestError> {
    http.guard(discovery_endpoint)?;
    let response = http
        .client
        .get(discovery_endpoint.clone())
        .send()
        .await
        .context(SendSnafu {})?;
    if !response.status().is_success() {
        return StatusSnafu {
            status: response.status(),
        }
        .fail();
    }
    response.json::<OidcConfig>().await.context(DecodeSnafu {})
}

/// Parameters of an `authorization_code` grant using `client_secret_post` authentication.
pub(crate) struct CodeExchange<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    /// Only sent if the authorization request carried one.
    pub redirect_uri: Option<&'a str>,
    pub code: &'a str,
    pub code_verifier: Option<&'a str>,
}

impl CodeExchange<'_> {
    fn to_params(&self) -> HashMap<&'static str, &str> {
        let mut params: HashMap<&str, &str> = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("client_id", self.client_id);
        params.insert("client_secret", self.client_secret);
        if let Some(redirect_uri) = self.redirect_uri {
            params.insert("redirect_uri", redirect_uri);
        }
        params.insert("code", self.code);
        if let Some(code_verifier) = self.code_verifier {
            params.insert("code_verifier", code_verifier);
        }
        params
    }
}

pub(crate) async fn exchange_code_for_token(
    http: &HttpClient,
    token_endpoint: &Url,
    exchange: CodeExchange<'_>,
) -> Result<TokenData, RequestError> {
    http.guard(token_endpoint)?;
    let response = http
        .client
        .post(token_endpoint.clone())
        .form(&exchange.to_params())
        .send()
        .await
        .context(SendSnafu {})?;
    let status = response.status();
    let body = response.bytes().await.context(DecodeSnafu {})?;

    if !status.is_success() {
        return match serde_json::from_slice::<ErrorResponse>(&body) {
            Ok(error_response) => ErrResponseSnafu {
                status,
                error_response,
            }
            .fail(),
            Err(_) => StatusSnafu { status }.fail(),
        };
    }

    match serde_json::from_slice::<TokenResponse>(&body) {
        Ok(TokenResponse::Success(success)) => TokenData::try_from(success),
        Ok(TokenResponse::Error(error_response)) => ErrResponseSnafu {
            status,
            error_response,
        }
        .fail(),
        Err(err) => MalformedSnafu {
            reason: format!("token response is not valid JSON: {err}"),
        }
        .fail(),
    }
}

/// Body of a userinfo response. Which variant is returned depends on the content type the
/// provider answered with.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UserinfoResponse {
    Claims(serde_json::Map<String, serde_json::Value>),
    SignedJwt(String),
}

pub(crate) async fn fetch_userinfo(
    http: &HttpClient,
    userinfo_endpoint: &Url,
    access_token: &str,
) -> Result<UserinfoResponse, RequestError> {
    http.guard(userinfo_endpoint)?;
    let response = http
        .client
        .get(userinfo_endpoint.clone())
        .bearer_auth(access_token)
        .send()
        .await
        .context(SendSnafu {})?;
    if !response.status().is_success() {
        return StatusSnafu {
            status: response.status(),
        }
        .fail();
    }

    let is_jwt = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|it| it.to_str().ok())
        .is_some_and(|it| it.starts_with("application/jwt"));

    if is_jwt {
        let jwt = response.text().await.context(DecodeSnafu {})?;
        Ok(UserinfoResponse::SignedJwt(jwt.trim().to_owned()))
    } else {
        response
            .json::<serde_json::Map<String, serde_json::Value>>()
            .await
            .context(DecodeSnafu {})
            .map(UserinfoResponse::Claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;

    fn options(allow_plaintext_http: bool) -> Options {
        let mut options = Options::from_vars([
            ("PC_PROVIDER", "https://idp.example.com"),
            ("PC_CLIENT_ID", "client"),
            ("PC_CLIENT_SECRET", "secret"),
            ("HOST", "http://localhost:3000"),
            ("CALLBACK_URL", "/login-callback"),
        ])
        .unwrap();
        options.allow_plaintext_http = allow_plaintext_http;
        options
    }

    #[test]
    fn plaintext_endpoints_are_refused_by_default() {
        let http = HttpClient::new(&options(false)).unwrap();
        let result = http.guard(&Url::parse("http://idp.example.com/token").unwrap());
        assert_that(matches!(result, Err(RequestError::PlaintextForbidden { .. }))).is_true();
        assert_that(
            http.guard(&Url::parse("https://idp.example.com/token").unwrap())
                .is_ok(),
        )
        .is_true();
    }

    #[test]
    fn plaintext_endpoints_pass_when_allowed() {
        let http = HttpClient::new(&options(true)).unwrap();
        assert_that(
            http.guard(&Url::parse("http://localhost:8080/token").unwrap())
                .is_ok(),
        )
        .is_true();
    }

    #[test]
    fn code_exchange_uses_client_secret_post() {
        let exchange = CodeExchange {
            client_id: "client",
            client_secret: "secret",
            redirect_uri: Some("http://localhost:3000/login-callback"),
            code: "abc",
            code_verifier: None,
        };
        let params = exchange.to_params();
        assert_that(params.get("grant_type").copied()).is_equal_to(Some("authorization_code"));
        assert_that(params.get("client_secret").copied()).is_equal_to(Some("secret"));
        assert_that(params.get("code").copied()).is_equal_to(Some("abc"));
        assert_that(params.get("redirect_uri").copied())
            .is_equal_to(Some("http://localhost:3000/login-callback"));
        assert_that(params.contains_key("code_verifier")).is_false();
    }
}
