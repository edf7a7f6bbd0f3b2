use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// OpenID Provider metadata as published at `{issuer}/.well-known/openid-configuration`.
///
/// See: <https://openid.net/specs/openid-connect-discovery-1_0.html#ProviderMetadata>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OidcConfig {
    #[serde(flatten)]
    pub standard_claims: StandardDiscoveryClaims,

    #[serde(flatten)]
    pub rp_initialized_claims: RpInitiatedLogoutClaims,

    /// Everything else the provider chose to publish.
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardDiscoveryClaims {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: Option<String>,
    pub userinfo_endpoint: Option<String>,
    pub jwks_uri: String,

    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub response_types_supported: Vec<String>,
    #[serde(default)]
    pub acr_values_supported: Vec<String>,
    #[serde(default)]
    pub claims_supported: Vec<String>,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
    #[serde(default)]
    pub userinfo_signing_alg_values_supported: Vec<String>,
    #[serde(default)]
    pub token_endpoint_auth_methods_supported: Vec<String>,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
    #[serde(default)]
    pub claims_parameter_supported: bool,

    /// RFC 9207. When `true`, every authorization response carries an `iss` parameter.
    #[serde(default)]
    pub authorization_response_iss_parameter_supported: bool,
}

/// See: <https://openid.net/specs/openid-connect-rpinitiated-1_0.html#OPMetadata>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpInitiatedLogoutClaims {
    pub end_session_endpoint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;

    #[test]
    fn deserializes_minimal_document() {
        let raw = serde_json::json!({
            "issuer": "https://idp.example.com",
            "authorization_endpoint": "https://idp.example.com/authorize",
            "token_endpoint": "https://idp.example.com/token",
            "jwks_uri": "https://idp.example.com/jwks",
            "end_session_endpoint": "https://idp.example.com/logout",
            "id_token_signing_alg_values_supported": ["RS256", "ES256"],
            "frontchannel_logout_supported": true,
        });
        let config: OidcConfig = serde_json::from_value(raw).unwrap();
        assert_that(config.standard_claims.issuer.as_str()).is_equal_to("https://idp.example.com");
        assert_that(config.standard_claims.userinfo_endpoint.is_none()).is_true();
        assert_that(config.rp_initialized_claims.end_session_endpoint.clone())
            .is_equal_to(Some("https://idp.example.com/logout".to_owned()));
        assert_that(config.standard_claims.id_token_signing_alg_values_supported.len())
            .is_equal_to(2);
        assert_that(config.additional.contains_key("frontchannel_logout_supported")).is_true();
    }

    #[test]
    fn rejects_document_without_jwks_uri() {
        let raw = serde_json::json!({
            "issuer": "https://idp.example.com",
            "authorization_endpoint": "https://idp.example.com/authorize",
        });
        assert_that(serde_json::from_value::<OidcConfig>(raw).is_err()).is_true();
    }
}
