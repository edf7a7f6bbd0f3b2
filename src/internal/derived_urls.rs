use crate::oidc::OidcConfig;
use crate::{
    AuthorizationEndpoint, EndSessionEndpoint, JwkSetEndpoint, TokenEndpoint, UserinfoEndpoint,
};
use snafu::{OptionExt, ResultExt, Snafu};
use url::Url;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DerivedUrlError {
    #[snafu(display("DerivedUrlError: Could not parse {field}"))]
    Parsing {
        field: &'static str,
        source: url::ParseError,
    },

    #[snafu(display("DerivedUrlError: oidc_config.standard_claims.token_endpoint is None"))]
    NoTokenEndpoint,

    #[snafu(display("DerivedUrlError: oidc_config.standard_claims.userinfo_endpoint is None"))]
    NoUserinfoEndpoint,

    #[snafu(display(
        "DerivedUrlError: oidc_config.rp_initialized_claims.end_session_endpoint is None"
    ))]
    NoEndSessionEndpoint,
}

fn parse(field: &'static str, raw: &str) -> Result<Url, DerivedUrlError> {
    Url::parse(raw).context(ParsingSnafu { field })
}

pub(crate) fn jwks_endpoint(oidc_config: &OidcConfig) -> Result<JwkSetEndpoint, DerivedUrlError> {
    parse("jwks_uri", &oidc_config.standard_claims.jwks_uri)
}

pub(crate) fn authorization_endpoint(
    oidc_config: &OidcConfig,
) -> Result<AuthorizationEndpoint, DerivedUrlError> {
    parse(
        "authorization_endpoint",
        &oidc_config.standard_claims.authorization_endpoint,
    )
}

pub(crate) fn token_endpoint(oidc_config: &OidcConfig) -> Result<TokenEndpoint, DerivedUrlError> {
    let raw = oidc_config
        .standard_claims
        .token_endpoint
        .as_deref()
        .context(NoTokenEndpointSnafu {})?;
    parse("token_endpoint", raw)
}

pub(crate) fn userinfo_endpoint(
    oidc_config: &OidcConfig,
) -> Result<UserinfoEndpoint, DerivedUrlError> {
    let raw = oidc_config
        .standard_claims
        .userinfo_endpoint
        .as_deref()
        .context(NoUserinfoEndpointSnafu {})?;
    parse("userinfo_endpoint", raw)
}

pub(crate) fn end_session_endpoint(
    oidc_config: &OidcConfig,
) -> Result<EndSessionEndpoint, DerivedUrlError> {
    let raw = oidc_config
        .rp_initialized_claims
        .end_session_endpoint
        .as_deref()
        .context(NoEndSessionEndpointSnafu {})?;
    parse("end_session_endpoint", raw)
}
