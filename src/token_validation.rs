use crate::token_claims::StandardIdTokenClaims;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use snafu::{ResultExt, Snafu, ensure};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum JwtValidationError {
    #[snafu(display(
        "JwtValidationError: Could not decode JWT header. Input may have the wrong format"
    ))]
    DecodeHeader { source: jsonwebtoken::errors::Error },

    #[snafu(display("JwtValidationError: JWT is signed with {found:?}, expected {expected:?}"))]
    DisallowedAlgorithm {
        expected: Algorithm,
        found: Algorithm,
    },

    #[snafu(display("JwtValidationError: Could not construct DecodingKey from JWK"))]
    JwkToDecodingKey { source: jsonwebtoken::errors::Error },

    #[snafu(display("JwtValidationError: Signature does not verify"))]
    InvalidSignature,

    #[snafu(display("JwtValidationError: Token expired"))]
    Expired,

    #[snafu(display("JwtValidationError: Unexpected 'iss'"))]
    InvalidIssuer,

    #[snafu(display("JwtValidationError: 'aud' does not contain our client_id"))]
    InvalidAudience,

    #[snafu(display("JwtValidationError: Token was issued to another party: {azp:?}"))]
    InvalidAuthorizedParty { azp: String },

    #[snafu(display("JwtValidationError: Required claim {claim:?} is missing"))]
    MissingClaim { claim: String },

    #[snafu(display("JwtValidationError: Could not decode JWT"))]
    Decode { source: jsonwebtoken::errors::Error },
}

impl From<jsonwebtoken::errors::Error> for JwtValidationError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => JwtValidationError::InvalidSignature,
            ErrorKind::ExpiredSignature => JwtValidationError::Expired,
            ErrorKind::InvalidIssuer => JwtValidationError::InvalidIssuer,
            ErrorKind::InvalidAudience => JwtValidationError::InvalidAudience,
            ErrorKind::MissingRequiredClaim(claim) => JwtValidationError::MissingClaim {
                claim: claim.clone(),
            },
            _ => JwtValidationError::Decode { source: err },
        }
    }
}

/// What a JWT issued to us by the configured provider must satisfy.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Expectations<'a> {
    pub(crate) issuer: &'a str,
    pub(crate) client_id: &'a str,
    pub(crate) algorithm: Algorithm,
    pub(crate) leeway: Duration,
}

impl Expectations<'_> {
    fn validation(&self, required_claims: &[&str]) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[self.client_id]);
        validation.set_issuer(&[self.issuer]);
        validation.set_required_spec_claims(required_claims);
        validation.leeway = self.leeway.as_secs();
        validation
    }
}

/// Decode the JWT header without verifying anything but the signing algorithm, which must be
/// the one we configured. The header tells us which key to resolve.
pub(crate) fn decode_header(
    raw_jwt: &str,
    expected_algorithm: Algorithm,
) -> Result<Header, JwtValidationError> {
    let header = jsonwebtoken::decode_header(raw_jwt).context(DecodeHeaderSnafu {})?;
    tracing::trace!(?header, "Decoded JWT header");
    ensure!(
        header.alg == expected_algorithm,
        DisallowedAlgorithmSnafu {
            expected: expected_algorithm,
            found: header.alg,
        }
    );
    Ok(header)
}

/// Verify signature, `iss`, `aud`, `exp` and `azp` of an ID token.
///
/// The `nonce` is not checked here. It belongs to the pending login and is verified by the
/// caller once the claims are available.
pub(crate) fn validate_id_token(
    raw_id_token: &str,
    jwk: &Jwk,
    expectations: &Expectations<'_>,
) -> Result<StandardIdTokenClaims, JwtValidationError> {
    let validation = expectations.validation(&["exp", "iss", "aud", "sub"]);
    let claims: StandardIdTokenClaims = decode(raw_id_token, jwk, &validation)?;

    if let Some(azp) = claims.azp.as_deref() {
        ensure!(
            azp == expectations.client_id,
            InvalidAuthorizedPartySnafu { azp }
        );
    }

    tracing::trace!(?claims, "Validated ID token");
    Ok(claims)
}

/// Verify a signed userinfo response. Such a response must be issued by our provider and be
/// addressed to us, but is not required to expire.
pub(crate) fn validate_userinfo_jwt(
    raw_userinfo: &str,
    jwk: &Jwk,
    expectations: &Expectations<'_>,
) -> Result<serde_json::Map<String, serde_json::Value>, JwtValidationError> {
    let validation = expectations.validation(&["iss", "aud", "sub"]);
    decode(raw_userinfo, jwk, &validation)
}

fn decode<T: DeserializeOwned>(
    raw_jwt: &str,
    jwk: &Jwk,
    validation: &Validation,
) -> Result<T, JwtValidationError> {
    let decoding_key = DecodingKey::from_jwk(jwk).context(JwkToDecodingKeySnafu {})?;
    let token_data = jsonwebtoken::decode::<T>(raw_jwt, &decoding_key, validation)?;
    Ok(token_data.claims)
}
