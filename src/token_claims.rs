use serde::{Deserialize, Serialize};
use snafu::{OptionExt, Snafu, ensure};
use time::OffsetDateTime;

/// Claims names whose value is always taken from the signed ID token.
const ID_TOKEN_CLAIMS: [&str; 10] = [
    "iss",
    "sub",
    "aud",
    "exp",
    "iat",
    "auth_time",
    "nonce",
    "acr",
    "amr",
    "azp",
];

/// See: <https://openid.net/specs/openid-connect-core-1_0.html#IDToken>
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub(crate) struct StandardIdTokenClaims {
    pub(crate) iss: String,
    pub(crate) sub: String,
    pub(crate) aud: RawAudiences,
    pub(crate) exp: i64,
    pub(crate) iat: i64,
    pub(crate) auth_time: Option<i64>,
    pub(crate) nonce: Option<String>,
    pub(crate) acr: Option<String>,
    pub(crate) amr: Option<Vec<String>>,
    pub(crate) azp: Option<String>,
    #[serde(flatten)]
    pub(crate) remaining: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub(crate) enum RawAudiences {
    Single(String),
    Multiple(Vec<String>),
}

/// Identity of the end user, as asserted by a validated ID token and optionally enriched with
/// userinfo claims.
///
/// Only ever constructed from an ID token whose signature and standard claims were verified.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IdentityClaims {
    /// (`iss`) Issuer Identifier of the provider that authenticated the user.
    pub issuer: String,

    /// (`sub`) Locally unique and never reassigned identifier of the user within the issuer.
    pub subject: String,

    /// (`aud`) Audience(s) that the ID token is intended for. Always contains our `client_id`.
    pub audiences: Audiences,

    /// (`exp`) Expiration time of the ID token.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// (`iat`) Time at which the ID token was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    /// (`auth_time`) Time when the end-user authentication occurred. Required whenever
    /// `auth_time` was requested as an essential claim (see the `force-login` policy).
    #[serde(with = "time::serde::rfc3339::option")]
    pub auth_time: Option<OffsetDateTime>,

    /// (`nonce`) Value passed through unmodified from the authorization request.
    pub nonce: Option<String>,

    /// (`acr`) Authentication Context Class Reference. The assurance level the authentication
    /// actually satisfied.
    pub acr: Option<String>,

    /// (`amr`) Authentication Methods References, e.g. `["pwd", "otp"]`. Empty if the provider
    /// did not send any.
    pub amr: Vec<String>,

    /// (`azp`) Authorized party, the client the ID token was issued to.
    pub authorized_party: Option<String>,

    /// Every other claim, provider specific ones and merged userinfo claims included.
    pub additional: serde_json::Map<String, serde_json::Value>,
}

impl From<StandardIdTokenClaims> for IdentityClaims {
    fn from(raw: StandardIdTokenClaims) -> Self {
        Self {
            issuer: raw.iss,
            subject: raw.sub,
            audiences: match raw.aud {
                RawAudiences::Single(s) => Audiences::Single(s),
                RawAudiences::Multiple(m) => Audiences::Multiple(m),
            },
            expires_at: OffsetDateTime::from_unix_timestamp(raw.exp).unwrap_or_else(|err| {
                tracing::warn!(?err, "Token contained a non-parsable 'exp' (expires_at) value. Continuing with `now_utc()` being the expiry time.");
                OffsetDateTime::now_utc()
            }),
            issued_at: OffsetDateTime::from_unix_timestamp(raw.iat).unwrap_or_else(|err| {
                tracing::warn!(?err, "Token contained a non-parsable 'iat' (issued_at) value. Continuing with `now_utc()` being the issuing time.");
                OffsetDateTime::now_utc()
            }),
            // An unreadable `auth_time` must never pass as a fresh authentication.
            auth_time: raw.auth_time.and_then(|auth_time| {
                OffsetDateTime::from_unix_timestamp(auth_time)
                    .inspect_err(|err| {
                        tracing::warn!(?err, "Token contained a non-parsable 'auth_time' value. Treating it as absent.");
                    })
                    .ok()
            }),
            nonce: raw.nonce,
            acr: raw.acr,
            amr: raw.amr.unwrap_or_default(),
            authorized_party: raw.azp,
            additional: raw.remaining,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum UserinfoClaimsError {
    #[snafu(display("UserinfoClaimsError: Userinfo response carries no 'sub' claim"))]
    MissingSubject,

    #[snafu(display(
        "UserinfoClaimsError: Userinfo 'sub' {found:?} does not match the ID token subject {expected:?}"
    ))]
    SubjectMismatch { expected: String, found: String },
}

impl IdentityClaims {
    /// Merge claims received from the userinfo endpoint into these ID token claims.
    ///
    /// The userinfo response must be about the same subject. Values from the ID token win on
    /// conflict, as only those are covered by the ID token signature.
    pub(crate) fn merge_userinfo(
        mut self,
        userinfo: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, UserinfoClaimsError> {
        let found = userinfo
            .get("sub")
            .and_then(|it| it.as_str())
            .context(MissingSubjectSnafu {})?;
        ensure!(
            found == self.subject,
            SubjectMismatchSnafu {
                expected: self.subject.clone(),
                found: found.to_owned(),
            }
        );

        for (name, value) in userinfo {
            if ID_TOKEN_CLAIMS.contains(&name.as_str()) {
                continue;
            }
            self.additional.entry(name).or_insert(value);
        }
        Ok(self)
    }

    /// Look up any claim that is not one of the standard ID token claims.
    pub fn get(&self, claim: &str) -> Option<&serde_json::Value> {
        self.additional.get(claim)
    }

    pub fn get_str(&self, claim: &str) -> Option<&str> {
        self.get(claim).and_then(|it| it.as_str())
    }
}

/// Represents the audience(s) (`aud` claim) from an ID token.
///
/// `OpenID Connect` allows the audience to be either a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum Audiences {
    /// A single audience value (common case).
    Single(String),

    /// Multiple audience values.
    Multiple(Vec<String>),
}

impl Audiences {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audiences::Single(single) => single == audience,
            Audiences::Multiple(multiple) => multiple.iter().any(|it| it == audience),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Audiences::Single(_) => 1,
            Audiences::Multiple(multiple) => multiple.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
