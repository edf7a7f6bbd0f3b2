use crate::request::{MalformedSnafu, RequestError};
use crate::response::SuccessTokenResponse;
use crate::token_claims::IdentityClaims;
use serde::{Deserialize, Serialize};
use snafu::OptionExt;
use std::fmt::{Debug, Formatter};
use time::{Duration, OffsetDateTime};

/// Tokens exactly as the token endpoint returned them. Nothing in here is trusted until the ID
/// token passed validation, after which a [`TokenSet`] is built from it.
#[derive(Clone, PartialEq)]
pub(crate) struct TokenData {
    /// The ID Token is a security token that contains Claims about the Authentication of an
    /// End-User by an Authorization Server.
    pub(crate) id_token: String,

    /// Access token. Allows access to resources requiring authentication unless expired.
    pub(crate) access_token: String,

    /// Point in time when the `access_token` expires, if the provider told us.
    pub(crate) access_token_expires_at: Option<OffsetDateTime>,

    pub(crate) refresh_token: Option<String>,

    pub(crate) scope: Option<String>,

    /// Point in time this token data was read.
    pub(crate) time_received: OffsetDateTime,
}

impl Debug for TokenData {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenData")
            .field("id_token", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .field("time_received", &self.time_received)
            .finish()
    }
}

impl TryFrom<SuccessTokenResponse> for TokenData {
    type Error = RequestError;

    fn try_from(value: SuccessTokenResponse) -> Result<Self, Self::Error> {
        if let Some(token_type) = value.token_type.as_deref()
            && !token_type.eq_ignore_ascii_case("bearer")
        {
            return MalformedSnafu {
                reason: format!("unsupported token_type {token_type:?}"),
            }
            .fail();
        }
        let id_token = value.id_token.context(MalformedSnafu {
            reason: "token response carries no id_token",
        })?;

        let now = OffsetDateTime::now_utc();
        let access_token_expires_at = value
            .expires_in
            .map(|expires_in| {
                now.checked_add(Duration::seconds(expires_in))
                    .context(MalformedSnafu {
                        reason: format!("expires_in {expires_in} is out of range"),
                    })
            })
            .transpose()?;
        Ok(Self {
            id_token,
            access_token: value.access_token,
            access_token_expires_at,
            refresh_token: value.refresh_token,
            scope: value.scope,
            time_received: now,
        })
    }
}

/// The ID token in its raw form, together with its validated claims.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct IdToken {
    raw: String,
    claims: IdentityClaims,
}

impl IdToken {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn claims(&self) -> &IdentityClaims {
        &self.claims
    }
}

impl Debug for IdToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdToken")
            .field("raw", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}

/// Tokens of an established login.
///
/// Can only be created from token data whose ID token was validated. Once stored in a session it
/// is never modified. A new login produces a new `TokenSet`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    access_token: String,
    id_token: IdToken,
    refresh_token: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    expires_at: Option<OffsetDateTime>,
    scope: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    received_at: OffsetDateTime,
}

impl TokenSet {
    pub(crate) fn from_validated(token_data: TokenData, id_token_claims: IdentityClaims) -> Self {
        Self {
            access_token: token_data.access_token,
            id_token: IdToken {
                raw: token_data.id_token,
                claims: id_token_claims,
            },
            refresh_token: token_data.refresh_token,
            expires_at: token_data.access_token_expires_at,
            scope: token_data.scope,
            received_at: token_data.time_received,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn id_token(&self) -> &IdToken {
        &self.id_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Point in time when the access token expires. `None` if the provider did not send
    /// `expires_in`.
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires_at
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn received_at(&self) -> OffsetDateTime {
        self.received_at
    }

    pub fn access_token_time_left(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| expires_at - OffsetDateTime::now_utc())
    }

    pub fn estimated_access_token_lifetime(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| expires_at - self.received_at)
    }

    pub fn access_token_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at < OffsetDateTime::now_utc())
    }
}

impl Debug for TokenSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("id_token", &self.id_token)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("received_at", &self.received_at)
            .finish()
    }
}
