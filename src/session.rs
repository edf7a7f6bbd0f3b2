use crate::pending_login::PendingLogin;
use crate::step_up::StepUpRequest;
use crate::token::TokenSet;
use crate::token_claims::IdentityClaims;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Per user-agent authentication state.
///
/// Storing it (cookie, server side store, ...) is up to the application. It serializes with
/// serde and contains secrets, so it must never be exposed to the user agent unencrypted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pending: Option<PendingLogin>,
    established: Option<EstablishedLogin>,
}

/// Outcome of a completed login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstablishedLogin {
    token_set: TokenSet,

    /// ID token claims, merged with userinfo claims if those were fetched.
    claims: IdentityClaims,

    userinfo: Option<serde_json::Map<String, serde_json::Value>>,

    /// The request this login answered. Needed to evaluate the achieved assurance level later.
    step_up: StepUpRequest,

    #[serde(with = "time::serde::rfc3339")]
    requested_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    established_at: OffsetDateTime,
}

impl EstablishedLogin {
    pub(crate) fn new(
        token_set: TokenSet,
        claims: IdentityClaims,
        userinfo: Option<serde_json::Map<String, serde_json::Value>>,
        step_up: StepUpRequest,
        requested_at: OffsetDateTime,
    ) -> Self {
        Self {
            token_set,
            claims,
            userinfo,
            step_up,
            requested_at,
            established_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn token_set(&self) -> &TokenSet {
        &self.token_set
    }

    pub fn claims(&self) -> &IdentityClaims {
        &self.claims
    }

    /// Claims exactly as the ID token asserted them, without userinfo.
    pub fn id_token_claims(&self) -> &IdentityClaims {
        self.token_set.id_token().claims()
    }

    pub fn userinfo(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.userinfo.as_ref()
    }

    pub fn step_up(&self) -> &StepUpRequest {
        &self.step_up
    }

    pub fn requested_at(&self) -> OffsetDateTime {
        self.requested_at
    }

    pub fn established_at(&self) -> OffsetDateTime {
        self.established_at
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&PendingLogin> {
        self.pending.as_ref()
    }

    pub fn established(&self) -> Option<&EstablishedLogin> {
        self.established.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.established.is_some()
    }

    pub fn claims(&self) -> Option<&IdentityClaims> {
        self.established.as_ref().map(EstablishedLogin::claims)
    }

    pub fn id_token_claims(&self) -> Option<&IdentityClaims> {
        self.established
            .as_ref()
            .map(EstablishedLogin::id_token_claims)
    }

    pub fn userinfo(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.established
            .as_ref()
            .and_then(EstablishedLogin::userinfo)
    }

    pub fn token_set(&self) -> Option<&TokenSet> {
        self.established.as_ref().map(EstablishedLogin::token_set)
    }

    pub(crate) fn replace_pending(&mut self, pending: PendingLogin) -> &PendingLogin {
        if self.pending.is_some() {
            tracing::debug!("Replacing a login that was still pending");
        }
        self.pending.insert(pending)
    }

    pub(crate) fn take_pending(&mut self) -> Option<PendingLogin> {
        self.pending.take()
    }

    /// Replaces a previously established login, e.g. after a successful step-up.
    pub(crate) fn establish(&mut self, login: EstablishedLogin) {
        self.established = Some(login);
    }

    /// Destroy the session, handing out its tokens for a final end-session request.
    pub(crate) fn destroy(self) -> Option<TokenSet> {
        self.established.map(|it| it.token_set)
    }
}
