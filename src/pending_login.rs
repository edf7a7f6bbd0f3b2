use crate::code_verifier::{CodeChallenge, CodeVerifier};
use crate::csrf_token::CsrfToken;
use crate::error::{AuthError, MissingPendingLoginSnafu, NonceMismatchSnafu, StateMismatchSnafu};
use crate::nonce::Nonce;
use crate::session::Session;
use crate::step_up::StepUpRequest;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ensure};
use time::OffsetDateTime;

/// Length of generated PKCE code verifiers.
pub(crate) const CODE_VERIFIER_LENGTH: usize = 64;

/// Correlation data of an authorization request that was sent but not yet answered.
///
/// A session holds at most one. Starting another login replaces it, and completing a login
/// consumes it, whatever the outcome.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingLogin {
    state: CsrfToken,
    nonce: Nonce,
    code_verifier: Option<CodeVerifier<CODE_VERIFIER_LENGTH>>,
    step_up: StepUpRequest,
    /// `redirect_uri` of the authorization request. The code exchange must repeat it.
    #[serde(default)]
    redirect_uri: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

impl std::fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLogin")
            .field("state", &"<redacted>")
            .field("nonce", &"<redacted>")
            .field("code_verifier", &self.code_verifier)
            .field("step_up", &self.step_up)
            .field("redirect_uri", &self.redirect_uri)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl PendingLogin {
    /// Generate fresh `state` and `nonce` (and a PKCE verifier if requested) and store them in
    /// `session`, replacing any login still pending there.
    ///
    /// `redirect_uri` is the one sent in the authorization request, if any.
    pub fn begin(
        session: &mut Session,
        step_up: StepUpRequest,
        redirect_uri: Option<String>,
        use_pkce: bool,
    ) -> &PendingLogin {
        let pending = PendingLogin {
            state: CsrfToken::new(),
            nonce: Nonce::new(),
            code_verifier: use_pkce.then(CodeVerifier::generate),
            step_up,
            redirect_uri,
            created_at: OffsetDateTime::now_utc(),
        };
        tracing::debug!(policy = %pending.step_up.policy, "Beginning login");
        session.replace_pending(pending)
    }

    /// Take the pending login out of `session` and check that the provider returned its
    /// `state`. The pending login is gone afterwards, even if the check fails.
    pub fn verify_state(
        session: &mut Session,
        returned_state: Option<&str>,
    ) -> Result<PendingLogin, AuthError> {
        let pending = session.take_pending().context(MissingPendingLoginSnafu {})?;
        let matches = returned_state.is_some_and(|returned| pending.state.matches(returned));
        ensure!(matches, StateMismatchSnafu {});
        Ok(pending)
    }

    /// Check the `nonce` claim of a validated ID token against this login.
    pub fn verify_nonce(&self, claimed_nonce: Option<&str>) -> Result<(), AuthError> {
        let matches = claimed_nonce.is_some_and(|claimed| self.nonce.matches(claimed));
        ensure!(matches, NonceMismatchSnafu {});
        Ok(())
    }

    pub fn state(&self) -> &CsrfToken {
        &self.state
    }

    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    pub fn step_up(&self) -> &StepUpRequest {
        &self.step_up
    }

    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uri.as_deref()
    }

    /// Point in time the authorization request was issued.
    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub(crate) fn code_verifier(&self) -> Option<&str> {
        self.code_verifier.as_ref().map(CodeVerifier::code_verifier)
    }

    pub(crate) fn code_challenge(&self) -> Option<CodeChallenge> {
        self.code_verifier
            .as_ref()
            .map(CodeVerifier::to_code_challenge)
    }

    pub(crate) fn into_step_up(self) -> StepUpRequest {
        self.step_up
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step_up::StepUpPolicyName;
    use assertr::prelude::*;

    fn begin(session: &mut Session) -> (String, String) {
        let pending = PendingLogin::begin(session, StepUpRequest::default(), None, true);
        (
            pending.state().as_str().to_owned(),
            pending.nonce().as_str().to_owned(),
        )
    }

    #[test]
    fn state_and_nonce_are_independent_random_values() {
        let mut session = Session::default();
        let (state, nonce) = begin(&mut session);
        assert_that(state.as_str()).has_length(43);
        assert_that(nonce.as_str()).has_length(43);
        assert_that(state == nonce).is_false();

        let pending = session.pending().unwrap();
        assert_that(pending.code_verifier().map(str::len)).is_equal_to(Some(64));
        assert_that(pending.code_challenge().is_some()).is_true();
    }

    #[test]
    fn no_verifier_without_pkce() {
        let mut session = Session::default();
        let pending = PendingLogin::begin(&mut session, StepUpRequest::default(), None, false);
        assert_that(pending.code_verifier().is_none()).is_true();
        assert_that(pending.code_challenge().is_none()).is_true();
    }

    #[test]
    fn matching_state_consumes_pending_login() {
        let mut session = Session::default();
        let (state, _) = begin(&mut session);

        let pending = PendingLogin::verify_state(&mut session, Some(&state)).unwrap();
        assert_that(pending.state().as_str()).is_equal_to(state.as_str());
        assert_that(session.pending().is_none()).is_true();

        let err = PendingLogin::verify_state(&mut session, Some(&state)).unwrap_err();
        assert_that(matches!(err, AuthError::MissingPendingLogin)).is_true();
    }

    #[test]
    fn wrong_or_missing_state_is_rejected_and_still_consumes() {
        let mut session = Session::default();
        begin(&mut session);
        let err = PendingLogin::verify_state(&mut session, Some("forged")).unwrap_err();
        assert_that(matches!(err, AuthError::StateMismatch)).is_true();
        assert_that(session.pending().is_none()).is_true();

        begin(&mut session);
        let err = PendingLogin::verify_state(&mut session, None).unwrap_err();
        assert_that(matches!(err, AuthError::StateMismatch)).is_true();
    }

    #[test]
    fn second_begin_replaces_the_first() {
        let mut session = Session::default();
        let (first_state, _) = begin(&mut session);
        let (second_state, _) = begin(&mut session);

        let err = PendingLogin::verify_state(&mut session, Some(&first_state)).unwrap_err();
        assert_that(matches!(err, AuthError::StateMismatch)).is_true();

        begin(&mut session);
        let err = PendingLogin::verify_state(&mut session, Some(&second_state)).unwrap_err();
        assert_that(matches!(err, AuthError::StateMismatch)).is_true();
    }

    #[test]
    fn nonce_must_match() {
        let mut session = Session::default();
        let (_, nonce) = begin(&mut session);
        let pending = session.pending().unwrap();

        assert_that(pending.verify_nonce(Some(&nonce)).is_ok()).is_true();
        assert_that(matches!(
            pending.verify_nonce(Some("other")),
            Err(AuthError::NonceMismatch)
        ))
        .is_true();
        assert_that(matches!(
            pending.verify_nonce(None),
            Err(AuthError::NonceMismatch)
        ))
        .is_true();
    }

    #[test]
    fn survives_a_serde_round_trip_through_session_storage() {
        let mut session = Session::default();
        PendingLogin::begin(
            &mut session,
            StepUpRequest {
                policy: StepUpPolicyName::Force2fa,
                ..StepUpRequest::default()
            },
            Some("https://app.example.com/login-callback".to_owned()),
            true,
        );
        let stored = serde_json::to_string(&session).unwrap();
        let restored: Session = serde_json::from_str(&stored).unwrap();
        assert_that(restored).is_equal_to(session);
    }

    #[test]
    fn debug_output_redacts_correlation_values() {
        let mut session = Session::default();
        let (state, nonce) = begin(&mut session);
        let debug = format!("{:?}", session.pending().unwrap());
        assert_that(debug.contains(&state)).is_false();
        assert_that(debug.contains(&nonce)).is_false();
    }
}
