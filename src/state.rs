use crate::UserinfoEndpoint;
use crate::authorization::{AuthorizationParams, AuthorizationPolicy, compose};
use crate::config::{self, Options};
use crate::error::{
    AuthError, AuthorizationResponseSnafu, ConfigSnafu, HttpClientSnafu, MalformedCallbackSnafu,
    ResponseIssuerMismatchSnafu, StepUpPolicySnafu, TokenExchangeSnafu, TokenValidationSnafu,
    UserinfoClaimsSnafu, UserinfoSnafu, UserinfoValidationSnafu,
};
use crate::internal::OidcConfigWithTimestamp;
use crate::internal::derived_urls::{self, DerivedUrlError};
use crate::login::login_url;
use crate::logout::end_session_url;
use crate::pending_login::PendingLogin;
use crate::provider::{ProviderMetadataResolver, endpoint};
use crate::request::{self, CodeExchange, HttpClient, RequestError, UserinfoResponse};
use crate::response::{CallbackQuery, CallbackResponse};
use crate::session::{EstablishedLogin, Session};
use crate::step_up::{StepUpEvaluation, StepUpPolicyEngine, StepUpPolicyName, StepUpRequest};
use crate::token::{TokenData, TokenSet};
use crate::token_claims::IdentityClaims;
use crate::token_validation::{self, Expectations};
use jsonwebtoken::Algorithm;
use snafu::{ResultExt, ensure};
use url::Url;

/// Phases a single login attempt moves through. Any failure moves it to `Rejected`, from which
/// there is no way back. A new attempt needs a new pending login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPhase {
    Pending,
    StateValidated,
    CodeExchanged,
    TokenValidated,
    ClaimsFetched,
    Established,
    Rejected,
}

/// Tracks the phase of one `complete_login` call.
#[derive(Debug)]
pub(crate) struct LoginAttempt {
    phase: LoginPhase,
}

impl LoginAttempt {
    pub(crate) fn new() -> Self {
        Self {
            phase: LoginPhase::Pending,
        }
    }

    fn advance(&mut self, next: LoginPhase) {
        tracing::trace!(from = ?self.phase, to = ?next, "Login attempt advanced");
        self.phase = next;
    }

    fn reject(&mut self, err: &AuthError) {
        tracing::warn!(phase = ?self.phase, %err, "Login attempt rejected");
        self.phase = LoginPhase::Rejected;
    }
}

/// The relying party. Create one at startup and share it between all requests.
///
/// Holds configuration and the provider metadata cache. All per-user state lives in the
/// [`Session`] passed to each operation.
#[derive(Debug)]
pub struct RelyingParty {
    options: Options,
    expected_issuer: String,
    provider: ProviderMetadataResolver,
    policies: StepUpPolicyEngine,
    default_policy: AuthorizationPolicy,
}

impl RelyingParty {
    pub fn new(options: Options) -> Result<Self, AuthError> {
        let default_policy = AuthorizationPolicy::from_options(&options)
            .context(config::InvalidUrlSnafu {
                key: "CALLBACK_URL",
            })
            .context(ConfigSnafu {})?;
        let http = HttpClient::new(&options).context(HttpClientSnafu {})?;
        let provider = ProviderMetadataResolver::new(&options, http)?;
        let policies = StepUpPolicyEngine::new(
            options.acr_value_sets.clone(),
            options.mfa_predicate.clone(),
            options.advanced.leeway,
        );
        tracing::debug!(
            issuer = %options.issuer,
            client_id = %options.client_id,
            "Created relying party"
        );
        Ok(Self {
            expected_issuer: options.expected_issuer(),
            provider,
            policies,
            default_policy,
            options,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn provider(&self) -> &ProviderMetadataResolver {
        &self.provider
    }

    pub fn policies(&self) -> &StepUpPolicyEngine {
        &self.policies
    }

    /// Parameters a plain login would use, as a JSON object. A starting point for requests
    /// passed to [`RelyingParty::begin_custom_login`].
    pub fn default_authorization_params(&self) -> serde_json::Map<String, serde_json::Value> {
        self.default_policy.to_json()
    }

    /// Start a login, optionally asking for the step-up policy named `policy`.
    ///
    /// Stores a new pending login in `session`, replacing any previous one, and returns the
    /// URL to redirect the user agent to.
    pub async fn begin_login(
        &self,
        session: &mut Session,
        policy: Option<&str>,
    ) -> Result<Url, AuthError> {
        let step_up = match policy {
            Some(name) => self
                .policies
                .request_level_by_name(name)
                .context(StepUpPolicySnafu {})?,
            None => self.policies.request_level(StepUpPolicyName::Login),
        };
        let params = compose(&self.default_policy, Some(&step_up));
        self.begin(session, step_up, params).await
    }

    /// Start a login with exactly the given authorization parameters instead of the default
    /// policy. Correlation values (`state`, `nonce`, PKCE) are always generated here.
    pub async fn begin_custom_login(
        &self,
        session: &mut Session,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Url, AuthError> {
        let step_up = self.policies.request_level(StepUpPolicyName::Login);
        self.begin(session, step_up, AuthorizationParams::raw(params))
            .await
    }

    async fn begin(
        &self,
        session: &mut Session,
        step_up: StepUpRequest,
        params: AuthorizationParams,
    ) -> Result<Url, AuthError> {
        let oidc_config = self.provider.resolve().await?;
        let authorization_endpoint =
            endpoint(derived_urls::authorization_endpoint(&oidc_config.oidc_config))?;

        let redirect_uri = params
            .get("redirect_uri")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);
        let pending = PendingLogin::begin(session, step_up, redirect_uri, self.options.use_pkce);
        let params = params.bind(
            &self.options.client_id,
            pending.state(),
            pending.nonce(),
            pending.code_challenge().as_ref(),
            self.options.extra_sp_name.as_deref(),
        );
        Ok(login_url(&authorization_endpoint, &params))
    }

    /// Handle the provider's redirect back to us.
    ///
    /// On success the session holds the established login and its claims are returned. On
    /// failure the pending login is gone as well, and any previously established login is
    /// left untouched.
    pub async fn complete_login(
        &self,
        session: &mut Session,
        callback: &CallbackQuery,
    ) -> Result<IdentityClaims, AuthError> {
        let mut attempt = LoginAttempt::new();
        let result = self.run_login(&mut attempt, session, callback).await;
        if let Err(err) = &result {
            attempt.reject(err);
        }
        result
    }

    async fn run_login(
        &self,
        attempt: &mut LoginAttempt,
        session: &mut Session,
        callback: &CallbackQuery,
    ) -> Result<IdentityClaims, AuthError> {
        let success = match CallbackResponse::from_query(callback) {
            Some(CallbackResponse::SuccessfulLogin(success)) => success,
            Some(CallbackResponse::Error(error_response)) => {
                session.take_pending();
                return AuthorizationResponseSnafu { error_response }.fail();
            }
            None => {
                session.take_pending();
                return MalformedCallbackSnafu {}.fail();
            }
        };

        let pending = PendingLogin::verify_state(session, success.state.as_deref())?;
        let oidc_config = self.provider.resolve().await?;
        self.verify_response_issuer(&oidc_config, success.iss.as_deref())?;
        attempt.advance(LoginPhase::StateValidated);

        let token_endpoint = endpoint(derived_urls::token_endpoint(&oidc_config.oidc_config))?;
        let token_data = request::exchange_code_for_token(
            self.provider.http(),
            &token_endpoint,
            CodeExchange {
                client_id: &self.options.client_id,
                client_secret: &self.options.client_secret,
                redirect_uri: pending.redirect_uri(),
                code: &success.code,
                code_verifier: pending.code_verifier(),
            },
        )
        .await
        .context(TokenExchangeSnafu {})?;
        attempt.advance(LoginPhase::CodeExchanged);

        let id_token_claims = self.validate_id_token(&token_data, &pending).await?;
        let token_set = TokenSet::from_validated(token_data, id_token_claims.clone());
        attempt.advance(LoginPhase::TokenValidated);

        let (claims, userinfo) = match self.userinfo_endpoint(&oidc_config)? {
            Some(userinfo_endpoint) => {
                let userinfo = self
                    .fetch_userinfo(&userinfo_endpoint, token_set.access_token())
                    .await?;
                let claims = id_token_claims
                    .merge_userinfo(userinfo.clone())
                    .context(UserinfoClaimsSnafu {})?;
                (claims, Some(userinfo))
            }
            None => (id_token_claims, None),
        };
        attempt.advance(LoginPhase::ClaimsFetched);

        let requested_at = pending.created_at();
        session.establish(EstablishedLogin::new(
            token_set,
            claims.clone(),
            userinfo,
            pending.into_step_up(),
            requested_at,
        ));
        attempt.advance(LoginPhase::Established);
        tracing::info!(subject = %claims.subject, acr = ?claims.acr, "Login established");
        Ok(claims)
    }

    /// RFC 9207 mix-up defense. A returned `iss` must name our provider. Providers announcing
    /// support must send it.
    fn verify_response_issuer(
        &self,
        oidc_config: &OidcConfigWithTimestamp,
        returned_issuer: Option<&str>,
    ) -> Result<(), AuthError> {
        let required = oidc_config
            .oidc_config
            .standard_claims
            .authorization_response_iss_parameter_supported;
        let matches = match returned_issuer {
            Some(returned_issuer) => returned_issuer == self.expected_issuer,
            None => !required,
        };
        ensure!(
            matches,
            ResponseIssuerMismatchSnafu {
                expected: self.expected_issuer.clone(),
                found: returned_issuer.map(str::to_owned),
            }
        );
        Ok(())
    }

    fn expectations(&self, algorithm: Algorithm) -> Expectations<'_> {
        Expectations {
            issuer: &self.expected_issuer,
            client_id: &self.options.client_id,
            algorithm,
            leeway: self.options.advanced.leeway,
        }
    }

    async fn validate_id_token(
        &self,
        token_data: &TokenData,
        pending: &PendingLogin,
    ) -> Result<IdentityClaims, AuthError> {
        let algorithm = self.options.id_token_signed_response_alg;
        let header = token_validation::decode_header(&token_data.id_token, algorithm)
            .context(TokenValidationSnafu {})?;
        let jwk = self.provider.get_key(header.kid.as_deref(), algorithm).await?;
        let claims = token_validation::validate_id_token(
            &token_data.id_token,
            &jwk,
            &self.expectations(algorithm),
        )
        .context(TokenValidationSnafu {})?;
        pending.verify_nonce(claims.nonce.as_deref())?;
        Ok(IdentityClaims::from(claims))
    }

    fn userinfo_endpoint(
        &self,
        oidc_config: &OidcConfigWithTimestamp,
    ) -> Result<Option<UserinfoEndpoint>, AuthError> {
        if !self.options.advanced.fetch_userinfo {
            return Ok(None);
        }
        match derived_urls::userinfo_endpoint(&oidc_config.oidc_config) {
            Ok(userinfo_endpoint) => Ok(Some(userinfo_endpoint)),
            Err(DerivedUrlError::NoUserinfoEndpoint) => {
                tracing::debug!(
                    "Provider publishes no userinfo endpoint. Using ID token claims only"
                );
                Ok(None)
            }
            Err(err) => endpoint(Err(err)),
        }
    }

    async fn fetch_userinfo(
        &self,
        userinfo_endpoint: &UserinfoEndpoint,
        access_token: &str,
    ) -> Result<serde_json::Map<String, serde_json::Value>, AuthError> {
        let response =
            request::fetch_userinfo(self.provider.http(), userinfo_endpoint, access_token)
                .await
                .context(UserinfoSnafu {})?;

        match (response, self.options.userinfo_signed_response_alg) {
            (UserinfoResponse::Claims(claims), None) => Ok(claims),
            (UserinfoResponse::SignedJwt(jwt), Some(algorithm)) => {
                let header = token_validation::decode_header(&jwt, algorithm)
                    .context(UserinfoValidationSnafu {})?;
                let jwk = self.provider.get_key(header.kid.as_deref(), algorithm).await?;
                token_validation::validate_userinfo_jwt(&jwt, &jwk, &self.expectations(algorithm))
                    .context(UserinfoValidationSnafu {})
            }
            (UserinfoResponse::Claims(_), Some(_)) => Err(AuthError::Userinfo {
                source: RequestError::Malformed {
                    reason: "expected a signed userinfo response".to_owned(),
                },
            }),
            (UserinfoResponse::SignedJwt(_), None) => Err(AuthError::Userinfo {
                source: RequestError::Malformed {
                    reason: "received a signed userinfo response without a configured algorithm"
                        .to_owned(),
                },
            }),
        }
    }

    /// Destroy `session` and return where to send the user agent next.
    ///
    /// With an established login that is the provider's end-session endpoint, carrying the ID
    /// token as hint. Without one, or if the provider does not support RP-initiated logout,
    /// the user is sent straight to the root of `host`.
    pub async fn logout(&self, session: Session) -> Result<Url, AuthError> {
        let post_logout_redirect_uri = self.options.post_logout_redirect_uri();
        let Some(token_set) = session.destroy() else {
            tracing::debug!("Logout without established login");
            return Ok(post_logout_redirect_uri);
        };

        let oidc_config = self.provider.resolve().await?;
        match derived_urls::end_session_endpoint(&oidc_config.oidc_config) {
            Ok(end_session_endpoint) => Ok(end_session_url(
                end_session_endpoint,
                &self.options.client_id,
                &post_logout_redirect_uri,
                Some(token_set.id_token().raw()),
            )),
            Err(DerivedUrlError::NoEndSessionEndpoint) => {
                tracing::warn!(
                    "Provider publishes no end_session_endpoint. Only the local session was \
                     destroyed"
                );
                Ok(post_logout_redirect_uri)
            }
            Err(err) => endpoint(Err(err)),
        }
    }

    /// Judge the established login of `session` against the step-up request it answered.
    /// `None` if nobody is logged in.
    pub fn evaluate_step_up(&self, session: &Session) -> Option<StepUpEvaluation> {
        session.established().map(|established| {
            self.policies.evaluate(
                established.step_up(),
                established.id_token_claims(),
                established.requested_at(),
            )
        })
    }

    /// Whether the established login of `session` counts as multi-factor authentication.
    pub fn is_multi_factor(&self, session: &Session) -> bool {
        session
            .id_token_claims()
            .is_some_and(|claims| self.policies.is_multi_factor(claims))
    }
}
