use crate::authorization::{ClaimRequirement, ClaimsRequest};
use crate::config::{AcrValueSets, MfaPredicate};
use crate::token_claims::IdentityClaims;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum StepUpPolicyError {
    #[snafu(display("StepUpPolicyError: No policy named {name:?}"))]
    Unknown { name: String },
}

/// Closed set of named authorization policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepUpPolicyName {
    #[default]
    #[serde(rename = "login")]
    Login,
    #[serde(rename = "select-organization")]
    SelectOrganization,
    #[serde(rename = "update-userinfo")]
    UpdateUserinfo,
    #[serde(rename = "force-login")]
    ForceLogin,
    #[serde(rename = "force-consistency-checked-2fa")]
    ForceConsistencyChecked2fa,
    #[serde(rename = "force-self-asserted-2fa")]
    ForceSelfAsserted2fa,
    #[serde(rename = "force-2fa")]
    Force2fa,
    #[serde(rename = "force-certification-dirigeant")]
    ForceCertificationDirigeant,
}

impl StepUpPolicyName {
    pub const ALL: [StepUpPolicyName; 8] = [
        StepUpPolicyName::Login,
        StepUpPolicyName::SelectOrganization,
        StepUpPolicyName::UpdateUserinfo,
        StepUpPolicyName::ForceLogin,
        StepUpPolicyName::ForceConsistencyChecked2fa,
        StepUpPolicyName::ForceSelfAsserted2fa,
        StepUpPolicyName::Force2fa,
        StepUpPolicyName::ForceCertificationDirigeant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepUpPolicyName::Login => "login",
            StepUpPolicyName::SelectOrganization => "select-organization",
            StepUpPolicyName::UpdateUserinfo => "update-userinfo",
            StepUpPolicyName::ForceLogin => "force-login",
            StepUpPolicyName::ForceConsistencyChecked2fa => "force-consistency-checked-2fa",
            StepUpPolicyName::ForceSelfAsserted2fa => "force-self-asserted-2fa",
            StepUpPolicyName::Force2fa => "force-2fa",
            StepUpPolicyName::ForceCertificationDirigeant => "force-certification-dirigeant",
        }
    }
}

impl FromStr for StepUpPolicyName {
    type Err = StepUpPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepUpPolicyName::ALL
            .into_iter()
            .find(|it| it.as_str() == s)
            .ok_or_else(|| StepUpPolicyError::Unknown { name: s.to_owned() })
    }
}

impl Display for StepUpPolicyName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a named policy asks the provider for, and what the resulting authentication must
/// satisfy to count as a success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpRequest {
    pub policy: StepUpPolicyName,

    /// `prompt` parameter to send, if the policy requires one.
    pub prompt: Option<String>,

    /// Claims to merge into the default claims request.
    pub claims: ClaimsRequest,

    /// The achieved `acr` must be one of these. Empty means any `acr` is fine.
    pub accepted_acr_values: Vec<String>,

    /// The `amr` values must satisfy the configured MFA predicate.
    pub requires_multi_factor: bool,

    /// `auth_time` must be present and not older than the authorization request.
    pub requires_fresh_authentication: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepUpFailure {
    AcrMissing,
    AcrNotAccepted {
        achieved: String,
        accepted: Vec<String>,
    },
    NotMultiFactor {
        amr: Vec<String>,
    },
    MissingAuthTime,
    AuthTimeTooOld {
        #[serde(with = "time::serde::rfc3339")]
        auth_time: OffsetDateTime,
        #[serde(with = "time::serde::rfc3339")]
        requested_at: OffsetDateTime,
    },
}

impl Display for StepUpFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StepUpFailure::AcrMissing => f.write_str("no 'acr' claim returned"),
            StepUpFailure::AcrNotAccepted { achieved, accepted } => write!(
                f,
                "'acr' {achieved:?} is not one of [{}]",
                accepted.iter().join(", ")
            ),
            StepUpFailure::NotMultiFactor { amr } => {
                write!(f, "'amr' [{}] is not multi-factor", amr.iter().join(", "))
            }
            StepUpFailure::MissingAuthTime => f.write_str("no 'auth_time' claim returned"),
            StepUpFailure::AuthTimeTooOld {
                auth_time,
                requested_at,
            } => write!(
                f,
                "authentication at {auth_time} happened before the request at {requested_at}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpEvaluation {
    pub satisfied: bool,
    pub reason: Option<StepUpFailure>,
}

impl StepUpEvaluation {
    fn satisfied() -> Self {
        Self {
            satisfied: true,
            reason: None,
        }
    }

    fn failed(reason: StepUpFailure) -> Self {
        Self {
            satisfied: false,
            reason: Some(reason),
        }
    }
}

/// Maps policy names to step-up requests, and judges whether an authentication satisfied the
/// request it answered.
#[derive(Debug, Clone)]
pub struct StepUpPolicyEngine {
    acr_value_sets: AcrValueSets,
    mfa_predicate: MfaPredicate,
    leeway: Duration,
}

impl StepUpPolicyEngine {
    pub fn new(
        acr_value_sets: AcrValueSets,
        mfa_predicate: MfaPredicate,
        leeway: Duration,
    ) -> Self {
        Self {
            acr_value_sets,
            mfa_predicate,
            leeway,
        }
    }

    /// Look up a policy by its name, e.g. `"force-2fa"`.
    pub fn request_level_by_name(&self, name: &str) -> Result<StepUpRequest, StepUpPolicyError> {
        name.parse().map(|policy| self.request_level(policy))
    }

    pub fn request_level(&self, policy: StepUpPolicyName) -> StepUpRequest {
        let request = StepUpRequest {
            policy,
            ..StepUpRequest::default()
        };
        let amr_essential =
            ClaimsRequest::default().with_id_token_claim("amr", ClaimRequirement::essential());
        let acr = |accepted: Vec<String>, requires_multi_factor: bool| StepUpRequest {
            claims: amr_essential
                .clone()
                .with_id_token_claim("acr", ClaimRequirement::essential_one_of(&accepted)),
            accepted_acr_values: accepted,
            requires_multi_factor,
            ..request.clone()
        };

        match policy {
            StepUpPolicyName::Login => request,
            StepUpPolicyName::SelectOrganization => StepUpRequest {
                prompt: Some("select_organization".to_owned()),
                ..request
            },
            StepUpPolicyName::UpdateUserinfo => StepUpRequest {
                prompt: Some("update_userinfo".to_owned()),
                ..request
            },
            StepUpPolicyName::ForceLogin => StepUpRequest {
                prompt: Some("login".to_owned()),
                claims: amr_essential
                    .clone()
                    .with_id_token_claim("auth_time", ClaimRequirement::essential()),
                requires_fresh_authentication: true,
                ..request
            },
            StepUpPolicyName::ForceConsistencyChecked2fa => {
                acr(self.acr_value_sets.consistency_checked_2fa.clone(), true)
            }
            StepUpPolicyName::ForceSelfAsserted2fa => {
                acr(self.acr_value_sets.self_asserted_2fa.clone(), true)
            }
            StepUpPolicyName::Force2fa => acr(
                self.acr_value_sets
                    .consistency_checked_2fa
                    .iter()
                    .chain(&self.acr_value_sets.self_asserted_2fa)
                    .unique()
                    .cloned()
                    .collect(),
                true,
            ),
            StepUpPolicyName::ForceCertificationDirigeant => {
                acr(self.acr_value_sets.certification_dirigeant.clone(), false)
            }
        }
    }

    /// Judge `achieved` against the request that produced it. `requested_at` is the time the
    /// authorization request was issued.
    pub fn evaluate(
        &self,
        request: &StepUpRequest,
        achieved: &IdentityClaims,
        requested_at: OffsetDateTime,
    ) -> StepUpEvaluation {
        if !request.accepted_acr_values.is_empty() {
            let Some(acr) = achieved.acr.as_deref() else {
                return StepUpEvaluation::failed(StepUpFailure::AcrMissing);
            };
            if !request.accepted_acr_values.iter().any(|it| it == acr) {
                return StepUpEvaluation::failed(StepUpFailure::AcrNotAccepted {
                    achieved: acr.to_owned(),
                    accepted: request.accepted_acr_values.clone(),
                });
            }
        }

        if request.requires_multi_factor && !self.is_multi_factor(achieved) {
            return StepUpEvaluation::failed(StepUpFailure::NotMultiFactor {
                amr: achieved.amr.clone(),
            });
        }

        if request.requires_fresh_authentication {
            let Some(auth_time) = achieved.auth_time else {
                return StepUpEvaluation::failed(StepUpFailure::MissingAuthTime);
            };
            if auth_time < requested_at - self.leeway {
                return StepUpEvaluation::failed(StepUpFailure::AuthTimeTooOld {
                    auth_time,
                    requested_at,
                });
            }
        }

        StepUpEvaluation::satisfied()
    }

    /// Whether the `amr` of `claims` counts as multi-factor authentication under the configured
    /// predicate.
    pub fn is_multi_factor(&self, claims: &IdentityClaims) -> bool {
        self.mfa_predicate.is_satisfied_by(&claims.amr)
    }
}
