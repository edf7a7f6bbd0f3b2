use crate::code_verifier::CodeChallenge;
use crate::config::Options;
use crate::csrf_token::CsrfToken;
use crate::nonce::Nonce;
use crate::step_up::StepUpRequest;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;

/// Request for a single claim, as used in the `claims` authorization parameter.
///
/// See: <https://openid.net/specs/openid-connect-core-1_0.html#IndividualClaimsRequests>
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essential: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

impl ClaimRequirement {
    pub fn essential() -> Self {
        Self {
            essential: Some(true),
            ..Self::default()
        }
    }

    /// Essential claim which must take one of the given values. A single value is requested
    /// through `value`, multiple ones through `values`.
    pub fn essential_one_of(accepted: &[String]) -> Self {
        let mut requirement = Self::essential();
        match accepted {
            [] => {}
            [single] => requirement.value = Some(single.clone()),
            many => requirement.values = Some(many.to_vec()),
        }
        requirement
    }

    /// Fields set in `other` win. `value` and `values` are alternatives: whichever `other`
    /// specifies replaces both, so accepted value lists are never unioned.
    fn merge(&mut self, other: &ClaimRequirement) {
        if let Some(essential) = other.essential {
            self.essential = Some(essential);
        }
        if other.value.is_some() || other.values.is_some() {
            self.value = other.value.clone();
            self.values = other.values.clone();
        }
    }

    fn to_json(&self) -> Value {
        let mut object = Map::new();
        if let Some(essential) = self.essential {
            object.insert("essential".to_owned(), Value::Bool(essential));
        }
        if let Some(value) = &self.value {
            object.insert("value".to_owned(), Value::String(value.clone()));
        }
        if let Some(values) = &self.values {
            object.insert(
                "values".to_owned(),
                Value::Array(values.iter().cloned().map(Value::String).collect()),
            );
        }
        Value::Object(object)
    }
}

/// Structured `claims` request parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsRequest {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub id_token: BTreeMap<String, ClaimRequirement>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub userinfo: BTreeMap<String, ClaimRequirement>,
}

impl ClaimsRequest {
    pub fn is_empty(&self) -> bool {
        self.id_token.is_empty() && self.userinfo.is_empty()
    }

    pub fn with_id_token_claim(mut self, name: &str, requirement: ClaimRequirement) -> Self {
        self.id_token.insert(name.to_owned(), requirement);
        self
    }

    /// Deep merge per claim: claims only present in `other` are added, claims present in both
    /// are merged field by field.
    pub fn merge(&mut self, other: &ClaimsRequest) {
        for (name, requirement) in &other.id_token {
            self.id_token
                .entry(name.clone())
                .or_default()
                .merge(requirement);
        }
        for (name, requirement) in &other.userinfo {
            self.userinfo
                .entry(name.clone())
                .or_default()
                .merge(requirement);
        }
    }

    pub fn to_json(&self) -> Value {
        let section = |claims: &BTreeMap<String, ClaimRequirement>| {
            Value::Object(
                claims
                    .iter()
                    .map(|(name, requirement)| (name.clone(), requirement.to_json()))
                    .collect(),
            )
        };
        let mut object = Map::new();
        if !self.id_token.is_empty() {
            object.insert("id_token".to_owned(), section(&self.id_token));
        }
        if !self.userinfo.is_empty() {
            object.insert("userinfo".to_owned(), section(&self.userinfo));
        }
        Value::Object(object)
    }
}

/// Parameters every authorization request starts from.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationPolicy {
    pub redirect_uri: Url,
    pub scopes: Vec<String>,
    pub login_hint: Option<String>,
    pub acr_values: Option<Vec<String>>,
    pub prompt: Option<String>,
    pub claims: ClaimsRequest,
}

impl AuthorizationPolicy {
    /// The default policy: configured redirect URI, scopes, login hint and ACR values, with
    /// `amr` requested as an essential ID token claim.
    pub fn from_options(options: &Options) -> Result<Self, url::ParseError> {
        Ok(Self {
            redirect_uri: options.redirect_uri()?,
            scopes: options.scopes.clone(),
            login_hint: options.login_hint.clone(),
            acr_values: options.acr_values.clone(),
            prompt: None,
            claims: ClaimsRequest::default()
                .with_id_token_claim("amr", ClaimRequirement::essential()),
        })
    }

    /// The policy as a JSON object, in the shape [`AuthorizationParams::raw`] accepts. Useful as
    /// a starting point for hand-crafted requests.
    pub fn to_json(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert(
            "redirect_uri".to_owned(),
            Value::String(self.redirect_uri.to_string()),
        );
        params.insert("scope".to_owned(), Value::String(self.scopes.join(" ")));
        if let Some(login_hint) = &self.login_hint {
            params.insert("login_hint".to_owned(), Value::String(login_hint.clone()));
        }
        if let Some(acr_values) = &self.acr_values {
            params.insert(
                "acr_values".to_owned(),
                Value::Array(acr_values.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some(prompt) = &self.prompt {
            params.insert("prompt".to_owned(), Value::String(prompt.clone()));
        }
        params.insert("claims".to_owned(), self.claims.to_json());
        params
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamsMode {
    /// Default policy with an optional step-up request merged into it.
    Merged,

    /// Caller supplied parameters replacing the default policy entirely.
    Raw,
}

/// Flat parameter set of an authorization request, before URL encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationParams {
    params: Map<String, Value>,
    mode: ParamsMode,
}

/// Start from `base` and merge the step-up request into it, if there is one.
pub fn compose(base: &AuthorizationPolicy, step_up: Option<&StepUpRequest>) -> AuthorizationParams {
    let mut policy = base.clone();
    if let Some(step_up) = step_up {
        if let Some(prompt) = &step_up.prompt {
            policy.prompt = Some(prompt.clone());
        }
        policy.claims.merge(&step_up.claims);
    }
    let mut params = policy.to_json();
    params.insert("response_type".to_owned(), Value::String("code".to_owned()));
    AuthorizationParams {
        params,
        mode: ParamsMode::Merged,
    }
}

impl AuthorizationParams {
    /// Use exactly the given parameters instead of the default policy.
    pub fn raw(params: Map<String, Value>) -> Self {
        Self {
            params,
            mode: ParamsMode::Raw,
        }
    }

    pub fn mode(&self) -> ParamsMode {
        self.mode
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Add the values binding this request to a pending login. Correlation values supplied by a
    /// caller are replaced, never used.
    pub(crate) fn bind(
        mut self,
        client_id: &str,
        state: &CsrfToken,
        nonce: &Nonce,
        code_challenge: Option<&CodeChallenge>,
        sp_name: Option<&str>,
    ) -> Self {
        for key in ["state", "nonce", "code_challenge", "code_challenge_method"] {
            if self.params.contains_key(key) {
                tracing::warn!(key, "Ignoring caller supplied authorization parameter");
            }
        }
        let params = &mut self.params;
        insert_str(params, "client_id", client_id);
        insert_str(params, "state", state.as_str());
        insert_str(params, "nonce", nonce.as_str());
        match code_challenge {
            Some(code_challenge) => {
                insert_str(params, "code_challenge", code_challenge.code_challenge());
                insert_str(
                    params,
                    "code_challenge_method",
                    code_challenge.code_challenge_method().as_str(),
                );
            }
            None => {
                params.remove("code_challenge");
                params.remove("code_challenge_method");
            }
        }
        if let Some(sp_name) = sp_name {
            insert_str(params, "sp_name", sp_name);
        }
        self.params
            .entry("response_type")
            .or_insert_with(|| Value::String("code".to_owned()));
        self
    }

    /// Serialize to query pairs. Falsy values (`null`, `false`, `0`, empty strings, arrays and
    /// objects) are omitted. Objects are JSON encoded, lists of strings are space separated.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .filter_map(|(key, value)| to_query_value(value).map(|value| (key.clone(), value)))
            .collect()
    }

    /// Append all parameters to the query of `endpoint`.
    pub fn to_url(&self, endpoint: &Url) -> Url {
        let mut url = endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in self.to_query_pairs() {
                query.append_pair(&key, &value);
            }
        }
        url
    }
}

fn insert_str(params: &mut Map<String, Value>, key: &str, value: &str) {
    params.insert(key.to_owned(), Value::String(value.to_owned()));
}

fn to_query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some("true".to_owned()),
        Value::Number(number) => match number.as_f64() {
            Some(n) if n == 0.0 => None,
            _ => Some(number.to_string()),
        },
        Value::String(string) if string.is_empty() => None,
        Value::String(string) => Some(string.clone()),
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) if items.iter().all(Value::is_string) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|it| !it.is_empty())
                .join(" "),
        )
        .filter(|it| !it.is_empty()),
        Value::Object(object) if object.is_empty() => None,
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}
