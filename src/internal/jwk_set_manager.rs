use crate::JwkSetEndpoint;
use crate::error::{DiscoveryError, JwkSetSnafu};
use crate::internal::JwkSetWithTimestamp;
use crate::request::{self, HttpClient};
use jsonwebtoken::Algorithm;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, PublicKeyUse};
use snafu::ResultExt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration as StdDuration;
use time::OffsetDateTime;

#[derive(Debug)]
pub(crate) struct JwkSetManager {
    max_age: StdDuration,
    /// Only the latest set is consulted. A key the provider withdrew stops being accepted with
    /// the next refresh.
    jwk_set: RwLock<Option<Arc<JwkSetWithTimestamp>>>,
}

impl JwkSetManager {
    pub(crate) fn new(max_age: StdDuration) -> Self {
        Self {
            max_age,
            jwk_set: RwLock::new(None),
        }
    }

    pub(crate) fn cached(&self) -> Option<Arc<JwkSetWithTimestamp>> {
        self.jwk_set
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) async fn get(
        &self,
        http: &HttpClient,
        jwk_set_endpoint: &JwkSetEndpoint,
    ) -> Result<Arc<JwkSetWithTimestamp>, DiscoveryError> {
        match self.cached() {
            Some(jwk_set)
                if &jwk_set.source == jwk_set_endpoint && jwk_set.age() <= self.max_age =>
            {
                Ok(jwk_set)
            }
            _ => self.refresh(http, jwk_set_endpoint).await,
        }
    }

    pub(crate) async fn refresh(
        &self,
        http: &HttpClient,
        jwk_set_endpoint: &JwkSetEndpoint,
    ) -> Result<Arc<JwkSetWithTimestamp>, DiscoveryError> {
        tracing::trace!(%jwk_set_endpoint, "Retrieving JWK set");
        let jwk_set = request::retrieve_jwk_set(http, jwk_set_endpoint)
            .await
            .context(JwkSetSnafu {})?;
        let new = Arc::new(JwkSetWithTimestamp {
            jwk_set,
            retrieved: OffsetDateTime::now_utc(),
            source: jwk_set_endpoint.clone(),
        });

        let mut current = self
            .jwk_set
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if current
            .as_ref()
            .is_some_and(|known| known.jwk_set != new.jwk_set)
        {
            tracing::debug!("JWK set changed. Withdrawn keys are no longer accepted");
        }
        *current = Some(new.clone());
        Ok(new)
    }

    /// Find a key suitable to verify a signature made with `alg`. Without a `kid`, a key is only
    /// returned if exactly one candidate exists.
    pub(crate) fn find_key(&self, kid: Option<&str>, alg: Algorithm) -> Option<Jwk> {
        self.cached()
            .and_then(|set| select_key(&set.jwk_set.keys, kid, alg))
    }

    pub(crate) fn age(&self) -> Option<StdDuration> {
        self.cached().map(|it| it.age())
    }

    pub(crate) fn forget(&self) {
        *self
            .jwk_set
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

fn select_key(keys: &[Jwk], kid: Option<&str>, alg: Algorithm) -> Option<Jwk> {
    let mut candidates = keys.iter().filter(|jwk| is_usable_for(jwk, alg));
    match kid {
        Some(kid) => candidates
            .find(|jwk| jwk.common.key_id.as_deref() == Some(kid))
            .cloned(),
        None => match (candidates.next(), candidates.next()) {
            (Some(single), None) => Some(single.clone()),
            _ => None,
        },
    }
}

fn is_usable_for(jwk: &Jwk, alg: Algorithm) -> bool {
    use Algorithm::*;

    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
        return false;
    }
    // Symmetric keys published in a JWK set are never accepted.
    match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => {
            matches!(alg, RS256 | RS384 | RS512 | PS256 | PS384 | PS512)
        }
        AlgorithmParameters::EllipticCurve(_) => matches!(alg, ES256 | ES384),
        AlgorithmParameters::OctetKeyPair(_) => matches!(alg, EdDSA),
        _ => false,
    }
}
