use crate::DiscoveryEndpoint;
use crate::error::{DiscoveryError, IssuerMismatchSnafu, MetadataSnafu};
use crate::internal::OidcConfigWithTimestamp;
use crate::request::{self, HttpClient};
use snafu::{ResultExt, ensure};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration as StdDuration;
use time::OffsetDateTime;

/// Caches the provider's discovery document.
///
/// Nothing is fetched until first use. The cached document is refetched once it is older than
/// `max_age`, or whenever a refresh is forced.
#[derive(Debug)]
pub(crate) struct OidcConfigManager {
    discovery_endpoint: DiscoveryEndpoint,
    expected_issuer: String,
    max_age: StdDuration,
    oidc_config: RwLock<Option<Arc<OidcConfigWithTimestamp>>>,
}

impl OidcConfigManager {
    pub(crate) fn new(
        discovery_endpoint: DiscoveryEndpoint,
        expected_issuer: String,
        max_age: StdDuration,
    ) -> Self {
        Self {
            discovery_endpoint,
            expected_issuer,
            max_age,
            oidc_config: RwLock::new(None),
        }
    }

    pub(crate) fn cached(&self) -> Option<Arc<OidcConfigWithTimestamp>> {
        self.oidc_config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_usable(&self, oidc_config: &OidcConfigWithTimestamp) -> bool {
        oidc_config.source == self.discovery_endpoint && oidc_config.age() <= self.max_age
    }

    /// The cached document, or a freshly fetched one if there is none or it is too old.
    pub(crate) async fn get(
        &self,
        http: &HttpClient,
    ) -> Result<Arc<OidcConfigWithTimestamp>, DiscoveryError> {
        match self.cached() {
            Some(oidc_config) if self.is_usable(&oidc_config) => Ok(oidc_config),
            Some(_) => {
                tracing::debug!("OIDC config too old. Refreshing...");
                self.refresh(http).await
            }
            None => self.refresh(http).await,
        }
    }

    /// Fetch the discovery document, replacing the cached one on success. A failed fetch leaves
    /// the cache untouched.
    pub(crate) async fn refresh(
        &self,
        http: &HttpClient,
    ) -> Result<Arc<OidcConfigWithTimestamp>, DiscoveryError> {
        tracing::trace!(discovery_endpoint = %self.discovery_endpoint, "Retrieving OIDC config");
        let oidc_config = request::retrieve_oidc_config(http, &self.discovery_endpoint)
            .await
            .context(MetadataSnafu {})?;

        let issuer = oidc_config.standard_claims.issuer.as_str();
        ensure!(
            issuer == self.expected_issuer,
            IssuerMismatchSnafu {
                expected: self.expected_issuer.clone(),
                found: issuer,
            }
        );

        let oidc_config = Arc::new(OidcConfigWithTimestamp {
            oidc_config,
            retrieved: OffsetDateTime::now_utc(),
            source: self.discovery_endpoint.clone(),
        });
        *self
            .oidc_config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(oidc_config.clone());
        tracing::debug!("Stored new OIDC config");
        Ok(oidc_config)
    }

    pub(crate) fn age(&self) -> Option<StdDuration> {
        self.cached().map(|it| it.age())
    }

    pub(crate) fn forget(&self) {
        *self
            .oidc_config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}
