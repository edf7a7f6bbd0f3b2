use crate::JwkSetEndpoint;
use crate::config::Options;
use crate::error::{
    AuthError, DiscoveryEndpointSnafu, DiscoverySnafu, EndpointSnafu, UnknownKeySnafu,
};
use crate::internal::derived_urls;
use crate::internal::jwk_set_manager::JwkSetManager;
use crate::internal::oidc_config_manager::OidcConfigManager;
use crate::internal::{JwkSetWithTimestamp, OidcConfigWithTimestamp};
use crate::request::HttpClient;
use jsonwebtoken::Algorithm;
use jsonwebtoken::jwk::Jwk;
use snafu::ResultExt;
use std::sync::Arc;
use std::time::Duration as StdDuration;

/// Resolves and caches the metadata and signing keys of the configured provider.
///
/// Shared by all sessions. Concurrent callers may race to populate the cache; each fetch
/// replaces the cached value as a whole, so the last successful one wins.
#[derive(Debug)]
pub struct ProviderMetadataResolver {
    http: HttpClient,
    oidc_config: OidcConfigManager,
    jwk_set: JwkSetManager,
}

impl ProviderMetadataResolver {
    pub(crate) fn new(options: &Options, http: HttpClient) -> Result<Self, AuthError> {
        let discovery_endpoint = options
            .discovery_endpoint()
            .context(DiscoveryEndpointSnafu {})
            .context(DiscoverySnafu {})?;
        Ok(Self {
            http,
            oidc_config: OidcConfigManager::new(
                discovery_endpoint,
                options.expected_issuer(),
                options.advanced.max_oidc_config_age,
            ),
            jwk_set: JwkSetManager::new(options.advanced.max_jwk_set_age),
        })
    }

    /// Provider metadata, fetched on first use and whenever the cached copy got too old.
    pub async fn resolve(&self) -> Result<Arc<OidcConfigWithTimestamp>, AuthError> {
        self.oidc_config
            .get(&self.http)
            .await
            .context(DiscoverySnafu {})
    }

    /// Refetch metadata and signing keys, regardless of their age.
    pub async fn refresh(&self) -> Result<Arc<OidcConfigWithTimestamp>, AuthError> {
        let oidc_config = self
            .oidc_config
            .refresh(&self.http)
            .await
            .context(DiscoverySnafu {})?;
        self.refresh_jwk_set(&oidc_config).await?;
        Ok(oidc_config)
    }

    /// Signing key for `kid` usable with `alg`.
    ///
    /// If no such key is known, metadata and keys are refetched exactly once before giving up
    /// with [`AuthError::UnknownKey`].
    pub async fn get_key(&self, kid: Option<&str>, alg: Algorithm) -> Result<Jwk, AuthError> {
        let oidc_config = self.resolve().await?;
        let jwk_set_endpoint = jwk_set_endpoint(&oidc_config)?;
        self.jwk_set
            .get(&self.http, &jwk_set_endpoint)
            .await
            .context(DiscoverySnafu {})?;
        if let Some(jwk) = self.jwk_set.find_key(kid, alg) {
            return Ok(jwk);
        }

        tracing::debug!(?kid, ?alg, "No matching signing key known. Refreshing once");
        self.refresh().await?;
        self.jwk_set.find_key(kid, alg).ok_or_else(|| {
            tracing::warn!(?kid, ?alg, "No matching signing key after refresh");
            UnknownKeySnafu {
                kid: kid.map(str::to_owned),
            }
            .build()
        })
    }

    /// Drop all cached metadata and keys. The next call fetches them again.
    pub fn forget(&self) {
        self.oidc_config.forget();
        self.jwk_set.forget();
    }

    /// The currently cached metadata, without triggering a fetch.
    pub fn cached_metadata(&self) -> Option<Arc<OidcConfigWithTimestamp>> {
        self.oidc_config.cached()
    }

    pub fn cached_jwk_set(&self) -> Option<Arc<JwkSetWithTimestamp>> {
        self.jwk_set.cached()
    }

    pub fn oidc_config_age(&self) -> Option<StdDuration> {
        self.oidc_config.age()
    }

    pub fn jwk_set_age(&self) -> Option<StdDuration> {
        self.jwk_set.age()
    }

    pub(crate) fn http(&self) -> &HttpClient {
        &self.http
    }

    async fn refresh_jwk_set(
        &self,
        oidc_config: &OidcConfigWithTimestamp,
    ) -> Result<Arc<JwkSetWithTimestamp>, AuthError> {
        let jwk_set_endpoint = jwk_set_endpoint(oidc_config)?;
        self.jwk_set
            .refresh(&self.http, &jwk_set_endpoint)
            .await
            .context(DiscoverySnafu {})
    }
}

fn jwk_set_endpoint(oidc_config: &OidcConfigWithTimestamp) -> Result<JwkSetEndpoint, AuthError> {
    endpoint(derived_urls::jwks_endpoint(&oidc_config.oidc_config))
}

/// Turns a failed endpoint lookup into a discovery failure.
pub(crate) fn endpoint<T>(
    result: Result<T, derived_urls::DerivedUrlError>,
) -> Result<T, AuthError> {
    result
        .context(EndpointSnafu {})
        .context(DiscoverySnafu {})
}
