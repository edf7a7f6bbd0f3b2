use crate::oidc::OidcConfig;
use crate::time_ext::TimeDurationExt;
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;
use time::OffsetDateTime;
use url::Url;

pub(crate) mod derived_urls;
pub(crate) mod jwk_set_manager;
pub(crate) mod oidc_config_manager;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OidcConfigWithTimestamp {
    pub oidc_config: OidcConfig,
    #[serde(with = "time::serde::rfc3339")]
    pub retrieved: OffsetDateTime,

    /// The discovery endpoint used to query this information.
    pub source: Url,
}

impl OidcConfigWithTimestamp {
    pub fn age(&self) -> StdDuration {
        (OffsetDateTime::now_utc() - self.retrieved).to_std_duration()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwkSetWithTimestamp {
    pub jwk_set: jsonwebtoken::jwk::JwkSet,
    #[serde(with = "time::serde::rfc3339")]
    pub retrieved: OffsetDateTime,

    /// The `jwks_uri` this set was read from. A set from any other source is of no use once the
    /// provider metadata points somewhere else.
    pub source: Url,
}

impl JwkSetWithTimestamp {
    pub fn age(&self) -> StdDuration {
        (OffsetDateTime::now_utc() - self.retrieved).to_std_duration()
    }
}
