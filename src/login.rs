use crate::AuthorizationEndpoint;
use crate::authorization::AuthorizationParams;
use url::Url;

/// URL to redirect the user agent to in order to start the authorization code flow.
///
/// `params` must already be bound to a pending login.
pub fn login_url(
    authorization_endpoint: &AuthorizationEndpoint,
    params: &AuthorizationParams,
) -> Url {
    let login_url = params.to_url(authorization_endpoint);
    tracing::trace!(
        mode = ?params.mode(),
        endpoint = %authorization_endpoint,
        "Built login URL"
    );
    login_url
}
