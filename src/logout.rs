use crate::EndSessionEndpoint;
use url::Url;

/// URL ending the user's session at the provider (RP-initiated logout).
///
/// The provider sends the user agent back to `post_logout_redirect_uri` afterwards. Without an
/// `id_token_hint`, providers usually ask the user for confirmation.
pub fn end_session_url(
    end_session_endpoint: EndSessionEndpoint,
    client_id: &str,
    post_logout_redirect_uri: &Url,
    id_token_hint: Option<&str>,
) -> Url {
    let mut logout_url: Url = end_session_endpoint;
    logout_url
        .query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair(
            "post_logout_redirect_uri",
            post_logout_redirect_uri.as_str(),
        );
    if let Some(id_token_hint) = id_token_hint {
        logout_url
            .query_pairs_mut()
            .append_pair("id_token_hint", id_token_hint);
    }
    logout_url
}
