use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use oidc_relying_party::url::Url;
use oidc_relying_party::{CallbackQuery, Options};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use time::{Duration, OffsetDateTime};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const PRIVATE_KEY: &[u8] = include_bytes!("keys/idp_private_key.pem");
const JWK: &str = include_str!("keys/idp_jwk.json");

pub const CLIENT_ID: &str = "test-client";
pub const CLIENT_SECRET: &str = "test-secret";
pub const SUBJECT: &str = "user-1";

/// How the provider answers. Change it with [`MockIdp::configure`] at any point of a test.
#[derive(Debug, Clone)]
pub struct Behavior {
    /// `kid` put into the header of every issued JWT.
    pub kid: String,
    /// `kid` of the single key published in the JWK set. The key material never changes.
    pub published_kid: String,
    pub acr: Option<String>,
    pub amr: Vec<String>,
    pub audience: Value,
    pub id_token_lifetime: Duration,
    /// `auth_time`, relative to the moment the token is issued.
    pub auth_time_offset: Option<Duration>,
    /// Put into the ID token instead of the nonce of the authorization request.
    pub nonce_override: Option<String>,
    /// Issuer published in the discovery document instead of the real one.
    pub discovery_issuer: Option<String>,
    pub iss_parameter_supported: bool,
    pub end_session_supported: bool,
    pub userinfo_subject: String,
    pub signed_userinfo: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            kid: "test-key-1".to_owned(),
            published_kid: "test-key-1".to_owned(),
            acr: Some("eidas1".to_owned()),
            amr: vec!["pwd".to_owned()],
            audience: json!(CLIENT_ID),
            id_token_lifetime: Duration::minutes(5),
            auth_time_offset: Some(Duration::ZERO),
            nonce_override: None,
            discovery_issuer: None,
            iss_parameter_supported: false,
            end_session_supported: true,
            userinfo_subject: SUBJECT.to_owned(),
            signed_userinfo: false,
        }
    }
}

/// What the authorization request of an issued code looked like.
struct IssuedCode {
    nonce: String,
    redirect_uri: Option<String>,
}

struct IdpState {
    issuer: String,
    behavior: Mutex<Behavior>,
    codes: Mutex<HashMap<String, IssuedCode>>,
    issued_codes: AtomicUsize,
    token_requests: Mutex<Vec<HashMap<String, String>>>,
    discovery_requests: AtomicUsize,
    jwks_requests: AtomicUsize,
}

impl IdpState {
    fn behavior(&self) -> Behavior {
        self.behavior.lock().unwrap().clone()
    }
}

/// In-process OpenID provider serving discovery, JWKS, token and userinfo endpoints on a
/// random local port. The authorization endpoint is simulated by [`MockIdp::authorize`].
pub struct MockIdp {
    state: Arc<IdpState>,
    server: JoinHandle<()>,
}

impl Drop for MockIdp {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl MockIdp {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("TcpListener");
        let addr = listener.local_addr().expect("local address");

        let state = Arc::new(IdpState {
            issuer: format!("http://{addr}"),
            behavior: Mutex::new(Behavior::default()),
            codes: Mutex::new(HashMap::new()),
            issued_codes: AtomicUsize::new(0),
            token_requests: Mutex::new(Vec::new()),
            discovery_requests: AtomicUsize::new(0),
            jwks_requests: AtomicUsize::new(0),
        });

        let router = Router::new()
            .route("/.well-known/openid-configuration", get(discovery))
            .route("/jwks", get(jwks))
            .route("/token", post(token))
            .route("/userinfo", get(userinfo))
            .with_state(state.clone());

        let server = tokio::spawn(async move {
            tracing::info!(%addr, "Serving mock identity provider...");
            axum::serve(listener, router)
                .await
                .expect("Server to start successfully");
        });

        Self { state, server }
    }

    pub fn issuer(&self) -> &str {
        &self.state.issuer
    }

    /// Options for a relying party registered at this provider.
    pub fn options(&self) -> Options {
        Options::from_vars([
            ("PC_PROVIDER", self.issuer()),
            ("PC_CLIENT_ID", CLIENT_ID),
            ("PC_CLIENT_SECRET", CLIENT_SECRET),
            ("HOST", "http://localhost:3000"),
            ("CALLBACK_URL", "/login-callback"),
            ("PC_SCOPES", "openid email given_name"),
            ("ACR_VALUE_FOR_CONSISTENCY_CHECKED_2FA", "eidas2"),
            ("ACR_VALUE_FOR_SELF_ASSERTED_2FA", "self-asserted-2fa"),
            (
                "ACR_VALUE_FOR_CERTIFICATION_DIRIGEANT",
                "certification-dirigeant",
            ),
            ("IS_HTTP_PROTOCOL_FORBIDDEN", "False"),
        ])
        .expect("valid options")
    }

    pub fn configure(&self, configure: impl FnOnce(&mut Behavior)) {
        configure(&mut self.state.behavior.lock().unwrap());
    }

    /// Act as the authorization endpoint after the user authenticated: issue a code bound to
    /// the nonce of `login_url` and build the redirect back to the relying party.
    pub fn authorize(&self, login_url: &Url) -> CallbackQuery {
        self.authorize_with_iss(login_url, None)
    }

    pub fn authorize_with_iss(&self, login_url: &Url, iss: Option<&str>) -> CallbackQuery {
        let query: HashMap<String, String> = login_url.query_pairs().into_owned().collect();
        let code = format!(
            "code-{}",
            self.state.issued_codes.fetch_add(1, Ordering::SeqCst)
        );
        let issued = IssuedCode {
            nonce: query.get("nonce").cloned().unwrap_or_default(),
            redirect_uri: query.get("redirect_uri").cloned(),
        };
        self.state
            .codes
            .lock()
            .unwrap()
            .insert(code.clone(), issued);

        let mut callback = vec![("code".to_owned(), code)];
        if let Some(state) = query.get("state") {
            callback.push(("state".to_owned(), state.clone()));
        }
        if let Some(iss) = iss {
            callback.push(("iss".to_owned(), iss.to_owned()));
        }
        callback.into_iter().collect()
    }

    pub fn token_requests(&self) -> Vec<HashMap<String, String>> {
        self.state.token_requests.lock().unwrap().clone()
    }

    pub fn discovery_requests(&self) -> usize {
        self.state.discovery_requests.load(Ordering::SeqCst)
    }

    pub fn jwks_requests(&self) -> usize {
        self.state.jwks_requests.load(Ordering::SeqCst)
    }
}

fn sign(kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_owned());
    let key = EncodingKey::from_rsa_pem(PRIVATE_KEY).expect("valid private key");
    jsonwebtoken::encode(&header, claims, &key).expect("JWT to be encodable")
}

async fn discovery(State(idp): State<Arc<IdpState>>) -> Json<Value> {
    idp.discovery_requests.fetch_add(1, Ordering::SeqCst);
    let behavior = idp.behavior();
    let issuer = &idp.issuer;
    Json(json!({
        "issuer": behavior.discovery_issuer.unwrap_or_else(|| issuer.clone()),
        "authorization_endpoint": format!("{issuer}/authorize"),
        "token_endpoint": format!("{issuer}/token"),
        "userinfo_endpoint": format!("{issuer}/userinfo"),
        "jwks_uri": format!("{issuer}/jwks"),
        "end_session_endpoint": behavior
            .end_session_supported
            .then(|| format!("{issuer}/session/end")),
        "response_types_supported": ["code"],
        "id_token_signing_alg_values_supported": ["RS256"],
        "acr_values_supported": ["eidas1", "eidas2", "self-asserted-2fa", "certification-dirigeant"],
        "claims_parameter_supported": true,
        "authorization_response_iss_parameter_supported": behavior.iss_parameter_supported,
    }))
}

async fn jwks(State(idp): State<Arc<IdpState>>) -> Json<Value> {
    idp.jwks_requests.fetch_add(1, Ordering::SeqCst);
    let mut jwk: Value = serde_json::from_str(JWK).expect("valid JWK");
    jwk["kid"] = json!(idp.behavior().published_kid);
    Json(json!({ "keys": [jwk] }))
}

async fn token(
    State(idp): State<Arc<IdpState>>,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    idp.token_requests.lock().unwrap().push(params.clone());

    if params.get("client_secret").map(String::as_str) != Some(CLIENT_SECRET) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid_client" })),
        )
            .into_response();
    }
    // Codes are single use and must be redeemed with the redirect_uri they were issued for.
    let issued = params
        .get("code")
        .and_then(|code| idp.codes.lock().unwrap().remove(code))
        .filter(|issued| issued.redirect_uri.as_ref() == params.get("redirect_uri"));
    let Some(IssuedCode { nonce, .. }) = issued else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_grant",
                "error_description": "Unknown, already redeemed or misdirected code",
            })),
        )
            .into_response();
    };

    let behavior = idp.behavior();
    let now = OffsetDateTime::now_utc();
    let mut claims = json!({
        "iss": idp.issuer,
        "sub": SUBJECT,
        "aud": behavior.audience,
        "exp": (now + behavior.id_token_lifetime).unix_timestamp(),
        "iat": now.unix_timestamp(),
        "nonce": behavior.nonce_override.unwrap_or(nonce),
        "amr": behavior.amr,
        "email": "signed@example.com",
    });
    if let Some(acr) = behavior.acr {
        claims["acr"] = json!(acr);
    }
    if let Some(offset) = behavior.auth_time_offset {
        claims["auth_time"] = json!((now + offset).unix_timestamp());
    }

    Json(json!({
        "access_token": format!("access-{}", now.unix_timestamp_nanos()),
        "token_type": "Bearer",
        "expires_in": 300,
        "id_token": sign(&behavior.kid, &claims),
        "scope": "openid email given_name",
    }))
    .into_response()
}

async fn userinfo(State(idp): State<Arc<IdpState>>, headers: HeaderMap) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|it| it.to_str().ok())
        .is_some_and(|it| it.starts_with("Bearer access-"));
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let behavior = idp.behavior();
    let mut claims = json!({
        "sub": behavior.userinfo_subject,
        "email": "unsigned@example.com",
        "given_name": "Jean",
        "acr": "eidas3",
    });
    if behavior.signed_userinfo {
        claims["iss"] = json!(idp.issuer);
        claims["aud"] = json!(CLIENT_ID);
        return (
            [(header::CONTENT_TYPE, "application/jwt")],
            sign(&behavior.kid, &claims),
        )
            .into_response();
    }
    Json(claims).into_response()
}
