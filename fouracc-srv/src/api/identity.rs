//! Client identity cookie
//!
//! Every request is tied to an identity. The `FOURACC_SRV` cookie carries
//! the token; when it is missing, malformed or expired a new identity is
//! issued and returned with `Set-Cookie`.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use fouracc_common::session::{Identity, IdentityToken};
use tracing::{debug, warn};

use crate::AppState;

/// Name of the identity cookie
pub const COOKIE_NAME: &str = "FOURACC_SRV";

/// Identity of the current request, available to handlers as an extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIdentity {
    pub token: IdentityToken,
    pub expires_at: DateTime<Utc>,
}

impl From<Identity> for ClientIdentity {
    fn from(identity: Identity) -> Self {
        Self {
            token: identity.token,
            expires_at: identity.expires_at,
        }
    }
}

/// Value of the identity cookie among all `Cookie` headers
pub fn cookie_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == COOKIE_NAME)
        .map(|(_, value)| value.trim_matches('"'))
}

/// `Set-Cookie` value for an identity
pub fn set_cookie_value(identity: &ClientIdentity) -> String {
    format!(
        "{}={}; Path=/; Expires={}; HttpOnly; SameSite=Lax",
        COOKIE_NAME,
        identity.token,
        identity.expires_at.format("%a, %d %b %Y %H:%M:%S GMT")
    )
}

/// Resolves the identity of the request and issues a cookie when needed
pub async fn identity_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let presented = cookie_token(request.headers()).map(str::to_string);
    let resolved = state.store.resolve(presented.as_deref()).await;
    let identity = ClientIdentity::from(resolved.identity);
    if resolved.is_new {
        debug!(token = %identity.token, presented = presented.is_some(), "issued identity");
    }

    request.extensions_mut().insert(identity);
    let mut response = next.run(request).await;

    if resolved.is_new {
        match HeaderValue::from_str(&set_cookie_value(&identity)) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(err) => warn!(error = %err, "could not encode identity cookie"),
        }
    }
    response
}
