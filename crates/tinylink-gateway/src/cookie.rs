//! Signed owner cookie.
//!
//! Every browser is identified by an opaque owner id carried in the
//! `tinylink_owner` cookie as `<uuid>.<signature>`, where the signature is the
//! unpadded base64url HMAC-SHA256 of the uuid under the server secret.
//! Requests without a valid cookie get a fresh owner id and a `Set-Cookie`.

use std::fmt::{Debug, Formatter};

use axum::extract::{Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tinylink_core::OwnerId;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::AppState;

pub const OWNER_COOKIE: &str = "tinylink_owner";

/// One year, in seconds.
pub const COOKIE_MAX_AGE: u64 = 31_104_000;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
#[error("cookie secret cannot be used as an HMAC key")]
pub struct InvalidSecret;

/// Signs and verifies owner ids.
#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
}

impl Debug for CookieSigner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

impl CookieSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, InvalidSecret> {
        let mac = HmacSha256::new_from_slice(secret.as_ref()).map_err(|_| InvalidSecret)?;
        Ok(Self { mac })
    }

    fn signature(&self, owner: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(owner.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    /// Returns the cookie value for `owner`.
    pub fn sign(&self, owner: &OwnerId) -> String {
        let signature = URL_SAFE_NO_PAD.encode(self.signature(owner.as_str()));
        format!("{owner}.{signature}")
    }

    /// Checks a cookie value and returns the owner id it carries.
    pub fn verify(&self, value: &str) -> Option<OwnerId> {
        let (owner, signature) = value.rsplit_once('.')?;
        Uuid::parse_str(owner).ok()?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac.clone();
        mac.update(owner.as_bytes());
        mac.verify_slice(&signature).ok()?;

        Some(OwnerId::new(owner))
    }

    /// Full `Set-Cookie` header value issuing `owner`.
    pub fn set_cookie(&self, owner: &OwnerId) -> String {
        format!(
            "{OWNER_COOKIE}={}; Path=/; Max-Age={COOKIE_MAX_AGE}; HttpOnly",
            self.sign(owner)
        )
    }

    /// Finds a validly signed owner cookie among the request headers.
    pub fn owner_from_headers(&self, headers: &HeaderMap) -> Option<OwnerId> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(name, _)| *name == OWNER_COOKIE)
            .find_map(|(_, value)| self.verify(value))
    }
}

/// Middleware attaching the caller's [`OwnerId`] to the request extensions.
pub async fn owner_cookie(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let signer = state.cookies();
    let (owner, issued) = match signer.owner_from_headers(request.headers()) {
        Some(owner) => (owner, false),
        None => {
            let owner = OwnerId::new(Uuid::new_v4().to_string());
            debug!(owner = %owner, "issuing owner cookie");
            (owner, true)
        }
    };

    request.extensions_mut().insert(owner.clone());
    let mut response = next.run(request).await;

    if issued {
        match HeaderValue::from_str(&signer.set_cookie(&owner)) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "failed to encode owner cookie"),
        }
    }

    response
}
