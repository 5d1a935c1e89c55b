//! Bearer-token middleware.
//!
//! Optional: built only when `--jwt-rsa-public-key` points at an RSA public
//! key PEM. Tokens are RS256 JWTs; the subject is logged on acceptance so
//! access stays attributable.

use std::path::Path;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::json;

use blobcache_common::{CacheError, CacheResult};

use crate::AppState;

/// Claims carried by accepted tokens. `action` and `url` are issued by the
/// deployment's token service; the middleware only logs them.
#[derive(Debug, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
}

/// Validates RS256 bearer tokens against one RSA public key.
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Loads the public key PEM; any problem here is a startup failure.
    pub fn from_pem_file(path: &Path) -> CacheResult<Self> {
        let pem = std::fs::read(path).map_err(|err| {
            CacheError::Config(format!("reading jwt public key {}: {err}", path.display()))
        })?;
        let key = DecodingKey::from_rsa_pem(&pem)
            .map_err(|err| CacheError::Config(format!("parsing jwt public key: {err}")))?;
        Ok(TokenVerifier {
            key,
            validation: Validation::new(Algorithm::RS256),
        })
    }

    fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
    }
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
}

/// Middleware guarding the user-facing routes. A node without a configured
/// verifier passes everything through.
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(verifier) = state.auth.as_ref() else {
        return next.run(request).await;
    };

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let Some(header_value) = header_value else {
        return unauthorized("Missing authorization header");
    };

    let token = header_value.trim_start_matches("Bearer").trim();
    match verifier.verify(token) {
        Ok(claims) => {
            tracing::info!(
                subject = claims.sub.as_deref().unwrap_or("unknown"),
                action = claims.action.as_deref().unwrap_or(""),
                url = claims.url.as_deref().unwrap_or(""),
                "bearer token accepted"
            );
            next.run(request).await
        }
        Err(err) => {
            tracing::debug!(error = %err, "bearer token rejected");
            unauthorized("JWT token invalid")
        }
    }
}
