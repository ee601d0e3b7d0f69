use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use crate::responses::JsonResponse;
use crate::routes::auth::claims::Claims;
use crate::state::AppState;

pub const AUTH_COOKIE: &str = "auth_token";

/// The authenticated caller. Handlers thread `claims.id` into every ticket
/// operation explicitly.
#[derive(Debug, PartialEq)]
pub struct AuthSession(pub Claims);

impl AuthSession {
    pub fn user_id(&self) -> i64 {
        self.0.id
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).or_else(|| {
            CookieJar::from_headers(&parts.headers)
                .get(AUTH_COOKIE)
                .map(|cookie| cookie.value().to_string())
        });
        let Some(token) = token else {
            return Err(JsonResponse::unauthorized("Not logged in").into_response());
        };

        let claims = state.sessions.verify(&token).map_err(|err| {
            debug!(?err, "rejected session token");
            JsonResponse::unauthorized("Session expired, please log in again").into_response()
        })?;

        Ok(AuthSession(claims))
    }
}
