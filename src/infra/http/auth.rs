//! Request identity.
//!
//! Authentication happens upstream (a reverse proxy or auth gateway); the
//! verified username arrives in the `x-forwarded-user` header. The extractors
//! resolve it to a stored user, provisioning the row on first sight.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use url::form_urlencoded;

use crate::application::error::HttpError;
use crate::domain::entities::UserRecord;

use super::public::HttpState;

pub const FORWARDED_USER_HEADER: &str = "x-forwarded-user";

/// Redirect an unauthenticated request to the login page, preserving the
/// original path so the gateway can send the user back.
pub fn login_redirect(parts: &Parts) -> Response {
    let next = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let query: String = form_urlencoded::Serializer::new(String::new())
        .append_pair("next", next)
        .finish();
    Redirect::to(&format!("/auth/login/?{query}")).into_response()
}

fn forwarded_username(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(FORWARDED_USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

async fn resolve_user(state: &HttpState, username: &str) -> Result<UserRecord, Response> {
    state.users.ensure_user(username).await.map_err(|err| {
        HttpError::from_error(
            "infra::http::auth::resolve_user",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to resolve user",
            &err,
        )
        .into_response()
    })
}

/// The authenticated user. Rejects with a redirect to the login page when the
/// identity header is absent.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRecord);

impl FromRequestParts<HttpState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpState,
    ) -> Result<Self, Self::Rejection> {
        let Some(username) = forwarded_username(parts) else {
            return Err(login_redirect(parts));
        };

        let user = resolve_user(state, &username).await?;
        Ok(CurrentUser(user))
    }
}

/// The viewer, if any. Anonymous requests yield `MaybeUser(None)` instead of
/// a rejection.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<UserRecord>);

impl FromRequestParts<HttpState> for MaybeUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpState,
    ) -> Result<Self, Self::Rejection> {
        let Some(username) = forwarded_username(parts) else {
            return Ok(MaybeUser(None));
        };

        let user = resolve_user(state, &username).await?;
        Ok(MaybeUser(Some(user)))
    }
}
