//! Request authentication.
//!
//! `none` mode passes everything through (the posture the original fleet
//! ships with); `token` mode requires a static bearer secret compared in
//! constant time. Identity providers live outside this server.

use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use constant_time_eq::constant_time_eq;

use crate::errors::AppError;
use crate::infra::app_state::AppState;
use crate::infra::config::AuthMode;

pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    match state.config.auth_mode {
        AuthMode::None => Ok(next.run(request).await),
        AuthMode::Token => {
            let expected = state.config.token_secret.as_deref().unwrap_or_default();
            let presented = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "));

            match presented {
                Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => {
                    Ok(next.run(request).await)
                }
                Some(_) => Err(AppError::unauthorized("invalid bearer token")),
                None => Err(AppError::unauthorized("missing bearer token")),
            }
        }
    }
}
