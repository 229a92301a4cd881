//! Bearer token filter: verify the token, re-resolve the user, put the
//! `Principal` into request extensions for the `CurrentPrincipal` extractor.
//!
//! Every rejection is a plain 401. The cause (token class, unknown user) is
//! only logged.

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::{self, Next},
    response::Response,
};

use crate::error::AppError;
use crate::services::auth::AuthError;
use crate::state::AppState;

/// Require a valid bearer token on every route of `router`.
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    router.layer(middleware::from_fn_with_state(state, bearer_middleware))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();

    (!token.is_empty()).then_some(token)
}

async fn bearer_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    // Keep the header borrow out of the await below.
    let username = {
        let token = bearer_token(req.headers()).ok_or_else(|| {
            tracing::warn!("missing bearer token");
            AppError::Unauthorized
        })?;

        // `validate` logs the failure class itself.
        if !state.tokens.validate(token) {
            return Err(AppError::Unauthorized);
        }

        state
            .tokens
            .extract_username(token)
            .map_err(AuthError::from)?
    };

    let principal = match state.credentials.load_by_username(&username).await {
        Ok(principal) => principal,
        Err(err) => {
            tracing::warn!(error = %err, "token subject could not be resolved");
            return Err(err.into());
        }
    };

    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}
