use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tracing::debug;

use crate::auth::{AppState, Identity, verify_token};
use crate::error::ApiError;

/// Attach the caller's [`Identity`] to the request.
///
/// No `Authorization` header means anonymous. A header that is present but
/// not a valid bearer token for our secret is rejected rather than silently
/// downgraded.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = if req.headers().contains_key(AUTHORIZATION) {
        let bearer = req
            .headers()
            .typed_get::<Authorization<Bearer>>()
            .ok_or(ApiError::Unauthenticated)?;

        let claims = verify_token(&state.jwt_secret, bearer.token()).map_err(|e| {
            debug!("Rejected identity token: {}", e);
            ApiError::Unauthenticated
        })?;
        Identity::from(claims)
    } else {
        Identity::anonymous()
    };

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
