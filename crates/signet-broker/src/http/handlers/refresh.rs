use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

use crate::{
    http::{SharedContext, error::AppError},
    tokens::TokenPair,
};

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// `POST /auth/refresh`. Redeems a refresh token for a new credential pair.
/// Any rotation failure is a 401; the client must re-authenticate.
pub async fn refresh(
    State(ctx): State<SharedContext>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    ctx.rate_limiter.check("auth:refresh").await?;

    let rotated = ctx.rotator.rotate(&body.refresh_token).await?;
    let access_token = ctx.issuer.issue_access_token(&rotated.user_id)?;

    Ok(Json(TokenPair {
        access_token,
        refresh_token: rotated.raw_token,
        token_type: "bearer",
        expires_in: ctx.issuer.access_ttl().as_secs(),
    }))
}

/// `POST /auth/revoke`. Invalidates a refresh token. Idempotent; always 204.
pub async fn revoke(
    State(ctx): State<SharedContext>,
    Json(body): Json<RefreshRequest>,
) -> Result<StatusCode, AppError> {
    ctx.rotator.revoke(&body.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}
