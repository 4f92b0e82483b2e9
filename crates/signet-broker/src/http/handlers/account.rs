use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

use crate::http::{SharedContext, error::AppError};

#[derive(Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ConfirmRequest {
    pub token: String,
}

/// `POST /auth/recover`. Requests a password-reset message. Responds 202
/// whether or not the address is known.
pub async fn recover(
    State(ctx): State<SharedContext>,
    Json(body): Json<EmailRequest>,
) -> Result<StatusCode, AppError> {
    ctx.rate_limiter.check("auth:recover").await?;
    ctx.recovery.request_password_reset(&body.email).await?;
    Ok(StatusCode::ACCEPTED)
}

/// `POST /auth/verify/request`. Requests an email-verification message.
/// Responds 202 whether or not the address is known.
pub async fn request_verification(
    State(ctx): State<SharedContext>,
    Json(body): Json<EmailRequest>,
) -> Result<StatusCode, AppError> {
    ctx.rate_limiter.check("auth:verify").await?;
    ctx.recovery.request_email_verification(&body.email).await?;
    Ok(StatusCode::ACCEPTED)
}

/// `POST /auth/verify/confirm`. Redeems a verification token.
pub async fn confirm_verification(
    State(ctx): State<SharedContext>,
    Json(body): Json<ConfirmRequest>,
) -> Result<StatusCode, AppError> {
    ctx.recovery.confirm_email_verification(&body.token).await?;
    Ok(StatusCode::NO_CONTENT)
}
