use axum::{Json, extract::State};

use crate::{
    http::{SharedContext, error::AppError},
    keys::JwkSet,
};

/// `GET /.well-known/jwks.json`. Public verification keys only.
pub async fn get_jwks(State(ctx): State<SharedContext>) -> Result<Json<JwkSet>, AppError> {
    match &ctx.keys {
        Some(keys) => Ok(Json(keys.jwks())),
        None => Err(AppError::not_found(
            "token signing uses a symmetric secret; no JWKS is published",
        )),
    }
}
