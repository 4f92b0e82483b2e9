use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};

use crate::{
    http::{SharedContext, error::AppError, handlers::bearer_token},
    tokens::TokenKind,
};

/// `DELETE /oauth/{provider}/link`. Detaches a provider from the
/// authenticated account.
pub async fn unlink(
    Path(provider): Path<String>,
    headers: HeaderMap,
    State(ctx): State<SharedContext>,
) -> Result<StatusCode, AppError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;
    let claims = ctx.issuer.verify(token, TokenKind::Access)?;

    if ctx.linker.unlink(&claims.sub, &provider).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!(
            "no `{provider}` link for this account"
        )))
    }
}
