use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};

use crate::{
    http::{SharedContext, error::AppError, handlers::bearer_token},
    rate_limit,
    tokens::TokenKind,
};

#[derive(Deserialize)]
pub struct AuthorizeQuery {
    pub redirect_uri: String,
    /// Allow-listed client URL to land on after the callback.
    pub return_to: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct AuthorizeResponse {
    pub url: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
}

/// `GET /oauth/{provider}/authorize`. Starts a flow; the raw state token and
/// PKCE verifier are returned to the caller for safekeeping until the
/// callback.
///
/// A valid bearer access token switches the flow into link-to-existing-
/// account mode for that user.
pub async fn authorize(
    Path(provider): Path<String>,
    Query(query): Query<AuthorizeQuery>,
    headers: HeaderMap,
    State(ctx): State<SharedContext>,
) -> Result<Json<AuthorizeResponse>, AppError> {
    ctx.rate_limiter
        .check(&rate_limit::key("authorize", &provider))
        .await?;

    if let Some(target) = &query.return_to
        && !ctx.redirect_guard.is_allowed(target)
    {
        return Err(AppError::bad_request("return_to not permitted"));
    }

    // Linking mode requires the caller to prove who they are; an invalid
    // token is rejected rather than silently downgraded to a sign-in.
    let linking_user_id = match bearer_token(&headers) {
        Some(token) => Some(ctx.issuer.verify(token, TokenKind::Access)?.sub),
        None => None,
    };

    let flow = ctx
        .flow
        .initiate(&provider, &query.redirect_uri, query.return_to, linking_user_id)
        .await?;

    Ok(Json(AuthorizeResponse {
        url: flow.authorization_url,
        state: flow.state_token,
        code_verifier: flow.code_verifier,
    }))
}
