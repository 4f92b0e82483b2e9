use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use url::Url;

use crate::{
    http::{SharedContext, error::AppError},
    rate_limit,
    tokens::issue_token_pair,
};

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    /// Supplied by deployments where the client holds the verifier itself.
    pub code_verifier: Option<String>,
}

/// `GET /oauth/{provider}/callback`. Finishes a flow and issues credentials,
/// either as a JSON pair or as query parameters on an allow-listed redirect.
pub async fn callback(
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    State(ctx): State<SharedContext>,
) -> Result<Response, AppError> {
    ctx.rate_limiter
        .check(&rate_limit::key("callback", &provider))
        .await?;

    if let Some(err) = query.error {
        return Err(AppError::bad_request(format!(
            "provider returned error: {err}"
        )));
    }
    let state = query
        .state
        .ok_or_else(|| AppError::bad_request("missing state"))?;
    let code = query
        .code
        .ok_or_else(|| AppError::bad_request("missing code"))?;

    let completed = ctx
        .flow
        .complete(&provider, &code, &state, query.code_verifier.as_deref())
        .await?;

    if !completed.user.is_active {
        return Err(AppError::new(StatusCode::FORBIDDEN, "account is disabled"));
    }

    let pair = issue_token_pair(&ctx.issuer, &ctx.rotator, &completed.user.id).await?;

    match completed
        .return_to
        .filter(|target| ctx.redirect_guard.is_allowed(target))
    {
        Some(target) => {
            let mut url = Url::parse(&target)?;
            url.query_pairs_mut()
                .append_pair("access_token", &pair.access_token)
                .append_pair("refresh_token", &pair.refresh_token)
                .append_pair("token_type", pair.token_type)
                .append_pair("expires_in", &pair.expires_in.to_string());
            Ok(Redirect::temporary(url.as_str()).into_response())
        }
        None => Ok(Json(pair).into_response()),
    }
}
