pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::{
    account::AccountRecovery,
    config::RedirectGuard,
    flow::OAuthFlowCoordinator,
    keys::SigningKeyManager,
    linker::AccountLinker,
    rate_limit::RateLimiter,
    refresh::RefreshTokenRotator,
    tokens::TokenIssuer,
};

pub struct AppContext {
    pub flow: Arc<OAuthFlowCoordinator>,
    pub linker: AccountLinker,
    pub issuer: Arc<TokenIssuer>,
    pub rotator: Arc<RefreshTokenRotator>,
    /// Present in asymmetric deployments; symmetric deployments have no JWKS.
    pub keys: Option<Arc<SigningKeyManager>>,
    pub recovery: Arc<AccountRecovery>,
    pub redirect_guard: Arc<RedirectGuard>,
    pub rate_limiter: Arc<RateLimiter>,
}

pub type SharedContext = Arc<AppContext>;

pub fn router(context: SharedContext) -> Router {
    Router::new()
        .route("/.well-known/jwks.json", get(handlers::jwks::get_jwks))
        .route("/oauth/{provider}/authorize", get(handlers::authorize::authorize))
        .route("/oauth/{provider}/callback", get(handlers::callback::callback))
        .route("/oauth/{provider}/link", delete(handlers::link::unlink))
        .route("/auth/refresh", post(handlers::refresh::refresh))
        .route("/auth/revoke", post(handlers::refresh::revoke))
        .route("/auth/recover", post(handlers::account::recover))
        .route("/auth/verify/request", post(handlers::account::request_verification))
        .route("/auth/verify/confirm", post(handlers::account::confirm_verification))
        .with_state(context)
}
