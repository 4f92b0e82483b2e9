use std::{net::SocketAddr, sync::Arc};

use tokio::signal;
use tracing_subscriber::EnvFilter;

use signet_broker::{
    account::{AccountRecovery, TracingDispatcher},
    config::{ProviderRegistry, RedirectGuard, Settings, SignerSettings},
    flow::OAuthFlowCoordinator,
    http::{self, AppContext},
    keys::{self, SigningKeyManager},
    linker::AccountLinker,
    rate_limit::RateLimiter,
    refresh::RefreshTokenRotator,
    storage::{
        MemoryOAuthAccountStore, MemoryRefreshTokenStore, MemoryStateStore, MemoryUserStore,
        OAuthAccountStore, RefreshTokenStore, StateStore, UserStore,
    },
    tokens::TokenIssuer,
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        tracing::error!("broker shut down with error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let settings = Settings::from_env()?;
    let providers = Arc::new(ProviderRegistry::from_env()?);
    let redirect_guard = Arc::new(RedirectGuard::from_env()?);

    let states: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let users: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
    let links: Arc<dyn OAuthAccountStore> = Arc::new(MemoryOAuthAccountStore::new());
    let refresh_store: Arc<dyn RefreshTokenStore> = Arc::new(MemoryRefreshTokenStore::new());

    let (issuer, key_manager) = match settings.signer {
        SignerSettings::Symmetric { ref secret } => (
            TokenIssuer::symmetric(secret.clone(), settings.access_ttl, settings.refresh_ttl),
            None,
        ),
        SignerSettings::Asymmetric { ref seed_b64 } => {
            let manager = match seed_b64 {
                Some(seed) => {
                    SigningKeyManager::from_base64_seed(seed, settings.rotation_interval)?
                }
                None => SigningKeyManager::generate(settings.rotation_interval),
            };
            let manager = Arc::new(manager);
            (
                TokenIssuer::asymmetric(
                    manager.clone(),
                    settings.access_ttl,
                    settings.refresh_ttl,
                ),
                Some(manager),
            )
        }
    };
    let issuer = Arc::new(issuer);

    let linker = AccountLinker::new(users.clone(), links);
    let rotator = Arc::new(RefreshTokenRotator::new(refresh_store, settings.refresh_ttl));
    let flow = Arc::new(OAuthFlowCoordinator::new(
        providers.clone(),
        states,
        linker.clone(),
        settings.state_ttl,
    ));
    let recovery = Arc::new(AccountRecovery::new(
        users,
        issuer.clone(),
        Arc::new(TracingDispatcher),
    ));
    let rate_limiter = Arc::new(RateLimiter::new(
        settings.rate_limit_max,
        settings.rate_limit_window,
    ));

    let mut rotation_handle = None;
    if let Some(manager) = key_manager.clone()
        && settings.auto_rotate
        && !settings.rotation_interval.is_zero()
    {
        rotation_handle = Some(keys::spawn_rotation_worker(
            manager,
            settings.rotation_interval,
        ));
    }

    tracing::info!(providers = ?providers.names(), "provider registry ready");

    let context = Arc::new(AppContext {
        flow,
        linker,
        issuer,
        rotator,
        keys: key_manager,
        recovery,
        redirect_guard,
        rate_limiter,
    });

    let router = http::router(context);
    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(?addr, "http server listening");

    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(async {
        let _ = signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    });
    server.await?;

    if let Some(handle) = rotation_handle {
        handle.abort();
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
