//! Authorization-code flow state machine: initiate and complete.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use signet_core::{
    AccountLinkError, OAuthProvider, PkcePair, ProviderError, ProviderErrorKind, StateError,
    StateRecord, User, digest, random_token,
};

use crate::{
    config::ProviderRegistry,
    linker::{AccountLinker, LinkerError},
    password::PasswordError,
    storage::{StateStore, StoreError},
};

/// Entropy carried by every raw state token.
const STATE_ENTROPY_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("provider `{0}` is not configured")]
    UnknownProvider(String),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Link(#[from] AccountLinkError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Password(#[from] PasswordError),
}

impl From<LinkerError> for FlowError {
    fn from(value: LinkerError) -> Self {
        match value {
            LinkerError::Link(err) => FlowError::Link(err),
            LinkerError::Store(err) => FlowError::Store(err),
            LinkerError::Password(err) => FlowError::Password(err),
        }
    }
}

/// Values handed back to the caller at initiation. The raw state token and
/// verifier are the caller's to safekeep until the callback arrives.
#[derive(Debug, Clone)]
pub struct InitiatedFlow {
    pub authorization_url: String,
    pub state_token: String,
    pub code_verifier: Option<String>,
}

/// Outcome of a completed flow.
#[derive(Debug, Clone)]
pub struct CompletedFlow {
    pub user: User,
    pub is_new_user: bool,
    pub return_to: Option<String>,
}

/// Drives the authorize/callback state machine against a configured provider
/// set. Providers are injected at construction; there is no process-global
/// registry.
pub struct OAuthFlowCoordinator {
    providers: Arc<ProviderRegistry>,
    states: Arc<dyn StateStore>,
    linker: AccountLinker,
    state_ttl: Duration,
}

impl OAuthFlowCoordinator {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        states: Arc<dyn StateStore>,
        linker: AccountLinker,
        state_ttl: Duration,
    ) -> Self {
        Self {
            providers,
            states,
            linker,
            state_ttl,
        }
    }

    /// Begin an authorization flow: persist the state record (digest only)
    /// and build the provider authorization URL.
    pub async fn initiate(
        &self,
        provider_name: &str,
        redirect_uri: &str,
        return_to: Option<String>,
        linking_user_id: Option<String>,
    ) -> Result<InitiatedFlow, FlowError> {
        let provider = self.provider(provider_name)?;

        let state_token = random_token(STATE_ENTROPY_BYTES);
        let pkce = provider.uses_pkce().then(PkcePair::generate);

        let record = StateRecord {
            state_hash: digest(&state_token),
            provider: provider_name.to_string(),
            redirect_uri: redirect_uri.to_string(),
            code_challenge: pkce.as_ref().map(|pair| pair.challenge.clone()),
            code_challenge_method: pkce.as_ref().map(|_| "S256".to_string()),
            return_to,
            linking_user_id,
            expires_at: current_epoch_seconds().saturating_add(self.state_ttl.as_secs()),
            used: false,
        };
        let state_hash = record.state_hash.clone();
        self.states.set(&state_hash, record, self.state_ttl).await?;

        let authorization_url =
            build_authorize_url(provider.as_ref(), redirect_uri, &state_token, pkce.as_ref())?;

        Ok(InitiatedFlow {
            authorization_url,
            state_token,
            code_verifier: pkce.map(|pair| pair.verifier),
        })
    }

    /// Complete a flow from a provider callback.
    ///
    /// The state record is consumed before any other side effect, so a
    /// replayed callback observes a used record and fails terminally even if
    /// this call itself goes on to fail. No user or link is created unless
    /// the provider exchange and profile fetch both succeed.
    pub async fn complete(
        &self,
        provider_name: &str,
        code: &str,
        state_token: &str,
        code_verifier: Option<&str>,
    ) -> Result<CompletedFlow, FlowError> {
        let provider = self.provider(provider_name)?;

        let record = self
            .states
            .consume(&digest(state_token))
            .await?
            .ok_or(StateError::InvalidOrExpired)?;

        if record.provider != provider_name {
            warn!(
                expected = record.provider.as_str(),
                got = provider_name,
                "state token presented to the wrong provider"
            );
            return Err(StateError::InvalidOrExpired.into());
        }
        // A record can outlive its logical deadline inside the store; expiry
        // is checked here in addition to presence.
        if record.expires_at <= current_epoch_seconds() {
            return Err(StateError::InvalidOrExpired.into());
        }

        let tokens = provider
            .exchange_code(code, &record.redirect_uri, code_verifier)
            .await?;
        let profile = provider.fetch_profile(&tokens.access_token).await?;

        let resolved = self
            .linker
            .resolve(
                provider_name,
                &profile,
                &tokens,
                record.linking_user_id.as_deref(),
            )
            .await?;

        info!(
            user_id = resolved.user.id.as_str(),
            provider = provider_name,
            is_new_user = resolved.is_new_user,
            "completed sign-in"
        );

        Ok(CompletedFlow {
            user: resolved.user,
            is_new_user: resolved.is_new_user,
            return_to: record.return_to,
        })
    }

    fn provider(&self, name: &str) -> Result<Arc<dyn OAuthProvider>, FlowError> {
        self.providers
            .get(name)
            .ok_or_else(|| FlowError::UnknownProvider(name.to_string()))
    }
}

/// Deterministic authorization URL from the provider's endpoint, client id,
/// scopes, and the per-flow state/challenge.
fn build_authorize_url(
    provider: &dyn OAuthProvider,
    redirect_uri: &str,
    state_token: &str,
    pkce: Option<&PkcePair>,
) -> Result<String, FlowError> {
    let mut url = Url::parse(provider.auth_url()).map_err(|err| {
        ProviderError::new(
            ProviderErrorKind::Configuration,
            format!("invalid auth url: {err}"),
        )
    })?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("response_type", "code");
        query.append_pair("client_id", provider.client_id());
        query.append_pair("redirect_uri", redirect_uri);
        query.append_pair("scope", &provider.scopes().join(" "));
        query.append_pair("state", state_token);
        if let Some(pair) = pkce {
            query.append_pair("code_challenge", &pair.challenge);
            query.append_pair("code_challenge_method", "S256");
        }
    }

    Ok(url.to_string())
}

fn current_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use signet_core::{OAuthProfile, ProviderResult, TokenSet};

    use crate::storage::{MemoryOAuthAccountStore, MemoryStateStore, MemoryUserStore};

    struct StubProvider {
        scopes: Vec<String>,
        fail_exchange: bool,
        exchanges: Mutex<Vec<(String, Option<String>)>>,
    }

    impl StubProvider {
        fn new(fail_exchange: bool) -> Self {
            Self {
                scopes: vec!["openid".into(), "email".into()],
                fail_exchange,
                exchanges: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl OAuthProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn auth_url(&self) -> &str {
            "https://stub.example.com/oauth/authorize"
        }

        fn client_id(&self) -> &str {
            "client-1"
        }

        fn scopes(&self) -> &[String] {
            &self.scopes
        }

        async fn exchange_code(
            &self,
            code: &str,
            _redirect_uri: &str,
            code_verifier: Option<&str>,
        ) -> ProviderResult<TokenSet> {
            self.exchanges
                .lock()
                .expect("exchange lock")
                .push((code.to_string(), code_verifier.map(String::from)));
            if self.fail_exchange {
                return Err(ProviderError::new(
                    ProviderErrorKind::Authorization,
                    "code rejected".to_string(),
                ));
            }
            Ok(TokenSet {
                access_token: "upstream-access".into(),
                expires_in: Some(3600),
                refresh_token: None,
                token_type: Some("Bearer".into()),
                scopes: self.scopes.clone(),
            })
        }

        async fn fetch_profile(&self, _access_token: &str) -> ProviderResult<OAuthProfile> {
            Ok(OAuthProfile {
                provider_user_id: "p1".into(),
                email: "a@b.com".into(),
                email_verified: true,
            })
        }
    }

    fn coordinator(fail_exchange: bool) -> (OAuthFlowCoordinator, Arc<MemoryStateStore>) {
        let mut registry = ProviderRegistry::new();
        registry.insert("stub", Arc::new(StubProvider::new(fail_exchange)));

        let states = Arc::new(MemoryStateStore::new());
        let linker = AccountLinker::new(
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryOAuthAccountStore::new()),
        );
        (
            OAuthFlowCoordinator::new(
                Arc::new(registry),
                states.clone(),
                linker,
                Duration::from_secs(300),
            ),
            states,
        )
    }

    #[tokio::test]
    async fn initiate_builds_deterministic_url_and_stores_digest() {
        let (coordinator, states) = coordinator(false);
        let flow = coordinator
            .initiate("stub", "https://app.example.com/cb", None, None)
            .await
            .expect("initiate");

        let url = Url::parse(&flow.authorization_url).expect("url");
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params.get("response_type").map(String::as_str), Some("code"));
        assert_eq!(params.get("client_id").map(String::as_str), Some("client-1"));
        assert_eq!(params.get("scope").map(String::as_str), Some("openid email"));
        assert_eq!(
            params.get("state").map(String::as_str),
            Some(flow.state_token.as_str())
        );
        assert_eq!(
            params.get("code_challenge_method").map(String::as_str),
            Some("S256")
        );

        let verifier = flow.code_verifier.expect("verifier");
        assert!(verifier.len() >= 64);
        assert_eq!(
            params.get("code_challenge").map(String::as_str),
            Some(PkcePair::challenge_for(&verifier).as_str())
        );

        // Only the digest of the state token reaches the store.
        assert!(states.get(&flow.state_token).await.expect("get").is_none());
        assert!(states
            .get(&digest(&flow.state_token))
            .await
            .expect("get")
            .is_some());
    }

    #[tokio::test]
    async fn complete_passes_verifier_to_provider() {
        let (coordinator, _states) = coordinator(false);
        let flow = coordinator
            .initiate("stub", "https://app.example.com/cb", None, None)
            .await
            .expect("initiate");

        let completed = coordinator
            .complete(
                "stub",
                "code-1",
                &flow.state_token,
                flow.code_verifier.as_deref(),
            )
            .await
            .expect("complete");
        assert!(completed.is_new_user);
        assert_eq!(completed.user.email, "a@b.com");
    }

    #[tokio::test]
    async fn state_is_single_use() {
        let (coordinator, _states) = coordinator(false);
        let flow = coordinator
            .initiate("stub", "https://app.example.com/cb", None, None)
            .await
            .expect("initiate");

        coordinator
            .complete("stub", "code-1", &flow.state_token, flow.code_verifier.as_deref())
            .await
            .expect("first complete");
        let err = coordinator
            .complete("stub", "code-1", &flow.state_token, flow.code_verifier.as_deref())
            .await
            .expect_err("replayed state");
        assert!(matches!(err, FlowError::State(StateError::InvalidOrExpired)));
    }

    #[tokio::test]
    async fn state_is_consumed_even_when_exchange_fails() {
        let (coordinator, _states) = coordinator(true);
        let flow = coordinator
            .initiate("stub", "https://app.example.com/cb", None, None)
            .await
            .expect("initiate");

        let err = coordinator
            .complete("stub", "bad-code", &flow.state_token, flow.code_verifier.as_deref())
            .await
            .expect_err("exchange fails");
        assert!(matches!(err, FlowError::Provider(_)));

        // The failed completion already burned the state.
        let err = coordinator
            .complete("stub", "bad-code", &flow.state_token, flow.code_verifier.as_deref())
            .await
            .expect_err("state burned");
        assert!(matches!(err, FlowError::State(StateError::InvalidOrExpired)));
    }

    #[tokio::test]
    async fn expired_state_fails_even_if_present() {
        let (coordinator, states) = coordinator(false);
        let state_token = random_token(32);
        states
            .set(
                &digest(&state_token),
                StateRecord {
                    state_hash: digest(&state_token),
                    provider: "stub".into(),
                    redirect_uri: "https://app.example.com/cb".into(),
                    code_challenge: None,
                    code_challenge_method: None,
                    return_to: None,
                    linking_user_id: None,
                    expires_at: 1,
                    used: false,
                },
                Duration::from_secs(300),
            )
            .await
            .expect("seed");

        let err = coordinator
            .complete("stub", "code-1", &state_token, None)
            .await
            .expect_err("expired");
        assert!(matches!(err, FlowError::State(StateError::InvalidOrExpired)));
    }

    #[tokio::test]
    async fn unknown_state_fails() {
        let (coordinator, _states) = coordinator(false);
        let err = coordinator
            .complete("stub", "code-1", "never-issued", None)
            .await
            .expect_err("unknown state");
        assert!(matches!(err, FlowError::State(StateError::InvalidOrExpired)));
    }

    #[tokio::test]
    async fn unknown_provider_fails() {
        let (coordinator, _states) = coordinator(false);
        let err = coordinator
            .initiate("missing", "https://app.example.com/cb", None, None)
            .await
            .expect_err("unknown provider");
        assert!(matches!(err, FlowError::UnknownProvider(_)));
    }
}
