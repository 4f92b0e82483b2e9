use std::{env, sync::Arc, time::Duration};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use url::Url;

use signet_core::{OAuthProvider, ProviderError};

use crate::providers::{OidcProvider, ProviderMap};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnv(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Providers available to the flow coordinator. Built explicitly in `main`
/// and injected; nothing process-global.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: ProviderMap,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct every provider named in `SIGNET_PROVIDERS` from its
    /// `SIGNET_<NAME>_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        let timeout = env_duration("SIGNET_PROVIDER_TIMEOUT_SECS", 10)?;

        let names = env::var("SIGNET_PROVIDERS").unwrap_or_default();
        for name in names.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let provider = build_provider_from_env(name, timeout)?;
            registry.providers.insert(name.to_string(), Arc::new(provider));
        }

        if registry.providers.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "no providers configured (set SIGNET_PROVIDERS)".to_string(),
            ));
        }

        Ok(registry)
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn OAuthProvider>,
    ) -> Option<Arc<dyn OAuthProvider>> {
        self.providers.insert(name.into(), provider)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn OAuthProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

fn build_provider_from_env(name: &str, timeout: Duration) -> Result<OidcProvider, ConfigError> {
    let upper = name.to_uppercase().replace('-', "_");
    let require = |suffix: &str| -> Result<String, ConfigError> {
        let key = format!("SIGNET_{upper}_{suffix}");
        env::var(&key).map_err(|_| ConfigError::MissingEnv(key))
    };

    let scopes = env::var(format!("SIGNET_{upper}_SCOPES"))
        .unwrap_or_else(|_| "openid email".to_string())
        .split_whitespace()
        .map(|s| s.to_string())
        .collect::<Vec<_>>();

    let provider = OidcProvider::new(
        name,
        require("CLIENT_ID")?,
        require("CLIENT_SECRET")?,
        require("AUTH_URL")?,
        require("TOKEN_URL")?,
        require("USERINFO_URL")?,
        scopes,
        timeout,
    )?;
    Ok(provider)
}

/// How issued tokens are signed.
pub enum SignerSettings {
    /// HS256 over a shared secret.
    Symmetric { secret: Vec<u8> },
    /// EdDSA against the managed key set, optionally seeded with a fixed key.
    Asymmetric { seed_b64: Option<String> },
}

/// Service-wide knobs, environment-driven.
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub state_ttl: Duration,
    pub rotation_interval: Duration,
    /// Spawn the periodic rotation worker (asymmetric mode only).
    pub auto_rotate: bool,
    pub rate_limit_max: usize,
    pub rate_limit_window: Duration,
    pub signer: SignerSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let signer = match env::var("SIGNET_HS256_SECRET_BASE64") {
            Ok(secret_b64) => {
                let secret = BASE64_STANDARD.decode(secret_b64.as_bytes()).map_err(|err| {
                    ConfigError::InvalidConfig(format!("SIGNET_HS256_SECRET_BASE64: {err}"))
                })?;
                if secret.len() < 32 {
                    return Err(ConfigError::InvalidConfig(
                        "SIGNET_HS256_SECRET_BASE64 requires >= 32 bytes".to_string(),
                    ));
                }
                SignerSettings::Symmetric { secret }
            }
            Err(_) => SignerSettings::Asymmetric {
                seed_b64: env::var("SIGNET_ED25519_SEED_BASE64").ok(),
            },
        };

        Ok(Self {
            host: env::var("SIGNET_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("SIGNET_PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(8080),
            access_ttl: env_duration("SIGNET_ACCESS_TTL_SECS", 900)?,
            refresh_ttl: env_duration("SIGNET_REFRESH_TTL_SECS", 14 * 24 * 3600)?,
            state_ttl: env_duration("SIGNET_STATE_TTL_SECS", 300)?,
            rotation_interval: env_duration("SIGNET_KEY_ROTATION_SECS", 24 * 3600)?,
            auto_rotate: env::var("SIGNET_KEY_AUTO_ROTATE")
                .map(|value| value != "0" && value.to_lowercase() != "false")
                .unwrap_or(true),
            rate_limit_max: env::var("SIGNET_RATE_LIMIT_MAX")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(60),
            rate_limit_window: env_duration("SIGNET_RATE_LIMIT_WINDOW_SECS", 60)?,
            signer,
        })
    }
}

fn env_duration(key: &str, default_secs: u64) -> Result<Duration, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidConfig(format!("{key} must be an integer"))),
        Err(_) => Ok(Duration::from_secs(default_secs)),
    }
}

/// Allow-list for post-callback client redirects. An empty list denies every
/// candidate.
#[derive(Clone, Debug)]
pub struct RedirectGuard {
    allowed: Vec<Url>,
}

impl RedirectGuard {
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = env::var("SIGNET_RETURN_TO_ALLOWLIST").unwrap_or_default();
        let entries = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        Self::from_list(entries)
    }

    pub fn from_list(urls: Vec<String>) -> Result<Self, ConfigError> {
        let mut allowed = Vec::new();
        for value in urls {
            let url = Url::parse(&value).map_err(|_| {
                ConfigError::InvalidConfig(format!("invalid return_to allowlist url `{value}`"))
            })?;
            allowed.push(url);
        }
        Ok(Self { allowed })
    }

    pub fn is_allowed(&self, candidate: &str) -> bool {
        if self.allowed.is_empty() {
            return false;
        }

        if let Ok(url) = Url::parse(candidate) {
            self.allowed
                .iter()
                .any(|allowed| url.as_str().starts_with(allowed.as_str()))
        } else {
            false
        }
    }
}
