use std::{error::Error, fmt};

use async_trait::async_trait;

use crate::types::{OAuthProfile, TokenSet};

/// Convenience alias for provider interactions.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Capability every upstream OAuth provider must implement. Implementations
/// perform the network round trips; the flow coordinator owns the state
/// machine around them.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Registry identifier, e.g. `"google"`.
    fn name(&self) -> &str;
    /// Authorization endpoint the user agent is redirected to.
    fn auth_url(&self) -> &str;
    /// OAuth client identifier registered with the provider.
    fn client_id(&self) -> &str;
    /// Scopes requested on every authorization.
    fn scopes(&self) -> &[String];
    /// Whether flows against this provider carry a PKCE challenge.
    fn uses_pkce(&self) -> bool {
        true
    }
    /// Exchange an authorization code for tokens, passing the PKCE verifier
    /// when the flow carried a challenge.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> ProviderResult<TokenSet>;
    /// Fetch the external identity behind an access token.
    async fn fetch_profile(&self, access_token: &str) -> ProviderResult<OAuthProfile>;
}

/// Lightweight error type for provider implementers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: Option<String>,
}

impl ProviderError {
    /// Create a new error for the given kind with an optional detail message.
    pub fn new(kind: ProviderErrorKind, message: impl Into<Option<String>>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Access the classification of this error.
    pub fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    /// Optional descriptive message supplied when the error was created.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.kind, message),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl Error for ProviderError {}

/// Classification of errors returned by providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Misconfiguration or invalid request was issued.
    Configuration,
    /// Upstream transport or network error, including timeouts.
    Transport,
    /// Provider rejected the exchange or the credentials.
    Authorization,
    /// Provider returned an unexpected payload.
    InvalidResponse,
    /// Catch-all for miscellaneous failures.
    Other,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderErrorKind::Configuration => "configuration error",
            ProviderErrorKind::Transport => "transport error",
            ProviderErrorKind::Authorization => "authorization error",
            ProviderErrorKind::InvalidResponse => "invalid response",
            ProviderErrorKind::Other => "provider error",
        };
        f.write_str(label)
    }
}
