//! HTTP-backed provider speaking the generic OIDC-ish dialect: form-encoded
//! token endpoint, bearer-authenticated userinfo endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use signet_core::{
    OAuthProfile, OAuthProvider, ProviderError, ProviderErrorKind, ProviderResult, TokenSet,
};

#[derive(Debug)]
pub struct OidcProvider {
    client: Client,
    name: String,
    client_id: String,
    client_secret: String,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
    scopes: Vec<String>,
}

impl OidcProvider {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
        userinfo_url: impl Into<String>,
        scopes: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();

        if client_id.is_empty() || client_secret.is_empty() {
            return Err(ProviderError::new(
                ProviderErrorKind::Configuration,
                "missing client credentials".to_string(),
            ));
        }

        // Every upstream call is bounded by this timeout; a slow provider
        // surfaces as a transport error, never a hang.
        let client = Client::builder().timeout(timeout).build().map_err(|err| {
            ProviderError::new(ProviderErrorKind::Configuration, err.to_string())
        })?;

        Ok(Self {
            client,
            name: name.into(),
            client_id,
            client_secret,
            auth_url: auth_url.into(),
            token_url: token_url.into(),
            userinfo_url: userinfo_url.into(),
            scopes,
        })
    }
}

#[async_trait]
impl OAuthProvider for OidcProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn auth_url(&self) -> &str {
        &self.auth_url
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn scopes(&self) -> &[String] {
        &self.scopes
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> ProviderResult<TokenSet> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier));
        }

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(
                ProviderErrorKind::Authorization,
                format!("token endpoint returned {status}: {body}"),
            ));
        }

        let payload: TokenEndpointResponse = response.json().await.map_err(|err| {
            ProviderError::new(ProviderErrorKind::InvalidResponse, err.to_string())
        })?;
        Ok(payload.into())
    }

    async fn fetch_profile(&self, access_token: &str) -> ProviderResult<OAuthProfile> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::new(
                ProviderErrorKind::Authorization,
                format!("userinfo endpoint returned {status}"),
            ));
        }

        let payload: UserInfoResponse = response.json().await.map_err(|err| {
            ProviderError::new(ProviderErrorKind::InvalidResponse, err.to_string())
        })?;

        let email = payload.email.ok_or_else(|| {
            ProviderError::new(
                ProviderErrorKind::InvalidResponse,
                "userinfo payload is missing `email`".to_string(),
            )
        })?;

        Ok(OAuthProfile {
            provider_user_id: payload.sub,
            email,
            email_verified: payload.email_verified,
        })
    }
}

fn map_transport_error(err: reqwest::Error) -> ProviderError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    ProviderError::new(ProviderErrorKind::Transport, message)
}

#[derive(Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl From<TokenEndpointResponse> for TokenSet {
    fn from(value: TokenEndpointResponse) -> Self {
        let scopes = value
            .scope
            .map(|s| s.split_whitespace().map(|s| s.to_string()).collect())
            .unwrap_or_default();
        TokenSet {
            access_token: value.access_token,
            expires_in: value.expires_in,
            refresh_token: value.refresh_token,
            token_type: value.token_type,
            scopes,
        }
    }
}

#[derive(Deserialize)]
struct UserInfoResponse {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
}
