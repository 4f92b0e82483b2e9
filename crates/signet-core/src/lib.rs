//! Signet core primitives shared across services.

pub mod error;
pub mod hash;
pub mod pkce;
pub mod provider;
pub mod types;

pub use error::{AccountLinkError, RefreshTokenError, StateError, TokenValidationError};
pub use hash::{digest, random_token};
pub use pkce::PkcePair;
pub use provider::{OAuthProvider, ProviderError, ProviderErrorKind, ProviderResult};
pub use types::{
    NewUser, OAuthAccountLink, OAuthProfile, RefreshTokenRecord, StateRecord, TokenSet, User,
};
