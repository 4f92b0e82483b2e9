pub mod oidc;

use std::{collections::HashMap, sync::Arc};

use signet_core::OAuthProvider;

pub use oidc::OidcProvider;

/// Providers indexed by their registry name.
pub type ProviderMap = HashMap<String, Arc<dyn OAuthProvider>>;
