//! Client authentication

use contracts::AuthConfig;
use std::collections::HashSet;
use std::net::SocketAddr;

/// Decides whether a submission may be processed
///
/// Implementations must fail closed: anything not positively recognized is
/// rejected.
pub trait Authenticator: Send + Sync {
    /// Check the submitted key; `Err` carries a client-safe reason
    fn authenticate(&self, key: Option<&str>, client: Option<SocketAddr>) -> Result<(), String>;
}

/// Accepts a fixed set of API keys
#[derive(Debug, Clone)]
pub struct KeyAuthenticator {
    keys: HashSet<String>,
}

impl KeyAuthenticator {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(Into::into)
                .filter(|k: &String| !k.trim().is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.api_keys.iter().cloned())
    }
}

impl Authenticator for KeyAuthenticator {
    fn authenticate(&self, key: Option<&str>, _client: Option<SocketAddr>) -> Result<(), String> {
        match key.map(str::trim) {
            None => Err("missing API key".to_string()),
            Some(key) if self.keys.contains(key) => Ok(()),
            Some(_) => Err("unknown API key".to_string()),
        }
    }
}
