//! Credential lookup, injected into the fallback executor.
//!
//! Candidates name a logical secret (`credential_key`); a `CredentialSource`
//! maps that name to a value. Production reads the environment, tests hand
//! in a fixed map.

use std::collections::HashMap;

/// Resolves a logical secret name to its value.
pub trait CredentialSource: Send + Sync {
    /// `None` means the secret is not configured.
    fn resolve(&self, key: &str) -> Option<String>;
}

/// Reads credentials from process environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn resolve(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

/// Fixed in-memory credentials.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    values: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl CredentialSource for StaticCredentials {
    fn resolve(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
