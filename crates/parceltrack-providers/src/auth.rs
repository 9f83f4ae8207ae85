//! Carrier authentication options.
//!
//! Every carrier wants different credentials: Canada Post takes a basic-auth
//! username and password, UPS adds an access key, USPS only wants a username,
//! DHL uses a WSSE site id. [`AuthOptions`] is the opaque record callers hand
//! to [`ShipmentProvider::track`](crate::ShipmentProvider::track); each
//! adapter documents the keys it requires.
//!
//! A missing required key is a caller bug, not a lookup outcome: [`require`]
//! fails fast with a [`ProviderError`] before any network call is made.
//!
//! [`require`]: AuthOptions::require

use std::collections::HashMap;

use crate::error::{ProviderError, ProviderResult};

/// An opaque bag of carrier credentials.
#[derive(Debug, Clone, Default)]
pub struct AuthOptions {
    options: HashMap<String, String>,
}

impl AuthOptions {
    /// Creates an empty set of options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set one option.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Returns an option's value, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Returns a required option's value.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the key is absent. This is the
    /// fail-fast path for misconfigured callers; it must be checked before
    /// issuing any request.
    pub fn require(&self, key: &str) -> ProviderResult<&str> {
        self.get(key).ok_or_else(|| {
            ProviderError::configuration(format!("missing required auth option '{key}'"))
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AuthOptions {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            options: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;

    #[test]
    fn builder_and_lookup() {
        let auth = AuthOptions::new()
            .with("username", "merchant")
            .with("password", "hunter2");

        assert_eq!(auth.get("username"), Some("merchant"));
        assert_eq!(auth.require("password").unwrap(), "hunter2");
        assert!(auth.get("access_key").is_none());
    }

    #[test]
    fn missing_required_key_is_a_configuration_error() {
        let auth = AuthOptions::new().with("username", "merchant");

        let err = auth.require("access_key").unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ConfigurationError);
        assert!(err.message().contains("access_key"));
    }

    #[test]
    fn from_iterator() {
        let auth: AuthOptions = [("username", "u"), ("password", "p")].into_iter().collect();
        assert_eq!(auth.get("username"), Some("u"));
        assert_eq!(auth.get("password"), Some("p"));
    }
}
