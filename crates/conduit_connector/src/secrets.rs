//! Tenant-scoped secret lookup.

use crate::error::{ConnectorError, ConnectorResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identifies whose secrets an invocation may read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantScope {
    /// Tenant identifier.
    pub tenant: String,
    /// Connector name.
    pub connector: String,
}

impl TenantScope {
    /// Creates a scope.
    pub fn new(tenant: impl Into<String>, connector: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            connector: connector.into(),
        }
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.connector)
    }
}

/// Backing store for connector credentials.
pub trait SecretStore: Send + Sync {
    /// Returns the secret stored under `key` for the scope.
    fn get(&self, scope: &TenantScope, key: &str) -> Option<String>;
}

/// In-memory secret store.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<(TenantScope, String), String>>,
}

impl MemorySecretStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a secret.
    pub fn insert(&self, scope: TenantScope, key: impl Into<String>, value: impl Into<String>) {
        self.secrets.write().insert((scope, key.into()), value.into());
    }

    /// Removes a secret, returning whether it existed.
    pub fn remove(&self, scope: &TenantScope, key: &str) -> bool {
        self.secrets
            .write()
            .remove(&(scope.clone(), key.to_string()))
            .is_some()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, scope: &TenantScope, key: &str) -> Option<String> {
        self.secrets
            .read()
            .get(&(scope.clone(), key.to_string()))
            .cloned()
    }
}

/// The secret capability handed to connectors.
///
/// Only the secrets of one tenant and one connector are visible.
#[derive(Clone)]
pub struct ScopedSecrets {
    store: Arc<dyn SecretStore>,
    scope: TenantScope,
}

impl ScopedSecrets {
    /// Binds a store to a scope.
    pub fn new(store: Arc<dyn SecretStore>, scope: TenantScope) -> Self {
        Self { store, scope }
    }

    /// The scope these secrets belong to.
    pub fn scope(&self) -> &TenantScope {
        &self.scope
    }

    /// Looks up a secret.
    pub fn get(&self, key: &str) -> Option<String> {
        self.store.get(&self.scope, key)
    }

    /// Looks up a secret, failing with `InvalidConfiguration` if absent or empty.
    pub fn require(&self, key: &str) -> ConnectorResult<String> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ConnectorError::invalid_configuration(format!(
                "missing secret '{}' for {}",
                key, self.scope
            ))),
        }
    }
}

impl fmt::Debug for ScopedSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedSecrets")
            .field("scope", &self.scope)
            .field("values", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Arc<MemorySecretStore> {
        let store = Arc::new(MemorySecretStore::new());
        store.insert(TenantScope::new("acme", "shop"), "access_token", "tok-acme");
        store.insert(TenantScope::new("globex", "shop"), "access_token", "tok-globex");
        store.insert(TenantScope::new("acme", "crm"), "api_key", "key-crm");
        store
    }

    #[test]
    fn secrets_are_scoped_to_tenant_and_connector() {
        let secrets = ScopedSecrets::new(store(), TenantScope::new("acme", "shop"));
        assert_eq!(secrets.get("access_token").as_deref(), Some("tok-acme"));
        assert_eq!(secrets.get("api_key"), None);
    }

    #[test]
    fn require_missing_is_configuration_error() {
        let secrets = ScopedSecrets::new(store(), TenantScope::new("initech", "shop"));
        let err = secrets.require("access_token").unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("access_token"));
    }

    #[test]
    fn empty_secret_counts_as_missing() {
        let store = store();
        store.insert(TenantScope::new("acme", "shop"), "refresh_token", "");
        let secrets = ScopedSecrets::new(store, TenantScope::new("acme", "shop"));
        assert!(secrets.require("refresh_token").is_err());
    }

    #[test]
    fn debug_does_not_leak_values() {
        let secrets = ScopedSecrets::new(store(), TenantScope::new("acme", "shop"));
        let rendered = format!("{:?}", secrets);
        assert!(!rendered.contains("tok-acme"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn remove_secret() {
        let store = store();
        let scope = TenantScope::new("acme", "crm");
        assert!(store.remove(&scope, "api_key"));
        assert!(!store.remove(&scope, "api_key"));
    }
}
