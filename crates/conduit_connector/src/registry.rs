//! Explicit connector registry.

use crate::connector::Connector;
use crate::error::{ConnectorError, ConnectorResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Connectors known to the process, looked up by name.
///
/// Built once at startup and passed to whoever needs it.
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connector. Fails if the name is already taken.
    pub fn register<C: Connector + 'static>(&mut self, connector: C) -> ConnectorResult<()> {
        self.register_arc(Arc::new(connector))
    }

    /// Registers a shared connector.
    pub fn register_arc(&mut self, connector: Arc<dyn Connector>) -> ConnectorResult<()> {
        let name = connector.name().to_string();
        if self.connectors.contains_key(&name) {
            return Err(ConnectorError::invalid_configuration(format!(
                "connector '{}' is already registered",
                name
            )));
        }
        tracing::debug!(connector = %name, operations = ?connector.operations(), "registered connector");
        self.connectors.insert(name, connector);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with<C: Connector + 'static>(mut self, connector: C) -> ConnectorResult<Self> {
        self.register(connector)?;
        Ok(self)
    }

    /// Looks up a connector.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(name).cloned()
    }

    /// Returns true if a connector with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.connectors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.connectors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered connectors.
    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("connectors", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{ConnectionStatus, ExecuteResult};
    use crate::context::CapabilityContext;
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Connector for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn operations(&self) -> &[&str] {
            &["list"]
        }

        async fn test_connection(&self, _ctx: &CapabilityContext) -> ConnectorResult<ConnectionStatus> {
            Ok(ConnectionStatus::connected(serde_json::Value::Null))
        }

        async fn execute(&self, ctx: &CapabilityContext) -> ConnectorResult<ExecuteResult> {
            Ok(ExecuteResult::empty(ctx.operation()))
        }
    }

    #[test]
    fn register_and_lookup() {
        let registry = ConnectorRegistry::new()
            .with(Named("shop"))
            .unwrap()
            .with(Named("crm"))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["crm", "shop"]);
        assert!(registry.get("shop").is_some_and(|c| c.supports("list")));
        assert!(registry.get("erp").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ConnectorRegistry::new();
        registry.register(Named("shop")).unwrap();
        assert!(matches!(
            registry.register(Named("shop")),
            Err(ConnectorError::InvalidConfiguration(_))
        ));
        assert_eq!(registry.len(), 1);
    }
}
