//! Provider registry

use log::{info, warn};

use super::Provider;
use crate::error::SyncError;

/// Where a provider registration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationSource {
    /// Shipped with the application
    Builtin,
    /// Discovered from an external source (plugin, config)
    External,
    /// Explicit replacement of a non-builtin provider
    Override,
}

struct Registration {
    source: RegistrationSource,
    provider: Box<dyn Provider>,
}

/// Ordered set of providers keyed by id
#[derive(Default)]
pub struct ProviderRegistry {
    entries: Vec<Registration>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. The first registration of an id wins; returns
    /// false when a later duplicate was ignored.
    pub fn register(&mut self, provider: Box<dyn Provider>, source: RegistrationSource) -> bool {
        let id = provider.id().to_string();
        if let Some(existing) = self.find(&id) {
            warn!(
                "[SYNC] Ignoring duplicate provider {} ({:?}); keeping {:?} registration",
                id, source, existing.source
            );
            return false;
        }

        info!("[SYNC] Registered provider {} ({:?})", id, source);
        self.entries.push(Registration { source, provider });
        true
    }

    /// Replace (or add) a non-builtin provider
    pub fn register_override(&mut self, provider: Box<dyn Provider>) -> anyhow::Result<()> {
        let id = provider.id().to_string();
        match self.entries.iter_mut().find(|e| e.provider.id() == id) {
            Some(existing) if existing.source == RegistrationSource::Builtin => Err(
                SyncError::config(format!("Cannot override builtin provider {}", id), None).into(),
            ),
            Some(existing) => {
                info!("[SYNC] Overriding provider {}", id);
                existing.provider = provider;
                existing.source = RegistrationSource::Override;
                Ok(())
            }
            None => {
                self.entries.push(Registration {
                    source: RegistrationSource::Override,
                    provider,
                });
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&dyn Provider> {
        self.find(id).map(|e| e.provider.as_ref())
    }

    pub fn source(&self, id: &str) -> Option<RegistrationSource> {
        self.find(id).map(|e| e.source)
    }

    /// Registered ids in registration order
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.provider.id()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Provider> {
        self.entries.iter().map(|e| e.provider.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, id: &str) -> Option<&Registration> {
        self.entries.iter().find(|e| e.provider.id() == id)
    }
}
