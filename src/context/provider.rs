//! Service providers and the root registry.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{Context, Scope};
use crate::error::{Error, Result};

/// A resolved service instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn(&Context) -> Result<Instance> + Send + Sync>;

/// A factory bound to an id and a scope.
#[derive(Clone)]
pub struct ServiceProvider {
    id: String,
    scope: Scope,
    factory: Factory,
}

impl ServiceProvider {
    /// Build a provider from a typed factory.
    pub fn new<T, F>(id: impl Into<String>, scope: Scope, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Context) -> Result<T> + Send + Sync + 'static,
    {
        Self::from_instance_factory(id, scope, move |ctx| {
            factory(ctx).map(|value| Arc::new(value) as Instance)
        })
    }

    /// Build a provider from a factory that already produces shared instances.
    pub fn from_instance_factory<F>(id: impl Into<String>, scope: Scope, factory: F) -> Self
    where
        F: Fn(&Context) -> Result<Instance> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            scope,
            factory: Arc::new(factory),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub(crate) fn provide(&self, ctx: &Context) -> Result<Instance> {
        tracing::trace!(id = %self.id, scope = %self.scope, "Invoking provider");
        (self.factory)(ctx)
    }
}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Provider table and singleton store owned by the root context.
///
/// Shared by `Arc` with every context in the tree. Read-only once sealed.
#[derive(Debug, Default)]
pub struct Registry {
    providers: DashMap<String, ServiceProvider>,
    singletons: DashMap<String, Instance>,
    sealed: AtomicBool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a provider. Each id may be bound once, and only before sealing.
    pub fn register(&self, provider: ServiceProvider) -> Result<()> {
        if self.is_sealed() {
            return Err(Error::RegistrySealed(provider.id));
        }
        match self.providers.entry(provider.id.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateProvider(provider.id)),
            Entry::Vacant(slot) => {
                tracing::debug!(id = %provider.id, scope = %provider.scope, "Provider registered");
                slot.insert(provider);
                Ok(())
            }
        }
    }

    pub fn provider(&self, id: &str) -> Option<ServiceProvider> {
        self.providers.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Reject any further registration.
    pub fn seal(&self) {
        if !self.sealed.swap(true, Ordering::SeqCst) {
            tracing::debug!(providers = self.providers.len(), "Registry sealed");
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// Resolve a singleton, building it with the root context on first use.
    ///
    /// The factory never runs under a map lock. If two callers race on the
    /// first access the instance stored first is returned to both.
    pub(crate) fn singleton(
        &self,
        provider: &ServiceProvider,
        root: &Context,
    ) -> Result<Instance> {
        if let Some(existing) = self.singletons.get(provider.id()) {
            return Ok(existing.value().clone());
        }
        let created = provider.provide(root)?;
        let stored = self
            .singletons
            .entry(provider.id().to_string())
            .or_insert(created)
            .value()
            .clone();
        Ok(stored)
    }
}
