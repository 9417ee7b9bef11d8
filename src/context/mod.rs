//! Scoped dependency injection.
//!
//! # Data Flow
//! ```text
//! Start-up:
//!     Context::root()
//!     → register_provider / register_instance (Registry)
//!     → seal() when the dispatcher starts
//!
//! Per request:
//!     root.child(Scope::Request)
//!     → seed("request"), seed("response"), ...
//!     → get(id)
//!         cache hit on this context      → cached instance
//!         provider scope Default         → fresh instance
//!         provider scope Singleton       → Registry singleton table
//!         provider scope Request         → nearest Request context caches it
//!         Request scope reaches the root → OutOfScope
//! ```
//!
//! # Design Decisions
//! - The registry is an explicit object shared by `Arc`; no global lookup
//! - Contexts are cheap handles; a child keeps its parent alive
//! - Default-scoped factories receive the requesting context, singleton
//!   factories always receive the root so they can't capture request state

mod provider;
mod scope;

pub use provider::{Instance, Registry, ServiceProvider};
pub use scope::Scope;

use std::any::{type_name, Any};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::error::{Error, Result};

/// A node in the resolution chain.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Node>,
}

struct Node {
    registry: Arc<Registry>,
    parent: Option<Context>,
    scope: Scope,
    cache: DashMap<String, Instance>,
}

impl Context {
    /// Create a root context with an empty registry.
    pub fn root() -> Self {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Create a root context over an existing registry.
    pub fn with_registry(registry: Arc<Registry>) -> Self {
        Self {
            inner: Arc::new(Node {
                registry,
                parent: None,
                scope: Scope::Singleton,
                cache: DashMap::new(),
            }),
        }
    }

    /// Create a child context bound to `scope`.
    pub fn child(&self, scope: Scope) -> Self {
        Self {
            inner: Arc::new(Node {
                registry: Arc::clone(&self.inner.registry),
                parent: Some(self.clone()),
                scope,
                cache: DashMap::new(),
            }),
        }
    }

    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// The scope this context caches instances for.
    pub fn scope(&self) -> Scope {
        self.inner.scope
    }

    pub fn parent(&self) -> Option<&Context> {
        self.inner.parent.as_ref()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// Walk up to the root of this chain.
    pub fn root_context(&self) -> &Context {
        let mut node = self;
        while let Some(parent) = &node.inner.parent {
            node = parent;
        }
        node
    }

    /// Bind a typed factory to `id`. Only valid on the root.
    pub fn register_provider<T, F>(&self, id: impl Into<String>, scope: Scope, factory: F) -> Result<()>
    where
        T: Any + Send + Sync,
        F: Fn(&Context) -> Result<T> + Send + Sync + 'static,
    {
        self.register(ServiceProvider::new(id, scope, factory))
    }

    /// Bind a prebuilt provider. Only valid on the root.
    pub fn register(&self, provider: ServiceProvider) -> Result<()> {
        if !self.is_root() {
            return Err(Error::NotRoot(provider.id().to_string()));
        }
        self.inner.registry.register(provider)
    }

    /// Bind an existing instance as a singleton and hand it back.
    pub fn register_instance<T>(&self, id: impl Into<String>, instance: T) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let instance = Arc::new(instance);
        let shared: Instance = instance.clone();
        self.register(ServiceProvider::from_instance_factory(
            id,
            Scope::Singleton,
            move |_| Ok(Arc::clone(&shared)),
        ))?;
        Ok(instance)
    }

    /// Freeze the registry. Later registrations fail.
    pub fn seal(&self) {
        self.inner.registry.seal();
    }

    /// Resolve `id`, failing if nothing provides it.
    pub fn get(&self, id: &str) -> Result<Instance> {
        self.resolve(id, false)?
            .ok_or_else(|| Error::NoProvider(id.to_string()))
    }

    /// Whether `id` is cached here, seeded above, or bound to a provider.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.cache.contains_key(id)
            || self.inner.registry.contains(id)
            || self.seeded_by_ancestor(id).is_some()
    }

    /// Resolve `id`, or `None` when nothing provides it.
    ///
    /// Scope violations still fail.
    pub fn get_optional(&self, id: &str) -> Result<Option<Instance>> {
        self.resolve(id, true)
    }

    /// Resolve `id` and downcast it.
    pub fn get_as<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>> {
        downcast(id, self.get(id)?)
    }

    pub fn get_optional_as<T: Any + Send + Sync>(&self, id: &str) -> Result<Option<Arc<T>>> {
        self.get_optional(id)?
            .map(|instance| downcast(id, instance))
            .transpose()
    }

    /// Force `instance` into this context's cache, bypassing provider scopes.
    pub fn seed<T: Any + Send + Sync>(&self, id: impl Into<String>, instance: T) -> Result<Arc<T>> {
        let instance = Arc::new(instance);
        self.seed_instance(id, instance.clone())?;
        Ok(instance)
    }

    pub fn seed_instance(&self, id: impl Into<String>, instance: Instance) -> Result<()> {
        let id = id.into();
        if self.is_root() {
            return Err(Error::SeedOnRoot(id));
        }
        self.inner.cache.insert(id, instance);
        Ok(())
    }

    /// Ids cached on this context instance.
    pub fn cached_ids(&self) -> Vec<String> {
        self.inner.cache.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn downgrade(&self) -> WeakContext {
        WeakContext {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Drop everything cached on this context.
    pub(crate) fn release(&self) {
        self.inner.cache.clear();
    }

    fn resolve(&self, id: &str, optional: bool) -> Result<Option<Instance>> {
        if let Some(hit) = self.inner.cache.get(id) {
            return Ok(Some(hit.value().clone()));
        }

        let Some(provider) = self.inner.registry.provider(id) else {
            // Seeded values without a provider stay visible to descendants.
            if let Some(seeded) = self.seeded_by_ancestor(id) {
                return Ok(Some(seeded));
            }
            if optional {
                return Ok(None);
            }
            return Err(Error::NoProvider(id.to_string()));
        };

        match provider.scope() {
            Scope::Default => provider.provide(self).map(Some),
            Scope::Singleton => self
                .inner
                .registry
                .singleton(&provider, self.root_context())
                .map(Some),
            Scope::Request => self.resolve_scoped(id, &provider).map(Some),
        }
    }

    /// Cache on the nearest context whose scope matches the provider's.
    fn resolve_scoped(&self, id: &str, provider: &ServiceProvider) -> Result<Instance> {
        let mut node = self;
        loop {
            let Some(parent) = node.parent() else {
                return Err(Error::OutOfScope {
                    id: id.to_string(),
                    scope: provider.scope(),
                });
            };
            if node.inner.scope == provider.scope() {
                if let Some(hit) = node.inner.cache.get(id) {
                    return Ok(hit.value().clone());
                }
                let created = provider.provide(node)?;
                let stored = node
                    .inner
                    .cache
                    .entry(id.to_string())
                    .or_insert(created)
                    .value()
                    .clone();
                return Ok(stored);
            }
            node = parent;
        }
    }

    fn seeded_by_ancestor(&self, id: &str) -> Option<Instance> {
        let mut node = self.parent();
        while let Some(ctx) = node {
            if let Some(hit) = ctx.inner.cache.get(id) {
                return Some(hit.value().clone());
            }
            node = ctx.parent();
        }
        None
    }
}

fn downcast<T: Any + Send + Sync>(id: &str, instance: Instance) -> Result<Arc<T>> {
    instance.downcast::<T>().map_err(|_| Error::TypeMismatch {
        id: id.to_string(),
        expected: type_name::<T>(),
    })
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("scope", &self.inner.scope)
            .field("root", &self.is_root())
            .field("cached", &self.cached_ids())
            .finish()
    }
}

/// A non-owning handle to a context.
#[derive(Clone, Debug)]
pub struct WeakContext {
    inner: Weak<Node>,
}

impl WeakContext {
    pub fn upgrade(&self) -> Option<Context> {
        self.inner.upgrade().map(|inner| Context { inner })
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("scope", &self.scope).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Service {
        serial: usize,
    }

    fn counting_provider(root: &Context, id: &str, scope: Scope) -> Arc<AtomicUsize> {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        root.register_provider(id, scope, move |_| {
            Ok(Service {
                serial: c.fetch_add(1, Ordering::SeqCst),
            })
        })
        .unwrap();
        counter
    }

    #[test]
    fn default_scope_builds_every_time() {
        let root = Context::root();
        counting_provider(&root, "a", Scope::Default);

        let a1 = root.get_as::<Service>("a").unwrap();
        let a2 = root.get_as::<Service>("a").unwrap();
        assert!(!Arc::ptr_eq(&a1, &a2));

        let request = root.child(Scope::Request);
        let a3 = request.get_as::<Service>("a").unwrap();
        let a4 = request.get_as::<Service>("a").unwrap();
        assert!(!Arc::ptr_eq(&a3, &a4));
        assert_eq!(a4.serial, 3);
    }

    #[test]
    fn request_scope_is_shared_within_a_request_only() {
        let root = Context::root();
        let built = counting_provider(&root, "a", Scope::Request);

        let rc1 = root.child(Scope::Request);
        let a1 = rc1.get_as::<Service>("a").unwrap();
        let a2 = rc1.get_as::<Service>("a").unwrap();

        let rc2 = root.child(Scope::Request);
        let a3 = rc2.get_as::<Service>("a").unwrap();
        let a4 = rc2.get_as::<Service>("a").unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(Arc::ptr_eq(&a3, &a4));
        assert!(!Arc::ptr_eq(&a2, &a3));
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn request_scope_is_cached_on_nearest_request_context() {
        let root = Context::root();
        counting_provider(&root, "a", Scope::Request);

        let request = root.child(Scope::Request);
        let nested = request.child(Scope::Default);
        let from_nested = nested.get_as::<Service>("a").unwrap();
        let from_request = request.get_as::<Service>("a").unwrap();

        assert!(Arc::ptr_eq(&from_nested, &from_request));
        assert!(nested.cached_ids().is_empty());
        assert_eq!(request.cached_ids(), vec!["a".to_string()]);
    }

    #[test]
    fn singleton_is_shared_across_contexts() {
        let root = Context::root();
        let rc = root.child(Scope::Request);
        let built = counting_provider(&root, "a", Scope::Singleton);

        let a1 = root.get_as::<Service>("a").unwrap();
        let a2 = root.get_as::<Service>("a").unwrap();
        let a3 = rc.get_as::<Service>("a").unwrap();
        let a4 = root.child(Scope::Request).get_as::<Service>("a").unwrap();

        assert!(Arc::ptr_eq(&a1, &a2) && Arc::ptr_eq(&a2, &a3) && Arc::ptr_eq(&a3, &a4));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn singleton_factory_receives_the_root() {
        let root = Context::root();
        root.register_provider("is-root", Scope::Singleton, |ctx| Ok(ctx.is_root()))
            .unwrap();
        let request = root.child(Scope::Request);
        assert!(*request.get_as::<bool>("is-root").unwrap());
    }

    #[test]
    fn request_scope_on_root_is_out_of_scope() {
        let root = Context::root();
        counting_provider(&root, "a", Scope::Request);

        assert!(matches!(root.get("a"), Err(Error::OutOfScope { .. })));
        // The optional flag only covers missing providers.
        assert!(matches!(root.get_optional("a"), Err(Error::OutOfScope { .. })));
    }

    #[test]
    fn missing_provider() {
        let root = Context::root();
        let rc = root.child(Scope::Request);
        assert!(matches!(rc.get("nope"), Err(Error::NoProvider(id)) if id == "nope"));
        assert!(rc.get_optional("nope").unwrap().is_none());
    }

    #[test]
    fn duplicate_registration_fails() {
        let root = Context::root();
        root.register_instance("a", 1u32).unwrap();
        let err = root.register_instance("a", 2u32).unwrap_err();
        assert!(matches!(err, Error::DuplicateProvider(id) if id == "a"));
    }

    #[test]
    fn registration_is_root_only_and_closes_on_seal() {
        let root = Context::root();
        let rc = root.child(Scope::Request);
        assert!(matches!(rc.register_instance("a", 1u8), Err(Error::NotRoot(_))));

        root.seal();
        assert!(matches!(root.register_instance("b", 1u8), Err(Error::RegistrySealed(_))));
    }

    #[test]
    fn register_instance_returns_the_shared_instance() {
        let root = Context::root();
        let registered = root.register_instance("svc", Service { serial: 7 }).unwrap();
        let resolved = root.child(Scope::Request).get_as::<Service>("svc").unwrap();
        assert!(Arc::ptr_eq(&registered, &resolved));
    }

    #[test]
    fn seeding_bypasses_providers() {
        let root = Context::root();
        counting_provider(&root, "a", Scope::Default);

        let rc = root.child(Scope::Request);
        let seeded = rc.seed("a", Service { serial: 99 }).unwrap();
        let resolved = rc.get_as::<Service>("a").unwrap();
        assert!(Arc::ptr_eq(&seeded, &resolved));
        assert_eq!(resolved.serial, 99);
    }

    #[test]
    fn seeded_values_are_visible_to_descendants() {
        let root = Context::root();
        let rc = root.child(Scope::Request);
        rc.seed("request", "GET /".to_string()).unwrap();
        let nested = rc.child(Scope::Default);
        assert_eq!(*nested.get_as::<String>("request").unwrap(), "GET /");
    }

    #[test]
    fn seeding_the_root_fails() {
        let root = Context::root();
        assert!(matches!(root.seed("a", 1u8), Err(Error::SeedOnRoot(_))));
    }

    #[test]
    fn typed_access_checks_the_type() {
        let root = Context::root();
        root.register_instance("n", 5u64).unwrap();
        let err = root.get_as::<String>("n").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { id, .. } if id == "n"));
    }

    #[test]
    fn factories_resolve_their_dependencies() {
        let root = Context::root();
        root.register_instance("greeting", "hello".to_string()).unwrap();
        root.register_provider("message", Scope::Request, |ctx| {
            let greeting = ctx.get_as::<String>("greeting")?;
            let name = ctx.get_as::<String>("name")?;
            Ok(format!("{} {}", greeting, name))
        })
        .unwrap();

        let rc = root.child(Scope::Request);
        rc.seed("name", "world".to_string()).unwrap();
        assert_eq!(*rc.get_as::<String>("message").unwrap(), "hello world");
    }

    #[test]
    fn weak_handle_does_not_keep_context_alive() {
        let root = Context::root();
        let rc = root.child(Scope::Request);
        let weak = rc.downgrade();
        assert!(weak.upgrade().is_some());
        drop(rc);
        assert!(weak.upgrade().is_none());
    }
}
