//! # Injector
//!
//! Type-keyed values and lazy providers used to resolve the parameters of
//! generic handlers.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Only stores and resolves typed values
//! - **O**: Any `Send + Sync + 'static` type can be mapped or provided
//! - **D**: Handlers depend on `resolve::<T>()`, not on who registered `T`
//!
//! Lookup order: explicit mappings, then providers (invoked once and
//! memoized), then the parent scope. The app owns the root injector and every
//! request gets a child of it.

use crate::error::{Error, Result};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type Value = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&Injector) -> Result<Value> + Send + Sync>;

#[derive(Default)]
struct Scope {
    parent: Option<Injector>,
    values: RwLock<HashMap<TypeId, Value>>,
    factories: RwLock<HashMap<TypeId, Factory>>,
}

/// Thread-safe, hierarchical type container
#[derive(Clone, Default)]
pub struct Injector {
    scope: Arc<Scope>,
}

impl Injector {
    /// Create an empty root injector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a child scope that falls back to this one
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            scope: Arc::new(Scope {
                parent: Some(self.clone()),
                ..Scope::default()
            }),
        }
    }

    /// Store a value by its type, replacing any previous one
    pub fn map<T: Send + Sync + 'static>(&self, value: T) {
        self.map_arc(Arc::new(value));
    }

    /// Store an already shared value by its type
    pub fn map_arc<T: Send + Sync + 'static>(&self, value: Arc<T>) {
        let mut values = self.scope.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(TypeId::of::<T>(), value);
    }

    /// Register a provider for `T`
    ///
    /// The provider runs on first resolution and its result is memoized in
    /// this scope.
    pub fn provide<T, F>(&self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Self) -> Result<T> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |inj| factory(inj).map(|v| Arc::new(v) as Value));
        let mut factories = self.scope.factories.write().unwrap_or_else(|e| e.into_inner());
        factories.insert(TypeId::of::<T>(), factory);
    }

    /// Resolve a value of type `T`
    ///
    /// # Errors
    ///
    /// Returns `Error::Unresolved` when neither this scope nor any parent can
    /// produce `T`, or the provider's own error.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve_value(TypeId::of::<T>())?
            .and_then(|value| value.downcast::<T>().ok())
            .ok_or(Error::Unresolved {
                type_name: type_name::<T>(),
            })
    }

    fn resolve_value(&self, id: TypeId) -> Result<Option<Value>> {
        if let Some(value) = self.lookup(id) {
            return Ok(Some(value));
        }

        let factory = self
            .scope
            .factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned();
        if let Some(factory) = factory {
            // Run without holding a lock so providers may resolve other types.
            let value = factory(self)?;
            let mut values = self.scope.values.write().unwrap_or_else(|e| e.into_inner());
            let stored = values.entry(id).or_insert(value);
            return Ok(Some(Arc::clone(stored)));
        }

        match &self.scope.parent {
            Some(parent) => parent.resolve_value(id),
            None => Ok(None),
        }
    }

    fn lookup(&self, id: TypeId) -> Option<Value> {
        self.scope
            .values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    /// Whether `T` is mapped or provided in this scope or a parent
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        let id = TypeId::of::<T>();
        let local = self.scope.values.read().unwrap_or_else(|e| e.into_inner()).contains_key(&id)
            || self.scope.factories.read().unwrap_or_else(|e| e.into_inner()).contains_key(&id);
        local || self.scope.parent.as_ref().is_some_and(Self::contains::<T>)
    }
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values = self.scope.values.read().unwrap_or_else(|e| e.into_inner()).len();
        let factories = self.scope.factories.read().unwrap_or_else(|e| e.into_inner()).len();
        f.debug_struct("Injector")
            .field("values", &values)
            .field("factories", &factories)
            .field("has_parent", &self.scope.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct Config {
        name: &'static str,
    }

    #[test]
    fn test_map_resolve() {
        let inj = Injector::new();
        inj.map(42i32);
        inj.map("hello".to_string());

        assert_eq!(*inj.resolve::<i32>().unwrap(), 42);
        assert_eq!(*inj.resolve::<String>().unwrap(), "hello");
    }

    #[test]
    fn test_map_overwrite() {
        let inj = Injector::new();
        inj.map(1i32);
        inj.map(2i32);
        assert_eq!(*inj.resolve::<i32>().unwrap(), 2);
    }

    #[test]
    fn test_unresolved() {
        let inj = Injector::new();
        let err = inj.resolve::<Config>().unwrap_err();
        assert!(matches!(err, Error::Unresolved { type_name } if type_name.ends_with("Config")));
    }

    #[test]
    fn test_provider_is_lazy_and_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inj = Injector::new();
        let counter = Arc::clone(&calls);
        inj.provide(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Config { name: "app" })
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let first = inj.resolve::<Config>().unwrap();
        let second = inj.resolve::<Config>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_provider_resolves_dependencies() {
        let inj = Injector::new();
        inj.map(8080u16);
        inj.provide(|inj| Ok(format!("port={}", inj.resolve::<u16>()?)));
        assert_eq!(*inj.resolve::<String>().unwrap(), "port=8080");
    }

    #[test]
    fn test_provider_error_propagates() {
        let inj = Injector::new();
        inj.provide::<Config, _>(|_| Err(Error::Session("store offline".to_string())));
        assert!(matches!(inj.resolve::<Config>(), Err(Error::Session(_))));
    }

    #[test]
    fn test_child_falls_back_to_parent() {
        let root = Injector::new();
        root.map(Config { name: "root" });
        let child = root.child();
        child.map(7u8);

        assert_eq!(child.resolve::<Config>().unwrap().name, "root");
        assert!(child.contains::<u8>());
        assert!(!root.contains::<u8>());
    }

    #[test]
    fn test_child_shadows_parent() {
        let root = Injector::new();
        root.map(Config { name: "root" });
        let child = root.child();
        child.map(Config { name: "child" });
        assert_eq!(child.resolve::<Config>().unwrap().name, "child");
        assert_eq!(root.resolve::<Config>().unwrap().name, "root");
    }

    #[test]
    fn test_thread_safe() {
        use std::thread;

        let inj = Injector::new();
        let clone = inj.clone();
        thread::spawn(move || clone.map(123i32)).join().unwrap();
        assert_eq!(*inj.resolve::<i32>().unwrap(), 123);
    }
}
