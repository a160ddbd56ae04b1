//! Execution context: service locator for scheduler collaborators.
//!
//! A context owns the long-lived services a scheduler (and the layers above
//! it) share: most importantly the reactor. Services are created lazily,
//! memoized by type, and handed out as `Arc`s.

use crate::reactor::{LabReactor, Reactor};
use crate::tracing_compat::debug;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Service registry binding a scheduler to its collaborators.
#[derive(Default)]
pub struct ExecutionContext {
    services: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    reactor: Mutex<Option<Arc<dyn Reactor>>>,
}

impl ExecutionContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the service of type `S`, creating and memoizing it with
    /// `init` on first use.
    ///
    /// `init` runs under the registry lock and must not recursively call
    /// back into this context.
    pub fn use_service<S>(&self, init: impl FnOnce() -> S) -> Arc<S>
    where
        S: Any + Send + Sync,
    {
        let mut services = self.services.lock();
        let entry = services
            .entry(TypeId::of::<S>())
            .or_insert_with(|| Arc::new(init()));
        Arc::clone(entry)
            .downcast::<S>()
            .expect("service registry keyed by TypeId")
    }

    /// Returns the service of type `S` if it has been created.
    #[must_use]
    pub fn service<S>(&self) -> Option<Arc<S>>
    where
        S: Any + Send + Sync,
    {
        let services = self.services.lock();
        services
            .get(&TypeId::of::<S>())
            .map(|entry| Arc::clone(entry).downcast::<S>().expect("service registry keyed by TypeId"))
    }

    /// Installs the reactor the scheduler will drive. Replaces any default
    /// installed by a prior [`reactor`](Self::reactor) call.
    pub fn register_reactor(&self, reactor: Arc<dyn Reactor>) {
        *self.reactor.lock() = Some(reactor);
    }

    /// Returns the registered reactor, installing a [`LabReactor`] when
    /// nothing was registered.
    #[must_use]
    pub fn reactor(&self) -> Arc<dyn Reactor> {
        let mut slot = self.reactor.lock();
        if let Some(reactor) = slot.as_ref() {
            return Arc::clone(reactor);
        }
        debug!("no reactor registered, installing lab reactor");
        let lab: Arc<dyn Reactor> = Arc::new(LabReactor::new());
        *slot = Some(Arc::clone(&lab));
        lab
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("services", &self.services.lock().len())
            .field("has_reactor", &self.reactor.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Clock(u64);

    #[test]
    fn use_service_memoizes_by_type() {
        let context = ExecutionContext::new();
        let first = context.use_service(|| Clock(7));
        let second = context.use_service(|| Clock(99));
        assert!(Arc::ptr_eq(&first, &second), "second init must not run");
        assert_eq!(second.0, 7);
    }

    #[test]
    fn service_returns_none_before_first_use() {
        let context = ExecutionContext::new();
        assert!(context.service::<Clock>().is_none());
        let created = context.use_service(|| Clock(1));
        let fetched = context.service::<Clock>().expect("created above");
        assert!(Arc::ptr_eq(&created, &fetched));
    }

    #[test]
    fn reactor_defaults_to_lab_and_is_stable() {
        let context = ExecutionContext::new();
        let a = context.reactor();
        let b = context.reactor();
        assert!(Arc::ptr_eq(&a, &b), "default reactor must be memoized");
    }

    #[test]
    fn registered_reactor_wins() {
        let context = ExecutionContext::new();
        let lab = Arc::new(LabReactor::new());
        context.register_reactor(lab.clone());
        let fetched = context.reactor();
        assert!(Arc::ptr_eq(
            &(lab as Arc<dyn Reactor>),
            &fetched
        ));
    }
}
