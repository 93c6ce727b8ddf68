//! Container-created interceptors.
//!
//! Interceptors are assembled in stage 1, before the pipeline is armed,
//! and are never wrapped themselves.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::assembly::{Blueprint, Managed};
use super::{Binder, BinderContext, BinderId, ErasedInstance, erase};
use crate::dependency::Dependency;
use crate::error::Result;
use crate::interception::{GlobalLifecycleInterceptor, LifecycleInterceptor, MethodInterceptor};
use crate::key::TypeKey;
use crate::kind::{BinderKind, LifecycleState};

/// Which interceptor contracts a type serves.
pub(crate) struct Contracts<I: ?Sized> {
    pub lifecycle: Option<fn(Arc<I>) -> Arc<dyn LifecycleInterceptor>>,
    pub method: Option<fn(Arc<I>) -> Arc<dyn MethodInterceptor>>,
    pub global: Option<fn(Arc<I>) -> Arc<dyn GlobalLifecycleInterceptor>>,
}

impl<I: ?Sized> Default for Contracts<I> {
    fn default() -> Self {
        Self { lifecycle: None, method: None, global: None }
    }
}

impl<I: ?Sized> Contracts<I> {
    pub fn keys(&self) -> Vec<TypeKey> {
        let mut keys = Vec::with_capacity(3);
        if self.lifecycle.is_some() {
            keys.push(TypeKey::of::<dyn LifecycleInterceptor>());
        }
        if self.method.is_some() {
            keys.push(TypeKey::of::<dyn MethodInterceptor>());
        }
        if self.global.is_some() {
            keys.push(TypeKey::of::<dyn GlobalLifecycleInterceptor>());
        }
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.lifecycle.is_none() && self.method.is_none() && self.global.is_none()
    }

    /// The contract objects of `instance`, keyed by contract.
    pub fn erase_all(&self, instance: &Arc<I>) -> Vec<(TypeKey, ErasedInstance)> {
        let mut erased = Vec::with_capacity(3);
        if let Some(cast) = self.lifecycle {
            erased.push((TypeKey::of::<dyn LifecycleInterceptor>(), erase(cast(Arc::clone(instance)))));
        }
        if let Some(cast) = self.method {
            erased.push((TypeKey::of::<dyn MethodInterceptor>(), erase(cast(Arc::clone(instance)))));
        }
        if let Some(cast) = self.global {
            erased.push((TypeKey::of::<dyn GlobalLifecycleInterceptor>(), erase(cast(Arc::clone(instance)))));
        }
        erased
    }
}

pub(crate) fn cast_lifecycle<I: LifecycleInterceptor + 'static>(instance: Arc<I>) -> Arc<dyn LifecycleInterceptor> {
    instance
}

pub(crate) fn cast_method<I: MethodInterceptor + 'static>(instance: Arc<I>) -> Arc<dyn MethodInterceptor> {
    instance
}

pub(crate) fn cast_global<I: GlobalLifecycleInterceptor + 'static>(
    instance: Arc<I>,
) -> Arc<dyn GlobalLifecycleInterceptor> {
    instance
}

pub(crate) struct InterceptorBinder<I> {
    id: BinderId,
    capabilities: Vec<TypeKey>,
    contracts: Contracts<I>,
    managed: Managed<I>,
}

impl<I: Any + Send + Sync> InterceptorBinder<I> {
    pub fn new(contracts: Contracts<I>, blueprint: Blueprint<I>, context: BinderContext) -> Self {
        Self {
            id: BinderId::new(BinderKind::Interceptor, TypeKey::of::<I>()),
            capabilities: contracts.keys(),
            contracts,
            managed: Managed::new(blueprint, context),
        }
    }
}

impl<I: Any + Send + Sync> Binder for InterceptorBinder<I> {
    fn id(&self) -> &BinderId {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        None
    }

    fn capabilities(&self) -> &[TypeKey] {
        &self.capabilities
    }

    fn dependencies(&self) -> &[Dependency] {
        self.managed.blueprint().dependencies()
    }

    fn instance(&self, capability: &TypeKey) -> Result<Option<ErasedInstance>> {
        if !self.capabilities.contains(capability) || self.managed.state().is_retired() {
            return Ok(None);
        }
        let instance = self.managed.get()?;
        Ok(self
            .contracts
            .erase_all(&instance)
            .into_iter()
            .find_map(|(key, erased)| (&key == capability).then_some(erased)))
    }

    fn start(&self) -> Result<()> {
        self.managed.get().map(|_| ())
    }

    fn stop(&self) -> Result<()> {
        self.managed.dispose()
    }

    fn state(&self) -> Option<LifecycleState> {
        Some(self.managed.state())
    }
}

impl<I> fmt::Debug for InterceptorBinder<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorBinder")
            .field("id", &self.id)
            .field("contracts", &self.capabilities)
            .field("managed", &self.managed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::assembly::Recipe;
    use crate::binder::unerase;
    use crate::container::ContainerState;
    use crate::interception::Entity;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl LifecycleInterceptor for Counter {
        fn after_creation(&self, _entity: &Entity<'_>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl GlobalLifecycleInterceptor for Counter {}

    fn binder(state: &Arc<ContainerState>) -> InterceptorBinder<Counter> {
        let contracts = Contracts {
            lifecycle: Some(cast_lifecycle::<Counter>),
            global: Some(cast_global::<Counter>),
            ..Contracts::default()
        };
        InterceptorBinder::new(
            contracts,
            Recipe::<Counter>::default_constructed().validate().unwrap(),
            BinderContext::new(Arc::downgrade(state), Arc::clone(&state.pipeline)),
        )
    }

    #[test]
    fn serves_declared_contracts_only() {
        let state = ContainerState::detached();
        let binder = binder(&state);
        binder.start().unwrap();

        assert_eq!(
            binder.capabilities(),
            &[TypeKey::of::<dyn LifecycleInterceptor>(), TypeKey::of::<dyn GlobalLifecycleInterceptor>()]
        );
        let lifecycle = binder.instance(&TypeKey::of::<dyn LifecycleInterceptor>()).unwrap().unwrap();
        assert!(unerase::<dyn LifecycleInterceptor>(&lifecycle).is_some());
        assert!(binder.instance(&TypeKey::of::<dyn MethodInterceptor>()).unwrap().is_none());
    }

    #[test]
    fn contracts_share_one_instance() {
        let state = ContainerState::detached();
        let binder = binder(&state);
        binder.start().unwrap();

        let lifecycle = unerase::<dyn LifecycleInterceptor>(
            &binder.instance(&TypeKey::of::<dyn LifecycleInterceptor>()).unwrap().unwrap(),
        )
        .unwrap();
        lifecycle.after_creation(&Entity::of(&0u8));
        lifecycle.after_creation(&Entity::of(&0u8));

        let again = unerase::<dyn LifecycleInterceptor>(
            &binder.instance(&TypeKey::of::<dyn LifecycleInterceptor>()).unwrap().unwrap(),
        )
        .unwrap();
        assert!(Arc::ptr_eq(&lifecycle, &again));
    }

    #[test]
    fn empty_contracts() {
        let contracts = Contracts::<Counter>::default();
        assert!(contracts.is_empty());
        assert!(contracts.keys().is_empty());
    }
}
