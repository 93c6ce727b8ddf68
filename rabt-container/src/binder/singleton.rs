//! Singleton binder: one instance, one wrapper per capability.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use once_cell::sync::OnceCell;
use tracing::debug;

use super::assembly::{Blueprint, CapabilityBinding, Managed};
use super::{Binder, BinderContext, BinderId, ErasedInstance};
use crate::dependency::Dependency;
use crate::error::Result;
use crate::key::TypeKey;
use crate::kind::{BinderKind, LifecycleState};

pub(crate) struct SingletonBinder<I> {
    id: BinderId,
    name: Option<String>,
    lazy: bool,
    capabilities: Vec<TypeKey>,
    bindings: Vec<CapabilityBinding<I>>,
    managed: Managed<I>,
    wrappers: OnceCell<HashMap<TypeKey, ErasedInstance>>,
}

impl<I: Any + Send + Sync> SingletonBinder<I> {
    pub fn new(
        name: Option<String>,
        lazy: bool,
        bindings: Vec<CapabilityBinding<I>>,
        blueprint: Blueprint<I>,
        context: BinderContext,
    ) -> Self {
        Self {
            id: BinderId::new(BinderKind::Singleton, TypeKey::of::<I>()),
            name,
            lazy,
            capabilities: bindings.iter().map(|b| *b.key()).collect(),
            bindings,
            managed: Managed::new(blueprint, context),
            wrappers: OnceCell::new(),
        }
    }

    fn wrappers(&self) -> Result<&HashMap<TypeKey, ErasedInstance>> {
        self.wrappers.get_or_try_init(|| {
            let instance = self.managed.get()?;
            let pipeline = self.managed.context().pipeline();
            Ok(self
                .bindings
                .iter()
                .map(|binding| (*binding.key(), binding.wrap(instance.clone(), pipeline)))
                .collect())
        })
    }
}

impl<I: Any + Send + Sync> Binder for SingletonBinder<I> {
    fn id(&self) -> &BinderId {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
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
        Ok(self.wrappers()?.get(capability).cloned())
    }

    fn start(&self) -> Result<()> {
        if self.lazy {
            debug!(binder = %self.id, "Lazy singleton, created on first lookup");
            return Ok(());
        }
        self.wrappers().map(|_| ())
    }

    fn stop(&self) -> Result<()> {
        self.managed.dispose()
    }

    fn state(&self) -> Option<LifecycleState> {
        Some(self.managed.state())
    }
}

impl<I> fmt::Debug for SingletonBinder<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonBinder")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("lazy", &self.lazy)
            .field("managed", &self.managed)
            .finish()
    }
}
