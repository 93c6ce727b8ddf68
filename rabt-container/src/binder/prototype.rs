//! Prototype binder: a fresh instance and wrapper on every lookup.

use std::any::Any;
use std::fmt;

use tracing::trace;

use super::assembly::{Blueprint, CapabilityBinding};
use super::{Binder, BinderContext, BinderId, ErasedInstance};
use crate::dependency::Dependency;
use crate::error::Result;
use crate::key::TypeKey;
use crate::kind::{BinderKind, LifecycleState};

pub(crate) struct PrototypeBinder<I> {
    id: BinderId,
    name: Option<String>,
    capabilities: Vec<TypeKey>,
    bindings: Vec<CapabilityBinding<I>>,
    blueprint: Blueprint<I>,
    context: BinderContext,
}

impl<I: Any + Send + Sync> PrototypeBinder<I> {
    pub fn new(
        name: Option<String>,
        bindings: Vec<CapabilityBinding<I>>,
        blueprint: Blueprint<I>,
        context: BinderContext,
    ) -> Self {
        Self {
            id: BinderId::new(BinderKind::Prototype, TypeKey::of::<I>()),
            name,
            capabilities: bindings.iter().map(|b| *b.key()).collect(),
            bindings,
            blueprint,
            context,
        }
    }
}

fn untracked(_: LifecycleState) {}

impl<I: Any + Send + Sync> Binder for PrototypeBinder<I> {
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
        self.blueprint.dependencies()
    }

    fn instance(&self, capability: &TypeKey) -> Result<Option<ErasedInstance>> {
        let Some(binding) = self.bindings.iter().find(|b| b.key() == capability) else {
            return Ok(None);
        };
        trace!(binder = %self.id, "Assembling prototype instance");
        let instance = self.blueprint.assemble(&self.context, &untracked)?;
        Ok(Some(binding.wrap(instance, self.context.pipeline())))
    }

    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        Ok(())
    }
}

impl<I> fmt::Debug for PrototypeBinder<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrototypeBinder")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("blueprint", &self.blueprint)
            .finish()
    }
}
