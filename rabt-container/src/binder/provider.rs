//! Provider binders.
//!
//! A provider group is one singleton-lifecycle provider `P` exposing several
//! production operations. Each operation becomes its own binder; all of
//! them share the group, which is created once and disposed once.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use rabt_support::rendering::shorten_type_name;
use tracing::trace;

use super::assembly::Managed;
use super::{Binder, BinderId, ErasedInstance, erase};
use crate::dependency::Dependency;
use crate::error::{BoxError, RabtError, Result};
use crate::interception::{EventPipeline, Interceptable, Intercepted};
use crate::key::TypeKey;
use crate::kind::LifecycleState;

type Produce<P> = Box<dyn Fn(&P, &Arc<EventPipeline>) -> Result<ErasedInstance> + Send + Sync>;

/// One production operation of a provider.
pub(crate) struct Production<P> {
    name: Option<String>,
    capability: TypeKey,
    produce: Produce<P>,
}

impl<P: Any + Send + Sync> Production<P> {
    pub fn new<T, F>(name: Option<String>, produce: F) -> Self
    where
        T: ?Sized + Interceptable,
        F: Fn(&P) -> std::result::Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        let label = format!(
            "{}::{}",
            shorten_type_name(type_name::<P>()),
            shorten_type_name(type_name::<T>())
        );
        Self {
            name,
            capability: TypeKey::of::<T>(),
            produce: Box::new(move |provider: &P, pipeline: &Arc<EventPipeline>| {
                let made = produce(provider).map_err(|source| RabtError::ConstructionFailed {
                    implementation: label.clone(),
                    source,
                })?;
                let origin: Arc<dyn Any + Send + Sync> = Arc::new(Arc::clone(&made));
                Ok(erase(T::intercept(Intercepted::new(
                    made,
                    origin,
                    TypeKey::of::<Arc<T>>(),
                    Arc::clone(pipeline),
                ))))
            }),
        }
    }

    pub fn capability(&self) -> &TypeKey {
        &self.capability
    }
}

/// Binder for one production operation of a provider group.
pub(crate) struct ProviderBinder<P> {
    id: BinderId,
    name: Option<String>,
    capabilities: [TypeKey; 1],
    group: Arc<Managed<P>>,
    produce: Produce<P>,
}

impl<P: Any + Send + Sync> ProviderBinder<P> {
    pub fn new(group: Arc<Managed<P>>, production: Production<P>) -> Self {
        Self {
            id: BinderId::production(TypeKey::of::<P>(), production.capability),
            name: production.name,
            capabilities: [production.capability],
            group,
            produce: production.produce,
        }
    }
}

impl<P: Any + Send + Sync> Binder for ProviderBinder<P> {
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
        self.group.blueprint().dependencies()
    }

    fn instance(&self, capability: &TypeKey) -> Result<Option<ErasedInstance>> {
        if capability != &self.capabilities[0] || self.group.state().is_retired() {
            return Ok(None);
        }
        let provider = self.group.get()?;
        trace!(binder = %self.id, "Producing instance");
        (self.produce)(&provider, self.group.context().pipeline()).map(Some)
    }

    fn start(&self) -> Result<()> {
        self.group.get().map(|_| ())
    }

    fn stop(&self) -> Result<()> {
        self.group.dispose()
    }

    fn state(&self) -> Option<LifecycleState> {
        Some(self.group.state())
    }
}

impl<P> fmt::Debug for ProviderBinder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderBinder")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("group", &self.group)
            .finish()
    }
}
