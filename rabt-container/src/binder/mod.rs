//! Binders: one descriptor-plus-factory per managed unit.
//!
//! A [`Binder`] knows which capabilities it satisfies, which dependencies
//! it has, and how to hand out instances. The container only ever talks to
//! binders through this trait.
//!
//! | kind          | instance per lookup                   | start / stop              |
//! |---------------|---------------------------------------|---------------------------|
//! | singleton     | the same wrapper                      | eager create / dispose    |
//! | prototype     | a fresh instance and wrapper          | no-ops                    |
//! | provider      | a freshly produced, wrapped instance  | provider group lifecycle  |
//! | interceptor   | the interceptor, unwrapped            | create / dispose          |
//! | external      | the supplied instance, unwrapped      | no-ops                    |

pub(crate) mod assembly;
pub(crate) mod external;
pub(crate) mod interceptor;
pub(crate) mod prototype;
pub(crate) mod provider;
pub(crate) mod singleton;

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::container::ContainerState;
use crate::dependency::Dependency;
use crate::error::Result;
use crate::injector::Injector;
use crate::interception::EventPipeline;
use crate::key::TypeKey;
use crate::kind::{BinderKind, LifecycleState};
use crate::locator::ContainerLocator;

/// A type-erased instance handed out by a binder.
///
/// For a capability `T` it always holds an `Arc<T>`; use [`unerase`] to
/// get it back.
pub type ErasedInstance = Arc<dyn Any + Send + Sync>;

/// Erases a capability object.
pub fn erase<T: ?Sized + Send + Sync + 'static>(instance: Arc<T>) -> ErasedInstance {
    Arc::new(instance)
}

/// Recovers a capability object erased with [`erase`].
pub fn unerase<T: ?Sized + 'static>(erased: &ErasedInstance) -> Option<Arc<T>> {
    (**erased).downcast_ref::<Arc<T>>().cloned()
}

/// Identity of a binder.
///
/// Two binders with equal ids are duplicates; the second is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinderId {
    kind: BinderKind,
    implementation: TypeKey,
    production: Option<TypeKey>,
}

impl BinderId {
    pub fn new(kind: BinderKind, implementation: TypeKey) -> Self {
        Self { kind, implementation, production: None }
    }

    /// Id of one production operation of a provider group.
    pub fn production(provider: TypeKey, capability: TypeKey) -> Self {
        Self {
            kind: BinderKind::Provider,
            implementation: provider,
            production: Some(capability),
        }
    }

    pub fn kind(&self) -> BinderKind {
        self.kind
    }

    pub fn implementation(&self) -> &TypeKey {
        &self.implementation
    }

    pub fn produced(&self) -> Option<&TypeKey> {
        self.production.as_ref()
    }

    /// Short label for logs and plans, e.g. `ClockFactory::dyn Clock`.
    pub fn label(&self) -> String {
        match &self.production {
            Some(capability) => format!(
                "{}::{}",
                self.implementation.short_name(),
                capability.short_name()
            ),
            None => self.implementation.short_name(),
        }
    }
}

impl fmt::Display for BinderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.label())
    }
}

/// A managed unit: descriptor plus factory.
///
/// `start` and `stop` are called at most once per container lifetime.
pub trait Binder: Send + Sync + fmt::Debug {
    fn id(&self) -> &BinderId;

    fn kind(&self) -> BinderKind {
        self.id().kind()
    }

    /// The process-wide unique name, if the binder has one.
    fn name(&self) -> Option<&str>;

    /// Capability interfaces the binder satisfies.
    fn capabilities(&self) -> &[TypeKey];

    /// Dependency edges of the managed instance.
    fn dependencies(&self) -> &[Dependency];

    /// Returns an instance for `capability`, or `None` if the binder does
    /// not serve it.
    fn instance(&self, capability: &TypeKey) -> Result<Option<ErasedInstance>>;

    fn start(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    /// Lifecycle state of stateful binders; `None` for factories.
    fn state(&self) -> Option<LifecycleState> {
        None
    }
}

/// What a binder needs from its container.
///
/// Holds the container state weakly: binders live inside that state.
#[derive(Clone)]
pub struct BinderContext {
    state: Weak<ContainerState>,
    pipeline: Arc<EventPipeline>,
}

impl BinderContext {
    pub(crate) fn new(state: Weak<ContainerState>, pipeline: Arc<EventPipeline>) -> Self {
        Self { state, pipeline }
    }

    /// A locator over the owning container.
    pub fn locator(&self) -> ContainerLocator {
        ContainerLocator::new(self.state.clone())
    }

    /// An injector over the owning container.
    pub fn injector(&self) -> Injector {
        Injector::new(self.state.clone())
    }

    pub fn pipeline(&self) -> &Arc<EventPipeline> {
        &self.pipeline
    }
}

impl fmt::Debug for BinderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinderContext")
            .field("attached", &(self.state.strong_count() > 0))
            .finish()
    }
}
