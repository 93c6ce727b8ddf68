//! Lifecycle and method interception.
//!
//! Every singleton, prototype and provided instance is handed out behind an
//! interception wrapper. The wrapper implements the same capability trait
//! and routes each call through the [`EventPipeline`]:
//!
//! ```text
//! before ─┬─ first claiming interceptor: wrap ─┬─ after     (success)
//!         └─ nobody claims: direct call ───────┴─ on_error  (failure)
//! ```
//!
//! Until the pipeline is armed (after stage 1 of startup) calls go straight
//! to the target and lifecycle notifications are dropped, so interceptors
//! never observe their own or their peers' creation.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::InvocationError;
use crate::key::TypeKey;

// ═══════════════════════════════════════════
// Interceptor contracts
// ═══════════════════════════════════════════

/// Observes entity lifecycle transitions.
///
/// All hooks default to no-ops.
pub trait LifecycleInterceptor: Send + Sync {
    fn after_creation(&self, _entity: &Entity<'_>) {}
    fn after_injection(&self, _entity: &Entity<'_>) {}
    fn after_initialization(&self, _entity: &Entity<'_>) {}
    fn before_disposal(&self, _entity: &Entity<'_>) {}
    fn after_disposal(&self, _entity: &Entity<'_>) {}
}

/// Observes, and optionally replaces, calls on capability interfaces.
pub trait MethodInterceptor: Send + Sync {
    /// Called before every intercepted call.
    fn before(&self, _call: &MethodCall<'_>, _args: &dyn fmt::Debug) {}

    /// Returns `true` to take over the call. The first interceptor that
    /// claims a call replaces it; the target method does not run.
    fn claims(&self, _call: &MethodCall<'_>) -> bool {
        false
    }

    /// Produces the result of a claimed call.
    ///
    /// The boxed value must have the method's success type.
    fn wrap(
        &self,
        call: &MethodCall<'_>,
        _args: &dyn fmt::Debug,
    ) -> Result<Box<dyn Any + Send>, InvocationError> {
        Err(InvocationError::msg(format!(
            "{} claimed {} but does not wrap it",
            type_name::<Self>(),
            call
        )))
    }

    /// Called after a successful call with its result.
    fn after(&self, _call: &MethodCall<'_>, _result: &dyn Any) {}

    /// Called after a failed call with its error.
    fn on_error(&self, _call: &MethodCall<'_>, _error: &InvocationError) {}
}

/// Observes the container as a whole.
pub trait GlobalLifecycleInterceptor: Send + Sync {
    /// Called once every binder of both stages is running.
    fn after_start(&self) {}

    /// Called before teardown begins.
    fn before_stop(&self) {}
}

// ═══════════════════════════════════════════
// Views handed to interceptors
// ═══════════════════════════════════════════

/// A borrowed view of a managed instance.
///
/// `type_key` always names the concrete type behind `instance`, so
/// [`downcast_ref`](Entity::downcast_ref) with that type succeeds.
#[derive(Clone, Copy)]
pub struct Entity<'a> {
    type_key: TypeKey,
    instance: &'a (dyn Any + Send + Sync),
}

impl<'a> Entity<'a> {
    /// Views `instance` under its own type.
    pub fn of<I: Any + Send + Sync>(instance: &'a I) -> Self {
        Self {
            type_key: TypeKey::of::<I>(),
            instance,
        }
    }

    pub(crate) fn erased(type_key: TypeKey, instance: &'a (dyn Any + Send + Sync)) -> Self {
        Self { type_key, instance }
    }

    pub fn type_key(&self) -> &TypeKey {
        &self.type_key
    }

    /// Downcasts to the concrete instance type.
    pub fn downcast_ref<I: Any>(&self) -> Option<&'a I> {
        self.instance.downcast_ref::<I>()
    }

    /// Returns `true` if the instance is an `I`.
    pub fn is<I: Any>(&self) -> bool {
        self.instance.is::<I>()
    }
}

impl fmt::Debug for Entity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.type_key.short_name())
    }
}

/// A call on a capability interface.
#[derive(Clone, Copy, Debug)]
pub struct MethodCall<'a> {
    capability: TypeKey,
    method: &'static str,
    target: Entity<'a>,
}

impl<'a> MethodCall<'a> {
    pub fn capability(&self) -> &TypeKey {
        &self.capability
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    /// The instance the call is made on.
    pub fn target(&self) -> &Entity<'a> {
        &self.target
    }
}

impl fmt::Display for MethodCall<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.capability.short_name(), self.method)
    }
}

// ═══════════════════════════════════════════
// EventPipeline
// ═══════════════════════════════════════════

/// The interceptors active for a running container.
#[derive(Default)]
pub(crate) struct InterceptorChain {
    pub lifecycle: Vec<Arc<dyn LifecycleInterceptor>>,
    pub method: Vec<Arc<dyn MethodInterceptor>>,
}

/// Returns `true` for the three interceptor contracts.
pub(crate) fn is_interceptor_contract(key: &TypeKey) -> bool {
    *key == TypeKey::of::<dyn LifecycleInterceptor>()
        || *key == TypeKey::of::<dyn MethodInterceptor>()
        || *key == TypeKey::of::<dyn GlobalLifecycleInterceptor>()
}

/// Dispatches lifecycle notifications and method interception.
///
/// Holds the bootstrap-readiness flag: the pipeline is inert until
/// [`arm`](EventPipeline::arm) is called with the collected interceptors.
#[derive(Default)]
pub struct EventPipeline {
    chain: RwLock<Option<Arc<InterceptorChain>>>,
}

impl EventPipeline {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Activates interception. Only the first call has an effect.
    pub(crate) fn arm(&self, chain: InterceptorChain) {
        let mut slot = self.chain.write();
        if slot.is_some() {
            debug!("Event pipeline already armed");
            return;
        }
        debug!(
            lifecycle = chain.lifecycle.len(),
            method = chain.method.len(),
            "Event pipeline armed"
        );
        *slot = Some(Arc::new(chain));
    }

    /// Deactivates interception and releases the interceptors.
    pub(crate) fn disarm(&self) {
        if self.chain.write().take().is_some() {
            debug!("Event pipeline disarmed");
        }
    }

    /// Returns `true` once the pipeline is armed.
    pub fn is_ready(&self) -> bool {
        self.chain.read().is_some()
    }

    fn snapshot(&self) -> Option<Arc<InterceptorChain>> {
        self.chain.read().clone()
    }

    fn broadcast(&self, event: &'static str, notify: impl Fn(&dyn LifecycleInterceptor)) {
        let Some(chain) = self.snapshot() else {
            return;
        };
        trace!(event, interceptors = chain.lifecycle.len(), "Lifecycle event");
        for interceptor in &chain.lifecycle {
            notify(interceptor.as_ref());
        }
    }

    pub(crate) fn after_creation(&self, entity: &Entity<'_>) {
        self.broadcast("after_creation", |i| i.after_creation(entity));
    }

    pub(crate) fn after_injection(&self, entity: &Entity<'_>) {
        self.broadcast("after_injection", |i| i.after_injection(entity));
    }

    pub(crate) fn after_initialization(&self, entity: &Entity<'_>) {
        self.broadcast("after_initialization", |i| i.after_initialization(entity));
    }

    pub(crate) fn before_disposal(&self, entity: &Entity<'_>) {
        self.broadcast("before_disposal", |i| i.before_disposal(entity));
    }

    pub(crate) fn after_disposal(&self, entity: &Entity<'_>) {
        self.broadcast("after_disposal", |i| i.after_disposal(entity));
    }
}

impl fmt::Debug for EventPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPipeline")
            .field("ready", &self.is_ready())
            .finish()
    }
}

// ═══════════════════════════════════════════
// Interception wrapper core
// ═══════════════════════════════════════════

/// The shared part of every interception wrapper.
///
/// A wrapper for capability `dyn Trait` holds an `Intercepted<dyn Trait>`
/// and implements each trait method as a call to
/// [`invoke`](Intercepted::invoke). `#[rabt::capability]` generates such
/// wrappers.
pub struct Intercepted<T: ?Sized> {
    target: Arc<T>,
    origin: Arc<dyn Any + Send + Sync>,
    implementation: TypeKey,
    capability: TypeKey,
    pipeline: Arc<EventPipeline>,
}

impl<T: ?Sized + 'static> Intercepted<T> {
    /// `origin` is the instance behind `target`, as seen by interceptors;
    /// `implementation` must be the key of its concrete type.
    pub(crate) fn new(
        target: Arc<T>,
        origin: Arc<dyn Any + Send + Sync>,
        implementation: TypeKey,
        pipeline: Arc<EventPipeline>,
    ) -> Self {
        Self {
            target,
            origin,
            implementation,
            capability: TypeKey::of::<T>(),
            pipeline,
        }
    }

    /// The wrapped capability object.
    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    pub fn capability(&self) -> &TypeKey {
        &self.capability
    }

    pub fn implementation(&self) -> &TypeKey {
        &self.implementation
    }

    /// Runs `call` through the interceptor pipeline.
    ///
    /// Failures of the call are returned unchanged. If an interceptor claims
    /// the call, its result is used instead and `call` never runs.
    pub fn invoke<A, R, F>(&self, method: &'static str, args: A, call: F) -> Result<R, InvocationError>
    where
        A: fmt::Debug,
        R: Any + Send,
        F: FnOnce(&T, A) -> Result<R, InvocationError>,
    {
        let Some(chain) = self.pipeline.snapshot() else {
            return call(&*self.target, args);
        };

        let invocation = MethodCall {
            capability: self.capability,
            method,
            target: Entity::erased(self.implementation, &*self.origin),
        };
        trace!(call = %invocation, "Intercepting call");

        for interceptor in &chain.method {
            interceptor.before(&invocation, &args);
        }

        let outcome = match chain.method.iter().find(|i| i.claims(&invocation)) {
            Some(claimant) => claimant.wrap(&invocation, &args).and_then(|boxed| {
                boxed.downcast::<R>().map(|value| *value).map_err(|_| {
                    InvocationError::msg(format!(
                        "interceptor result for {invocation} is not a {}",
                        type_name::<R>()
                    ))
                })
            }),
            None => call(&*self.target, args),
        };

        match &outcome {
            Ok(value) => {
                for interceptor in &chain.method {
                    interceptor.after(&invocation, value);
                }
            }
            Err(error) => {
                for interceptor in &chain.method {
                    interceptor.on_error(&invocation, error);
                }
            }
        }

        outcome
    }
}

impl<T: ?Sized> fmt::Debug for Intercepted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Intercepted")
            .field("capability", &self.capability.short_name())
            .field("implementation", &self.implementation.short_name())
            .finish()
    }
}

/// A capability trait object that can be put behind an interception wrapper.
///
/// Implemented for `dyn Trait` by `#[rabt::capability]`.
pub trait Interceptable: Send + Sync + 'static {
    /// Wraps `core` into an object implementing the capability.
    fn intercept(core: Intercepted<Self>) -> Arc<Self>;
}
