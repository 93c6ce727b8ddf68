//! Declarations: what the container should manage, and how.
//!
//! A declaration describes one managed unit and turns into one or more
//! binders when the container is built. Discovery collaborators hand
//! declarations to the builder; applications may also declare directly.
//!
//! ```rust,ignore
//! let mailer = EntityDescriptor::singleton(|| Ok(SmtpMailer::default()))
//!     .named("smtp")
//!     .capability::<dyn Mailer>(|m| m)
//!     .configure(Configure::required("smtp.host", |m: &mut SmtpMailer, host: String| m.host = host))
//!     .inject(Inject::required(|m: &mut SmtpMailer, log: Arc<dyn AuditLog>| m.audit = Some(log)))
//!     .disposable();
//! ```

use std::any::{Any, type_name};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use rabt_support::rendering::shorten_type_name;
use tracing::{debug, warn};

use crate::binder::assembly::{CapabilityBinding, Disposable, Initializable, Managed, Recipe, interfaces_only};
use crate::binder::external::ExternalBinder;
use crate::binder::interceptor::{Contracts, InterceptorBinder, cast_global, cast_lifecycle, cast_method};
use crate::binder::prototype::PrototypeBinder;
use crate::binder::provider::{Production, ProviderBinder};
use crate::binder::singleton::SingletonBinder;
use crate::binder::{Binder, BinderContext, ErasedInstance, erase};
use crate::error::{BoxError, RabtError, Result};
use crate::injector::{Configure, Inject, InjectionPlan, Injector};
use crate::interception::{GlobalLifecycleInterceptor, Interceptable, LifecycleInterceptor, MethodInterceptor};
use crate::key::TypeKey;
use crate::kind::BinderKind;
use crate::locator::ContainerLocator;

/// A declared managed unit.
pub trait Declaration: Send {
    /// The binder kind the declaration registers as.
    fn role(&self) -> BinderKind;

    /// The declared implementation type.
    fn implementation(&self) -> TypeKey;

    /// Creates the binders for this declaration.
    ///
    /// # Errors
    /// Conflicting hook declarations and duplicate productions.
    fn into_binders(self: Box<Self>, context: &BinderContext) -> Result<Vec<Arc<dyn Binder>>>;
}

fn trimmed(name: &str) -> Option<String> {
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn take_plan<I: 'static>(recipe: &mut Recipe<I>, edit: impl FnOnce(InjectionPlan<I>) -> InjectionPlan<I>) {
    recipe.plan = edit(std::mem::take(&mut recipe.plan));
}

// ============================================================
// Singletons and prototypes
// ============================================================

/// Declares a singleton or prototype entity of type `I`.
pub struct EntityDescriptor<I> {
    kind: BinderKind,
    name: Option<String>,
    lazy: bool,
    capabilities: Vec<CapabilityBinding<I>>,
    recipe: Recipe<I>,
}

impl<I: Any + Send + Sync> EntityDescriptor<I> {
    /// One shared instance, created when the container starts.
    pub fn singleton<F>(construct: F) -> Self
    where
        F: Fn() -> std::result::Result<I, BoxError> + Send + Sync + 'static,
    {
        Self::with_kind(BinderKind::Singleton, Recipe::new(construct))
    }

    /// A new instance for every lookup.
    pub fn prototype<F>(construct: F) -> Self
    where
        F: Fn() -> std::result::Result<I, BoxError> + Send + Sync + 'static,
    {
        Self::with_kind(BinderKind::Prototype, Recipe::new(construct))
    }

    fn with_kind(kind: BinderKind, recipe: Recipe<I>) -> Self {
        Self {
            kind,
            name: None,
            lazy: false,
            capabilities: Vec::new(),
            recipe,
        }
    }

    /// Binds the entity under a container-wide unique name.
    pub fn named(mut self, name: &str) -> Self {
        self.name = trimmed(name);
        self
    }

    /// Defers creation of a singleton to its first lookup.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Exposes the entity as capability `T`.
    ///
    /// `cast` is almost always `|entity| entity`.
    pub fn capability<T: ?Sized + Interceptable>(mut self, cast: fn(Arc<I>) -> Arc<T>) -> Self {
        self.capabilities.push(CapabilityBinding::new(cast));
        self
    }

    pub fn configure(mut self, binding: Configure<I>) -> Self {
        take_plan(&mut self.recipe, |plan| plan.configure(binding));
        self
    }

    pub fn inject(mut self, binding: Inject<I>) -> Self {
        take_plan(&mut self.recipe, |plan| plan.inject(binding));
        self
    }

    /// Runs `hook` after injection.
    pub fn init_with<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut I) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.recipe.init_with(hook);
        self
    }

    /// Runs `hook` when the owning binder stops.
    pub fn dispose_with<F>(mut self, hook: F) -> Self
    where
        F: Fn(&I) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.recipe.dispose_with(hook);
        self
    }

    /// Hands the entity a locator during assembly.
    pub fn with_locator<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut I, ContainerLocator) + Send + Sync + 'static,
    {
        self.recipe.with_locator(hook);
        self
    }

    /// Hands the entity an injector during assembly.
    pub fn with_injector<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut I, Injector) + Send + Sync + 'static,
    {
        self.recipe.with_injector(hook);
        self
    }
}

impl<I: Any + Send + Sync + Default> EntityDescriptor<I> {
    pub fn singleton_default() -> Self {
        Self::with_kind(BinderKind::Singleton, Recipe::default_constructed())
    }

    pub fn prototype_default() -> Self {
        Self::with_kind(BinderKind::Prototype, Recipe::default_constructed())
    }
}

impl<I: Any + Send + Sync + Initializable> EntityDescriptor<I> {
    /// Uses [`Initializable::initialize`] as the init hook.
    pub fn initializable(mut self) -> Self {
        self.recipe.initializable();
        self
    }
}

impl<I: Any + Send + Sync + Disposable> EntityDescriptor<I> {
    /// Uses [`Disposable::dispose`] as the dispose hook.
    pub fn disposable(mut self) -> Self {
        self.recipe.disposable();
        self
    }
}

impl<I: Any + Send + Sync> Declaration for EntityDescriptor<I> {
    fn role(&self) -> BinderKind {
        self.kind
    }

    fn implementation(&self) -> TypeKey {
        TypeKey::of::<I>()
    }

    fn into_binders(self: Box<Self>, context: &BinderContext) -> Result<Vec<Arc<dyn Binder>>> {
        let this = *self;
        let blueprint = this.recipe.validate()?;
        let bindings = interfaces_only(blueprint.implementation(), this.capabilities, CapabilityBinding::key);
        if bindings.is_empty() {
            debug!(implementation = %blueprint.implementation(), "Entity exposes no capability");
        }

        let binder: Arc<dyn Binder> = match this.kind {
            BinderKind::Prototype => {
                if this.lazy {
                    debug!(implementation = %blueprint.implementation(), "Prototypes are always created on demand");
                }
                Arc::new(PrototypeBinder::new(this.name, bindings, blueprint, context.clone()))
            }
            _ => Arc::new(SingletonBinder::new(
                this.name,
                this.lazy,
                bindings,
                blueprint,
                context.clone(),
            )),
        };
        Ok(vec![binder])
    }
}

impl<I> fmt::Debug for EntityDescriptor<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("kind", &self.kind)
            .field("implementation", &type_name::<I>())
            .field("name", &self.name)
            .field("lazy", &self.lazy)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

// ============================================================
// Provider groups
// ============================================================

/// Declares a provider `P` and its production operations.
///
/// The provider itself is a singleton; every production yields a freshly
/// made, intercepted instance per lookup.
pub struct ProviderDescriptor<P> {
    productions: Vec<Production<P>>,
    recipe: Recipe<P>,
}

impl<P: Any + Send + Sync> ProviderDescriptor<P> {
    pub fn new<F>(construct: F) -> Self
    where
        F: Fn() -> std::result::Result<P, BoxError> + Send + Sync + 'static,
    {
        Self {
            productions: Vec::new(),
            recipe: Recipe::new(construct),
        }
    }

    /// Adds a production of capability `T`.
    pub fn produces<T, F>(mut self, produce: F) -> Self
    where
        T: ?Sized + Interceptable,
        F: Fn(&P) -> std::result::Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        self.productions.push(Production::new(None, produce));
        self
    }

    /// Adds a production of capability `T` bound under `name`.
    pub fn produces_named<T, F>(mut self, name: &str, produce: F) -> Self
    where
        T: ?Sized + Interceptable,
        F: Fn(&P) -> std::result::Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        self.productions.push(Production::new(trimmed(name), produce));
        self
    }

    pub fn configure(mut self, binding: Configure<P>) -> Self {
        take_plan(&mut self.recipe, |plan| plan.configure(binding));
        self
    }

    pub fn inject(mut self, binding: Inject<P>) -> Self {
        take_plan(&mut self.recipe, |plan| plan.inject(binding));
        self
    }

    pub fn init_with<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut P) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.recipe.init_with(hook);
        self
    }

    pub fn dispose_with<F>(mut self, hook: F) -> Self
    where
        F: Fn(&P) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.recipe.dispose_with(hook);
        self
    }

    pub fn with_locator<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut P, ContainerLocator) + Send + Sync + 'static,
    {
        self.recipe.with_locator(hook);
        self
    }

    pub fn with_injector<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut P, Injector) + Send + Sync + 'static,
    {
        self.recipe.with_injector(hook);
        self
    }
}

impl<P: Any + Send + Sync + Default> Default for ProviderDescriptor<P> {
    fn default() -> Self {
        Self {
            productions: Vec::new(),
            recipe: Recipe::default_constructed(),
        }
    }
}

impl<P: Any + Send + Sync + Initializable> ProviderDescriptor<P> {
    pub fn initializable(mut self) -> Self {
        self.recipe.initializable();
        self
    }
}

impl<P: Any + Send + Sync + Disposable> ProviderDescriptor<P> {
    pub fn disposable(mut self) -> Self {
        self.recipe.disposable();
        self
    }
}

impl<P: Any + Send + Sync> Declaration for ProviderDescriptor<P> {
    fn role(&self) -> BinderKind {
        BinderKind::Provider
    }

    fn implementation(&self) -> TypeKey {
        TypeKey::of::<P>()
    }

    fn into_binders(self: Box<Self>, context: &BinderContext) -> Result<Vec<Arc<dyn Binder>>> {
        let this = *self;
        let provider = shorten_type_name(type_name::<P>());

        let mut seen = HashSet::new();
        for production in &this.productions {
            if !seen.insert(*production.capability()) {
                return Err(RabtError::DuplicateProduction {
                    provider,
                    capability: production.capability().short_name(),
                });
            }
        }

        let blueprint = this.recipe.validate()?;
        let productions = interfaces_only(&provider, this.productions, Production::capability);
        if productions.is_empty() {
            warn!(provider = %provider, "Provider declares no production, it will never be created");
            return Ok(Vec::new());
        }

        let group = Arc::new(Managed::new(blueprint, context.clone()));
        Ok(productions
            .into_iter()
            .map(|production| Arc::new(ProviderBinder::new(Arc::clone(&group), production)) as Arc<dyn Binder>)
            .collect())
    }
}

impl<P> fmt::Debug for ProviderDescriptor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("provider", &type_name::<P>())
            .field("productions", &self.productions.len())
            .finish()
    }
}

// ============================================================
// Interceptors
// ============================================================

/// Declares an interceptor the container creates and wires.
pub struct InterceptorDescriptor<I> {
    contracts: Contracts<I>,
    recipe: Recipe<I>,
}

impl<I: Any + Send + Sync> InterceptorDescriptor<I> {
    pub fn new<F>(construct: F) -> Self
    where
        F: Fn() -> std::result::Result<I, BoxError> + Send + Sync + 'static,
    {
        Self {
            contracts: Contracts::default(),
            recipe: Recipe::new(construct),
        }
    }

    pub fn configure(mut self, binding: Configure<I>) -> Self {
        take_plan(&mut self.recipe, |plan| plan.configure(binding));
        self
    }

    pub fn inject(mut self, binding: Inject<I>) -> Self {
        take_plan(&mut self.recipe, |plan| plan.inject(binding));
        self
    }

    pub fn init_with<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut I) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.recipe.init_with(hook);
        self
    }

    pub fn dispose_with<F>(mut self, hook: F) -> Self
    where
        F: Fn(&I) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.recipe.dispose_with(hook);
        self
    }
}

impl<I: Any + Send + Sync + Default> Default for InterceptorDescriptor<I> {
    fn default() -> Self {
        Self {
            contracts: Contracts::default(),
            recipe: Recipe::default_constructed(),
        }
    }
}

impl<I: LifecycleInterceptor + Any> InterceptorDescriptor<I> {
    pub fn lifecycle(mut self) -> Self {
        self.contracts.lifecycle = Some(cast_lifecycle::<I>);
        self
    }
}

impl<I: MethodInterceptor + Any> InterceptorDescriptor<I> {
    pub fn method(mut self) -> Self {
        self.contracts.method = Some(cast_method::<I>);
        self
    }
}

impl<I: GlobalLifecycleInterceptor + Any> InterceptorDescriptor<I> {
    pub fn global(mut self) -> Self {
        self.contracts.global = Some(cast_global::<I>);
        self
    }
}

impl<I: Any + Send + Sync> Declaration for InterceptorDescriptor<I> {
    fn role(&self) -> BinderKind {
        BinderKind::Interceptor
    }

    fn implementation(&self) -> TypeKey {
        TypeKey::of::<I>()
    }

    fn into_binders(self: Box<Self>, context: &BinderContext) -> Result<Vec<Arc<dyn Binder>>> {
        let this = *self;
        let blueprint = this.recipe.validate()?;
        if this.contracts.is_empty() {
            warn!(
                implementation = %blueprint.implementation(),
                "Interceptor declares no interceptor contract, skipping"
            );
            return Ok(Vec::new());
        }
        Ok(vec![Arc::new(InterceptorBinder::new(this.contracts, blueprint, context.clone()))])
    }
}

impl<I> fmt::Debug for InterceptorDescriptor<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorDescriptor")
            .field("implementation", &type_name::<I>())
            .field("contracts", &self.contracts.keys())
            .finish()
    }
}

// ============================================================
// External instances
// ============================================================

/// Registers an instance owned by the application.
///
/// The instance is located as is, without interception, under the
/// interceptor contracts and capabilities declared here.
pub struct ExternalDescriptor<I> {
    instance: Arc<I>,
    exposed: Vec<(TypeKey, ErasedInstance)>,
}

impl<I: Any + Send + Sync> ExternalDescriptor<I> {
    pub fn new(instance: Arc<I>) -> Self {
        Self { instance, exposed: Vec::new() }
    }

    /// Exposes the instance as `T`. `T` must be an interface.
    pub fn capability<T: ?Sized + Send + Sync + 'static>(mut self, cast: fn(Arc<I>) -> Arc<T>) -> Self {
        self.exposed.push((TypeKey::of::<T>(), erase(cast(Arc::clone(&self.instance)))));
        self
    }
}

impl<I: LifecycleInterceptor + Any> ExternalDescriptor<I> {
    pub fn lifecycle(self) -> Self {
        self.capability(cast_lifecycle::<I>)
    }
}

impl<I: MethodInterceptor + Any> ExternalDescriptor<I> {
    pub fn method(self) -> Self {
        self.capability(cast_method::<I>)
    }
}

impl<I: GlobalLifecycleInterceptor + Any> ExternalDescriptor<I> {
    pub fn global(self) -> Self {
        self.capability(cast_global::<I>)
    }
}

impl<I: Any + Send + Sync> Declaration for ExternalDescriptor<I> {
    fn role(&self) -> BinderKind {
        BinderKind::External
    }

    fn implementation(&self) -> TypeKey {
        TypeKey::of::<I>()
    }

    fn into_binders(self: Box<Self>, _context: &BinderContext) -> Result<Vec<Arc<dyn Binder>>> {
        let implementation = shorten_type_name(type_name::<I>());
        let exposed = interfaces_only(&implementation, self.exposed, |(key, _)| key);
        Ok(vec![Arc::new(ExternalBinder::new(TypeKey::of::<I>(), exposed))])
    }
}

impl<I> fmt::Debug for ExternalDescriptor<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalDescriptor")
            .field("implementation", &type_name::<I>())
            .field("exposed", &self.exposed.iter().map(|(key, _)| key).collect::<Vec<_>>())
            .finish()
    }
}
