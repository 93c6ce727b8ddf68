//! Entity assembly: the construct, inject, initialize sequence shared by
//! every container-created instance, and the once-only cell that guards
//! stateful binders.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rabt_support::rendering::shorten_type_name;
use tracing::{debug, trace, warn};

use crate::binder::{BinderContext, ErasedInstance, erase};
use crate::dependency::Dependency;
use crate::error::{BoxError, RabtError, Result};
use crate::injector::{InjectionPlan, Injector};
use crate::interception::{Entity, EventPipeline, Interceptable, Intercepted};
use crate::key::TypeKey;
use crate::kind::LifecycleState;
use crate::locator::ContainerLocator;

/// Implicit init contract, run after injection.
pub trait Initializable {
    fn initialize(&mut self) -> std::result::Result<(), BoxError>;
}

/// Implicit dispose contract, run when the owning binder stops.
pub trait Disposable {
    fn dispose(&self) -> std::result::Result<(), BoxError>;
}

type Constructor<I> = Box<dyn Fn() -> std::result::Result<I, BoxError> + Send + Sync>;
type InitHook<I> = Box<dyn Fn(&mut I) -> std::result::Result<(), BoxError> + Send + Sync>;
type DisposeHook<I> = Box<dyn Fn(&I) -> std::result::Result<(), BoxError> + Send + Sync>;
type LocatorHook<I> = Box<dyn Fn(&mut I, ContainerLocator) + Send + Sync>;
type InjectorHook<I> = Box<dyn Fn(&mut I, Injector) + Send + Sync>;
type Wrap<I> = Box<dyn Fn(Arc<I>, &Arc<EventPipeline>) -> ErasedInstance + Send + Sync>;

// ============================================================
// Recipe: the builder side
// ============================================================

/// Everything a declaration collects about how to make an `I`.
///
/// Hooks are only counted here; [`Recipe::validate`] turns the recipe
/// into a [`Blueprint`] and rejects conflicting declarations.
pub(crate) struct Recipe<I> {
    construct: Constructor<I>,
    pub plan: InjectionPlan<I>,
    init: Vec<InitHook<I>>,
    dispose: Vec<DisposeHook<I>>,
    locator_hooks: Vec<LocatorHook<I>>,
    injector_hooks: Vec<InjectorHook<I>>,
}

impl<I: Any + Send + Sync> Recipe<I> {
    pub fn new<F>(construct: F) -> Self
    where
        F: Fn() -> std::result::Result<I, BoxError> + Send + Sync + 'static,
    {
        Self {
            construct: Box::new(construct),
            plan: InjectionPlan::new(),
            init: Vec::new(),
            dispose: Vec::new(),
            locator_hooks: Vec::new(),
            injector_hooks: Vec::new(),
        }
    }

    pub fn init_with<F>(&mut self, hook: F)
    where
        F: Fn(&mut I) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.init.push(Box::new(hook));
    }

    pub fn dispose_with<F>(&mut self, hook: F)
    where
        F: Fn(&I) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.dispose.push(Box::new(hook));
    }

    pub fn with_locator<F>(&mut self, hook: F)
    where
        F: Fn(&mut I, ContainerLocator) + Send + Sync + 'static,
    {
        self.locator_hooks.push(Box::new(hook));
    }

    pub fn with_injector<F>(&mut self, hook: F)
    where
        F: Fn(&mut I, Injector) + Send + Sync + 'static,
    {
        self.injector_hooks.push(Box::new(hook));
    }

    /// Checks the hooks and freezes the recipe.
    ///
    /// # Errors
    /// [`RabtError::ConflictingHooks`] when more than one init or dispose
    /// hook is declared. The implicit contracts count as hooks.
    pub fn validate(self) -> Result<Blueprint<I>> {
        let implementation = shorten_type_name(type_name::<I>());
        let init = single(self.init, &implementation, "init")?;
        let dispose = single(self.dispose, &implementation, "dispose")?;

        Ok(Blueprint {
            implementation,
            construct: self.construct,
            dependencies: self.plan.dependencies(),
            plan: self.plan,
            init,
            dispose,
            locator_hooks: self.locator_hooks,
            injector_hooks: self.injector_hooks,
        })
    }
}

impl<I: Any + Send + Sync + Default> Recipe<I> {
    pub fn default_constructed() -> Self {
        Self::new(|| Ok(I::default()))
    }
}

impl<I: Any + Send + Sync + Initializable> Recipe<I> {
    pub fn initializable(&mut self) {
        self.init_with(I::initialize);
    }
}

impl<I: Any + Send + Sync + Disposable> Recipe<I> {
    pub fn disposable(&mut self) {
        self.dispose_with(I::dispose);
    }
}

fn single<H>(mut hooks: Vec<H>, implementation: &str, hook: &'static str) -> Result<Option<H>> {
    if hooks.len() > 1 {
        return Err(RabtError::ConflictingHooks {
            implementation: implementation.to_string(),
            hook,
            count: hooks.len(),
        });
    }
    Ok(hooks.pop())
}

// ============================================================
// Blueprint: the validated recipe
// ============================================================

/// A validated recipe: knows how to assemble and dispose an `I`.
pub(crate) struct Blueprint<I> {
    implementation: String,
    construct: Constructor<I>,
    plan: InjectionPlan<I>,
    dependencies: Vec<Dependency>,
    init: Option<InitHook<I>>,
    dispose: Option<DisposeHook<I>>,
    locator_hooks: Vec<LocatorHook<I>>,
    injector_hooks: Vec<InjectorHook<I>>,
}

impl<I: Any + Send + Sync> Blueprint<I> {
    /// Short name of the implementation type, for errors and logs.
    pub fn implementation(&self) -> &str {
        &self.implementation
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Runs the full assembly sequence.
    ///
    /// construct → created → configure → awareness hooks → wire →
    /// injected → init hook → initialized. `track` sees every state change.
    pub fn assemble(&self, context: &BinderContext, track: &dyn Fn(LifecycleState)) -> Result<Arc<I>> {
        trace!(implementation = %self.implementation, "Assembling");
        let pipeline = context.pipeline();

        let mut instance = (self.construct)().map_err(|source| RabtError::ConstructionFailed {
            implementation: self.implementation.clone(),
            source,
        })?;
        track(LifecycleState::Created);
        pipeline.after_creation(&Entity::of(&instance));

        let injector = context.injector();
        injector.configure(&mut instance, &self.plan)?;
        for hook in &self.locator_hooks {
            hook(&mut instance, context.locator());
        }
        for hook in &self.injector_hooks {
            hook(&mut instance, context.injector());
        }
        injector.wire(&mut instance, &self.plan)?;
        track(LifecycleState::Injected);
        pipeline.after_injection(&Entity::of(&instance));

        if let Some(init) = &self.init {
            init(&mut instance).map_err(|source| RabtError::HookFailed {
                implementation: self.implementation.clone(),
                hook: "init",
                source,
            })?;
        }
        track(LifecycleState::Initialized);
        pipeline.after_initialization(&Entity::of(&instance));

        Ok(Arc::new(instance))
    }

    /// Runs the dispose hook, if any.
    pub fn dispose(&self, instance: &I) -> Result<()> {
        let Some(dispose) = &self.dispose else {
            return Ok(());
        };
        dispose(instance).map_err(|source| RabtError::HookFailed {
            implementation: self.implementation.clone(),
            hook: "dispose",
            source,
        })
    }
}

impl<I> fmt::Debug for Blueprint<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blueprint")
            .field("implementation", &self.implementation)
            .field("dependencies", &self.dependencies)
            .field("init", &self.init.is_some())
            .field("dispose", &self.dispose.is_some())
            .finish()
    }
}

// ============================================================
// Managed: a blueprint plus its single instance
// ============================================================

/// The stateful half of singletons, provider groups and interceptors.
///
/// The instance is assembled at most once; concurrent first callers block
/// until it is ready and then share it.
pub(crate) struct Managed<I> {
    blueprint: Blueprint<I>,
    context: BinderContext,
    cell: OnceCell<Arc<I>>,
    state: Mutex<LifecycleState>,
}

impl<I: Any + Send + Sync> Managed<I> {
    pub fn new(blueprint: Blueprint<I>, context: BinderContext) -> Self {
        Self {
            blueprint,
            context,
            cell: OnceCell::new(),
            state: Mutex::new(LifecycleState::Uncreated),
        }
    }

    pub fn blueprint(&self) -> &Blueprint<I> {
        &self.blueprint
    }

    pub fn context(&self) -> &BinderContext {
        &self.context
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// The instance, assembled on first call.
    pub fn get(&self) -> Result<Arc<I>> {
        self.cell
            .get_or_try_init(|| {
                let instance = self
                    .blueprint
                    .assemble(&self.context, &|state: LifecycleState| *self.state.lock() = state)?;
                *self.state.lock() = LifecycleState::Ready;
                debug!(implementation = %self.blueprint.implementation(), "Instance ready");
                Ok(instance)
            })
            .cloned()
    }

    /// Disposes the instance if it was ever made ready. Later calls are no-ops.
    pub fn dispose(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                LifecycleState::Ready => *state = LifecycleState::Disposing,
                LifecycleState::Disposing | LifecycleState::Disposed => return Ok(()),
                other => {
                    trace!(
                        implementation = %self.blueprint.implementation(),
                        state = %other,
                        "Never made ready, nothing to dispose"
                    );
                    *state = LifecycleState::Disposed;
                    return Ok(());
                }
            }
        }

        let Some(instance) = self.cell.get() else {
            *self.state.lock() = LifecycleState::Disposed;
            return Ok(());
        };
        let pipeline = self.context.pipeline();
        let entity = Entity::of(&**instance);

        pipeline.before_disposal(&entity);
        let outcome = self.blueprint.dispose(instance);
        if let Err(err) = &outcome {
            warn!(implementation = %self.blueprint.implementation(), error = %err, "Dispose hook failed");
        }
        *self.state.lock() = LifecycleState::Disposed;
        pipeline.after_disposal(&entity);
        outcome
    }
}

impl<I> fmt::Debug for Managed<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed")
            .field("blueprint", &self.blueprint)
            .field("state", &*self.state.lock())
            .finish()
    }
}

// ============================================================
// Capability bindings
// ============================================================

/// How an `I` is exposed as one capability: cast, then wrap.
pub(crate) struct CapabilityBinding<I> {
    key: TypeKey,
    wrap: Wrap<I>,
}

impl<I: Any + Send + Sync> CapabilityBinding<I> {
    pub fn new<T: ?Sized + Interceptable>(cast: fn(Arc<I>) -> Arc<T>) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            wrap: Box::new(move |instance: Arc<I>, pipeline: &Arc<EventPipeline>| {
                let target = cast(Arc::clone(&instance));
                erase(T::intercept(Intercepted::new(
                    target,
                    instance,
                    TypeKey::of::<I>(),
                    Arc::clone(pipeline),
                )))
            }),
        }
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    /// The interception wrapper of `instance` for this capability.
    pub fn wrap(&self, instance: Arc<I>, pipeline: &Arc<EventPipeline>) -> ErasedInstance {
        (self.wrap)(instance, pipeline)
    }
}

impl<I> fmt::Debug for CapabilityBinding<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapabilityBinding({})", self.key)
    }
}

/// Drops capabilities that are not interfaces, with a warning.
pub(crate) fn interfaces_only<C>(implementation: &str, items: Vec<C>, key: impl Fn(&C) -> &TypeKey) -> Vec<C> {
    items
        .into_iter()
        .filter(|item| {
            let capability = key(item);
            if capability.is_interface() {
                return true;
            }
            warn!(
                implementation,
                capability = %capability,
                "Skipping capability that is not an interface"
            );
            false
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerState;
    use crate::interception::fixtures::{English, Greeter};
    use crate::interception::{InterceptorChain, LifecycleInterceptor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Default, Debug)]
    struct Pool {
        size: usize,
        opened: bool,
    }

    impl Initializable for Pool {
        fn initialize(&mut self) -> std::result::Result<(), BoxError> {
            if self.size == 0 {
                return Err("pool size must be positive".into());
            }
            self.opened = true;
            Ok(())
        }
    }

    impl Disposable for Pool {
        fn dispose(&self) -> std::result::Result<(), BoxError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Journal(parking_lot::Mutex<Vec<String>>);

    impl LifecycleInterceptor for Journal {
        fn after_creation(&self, entity: &Entity<'_>) {
            self.0.lock().push(format!("created {}", entity.type_key().short_name()));
        }
        fn after_injection(&self, _entity: &Entity<'_>) {
            self.0.lock().push("injected".into());
        }
        fn after_initialization(&self, entity: &Entity<'_>) {
            let opened = entity.downcast_ref::<Pool>().is_some_and(|p| p.opened);
            self.0.lock().push(format!("initialized opened={opened}"));
        }
        fn before_disposal(&self, _entity: &Entity<'_>) {
            self.0.lock().push("disposing".into());
        }
        fn after_disposal(&self, _entity: &Entity<'_>) {
            self.0.lock().push("disposed".into());
        }
    }

    fn untracked(_: LifecycleState) {}

    fn same(key: &TypeKey) -> &TypeKey {
        key
    }

    fn context(state: &Arc<ContainerState>) -> BinderContext {
        BinderContext::new(Arc::downgrade(state), Arc::clone(&state.pipeline))
    }

    #[test]
    fn two_init_hooks_conflict() {
        let mut recipe = Recipe::<Pool>::default_constructed();
        recipe.initializable();
        recipe.init_with(|_| Ok(()));

        match recipe.validate().unwrap_err() {
            RabtError::ConflictingHooks { hook, count, implementation } => {
                assert_eq!(hook, "init");
                assert_eq!(count, 2);
                assert_eq!(implementation, "Pool");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn two_dispose_hooks_conflict() {
        let mut recipe = Recipe::<Pool>::default_constructed();
        recipe.disposable();
        recipe.dispose_with(|_| Ok(()));

        assert!(matches!(
            recipe.validate(),
            Err(RabtError::ConflictingHooks { hook: "dispose", .. })
        ));
    }

    #[test]
    fn assembly_reports_each_stage() {
        let state = ContainerState::detached();
        let journal = Arc::new(Journal::default());
        state.pipeline.arm(InterceptorChain { lifecycle: vec![journal.clone()], method: vec![] });

        let mut recipe = Recipe::new(|| Ok(Pool { size: 4, opened: false }));
        recipe.initializable();
        let blueprint = recipe.validate().unwrap();

        let seen = parking_lot::Mutex::new(Vec::new());
        let pool = blueprint
            .assemble(&context(&state), &|s: LifecycleState| seen.lock().push(s))
            .unwrap();

        assert!(pool.opened);
        assert_eq!(
            *seen.lock(),
            vec![LifecycleState::Created, LifecycleState::Injected, LifecycleState::Initialized]
        );
        assert_eq!(
            *journal.0.lock(),
            vec!["created Pool", "injected", "initialized opened=true"]
        );
    }

    #[test]
    fn failures_name_the_implementation() {
        let state = ContainerState::detached();

        let broken = Recipe::<Pool>::new(|| Err("no socket".into())).validate().unwrap();
        let err = broken.assemble(&context(&state), &untracked).unwrap_err();
        assert!(matches!(err, RabtError::ConstructionFailed { ref implementation, .. } if implementation == "Pool"));

        let mut empty = Recipe::<Pool>::default_constructed();
        empty.initializable();
        let err = empty.validate().unwrap().assemble(&context(&state), &untracked).unwrap_err();
        assert!(matches!(err, RabtError::HookFailed { hook: "init", .. }));
    }

    #[test]
    fn awareness_hooks_receive_handles() {
        let state = ContainerState::detached();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut recipe = Recipe::<Pool>::default_constructed();
        let seen = Arc::clone(&calls);
        recipe.with_locator(move |_, _locator| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let seen = Arc::clone(&calls);
        recipe.with_injector(move |_, _injector| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        recipe.validate().unwrap().assemble(&context(&state), &untracked).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn managed_instance_is_assembled_once_under_contention() {
        let state = ContainerState::detached();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let recipe = Recipe::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(5));
            Ok(Pool { size: 1, opened: false })
        });
        let managed = Managed::new(recipe.validate().unwrap(), context(&state));

        let instances: Vec<Arc<Pool>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| managed.get().unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(managed.state(), LifecycleState::Ready);
    }

    #[test]
    fn dispose_runs_once_and_only_when_ready() {
        let state = ContainerState::detached();
        let journal = Arc::new(Journal::default());
        state.pipeline.arm(InterceptorChain { lifecycle: vec![journal.clone()], method: vec![] });
        let disposed = Arc::new(AtomicUsize::new(0));

        let make = |disposed: &Arc<AtomicUsize>| {
            let mut recipe = Recipe::<Pool>::default_constructed();
            let counter = Arc::clone(disposed);
            recipe.dispose_with(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Managed::new(recipe.validate().unwrap(), context(&state))
        };

        let never_created = make(&disposed);
        never_created.dispose().unwrap();
        assert_eq!(never_created.state(), LifecycleState::Disposed);
        assert_eq!(disposed.load(Ordering::SeqCst), 0);

        let created = make(&disposed);
        created.get().unwrap();
        created.dispose().unwrap();
        created.dispose().unwrap();
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert_eq!(created.state(), LifecycleState::Disposed);
        assert!(journal.0.lock().ends_with(&["disposing".to_string(), "disposed".to_string()]));
    }

    #[test]
    fn capability_binding_wraps_for_interception() {
        let pipeline = Arc::new(EventPipeline::new());
        let binding = CapabilityBinding::<English>::new::<dyn Greeter>(|e| e);

        let erased = binding.wrap(Arc::new(English), &pipeline);
        let greeter = crate::binder::unerase::<dyn Greeter>(&erased).unwrap();
        assert_eq!(greeter.greet("Ada").unwrap(), "Hello, Ada");
        assert_eq!(binding.key(), &TypeKey::of::<dyn Greeter>());
    }

    #[test]
    fn non_interfaces_are_dropped() {
        let kept = interfaces_only(
            "Pool",
            vec![TypeKey::of::<dyn Greeter>(), TypeKey::of::<String>()],
            same,
        );
        assert_eq!(kept, vec![TypeKey::of::<dyn Greeter>()]);
    }
}
