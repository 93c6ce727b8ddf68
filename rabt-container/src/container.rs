//! # The Container: heart of rabt
//!
//! Registers binders, validates and orders them, then drives their
//! lifecycle in two stages.
//!
//! # Architecture
//! ```text
//! ContainerBuilder ──build()──> Container ──start()──> running ──stop()──> stopped
//!   declarations                  registry       stage 1: externals, interceptors, providers
//!   discoveries                                  pipeline armed
//!   chained locators                             stage 2: singletons, prototypes
//! ```
//!
//! # Examples
//! ```rust,ignore
//! use rabt_container::prelude::*;
//!
//! let container = Container::builder()
//!     .configure(Arc::new(MemoryConfig::new().with("smtp.host", "mail.local".to_string())))
//!     .declare(EntityDescriptor::<SmtpMailer>::singleton_default().capability::<dyn Mailer>(|m| m))
//!     .build()?;
//!
//! container.start()?;
//! let mailer = container.locator().get::<dyn Mailer>()?;
//! container.stop()?;
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rabt_support::rendering::render_plan;
use tracing::{debug, info, instrument, warn};

use crate::binder::{Binder, BinderContext, unerase};
use crate::config::ConfigurationProvider;
use crate::descriptor::{Declaration, ExternalDescriptor};
use crate::discovery::{DeclarationSink, Discovery};
use crate::error::{RabtError, Result};
use crate::graph::{DependencyGraph, StartupOrder};
use crate::injector::Injector;
use crate::interception::{
    EventPipeline, GlobalLifecycleInterceptor, InterceptorChain, LifecycleInterceptor, MethodInterceptor,
};
use crate::key::TypeKey;
use crate::locator::{ContainerLocator, Locator};
use crate::registry::Registry;

// ============================================================
// Shared state
// ============================================================

/// What binders, locators and injectors share with their container.
pub(crate) struct ContainerState {
    pub(crate) registry: RwLock<Registry>,
    pub(crate) config: Vec<Arc<dyn ConfigurationProvider>>,
    pub(crate) pipeline: Arc<EventPipeline>,
}

#[cfg(test)]
impl ContainerState {
    /// State with no binders and no configuration.
    pub(crate) fn detached() -> Arc<Self> {
        Self::configured(Vec::new())
    }

    pub(crate) fn configured(config: Vec<Arc<dyn ConfigurationProvider>>) -> Arc<Self> {
        Arc::new(Self {
            registry: RwLock::new(Registry::new()),
            config,
            pipeline: Arc::new(EventPipeline::new()),
        })
    }
}

// ============================================================
// ContainerBuilder
// ============================================================

/// Collects declarations, configuration and chained locators.
///
/// Declarations may come from anywhere: added one by one, or handed over
/// by a [`Discovery`]. [`build()`](ContainerBuilder::build) turns them into
/// registered binders; nothing is instantiated until the container starts.
#[derive(Default)]
pub struct ContainerBuilder {
    config: Vec<Arc<dyn ConfigurationProvider>>,
    declarations: Vec<Box<dyn Declaration>>,
    chained: Vec<Arc<dyn Locator>>,
}

impl ContainerBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Adds a configuration provider. Earlier providers win.
    pub fn configure(mut self, provider: Arc<dyn ConfigurationProvider>) -> Self {
        debug!(provider = provider.name(), "Configuration provider added");
        self.config.push(provider);
        self
    }

    /// Adds a declaration.
    pub fn declare(mut self, declaration: impl Declaration + 'static) -> Self {
        self.declare_boxed(Box::new(declaration));
        self
    }

    /// Adds everything `discovery` finds.
    pub fn discover(mut self, discovery: &dyn Discovery) -> Self {
        let before = self.declarations.len();
        discovery.discover(&mut self);
        debug!(
            discovery = discovery.name(),
            found = self.declarations.len() - before,
            "Discovery finished"
        );
        self
    }

    /// Adds an instance owned by the application.
    pub fn external<I>(self, descriptor: ExternalDescriptor<I>) -> Self
    where
        I: Send + Sync + 'static,
    {
        self.declare(descriptor)
    }

    /// Adds an application-owned method interceptor.
    ///
    /// To serve several contracts with one instance, declare it once with
    /// [`ExternalDescriptor`] instead.
    pub fn intercept_methods<I: MethodInterceptor + 'static>(self, interceptor: Arc<I>) -> Self {
        self.external(ExternalDescriptor::new(interceptor).method())
    }

    /// Adds an application-owned lifecycle interceptor.
    pub fn intercept_lifecycle<I: LifecycleInterceptor + 'static>(self, interceptor: Arc<I>) -> Self {
        self.external(ExternalDescriptor::new(interceptor).lifecycle())
    }

    /// Adds an application-owned global lifecycle interceptor.
    pub fn intercept_global<I: GlobalLifecycleInterceptor + 'static>(self, interceptor: Arc<I>) -> Self {
        self.external(ExternalDescriptor::new(interceptor).global())
    }

    /// Adds a fallback locator for lookups no local binder answers.
    pub fn chain(mut self, locator: Arc<dyn Locator>) -> Self {
        self.chained.push(locator);
        self
    }

    /// Creates and registers every binder.
    ///
    /// Declarations register by role: externals, interceptors, providers,
    /// singletons, prototypes. Duplicate names and binders are logged and
    /// skipped.
    ///
    /// # Errors
    /// The first invalid declaration: conflicting hooks or duplicate
    /// productions.
    #[instrument(skip(self), name = "container_build")]
    pub fn build(self) -> Result<Container> {
        let Self { config, mut declarations, chained } = self;
        info!(declarations = declarations.len(), "Building container");

        declarations.sort_by_key(|declaration| declaration.role());

        let pipeline = Arc::new(EventPipeline::new());
        let mut failure = None;
        let state = Arc::new_cyclic(|weak| {
            let context = BinderContext::new(weak.clone(), Arc::clone(&pipeline));
            let mut registry = Registry::new();

            for declaration in declarations {
                let implementation = declaration.implementation();
                match declaration.into_binders(&context) {
                    Ok(binders) => {
                        for binder in binders {
                            // rejections are logged by the registry
                            let _ = registry.register(binder);
                        }
                    }
                    Err(err) => {
                        warn!(implementation = %implementation, error = %err, "Invalid declaration");
                        failure = Some(err);
                        break;
                    }
                }
            }
            for locator in chained {
                registry.chain(locator);
            }

            ContainerState {
                registry: RwLock::new(registry),
                config,
                pipeline,
            }
        });

        if let Some(err) = failure {
            return Err(err);
        }

        info!(binders = state.registry.read().len(), "Container built ✓");
        Ok(Container {
            state,
            phase: Mutex::new(Phase::Built),
        })
    }
}

impl DeclarationSink for ContainerBuilder {
    fn declare_boxed(&mut self, declaration: Box<dyn Declaration>) {
        self.declarations.push(declaration);
    }
}

impl fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("declarations", &self.declarations.len())
            .field("config", &self.config.len())
            .field("chained", &self.chained.len())
            .finish()
    }
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

enum Phase {
    Built,
    Starting,
    Running {
        order: StartupOrder,
        globals: Vec<Arc<dyn GlobalLifecycleInterceptor>>,
    },
    Stopping,
    Stopped,
    Aborted,
}

impl Phase {
    fn label(&self) -> &'static str {
        match self {
            Phase::Built => "not started",
            Phase::Starting => "starting",
            Phase::Running { .. } => "running",
            Phase::Stopping => "stopping",
            Phase::Stopped => "stopped",
            Phase::Aborted => "aborted",
        }
    }
}

/// A dependency-injection and lifecycle container.
///
/// Created by [`ContainerBuilder::build()`]. Starts once and stops once;
/// dropping a running container stops it.
pub struct Container {
    state: Arc<ContainerState>,
    phase: Mutex<Phase>,
}

impl Container {
    /// Create a new builder.
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// Validates the binder graph and starts every binder.
    ///
    /// Stage 1 (externals, interceptors, providers and what they depend on)
    /// starts first, then interception is armed, then stage 2 starts.
    /// Global interceptors hear `after_start` last, once the container
    /// reports itself running.
    ///
    /// The phase lock is not held while binders and interceptors run, so
    /// they may query the container; a nested `start` or `stop` fails with
    /// [`RabtError::InvalidPhase`].
    ///
    /// # Errors
    /// - [`RabtError::InvalidPhase`] unless the container was just built
    /// - [`RabtError::Unresolved`] or [`RabtError::CircularDependency`]:
    ///   nothing was started and `start` may be retried, e.g. after
    ///   [`attach_locator`](Container::attach_locator)
    /// - any binder start failure: the binders already started are
    ///   stopped again and disposed of. The container is left aborted and
    ///   every later `start` is rejected; build a new container from the
    ///   same declarations to start over.
    #[instrument(skip(self), name = "container_start")]
    pub fn start(&self) -> Result<()> {
        {
            let mut phase = self.phase.lock();
            if !matches!(*phase, Phase::Built) {
                return Err(RabtError::InvalidPhase {
                    operation: "start",
                    phase: phase.label(),
                });
            }
            *phase = Phase::Starting;
        }

        let order = match self.plan() {
            Ok(order) => order,
            Err(err) => {
                *self.phase.lock() = Phase::Built;
                return Err(err);
            }
        };

        let mut started: Vec<Arc<dyn Binder>> = Vec::with_capacity(order.len());
        if let Err(err) = self.start_binders(order.stage1(), &mut started) {
            self.abort_start(started);
            return Err(err);
        }
        debug!(binders = order.stage1().len(), "Stage 1 binders started");

        self.state.pipeline.arm(interceptor_chain(order.stage1()));
        let globals = collect::<dyn GlobalLifecycleInterceptor>(order.stage1());

        if let Err(err) = self.start_binders(order.stage2(), &mut started) {
            self.abort_start(started);
            return Err(err);
        }
        debug!(binders = order.stage2().len(), "Stage 2 binders started");

        *self.phase.lock() = Phase::Running {
            order,
            globals: globals.clone(),
        };
        for global in &globals {
            global.after_start();
        }

        info!("Container started ✓");
        Ok(())
    }

    /// Validates a snapshot of the registry and orders its binders.
    fn plan(&self) -> Result<StartupOrder> {
        let snapshot = self.state.registry.read().clone();
        info!(binders = snapshot.len(), "Starting container");

        let graph = DependencyGraph::build(snapshot)?;
        graph.check_cycles()?;
        let order = graph.order();
        debug!("Startup plan:\n{}", render_plan(&order.plan()));
        Ok(order)
    }

    fn start_binders(&self, binders: &[Arc<dyn Binder>], started: &mut Vec<Arc<dyn Binder>>) -> Result<()> {
        for binder in binders {
            debug!(binder = %binder.id(), "Starting binder");
            binder.start()?;
            started.push(Arc::clone(binder));
        }
        Ok(())
    }

    fn abort_start(&self, started: Vec<Arc<dyn Binder>>) {
        warn!(started = started.len(), "Container start failed, stopping started binders");
        for binder in started.iter().rev() {
            if let Err(err) = binder.stop() {
                warn!(binder = %binder.id(), error = %err, "Failed to stop binder");
            }
        }
        self.teardown();
        *self.phase.lock() = Phase::Aborted;
    }

    /// Stops every binder, stage 2 before stage 1, each stage in reverse
    /// start order.
    ///
    /// Failing binders do not stop the teardown; the first failure is
    /// returned once everything has been stopped.
    ///
    /// # Errors
    /// [`RabtError::InvalidPhase`] unless the container is running.
    #[instrument(skip(self), name = "container_stop")]
    pub fn stop(&self) -> Result<()> {
        let (order, globals) = {
            let mut phase = self.phase.lock();
            match std::mem::replace(&mut *phase, Phase::Stopping) {
                Phase::Running { order, globals } => (order, globals),
                other => {
                    let label = other.label();
                    *phase = other;
                    return Err(RabtError::InvalidPhase {
                        operation: "stop",
                        phase: label,
                    });
                }
            }
        };
        info!(binders = order.len(), "Stopping container");

        for global in &globals {
            global.before_stop();
        }

        let mut first_failure = None;
        for binder in order.stage2().iter().rev().chain(order.stage1().iter().rev()) {
            debug!(binder = %binder.id(), "Stopping binder");
            if let Err(err) = binder.stop() {
                warn!(binder = %binder.id(), error = %err, "Failed to stop binder");
                first_failure.get_or_insert(err);
            }
        }

        self.teardown();
        *self.phase.lock() = Phase::Stopped;
        info!("Container stopped");
        first_failure.map_or(Ok(()), Err)
    }

    fn teardown(&self) {
        self.state.pipeline.disarm();
        self.state.registry.write().clear();
    }

    /// Returns `true` between a successful `start` and `stop`.
    pub fn is_started(&self) -> bool {
        matches!(*self.phase.lock(), Phase::Running { .. })
    }

    /// A locator over this container.
    pub fn locator(&self) -> ContainerLocator {
        ContainerLocator::new(Arc::downgrade(&self.state))
    }

    /// An injector over this container, for objects it does not manage.
    pub fn injector(&self) -> Injector {
        Injector::new(Arc::downgrade(&self.state))
    }

    /// Adds a fallback locator after the container was built.
    pub fn attach_locator(&self, locator: Arc<dyn Locator>) {
        self.state.registry.write().chain(locator);
    }

    /// The order binders were started in, while running.
    pub fn startup_order(&self) -> Option<StartupOrder> {
        match &*self.phase.lock() {
            Phase::Running { order, .. } => Some(order.clone()),
            _ => None,
        }
    }

    /// Number of registered binders.
    pub fn len(&self) -> usize {
        self.state.registry.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if self.is_started() {
            if let Err(err) = self.stop() {
                warn!(error = %err, "Container stopped with errors on drop");
            }
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("phase", &self.phase.lock().label())
            .field("registry", &*self.state.registry.read())
            .field("pipeline", &self.state.pipeline)
            .finish()
    }
}

// ═══════════════════════════════════════════
// Interceptor collection
// ═══════════════════════════════════════════

/// Every instance of contract `T` served by `binders`, in start order.
fn collect<T: ?Sized + 'static>(binders: &[Arc<dyn Binder>]) -> Vec<Arc<T>> {
    let contract = TypeKey::of::<T>();
    binders
        .iter()
        .filter(|binder| binder.kind().serves_interceptors() && binder.capabilities().contains(&contract))
        .filter_map(|binder| match binder.instance(&contract) {
            Ok(found) => found.and_then(|erased| unerase::<T>(&erased)),
            Err(err) => {
                warn!(binder = %binder.id(), error = %err, "Interceptor unavailable");
                None
            }
        })
        .collect()
}

fn interceptor_chain(binders: &[Arc<dyn Binder>]) -> InterceptorChain {
    InterceptorChain {
        lifecycle: collect::<dyn LifecycleInterceptor>(binders),
        method: collect::<dyn MethodInterceptor>(binders),
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{Container, ContainerBuilder};
    pub use crate::binder::assembly::{Disposable, Initializable};
    pub use crate::config::{ConfigurationProvider, MemoryConfig};
    pub use crate::descriptor::{
        Declaration, EntityDescriptor, ExternalDescriptor, InterceptorDescriptor, ProviderDescriptor,
    };
    pub use crate::discovery::{DeclarationSink, Discovered, Discovery, InventoryDiscovery};
    pub use crate::error::{BoxError, InvocationError, RabtError};
    pub use crate::injector::{Configure, Inject, Injector};
    pub use crate::interception::{
        Entity, GlobalLifecycleInterceptor, Interceptable, Intercepted, LifecycleInterceptor, MethodCall,
        MethodInterceptor,
    };
    pub use crate::key::TypeKey;
    pub use crate::locator::{ContainerLocator, Locator, LocatorExt};
    pub use std::sync::Arc;
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::ErasedInstance;
    use crate::descriptor::{EntityDescriptor, InterceptorDescriptor};
    use crate::error::{BoxError, InvocationError};
    use crate::injector::Inject;
    use crate::interception::fixtures::{English, Greeter};
    use crate::interception::{Entity, Interceptable, Intercepted, MethodCall};
    use crate::kind::{BinderKind, Stage};
    use crate::locator::LocatorExt;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    trait Roster: Send + Sync {
        fn names(&self) -> std::result::Result<Vec<String>, InvocationError>;
    }

    struct RosterWrapper(Intercepted<dyn Roster>);

    impl Roster for RosterWrapper {
        fn names(&self) -> std::result::Result<Vec<String>, InvocationError> {
            self.0.invoke("names", (), |target, ()| target.names())
        }
    }

    impl Interceptable for dyn Roster {
        fn intercept(core: Intercepted<Self>) -> Arc<Self> {
            Arc::new(RosterWrapper(core))
        }
    }

    #[derive(Default)]
    struct Guests {
        greeter: Option<Arc<dyn Greeter>>,
    }

    impl Roster for Guests {
        fn names(&self) -> std::result::Result<Vec<String>, InvocationError> {
            match &self.greeter {
                Some(greeter) => Ok(vec![greeter.greet("Ada")?]),
                None => Ok(Vec::new()),
            }
        }
    }

    type Journal = Arc<Mutex<Vec<&'static str>>>;

    fn greeter(journal: &Journal) -> EntityDescriptor<English> {
        let journal = Arc::clone(journal);
        EntityDescriptor::<English>::singleton_default()
            .capability::<dyn Greeter>(|e| e)
            .dispose_with(move |_| {
                journal.lock().push("greeter");
                Ok(())
            })
    }

    fn guests(journal: &Journal) -> EntityDescriptor<Guests> {
        let journal = Arc::clone(journal);
        EntityDescriptor::<Guests>::singleton_default()
            .capability::<dyn Roster>(|g| g)
            .inject(Inject::required(|g: &mut Guests, greeter: Arc<dyn Greeter>| {
                g.greeter = Some(greeter)
            }))
            .dispose_with(move |_| {
                journal.lock().push("guests");
                Ok(())
            })
    }

    #[derive(Default)]
    struct CallCounter {
        before: AtomicUsize,
        created: AtomicUsize,
    }

    impl MethodInterceptor for CallCounter {
        fn before(&self, _call: &MethodCall<'_>, _args: &dyn fmt::Debug) {
            self.before.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl LifecycleInterceptor for CallCounter {
        fn after_creation(&self, _entity: &Entity<'_>) {
            self.created.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fallback(Arc<dyn Greeter>);

    impl Locator for Fallback {
        fn lookup(&self, capability: &TypeKey) -> Result<Option<ErasedInstance>> {
            Ok((capability == &TypeKey::of::<dyn Greeter>()).then(|| crate::binder::erase(Arc::clone(&self.0))))
        }

        fn lookup_named(&self, _name: &str, _capability: &TypeKey) -> Result<Option<ErasedInstance>> {
            Ok(None)
        }

        fn lookup_all(&self, capability: &TypeKey) -> Result<Vec<ErasedInstance>> {
            Ok(self.lookup(capability)?.into_iter().collect())
        }

        fn lookup_all_named(&self, _capability: &TypeKey) -> Result<HashMap<String, ErasedInstance>> {
            Ok(HashMap::new())
        }
    }

    #[test]
    fn start_locate_stop() {
        let journal = Journal::default();
        let container = Container::builder()
            .declare(guests(&journal))
            .declare(greeter(&journal))
            .build()
            .unwrap();
        assert!(!container.is_started());

        container.start().unwrap();
        assert!(container.is_started());

        let roster = container.locator().get::<dyn Roster>().unwrap().unwrap();
        assert_eq!(roster.names().unwrap(), vec!["Hello, Ada".to_string()]);

        container.stop().unwrap();
        assert!(!container.is_started());
        assert!(container.is_empty());
        assert!(container.locator().get::<dyn Roster>().unwrap().is_none());
    }

    #[test]
    fn dependencies_start_first_and_stop_last() {
        let journal = Journal::default();
        let container = Container::builder()
            .declare(guests(&journal))
            .declare(greeter(&journal))
            .build()
            .unwrap();
        container.start().unwrap();

        let order = container.startup_order().unwrap();
        let greeter_at = order.stage2().iter().position(|b| b.id().implementation() == &TypeKey::of::<English>());
        let guests_at = order.stage2().iter().position(|b| b.id().implementation() == &TypeKey::of::<Guests>());
        assert!(greeter_at < guests_at);

        container.stop().unwrap();
        assert_eq!(*journal.lock(), vec!["guests", "greeter"]);
    }

    #[test]
    fn start_and_stop_only_once() {
        let container = Container::builder().build().unwrap();
        assert!(matches!(
            container.stop(),
            Err(RabtError::InvalidPhase { operation: "stop", .. })
        ));

        container.start().unwrap();
        assert!(matches!(
            container.start(),
            Err(RabtError::InvalidPhase { operation: "start", phase: "running" })
        ));

        container.stop().unwrap();
        assert!(matches!(
            container.start(),
            Err(RabtError::InvalidPhase { phase: "stopped", .. })
        ));
    }

    #[test]
    fn unresolved_dependency_can_be_fixed_by_chaining() {
        let journal = Journal::default();
        let container = Container::builder().declare(guests(&journal)).build().unwrap();

        match container.start() {
            Err(RabtError::Unresolved(err)) => {
                assert_eq!(err.dependency.capability(), &TypeKey::of::<dyn Greeter>());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!container.is_started());

        container.attach_locator(Arc::new(Fallback(Arc::new(English))));
        container.start().unwrap();

        let roster = container.locator().get::<dyn Roster>().unwrap().unwrap();
        assert_eq!(roster.names().unwrap().len(), 1);
    }

    #[test]
    fn cycles_abort_start() {
        #[derive(Default)]
        struct Loop {
            _roster: Option<Arc<dyn Roster>>,
        }

        impl Greeter for Loop {
            fn greet(&self, name: &str) -> std::result::Result<String, InvocationError> {
                Ok(name.to_string())
            }
        }

        let journal = Journal::default();
        let container = Container::builder()
            .declare(guests(&journal))
            .declare(
                EntityDescriptor::<Loop>::singleton_default()
                    .capability::<dyn Greeter>(|l| l)
                    .inject(Inject::required(|l: &mut Loop, roster: Arc<dyn Roster>| l._roster = Some(roster))),
            )
            .build()
            .unwrap();

        assert!(matches!(container.start(), Err(RabtError::CircularDependency(_))));
        assert!(journal.lock().is_empty());
    }

    #[test]
    fn failed_start_stops_what_was_started() {
        let journal = Journal::default();
        let container = Container::builder()
            .declare(greeter(&journal))
            .declare(
                EntityDescriptor::<Guests>::singleton(|| Err::<Guests, BoxError>("no guest list".into()))
                    .capability::<dyn Roster>(|g| g)
                    .inject(Inject::required(|g: &mut Guests, greeter: Arc<dyn Greeter>| {
                        g.greeter = Some(greeter)
                    })),
            )
            .build()
            .unwrap();

        assert!(matches!(container.start(), Err(RabtError::ConstructionFailed { .. })));
        assert_eq!(*journal.lock(), vec!["greeter"]);
        assert!(!container.is_started());
        assert!(container.is_empty());
    }

    #[test]
    fn a_failed_start_is_retried_on_a_rebuilt_container() {
        let guest_list_ready = Arc::new(AtomicUsize::new(0));
        let declare = |journal: &Journal| {
            let ready = Arc::clone(&guest_list_ready);
            Container::builder()
                .declare(greeter(journal))
                .declare(
                    EntityDescriptor::<Guests>::singleton(move || match ready.load(Ordering::SeqCst) {
                        0 => Err::<Guests, BoxError>("no guest list".into()),
                        _ => Ok(Guests::default()),
                    })
                    .capability::<dyn Roster>(|g| g)
                    .inject(Inject::required(|g: &mut Guests, greeter: Arc<dyn Greeter>| {
                        g.greeter = Some(greeter)
                    })),
                )
                .build()
                .unwrap()
        };

        let journal = Journal::default();
        let failed = declare(&journal);
        assert!(failed.start().is_err());
        match failed.start() {
            Err(err @ RabtError::InvalidPhase { .. }) => {
                assert_eq!(err.to_string(), "Cannot start a container that is aborted");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        guest_list_ready.store(1, Ordering::SeqCst);
        let retried = declare(&journal);
        retried.start().unwrap();
        let roster = retried.locator().get::<dyn Roster>().unwrap().unwrap();
        assert_eq!(roster.names().unwrap(), vec!["Hello, Ada".to_string()]);
    }

    #[test]
    fn interceptors_see_application_binders_only() {
        let counter = Arc::new(CallCounter::default());
        let journal = Journal::default();
        let container = Container::builder()
            .external(ExternalDescriptor::new(Arc::clone(&counter)).method().lifecycle())
            .declare(greeter(&journal))
            .build()
            .unwrap();
        container.start().unwrap();

        assert_eq!(counter.created.load(Ordering::SeqCst), 1);

        let greeter = container.locator().get::<dyn Greeter>().unwrap().unwrap();
        greeter.greet("Grace").unwrap();
        greeter.greet("Linus").unwrap();
        assert_eq!(counter.before.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn container_interceptors_start_in_stage_one() {
        #[derive(Default)]
        struct Tally(AtomicUsize);

        impl MethodInterceptor for Tally {
            fn before(&self, _call: &MethodCall<'_>, _args: &dyn fmt::Debug) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let journal = Journal::default();
        let container = Container::builder()
            .declare(greeter(&journal))
            .declare(InterceptorDescriptor::<Tally>::default().method())
            .build()
            .unwrap();
        container.start().unwrap();

        let order = container.startup_order().unwrap();
        assert_eq!(order.stage1().len(), 1);
        assert_eq!(order.stage1()[0].kind(), BinderKind::Interceptor);
        assert_eq!(
            order.position(order.stage2()[0].id()),
            Some((Stage::Application, 0))
        );

        // container interceptors are not locatable
        assert!(container.locator().get::<dyn MethodInterceptor>().unwrap().is_none());
    }

    #[test]
    fn application_interceptors_are_not_locatable() {
        #[derive(Default)]
        struct Tally {
            before: AtomicUsize,
        }

        impl MethodInterceptor for Tally {
            fn before(&self, _call: &MethodCall<'_>, _args: &dyn fmt::Debug) {
                self.before.fetch_add(1, Ordering::SeqCst);
            }
        }

        let first = Arc::new(CallCounter::default());
        let second = Arc::new(Tally::default());
        let journal = Journal::default();
        let container = Container::builder()
            .external(ExternalDescriptor::new(Arc::clone(&first)).method().lifecycle())
            .intercept_methods(Arc::clone(&second))
            .declare(greeter(&journal))
            .build()
            .unwrap();
        container.start().unwrap();

        let locator = container.locator();
        assert!(locator.get::<dyn MethodInterceptor>().unwrap().is_none());
        assert!(locator.get_all::<dyn MethodInterceptor>().unwrap().is_empty());
        assert!(locator.get::<dyn LifecycleInterceptor>().unwrap().is_none());

        // both still sit in the pipeline
        locator.get::<dyn Greeter>().unwrap().unwrap().greet("Ada").unwrap();
        assert_eq!(first.before.load(Ordering::SeqCst), 1);
        assert_eq!(second.before.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn global_interceptors_bracket_the_running_phase() {
        #[derive(Default)]
        struct Bracket(Mutex<Vec<&'static str>>);

        impl GlobalLifecycleInterceptor for Bracket {
            fn after_start(&self) {
                self.0.lock().push("after_start");
            }

            fn before_stop(&self) {
                self.0.lock().push("before_stop");
            }
        }

        let bracket = Arc::new(Bracket::default());
        let container = Container::builder().intercept_global(Arc::clone(&bracket)).build().unwrap();

        container.start().unwrap();
        assert_eq!(*bracket.0.lock(), vec!["after_start"]);
        container.stop().unwrap();
        assert_eq!(*bracket.0.lock(), vec!["after_start", "before_stop"]);
    }

    #[test]
    fn callbacks_may_query_the_container() {
        #[derive(Default)]
        struct Watcher {
            container: once_cell::sync::OnceCell<std::sync::Weak<Container>>,
            seen: Mutex<Vec<String>>,
        }

        impl Watcher {
            fn note(&self, describe: impl FnOnce(&Container) -> String) {
                if let Some(container) = self.container.get().and_then(|weak| weak.upgrade()) {
                    self.seen.lock().push(describe(&container));
                }
            }
        }

        fn rejected(result: Result<()>) -> &'static str {
            match result {
                Err(RabtError::InvalidPhase { phase, .. }) => phase,
                _ => "accepted",
            }
        }

        impl LifecycleInterceptor for Watcher {
            fn after_creation(&self, _entity: &Entity<'_>) {
                self.note(|c| format!("created {} {}", c.is_started(), rejected(c.stop())));
            }
        }

        impl GlobalLifecycleInterceptor for Watcher {
            fn after_start(&self) {
                self.note(|c| format!("after_start {}", c.is_started()));
            }

            fn before_stop(&self) {
                self.note(|c| format!("before_stop {} {}", c.is_started(), rejected(c.start())));
            }
        }

        let watcher = Arc::new(Watcher::default());
        let journal = Journal::default();
        let container = Arc::new(
            Container::builder()
                .external(ExternalDescriptor::new(Arc::clone(&watcher)).lifecycle().global())
                .declare(greeter(&journal))
                .build()
                .unwrap(),
        );
        let _ = watcher.container.set(Arc::downgrade(&container));

        container.start().unwrap();
        container.stop().unwrap();

        assert_eq!(
            *watcher.seen.lock(),
            vec!["created false starting", "after_start true", "before_stop false stopping"]
        );
    }

    #[test]
    #[traced_test]
    fn duplicate_names_are_logged_and_skipped() {
        let container = Container::builder()
            .declare(EntityDescriptor::<English>::singleton_default().named("main").capability::<dyn Greeter>(|e| e))
            .declare(EntityDescriptor::<Guests>::singleton_default().named("main").capability::<dyn Roster>(|g| g))
            .build()
            .unwrap();

        assert_eq!(container.len(), 1);
        assert!(logs_contain("A binder already exists with this name"));
    }

    #[test]
    fn invalid_declaration_fails_build() {
        let result = Container::builder()
            .declare(
                EntityDescriptor::<English>::singleton_default()
                    .dispose_with(|_| Ok(()))
                    .dispose_with(|_| Ok(())),
            )
            .build();

        assert!(matches!(result, Err(RabtError::ConflictingHooks { hook: "dispose", .. })));
    }

    #[test]
    fn dropping_a_running_container_stops_it() {
        let journal = Journal::default();
        let container = Container::builder().declare(greeter(&journal)).build().unwrap();
        container.start().unwrap();

        drop(container);
        assert_eq!(*journal.lock(), vec!["greeter"]);
    }

    #[test]
    fn handles_outliving_the_container_report_it() {
        let container = Container::builder().build().unwrap();
        let locator = container.locator();
        drop(container);

        assert!(matches!(locator.get::<dyn Greeter>(), Err(RabtError::ContainerDropped)));
    }
}
