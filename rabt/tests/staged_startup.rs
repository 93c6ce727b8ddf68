//! Two-stage startup, lifecycle notifications and teardown.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use rabt::prelude::*;
use rabt::{BinderKind, LifecycleState, Stage};

#[rabt::capability]
trait Settings: Send + Sync {
    fn zone(&self) -> Result<String, InvocationError>;
}

impl dyn Settings {
    fn is_utc(&self) -> bool {
        self.zone().is_ok_and(|zone| zone == "UTC")
    }
}

#[rabt::capability]
trait Clock: Send + Sync {
    fn now(&self) -> Result<u64, InvocationError>;
}

#[rabt::capability]
trait Scheduler: Send + Sync {
    fn next_run(&self) -> Result<u64, InvocationError>;
}

#[rabt::capability]
trait Report: Send + Sync {
    fn title(&self) -> Result<String, InvocationError>;
}

// ── implementations ──

#[derive(Default)]
struct StaticSettings;

impl Settings for StaticSettings {
    fn zone(&self) -> Result<String, InvocationError> {
        Ok("UTC".to_string())
    }
}

#[derive(Default)]
struct ClockFactory {
    offset: u64,
    settings: Option<Arc<dyn Settings>>,
    produced: AtomicU64,
}

struct OffsetClock(u64);

impl Clock for OffsetClock {
    fn now(&self) -> Result<u64, InvocationError> {
        Ok(self.0)
    }
}

#[derive(Default)]
struct NightlyScheduler {
    clock: Option<Arc<dyn Clock>>,
    interval: u64,
    ready: bool,
}

impl Initializable for NightlyScheduler {
    fn initialize(&mut self) -> Result<(), BoxError> {
        if self.interval == 0 {
            return Err("interval must be positive".into());
        }
        self.ready = true;
        Ok(())
    }
}

impl Disposable for NightlyScheduler {
    fn dispose(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl Scheduler for NightlyScheduler {
    fn next_run(&self) -> Result<u64, InvocationError> {
        if !self.ready {
            return Err(InvocationError::msg("not initialized"));
        }
        let clock = self.clock.as_ref().ok_or_else(|| InvocationError::msg("no clock"))?;
        Ok(clock.now()? + self.interval)
    }
}

#[derive(Default)]
struct MonthlyReport;

impl Report for MonthlyReport {
    fn title(&self) -> Result<String, InvocationError> {
        Ok("monthly".to_string())
    }
}

/// Records lifecycle events as `event Type`.
#[derive(Default)]
struct Journal(Mutex<Vec<String>>);

impl Journal {
    fn record(&self, event: &str, entity: &Entity<'_>) {
        self.0.lock().push(format!("{event} {}", entity.type_key().short_name()));
    }

    fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn mentions(&self, name: &str) -> bool {
        self.events().iter().any(|event| event.ends_with(name))
    }
}

impl LifecycleInterceptor for Journal {
    fn after_creation(&self, entity: &Entity<'_>) {
        self.record("created", entity);
    }

    fn after_injection(&self, entity: &Entity<'_>) {
        self.record("injected", entity);
    }

    fn after_initialization(&self, entity: &Entity<'_>) {
        self.record("initialized", entity);
    }

    fn before_disposal(&self, entity: &Entity<'_>) {
        self.record("disposing", entity);
    }

    fn after_disposal(&self, entity: &Entity<'_>) {
        self.record("disposed", entity);
    }
}

// ── declarations ──

fn settings() -> EntityDescriptor<StaticSettings> {
    EntityDescriptor::<StaticSettings>::singleton_default().capability::<dyn Settings>(|s| s)
}

fn clock_factory() -> ProviderDescriptor<ClockFactory> {
    ProviderDescriptor::<ClockFactory>::default()
        .configure(Configure::required("offset", |f: &mut ClockFactory, offset: u64| f.offset = offset).key("clock.offset"))
        .inject(Inject::required(|f: &mut ClockFactory, settings: Arc<dyn Settings>| {
            f.settings = Some(settings)
        }))
        .produces::<dyn Clock, _>(|factory| {
            if factory.settings.is_none() {
                return Err("settings were not injected".into());
            }
            factory.produced.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(OffsetClock(factory.offset)) as Arc<dyn Clock>)
        })
}

fn scheduler() -> EntityDescriptor<NightlyScheduler> {
    EntityDescriptor::<NightlyScheduler>::singleton_default()
        .capability::<dyn Scheduler>(|s| s)
        .configure(Configure::optional("interval", |s: &mut NightlyScheduler, interval: u64| s.interval = interval))
        .inject(Inject::required(|s: &mut NightlyScheduler, clock: Arc<dyn Clock>| s.clock = Some(clock)))
        .initializable()
        .disposable()
}

fn config() -> Arc<MemoryConfig> {
    Arc::new(MemoryConfig::new().with("clock.offset", 1_000u64).with("interval", 60u64))
}

fn container(journal: &Arc<Journal>) -> Container {
    Container::builder()
        .configure(config())
        .intercept_lifecycle(Arc::clone(journal))
        .declare(scheduler())
        .declare(
            EntityDescriptor::<MonthlyReport>::singleton_default()
                .lazy()
                .capability::<dyn Report>(|r| r),
        )
        .declare(clock_factory())
        .declare(settings())
        .build()
        .unwrap()
}

#[test]
fn infrastructure_starts_before_application() {
    let journal = Arc::new(Journal::default());
    let container = container(&journal);
    container.start().unwrap();

    let order = container.startup_order().unwrap();
    let stage1: Vec<_> = order.stage1().iter().map(|b| b.id().label()).collect();
    // dependencies of stage 1 binders are moved to the front
    assert_eq!(stage1, vec!["StaticSettings", "Journal", "ClockFactory::dyn Clock"]);
    assert!(order.stage1().iter().any(|b| b.kind() == BinderKind::Singleton));

    let scheduler = order
        .stage2()
        .iter()
        .find(|b| b.kind() == BinderKind::Singleton && b.id().label() == "NightlyScheduler")
        .unwrap();
    assert_eq!(order.position(scheduler.id()).map(|(stage, _)| stage), Some(Stage::Application));
}

#[test]
fn interceptors_only_observe_stage_two() {
    let journal = Arc::new(Journal::default());
    let container = container(&journal);
    container.start().unwrap();

    // stage 1 entities were assembled before the pipeline was armed
    assert!(!journal.mentions("StaticSettings"));
    assert!(!journal.mentions("ClockFactory"));
    assert_eq!(
        journal.events(),
        vec![
            "created NightlyScheduler",
            "injected NightlyScheduler",
            "initialized NightlyScheduler",
        ]
    );
}

#[test]
fn providers_produce_per_lookup() {
    let journal = Arc::new(Journal::default());
    let container = container(&journal);
    container.start().unwrap();

    let locator = container.locator();
    let first = locator.get::<dyn Clock>().unwrap().unwrap();
    let second = locator.get::<dyn Clock>().unwrap().unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.now().unwrap(), 1_000);

    let scheduler = locator.get::<dyn Scheduler>().unwrap().unwrap();
    assert_eq!(scheduler.next_run().unwrap(), 1_060);

    assert!(locator.get::<dyn Settings>().unwrap().unwrap().is_utc());
}

#[test]
fn lazy_singletons_wait_for_their_first_lookup() {
    let journal = Arc::new(Journal::default());
    let container = container(&journal);
    container.start().unwrap();
    assert!(!journal.mentions("MonthlyReport"));

    let report = container.locator().get::<dyn Report>().unwrap().unwrap();
    assert_eq!(report.title().unwrap(), "monthly");
    assert!(journal.mentions("MonthlyReport"));

    let again = container.locator().get::<dyn Report>().unwrap().unwrap();
    assert!(Arc::ptr_eq(&report, &again));
}

#[test]
fn prototypes_are_fresh_on_every_lookup() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let container = Container::builder()
        .declare(
            EntityDescriptor::<MonthlyReport>::prototype(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(MonthlyReport)
            })
            .capability::<dyn Report>(|r| r),
        )
        .build()
        .unwrap();
    container.start().unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 0);

    let a = container.locator().get::<dyn Report>().unwrap().unwrap();
    let b = container.locator().get::<dyn Report>().unwrap().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[test]
fn stop_disposes_in_reverse() {
    let journal = Arc::new(Journal::default());
    let container = container(&journal);
    container.start().unwrap();

    let order = container.startup_order().unwrap();
    let scheduler = order
        .stage2()
        .iter()
        .find(|b| b.id().label() == "NightlyScheduler")
        .cloned()
        .unwrap();
    assert_eq!(scheduler.state(), Some(LifecycleState::Ready));

    container.stop().unwrap();
    assert_eq!(scheduler.state(), Some(LifecycleState::Disposed));

    let events = journal.events();
    let disposing = events.iter().position(|e| e == "disposing NightlyScheduler").unwrap();
    let disposed = events.iter().position(|e| e == "disposed NightlyScheduler").unwrap();
    assert!(disposing < disposed);

    // stage 1 entities are disposed after stage 2, while the pipeline is still armed
    let settings = events.iter().position(|e| e == "disposing StaticSettings").unwrap();
    assert!(disposed < settings);
}

#[test]
fn missing_configuration_aborts_start() {
    let container = Container::builder()
        .configure(Arc::new(MemoryConfig::new()))
        .declare(clock_factory())
        .declare(settings())
        .build()
        .unwrap();

    match container.start() {
        Err(RabtError::MissingConfiguration { key, target }) => {
            assert_eq!(key, "clock.offset");
            assert_eq!(target, "ClockFactory");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!container.is_started());
}

#[test]
fn failing_init_hook_aborts_start() {
    let container = Container::builder()
        .configure(Arc::new(MemoryConfig::new().with("clock.offset", 5u64)))
        .declare(clock_factory())
        .declare(settings())
        .declare(scheduler())
        .build()
        .unwrap();

    let err = container.start().unwrap_err();
    assert!(matches!(err, RabtError::HookFailed { hook: "init", .. }));
    assert!(err.is_configuration_error());
}
