//! Lifecycle walk-through of the rabt container.
//!
//! Run with `RUST_LOG=rabt=debug` to see the startup plan.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rabt::prelude::*;
use tracing_subscriber::EnvFilter;

// === Capabilities ===

#[rabt::capability]
trait Logger: Send + Sync {
    fn log(&self, msg: String) -> Result<(), InvocationError>;
}

#[rabt::capability]
trait Database: Send + Sync {
    fn query(&self, sql: String) -> Result<String, InvocationError>;
}

#[rabt::capability]
trait UserService: Send + Sync {
    fn get_user(&self, id: u64) -> Result<String, InvocationError>;
}

// === Implementations ===

#[derive(Default)]
struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, msg: String) -> Result<(), InvocationError> {
        println!("[LOG] {msg}");
        Ok(())
    }
}

#[derive(Default)]
struct Postgres {
    url: String,
    logger: Option<Arc<dyn Logger>>,
}

impl Database for Postgres {
    fn query(&self, sql: String) -> Result<String, InvocationError> {
        if let Some(logger) = &self.logger {
            logger.log(format!("Executing: {sql}"))?;
        }
        Ok(format!("Results from {}", self.url))
    }
}

impl Disposable for Postgres {
    fn dispose(&self) -> Result<(), BoxError> {
        println!("[DB] closing {}", self.url);
        Ok(())
    }
}

#[derive(Default)]
struct Users {
    db: Option<Arc<dyn Database>>,
}

impl UserService for Users {
    fn get_user(&self, id: u64) -> Result<String, InvocationError> {
        let db = self.db.as_ref().ok_or_else(|| InvocationError::msg("no database"))?;
        db.query(format!("SELECT * FROM users WHERE id = {id}"))
    }
}

// === Interceptors ===

/// Prints every lifecycle transition of application entities.
struct Announcer;

impl LifecycleInterceptor for Announcer {
    fn after_initialization(&self, entity: &Entity<'_>) {
        println!("[LIFECYCLE] ready: {}", entity.type_key().short_name());
    }

    fn before_disposal(&self, entity: &Entity<'_>) {
        println!("[LIFECYCLE] disposing: {}", entity.type_key().short_name());
    }
}

/// Counts calls on capability interfaces.
#[derive(Default)]
struct CallCounter(AtomicU64);

impl MethodInterceptor for CallCounter {
    fn before(&self, call: &MethodCall<'_>, args: &dyn fmt::Debug) {
        self.0.fetch_add(1, Ordering::Relaxed);
        println!("[CALL] {call} {args:?}");
    }
}

struct Banner;

impl GlobalLifecycleInterceptor for Banner {
    fn after_start(&self) {
        println!("=== container running ===");
    }

    fn before_stop(&self) {
        println!("=== container stopping ===");
    }
}

fn main() -> rabt::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rabt=info")))
        .init();

    let counter = Arc::new(CallCounter::default());

    let container = Container::builder()
        .configure(Arc::new(MemoryConfig::new().with("database.url", "postgres://localhost/app".to_string())))
        .intercept_lifecycle(Arc::new(Announcer))
        .intercept_methods(Arc::clone(&counter))
        .intercept_global(Arc::new(Banner))
        .declare(EntityDescriptor::<ConsoleLogger>::singleton_default().capability::<dyn Logger>(|l| l))
        .declare(
            EntityDescriptor::<Postgres>::singleton_default()
                .capability::<dyn Database>(|d| d)
                .configure(Configure::required("url", |p: &mut Postgres, url: String| p.url = url).key("database.url"))
                .inject(Inject::required(|p: &mut Postgres, logger: Arc<dyn Logger>| p.logger = Some(logger)))
                .disposable(),
        )
        .declare(
            EntityDescriptor::<Users>::singleton_default()
                .capability::<dyn UserService>(|u| u)
                .inject(Inject::required(|u: &mut Users, db: Arc<dyn Database>| u.db = Some(db))),
        )
        .build()?;

    container.start()?;

    if let Some(users) = container.locator().get::<dyn UserService>()? {
        match users.get_user(42) {
            Ok(row) => println!("{row}"),
            Err(err) => println!("lookup failed: {err}"),
        }
    }

    println!("{} intercepted calls", counter.0.load(Ordering::Relaxed));

    container.stop()
}
