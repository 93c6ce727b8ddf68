//! Discovery: where declarations come from.
//!
//! A [`Discovery`] hands declarations to a [`DeclarationSink`] (the
//! container builder). Group related declarations in one discovery:
//!
//! ```rust,ignore
//! struct MailModule;
//!
//! impl Discovery for MailModule {
//!     fn discover(&self, sink: &mut dyn DeclarationSink) {
//!         sink.declare_boxed(Box::new(
//!             EntityDescriptor::singleton_default().capability::<dyn Mailer>(|m: Arc<SmtpMailer>| m),
//!         ));
//!     }
//! }
//!
//! let container = Container::builder().discover(&MailModule).build()?;
//! ```
//!
//! [`InventoryDiscovery`] finds declarations submitted anywhere in the
//! binary with `inventory::submit!`.

use tracing::debug;

use crate::descriptor::Declaration;

/// A source of declarations.
pub trait Discovery: Send + Sync {
    /// Hands every declaration to `sink`.
    ///
    /// Called once while the container is built.
    fn discover(&self, sink: &mut dyn DeclarationSink);

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Receives declarations from a [`Discovery`].
pub trait DeclarationSink {
    fn declare_boxed(&mut self, declaration: Box<dyn Declaration>);
}

/// A declaration submitted for inventory discovery.
///
/// ```rust,ignore
/// fn mailer() -> Box<dyn Declaration> {
///     Box::new(EntityDescriptor::<SmtpMailer>::singleton_default().capability::<dyn Mailer>(|m| m))
/// }
///
/// inventory::submit!(Discovered::new("mailer", mailer));
/// ```
pub struct Discovered {
    /// Label used in logs.
    pub name: &'static str,
    /// Builds the declaration.
    pub declare: fn() -> Box<dyn Declaration>,
}

impl Discovered {
    pub const fn new(name: &'static str, declare: fn() -> Box<dyn Declaration>) -> Self {
        Self { name, declare }
    }
}

inventory::collect!(Discovered);

/// Declares everything submitted as [`Discovered`].
#[derive(Debug, Default, Clone, Copy)]
pub struct InventoryDiscovery;

impl Discovery for InventoryDiscovery {
    fn discover(&self, sink: &mut dyn DeclarationSink) {
        let mut count = 0usize;
        for entry in inventory::iter::<Discovered> {
            debug!(declaration = entry.name, "Discovered declaration");
            sink.declare_boxed((entry.declare)());
            count += 1;
        }
        debug!(count, "Inventory discovery finished");
    }

    fn name(&self) -> &str {
        "inventory"
    }
}
