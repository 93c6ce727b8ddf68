//! # Rabt: an IoC container for Rust
//!
//! Declare what the container manages, start it, and look instances up by
//! capability trait. Every managed instance is handed out behind an
//! interception wrapper, so lifecycle and method interceptors see what
//! happens to it.
//!
//! ```rust,ignore
//! use rabt::prelude::*;
//!
//! #[rabt::capability]
//! pub trait Mailer: Send + Sync {
//!     fn send(&self, to: &str) -> Result<(), InvocationError>;
//! }
//!
//! #[derive(Default)]
//! struct SmtpMailer;
//!
//! impl Mailer for SmtpMailer {
//!     fn send(&self, to: &str) -> Result<(), InvocationError> {
//!         Ok(())
//!     }
//! }
//!
//! let container = Container::builder()
//!     .declare(EntityDescriptor::<SmtpMailer>::singleton_default().capability::<dyn Mailer>(|m| m))
//!     .build()?;
//! container.start()?;
//!
//! let mailer = container.locator().get::<dyn Mailer>()?.expect("mailer is declared");
//! mailer.send("ops@example.com")?;
//! ```

pub use rabt_container::*;
pub use rabt_macros::capability;
pub use rabt_support::*;
