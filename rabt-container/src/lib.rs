//! Core container implementation for rabt.
//!
//! Binders, the locator and injector built on them, the dependency graph
//! that orders startup, and the event pipeline that intercepts lifecycle
//! transitions and capability calls.

pub mod binder;
pub mod config;
pub mod container;
pub mod dependency;
pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod graph;
pub mod injector;
pub mod interception;
pub mod key;
pub mod kind;
pub mod locator;
pub(crate) mod registry;

pub use binder::assembly::{Disposable, Initializable};
pub use container::{Container, ContainerBuilder, prelude};
pub use error::{InvocationError, RabtError, Result};
pub use key::TypeKey;
pub use kind::{BinderKind, LifecycleState, Stage};

// Lets applications submit declarations without depending on inventory.
#[doc(hidden)]
pub use inventory;
