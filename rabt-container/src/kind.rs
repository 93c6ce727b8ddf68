//! Binder kinds, startup stages and entity lifecycle states.
//!
//! Every binder belongs to one [`BinderKind`]. The kind decides which
//! [`Stage`] the binder starts in:
//! - [`Stage::Infrastructure`]: externals, interceptors and provider groups
//! - [`Stage::Application`]: singletons and prototypes
//!
//! # Ordering
//! Kinds are ordered the way declarations are registered:
//! `External < Interceptor < Provider < Singleton < Prototype`.

use std::fmt;

/// The kind of managed unit a binder stands for.
///
/// # Examples
/// ```
/// use rabt_container::kind::{BinderKind, Stage};
///
/// assert_eq!(BinderKind::Provider.stage(), Stage::Infrastructure);
/// assert_eq!(BinderKind::Prototype.stage(), Stage::Application);
/// assert!(BinderKind::Interceptor < BinderKind::Singleton);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BinderKind {
    /// An instance supplied by the embedding application.
    ///
    /// Always ready. Never constructed, injected or disposed by the container.
    External,

    /// A container-created lifecycle, method or global interceptor.
    Interceptor,

    /// One production operation of a provider group.
    Provider,

    /// One instance for the container's lifetime, created eagerly at start
    /// or lazily on first access.
    Singleton,

    /// A fresh instance on every retrieval.
    Prototype,
}

impl BinderKind {
    /// The startup stage binders of this kind belong to.
    #[inline]
    pub fn stage(&self) -> Stage {
        match self {
            BinderKind::External | BinderKind::Interceptor | BinderKind::Provider => {
                Stage::Infrastructure
            }
            BinderKind::Singleton | BinderKind::Prototype => Stage::Application,
        }
    }

    /// Returns `true` for the kinds that serve interceptor contracts.
    #[inline]
    pub fn serves_interceptors(&self) -> bool {
        matches!(self, BinderKind::External | BinderKind::Interceptor)
    }

    /// Returns `true` if the kind caches a single instance.
    #[inline]
    pub fn is_stateful(&self) -> bool {
        !matches!(self, BinderKind::Prototype | BinderKind::Provider)
    }
}

impl fmt::Display for BinderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinderKind::External => write!(f, "external"),
            BinderKind::Interceptor => write!(f, "interceptor"),
            BinderKind::Provider => write!(f, "provider"),
            BinderKind::Singleton => write!(f, "singleton"),
            BinderKind::Prototype => write!(f, "prototype"),
        }
    }
}

/// Startup partition.
///
/// Infrastructure binders are fully started before the interception
/// pipeline is armed. Application binders start after that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Infrastructure,
    Application,
}

impl Stage {
    /// `1` for infrastructure, `2` for application.
    #[inline]
    pub fn number(&self) -> u8 {
        match self {
            Stage::Infrastructure => 1,
            Stage::Application => 2,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {}", self.number())
    }
}

/// Where a stateful entity is in its lifecycle.
///
/// ```text
/// Uncreated → Created → Injected → Initialized → Ready → Disposing → Disposed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleState {
    Uncreated,
    Created,
    Injected,
    Initialized,
    Ready,
    Disposing,
    Disposed,
}

impl LifecycleState {
    /// Returns `true` once the full creation sequence has completed.
    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, LifecycleState::Ready)
    }

    /// Returns `true` once disposal has begun.
    #[inline]
    pub fn is_retired(&self) -> bool {
        matches!(self, LifecycleState::Disposing | LifecycleState::Disposed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleState::Uncreated => "uncreated",
            LifecycleState::Created => "created",
            LifecycleState::Injected => "injected",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Ready => "ready",
            LifecycleState::Disposing => "disposing",
            LifecycleState::Disposed => "disposed",
        };
        f.write_str(label)
    }
}
