//! Error types for rabt container operations.
//!
//! Registration, ordering and instantiation failures are fatal and surface
//! as [`RabtError`]. Failures of intercepted business calls are an
//! [`InvocationError`] and travel back to the caller untouched.

use std::error::Error as StdError;
use std::fmt;

use rabt_support::rendering::render_chain;

use crate::dependency::Dependency;

/// Boxed error used for construction, hook and business-call failures.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Main error type for all rabt operations.
#[derive(Debug, thiserror::Error)]
pub enum RabtError {
    /// A required dependency resolves neither locally nor through a chained locator.
    #[error("{}", .0)]
    Unresolved(UnresolvedDependencyError),

    /// The binder graph contains a cycle.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// A required configuration key is missing from every provider.
    #[error("Missing configuration `{key}` for {target}\n  Hint: add the key to a configuration provider, or bind the field with Configure::optional")]
    MissingConfiguration { key: String, target: String },

    /// More than one init or dispose hook was declared.
    #[error("Conflicting {hook} hooks on {implementation}: {count} declared, at most one allowed")]
    ConflictingHooks {
        implementation: String,
        hook: &'static str,
        count: usize,
    },

    /// A provider declares two production operations for the same capability.
    #[error("Provider {provider} produces {capability} more than once")]
    DuplicateProduction { provider: String, capability: String },

    /// A name or binder was registered twice.
    #[error("{}", .0)]
    AlreadyRegistered(AlreadyRegisteredError),

    /// A lookup was made with a type that is not a trait object.
    #[error("{capability} is not a capability interface\n  Hint: look up trait objects, e.g. `dyn Mailer`")]
    NotAnInterface { capability: String },

    /// The constructor of a managed entity failed.
    #[error("Failed to construct {implementation}: {source}")]
    ConstructionFailed {
        implementation: String,
        #[source]
        source: BoxError,
    },

    /// An init or dispose hook failed.
    #[error("The {hook} hook of {implementation} failed: {source}")]
    HookFailed {
        implementation: String,
        hook: &'static str,
        #[source]
        source: BoxError,
    },

    /// A control operation was called in the wrong phase.
    #[error("Cannot {operation} a container that is {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: &'static str,
    },

    /// A locator or injector outlived its container.
    #[error("The container behind this handle has been dropped")]
    ContainerDropped,
}

impl RabtError {
    /// Returns `true` for the configuration-error family: problems with the
    /// declared binder set that abort startup.
    ///
    /// Construction and hook failures count as well, since they surface as
    /// configuration errors of the entity they belong to.
    pub fn is_configuration_error(&self) -> bool {
        !matches!(
            self,
            RabtError::InvalidPhase { .. } | RabtError::ContainerDropped | RabtError::NotAnInterface { .. }
        )
    }
}

/// Error when a required dependency cannot be satisfied.
#[derive(Debug)]
pub struct UnresolvedDependencyError {
    /// The unsatisfied edge.
    pub dependency: Dependency,
    /// The binder or type that declared the edge (if known).
    pub required_by: Option<String>,
    /// Registered capabilities with similar names.
    pub suggestions: Vec<String>,
}

impl fmt::Display for UnresolvedDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unresolved dependency: {}", self.dependency)?;

        if let Some(ref owner) = self.required_by {
            write!(f, "\n  Required by: {owner}")?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        match self.dependency.name() {
            Some(name) => write!(
                f,
                "\n  Hint: bind a {} under the name \"{name}\", or chain a locator that provides it",
                self.dependency.capability().short_name()
            ),
            None => write!(
                f,
                "\n  Hint: declare exactly one binder for {}, or chain a locator that provides it",
                self.dependency.capability().short_name()
            ),
        }
    }
}

/// Error when the binder graph has a cycle.
///
/// Shows the whole chain so the loop can be located.
#[derive(Debug)]
pub struct CircularDependencyError {
    /// Binder labels forming the cycle; first and last are the same.
    pub chain: Vec<String>,
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Circular dependency detected:\n  {}", render_chain(&self.chain))?;
        write!(
            f,
            "\n  Hint: break the loop with an optional dependency or look the instance up lazily through a locator"
        )
    }
}

/// Error when a binder or a name is registered twice.
#[derive(Debug)]
pub struct AlreadyRegisteredError {
    /// The binder that was rejected.
    pub binder: String,
    /// Set when the rejection was caused by a name clash.
    pub name: Option<String>,
}

impl fmt::Display for AlreadyRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(ref name) => write!(
                f,
                "Name \"{name}\" is already bound; rejected {}",
                self.binder
            )?,
            None => write!(f, "Binder already registered: {}", self.binder)?,
        }
        write!(f, "\n  Hint: names are unique across the whole container")
    }
}

/// Convenient Result type for rabt operations.
pub type Result<T> = std::result::Result<T, RabtError>;

/// Failure of an intercepted business call.
///
/// Carries the original error unchanged; interceptors observe it and the
/// caller gets it back as is.
///
/// # Examples
/// ```
/// use rabt_container::error::InvocationError;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("mailbox full")]
/// struct MailboxFull;
///
/// let err = InvocationError::new(MailboxFull);
/// assert!(err.downcast_ref::<MailboxFull>().is_some());
/// assert_eq!(err.to_string(), "mailbox full");
/// ```
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct InvocationError(#[from] BoxError);

impl InvocationError {
    /// Wraps any error.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Box::new(error))
    }

    /// Creates an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self(message.into())
    }

    /// Returns the wrapped error if it is of type `E`.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    /// Unwraps the original error.
    pub fn into_inner(self) -> BoxError {
        self.0
    }
}
