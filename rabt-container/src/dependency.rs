//! Dependency edges between binders.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::key::TypeKey;

/// A required (or optional) capability, optionally qualified by name.
///
/// Identity is `(capability, name)`: the `required` flag does not take
/// part in equality or hashing.
///
/// # Examples
/// ```
/// use rabt_container::dependency::Dependency;
///
/// trait Storage {}
///
/// let primary = Dependency::on::<dyn Storage>().named("primary");
/// assert_eq!(primary.name(), Some("primary"));
/// assert!(primary.is_required());
///
/// let cache = Dependency::on::<dyn Storage>().optional();
/// assert!(!cache.is_required());
/// ```
#[derive(Clone)]
pub struct Dependency {
    name: Option<String>,
    capability: TypeKey,
    required: bool,
}

impl Dependency {
    /// A required, unnamed dependency on capability `T`.
    pub fn on<T: ?Sized + 'static>() -> Self {
        Self::new(None, TypeKey::of::<T>(), true)
    }

    /// Builds a dependency from raw parts. Blank names count as unset.
    pub fn new(name: Option<&str>, capability: TypeKey, required: bool) -> Self {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_owned);
        Self { name, capability, required }
    }

    /// Qualifies the dependency with a binder name.
    pub fn named(self, name: &str) -> Self {
        Self::new(Some(name), self.capability, self.required)
    }

    /// Marks the dependency as optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn capability(&self) -> &TypeKey {
        &self.capability
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Whether a binder bound under `binder_name` can satisfy this edge.
    ///
    /// An edge without a name accepts any binder of the capability, named
    /// or not. A named edge only accepts the binder bound under that name.
    pub fn accepts(&self, binder_name: Option<&str>) -> bool {
        match (&self.name, binder_name) {
            (None, _) => true,
            (Some(wanted), Some(actual)) => wanted == actual,
            (Some(_), None) => false,
        }
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.capability == other.capability && self.name == other.name
    }
}

impl Eq for Dependency {}

impl Hash for Dependency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.capability.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("name", &self.name)
            .field("capability", &self.capability.type_name())
            .field("required", &self.required)
            .finish()
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{name} -> ")?;
        }
        write!(f, "{}", self.capability)?;
        if !self.required {
            write!(f, " (optional)")?;
        }
        Ok(())
    }
}
