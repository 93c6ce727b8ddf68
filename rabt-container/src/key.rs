//! Type identification keys.
//!
//! [`TypeKey`] identifies a Rust type inside the container. Capabilities are
//! the keys of trait-object types (`dyn Trait`); implementation types and
//! configuration value types use the same key.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

use rabt_support::rendering::shorten_type_name;

/// Identifies a type by its [`TypeId`], keeping the readable name around
/// for diagnostics.
///
/// # Examples
/// ```
/// use rabt_container::key::TypeKey;
///
/// trait Mailer {}
///
/// let capability = TypeKey::of::<dyn Mailer>();
/// assert!(capability.is_interface());
/// assert!(!TypeKey::of::<String>().is_interface());
/// ```
#[derive(Clone, Copy)]
pub struct TypeKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl TypeKey {
    /// Creates a key for type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// Returns the [`TypeId`] of the keyed type.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the fully qualified type name.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the type name without module paths.
    pub fn short_name(&self) -> String {
        shorten_type_name(self.type_name)
    }

    /// `true` if the key names a trait-object type, i.e. something a
    /// binder can be located or injected through.
    #[inline]
    pub fn is_interface(&self) -> bool {
        self.type_name.starts_with("dyn ")
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.type_name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}
