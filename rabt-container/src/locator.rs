//! Locating managed instances by capability and name.
//!
//! [`Locator`] is the object-safe, type-erased lookup surface; chained
//! fallback locators implement it too. [`LocatorExt`] adds the typed
//! `get` family on top of any locator.
//!
//! # Lookup rules
//! - The requested type must be a capability interface (`dyn Trait`).
//! - Unnamed lookups need exactly one local binder. With none, the first
//!   chained locator that has a result answers. With several, the answer
//!   is nothing.
//! - Named lookups use the binder bound under that name if it serves the
//!   capability, and fall back to chained locators otherwise.
//! - Plural lookups combine local and chained results.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, trace};

use crate::binder::{Binder, ErasedInstance, unerase};
use crate::container::ContainerState;
use crate::error::{RabtError, Result};
use crate::key::TypeKey;
use crate::registry::Match;

/// Type-erased lookup of managed instances.
pub trait Locator: Send + Sync {
    /// The single instance serving `capability`.
    fn lookup(&self, capability: &TypeKey) -> Result<Option<ErasedInstance>>;

    /// The instance bound under `name`, if it serves `capability`.
    fn lookup_named(&self, name: &str, capability: &TypeKey) -> Result<Option<ErasedInstance>>;

    /// Every instance serving `capability`.
    fn lookup_all(&self, capability: &TypeKey) -> Result<Vec<ErasedInstance>>;

    /// Every named instance serving `capability`, by name.
    fn lookup_all_named(&self, capability: &TypeKey) -> Result<HashMap<String, ErasedInstance>>;
}

/// Typed lookups for every [`Locator`].
///
/// ```rust,ignore
/// let mailer: Option<Arc<dyn Mailer>> = container.locator().get::<dyn Mailer>()?;
/// let bulk = container.locator().get_named::<dyn Mailer>("bulk")?;
/// ```
pub trait LocatorExt: Locator {
    fn get<T: ?Sized + 'static>(&self) -> Result<Option<Arc<T>>> {
        Ok(self
            .lookup(&TypeKey::of::<T>())?
            .and_then(|erased| unerase::<T>(&erased)))
    }

    fn get_named<T: ?Sized + 'static>(&self, name: &str) -> Result<Option<Arc<T>>> {
        Ok(self
            .lookup_named(name, &TypeKey::of::<T>())?
            .and_then(|erased| unerase::<T>(&erased)))
    }

    fn get_all<T: ?Sized + 'static>(&self) -> Result<Vec<Arc<T>>> {
        Ok(self
            .lookup_all(&TypeKey::of::<T>())?
            .iter()
            .filter_map(unerase::<T>)
            .collect())
    }

    fn get_all_named<T: ?Sized + 'static>(&self) -> Result<HashMap<String, Arc<T>>> {
        Ok(self
            .lookup_all_named(&TypeKey::of::<T>())?
            .into_iter()
            .filter_map(|(name, erased)| unerase::<T>(&erased).map(|instance| (name, instance)))
            .collect())
    }
}

impl<L: Locator + ?Sized> LocatorExt for L {}

/// The locator of a container.
///
/// Holds the container weakly; lookups after the container is dropped fail
/// with [`RabtError::ContainerDropped`].
#[derive(Clone)]
pub struct ContainerLocator {
    state: Weak<ContainerState>,
}

impl ContainerLocator {
    pub(crate) fn new(state: Weak<ContainerState>) -> Self {
        Self { state }
    }

    fn state(&self) -> Result<Arc<ContainerState>> {
        self.state.upgrade().ok_or(RabtError::ContainerDropped)
    }
}

fn require_interface(capability: &TypeKey) -> Result<()> {
    if capability.is_interface() {
        Ok(())
    } else {
        Err(RabtError::NotAnInterface {
            capability: capability.type_name().to_string(),
        })
    }
}

fn first_chained(
    chained: &[Arc<dyn Locator>],
    mut ask: impl FnMut(&dyn Locator) -> Result<Option<ErasedInstance>>,
) -> Result<Option<ErasedInstance>> {
    for locator in chained {
        if let Some(found) = ask(locator.as_ref())? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

impl Locator for ContainerLocator {
    fn lookup(&self, capability: &TypeKey) -> Result<Option<ErasedInstance>> {
        require_interface(capability)?;
        let state = self.state()?;

        // never call into a binder while holding the registry lock
        let (local, chained) = {
            let registry = state.registry.read();
            let local = match registry.unique(capability) {
                Match::Unique(index) => Some(Arc::clone(registry.binder(index))),
                Match::Ambiguous(count) => {
                    debug!(capability = %capability, candidates = count, "Multiple binders available");
                    return Ok(None);
                }
                Match::Missing => None,
            };
            (local, registry.chained().to_vec())
        };

        match local {
            Some(binder) => {
                trace!(capability = %capability, binder = %binder.id(), "Located");
                binder.instance(capability)
            }
            None => {
                trace!(capability = %capability, "Not found locally, asking chained locators");
                first_chained(&chained, |locator| locator.lookup(capability))
            }
        }
    }

    fn lookup_named(&self, name: &str, capability: &TypeKey) -> Result<Option<ErasedInstance>> {
        require_interface(capability)?;
        let state = self.state()?;

        let (local, chained) = {
            let registry = state.registry.read();
            let local = registry
                .named(name, capability)
                .map(|index| Arc::clone(registry.binder(index)));
            (local, registry.chained().to_vec())
        };

        match local {
            Some(binder) => binder.instance(capability),
            None => first_chained(&chained, |locator| locator.lookup_named(name, capability)),
        }
    }

    fn lookup_all(&self, capability: &TypeKey) -> Result<Vec<ErasedInstance>> {
        require_interface(capability)?;
        let state = self.state()?;

        let (local, chained) = {
            let registry = state.registry.read();
            let local: Vec<Arc<dyn Binder>> = registry
                .all(capability)
                .iter()
                .map(|&index| Arc::clone(registry.binder(index)))
                .collect();
            (local, registry.chained().to_vec())
        };

        let mut found = Vec::with_capacity(local.len());
        for binder in &local {
            if let Some(instance) = binder.instance(capability)? {
                found.push(instance);
            }
        }
        for locator in &chained {
            found.extend(locator.lookup_all(capability)?);
        }
        Ok(found)
    }

    fn lookup_all_named(&self, capability: &TypeKey) -> Result<HashMap<String, ErasedInstance>> {
        require_interface(capability)?;
        let state = self.state()?;

        let (local, chained) = {
            let registry = state.registry.read();
            let local: Vec<Arc<dyn Binder>> = registry
                .all(capability)
                .iter()
                .map(|&index| Arc::clone(registry.binder(index)))
                .filter(|binder| binder.name().is_some())
                .collect();
            (local, registry.chained().to_vec())
        };

        // chained first: local bindings win on a name clash
        let mut found = HashMap::new();
        for locator in &chained {
            found.extend(locator.lookup_all_named(capability)?);
        }
        for binder in &local {
            if let (Some(name), Some(instance)) = (binder.name(), binder.instance(capability)?) {
                found.insert(name.to_string(), instance);
            }
        }
        Ok(found)
    }
}

impl fmt::Debug for ContainerLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerLocator")
            .field("attached", &(self.state.strong_count() > 0))
            .finish()
    }
}
