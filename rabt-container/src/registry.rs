//! Binder registry: the maps behind the locator.
//!
//! The registry is filled while the container is built, read while it
//! runs, and cleared when it stops.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use rabt_support::rendering::suggest_similar;
use tracing::{debug, trace, warn};

use crate::binder::{Binder, BinderId};
use crate::dependency::Dependency;
use crate::error::{AlreadyRegisteredError, RabtError};
use crate::interception::is_interceptor_contract;
use crate::key::TypeKey;
use crate::kind::BinderKind;
use crate::locator::Locator;

/// Outcome of an unnamed lookup by capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Match {
    Missing,
    Unique(usize),
    Ambiguous(usize),
}

/// Stores every registered binder and the indexes used to find them.
#[derive(Clone, Default)]
pub(crate) struct Registry {
    binders: Vec<Arc<dyn Binder>>,
    ids: HashSet<BinderId>,
    by_name: HashMap<String, usize>,
    by_type: HashMap<TypeKey, Vec<usize>>,
    chained: Vec<Arc<dyn Locator>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a binder.
    ///
    /// Interceptor binders, and the interceptor contracts of external
    /// binders, are kept out of the capability index: they are reachable
    /// only through the event pipeline.
    ///
    /// # Errors
    /// Returns [`RabtError::AlreadyRegistered`] if the name is taken or an
    /// equal binder exists. The registry is left unchanged.
    pub fn register(&mut self, binder: Arc<dyn Binder>) -> Result<(), RabtError> {
        let id = *binder.id();

        if let Some(name) = binder.name() {
            if self.by_name.contains_key(name) {
                warn!(name, binder = %id, "A binder already exists with this name");
                return Err(RabtError::AlreadyRegistered(AlreadyRegisteredError {
                    binder: id.to_string(),
                    name: Some(name.to_string()),
                }));
            }
        }

        if !self.ids.insert(id) {
            warn!(binder = %id, "Attempt to register a duplicate binder");
            return Err(RabtError::AlreadyRegistered(AlreadyRegisteredError {
                binder: id.to_string(),
                name: None,
            }));
        }

        let index = self.binders.len();
        if let Some(name) = binder.name() {
            self.by_name.insert(name.to_string(), index);
        }
        for capability in binder.capabilities() {
            if locatable(id.kind(), capability) {
                self.by_type.entry(*capability).or_default().push(index);
            }
        }

        debug!(binder = %id, name = binder.name(), "Registered binder");
        self.binders.push(binder);
        Ok(())
    }

    /// Adds a fallback locator, consulted on local misses.
    pub fn chain(&mut self, locator: Arc<dyn Locator>) {
        debug!(chained = self.chained.len() + 1, "Chained locator attached");
        self.chained.push(locator);
    }

    pub fn binders(&self) -> &[Arc<dyn Binder>] {
        &self.binders
    }

    pub fn binder(&self, index: usize) -> &Arc<dyn Binder> {
        &self.binders[index]
    }

    pub fn chained(&self) -> &[Arc<dyn Locator>] {
        &self.chained
    }

    /// Indexes of all binders of the given kinds, in registration order.
    pub fn of_kind<'a>(&'a self, kinds: &'a [BinderKind]) -> impl Iterator<Item = usize> + 'a {
        self.binders
            .iter()
            .enumerate()
            .filter(move |(_, b)| kinds.contains(&b.kind()))
            .map(|(i, _)| i)
    }

    /// Unnamed lookup by capability.
    pub fn unique(&self, capability: &TypeKey) -> Match {
        match self.by_type.get(capability).map(Vec::as_slice) {
            None | Some([]) => Match::Missing,
            Some([index]) => Match::Unique(*index),
            Some(many) => Match::Ambiguous(many.len()),
        }
    }

    /// Named lookup: the binder bound under `name`, if it serves `capability`.
    pub fn named(&self, name: &str, capability: &TypeKey) -> Option<usize> {
        let index = *self.by_name.get(name)?;
        let binder = &self.binders[index];
        if locatable(binder.kind(), capability) && binder.capabilities().contains(capability) {
            Some(index)
        } else {
            trace!(name, capability = %capability, "Named binder does not serve capability");
            None
        }
    }

    /// All binders serving `capability`.
    pub fn all(&self, capability: &TypeKey) -> &[usize] {
        self.by_type.get(capability).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolves a dependency edge to a local binder.
    ///
    /// An unnamed edge needs exactly one binder of the capability; several
    /// candidates count as no match.
    pub fn resolve(&self, dependency: &Dependency) -> Option<usize> {
        if let Some(name) = dependency.name() {
            return self
                .named(name, dependency.capability())
                .filter(|&i| dependency.accepts(self.binders[i].name()));
        }
        match self.unique(dependency.capability()) {
            Match::Unique(index) => Some(index),
            Match::Ambiguous(count) => {
                warn!(
                    capability = %dependency.capability(),
                    candidates = count,
                    "Multiple binders available for an unnamed dependency"
                );
                None
            }
            Match::Missing => None,
        }
    }

    /// Registered capabilities with names close to `capability`.
    pub fn suggestions(&self, capability: &TypeKey) -> Vec<String> {
        let available: Vec<&str> = self.by_type.keys().map(|k| k.type_name()).collect();
        suggest_similar(capability.type_name(), &available, 3)
    }

    /// Drops every binder and chained locator.
    pub fn clear(&mut self) {
        debug!(binders = self.binders.len(), "Registry cleared");
        self.binders.clear();
        self.ids.clear();
        self.by_name.clear();
        self.by_type.clear();
        self.chained.clear();
    }

    pub fn len(&self) -> usize {
        self.binders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binders.is_empty()
    }
}

fn locatable(kind: BinderKind, capability: &TypeKey) -> bool {
    match kind {
        BinderKind::Interceptor => false,
        BinderKind::External => !is_interceptor_contract(capability),
        _ => true,
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("binders", &self.binders.len())
            .field("names", &self.by_name.len())
            .field("capabilities", &self.by_type.len())
            .field("chained", &self.chained.len())
            .finish()
    }
}
