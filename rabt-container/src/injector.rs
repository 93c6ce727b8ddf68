//! Configuration and dependency injection.
//!
//! An [`InjectionPlan`] lists the configuration-bound and capability-bound
//! setters of a type. The [`Injector`] runs it in two passes, configuration
//! first, dependencies second:
//!
//! ```rust,ignore
//! let plan = InjectionPlan::new()
//!     .configure(Configure::required("smtp.port", |m: &mut Mailer, port: u16| m.port = port))
//!     .inject(Inject::required(|m: &mut Mailer, log: Arc<dyn AuditLog>| m.audit = Some(log)));
//!
//! container.injector().inject(&mut mailer, &plan)?;
//! ```

use std::any::{Any, type_name};
use std::fmt;
use std::sync::{Arc, Weak};

use rabt_support::rendering::shorten_type_name;
use tracing::{debug, trace, warn};

use crate::binder::{ErasedInstance, unerase};
use crate::config::ConfigValue;
use crate::container::ContainerState;
use crate::dependency::Dependency;
use crate::error::{RabtError, Result, UnresolvedDependencyError};
use crate::key::TypeKey;
use crate::locator::{ContainerLocator, Locator};

type ConfigSetter<T> = Box<dyn Fn(&mut T, &ConfigValue) -> bool + Send + Sync>;
type DependencySetter<T> = Box<dyn Fn(&mut T, &ErasedInstance) -> bool + Send + Sync>;

/// A configuration-bound setter.
///
/// The lookup key is the explicit [`key`](Configure::key) if one is set,
/// the field label otherwise.
pub struct Configure<T> {
    field: &'static str,
    key: Option<String>,
    value_type: TypeKey,
    required: bool,
    apply: ConfigSetter<T>,
}

impl<T: 'static> Configure<T> {
    /// A setter that fails injection when no provider has the key.
    pub fn required<V, F>(field: &'static str, setter: F) -> Self
    where
        V: Clone + Send + Sync + 'static,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        Self::bind(field, true, setter)
    }

    /// A setter that is skipped when no provider has the key.
    pub fn optional<V, F>(field: &'static str, setter: F) -> Self
    where
        V: Clone + Send + Sync + 'static,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        Self::bind(field, false, setter)
    }

    fn bind<V, F>(field: &'static str, required: bool, setter: F) -> Self
    where
        V: Clone + Send + Sync + 'static,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        Self {
            field,
            key: None,
            value_type: TypeKey::of::<V>(),
            required,
            apply: Box::new(move |target: &mut T, value: &ConfigValue| match (**value).downcast_ref::<V>() {
                Some(v) => {
                    setter(target, v.clone());
                    true
                }
                None => false,
            }),
        }
    }

    /// Looks the value up under `key` instead of the field label.
    pub fn key(mut self, key: &str) -> Self {
        let key = key.trim();
        self.key = (!key.is_empty()).then(|| key.to_string());
        self
    }

    pub fn lookup_key(&self) -> &str {
        self.key.as_deref().unwrap_or(self.field)
    }

    pub fn is_required(&self) -> bool {
        self.required
    }
}

impl<T> fmt::Debug for Configure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configure")
            .field("field", &self.field)
            .field("key", &self.key)
            .field("value_type", &self.value_type.type_name())
            .field("required", &self.required)
            .finish()
    }
}

/// A capability-bound setter.
pub struct Inject<T> {
    dependency: Dependency,
    apply: DependencySetter<T>,
}

impl<T: 'static> Inject<T> {
    /// A setter that fails injection when the capability cannot be located.
    pub fn required<D, F>(setter: F) -> Self
    where
        D: ?Sized + 'static,
        F: Fn(&mut T, Arc<D>) + Send + Sync + 'static,
    {
        Self::bind(Dependency::on::<D>(), setter)
    }

    /// A setter that is skipped when the capability cannot be located.
    pub fn optional<D, F>(setter: F) -> Self
    where
        D: ?Sized + 'static,
        F: Fn(&mut T, Arc<D>) + Send + Sync + 'static,
    {
        Self::bind(Dependency::on::<D>().optional(), setter)
    }

    fn bind<D, F>(dependency: Dependency, setter: F) -> Self
    where
        D: ?Sized + 'static,
        F: Fn(&mut T, Arc<D>) + Send + Sync + 'static,
    {
        Self {
            dependency,
            apply: Box::new(move |target: &mut T, erased: &ErasedInstance| match unerase::<D>(erased) {
                Some(instance) => {
                    setter(target, instance);
                    true
                }
                None => false,
            }),
        }
    }

    /// Only the binder bound under `name` satisfies this setter.
    pub fn named(mut self, name: &str) -> Self {
        self.dependency = self.dependency.named(name);
        self
    }

    pub fn dependency(&self) -> &Dependency {
        &self.dependency
    }
}

impl<T> fmt::Debug for Inject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Inject").field(&self.dependency).finish()
    }
}

/// The injection points of a type.
pub struct InjectionPlan<T> {
    configure: Vec<Configure<T>>,
    inject: Vec<Inject<T>>,
}

impl<T: 'static> InjectionPlan<T> {
    pub fn new() -> Self {
        Self { configure: Vec::new(), inject: Vec::new() }
    }

    pub fn configure(mut self, binding: Configure<T>) -> Self {
        self.configure.push(binding);
        self
    }

    pub fn inject(mut self, binding: Inject<T>) -> Self {
        self.inject.push(binding);
        self
    }

    /// The dependency edges declared by the capability-bound setters.
    pub fn dependencies(&self) -> Vec<Dependency> {
        self.inject.iter().map(|i| i.dependency.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.configure.is_empty() && self.inject.is_empty()
    }
}

impl<T: 'static> Default for InjectionPlan<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for InjectionPlan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionPlan")
            .field("configure", &self.configure)
            .field("inject", &self.inject)
            .finish()
    }
}

/// Injects configuration values and dependencies into objects.
///
/// Used by the container for every entity it assembles, and available to
/// the application for objects it creates itself.
#[derive(Clone)]
pub struct Injector {
    state: Weak<ContainerState>,
}

impl Injector {
    pub(crate) fn new(state: Weak<ContainerState>) -> Self {
        Self { state }
    }

    fn state(&self) -> Result<Arc<ContainerState>> {
        self.state.upgrade().ok_or(RabtError::ContainerDropped)
    }

    /// Runs the configuration pass, then the dependency pass.
    ///
    /// # Errors
    /// [`RabtError::MissingConfiguration`] for a required key no provider
    /// has, [`RabtError::Unresolved`] for a required capability that cannot
    /// be located.
    pub fn inject<T: Any>(&self, target: &mut T, plan: &InjectionPlan<T>) -> Result<()> {
        self.configure(target, plan)?;
        self.wire(target, plan)
    }

    pub(crate) fn configure<T: Any>(&self, target: &mut T, plan: &InjectionPlan<T>) -> Result<()> {
        if plan.configure.is_empty() {
            return Ok(());
        }
        let state = self.state()?;

        'bindings: for binding in &plan.configure {
            let key = binding.lookup_key();
            for provider in &state.config {
                if !provider.contains(key) {
                    continue;
                }
                let Some(value) = provider.value(key, &binding.value_type) else {
                    continue;
                };
                if (binding.apply)(target, &value) {
                    trace!(key, provider = provider.name(), "Configuration applied");
                    continue 'bindings;
                }
            }

            let owner = shorten_type_name(type_name::<T>());
            if binding.required {
                return Err(RabtError::MissingConfiguration {
                    key: key.to_string(),
                    target: owner,
                });
            }
            warn!(key, target = %owner, "Optional configuration missing, keeping default");
        }
        Ok(())
    }

    pub(crate) fn wire<T: Any>(&self, target: &mut T, plan: &InjectionPlan<T>) -> Result<()> {
        if plan.inject.is_empty() {
            return Ok(());
        }
        let locator = ContainerLocator::new(self.state.clone());

        for binding in &plan.inject {
            let dependency = &binding.dependency;
            let found = match dependency.name() {
                Some(name) => locator.lookup_named(name, dependency.capability())?,
                None => locator.lookup(dependency.capability())?,
            };

            if let Some(instance) = found {
                if (binding.apply)(target, &instance) {
                    continue;
                }
            }

            if dependency.is_required() {
                let suggestions = self.state()?.registry.read().suggestions(dependency.capability());
                return Err(RabtError::Unresolved(UnresolvedDependencyError {
                    dependency: dependency.clone(),
                    required_by: Some(shorten_type_name(type_name::<T>())),
                    suggestions,
                }));
            }
            debug!(dependency = %dependency, "Optional dependency unavailable, left unset");
        }
        Ok(())
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("attached", &(self.state.strong_count() > 0))
            .finish()
    }
}
