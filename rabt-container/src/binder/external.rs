//! Binders for instances supplied by the application.

use std::collections::HashMap;
use std::fmt;

use super::{Binder, BinderId, ErasedInstance};
use crate::dependency::Dependency;
use crate::error::Result;
use crate::key::TypeKey;
use crate::kind::{BinderKind, LifecycleState};

/// An application-owned instance, always ready.
///
/// Identified by its runtime type; it has no name and no dependencies and
/// its instances are handed out as is, without interception.
pub(crate) struct ExternalBinder {
    id: BinderId,
    capabilities: Vec<TypeKey>,
    instances: HashMap<TypeKey, ErasedInstance>,
}

impl ExternalBinder {
    pub fn new(implementation: TypeKey, exposed: Vec<(TypeKey, ErasedInstance)>) -> Self {
        let mut capabilities = Vec::with_capacity(exposed.len());
        let mut instances = HashMap::with_capacity(exposed.len());
        for (key, instance) in exposed {
            if instances.insert(key, instance).is_none() {
                capabilities.push(key);
            }
        }
        Self {
            id: BinderId::new(BinderKind::External, implementation),
            capabilities,
            instances,
        }
    }
}

impl Binder for ExternalBinder {
    fn id(&self) -> &BinderId {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        None
    }

    fn capabilities(&self) -> &[TypeKey] {
        &self.capabilities
    }

    fn dependencies(&self) -> &[Dependency] {
        &[]
    }

    fn instance(&self, capability: &TypeKey) -> Result<Option<ErasedInstance>> {
        Ok(self.instances.get(capability).cloned())
    }

    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn state(&self) -> Option<LifecycleState> {
        Some(LifecycleState::Ready)
    }
}

impl fmt::Debug for ExternalBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalBinder")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}
