//! Shared resource arbitration
//!
//! A name-keyed slot per shared object with an optional single-holder
//! exclusive lock. The lock is advisory: there is no reference counting,
//! no fairness queue and no deadlock detection.

use agent_relay_core::AgentRole;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

type SharedObject = Arc<dyn Any + Send + Sync>;

struct Slot {
    object: SharedObject,
    holder: Option<AgentRole>,
}

/// Why a request was not granted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotFound,
    LockedBy(AgentRole),
}

/// Outcome of a resource request
#[derive(Clone)]
pub enum Grant {
    Granted(SharedObject),
    Denied(DenyReason),
}

impl Grant {
    pub fn is_granted(&self) -> bool {
        matches!(self, Grant::Granted(_))
    }

    /// Typed view of the granted object
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Grant::Granted(object) => Arc::clone(object).downcast::<T>().ok(),
            Grant::Denied(_) => None,
        }
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Grant::Granted(_) => None,
            Grant::Denied(reason) => Some(*reason),
        }
    }
}

impl std::fmt::Debug for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Grant::Granted(_) => f.write_str("Granted"),
            Grant::Denied(reason) => f.debug_tuple("Denied").field(reason).finish(),
        }
    }
}

#[derive(Default)]
pub struct ResourceArbiter {
    slots: Mutex<HashMap<String, Slot>>,
}

impl ResourceArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a shared object. An existing lock is kept.
    pub fn add<T: Any + Send + Sync>(&self, name: impl Into<String>, object: T) {
        self.add_shared(name, Arc::new(object));
    }

    pub fn add_shared(&self, name: impl Into<String>, object: SharedObject) {
        let name = name.into();
        let mut slots = self.slots.lock();
        match slots.get_mut(&name) {
            Some(slot) => slot.object = object,
            None => {
                slots.insert(name.clone(), Slot { object, holder: None });
            }
        }
        debug!(resource = %name, "Shared resource added");
    }

    /// Deregister an object and clear its lock
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.slots.lock().remove(name).is_some();
        if removed {
            debug!(resource = %name, "Shared resource removed");
        }
        removed
    }

    /// Access a shared object, optionally taking its exclusive lock.
    ///
    /// Denied when the name is unknown or the lock is held by another role.
    pub fn request(&self, requester: AgentRole, name: &str, exclusive: bool) -> Grant {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(name) else {
            warn!(resource = %name, requester = %requester, "Requested resource does not exist");
            return Grant::Denied(DenyReason::NotFound);
        };

        if let Some(holder) = slot.holder {
            if holder != requester {
                warn!(
                    resource = %name,
                    requester = %requester,
                    holder = %holder,
                    "Resource is exclusively locked"
                );
                return Grant::Denied(DenyReason::LockedBy(holder));
            }
        }

        if exclusive {
            slot.holder = Some(requester);
            debug!(resource = %name, holder = %requester, "Exclusive lock granted");
        }
        Grant::Granted(Arc::clone(&slot.object))
    }

    /// Clear the lock if `requester` holds it
    pub fn release(&self, requester: AgentRole, name: &str) -> bool {
        let mut slots = self.slots.lock();
        match slots.get_mut(name) {
            Some(slot) if slot.holder == Some(requester) => {
                slot.holder = None;
                debug!(resource = %name, holder = %requester, "Exclusive lock released");
                true
            }
            _ => false,
        }
    }

    pub fn holder(&self, name: &str) -> Option<AgentRole> {
        self.slots.lock().get(name).and_then(|slot| slot.holder)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.lock().contains_key(name)
    }

    /// Resource names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.lock().keys().cloned().collect();
        names.sort();
        names
    }
}
