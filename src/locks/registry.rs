// src/locks/registry.rs

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::dag::{NodeId, ResourceRequirement};
use crate::errors::{Result, SchedulerError};
use crate::types::AccessMode;

/// Current owners of one resource key.
#[derive(Debug)]
struct LockEntry {
    mode: AccessMode,
    holders: BTreeSet<NodeId>,
}

/// Exclusive/shared ownership of named resources for one execution session.
///
/// Every operation is non-blocking. The registry has no internal locking: it
/// is owned by the coordinator and only touched from its critical section.
#[derive(Debug, Default)]
pub struct ResourceLockRegistry {
    locks: HashMap<String, LockEntry>,
}

/// Grants held by one node, acquired and released as a unit.
///
/// Produced by [`ResourceLockRegistry::try_acquire_all`]. The value travels
/// with the node into execution and comes back with its completion, where it
/// is handed to [`ResourceLockRegistry::release_all`].
#[derive(Debug, PartialEq, Eq)]
pub struct HeldLocks {
    holder: NodeId,
    grants: Vec<ResourceRequirement>,
}

impl HeldLocks {
    pub fn holder(&self) -> NodeId {
        self.holder
    }

    pub fn grants(&self) -> &[ResourceRequirement] {
        &self.grants
    }

    /// Whether these grants satisfy every requirement of `holder`.
    pub fn covers(&self, holder: NodeId, requirements: &[ResourceRequirement]) -> bool {
        self.holder == holder
            && requirements.iter().all(|req| {
                self.grants
                    .iter()
                    .any(|g| g.key == req.key && (g.mode == req.mode || g.mode == AccessMode::Exclusive))
            })
    }
}

impl ResourceLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to add `holder` to the owners of `key` in `mode`.
    ///
    /// Succeeds when the key is free, or when both the current owners and the
    /// request are shared. A holder asking again for a key it already owns is
    /// refused.
    pub fn try_acquire(&mut self, key: &str, mode: AccessMode, holder: NodeId) -> bool {
        match self.locks.get_mut(key) {
            None => {
                self.locks.insert(
                    key.to_string(),
                    LockEntry {
                        mode,
                        holders: BTreeSet::from([holder]),
                    },
                );
                true
            }
            Some(entry) => {
                if entry.holders.contains(&holder) {
                    return false;
                }
                if entry.holders.is_empty() {
                    entry.mode = mode;
                    entry.holders.insert(holder);
                    true
                } else if entry.mode.compatible_with(mode) {
                    entry.holders.insert(holder);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Remove `holder` from the owners of `key`.
    ///
    /// Releasing a key the holder does not own is a scheduler bug and is
    /// reported as [`SchedulerError::ResourceLockInconsistency`].
    pub fn release(&mut self, key: &str, holder: NodeId) -> Result<()> {
        let removed = match self.locks.get_mut(key) {
            Some(entry) => {
                let removed = entry.holders.remove(&holder);
                if entry.holders.is_empty() {
                    self.locks.remove(key);
                }
                removed
            }
            None => false,
        };

        if !removed {
            return Err(SchedulerError::ResourceLockInconsistency {
                key: key.to_string(),
                holder: holder.to_string(),
            });
        }
        Ok(())
    }

    /// Acquire every requirement for `holder`, or none of them.
    pub fn try_acquire_all(
        &mut self,
        requirements: &[ResourceRequirement],
        holder: NodeId,
    ) -> Option<HeldLocks> {
        let mut granted: Vec<ResourceRequirement> = Vec::with_capacity(requirements.len());

        for req in requirements {
            if self.try_acquire(&req.key, req.mode, holder) {
                granted.push(req.clone());
                continue;
            }

            debug!(
                %holder,
                key = %req.key,
                mode = %req.mode,
                "resource unavailable; rolling back partial grants"
            );
            for g in granted.iter().rev() {
                if let Err(err) = self.release(&g.key, holder) {
                    warn!(%holder, key = %g.key, error = %err, "rollback of partial grant failed");
                }
            }
            return None;
        }

        Some(HeldLocks {
            holder,
            grants: granted,
        })
    }

    /// Release every grant in `locks`.
    ///
    /// All grants are attempted; the first inconsistency is returned.
    pub fn release_all(&mut self, locks: HeldLocks) -> Result<()> {
        let mut first_err = None;
        for g in &locks.grants {
            if let Err(err) = self.release(&g.key, locks.holder) {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Current holders of `key`, in id order.
    pub fn holders(&self, key: &str) -> Vec<NodeId> {
        self.locks
            .get(key)
            .map(|e| e.holders.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Mode the key is currently held in, if held at all.
    pub fn mode_of(&self, key: &str) -> Option<AccessMode> {
        self.locks.get(key).map(|e| e.mode)
    }

    /// No key is held by anyone.
    pub fn is_idle(&self) -> bool {
        self.locks.is_empty()
    }
}
