//! Resource pool: named groups of VM contexts under a global quota.
//!
//! Each group keeps a FIFO free list and an allocated set. Allocation
//! reserves a slot in the global in-flight counter before touching a group,
//! so the quota holds across all groups even under contention.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use boxer_core::{BoxerConfig, ControlPolicy, VmInfo};

use crate::{EngineError, VmContext};

/// Occupancy of one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupStats {
    /// Number of VMs configured in the group.
    pub size: usize,
    /// VMs available for allocation.
    pub free: usize,
    /// VMs currently handed out.
    pub allocated: usize,
}

#[derive(Debug)]
struct ResourceGroup {
    name: String,
    size: usize,
    free: VecDeque<Arc<VmContext>>,
    allocated: HashMap<String, Arc<VmContext>>,
}

impl ResourceGroup {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            size: 0,
            free: VecDeque::new(),
            allocated: HashMap::new(),
        }
    }

    fn contains(&self, machine: &str) -> bool {
        self.allocated.contains_key(machine) || self.free.iter().any(|ctx| ctx.machine() == machine)
    }

    fn stats(&self) -> GroupStats {
        GroupStats { size: self.size, free: self.free.len(), allocated: self.allocated.len() }
    }

    fn check_invariant(&self) -> Result<(), EngineError> {
        let stats = self.stats();
        if stats.size == stats.free + stats.allocated {
            Ok(())
        } else {
            Err(EngineError::Internal(format!(
                "group '{}' lost track of a VM: size {} != free {} + allocated {}",
                self.name, stats.size, stats.free, stats.allocated
            )))
        }
    }
}

/// Pool of VM contexts partitioned into groups.
///
/// Every group is guarded by its own lock; the in-flight counter is shared.
#[derive(Debug)]
pub struct VmCompose {
    groups: HashMap<String, Mutex<ResourceGroup>>,
    in_flight: AtomicU32,
    max: u32,
}

impl VmCompose {
    /// Build the pool from VM descriptors, in iteration order.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidArgument`] if a descriptor has an empty
    /// group, a machine name appears twice in one group, or the policy's
    /// `max_vm_operations` is zero.
    pub fn new<'a>(
        vms: impl IntoIterator<Item = &'a VmInfo>,
        policy: &ControlPolicy,
    ) -> Result<Self, EngineError> {
        if policy.max_vm_operations == 0 {
            return Err(EngineError::InvalidArgument(
                "max_vm_operations must be greater than zero".to_owned(),
            ));
        }

        let mut groups: HashMap<String, ResourceGroup> = HashMap::new();
        for info in vms {
            if info.group.is_empty() {
                return Err(EngineError::InvalidArgument(format!(
                    "VM '{}' has an empty group name",
                    info.name
                )));
            }
            let group = groups
                .entry(info.group.clone())
                .or_insert_with(|| ResourceGroup::new(&info.group));
            if group.contains(&info.name) {
                return Err(EngineError::InvalidArgument(format!(
                    "VM '{}' appears twice in group '{}'",
                    info.name, info.group
                )));
            }
            group.free.push_back(Arc::new(VmContext::new(info.clone())));
            group.size += 1;
        }

        tracing::info!(
            groups = groups.len(),
            vms = groups.values().map(|g| g.size).sum::<usize>(),
            max_operations = policy.max_vm_operations,
            "vm pool ready"
        );

        Ok(Self {
            groups: groups.into_iter().map(|(name, group)| (name, Mutex::new(group))).collect(),
            in_flight: AtomicU32::new(0),
            max: policy.max_vm_operations,
        })
    }

    /// Build the pool from a loaded configuration.
    ///
    /// # Errors
    /// See [`VmCompose::new`].
    pub fn from_config(config: &BoxerConfig) -> Result<Self, EngineError> {
        Self::new(config.vms(), &config.vm_control_policy)
    }

    /// Hand out the oldest free VM of `group`.
    ///
    /// Returns `Ok(None)` when the global quota is reached or the group has no
    /// free VM. That is backpressure, not a failure.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidArgument`] for an unknown group and
    /// [`EngineError::Internal`] if the group's bookkeeping is inconsistent.
    ///
    /// # Panics
    /// Panics if the group's lock is poisoned.
    pub fn allocate(&self, group: &str) -> Result<Option<Arc<VmContext>>, EngineError> {
        let slot = self.slot(group)?;

        if self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.max).then_some(n + 1))
            .is_err()
        {
            tracing::debug!(group, max = self.max, "quota reached");
            return Ok(None);
        }

        let mut guard = lock(slot);
        let Some(ctx) = guard.free.pop_front() else {
            drop(guard);
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            tracing::debug!(group, "no free VM in group");
            return Ok(None);
        };
        guard.allocated.insert(ctx.machine().to_owned(), Arc::clone(&ctx));
        guard.check_invariant()?;
        drop(guard);

        tracing::info!(group, machine = %ctx.machine(), "vm allocated");
        Ok(Some(ctx))
    }

    /// Return an allocated VM to its group's free list.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidArgument`] if the context's group is
    /// unknown or the context is not currently allocated from this pool, and
    /// [`EngineError::Internal`] if the group's bookkeeping is inconsistent.
    ///
    /// # Panics
    /// Panics if the group's lock is poisoned.
    pub fn free(&self, ctx: &Arc<VmContext>) -> Result<(), EngineError> {
        let slot = self.slot(ctx.group())?;
        let mut guard = lock(slot);

        let owned = guard
            .allocated
            .get(ctx.machine())
            .is_some_and(|held| Arc::ptr_eq(held, ctx));
        if !owned {
            return Err(EngineError::InvalidArgument(format!(
                "VM '{}' is not allocated from group '{}'",
                ctx.machine(),
                ctx.group()
            )));
        }

        if let Some(held) = guard.allocated.remove(ctx.machine()) {
            guard.free.push_back(held);
        }
        guard.check_invariant()?;
        drop(guard);

        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        tracing::info!(group = %ctx.group(), machine = %ctx.machine(), "vm freed");
        Ok(())
    }

    /// Number of VMs currently allocated across all groups.
    #[must_use]
    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::Acquire)
    }

    /// The global allocation quota.
    #[must_use]
    pub fn max_operations(&self) -> u32 {
        self.max
    }

    /// Group names, sorted.
    #[must_use]
    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.groups.keys().cloned().collect();
        names.sort();
        names
    }

    /// Occupancy of `group`, or `None` if it does not exist.
    ///
    /// # Panics
    /// Panics if the group's lock is poisoned.
    #[must_use]
    pub fn group_stats(&self, group: &str) -> Option<GroupStats> {
        self.groups.get(group).map(|slot| lock(slot).stats())
    }

    /// Every context in the pool, free or allocated, sorted by group then machine.
    ///
    /// # Panics
    /// Panics if a group's lock is poisoned.
    #[must_use]
    pub fn contexts(&self) -> Vec<Arc<VmContext>> {
        let mut all = Vec::new();
        for slot in self.groups.values() {
            let guard = lock(slot);
            all.extend(guard.free.iter().cloned());
            all.extend(guard.allocated.values().cloned());
        }
        all.sort_by(|a, b| (a.group(), a.machine()).cmp(&(b.group(), b.machine())));
        all
    }

    fn slot(&self, group: &str) -> Result<&Mutex<ResourceGroup>, EngineError> {
        self.groups
            .get(group)
            .ok_or_else(|| EngineError::InvalidArgument(format!("unknown group '{group}'")))
    }
}

fn lock(slot: &Mutex<ResourceGroup>) -> MutexGuard<'_, ResourceGroup> {
    #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
    let guard = slot.lock().expect("resource group lock poisoned");
    guard
}
