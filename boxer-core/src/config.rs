//! Boxer configuration: VM inventory, control commands, and control policy.
//!
//! Configuration is read from TOML. Parsing and validation are separate steps;
//! [`BoxerConfig::load`] performs both.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::descriptor::VmInfo;
use crate::error::CoreError;
use crate::lifecycle::Operation;

/// Placeholder replaced by the VM's machine name.
pub const MACHINE_PLACEHOLDER: &str = "$machine";

/// Placeholder replaced by the VM's snapshot name.
pub const SNAPSHOT_PLACEHOLDER: &str = "$snapshot";

/// Shell command templates used to drive the hypervisor.
///
/// Templates are split on whitespace; each token may contain the reserved
/// placeholders [`MACHINE_PLACEHOLDER`] and [`SNAPSHOT_PLACEHOLDER`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct VmControl {
    /// Powers a VM on. Must contain `$machine`.
    pub start_cmd: String,
    /// Powers a VM off. Must contain `$machine`.
    pub stop_cmd: String,
    /// Restores a VM's snapshot. Must contain `$machine` and `$snapshot`.
    pub restore_snapshot_cmd: String,
}

impl VmControl {
    /// Creates a command set from the three templates.
    pub fn new(
        start_cmd: impl Into<String>,
        stop_cmd: impl Into<String>,
        restore_snapshot_cmd: impl Into<String>,
    ) -> Self {
        Self {
            start_cmd: start_cmd.into(),
            stop_cmd: stop_cmd.into(),
            restore_snapshot_cmd: restore_snapshot_cmd.into(),
        }
    }

    /// Returns the template for `op`.
    #[must_use]
    pub fn template(&self, op: Operation) -> &str {
        match op {
            Operation::Start => &self.start_cmd,
            Operation::Stop => &self.stop_cmd,
            Operation::Restore => &self.restore_snapshot_cmd,
        }
    }

    /// Checks that every template carries its reserved placeholders.
    ///
    /// # Errors
    /// Returns [`CoreError::MissingPlaceholder`] naming the first offending
    /// command and placeholder.
    pub fn check_placeholders(&self) -> Result<(), CoreError> {
        let required = [
            ("start_cmd", &self.start_cmd, MACHINE_PLACEHOLDER),
            ("stop_cmd", &self.stop_cmd, MACHINE_PLACEHOLDER),
            ("restore_snapshot_cmd", &self.restore_snapshot_cmd, MACHINE_PLACEHOLDER),
            ("restore_snapshot_cmd", &self.restore_snapshot_cmd, SNAPSHOT_PLACEHOLDER),
        ];
        for (command, template, placeholder) in required {
            if !template.contains(placeholder) {
                return Err(CoreError::MissingPlaceholder { command, placeholder });
            }
        }
        Ok(())
    }
}

/// Throttling and quota policy for VM control commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct ControlPolicy {
    /// Minimum spacing between two hypervisor commands, in seconds.
    #[serde(rename = "interval")]
    pub interval_sec: u64,
    /// Deadline for a single hypervisor command, in seconds.
    #[serde(rename = "timeout")]
    pub timeout_sec: u64,
    /// Maximum number of VMs allocated at once, across all groups.
    pub max_vm_operations: u32,
}

impl ControlPolicy {
    /// Creates a policy. Call [`ControlPolicy::validate`] before use.
    #[must_use]
    pub const fn new(interval_sec: u64, timeout_sec: u64, max_vm_operations: u32) -> Self {
        Self { interval_sec, timeout_sec, max_vm_operations }
    }

    /// Cool-down between commands.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_sec)
    }

    /// Per-command deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }

    /// Checks that no field is zero.
    ///
    /// # Errors
    /// Returns [`CoreError::ZeroPolicy`] naming the first zero field.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.interval_sec == 0 {
            return Err(CoreError::ZeroPolicy { field: "interval" });
        }
        if self.timeout_sec == 0 {
            return Err(CoreError::ZeroPolicy { field: "timeout" });
        }
        if self.max_vm_operations == 0 {
            return Err(CoreError::ZeroPolicy { field: "max_vm_operations" });
        }
        Ok(())
    }
}

/// Top-level Boxer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct BoxerConfig {
    /// Managed VMs, keyed by machine name.
    pub vm_info: BTreeMap<String, VmInfo>,
    /// Hypervisor command templates.
    pub vm_control: VmControl,
    /// Throttling and quota policy.
    pub vm_control_policy: ControlPolicy,
}

impl BoxerConfig {
    /// Assembles a configuration, keying each VM by its machine name.
    pub fn new(
        vms: impl IntoIterator<Item = VmInfo>,
        vm_control: VmControl,
        vm_control_policy: ControlPolicy,
    ) -> Self {
        let vm_info = vms.into_iter().map(|vm| (vm.name.clone(), vm)).collect();
        Self { vm_info, vm_control, vm_control_policy }
    }

    /// Parses TOML text without validating it.
    ///
    /// # Errors
    /// Returns [`CoreError::Parse`] on malformed TOML or schema mismatch.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads, parses, and validates a configuration file.
    ///
    /// # Errors
    /// Returns [`CoreError::Read`] if the file cannot be read, otherwise any
    /// error from [`BoxerConfig::parse`] or [`BoxerConfig::validate`].
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| CoreError::Read { path: path.to_owned(), source })?;
        let config = Self::parse(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates command templates, every VM descriptor, then the policy.
    ///
    /// # Errors
    /// Returns the first validation failure encountered.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.vm_control.check_placeholders()?;
        for vm in self.vm_info.values() {
            vm.validate()?;
        }
        self.vm_control_policy.validate()
    }

    /// Iterates VM descriptors in machine-name order.
    pub fn vms(&self) -> impl Iterator<Item = &VmInfo> {
        self.vm_info.values()
    }
}
