//! Sample configuration demonstrating the schema.
//!
//! Three VirtualBox machines in two groups: `windows-pool` holds two clones of
//! the same Windows image, `linux-pool` holds a single OpenSSH box.

use crate::config::{BoxerConfig, ControlPolicy, VmControl};
use crate::descriptor::VmInfo;

/// The sample configuration as TOML text.
pub const SAMPLE_CONFIG: &str = r#"# Boxer configuration.
#
# Reserved placeholders in vm_control commands:
#   $machine   replaced by vm_info.<name>.name
#   $snapshot  replaced by vm_info.<name>.snapshot

[vm_info.win10-dev]
name = "win10-dev"
snapshot = "snapshot0"
ip = "192.168.56.11"
os = "windows"
group = "windows-pool"

[vm_info.win10-dev-clone-0]
name = "win10-dev-clone-0"
snapshot = "snapshot0"
ip = "192.168.56.12"
os = "windows"
group = "windows-pool"

[vm_info.openssh]
name = "openssh"
snapshot = "clean"
ip = "192.168.56.21"
os = "linux"
group = "linux-pool"

[vm_control]
start_cmd = "VBoxManage startvm $machine --type headless"
stop_cmd = "VBoxManage controlvm $machine poweroff"
restore_snapshot_cmd = "VBoxManage snapshot $machine restore $snapshot"

[vm_control_policy]
interval = 1
timeout = 30
max_vm_operations = 3
"#;

/// Returns the sample configuration built in code.
///
/// Equivalent to parsing [`SAMPLE_CONFIG`].
#[must_use]
pub fn sample_config() -> BoxerConfig {
    BoxerConfig::new(
        [
            VmInfo::new("win10-dev", "snapshot0", "192.168.56.11", "windows", "windows-pool"),
            VmInfo::new(
                "win10-dev-clone-0",
                "snapshot0",
                "192.168.56.12",
                "windows",
                "windows-pool",
            ),
            VmInfo::new("openssh", "clean", "192.168.56.21", "linux", "linux-pool"),
        ],
        VmControl::new(
            "VBoxManage startvm $machine --type headless",
            "VBoxManage controlvm $machine poweroff",
            "VBoxManage snapshot $machine restore $snapshot",
        ),
        ControlPolicy::new(1, 30, 3),
    )
}
