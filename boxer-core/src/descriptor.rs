//! Static description of a managed VM.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Immutable descriptor of one VM, as supplied by configuration.
///
/// `name` is unique within `group`; together they identify the VM.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct VmInfo {
    /// Hypervisor-side machine name, substituted for `$machine`.
    pub name: String,
    /// Snapshot name, substituted for `$snapshot`.
    pub snapshot: String,
    /// Address the guest is reachable at.
    pub ip: String,
    /// Free-form OS tag, e.g. `"linux"` or `"windows"`.
    pub os: String,
    /// Allocation group the VM belongs to.
    pub group: String,
}

impl VmInfo {
    /// Creates a descriptor from its parts.
    pub fn new(
        name: impl Into<String>,
        snapshot: impl Into<String>,
        ip: impl Into<String>,
        os: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            snapshot: snapshot.into(),
            ip: ip.into(),
            os: os.into(),
            group: group.into(),
        }
    }

    /// Checks that every field is present and that `ip` parses.
    ///
    /// # Errors
    /// Returns [`CoreError::EmptyField`] for the first empty field, or
    /// [`CoreError::InvalidIp`] if `ip` is not an IPv4/IPv6 address.
    pub fn validate(&self) -> Result<(), CoreError> {
        let fields = [
            ("name", &self.name),
            ("snapshot", &self.snapshot),
            ("os", &self.os),
            ("group", &self.group),
            ("ip", &self.ip),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(CoreError::EmptyField { vm: self.name.clone(), field });
            }
        }
        if self.ip.parse::<IpAddr>().is_err() {
            return Err(CoreError::InvalidIp { vm: self.name.clone(), ip: self.ip.clone() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> VmInfo {
        VmInfo::new("vm1", "snapshot1", "127.0.0.1", "linux", "group1")
    }

    #[test]
    fn valid_descriptor_passes() {
        assert!(info().validate().is_ok());
        let v6 = VmInfo { ip: "::1".to_owned(), ..info() };
        assert!(v6.validate().is_ok(), "IPv6 addresses must be accepted");
    }

    #[test]
    fn empty_snapshot_is_rejected() {
        let vm = VmInfo { snapshot: String::new(), ..info() };
        match vm.validate() {
            Err(CoreError::EmptyField { vm, field }) => {
                assert_eq!(vm, "vm1");
                assert_eq!(field, "snapshot");
            }
            other => panic!("expected EmptyField, got {other:?}"),
        }
    }

    #[test]
    fn unparsable_ip_is_rejected() {
        let vm = VmInfo { ip: "300.1.1.1".to_owned(), ..info() };
        assert!(
            matches!(vm.validate(), Err(CoreError::InvalidIp { .. })),
            "out-of-range octet must fail"
        );
    }
}
