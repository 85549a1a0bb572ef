use std::path::PathBuf;

/// Errors produced while loading or validating a Boxer configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A required VM descriptor field was empty.
    #[error("invalid vm info for '{vm}': field '{field}' cannot be empty")]
    EmptyField { vm: String, field: &'static str },

    /// A VM descriptor carried an address that does not parse as IPv4 or IPv6.
    #[error("invalid vm info for '{vm}': '{ip}' is not a valid IP address")]
    InvalidIp { vm: String, ip: String },

    /// A command template is missing a reserved placeholder.
    #[error("vm control command '{command}' must contain the '{placeholder}' placeholder")]
    MissingPlaceholder {
        command: &'static str,
        placeholder: &'static str,
    },

    /// A control policy field was zero.
    #[error("vm control policy field '{field}' cannot be zero")]
    ZeroPolicy { field: &'static str },

    /// The configuration text is not valid TOML or does not match the schema.
    #[error("configuration parse failed: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("configuration read failed for {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
