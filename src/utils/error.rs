use thiserror::Error;

/// Configuration errors. All of these are fatal at startup; the daemon has
/// no live-reconfiguration path, so none of them can occur at runtime.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A subnet rule could not be parsed or has host bits set
    #[error("Invalid subnet '{0}': {1}")]
    InvalidSubnet(String, String),

    /// The sampling interval must be positive
    #[error("Sampling interval must be greater than zero")]
    ZeroInterval,

    /// At least one resolution tier is required
    #[error("At least one resolution tier must be configured")]
    EmptyTiers,

    /// A tier was configured with zero capacity
    #[error("Resolution tier '{0}' must have a capacity greater than zero")]
    ZeroCapacity(String),

    /// A tier was configured with zero sample spacing
    #[error("Resolution tier '{0}' must have a sample spacing greater than zero")]
    ZeroSpacing(String),

    /// Error reading the configuration file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing the configuration file
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml_edit::de::Error),
}
