//! Error types for the Vortex SDK.

/// Errors that can occur inside the Vortex SDK.
///
/// Tracking calls never return these; they are logged and dropped at the
/// fire-and-forget boundary. Only construction and settings loading surface
/// them to the host.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Collector answered with a non-success status.
    #[error("Collector returned HTTP {0}")]
    Status(reqwest::StatusCode),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Identity store I/O failed.
    #[error("Identity store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Settings or identity store file could not be parsed.
    #[error("Malformed TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Identity store could not be encoded.
    #[error("Failed to encode TOML: {0}")]
    TomlEncode(#[from] toml::ser::Error),
}
