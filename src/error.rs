use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeedError {
    #[error("Invalid coordinate: lat {lat}, lon {lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Timeout")]
    Timeout,

    #[error("Server unreachable: {0}")]
    Unreachable(std::io::Error),

    #[error("Connection closed by remote server")]
    ConnectionClosed,

    #[error("Invalid server response: {0}")]
    ProtocolViolation(String),

    #[error("Failed entire read: {actual} != {expected}")]
    ShortTransfer { expected: u64, actual: u64 },

    #[error("Requested ping count too high: {requested} > {max}")]
    ExcessiveSampleCount { requested: usize, max: usize },

    #[error("Failed to perform latency test on closest servers")]
    NoResponsiveServers,

    #[error("No servers found matching '{0}'")]
    NoMatches(String),

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("System time error: {0}")]
    SystemTime(#[from] std::time::SystemTimeError),

    #[error("{0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, SpeedError>;
