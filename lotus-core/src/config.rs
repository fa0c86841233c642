//! Centralized configuration for Lotus.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Lotus components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct LotusConfig {
    pub streaming: StreamingConfig,
    pub server: ServerConfig,
    pub library: LibraryConfig,
}

/// How a `Range` header that cannot be parsed is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MalformedRangePolicy {
    /// Ignore the header and serve the whole file with 200.
    #[default]
    Lenient,
    /// Reject the request with 400 Bad Request.
    Strict,
}

impl std::str::FromStr for MalformedRangePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lenient" => Ok(MalformedRangePolicy::Lenient),
            "strict" => Ok(MalformedRangePolicy::Strict),
            _ => Err(format!("Invalid malformed range policy: {s}")),
        }
    }
}

/// Range streaming configuration.
///
/// The HTTP window served for a request and the size of the buffers used to
/// move it are separate knobs: `open_range_cap` shapes protocol responses,
/// `read_buffer_size` only shapes memory use per transfer.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Size of each read issued against a byte source during a transfer
    pub read_buffer_size: usize,
    /// A transfer is aborted when a storage read, or the client, makes no progress for this long
    pub idle_timeout: Duration,
    /// Upper bound on the window served for open-ended `bytes=N-` requests (None = whole remainder)
    pub open_range_cap: Option<u64>,
    /// Treatment of unparsable `Range` headers
    pub malformed_range_policy: MalformedRangePolicy,
    /// Answer denied requests with 404 instead of 403 so private ids are not revealed
    pub hide_denied: bool,
    /// `max-age` advertised in `Cache-Control` for served media
    pub cache_max_age: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 256 * 1024, // 256 KiB
            idle_timeout: Duration::from_secs(30),
            open_range_cap: None,
            malformed_range_policy: MalformedRangePolicy::Lenient,
            hide_denied: true,
            cache_max_age: Duration::from_secs(3600),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    /// Returns the `host:port` string the listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Local media library configuration.
#[derive(Debug, Clone, Default)]
pub struct LibraryConfig {
    /// Directory scanned for video files at startup
    pub media_dir: Option<PathBuf>,
}

impl LotusConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults. Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(size) = std::env::var("LOTUS_READ_BUFFER_SIZE")
            && let Ok(bytes) = size.parse::<usize>()
        {
            config.streaming.read_buffer_size = bytes;
        }

        if let Ok(timeout) = std::env::var("LOTUS_IDLE_TIMEOUT")
            && let Ok(seconds) = timeout.parse::<u64>()
        {
            config.streaming.idle_timeout = Duration::from_secs(seconds);
        }

        if let Ok(cap) = std::env::var("LOTUS_OPEN_RANGE_CAP")
            && let Ok(bytes) = cap.parse::<u64>()
        {
            config.streaming.open_range_cap = Some(bytes);
        }

        if let Ok(policy) = std::env::var("LOTUS_MALFORMED_RANGE")
            && let Ok(policy) = policy.parse::<MalformedRangePolicy>()
        {
            config.streaming.malformed_range_policy = policy;
        }

        if let Ok(hide) = std::env::var("LOTUS_HIDE_DENIED") {
            config.streaming.hide_denied = hide.parse().unwrap_or(true);
        }

        if let Ok(host) = std::env::var("LOTUS_HOST") {
            config.server.host = host;
        }

        if let Ok(port) = std::env::var("LOTUS_PORT")
            && let Ok(port) = port.parse::<u16>()
        {
            config.server.port = port;
        }

        if let Ok(dir) = std::env::var("LOTUS_MEDIA_DIR") {
            config.library.media_dir = Some(PathBuf::from(dir));
        }

        config
    }

    /// Checks that the configuration can drive a transfer.
    ///
    /// # Errors
    /// - `LotusError::Configuration` - Zero buffer size, zero idle timeout or zero range cap
    pub fn validate(&self) -> crate::Result<()> {
        if self.streaming.read_buffer_size == 0 {
            return Err(crate::LotusError::Configuration {
                reason: "read_buffer_size must be greater than zero".to_string(),
            });
        }
        if self.streaming.idle_timeout.is_zero() {
            return Err(crate::LotusError::Configuration {
                reason: "idle_timeout must be greater than zero".to_string(),
            });
        }
        if self.streaming.open_range_cap == Some(0) {
            return Err(crate::LotusError::Configuration {
                reason: "open_range_cap must be greater than zero when set".to_string(),
            });
        }
        Ok(())
    }
}
