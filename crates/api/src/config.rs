use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for a desktop session. Override via
/// environment variables (or a `.env` file).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `127.0.0.1`).
    pub host: String,
    /// Bind port (default: `0`, an ephemeral port chosen by the OS).
    pub port: u16,
    /// Directory holding the user configuration sections.
    pub config_dir: PathBuf,
    /// Root under which items are staged and installed.
    pub data_dir: PathBuf,
    /// Interval between job progress polls (default: `100` ms).
    pub job_poll_interval: Duration,
    /// Interval between WebSocket heartbeat pings (default: `30` s).
    pub heartbeat_interval: Duration,
    /// How long to wait for connections to drain on shutdown (default: `5` s).
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                          |
    /// |---------------------------|----------------------------------|
    /// | `HOST`                    | `127.0.0.1`                      |
    /// | `PORT`                    | `0`                              |
    /// | `OCS_CONFIG_DIR`          | `<user config dir>/ocs-manager`  |
    /// | `OCS_DATA_DIR`            | `<user data dir>`                |
    /// | `JOB_POLL_INTERVAL_MS`    | `100`                            |
    /// | `HEARTBEAT_INTERVAL_SECS` | `30`                             |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `5`                              |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "0".into())
            .parse()
            .expect("PORT must be a valid u16");

        let config_dir = std::env::var("OCS_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(std::env::temp_dir)
                    .join("ocs-manager")
            });

        let data_dir = std::env::var("OCS_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::data_dir().unwrap_or_else(std::env::temp_dir));

        let job_poll_interval_ms: u64 = std::env::var("JOB_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "100".into())
            .parse()
            .expect("JOB_POLL_INTERVAL_MS must be a valid u64");

        let heartbeat_interval_secs: u64 = std::env::var("HEARTBEAT_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("HEARTBEAT_INTERVAL_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            config_dir,
            data_dir,
            job_poll_interval: Duration::from_millis(job_poll_interval_ms.max(1)),
            heartbeat_interval: Duration::from_secs(heartbeat_interval_secs.max(1)),
            shutdown_timeout: Duration::from_secs(shutdown_timeout_secs),
        }
    }

    /// Directory where downloads are written before being saved.
    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("ocs-manager").join("staging")
    }
}
