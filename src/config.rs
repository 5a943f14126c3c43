use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub account: AccountConfig,
    pub auth: AuthConfig,
    pub sidecar: SidecarConfig,
    #[serde(default)]
    pub call: CallConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub presence: Option<PresenceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AccountConfig {
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// OAuth token endpoint (client-credentials grant).
    pub url: String,
    pub user: String,
    pub pass: String,
    /// Reuse an issued token across call attempts until it nears expiry.
    #[serde(default)]
    pub cache_tokens: bool,
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl AuthConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

fn default_refresh_margin() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SidecarConfig {
    /// Base URL of the calling-SDK sidecar.
    pub url: String,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Upper bound on any single sidecar request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl SidecarConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

fn default_event_buffer() -> usize {
    64
}

fn default_request_timeout() -> u64 {
    10_000
}

/// Controller tuning. Passed by value into `CallController::new`.
#[derive(Debug, Deserialize, Clone)]
pub struct CallConfig {
    /// Prepended to the dialed digits before they reach the calling SDK.
    #[serde(default = "default_destination_prefix")]
    pub destination_prefix: String,
    /// How long Ending is shown before returning to Idle.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl CallConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            destination_prefix: default_destination_prefix(),
            settle_delay_ms: default_settle_delay(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

fn default_destination_prefix() -> String {
    "+".to_string()
}

fn default_settle_delay() -> u64 {
    2000
}

fn default_tick_interval() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ApiConfig {
    /// Bearer token required for /api/* endpoints. If empty, all requests are rejected.
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PresenceConfig {
    /// Base URL of the agent status store.
    pub url: String,
}

impl Config {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file from same directory as config.toml
        let env_path = config_dir().join(".env");
        match dotenvy::from_path(&env_path) {
            Ok(()) => tracing::info!("Loaded .env from {}", env_path.display()),
            Err(dotenvy::Error::Io(_)) => {
                tracing::debug!(
                    "No .env file at {}, using environment only",
                    env_path.display()
                );
            }
            Err(e) => tracing::warn!("Failed to parse .env: {e}"),
        }

        let path = config_path();
        tracing::info!("Loading config from {}", path.display());

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            format!(
                "Failed to read config at {}: {}. Copy config.example.toml to {}",
                path.display(),
                e,
                path.display()
            )
        })?;

        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Secrets may live in the environment instead of the file.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CALLDECK_AUTH_USER") {
            self.auth.user = v;
        }
        if let Ok(v) = std::env::var("CALLDECK_AUTH_PASS") {
            self.auth.pass = v;
        }
        if let Ok(v) = std::env::var("CALLDECK_ACCOUNT_PASSWORD") {
            self.account.password = v;
        }
        if let Ok(v) = std::env::var("CALLDECK_API_TOKEN") {
            self.api.token = v;
        }
        if let Ok(v) = std::env::var("CALLDECK_SIDECAR_URL") {
            self.sidecar.url = v;
        }
    }
}

fn config_dir() -> PathBuf {
    if let Ok(p) = std::env::var("CALLDECK_CONFIG") {
        // If pointing to a file, use its parent directory
        let path = PathBuf::from(p);
        return path.parent().map(|p| p.to_path_buf()).unwrap_or(path);
    }

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".calldeck")
}

fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("CALLDECK_CONFIG") {
        return PathBuf::from(p);
    }

    config_dir().join("config.toml")
}
