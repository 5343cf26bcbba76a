//! Navigator configuration, read from and written to a TOML file.
//!
//! ```toml
//! clock_hz = 10
//! routes_directory = "/var/lib/wayfind/routes"
//! route_reload_cooldown_ms = 1000
//!
//! [memory]
//! momentum = 0.9
//! match_threshold = 0.99
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wayfind_memory::MemoryConfig;
use wayfind_types::NavError;

/// Runtime settings of the navigator and its control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigatorConfig {
    /// Control loop rate in ticks per second.
    #[serde(default = "default_clock_hz")]
    pub clock_hz: u32,

    /// Root of the recorded routes for the filesystem route source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes_directory: Option<PathBuf>,

    /// Minimum gap between two route-list reloads, and between two attempts
    /// to open a route that just failed to build.
    #[serde(default = "default_reload_cooldown_ms")]
    pub route_reload_cooldown_ms: u64,

    /// Evidence model tunables.
    #[serde(default)]
    pub memory: MemoryConfig,
}

fn default_clock_hz() -> u32 {
    10
}
fn default_reload_cooldown_ms() -> u64 {
    1000
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            clock_hz: default_clock_hz(),
            routes_directory: None,
            route_reload_cooldown_ms: default_reload_cooldown_ms(),
            memory: MemoryConfig::default(),
        }
    }
}

impl NavigatorConfig {
    /// Duration of one control tick.
    pub fn tick_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.clock_hz.max(1)))
    }

    pub fn reload_cooldown(&self) -> Duration {
        Duration::from_millis(self.route_reload_cooldown_ms)
    }

    pub fn validate(&self) -> Result<(), NavError> {
        if self.clock_hz == 0 {
            return Err(NavError::Config("clock_hz must be positive".to_string()));
        }
        self.memory.validate()
    }
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<NavigatorConfig>, NavError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        NavError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: NavigatorConfig = toml::from_str(&raw)
        .map_err(|e| NavError::Config(format!("failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(Some(cfg))
}

/// Apply `WAYFIND_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `WAYFIND_CLOCK_HZ` | `clock_hz` |
/// | `WAYFIND_ROUTES_DIR` | `routes_directory` |
pub fn apply_env_overrides(cfg: &mut NavigatorConfig) {
    if let Ok(v) = std::env::var("WAYFIND_CLOCK_HZ")
        && let Ok(hz) = v.parse::<u32>()
    {
        cfg.clock_hz = hz;
    }
    if let Ok(v) = std::env::var("WAYFIND_ROUTES_DIR") {
        cfg.routes_directory = Some(PathBuf::from(v));
    }
}

/// Save the config to `path`, creating parent directories if necessary.
pub fn save_to(cfg: &NavigatorConfig, path: &Path) -> Result<(), NavError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| NavError::Config(format!("failed to create config directory: {e}")))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| NavError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw).map_err(|e| {
        NavError::Config(format!("failed to write config at {}: {e}", path.display()))
    })
}
