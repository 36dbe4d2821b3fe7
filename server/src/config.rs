use std::path::PathBuf;
use std::time::Duration;

use passport_shared::{DEFAULT_VISITED_COLOR, normalize_code};
use passport_shared::colors::parse_hex_color;

pub const DEFAULT_SERVER_PORT: u16 = 3000;
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_TIMELINE_BASE_INTERVAL_MS: u64 = 1500;
pub const DEFAULT_TIMELINE_HIGHLIGHT_MS: u64 = 1200;
pub const DEFAULT_WORKSPACE_IDLE_SECS: u64 = 1800;
pub const DEFAULT_AUDIT_RETENTION_DAYS: i64 = 365;

pub const SSE_KEEPALIVE_SECS: u64 = 15;
pub const EVICTION_INTERVAL_SECS: u64 = 60;
pub const RETENTION_CHECK_SECS: u64 = 86400; // daily
/// Map color for countries no visible overlay touches.
pub const DEFAULT_MAP_FALLBACK_COLOR: &str = "#d9d9d9";

/// Owner segment that selects the local embedded store.
pub const GUEST_OWNER: &str = "guest";

fn env_positive<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .filter(|value| *value > T::default())
}

pub fn server_port() -> u16 {
    env_positive("PASSPORT_PORT").unwrap_or(DEFAULT_SERVER_PORT)
}

pub fn data_dir() -> PathBuf {
    std::env::var("PASSPORT_DATA_DIR")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub fn db_max_connections() -> u32 {
    env_positive("DB_MAX_CONNECTIONS").unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
}

/// Configured visited-overlay color. Values that are not hex colors are ignored.
pub fn visited_color() -> String {
    std::env::var("VISITED_COLOR")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| parse_hex_color(value).is_some())
        .unwrap_or_else(|| DEFAULT_VISITED_COLOR.to_owned())
}

pub fn home_country() -> Option<String> {
    std::env::var("HOME_COUNTRY")
        .ok()
        .map(|value| normalize_code(&value))
        .filter(|value| value.len() == 2 && value.chars().all(|c| c.is_ascii_alphabetic()))
}

pub fn timeline_base_interval() -> Duration {
    Duration::from_millis(
        env_positive("TIMELINE_BASE_INTERVAL_MS").unwrap_or(DEFAULT_TIMELINE_BASE_INTERVAL_MS),
    )
}

pub fn timeline_highlight_delay() -> Duration {
    Duration::from_millis(
        env_positive("TIMELINE_HIGHLIGHT_MS").unwrap_or(DEFAULT_TIMELINE_HIGHLIGHT_MS),
    )
}

pub fn workspace_idle_ttl() -> Duration {
    Duration::from_secs(env_positive("WORKSPACE_IDLE_SECS").unwrap_or(DEFAULT_WORKSPACE_IDLE_SECS))
}

pub fn audit_retention_days() -> i64 {
    env_positive("AUDIT_RETENTION_DAYS").unwrap_or(DEFAULT_AUDIT_RETENTION_DAYS)
}

/// Per-workspace settings resolved once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub visited_color: String,
    pub home_country: Option<String>,
    pub timeline_base_interval: Duration,
    pub timeline_highlight_delay: Duration,
    pub workspace_idle_ttl: Duration,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            data_dir: data_dir(),
            visited_color: visited_color(),
            home_country: home_country(),
            timeline_base_interval: timeline_base_interval(),
            timeline_highlight_delay: timeline_highlight_delay(),
            workspace_idle_ttl: workspace_idle_ttl(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            visited_color: DEFAULT_VISITED_COLOR.to_owned(),
            home_country: None,
            timeline_base_interval: Duration::from_millis(DEFAULT_TIMELINE_BASE_INTERVAL_MS),
            timeline_highlight_delay: Duration::from_millis(DEFAULT_TIMELINE_HIGHLIGHT_MS),
            workspace_idle_ttl: Duration::from_secs(DEFAULT_WORKSPACE_IDLE_SECS),
        }
    }
}
