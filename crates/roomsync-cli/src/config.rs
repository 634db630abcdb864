//! Configuration Vault – reads/writes `~/.roomsync/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use roomsync_runtime::{SessionConfig, StaticRoomLookup};
use roomsync_types::{BeaconIdentity, Room};
use uuid::Uuid;

/// The beacon UUID the client ranges for unless configured otherwise.
pub const DEFAULT_BEACON_NAMESPACE: Uuid = Uuid::from_u128(0xAAAAAAAA_AAAA_AAAA_AAAA_AAAAAAAAAAAA);

/// One `[[beacons]]` entry: a beacon in the configured namespace bound to a
/// room. Only consulted in offline mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconBinding {
    pub major: u16,
    pub minor: u16,
    pub room_id: Uuid,
    pub room_name: String,
}

/// Persisted user configuration stored in `~/.roomsync/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the room/map backend.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_lookup_timeout_secs")]
    pub lookup_timeout_secs: u64,

    /// Proximity UUID shared by every monitored beacon.
    #[serde(default = "default_beacon_namespace")]
    pub beacon_namespace: Uuid,

    /// Use the in-process lookup table and map store instead of the backend.
    #[serde(default)]
    pub offline: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub beacons: Vec<BeaconBinding>,
}

fn default_backend_url() -> String {
    SessionConfig::default().backend_url
}
fn default_request_timeout_secs() -> u64 {
    SessionConfig::default().request_timeout.as_secs()
}
fn default_lookup_timeout_secs() -> u64 {
    SessionConfig::default().lookup_timeout.as_secs()
}
fn default_beacon_namespace() -> Uuid {
    DEFAULT_BEACON_NAMESPACE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            request_timeout_secs: default_request_timeout_secs(),
            lookup_timeout_secs: default_lookup_timeout_secs(),
            beacon_namespace: default_beacon_namespace(),
            offline: false,
            beacons: Vec::new(),
        }
    }
}

impl Config {
    /// Runtime settings derived from this config.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            backend_url: self.backend_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            lookup_timeout: Duration::from_secs(self.lookup_timeout_secs),
            ..SessionConfig::default()
        }
    }

    /// Offline lookup table built from the `[[beacons]]` entries.
    pub fn static_lookup(&self) -> StaticRoomLookup {
        self.beacons
            .iter()
            .map(|b| {
                (
                    BeaconIdentity::new(self.beacon_namespace, b.major, b.minor),
                    Room::new(b.room_id, b.room_name.clone()),
                )
            })
            .collect()
    }
}

/// Return the path to `~/.roomsync/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".roomsync").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `ROOMSYNC_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROOMSYNC_BACKEND_URL` | `backend_url` |
/// | `ROOMSYNC_REQUEST_TIMEOUT_SECS` | `request_timeout_secs` |
/// | `ROOMSYNC_LOOKUP_TIMEOUT_SECS` | `lookup_timeout_secs` |
/// | `ROOMSYNC_OFFLINE` | `offline` (`1`/`true`/`yes`, `0`/`false`/`no`) |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROOMSYNC_BACKEND_URL") {
        cfg.backend_url = v;
    }
    if let Ok(v) = std::env::var("ROOMSYNC_REQUEST_TIMEOUT_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.request_timeout_secs = secs;
    }
    if let Ok(v) = std::env::var("ROOMSYNC_LOOKUP_TIMEOUT_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.lookup_timeout_secs = secs;
    }
    if let Ok(v) = std::env::var("ROOMSYNC_OFFLINE")
        && let Some(offline) = parse_flag(&v)
    {
        cfg.offline = offline;
    }
}

pub(crate) fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Save the config to disk, creating `~/.roomsync/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
