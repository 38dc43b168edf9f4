//! Configuration for the mudgate gateway.
//!
//! Everything operational comes from environment variables so the service can
//! run unchanged in a container. Invalid numeric values fall back to their
//! defaults with a warning; missing or malformed encryption keys are fatal.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine;

use crate::error::{Error, Result};

/// Prefix for versioned encryption key environment variables
/// (`ENCRYPTION_KEY_V1`, `ENCRYPTION_KEY_V2`, ...).
const KEY_ENV_PREFIX: &str = "ENCRYPTION_KEY_V";

/// Default port deny-list: mail, DNS, HTTP(S), common databases, remote
/// admin, and file sharing.
const DEFAULT_PORT_DENYLIST: &[u16] = &[
    25, 465, 587, 110, 143, 993, 995, // mail
    53, // DNS
    80, 443, // HTTP(S)
    1433, 1521, 3306, 5432, 6379, 27017, // databases
    22, 3389, 5900, // remote admin
    445, 139, 2049, // file sharing
];

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// If non-empty, only these ports are ever allowed.
    pub port_allowlist_override: Vec<u16>,
    /// Ports rejected unless the override list is in effect.
    pub port_denylist: Vec<u16>,
    /// Base allow-list consulted after the deny-list.
    pub port_allowlist: Vec<u16>,
    /// Disconnect sessions idle longer than this.
    pub idle_timeout: Duration,
    /// Disconnect sessions older than this regardless of activity.
    pub hard_cap: Duration,
    /// Maximum browser frame size in bytes, enforced before parsing.
    pub max_frame_bytes: usize,
    /// Token bucket capacity per one-second refill window.
    pub command_rate_per_sec: u32,
    /// Upstream TCP dial timeout.
    pub dial_timeout: Duration,
    /// Versioned key ring material; the highest version is current.
    pub encryption_keys: BTreeMap<u32, [u8; 32]>,
    /// Bearer secret guarding `/metrics`; `None` leaves the endpoint open.
    pub admin_metrics_secret: Option<String>,
    /// Emit JSON log lines instead of the human-readable format.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port_allowlist_override: Vec::new(),
            port_denylist: DEFAULT_PORT_DENYLIST.to_vec(),
            port_allowlist: vec![23],
            idle_timeout: Duration::from_secs(30 * 60),
            hard_cap: Duration::from_secs(24 * 60 * 60),
            max_frame_bytes: 65536,
            command_rate_per_sec: 10,
            dial_timeout: Duration::from_secs(10),
            encryption_keys: BTreeMap::new(),
            admin_metrics_secret: None,
            log_json: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Fails when no valid encryption key is present: the credential vault
    /// cannot run without at least one 32-byte key.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(val) = std::env::var("PORT_ALLOWLIST_OVERRIDE") {
            cfg.port_allowlist_override = parse_port_list(&val);
        }
        if let Ok(val) = std::env::var("PORT_DENYLIST") {
            cfg.port_denylist = parse_port_list(&val);
        }
        if let Ok(val) = std::env::var("PORT_ALLOWLIST") {
            let ports = parse_port_list(&val);
            if !ports.is_empty() {
                cfg.port_allowlist = ports;
            }
        }

        cfg.idle_timeout = Duration::from_secs(env_u64("IDLE_TIMEOUT_MINUTES", 30) * 60);
        cfg.hard_cap = Duration::from_secs(env_u64("HARD_SESSION_CAP_HOURS", 24) * 60 * 60);
        cfg.max_frame_bytes = env_u64("MAX_FRAME_BYTES", 65536) as usize;
        cfg.command_rate_per_sec = env_u64("COMMAND_RATE_PER_SECOND", 10) as u32;
        cfg.dial_timeout = Duration::from_secs(env_u64("DIAL_TIMEOUT_SECONDS", 10));

        cfg.encryption_keys = load_encryption_keys()?;
        if cfg.encryption_keys.is_empty() {
            return Err(Error::Config(
                "at least one ENCRYPTION_KEY_V<n> environment variable is required".into(),
            ));
        }

        cfg.admin_metrics_secret = std::env::var("ADMIN_METRICS_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        cfg.log_json = std::env::var("LOG_JSON")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(cfg)
    }
}

/// Parse a comma-separated port list, skipping invalid entries with a
/// warning.
pub fn parse_port_list(raw: &str) -> Vec<u16> {
    let mut ports = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.parse::<u16>() {
            Ok(p) if p > 0 => ports.push(p),
            _ => tracing::warn!(entry = part, "Invalid port in list, skipping"),
        }
    }
    ports
}

/// Decode one base64-encoded 32-byte key.
pub fn decode_key(raw: &str) -> Result<[u8; 32]> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(raw.trim())
        .map_err(|e| Error::Config(format!("encryption key is not valid base64: {e}")))?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::Config("encryption key must decode to exactly 32 bytes".into()))?;
    Ok(key)
}

/// Scan the environment for `ENCRYPTION_KEY_V<n>` variables.
///
/// A malformed key is fatal rather than skipped: silently dropping a key
/// version would make previously stored credentials undecryptable.
fn load_encryption_keys() -> Result<BTreeMap<u32, [u8; 32]>> {
    let mut keys = BTreeMap::new();
    for (name, value) in std::env::vars() {
        let Some(suffix) = name.strip_prefix(KEY_ENV_PREFIX) else {
            continue;
        };
        let version: u32 = suffix
            .parse()
            .map_err(|_| Error::Config(format!("invalid key version in {name}")))?;
        if version == 0 {
            return Err(Error::Config(format!("{name}: key versions start at 1")));
        }
        keys.insert(version, decode_key(&value)?);
    }
    Ok(keys)
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(val) => match val.parse() {
            Ok(n) => n,
            Err(_) => {
                tracing::warn!(var = name, value = %val, default, "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}
