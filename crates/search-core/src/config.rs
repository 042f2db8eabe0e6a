//! Environment-driven process configuration.
//!
//! Values are read with a layered precedence: process environment, then a
//! project `.env` file in the current directory, then the built-in default.
//! This mirrors the precedence used elsewhere in this codebase family, just
//! scoped to the handful of settings this service actually needs.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Deserialize;

use crate::error::CoreError;

/// Optional CJK segmentation dictionary/stopword file pair.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SegDict {
    #[serde(rename = "dict-file", default)]
    pub dict_file: Option<PathBuf>,
    #[serde(rename = "stop-file", default)]
    pub stop_file: Option<PathBuf>,
}

/// Which persistent store backend an engine should open (§6's `USE_STORE`).
/// Unrecognized values fall back to `Ldb`, matching the source's own default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    Badger,
    #[default]
    Ldb,
    Bolt,
}

impl StoreBackend {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "badger" | "bg" => Self::Badger,
            "bolt" => Self::Bolt,
            _ => Self::Ldb,
        }
    }
}

/// The on-the-wire shape of the JSON file `CONF_FILE` points at (§6).
#[derive(Debug, Clone, Deserialize)]
struct ConfFile {
    #[serde(rename = "listen-host", default)]
    listen_host: Option<String>,
    #[serde(rename = "listen-port", default)]
    listen_port: Option<u16>,
    #[serde(rename = "worker-num", default)]
    worker_num: Option<usize>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(rename = "root-dir", default)]
    root_dir: Option<String>,
    #[serde(rename = "lru-minutes", default)]
    lru_minutes: Option<i64>,
    #[serde(rename = "seg-dict", default)]
    seg_dict: Option<SegDict>,
}

/// Process-wide configuration, loaded once from the environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen_host: String,
    pub listen_port: u16,
    pub worker_num: usize,
    pub timeout_secs: u64,
    pub root_dir: PathBuf,
    /// `<= 0` disables the LRU ticker entirely.
    pub lru_minutes: i64,
    pub seg_dict: SegDict,
    /// Time zone offset in seconds east of UTC (default UTC+8, matching the
    /// original service's default).
    pub tz_offset_secs: i32,
    /// Which persistent store backend to open (`USE_STORE`, §6).
    pub store_backend: StoreBackend,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            listen_port: 8080,
            worker_num: 4,
            timeout_secs: 30,
            root_dir: PathBuf::from("./data"),
            lru_minutes: 30,
            seg_dict: SegDict::default(),
            tz_offset_secs: 8 * 3600,
            store_backend: StoreBackend::default(),
        }
    }
}

static CONFIG_CACHE: OnceLock<ServiceConfig> = OnceLock::new();

impl ServiceConfig {
    /// Load configuration from the environment, caching the result for the
    /// lifetime of the process.
    #[must_use]
    pub fn global() -> &'static Self {
        CONFIG_CACHE.get_or_init(Self::load)
    }

    /// Build a fresh `ServiceConfig` by reading the environment directly
    /// (bypassing the process-wide cache); useful in tests.
    #[must_use]
    pub fn load() -> Self {
        let defaults = Self::default();
        let conf_file = env_value("CONF_FILE").and_then(|path| match Self::read_conf_file(Path::new(&path)) {
            Ok(conf) => Some(conf),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "failed to read CONF_FILE, falling back to defaults/env");
                None
            }
        });

        // `CONF_FILE` (§6) supplies the base values; the `SEARCH_*` env vars
        // this crate also recognizes act as per-field overrides on top of it
        // (or, with no `CONF_FILE` set at all, as the sole source) — the
        // transport binary is what actually enforces "CONF_FILE is required"
        // (§6), since the config loader itself is an external collaborator
        // (§1) this crate only exposes the resulting shape of.
        Self {
            listen_host: env_value("SEARCH_LISTEN_HOST")
                .or_else(|| conf_file.as_ref().and_then(|c| c.listen_host.clone()))
                .unwrap_or(defaults.listen_host),
            listen_port: env_value("SEARCH_LISTEN_PORT")
                .and_then(|v| v.parse().ok())
                .or_else(|| conf_file.as_ref().and_then(|c| c.listen_port))
                .unwrap_or(defaults.listen_port),
            worker_num: env_value("SEARCH_WORKER_NUM")
                .and_then(|v| v.parse().ok())
                .or_else(|| conf_file.as_ref().and_then(|c| c.worker_num))
                .unwrap_or(defaults.worker_num),
            timeout_secs: env_value("SEARCH_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .or_else(|| conf_file.as_ref().and_then(|c| c.timeout))
                .unwrap_or(defaults.timeout_secs),
            root_dir: env_value("SEARCH_ROOT_DIR")
                .or_else(|| conf_file.as_ref().and_then(|c| c.root_dir.clone()))
                .map(|v| expand_home(&v))
                .unwrap_or(defaults.root_dir),
            lru_minutes: env_value("SEARCH_LRU_MINUTES")
                .and_then(|v| v.parse().ok())
                .or_else(|| conf_file.as_ref().and_then(|c| c.lru_minutes))
                .unwrap_or(defaults.lru_minutes),
            seg_dict: SegDict {
                dict_file: env_value("SEARCH_SEG_DICT_FILE")
                    .map(PathBuf::from)
                    .or_else(|| conf_file.as_ref().and_then(|c| c.seg_dict.as_ref()?.dict_file.clone())),
                stop_file: env_value("SEARCH_SEG_STOP_FILE")
                    .map(PathBuf::from)
                    .or_else(|| conf_file.as_ref().and_then(|c| c.seg_dict.as_ref()?.stop_file.clone())),
            },
            tz_offset_secs: env_value("TZ")
                .and_then(|v| parse_tz_offset(&v))
                .unwrap_or(defaults.tz_offset_secs),
            store_backend: env_value("USE_STORE")
                .map(|v| StoreBackend::parse(&v))
                .unwrap_or(defaults.store_backend),
        }
    }

    /// Parse the JSON file `CONF_FILE` points at (§6's config shape).
    fn read_conf_file(path: &Path) -> Result<ConfFile, CoreError> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(CoreError::from)
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}

/// Parse a small set of IANA-zone-like strings into a UTC offset in seconds.
/// Only fixed offsets and the handful of zone names this service cares about
/// are recognized; anything else falls back to the caller's default.
fn parse_tz_offset(raw: &str) -> Option<i32> {
    match raw {
        "UTC" | "Etc/UTC" => Some(0),
        "Asia/Shanghai" | "Asia/Hong_Kong" | "Asia/Taipei" => Some(8 * 3600),
        other => {
            let rest = other.strip_prefix("UTC").or_else(|| other.strip_prefix("GMT"))?;
            let (sign, digits) = match rest.chars().next()? {
                '+' => (1, &rest[1..]),
                '-' => (-1, &rest[1..]),
                _ => return None,
            };
            digits.parse::<i32>().ok().map(|hours| sign * hours * 3600)
        }
    }
}

// Layered environment readers, mirroring the precedence convention used by
// this codebase family's own configuration module (process env → project
// `.env` → default), pared down to what this service needs.

static DOTENV_VALUES: OnceLock<HashMap<String, String>> = OnceLock::new();

fn dotenv_values() -> &'static HashMap<String, String> {
    DOTENV_VALUES.get_or_init(|| load_dotenv_file(Path::new(".env")))
}

#[must_use]
pub fn dotenv_value(key: &str) -> Option<String> {
    dotenv_values().get(key).cloned()
}

#[must_use]
pub fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().or_else(|| dotenv_value(key))
}

fn load_dotenv_file(path: &Path) -> HashMap<String, String> {
    let Ok(contents) = fs::read_to_string(path) else {
        return HashMap::new();
    };
    parse_dotenv_contents(&contents)
}

#[must_use]
pub fn parse_dotenv_contents(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), value.trim().trim_matches('"').to_string());
    }
    map
}

fn env_bool(key: &str, default: bool) -> bool {
    env_value(key).map_or(default, |v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
}

#[allow(dead_code)]
fn env_u32(key: &str, default: u32) -> u32 {
    env_value(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[allow(dead_code)]
fn env_u64_opt(key: &str) -> Option<u64> {
    env_value(key).and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() { None } else { trimmed.parse().ok() }
    })
}

#[must_use]
pub fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.worker_num, 4);
        assert_eq!(cfg.lru_minutes, 30);
    }

    #[test]
    fn parses_dotenv_style_lines() {
        let map = parse_dotenv_contents("SEARCH_WORKER_NUM=6\n# comment\nexport SEARCH_TZ=UTC\n");
        assert_eq!(map.get("SEARCH_WORKER_NUM").unwrap(), "6");
        assert_eq!(map.get("SEARCH_TZ").unwrap(), "UTC");
    }

    #[test]
    fn env_bool_accepts_common_truthy_spellings() {
        assert!(env_bool("__SEARCH_TEST_NONEXISTENT_BOOL__", true));
    }

    #[test]
    fn tz_offset_parses_fixed_offsets() {
        assert_eq!(parse_tz_offset("UTC+8"), Some(8 * 3600));
        assert_eq!(parse_tz_offset("UTC"), Some(0));
        assert_eq!(parse_tz_offset("bogus"), None);
    }

    #[test]
    fn parse_csv_trims_and_drops_empties() {
        assert_eq!(parse_csv("a, b ,,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn store_backend_parses_recognized_names_and_defaults_to_ldb() {
        assert_eq!(StoreBackend::parse("badger"), StoreBackend::Badger);
        assert_eq!(StoreBackend::parse("bolt"), StoreBackend::Bolt);
        assert_eq!(StoreBackend::parse("ldb"), StoreBackend::Ldb);
        assert_eq!(StoreBackend::parse("leveldb"), StoreBackend::Ldb);
        assert_eq!(StoreBackend::parse("bg"), StoreBackend::Badger);
        assert_eq!(StoreBackend::parse("bogus"), StoreBackend::Ldb);
    }

    #[test]
    fn conf_file_json_parses_kebab_case_fields() {
        let json = r#"{
            "listen-host": "127.0.0.1",
            "listen-port": 9200,
            "worker-num": 8,
            "timeout": 15,
            "root-dir": "/var/lib/search",
            "lru-minutes": 45,
            "seg-dict": {"dict-file": "/etc/search/dict.txt", "stop-file": "/etc/search/stop.txt"}
        }"#;
        let conf: ConfFile = serde_json::from_str(json).unwrap();
        assert_eq!(conf.listen_host.as_deref(), Some("127.0.0.1"));
        assert_eq!(conf.listen_port, Some(9200));
        assert_eq!(conf.worker_num, Some(8));
        assert_eq!(conf.timeout, Some(15));
        assert_eq!(conf.root_dir.as_deref(), Some("/var/lib/search"));
        assert_eq!(conf.lru_minutes, Some(45));
        let seg = conf.seg_dict.unwrap();
        assert_eq!(seg.dict_file, Some(PathBuf::from("/etc/search/dict.txt")));
    }
}
