//! Client configuration: defaults, then config file, then environment.
//! CLI flags are applied on top by `main`.

use serde::Deserialize;
use std::path::PathBuf;

/// Client configuration. File: ~/.config/ipmsg/config.toml or
/// /etc/ipmsg/config.toml. Env overrides: IPMSG_PORT, IPMSG_CACHE,
/// IPMSG_ALIAS_FILE.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Recipient TCP port (default 6767).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Reachable-host cache file (default ~/ipmsg/cache.json).
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    /// Alias file (default ~/ipmsg/alias.txt).
    #[serde(default)]
    pub alias_path: Option<PathBuf>,
}

fn default_port() -> u16 {
    ipmsg_core::DEFAULT_PORT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            cache_path: None,
            alias_path: None,
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    if let Ok(s) = std::env::var("IPMSG_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.port = p;
        }
    }
    if let Ok(s) = std::env::var("IPMSG_CACHE") {
        c.cache_path = Some(PathBuf::from(s));
    }
    if let Ok(s) = std::env::var("IPMSG_ALIAS_FILE") {
        c.alias_path = Some(PathBuf::from(s));
    }
    c
}

/// Resolve `rel` under the user's home directory.
pub fn home_path(rel: &str) -> Option<PathBuf> {
    std::env::var_os("HOME").map(|h| PathBuf::from(h).join(rel))
}

fn config_paths() -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(p) = home_path(".config/ipmsg/config.toml") {
        out.push(p);
    }
    out.push(PathBuf::from("/etc/ipmsg/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            if let Ok(s) = std::fs::read_to_string(&p) {
                if let Ok(c) = toml::from_str::<Config>(&s) {
                    return Some(c);
                }
            }
            break;
        }
    }
    None
}
