//! Process configuration.
//!
//! Built once at startup and never mutated: defaults, overlaid by an optional
//! `config.toml`, overlaid by environment variables (`PORT`, `UUID`,
//! `PROXYIP`, `WS_PATH`, `SUB_PATH`, `PUBLIC_HOST`, `KEEPALIVE_URL`). The
//! resulting [`Config`] is passed explicitly into the gateway and each
//! session; nothing reads the environment after startup.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::{env, fs};

use crate::auth::Credential;

const CONFIG_FILE: &str = "config.toml";

const DEFAULT_PORT: u16 = 7860;
const DEFAULT_UUID: &str = "00000000-0000-0000-0000-000000000000";
const DEFAULT_WS_PATH: &str = "/api/v1/stream";
const DEFAULT_SUB_PATH: &str = "/sub";

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    pub listen_ip: String,
    pub port: u16,
    pub uuid: String,
    pub proxy_host: Option<String>,
    pub ws_path: String,
    pub sub_path: String,
    pub public_host: Option<String>,
    pub keepalive_url: Option<String>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            listen_ip: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            uuid: DEFAULT_UUID.to_string(),
            proxy_host: None,
            ws_path: DEFAULT_WS_PATH.to_string(),
            sub_path: DEFAULT_SUB_PATH.to_string(),
            public_host: None,
            keepalive_url: None,
        }
    }
}

/// Immutable process-wide configuration.
pub struct Config {
    pub listen_ip: String,
    pub port: u16,
    /// The identity secret every session's first frame is checked against.
    pub credential: Credential,
    /// Optional destination-host override; replaces the parsed host only,
    /// never the parsed port.
    pub proxy_host: Option<String>,
    /// The single path on which a WebSocket upgrade is permitted.
    pub ws_path: String,
    /// Path serving the base64 subscription link.
    pub sub_path: String,
    /// Public hostname used when building the subscription link.
    pub public_host: Option<String>,
    /// Third-party endpoint pinged once at startup, when set.
    pub keepalive_url: Option<String>,
}

impl Config {
    /// Loads configuration from `config.toml` (if present) and the
    /// environment. Missing values fall back to defaults.
    pub fn load() -> Result<Self> {
        let mut raw = match fs::read_to_string(CONFIG_FILE) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("Failed to parse {CONFIG_FILE} as valid TOML"))?,
            Err(_) => RawConfig::default(),
        };
        apply_env_overrides(&mut raw)?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawConfig) -> Result<Self> {
        let credential = Credential::from_identifier(&raw.uuid)?;

        if !raw.ws_path.starts_with('/') {
            bail!("upgrade path must start with '/': {}", raw.ws_path);
        }
        if !raw.sub_path.starts_with('/') {
            bail!("subscription path must start with '/': {}", raw.sub_path);
        }

        Ok(Self {
            listen_ip: raw.listen_ip,
            port: raw.port,
            credential,
            proxy_host: raw.proxy_host.filter(|host| !host.is_empty()),
            ws_path: raw.ws_path,
            sub_path: raw.sub_path,
            public_host: raw.public_host.filter(|host| !host.is_empty()),
            keepalive_url: raw.keepalive_url.filter(|url| !url.is_empty()),
        })
    }

    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_ip, self.port)
    }
}

fn apply_env_overrides(raw: &mut RawConfig) -> Result<()> {
    if let Some(port) = non_empty_var("PORT") {
        raw.port = port
            .parse()
            .with_context(|| format!("PORT is not a valid port number: {port}"))?;
    }
    if let Some(uuid) = non_empty_var("UUID") {
        raw.uuid = uuid;
    }
    if let Some(host) = non_empty_var("PROXYIP") {
        raw.proxy_host = Some(host);
    }
    if let Some(path) = non_empty_var("WS_PATH") {
        raw.ws_path = path;
    }
    if let Some(path) = non_empty_var("SUB_PATH") {
        raw.sub_path = path;
    }
    if let Some(host) = non_empty_var("PUBLIC_HOST") {
        raw.public_host = Some(host);
    }
    if let Some(url) = non_empty_var("KEEPALIVE_URL") {
        raw.keepalive_url = Some(url);
    }
    Ok(())
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}
