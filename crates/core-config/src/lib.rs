// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Configuration for the agent workstation core.
//!
//! Every setting named in the external-interfaces contract is read from the
//! environment, with sensible defaults so the process can start with zero
//! configuration against a local Ollama-style endpoint. The one file-backed
//! setting, `MCP_CONFIG_PATH`, is a YAML manifest listing tool-provider
//! subprocesses (see [`mcp_manifest`]).

mod mcp_manifest;

pub use mcp_manifest::{McpManifest, McpProviderSpec};

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to read MCP manifest at {path}: {source}")]
    McpManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse MCP manifest at {path}: {source}")]
    McpManifestParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Fully resolved process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub upstream_host: String,
    pub upstream_model: String,
    pub upstream_embed_model: String,
    pub port: u16,
    pub mcp_config_path: Option<PathBuf>,
    pub shell: String,
    pub max_sessions: usize,
    pub browser_headless: bool,
    pub upstream_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_host: "http://localhost:11434".into(),
            upstream_model: "llama3".into(),
            upstream_embed_model: "nomic-embed-text".into(),
            port: 8080,
            mcp_config_path: None,
            shell: "/bin/bash".into(),
            max_sessions: 10,
            browser_headless: true,
            upstream_timeout: Duration::from_secs(300),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Every field has a default from spec §6; only malformed (not missing)
    /// values are rejected.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Config::default();

        if let Some(v) = env_var("UPSTREAM_HOST") {
            cfg.upstream_host = v;
        }
        if let Some(v) = env_var("UPSTREAM_MODEL") {
            cfg.upstream_model = v;
        }
        if let Some(v) = env_var("UPSTREAM_EMBED_MODEL") {
            cfg.upstream_embed_model = v;
        }
        if let Some(v) = env_var("PORT") {
            cfg.port = parse_env("PORT", &v)?;
        }
        if let Some(v) = env_var("MCP_CONFIG_PATH") {
            cfg.mcp_config_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env_var("SHELL") {
            cfg.shell = v;
        }
        if let Some(v) = env_var("MAX_SESSIONS") {
            cfg.max_sessions = parse_env("MAX_SESSIONS", &v)?;
        }
        if let Some(v) = env_var("BROWSER_HEADLESS") {
            cfg.browser_headless = parse_bool("BROWSER_HEADLESS", &v)?;
        }

        Ok(cfg)
    }

    /// Load the MCP provider manifest named by `mcp_config_path`, if any.
    ///
    /// Returns an empty manifest (no providers) when unset — tool-provider
    /// support is opt-in.
    pub fn load_mcp_manifest(&self) -> Result<McpManifest, ConfigError> {
        match &self.mcp_config_path {
            Some(path) => McpManifest::load(path),
            None => Ok(McpManifest::default()),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            var,
            value: other.to_string(),
            reason: "expected a boolean (true/false/1/0/yes/no/on/off)".into(),
        }),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for var in [
            "UPSTREAM_HOST",
            "UPSTREAM_MODEL",
            "UPSTREAM_EMBED_MODEL",
            "PORT",
            "MCP_CONFIG_PATH",
            "SHELL",
            "MAX_SESSIONS",
            "BROWSER_HEADLESS",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults_when_unset() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_all();
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.upstream_host, "http://localhost:11434");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.max_sessions, 10);
        assert!(cfg.browser_headless);
        assert!(cfg.mcp_config_path.is_none());
    }

    #[test]
    fn overrides_from_env() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_all();
        env::set_var("UPSTREAM_HOST", "http://gpu-box:11434");
        env::set_var("PORT", "9090");
        env::set_var("BROWSER_HEADLESS", "false");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.upstream_host, "http://gpu-box:11434");
        assert_eq!(cfg.port, 9090);
        assert!(!cfg.browser_headless);
        clear_all();
    }

    #[test]
    fn invalid_port_is_rejected() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_all();
        env::set_var("PORT", "not-a-number");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "PORT", .. }));
        clear_all();
    }

    #[test]
    fn invalid_bool_is_rejected() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_all();
        env::set_var("BROWSER_HEADLESS", "maybe");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                var: "BROWSER_HEADLESS",
                ..
            }
        ));
        clear_all();
    }
}
