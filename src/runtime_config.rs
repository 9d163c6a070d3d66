//! # Runtime Configuration Module
//!
//! Two layers of settings:
//!
//! - [`RuntimeConfig`] - process-level knobs from environment variables
//! - [`ServiceConfig`] - service settings from a YAML file (`--settings`)
//!
//! ## Environment Variables
//!
//! ### `AUTOROUTE_STACK_SIZE`
//!
//! Stack size for `may` coroutines. Accepts decimal (`32768`) or
//! hexadecimal (`0x8000`). Default: `0x8000` (32 KB).
//!
//! Memory cost is `stack_size × concurrent_coroutines`; handlers with deep
//! call chains need more.
//!
//! ## Settings File
//!
//! ```yaml
//! http:
//!   addr: 0.0.0.0:8080
//!   max_body_bytes: 16777216
//! security:
//!   api_keys:
//!     secret-key-1: alice
//!   bearer:
//!     secret: shared-hs256-secret
//!     cookie_name: auth_token
//! throttle:
//!   sweep_every: 1024
//!   trust_forwarded_headers: true
//! ```
//!
//! Every field is optional.

use crate::security::{
    ApiKeyProvider, BearerTokenProvider, ChainProvider, IdentityProvider, NoAuthProvider,
};
use crate::throttle::DEFAULT_SWEEP_EVERY;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::sync::Arc;

/// Default coroutine stack size (32 KB)
pub const DEFAULT_STACK_SIZE: usize = 0x8000;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes
    pub stack_size: usize,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let stack_size = env::var("AUTOROUTE_STACK_SIZE")
            .ok()
            .and_then(|val| parse_size(&val))
            .unwrap_or(DEFAULT_STACK_SIZE);
        RuntimeConfig { stack_size }
    }

    /// Apply to the global `may` configuration
    pub fn apply(&self) {
        may::config().set_stack_size(self.stack_size);
    }
}

fn parse_size(val: &str) -> Option<usize> {
    let val = val.trim();
    match val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub addr: String,
    /// Largest request body the server reads; bigger bodies get 413
    pub max_body_bytes: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BearerConfig {
    /// HS256 secret the tokens are signed with
    pub secret: String,
    #[serde(default)]
    pub cookie_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// API key → user id
    pub api_keys: HashMap<String, String>,
    /// Header carrying the API key (default `X-API-Key`)
    pub api_key_header: Option<String>,
    pub bearer: Option<BearerConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Checks between lazy sweeps of expired windows; 0 disables
    pub sweep_every: u64,
    /// Key anonymous callers by `X-Forwarded-For` / `X-Real-IP`.
    /// Only safe behind a proxy that overwrites those headers.
    pub trust_forwarded_headers: bool,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            sweep_every: DEFAULT_SWEEP_EVERY,
            trust_forwarded_headers: true,
        }
    }
}

/// Service settings file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub http: HttpConfig,
    pub security: SecurityConfig,
    pub throttle: ThrottleConfig,
}

impl ServiceConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).context("invalid service settings")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read settings file {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Identity provider chain described by the `security` section
    ///
    /// Bearer tokens are tried before API keys; with neither configured every
    /// caller is anonymous.
    pub fn identity_provider(&self) -> Arc<dyn IdentityProvider> {
        let mut chain = ChainProvider::new();
        if let Some(bearer) = &self.security.bearer {
            let mut provider = BearerTokenProvider::new(&bearer.secret);
            if let Some(cookie) = &bearer.cookie_name {
                provider = provider.cookie_name(cookie.clone());
            }
            chain = chain.with(Arc::new(provider));
        }
        if !self.security.api_keys.is_empty() {
            let mut provider = ApiKeyProvider::new(self.security.api_keys.clone());
            if let Some(header) = &self.security.api_key_header {
                provider = provider.header_name(header.clone());
            }
            chain = chain.with(Arc::new(provider));
        }
        if chain.is_empty() {
            Arc::new(NoAuthProvider)
        } else {
            Arc::new(chain)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("0x8000"), Some(0x8000));
        assert_eq!(parse_size("16384"), Some(16384));
        assert_eq!(parse_size("big"), None);
    }

    #[test]
    fn test_settings_defaults() {
        let cfg = ServiceConfig::from_yaml_str("").unwrap();
        assert_eq!(cfg, ServiceConfig::default());
        assert_eq!(cfg.http.addr, "0.0.0.0:8080");
        assert_eq!(cfg.throttle.sweep_every, DEFAULT_SWEEP_EVERY);
    }

    #[test]
    fn test_settings_partial() {
        let cfg = ServiceConfig::from_yaml_str(
            "http:\n  addr: 127.0.0.1:9000\nsecurity:\n  api_keys:\n    k1: alice\n",
        )
        .unwrap();
        assert_eq!(cfg.http.addr, "127.0.0.1:9000");
        assert_eq!(cfg.http.max_body_bytes, HttpConfig::default().max_body_bytes);
        assert_eq!(cfg.security.api_keys.get("k1").map(String::as_str), Some("alice"));
    }

    #[test]
    fn test_settings_reject_bad_types() {
        assert!(ServiceConfig::from_yaml_str("http:\n  max_body_bytes: lots\n").is_err());
    }
}
