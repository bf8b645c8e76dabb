//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (RPC API keys, node credentials) are referenced by env-var
//! name in the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use crate::types::{MAX_DEPTH, MAX_GRAPH_NODES};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub collectors: CollectorsConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectorsConfig {
    /// Upper bound on a single status / stats probe.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Keyed by chain name; names are validated when the manager initialises.
    #[serde(default)]
    pub chains: BTreeMap<String, ChainConfig>,
}

impl CollectorsConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub rpc_url: String,
    /// Per-request RPC timeout.
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
    /// Env var holding an API key sent as a provider header (TronGrid).
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Env vars holding basic-auth credentials (Bitcoin Core).
    #[serde(default)]
    pub rpc_user_env: Option<String>,
    #[serde(default)]
    pub rpc_password_env: Option<String>,
    /// Overrides the built-in stablecoin contract map for this chain.
    #[serde(default)]
    pub stablecoins: Option<BTreeMap<String, String>>,
}

impl ChainConfig {
    /// Minimal config pointing at an RPC endpoint.
    pub fn with_url(rpc_url: &str) -> Self {
        Self {
            enabled: true,
            rpc_url: rpc_url.to_string(),
            timeout_secs: default_rpc_timeout(),
            api_key_env: None,
            rpc_user_env: None,
            rpc_password_env: None,
            stablecoins: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn api_key(&self) -> Option<SecretString> {
        resolve_secret(self.api_key_env.as_deref())
    }

    /// Basic-auth pair, present only when both halves resolve.
    pub fn rpc_credentials(&self) -> Option<(String, SecretString)> {
        let user = self
            .rpc_user_env
            .as_deref()
            .and_then(|env| std::env::var(env).ok())?;
        let password = resolve_secret(self.rpc_password_env.as_deref())?;
        Some((user, password))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    #[serde(default = "default_enrichment_timeout")]
    pub enrichment_timeout_secs: u64,
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
    /// JSON file with `{ "bridges": [...], "mixers": [...] }`. Built-in
    /// lists are used when absent.
    #[serde(default)]
    pub known_addresses_path: Option<String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_nodes: default_max_nodes(),
            enrichment_timeout_secs: default_enrichment_timeout(),
            store_timeout_secs: default_store_timeout(),
            known_addresses_path: None,
        }
    }
}

impl GraphConfig {
    /// Configured depth, never above the hard cap.
    pub fn effective_max_depth(&self) -> u32 {
        self.max_depth.clamp(1, MAX_DEPTH)
    }

    /// Configured node cap, never above the hard cap.
    pub fn effective_max_nodes(&self) -> usize {
        self.max_nodes.clamp(1, MAX_GRAPH_NODES)
    }

    pub fn enrichment_timeout(&self) -> Duration {
        Duration::from_secs(self.enrichment_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_detector_timeout")]
    pub detector_timeout_secs: u64,
    #[serde(default = "default_graph_timeout")]
    pub graph_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            detector_timeout_secs: default_detector_timeout(),
            graph_timeout_secs: default_graph_timeout(),
        }
    }
}

impl AnalysisConfig {
    pub fn detector_timeout(&self) -> Duration {
        Duration::from_secs(self.detector_timeout_secs)
    }

    pub fn graph_timeout(&self) -> Duration {
        Duration::from_secs(self.graph_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_rpc_timeout() -> u64 {
    10
}

fn default_max_depth() -> u32 {
    MAX_DEPTH
}

fn default_max_nodes() -> usize {
    MAX_GRAPH_NODES
}

fn default_enrichment_timeout() -> u64 {
    5
}

fn default_store_timeout() -> u64 {
    15
}

fn default_detector_timeout() -> u64 {
    30
}

fn default_graph_timeout() -> u64 {
    10
}

fn resolve_secret(env_name: Option<&str>) -> Option<SecretString> {
    env_name
        .and_then(|env| std::env::var(env).ok())
        .filter(|v| !v.is_empty())
        .map(SecretString::new)
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
