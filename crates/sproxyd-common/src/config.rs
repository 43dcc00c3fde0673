//! Configuration types for the object server
//!
//! `GatewayConfig` is read once at startup from an optional file (INI, TOML,
//! JSON or YAML) layered with `OBJECT_SERVER_*` environment variables.

use crate::error::{Error, Result};
use crate::types::BackendTimeouts;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Well-known location of the storage policy document
pub const DEFAULT_POLICY_CONFIG_PATH: &str = "/etc/swift/scality-storage-policies.toml";

/// Object server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address to bind the object server to
    pub bind_ip: String,
    /// Port to bind the object server to
    pub bind_port: u16,
    /// Hosts serving the default policy (`host:port`, comma separated)
    #[serde(deserialize_with = "deserialize_host_list")]
    pub sproxyd_host: Vec<String>,
    /// Path of the sproxyd driver on every default host
    pub sproxyd_path: String,
    /// Connect timeout for sproxyd requests, in seconds
    pub sproxyd_conn_timeout: Option<f64>,
    /// Read timeout for sproxyd requests, in seconds
    pub sproxyd_proxy_timeout: Option<f64>,
    /// Connect timeout for container updates, in seconds
    pub conn_timeout: f64,
    /// Response timeout for container updates, in seconds
    pub node_timeout: f64,
    /// Storage policy document location
    pub policy_config_path: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_ip: "0.0.0.0".to_string(),
            bind_port: 6000,
            sproxyd_host: vec!["localhost:81".to_string()],
            sproxyd_path: "/proxy/chord".to_string(),
            sproxyd_conn_timeout: None,
            sproxyd_proxy_timeout: None,
            conn_timeout: 0.5,
            node_timeout: 3.0,
            policy_config_path: PathBuf::from(DEFAULT_POLICY_CONFIG_PATH),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from `path` (if given and present) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            let name = path
                .to_str()
                .ok_or_else(|| Error::configuration(format!("non UTF-8 path: {}", path.display())))?;
            builder = builder.add_source(config::File::new(name, file_format(path)).required(false));
        }

        let conf: Self = builder
            .add_source(config::Environment::with_prefix("OBJECT_SERVER"))
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| Error::configuration(e.to_string()))?;

        conf.validate()?;
        Ok(conf)
    }

    /// Check that the loaded values are usable
    pub fn validate(&self) -> Result<()> {
        if self.sproxyd_host.is_empty() {
            return Err(Error::configuration("sproxyd_host must name at least one host"));
        }
        self.backend_timeouts()?;
        seconds("conn_timeout", self.conn_timeout)?;
        seconds("node_timeout", self.node_timeout)?;
        Ok(())
    }

    /// Endpoints serving the default policy, one per configured host
    #[must_use]
    pub fn default_endpoints(&self) -> Vec<String> {
        let path = self.sproxyd_path.trim_matches('/');
        self.sproxyd_host
            .iter()
            .map(|host| format!("http://{host}/{path}/"))
            .collect()
    }

    /// Timeouts used for every backend client
    ///
    /// Unset values fall back to the sproxyd client defaults.
    pub fn backend_timeouts(&self) -> Result<BackendTimeouts> {
        let connect = match self.sproxyd_conn_timeout {
            Some(secs) => seconds("sproxyd_conn_timeout", secs)?,
            None => BackendTimeouts::DEFAULT_CONNECT,
        };
        let read = match self.sproxyd_proxy_timeout {
            Some(secs) => seconds("sproxyd_proxy_timeout", secs)?,
            None => BackendTimeouts::DEFAULT_READ,
        };
        Ok(BackendTimeouts::new(connect, read))
    }

    /// Connect timeout for container updates
    pub fn container_conn_timeout(&self) -> Result<Duration> {
        seconds("conn_timeout", self.conn_timeout)
    }

    /// Response timeout for container updates
    pub fn container_node_timeout(&self) -> Result<Duration> {
        seconds("node_timeout", self.node_timeout)
    }

    /// Listen address as `ip:port`
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_ip, self.bind_port)
    }
}

fn seconds(key: &str, secs: f64) -> Result<Duration> {
    if secs <= 0.0 {
        return Err(Error::configuration(format!("{key} must be positive, got {secs}")));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::configuration(format!("invalid {key} {secs}: {e}")))
}

fn file_format(path: &Path) -> config::FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => config::FileFormat::Toml,
        Some("json") => config::FileFormat::Json,
        Some("yaml" | "yml") => config::FileFormat::Yaml,
        // object-server.conf and friends are paste-deploy style INI files
        _ => config::FileFormat::Ini,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HostList {
    Joined(String),
    List(Vec<String>),
}

fn deserialize_host_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let hosts = match HostList::deserialize(deserializer)? {
        HostList::Joined(joined) => split_list(&joined),
        HostList::List(list) => list
            .iter()
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .collect(),
    };
    Ok(hosts)
}

/// Split a comma separated list, dropping blanks
#[must_use]
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}
