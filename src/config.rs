use crate::collectors::log_reader::LogReader;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_node_timeout_secs")]
    pub node_timeout_secs: Option<u64>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub listen: Option<String>,
    #[serde(default)]
    pub log_reader: LogReader,
    #[serde(default = "default_watched_messages")]
    pub watched_messages: Vec<String>,
    #[serde(default = "default_noise_fields")]
    pub noise_fields: Vec<String>,
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    #[serde(alias = "ip")]
    pub address: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(
        default,
        deserialize_with = "deserialize_password",
        skip_serializing
    )]
    pub password: Option<SecretString>,
    #[serde(default)]
    pub identity_file: Option<String>,
}

impl NodeConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("failed to parse JSON in {path}: {source}")]
    ParseJson {
        path: String,
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let is_json = path_ref
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let cfg: Config = if is_json {
            serde_json::from_str(&text).map_err(|source| ConfigError::ParseJson {
                path: path_display,
                source,
            })?
        } else {
            serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path_display,
                source,
            })?
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs < 1 {
            return Err(ConfigError::Validation(
                "interval_secs must be >= 1".to_string(),
            ));
        }
        if self.node_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "node_timeout_secs must be >= 1 (use null to disable)".to_string(),
            ));
        }
        if self.connect_timeout_secs < 1 {
            return Err(ConfigError::Validation(
                "connect_timeout_secs must be >= 1".to_string(),
            ));
        }
        if let Some(listen) = &self.listen {
            if SocketAddr::from_str(listen).is_err() {
                return Err(ConfigError::Validation(format!(
                    "listen '{listen}' must be a host:port socket address"
                )));
            }
        }

        validate_nodes(&self.nodes)?;
        validate_log_reader(&self.log_reader)?;
        validate_watched_messages(&self.watched_messages)?;

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_nodes(nodes: &[NodeConfig]) -> Result<(), ConfigError> {
    if nodes.is_empty() {
        return Err(ConfigError::Validation(
            "nodes must list at least one host".to_string(),
        ));
    }

    let mut endpoints = HashSet::new();
    for node in nodes {
        if node.address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "nodes[*].address must not be empty".to_string(),
            ));
        }
        if node.username.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "node '{}' username must not be empty",
                node.address
            )));
        }
        if node.port == 0 {
            return Err(ConfigError::Validation(format!(
                "node '{}' port must be in 1..65535",
                node.address
            )));
        }
        let has_key = node
            .identity_file
            .as_ref()
            .is_some_and(|path| !path.trim().is_empty());
        if node.password.is_none() && !has_key {
            return Err(ConfigError::Validation(format!(
                "node '{}' needs a password or an identity_file",
                node.address
            )));
        }
        if !endpoints.insert(node.endpoint()) {
            return Err(ConfigError::Validation(format!(
                "node '{}' is listed more than once",
                node.endpoint()
            )));
        }
    }
    Ok(())
}

fn validate_log_reader(reader: &LogReader) -> Result<(), ConfigError> {
    if reader.target().trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "log_reader ({}) target must not be empty",
            reader.kind()
        )));
    }
    if reader.lines() == 0 {
        return Err(ConfigError::Validation(
            "log_reader.lines must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_watched_messages(keys: &[String]) -> Result<(), ConfigError> {
    if keys.is_empty() {
        return Err(ConfigError::Validation(
            "watched_messages must not be empty".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for key in keys {
        if key.is_empty() {
            return Err(ConfigError::Validation(
                "watched_messages entries must not be empty".to_string(),
            ));
        }
        if !seen.insert(key.as_str()) {
            return Err(ConfigError::Validation(format!(
                "watched message '{key}' is listed more than once"
            )));
        }
    }
    Ok(())
}

fn deserialize_password<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

const fn default_interval_secs() -> u64 {
    60
}

const fn default_node_timeout_secs() -> Option<u64> {
    Some(50)
}

const fn default_connect_timeout_secs() -> u64 {
    10
}

const fn default_ssh_port() -> u16 {
    22
}

pub fn default_watched_messages() -> Vec<String> {
    vec![
        "connecting to bootstrap".to_string(),
        "broadcasting self-test info".to_string(),
        "peers in store".to_string(),
    ]
}

pub fn default_noise_fields() -> Vec<String> {
    vec!["level".to_string(), "ts".to_string(), "caller".to_string()]
}
