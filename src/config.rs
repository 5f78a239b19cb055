//! Service configuration.
//!
//! Values come from three layers: command-line overrides, an optional YAML
//! file and built-in defaults. [`ServiceConfig::resolve`] merges them once at
//! startup; the result is immutable for the lifetime of the process.

use crate::auth::Credentials;
use crate::error::{ExportError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default time between the start of two collection cycles (2 hours)
pub const DEFAULT_COLLECTION_INTERVAL: u64 = 7200;

/// Default ingress connection timeout
pub const DEFAULT_CONNECTION_TIMEOUT: u64 = 30;

/// Default wait before retrying a failed cycle (5 minutes)
pub const DEFAULT_RETRY_INTERVAL: u64 = 300;

/// Maximum size of a single payload/chunk (100 MiB)
pub const MAX_PAYLOAD_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum total size of the data directory (200 MiB)
pub const MAX_DATA_DIR_SIZE: u64 = 2 * MAX_PAYLOAD_SIZE;

/// Identity used when neither a credential provider nor the user supplies one
pub const DEFAULT_IDENTITY_ID: &str = "lightspeed-exporter";

/// Timeout for each credential-exchange request
pub const ACCESS_TOKEN_GENERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Filename of the uploaded multipart file part
pub const TARBALL_FILENAME: &str = "lightspeed-assistant.tgz";

// The ingress proxy forwards any identity with this agent prefix.
const USER_AGENT_PREFIX: &str = "openshift-lightspeed-operator/user-data-collection cluster/";

pub fn user_agent(identity_id: &str) -> String {
    format!("{}{}", USER_AGENT_PREFIX, identity_id)
}

pub fn content_type(service_id: &str) -> String {
    format!("application/vnd.redhat.{}.periodic+tar", service_id)
}

/// Fully resolved configuration consumed by the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub service_id: String,
    pub ingress_server_url: String,
    pub ingress_server_auth_token: String,
    pub identity_id: String,
    /// Seconds between cycle starts; 0 runs a single cycle and exits
    pub collection_interval: u64,
    pub ingress_connection_timeout: u64,
    pub retry_interval: u64,
    pub cleanup_after_send: bool,
    /// Top-level subdirectories eligible for export; empty means all
    pub allowed_subdirs: Vec<String>,
    pub max_payload_size: u64,
    pub max_data_dir_size: u64,
}

impl ServiceConfig {
    pub fn single_shot(&self) -> bool {
        self.collection_interval == 0
    }

    pub fn collection_interval(&self) -> Duration {
        Duration::from_secs(self.collection_interval)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.ingress_connection_timeout)
    }

    /// Merge overrides, file values and defaults, then validate.
    ///
    /// Credentials from a provider take precedence over any token or
    /// identity given on the command line or in the file.
    pub fn resolve(
        overrides: &ConfigOverrides,
        file: &FileConfig,
        credentials: Option<&Credentials>,
    ) -> Result<Self> {
        let mut missing = Vec::new();

        let data_dir = overrides.data_dir.clone().or_else(|| file.data_dir.clone());
        let service_id = first_some([overrides.service_id.clone(), file.service_id.clone()]);
        let ingress_server_url = first_some([
            overrides.ingress_server_url.clone(),
            file.ingress_server_url.clone(),
        ]);
        let ingress_server_auth_token = first_some([
            credentials.map(|c| c.token.clone()),
            overrides.ingress_server_auth_token.clone(),
            file.ingress_server_auth_token.clone(),
        ]);
        let identity_id = first_some([
            credentials.map(|c| c.identity_id.clone()),
            overrides.identity_id.clone(),
            file.identity_id.clone(),
        ])
        .unwrap_or_else(|| DEFAULT_IDENTITY_ID.to_string());

        if data_dir.is_none() {
            missing.push("data_dir: field required".to_string());
        }
        for (name, value) in [
            ("service_id", &service_id),
            ("ingress_server_url", &ingress_server_url),
            ("ingress_server_auth_token", &ingress_server_auth_token),
        ] {
            match value {
                None => missing.push(format!("{}: field required", name)),
                Some(v) if v.trim().is_empty() => {
                    missing.push(format!("{}: must not be empty", name))
                }
                Some(_) => {}
            }
        }

        let config = ServiceConfig {
            data_dir: data_dir.unwrap_or_default(),
            service_id: service_id.unwrap_or_default(),
            ingress_server_url: ingress_server_url.unwrap_or_default(),
            ingress_server_auth_token: ingress_server_auth_token.unwrap_or_default(),
            identity_id,
            collection_interval: overrides
                .collection_interval
                .or(file.collection_interval)
                .unwrap_or(DEFAULT_COLLECTION_INTERVAL),
            ingress_connection_timeout: overrides
                .ingress_connection_timeout
                .or(file.ingress_connection_timeout)
                .unwrap_or(DEFAULT_CONNECTION_TIMEOUT),
            retry_interval: overrides
                .retry_interval
                .or(file.retry_interval)
                .unwrap_or(DEFAULT_RETRY_INTERVAL),
            cleanup_after_send: if overrides.no_cleanup {
                false
            } else {
                file.cleanup_after_send.unwrap_or(true)
            },
            allowed_subdirs: overrides
                .allowed_subdirs
                .clone()
                .or_else(|| file.allowed_subdirs.clone())
                .unwrap_or_default(),
            max_payload_size: file.max_payload_size.unwrap_or(MAX_PAYLOAD_SIZE),
            max_data_dir_size: file.max_data_dir_size.unwrap_or(MAX_DATA_DIR_SIZE),
        };

        let mut problems = missing;
        problems.extend(config.validate());
        if !problems.is_empty() {
            return Err(ExportError::Config(problems.join("; ")));
        }

        if config.max_data_dir_size < config.max_payload_size {
            tracing::warn!(
                "max_data_dir_size ({}) is smaller than max_payload_size ({}), the size limit will remove data before it can be sent",
                config.max_data_dir_size,
                config.max_payload_size
            );
        }

        Ok(config)
    }

    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !self.data_dir.as_os_str().is_empty() && !self.data_dir.is_dir() {
            problems.push(format!(
                "data_dir: path '{}' does not point to a directory",
                self.data_dir.display()
            ));
        }
        if self.ingress_connection_timeout == 0 {
            problems.push("ingress_connection_timeout: must be greater than 0".to_string());
        }
        if self.max_payload_size == 0 {
            problems.push("max_payload_size: must be greater than 0".to_string());
        }
        problems
    }

    /// Pretty JSON with keys in sorted order.
    pub fn to_json_pretty(&self) -> Result<String> {
        let sorted: BTreeMap<String, serde_json::Value> = serde_json::to_value(self)
            .and_then(serde_json::from_value)
            .map_err(|e| ExportError::Config(format!("Cannot serialize config: {}", e)))?;
        serde_json::to_string_pretty(&sorted)
            .map_err(|e| ExportError::Config(format!("Cannot serialize config: {}", e)))
    }
}

fn first_some<const N: usize>(values: [Option<String>; N]) -> Option<String> {
    values.into_iter().flatten().next()
}

/// Values given on the command line. `None` means "not specified".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub service_id: Option<String>,
    pub ingress_server_url: Option<String>,
    pub ingress_server_auth_token: Option<String>,
    pub identity_id: Option<String>,
    pub collection_interval: Option<u64>,
    pub ingress_connection_timeout: Option<u64>,
    pub retry_interval: Option<u64>,
    pub no_cleanup: bool,
    pub allowed_subdirs: Option<Vec<String>>,
}

/// Contents of the YAML configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub service_id: Option<String>,
    pub ingress_server_url: Option<String>,
    pub ingress_server_auth_token: Option<String>,
    pub identity_id: Option<String>,
    pub collection_interval: Option<u64>,
    pub ingress_connection_timeout: Option<u64>,
    pub retry_interval: Option<u64>,
    pub cleanup_after_send: Option<bool>,
    pub allowed_subdirs: Option<Vec<String>>,
    pub max_payload_size: Option<u64>,
    pub max_data_dir_size: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| ExportError::io(path, e))?;
        Self::parse(&contents).map_err(|e| match e {
            ExportError::Config(msg) => {
                ExportError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(contents)
            .map_err(|e| ExportError::Config(format!("Failed to parse YAML: {}", e)))?;
        if value.is_null() {
            return Err(ExportError::Config(
                "Configuration file is empty or invalid".to_string(),
            ));
        }
        serde_yaml::from_value(value)
            .map_err(|e| ExportError::Config(format!("Failed to parse YAML: {}", e)))
    }
}
