use anyhow::{bail, Context, Result};
use std::env;

use crate::adapter::context::DEFAULT_BODY_LIMIT;
use crate::router::validate_version;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub instance_id: String,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub current_version: String,
    pub supported_versions: Vec<String>,
    pub max_body_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("API_PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .context("API_PORT must be a valid port number")?,
                // Used only for debugging/observability. If unset, fall back to HOSTNAME if
                // present (e.g. Docker/Kubernetes), otherwise "unknown".
                instance_id: env::var("INSTANCE_ID")
                    .or_else(|_| env::var("HOSTNAME"))
                    .unwrap_or_else(|_| "unknown".to_string()),
            },
            api: ApiConfig {
                current_version: env::var("API_CURRENT_VERSION")
                    .unwrap_or_else(|_| "v2".to_string()),
                supported_versions: parse_versions(
                    &env::var("API_SUPPORTED_VERSIONS").unwrap_or_else(|_| "v1,v2".to_string()),
                ),
                max_body_bytes: env::var("API_MAX_BODY_BYTES")
                    .unwrap_or_else(|_| DEFAULT_BODY_LIMIT.to_string())
                    .parse()
                    .context("API_MAX_BODY_BYTES must be a valid number")?,
            },
        };

        config.api.validate()?;
        Ok(config)
    }

    /// Get server address as string
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.supported_versions.is_empty() {
            bail!("API_SUPPORTED_VERSIONS must list at least one version");
        }
        for version in &self.supported_versions {
            validate_version(version)
                .with_context(|| format!("API_SUPPORTED_VERSIONS contains {:?}", version))?;
        }
        if !self.supported_versions.contains(&self.current_version) {
            bail!(
                "API_CURRENT_VERSION {:?} is not in API_SUPPORTED_VERSIONS {:?}",
                self.current_version,
                self.supported_versions
            );
        }
        Ok(())
    }
}

/// Split a comma-separated version list, dropping blanks
fn parse_versions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
