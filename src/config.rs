//! Deployment-trigger configuration (§4.J): a YAML document with `${VAR}`
//! environment substitution, loaded once at startup and handed to
//! `main::run` as an `Arc`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use crate::domain::ApplicationId;
use crate::error::{Result, TriggerError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub trigger: TriggerSettings,
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub build_service: BuildServiceConfig,
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSettings {
    /// The platform version deployed when an application has never declared
    /// a platform change of its own (`Versions::from`'s fallback).
    pub system_platform_version: String,
    #[serde(default = "default_tick_interval")]
    pub tick_interval: String,
    #[serde(default = "default_job_timeout")]
    pub job_timeout: String,
    #[serde(default = "default_webhook_job_timeout")]
    pub webhook_job_timeout: String,
    #[serde(default = "default_max_concurrent_applications")]
    pub max_concurrent_applications: usize,
}

fn default_tick_interval() -> String {
    "15s".to_string()
}

fn default_job_timeout() -> String {
    "12h".to_string()
}

fn default_webhook_job_timeout() -> String {
    "1h".to_string()
}

fn default_max_concurrent_applications() -> usize {
    32
}

impl TriggerSettings {
    pub fn tick_interval(&self) -> Result<Duration> {
        parse_duration(&self.tick_interval, "trigger.tick_interval")
    }

    pub fn job_timeout(&self) -> Result<Duration> {
        parse_duration(&self.job_timeout, "trigger.job_timeout")
    }

    pub fn webhook_job_timeout(&self) -> Result<Duration> {
        parse_duration(&self.webhook_job_timeout, "trigger.webhook_job_timeout")
    }
}

fn parse_duration(raw: &str, field: &str) -> Result<Duration> {
    humantime::parse_duration(raw).map_err(|e| TriggerError::Config(format!("invalid {field} {raw:?}: {e}")))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub isolation_mode: bool,
    #[serde(default = "default_allowed_networks")]
    pub allowed_networks: Vec<String>,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8111
}

fn default_true() -> bool {
    true
}

fn default_allowed_networks() -> Vec<String> {
    vec![
        "10.0.0.0/8".to_string(),
        "172.16.0.0/12".to_string(),
        "192.168.0.0/16".to_string(),
        "127.0.0.1/32".to_string(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            isolation_mode: true,
            allowed_networks: default_allowed_networks(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl")]
    pub token_ttl: String,
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

fn default_token_ttl() -> String {
    "24h".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildServiceConfig {
    pub base_url: String,
    #[serde(default = "default_build_service_timeout")]
    pub timeout: String,
}

fn default_build_service_timeout() -> String {
    "10s".to_string()
}

impl BuildServiceConfig {
    pub fn timeout(&self) -> Result<Duration> {
        parse_duration(&self.timeout, "build_service.timeout")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub id: ApplicationIdConfig,
    pub deployment_spec: crate::domain::DeploymentSpec,
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationIdConfig {
    pub tenant: String,
    pub name: String,
}

impl From<&ApplicationIdConfig> for ApplicationId {
    fn from(value: &ApplicationIdConfig) -> Self {
        ApplicationId::new(&value.tenant, &value.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Load config from file with `${VAR}` environment substitution.
pub fn load(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let content = substitute_env_vars(&content);

    let config: Config = serde_yaml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Substitutes `${VAR}` patterns with environment variables. Unresolved
/// names are replaced with the empty string and logged — only
/// `auth.jwt_secret` being empty after substitution is a hard failure,
/// checked in `validate`.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}]+)\}").unwrap();
    let mut missing_vars = Vec::new();

    let result = re
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    missing_vars.push(var_name.to_string());
                    String::new()
                }
            }
        })
        .into_owned();

    if !missing_vars.is_empty() {
        tracing::warn!(missing = ?missing_vars, "Some environment variables are not set");
    }

    result
}

fn validate(config: &Config) -> Result<()> {
    if config.auth.jwt_secret.is_empty() {
        return Err(TriggerError::Config(
            "JWT secret must be set (auth.jwt_secret or its ${VAR} substitution)".to_string(),
        ));
    }

    for network in &config.server.allowed_networks {
        network
            .parse::<ipnetwork::IpNetwork>()
            .map_err(|_| TriggerError::Config(format!("invalid network CIDR: {network}")))?;
    }

    config.trigger.tick_interval()?;
    config.trigger.job_timeout()?;
    config.trigger.webhook_job_timeout()?;
    config.build_service.timeout()?;

    let mut seen = std::collections::HashSet::new();
    for app in &config.applications {
        let id = ApplicationId::from(&app.id);
        if !seen.insert(id.clone()) {
            return Err(TriggerError::Config(format!("duplicate application id {id}")));
        }
    }

    Ok(())
}

/// Checks whether an IP falls inside one of the configured allowed networks.
pub fn is_ip_allowed(ip: &IpAddr, allowed_networks: &[String]) -> bool {
    for network_str in allowed_networks {
        if let Ok(network) = network_str.parse::<ipnetwork::IpNetwork>() {
            if network.contains(*ip) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_substitution_replaces_known_vars() {
        std::env::set_var("TEST_CONFIG_VAR", "test_value");
        let content = "key: ${TEST_CONFIG_VAR}";
        let result = substitute_env_vars(content);
        assert_eq!(result, "key: test_value");
        std::env::remove_var("TEST_CONFIG_VAR");
    }

    #[test]
    fn env_substitution_blanks_unknown_vars() {
        let content = "key: ${DEFINITELY_NOT_SET_xyz}";
        let result = substitute_env_vars(content);
        assert_eq!(result, "key: ");
    }

    #[test]
    fn ip_allowed_checks_cidr_membership() {
        let networks = vec!["10.0.0.0/8".to_string(), "127.0.0.1/32".to_string()];

        assert!(is_ip_allowed(&"10.1.2.3".parse().unwrap(), &networks));
        assert!(is_ip_allowed(&"127.0.0.1".parse().unwrap(), &networks));
        assert!(!is_ip_allowed(&"8.8.8.8".parse().unwrap(), &networks));
    }

    #[test]
    fn validate_rejects_empty_jwt_secret() {
        let config = Config {
            trigger: TriggerSettings {
                system_platform_version: "1.0".to_string(),
                tick_interval: default_tick_interval(),
                job_timeout: default_job_timeout(),
                webhook_job_timeout: default_webhook_job_timeout(),
                max_concurrent_applications: default_max_concurrent_applications(),
            },
            server: ServerConfig::default(),
            auth: AuthConfig {
                jwt_secret: String::new(),
                token_ttl: default_token_ttl(),
                webhook_secret: None,
            },
            build_service: BuildServiceConfig {
                base_url: "http://localhost".to_string(),
                timeout: default_build_service_timeout(),
            },
            applications: vec![],
            logging: LoggingConfig::default(),
        };
        assert!(matches!(validate(&config), Err(TriggerError::Config(_))));
    }
}
