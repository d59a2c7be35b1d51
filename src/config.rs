//! Service configuration from environment variables with CLI overrides.

use std::env;

use crate::page_validator::ValidationMethod;

/// Default Notion API version sent with every request.
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

const DEFAULT_PORT: u16 = 3004;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("NOTION_TOKEN is not set")]
    MissingToken,

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Validation thresholds. These are environment defaults; request payloads
/// may override them per call.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub method: ValidationMethod,
    pub coverage_threshold: f64,
    pub max_missing: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            method: ValidationMethod::Lcs,
            coverage_threshold: 0.97,
            max_missing: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub notion_token: String,
    pub notion_version: String,
    pub port: u16,
    pub verbose: bool,
    pub strict_order: bool,
    pub validation: ValidationConfig,
}

impl ServerConfig {
    /// Read configuration from the environment. The token is required;
    /// everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let notion_token = env::var("NOTION_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingToken)?;

        let notion_version =
            env::var("NOTION_VERSION").unwrap_or_else(|_| DEFAULT_NOTION_VERSION.to_string());

        let port = match env::var("SN2N_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "SN2N_PORT",
                    value: raw,
                })?,
            Err(_) => DEFAULT_PORT,
        };

        let mut validation = ValidationConfig::default();
        if let Ok(raw) = env::var("SN2N_VALIDATION_METHOD") {
            validation.method = match raw.to_ascii_lowercase().as_str() {
                "lcs" => ValidationMethod::Lcs,
                "jaccard" => ValidationMethod::Jaccard,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "SN2N_VALIDATION_METHOD",
                        value: raw,
                    });
                }
            };
        }
        if let Ok(raw) = env::var("SN2N_COVERAGE_THRESHOLD") {
            validation.coverage_threshold =
                raw.parse().map_err(|_| ConfigError::InvalidValue {
                    name: "SN2N_COVERAGE_THRESHOLD",
                    value: raw,
                })?;
        }
        if let Ok(raw) = env::var("SN2N_MAX_MISSING") {
            validation.max_missing = raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: "SN2N_MAX_MISSING",
                value: raw,
            })?;
        }

        Ok(Self {
            notion_token,
            notion_version,
            port,
            verbose: flag_from_env("SN2N_VERBOSE"),
            strict_order: flag_from_env("SN2N_STRICT_ORDER"),
            validation,
        })
    }
}

fn flag_from_env(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
