use std::path::Path;
use crate::errors::ProbeError;
use super::types::{defaults, ProbeConfig};
use super::schema::CONFIG_SCHEMA;
use tracing::warn;

const MAX_CONFIG_BYTES: u64 = 1_048_576;

pub async fn parse_config(path: &Path) -> Result<ProbeConfig, ProbeError> {
    if !path.exists() {
        return Err(ProbeError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| ProbeError::Config(format!("Cannot stat {}: {}", path.display(), e)))?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(ProbeError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ProbeError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
    parse_config_str(&content)
}

/// Parse and validate configuration text.
pub fn parse_config_str(content: &str) -> Result<ProbeConfig, ProbeError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)
        .map_err(|e| ProbeError::Config(format!("Invalid YAML: {}", e)))?;

    // An empty file is a valid, empty config.
    if yaml.is_null() {
        return Ok(ProbeConfig::default());
    }

    validate_schema(&yaml)?;

    let config: ProbeConfig = serde_yaml::from_value(yaml)
        .map_err(|e| ProbeError::Config(format!("Invalid config: {}", e)))?;

    validate_conflicts(&config)?;

    Ok(config)
}

/// Validate config against the JSON schema for structural correctness.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), ProbeError> {
    let json_value: serde_json::Value = serde_json::to_value(yaml)
        .map_err(|e| ProbeError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| ProbeError::Config(format!("Schema compilation error: {}", e)))?;

    let result = compiled.validate(&json_value);
    if let Err(errors) = result {
        // Advisory only, semantic checks below decide.
        for e in errors {
            warn!(validation_error = %format!("{} at {}", e, e.instance_path), "Config schema warning");
        }
    }

    Ok(())
}

/// Reject values no run could work with.
fn validate_conflicts(config: &ProbeConfig) -> Result<(), ProbeError> {
    if let Some(scan) = &config.scan {
        if scan.threads == Some(0) {
            return Err(ProbeError::Config("scan.threads must be at least 1".into()));
        }
        if let Some(threads) = scan.threads.filter(|t| *t > defaults::MAX_THREADS) {
            warn!(threads, max = defaults::MAX_THREADS, "scan.threads above cap, will be clamped");
        }
        if let Some(delay) = scan.delay_secs {
            if !delay.is_finite() || delay < 0.0 {
                return Err(ProbeError::Config(format!("scan.delay_secs must be >= 0, got {}", delay)));
            }
        }
        if scan.retry_attempts == Some(0) {
            return Err(ProbeError::Config("scan.retry_attempts must be at least 1".into()));
        }
    }

    if let Some(browser) = &config.browser {
        if browser.page_load_timeout_secs == Some(0) {
            return Err(ProbeError::Config("browser.page_load_timeout_secs must be at least 1".into()));
        }
    }

    if let Some(listener) = &config.listener {
        if listener.max_hits == Some(0) {
            return Err(ProbeError::Config("listener.max_hits must be at least 1".into()));
        }
        let port = listener.port.unwrap_or(defaults::LISTEN_PORT);
        if listener.redirect_port == Some(port) {
            return Err(ProbeError::Config(format!(
                "listener.redirect_port {} collides with listener.port",
                port
            )));
        }
        if listener.ctf_mode == Some(false) && listener.max_hits.is_some() {
            warn!("listener.max_hits has no effect while ctf_mode is off");
        }
    }

    Ok(())
}
