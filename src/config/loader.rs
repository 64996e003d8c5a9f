// file: src/config/loader.rs
// version: 2.0.0
// guid: d4e5f6a7-b8c9-4012-8456-7890123defab

//! Configuration file loading and environment variable substitution

use regex::Regex;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

use super::Settings;
use crate::{Result, UpgradeError};

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
    env_vars: HashMap<String, String>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self {
            env_vars: std::env::vars().collect(),
        }
    }

    /// Load run settings; a missing file yields the defaults
    pub fn load_settings<P: AsRef<Path>>(&self, path: P) -> Result<Settings> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Settings::default());
        }

        let settings: Settings = self.load_yaml(path)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read a YAML file, expand `${VAR}` references and deserialize it
    pub fn load_yaml<T, P>(&self, path: P) -> Result<T>
    where
        T: DeserializeOwned,
        P: AsRef<Path>,
    {
        let content = fs::read_to_string(&path).map_err(|e| {
            UpgradeError::config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let expanded = self.expand_env_vars(&content)?;
        Ok(serde_yaml::from_str(&expanded)?)
    }

    /// Expand environment variables in configuration content
    fn expand_env_vars(&self, content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| UpgradeError::config(format!("Invalid regex pattern: {}", e)))?;

        let mut result = content.to_string();
        let mut missing_vars = Vec::new();

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let placeholder = &cap[0];

            if let Some(value) = self.env_vars.get(var_name) {
                result = result.replace(placeholder, value);
            } else if !missing_vars.iter().any(|m| m == var_name) {
                missing_vars.push(var_name.to_string());
            }
        }

        if !missing_vars.is_empty() {
            return Err(UpgradeError::config(format!(
                "Missing environment variables: {}",
                missing_vars.join(", ")
            )));
        }

        Ok(result)
    }

    /// Set environment variable for substitution
    pub fn set_env_var(&mut self, key: String, value: String) {
        self.env_vars.insert(key, value);
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_env_var_expansion() {
        let mut loader = ConfigLoader::new();
        loader.set_env_var("IMAGE_HOST".to_string(), "10.1.1.5".to_string());

        let result = loader.expand_env_vars("host: ${IMAGE_HOST}").unwrap();
        assert_eq!(result, "host: 10.1.1.5");
    }

    #[test]
    fn test_missing_env_var() {
        let loader = ConfigLoader::new();
        let result = loader.expand_env_vars("password: ${SUA_TEST_MISSING_VAR}");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Missing environment variables: SUA_TEST_MISSING_VAR"));
    }

    #[test]
    fn test_missing_settings_file_uses_defaults() {
        let loader = ConfigLoader::new();
        let settings = loader.load_settings("/nonexistent/config.yaml").unwrap();
        assert_eq!(settings.runner.inspect_workers, 10);
    }

    #[test]
    fn test_load_settings() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
inventory:
  platform: cisco_ios
runner:
  inspect_workers: 20
channel:
  delay_factor: ${{SUA_DELAY}}
image_server:
  host: 10.1.1.5
  port: 8080
"#
        )
        .unwrap();

        let mut loader = ConfigLoader::new();
        loader.set_env_var("SUA_DELAY".to_string(), "300".to_string());
        let settings = loader.load_settings(file.path())?;

        assert_eq!(settings.inventory.platform, "cisco_ios");
        assert_eq!(settings.runner.inspect_workers, 20);
        assert_eq!(settings.channel.delay_factor, 300);
        assert_eq!(settings.image_server.base_url()?, "http://10.1.1.5:8080");
        Ok(())
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "runner:\n  reload_workers: 0\n").unwrap();
        let loader = ConfigLoader::new();
        assert!(matches!(
            loader.load_settings(file.path()),
            Err(UpgradeError::Validation(_))
        ));
    }
}
