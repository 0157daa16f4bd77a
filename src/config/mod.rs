// Configuration module

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub origin: OriginConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
}

/// Default timeout for metadata probes (seconds)
fn default_probe_timeout() -> u64 {
    10
}

/// Default timeout for full body downloads (seconds)
fn default_download_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Base URL the cache mirrors, e.g. "https://assets.example.com"
    pub base_url: String,

    /// Timeout for HEAD probes in seconds (default: 10)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: u64,

    /// Timeout for background downloads in seconds (default: 60)
    #[serde(default = "default_download_timeout")]
    pub download_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding the mirrored files
    pub root: PathBuf,
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, String> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| e.to_string())?;

        // First, check that all referenced environment variables exist
        for caps in re.captures_iter(yaml) {
            let var_name = &caps[1];
            std::env::var(var_name).map_err(|_| {
                format!(
                    "Environment variable '{}' is referenced but not set",
                    var_name
                )
            })?;
        }

        // Now perform the substitution (we know all vars exist)
        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap() // Safe because we checked above
        });

        serde_yaml::from_str(&substituted).map_err(|e| e.to_string())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.address.is_empty() {
            return Err("Server address cannot be empty".to_string());
        }

        let authority = self
            .origin
            .base_url
            .strip_prefix("https://")
            .or_else(|| self.origin.base_url.strip_prefix("http://"));
        match authority {
            None => {
                return Err(format!(
                    "Origin base_url '{}' must start with http:// or https://",
                    self.origin.base_url
                ));
            }
            Some(authority) if authority.is_empty() || authority.starts_with('/') => {
                return Err(format!(
                    "Origin base_url '{}' has no host",
                    self.origin.base_url
                ));
            }
            Some(_) => {}
        }

        if self.origin.base_url.ends_with('/') {
            return Err(format!(
                "Origin base_url '{}' must not end with /",
                self.origin.base_url
            ));
        }

        if self.origin.probe_timeout == 0 {
            return Err("Origin probe_timeout must be > 0 seconds".to_string());
        }

        if self.origin.download_timeout == 0 {
            return Err("Origin download_timeout must be > 0 seconds".to_string());
        }

        if self.cache.root.as_os_str().is_empty() {
            return Err("Cache root cannot be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID_YAML: &str = r#"
server:
  address: "0.0.0.0"
  port: 6188

origin:
  base_url: "https://assets.example.com"

cache:
  root: "/var/cache/kagami"
"#;

    #[test]
    fn test_config_can_be_loaded_from_file_path() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(VALID_YAML.as_bytes()).unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.server.address, "0.0.0.0");
        assert_eq!(config.server.port, 6188);
        assert_eq!(config.origin.base_url, "https://assets.example.com");
        assert_eq!(config.cache.root, PathBuf::from("/var/cache/kagami"));
    }

    #[test]
    fn test_timeouts_default_when_omitted() {
        let config = Config::from_yaml_with_env(VALID_YAML).unwrap();
        assert_eq!(config.origin.probe_timeout, 10);
        assert_eq!(config.origin.download_timeout, 60);
    }

    #[test]
    fn test_can_substitute_env_var_in_cache_root() {
        std::env::set_var("KAGAMI_TEST_CACHE_ROOT", "/tmp/mirror");
        let yaml = r#"
server:
  address: "127.0.0.1"
  port: 8080

origin:
  base_url: "http://localhost:9000"

cache:
  root: "${KAGAMI_TEST_CACHE_ROOT}"
"#;
        let config = Config::from_yaml_with_env(yaml).unwrap();
        assert_eq!(config.cache.root, PathBuf::from("/tmp/mirror"));
        std::env::remove_var("KAGAMI_TEST_CACHE_ROOT");
    }

    #[test]
    fn test_missing_env_var_is_an_error() {
        let yaml = r#"
server:
  address: "127.0.0.1"
  port: 8080

origin:
  base_url: "${KAGAMI_TEST_UNSET_ORIGIN}"

cache:
  root: "/tmp/mirror"
"#;
        let err = Config::from_yaml_with_env(yaml).unwrap_err();
        assert!(err.contains("KAGAMI_TEST_UNSET_ORIGIN"));
    }

    #[test]
    fn test_validate_rejects_non_http_base_url() {
        let mut config = Config::from_yaml_with_env(VALID_YAML).unwrap();
        config.origin.base_url = "ftp://assets.example.com".to_string();
        assert!(config.validate().unwrap_err().contains("http"));
    }

    #[test]
    fn test_validate_rejects_base_url_without_host() {
        let mut config = Config::from_yaml_with_env(VALID_YAML).unwrap();
        config.origin.base_url = "https://".to_string();
        assert!(config.validate().unwrap_err().contains("no host"));

        let mut config = Config::from_yaml_with_env(VALID_YAML).unwrap();
        config.origin.base_url = "http://".to_string();
        assert!(config.validate().unwrap_err().contains("no host"));
    }

    #[test]
    fn test_validate_rejects_trailing_slash_base_url() {
        let mut config = Config::from_yaml_with_env(VALID_YAML).unwrap();
        config.origin.base_url = "https://assets.example.com/".to_string();
        assert!(config.validate().unwrap_err().contains("must not end with /"));
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let mut config = Config::from_yaml_with_env(VALID_YAML).unwrap();
        config.origin.probe_timeout = 0;
        assert!(config.validate().is_err());

        let mut config = Config::from_yaml_with_env(VALID_YAML).unwrap();
        config.origin.download_timeout = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_valid_config() {
        let config = Config::from_yaml_with_env(VALID_YAML).unwrap();
        assert!(config.validate().is_ok());
    }
}
