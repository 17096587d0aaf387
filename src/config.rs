use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use promptloom::generation::{CommandConfig, IpCheckConfig};
use promptloom::scheduler::{EstimatorConfig, PacingConfig, RetryConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    /// Piece library directories or glob patterns
    pub libraries: Vec<String>,
    pub pacing: PacingConfig,
    pub retries: RetryConfig,
    pub estimator: EstimatorConfig,
    pub backend: CommandConfig,
    pub ip_check: IpCheckConfig,
    pub output_dir: PathBuf,
}

fn project_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(env!("CARGO_PKG_NAME"))
}

impl Default for Config {
    fn default() -> Self {
        let libraries = dirs::config_dir()
            .map(|dir| dir.join(env!("CARGO_PKG_NAME")).join("libraries"))
            .unwrap_or_else(|| PathBuf::from("libraries"));
        Self {
            log_level: Some("info".to_string()),
            libraries: vec![libraries.display().to_string()],
            pacing: PacingConfig::default(),
            retries: RetryConfig::default(),
            estimator: EstimatorConfig::default(),
            backend: CommandConfig::default(),
            ip_check: IpCheckConfig::default(),
            output_dir: project_data_dir().join("outputs"),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert_eq!(config.retries.generation, 40);
        assert_eq!(config.retries.remove_background, 1);
        assert_eq!(config.libraries.len(), 1);
        assert!(config.output_dir.ends_with("outputs"));
        assert!(!config.ip_check.enabled);
    }

    #[test]
    fn test_load_explicit_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("promptloom.yml");
        fs::write(
            &path,
            r#"
libraries:
  - ./pieces/*.yml
pacing:
  delay_min_ms: 100
retries:
  generation: 3
backend:
  generate: ./gen.sh
ip_check:
  enabled: true
  enforce: false
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.libraries, vec!["./pieces/*.yml".to_string()]);
        assert_eq!(config.pacing.delay_min_ms, 100);
        assert_eq!(config.pacing.delay_spread_ms, 3_000);
        assert_eq!(config.retries.generation, 3);
        assert_eq!(config.retries.remove_background, 1);
        assert_eq!(config.backend.generate, "./gen.sh");
        assert!(config.ip_check.enabled);
        assert!(!config.ip_check.enforce);
        assert_eq!(config.estimator.samples, 128);
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let missing = PathBuf::from("/nonexistent/promptloom.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }
}
