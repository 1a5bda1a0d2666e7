//! Test-suite parser for loading suite files.
//!
//! This module handles loading suites from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, Result, SkeletonError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::SuiteConfig;

/// Environment variable overriding `module.dir`.
pub const ENV_MODULE_DIR: &str = "SKELETON_MODULE_DIR";

/// Environment variable overriding `tool.binary`.
pub const ENV_TF_BINARY: &str = "SKELETON_TF_BINARY";

/// Environment variable that turns the `test` command into a full deployment.
pub const ENV_DO_APPLY: &str = "DO_APPLY";

/// Parser for test-suite files.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new suite parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a suite from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<SuiteConfig> {
        let path = path.as_ref();
        info!("Loading test suite from: {}", path.display());

        if !path.exists() {
            return Err(SkeletonError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            SkeletonError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a suite from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<SuiteConfig> {
        debug!("Parsing YAML test suite");

        let config: SuiteConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            SkeletonError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Successfully parsed test suite for module: {}",
            config.module.dir.display()
        );
        Ok(config)
    }

    /// Loads a suite with environment variable overrides.
    ///
    /// `SKELETON_MODULE_DIR` overrides `module.dir` and
    /// `SKELETON_TF_BINARY` overrides `tool.binary`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<SuiteConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Applies environment variable overrides to the suite.
    fn apply_env_overrides(config: &mut SuiteConfig) {
        if let Ok(dir) = std::env::var(ENV_MODULE_DIR) {
            debug!("Overriding module.dir from environment");
            config.module.dir = PathBuf::from(dir);
        }

        if let Ok(binary) = std::env::var(ENV_TF_BINARY) {
            debug!("Overriding tool.binary from environment");
            config.tool.binary = binary;
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                SkeletonError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Returns true when `DO_APPLY` asks for a full deployment.
    #[must_use]
    pub fn do_apply() -> bool {
        std::env::var(ENV_DO_APPLY).is_ok_and(|v| is_truthy(&v))
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Default suite file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["skeleton.test.yaml", "skeleton.test.yml"];

/// Finds the suite file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no suite file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    // A relative start like "." has no parents to pop
    let mut current = std::path::absolute(start).unwrap_or_else(|_| start.to_path_buf());

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found test suite file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(SkeletonError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_suite() {
        let yaml = r"
module:
  dir: modules/vnet
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();
        assert_eq!(config.module.dir, PathBuf::from("modules/vnet"));
        assert!(config.assertions.is_empty());
    }

    #[test]
    fn test_parse_full_suite() {
        let yaml = r#"
module:
  dir: .
  var_files: [example.tfvars]
  vars:
    location: eastus
    address_space: ["10.0.0.0/16"]
  random_names: azure

tool:
  binary: terraform
  max_retries: 2
  retry_delay_secs: 1

bootstrap:
  - sample: example.tfvars.sample
    active: example.tfvars

assertions:
  - output: vnet_name
    operation: not_empty
    message: VNET name should be set
  - output: subnet_ids
    operation: list_length_equal
    expected: 2

expect_errors:
  - operation: error_contains
    expected: Invalid value for variable
no_errors_message: Plan should fail on an empty name

additional_changes:
  - vars: {subnet_count: 3}
    changed_resources:
      - name: 'module.vnet.azurerm_subnet.this["db"]'
        action: create

golden: plan.golden.json
"#;
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();
        assert_eq!(config.assertions.len(), 2);
        assert_eq!(config.bootstrap[0].active, PathBuf::from("example.tfvars"));
        assert_eq!(config.expect_errors.len(), 1);
        assert_eq!(config.additional_changes[0].changed_resources.len(), 1);
        assert_eq!(config.golden, Some(PathBuf::from("plan.golden.json")));
    }

    #[test]
    fn test_parse_error_has_location() {
        let err = ConfigParser::new()
            .parse_yaml("module: [", Some(Path::new("suite.yaml")))
            .unwrap_err();
        assert!(matches!(
            err,
            SkeletonError::Config(ConfigError::ParseError { location: Some(_), .. })
        ));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("modules").join("vnet");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("skeleton.test.yaml"), "module: {}\n").unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("skeleton.test.yaml"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigParser::new().load_file(dir.path().join("nope.yaml"));
        assert!(matches!(
            result,
            Err(SkeletonError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_truthy() {
        assert!(is_truthy("true"));
        assert!(is_truthy(" TRUE "));
        assert!(is_truthy("1"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy(""));
    }
}
