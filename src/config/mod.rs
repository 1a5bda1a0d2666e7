//! Test-suite configuration.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `skeleton.test.yaml`
//! - Environment overrides and `.env` loading
//! - Validation of suite values before anything is deployed

mod parser;
mod spec;
mod validator;

pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_DO_APPLY, ENV_MODULE_DIR, ENV_TF_BINARY,
    find_config_file,
};
pub use spec::{
    AdditionalChangesConfig, AssertionConfig, BootstrapFile, ChangedResourceConfig, ModuleConfig,
    RandomNamesKind, SuiteConfig, ToolConfig,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
