//! Compilation configuration.
//!
//! A [`CompilationConfig`] is a plain value handed to every builder. It can
//! be loaded from a TOML file:
//!
//! ```toml
//! platform = "l4v4"
//! arch = "amd64"
//! align_to_type = true
//! ignore_duplicate_opcodes = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sizing::{Arch, Platform, PlatformSizes};

/// Settings for one compilation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilationConfig {
    pub platform: Platform,
    pub arch: Arch,
    /// Align members to their own type size instead of the word size.
    pub align_to_type: bool,
    /// Move members that overflow the message into refstrings.
    pub convert_oversized_members: bool,
    /// Keep the first of two colliding dispatch entries instead of failing.
    pub ignore_duplicate_opcodes: bool,
    /// Do not retry a send interrupted by cancellation.
    pub no_send_retry_on_cancel: bool,
    /// Shift applied to interface numbers when composing opcodes.
    pub interface_number_bits: u32,
}

impl Default for CompilationConfig {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            arch: Arch::default(),
            align_to_type: false,
            convert_oversized_members: false,
            ignore_duplicate_opcodes: false,
            no_send_retry_on_cancel: false,
            interface_number_bits: 20,
        }
    }
}

impl CompilationConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().display().to_string(), e))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interface_number_bits >= 64 {
            return Err(ConfigError::Invalid(format!(
                "interface_number_bits must be below 64, got {}",
                self.interface_number_bits
            )));
        }
        Ok(())
    }

    /// The sizing table for the configured target.
    pub fn sizes(&self) -> PlatformSizes {
        PlatformSizes::new(self.platform, self.arch)
    }

    /// Platform-conditional behavior derived from this configuration.
    pub fn hooks(&self) -> PlatformHooks {
        PlatformHooks::for_config(self)
    }
}

/// Platform-conditional switches consulted by the layout builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlatformHooks {
    /// Terminate a flexpage list with an all-zero descriptor.
    pub zero_flexpage_delimiter: bool,
    pub align_to_type: bool,
    /// Message buffers live in the user thread control block.
    pub utcb_buffers: bool,
    /// The platform can transfer page-grant descriptors at all.
    pub page_grants: bool,
}

impl PlatformHooks {
    pub fn for_config(config: &CompilationConfig) -> Self {
        let platform = config.platform;
        Self {
            zero_flexpage_delimiter: matches!(
                platform,
                Platform::L4v2 | Platform::L4x0 | Platform::Fiasco
            ),
            align_to_type: config.align_to_type,
            utcb_buffers: platform == Platform::L4v4,
            page_grants: platform.is_l4(),
        }
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}': {1}")]
    Io(String, #[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_config() {
        let toml = r#"
platform = "l4v4"
arch = "amd64"
align_to_type = true
"#;
        let config = CompilationConfig::from_str(toml).unwrap();
        assert_eq!(config.platform, Platform::L4v4);
        assert_eq!(config.arch, Arch::Amd64);
        assert!(config.align_to_type);
        assert_eq!(config.interface_number_bits, 20);

        let hooks = config.hooks();
        assert!(hooks.utcb_buffers);
        assert!(hooks.page_grants);
        assert!(!hooks.zero_flexpage_delimiter);
    }

    #[test]
    fn test_defaults_from_empty() {
        let config = CompilationConfig::from_str("").unwrap();
        assert_eq!(config, CompilationConfig::default());
        assert!(config.hooks().zero_flexpage_delimiter);
    }

    #[test]
    fn test_rejects_wide_shift() {
        let result = CompilationConfig::from_str("interface_number_bits = 64");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "platform = \"sock\"").unwrap();
        let config = CompilationConfig::from_file(file.path()).unwrap();
        assert_eq!(config.platform, Platform::Sock);
        assert!(!config.hooks().page_grants);
    }

    #[test]
    fn test_missing_file() {
        let result = CompilationConfig::from_file("/nonexistent/stubgen.toml");
        assert!(matches!(result, Err(ConfigError::Io(..))));
    }
}
