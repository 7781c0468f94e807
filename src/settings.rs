//! Reconciler settings
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `FUNDS_FLOW__*` environment variables (`__` separates nested
//! keys, e.g. `FUNDS_FLOW__RETRY__MAX_RETRIES=5`).

use crate::types::ReconciliationError;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Retry and timeout settings for processor calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 2_000,
            request_timeout_ms: 10_000,
        }
    }
}

/// Read-only configuration handed to the reconciler at construction time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerSettings {
    /// Id stamped on every emitted event, e.g. `stripe`
    pub processor_id: String,

    /// The platform's own processor account; notifications from it skip the
    /// merchant lookup and use platform scope
    pub platform_account_id: String,

    /// Charge metadata keys marking charges created outside this platform
    pub foreign_charge_metadata_keys: Vec<String>,

    /// Default tracing filter; `RUST_LOG` takes precedence
    pub log_level: String,

    pub retry: RetrySettings,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        ReconcilerSettings {
            processor_id: "stripe".to_string(),
            platform_account_id: "acct_platform".to_string(),
            foreign_charge_metadata_keys: vec!["third_party_marketing".to_string()],
            log_level: "info".to_string(),
            retry: RetrySettings::default(),
        }
    }
}

impl ReconcilerSettings {
    /// Load settings from defaults, an optional TOML file and the environment
    ///
    /// # Arguments
    ///
    /// * `path` - Optional settings file; must exist when given
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a source cannot be read or the merged result
    /// does not deserialize or validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ReconciliationError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("FUNDS_FLOW")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("foreign_charge_metadata_keys")
                .try_parsing(true),
        );

        let settings: ReconcilerSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the reconciler cannot run with
    pub fn validate(&self) -> Result<(), ReconciliationError> {
        if self.processor_id.trim().is_empty() {
            return Err(ReconciliationError::Configuration {
                message: "processor_id must not be empty".to_string(),
            });
        }
        if self.retry.request_timeout_ms == 0 {
            return Err(ReconciliationError::Configuration {
                message: "retry.request_timeout_ms must be positive".to_string(),
            });
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(ReconciliationError::Configuration {
                message: "retry.max_delay_ms must be at least retry.initial_delay_ms".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn settings_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        let settings = ReconcilerSettings::load(None).unwrap();
        assert_eq!(settings, ReconcilerSettings::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = settings_file(
            r#"
processor_id = "sandbox"
foreign_charge_metadata_keys = ["partner_checkout"]

[retry]
max_retries = 5
"#,
        );

        let settings = ReconcilerSettings::load(Some(file.path())).unwrap();

        assert_eq!(settings.processor_id, "sandbox");
        assert_eq!(settings.foreign_charge_metadata_keys, vec!["partner_checkout"]);
        assert_eq!(settings.retry.max_retries, 5);
        assert_eq!(settings.retry.initial_delay_ms, 100);
        assert_eq!(settings.platform_account_id, "acct_platform");
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let result = ReconcilerSettings::load(Some(Path::new("/nonexistent/funds_flow.toml")));
        assert!(matches!(
            result,
            Err(ReconciliationError::Configuration { .. })
        ));
    }

    #[rstest]
    #[case::empty_processor("processor_id = \"  \"")]
    #[case::zero_timeout("[retry]\nrequest_timeout_ms = 0")]
    #[case::inverted_delays("[retry]\ninitial_delay_ms = 500\nmax_delay_ms = 100")]
    fn test_invalid_settings_rejected(#[case] contents: &str) {
        let file = settings_file(contents);
        let result = ReconcilerSettings::load(Some(file.path()));
        assert!(matches!(
            result,
            Err(ReconciliationError::Configuration { .. })
        ));
    }
}
