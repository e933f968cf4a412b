//! Stack configuration

use serde::{Deserialize, Serialize};

use crate::domain::Hostname;
use crate::errors::{ProvisionError, ProvisionResult};

/// Default index document served at the site root
fn default_index_document() -> String {
    "index.html".to_string()
}

/// Default error page for missing objects
fn default_error_document() -> String {
    "404.html".to_string()
}

/// Default overall run deadline
fn default_run_timeout_secs() -> u64 {
    30 * 60
}

/// Configuration for one provisioning run
///
/// `target_domain` is the only required input. When `certificate_arn` is
/// present the certificate sub-workflow is bypassed entirely and the
/// supplied identifier is used as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Fully qualified domain the site is served under
    pub target_domain: String,

    /// Pre-existing certificate identifier, if one was issued out of band
    #[serde(default)]
    pub certificate_arn: Option<String>,

    #[serde(default = "default_index_document")]
    pub index_document: String,

    #[serde(default = "default_error_document")]
    pub error_document: String,

    /// Overall run deadline; certificate validation alone can take minutes
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

impl StackConfig {
    pub fn new(target_domain: impl Into<String>) -> Self {
        Self {
            target_domain: target_domain.into(),
            certificate_arn: None,
            index_document: default_index_document(),
            error_document: default_error_document(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }

    pub fn with_certificate_arn(mut self, arn: impl Into<String>) -> Self {
        self.certificate_arn = Some(arn.into());
        self
    }

    /// Read configuration from `SITESTACK_TARGET_DOMAIN` and
    /// `SITESTACK_CERTIFICATE_ARN`.
    pub fn from_env() -> ProvisionResult<Self> {
        let target_domain = std::env::var("SITESTACK_TARGET_DOMAIN").map_err(|_| {
            ProvisionError::Configuration(
                "SITESTACK_TARGET_DOMAIN is not set".to_string(),
            )
        })?;
        let mut config = Self::new(target_domain);
        if let Ok(arn) = std::env::var("SITESTACK_CERTIFICATE_ARN") {
            if !arn.is_empty() {
                config.certificate_arn = Some(arn);
            }
        }
        Ok(config)
    }

    /// Check the configuration before any provisioning begins.
    pub fn validate(&self) -> ProvisionResult<()> {
        Hostname::new(self.target_domain.as_str())?;
        if let Some(arn) = &self.certificate_arn {
            if arn.trim().is_empty() {
                return Err(ProvisionError::Configuration(
                    "certificate_arn is present but empty".to_string(),
                ));
            }
        }
        if self.run_timeout_secs == 0 {
            return Err(ProvisionError::Configuration(
                "run_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_fill_in() {
        let config: StackConfig =
            serde_json::from_str(r#"{ "target_domain": "app.example.com" }"#).unwrap();
        assert_eq!(config.index_document, "index.html");
        assert_eq!(config.error_document, "404.html");
        assert_eq!(config.certificate_arn, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_domain_rejected_before_provisioning() {
        let config = StackConfig::new("");
        assert!(matches!(
            config.validate(),
            Err(ProvisionError::Configuration(_))
        ));
    }

    #[test]
    fn blank_certificate_arn_rejected() {
        let config = StackConfig::new("app.example.com").with_certificate_arn("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = StackConfig::new("app.example.com");
        config.run_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
