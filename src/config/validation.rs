use std::net::SocketAddr;

use crate::config::models::DirectorConfig;

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Director configuration validator
pub struct DirectorConfigValidator;

impl DirectorConfigValidator {
    /// Validate the entire director configuration
    pub fn validate(config: &DirectorConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if !Self::is_valid_redirect_status_code(config.redirect_code) {
            errors.push(ValidationError::InvalidField {
                field: "redirect_code".to_string(),
                message: format!(
                    "Status code {} is not a valid redirect code. Use 301, 302, 307, or 308",
                    config.redirect_code
                ),
            });
        }

        if config.admin_key.is_empty() {
            errors.push(ValidationError::InvalidField {
                field: "admin_key".to_string(),
                message: "Cannot be empty; admin endpoints would be left unauthenticated"
                    .to_string(),
            });
        }

        if config.override_destination.is_empty() {
            errors.push(ValidationError::InvalidField {
                field: "override_destination".to_string(),
                message: "Cannot be empty; special hashes and blocked referrers redirect here"
                    .to_string(),
            });
        } else if let Err(e) =
            Self::validate_url(&config.override_destination, "override_destination")
        {
            errors.push(e);
        }

        for (i, cdn) in config.cdns.iter().enumerate() {
            if let Err(e) = Self::validate_url(cdn, &format!("cdns[{i}]")) {
                errors.push(e);
            }
        }

        if config.poller.interval_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "poller.interval_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if config.poller.probe_timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "poller.probe_timeout_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if config.poller.concurrency == 0 {
            errors.push(ValidationError::InvalidField {
                field: "poller.concurrency".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if config.rate_limit.max_requests_per_ip > 0 && config.rate_limit.window_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "rate_limit.window_secs".to_string(),
                message: "Must be greater than 0 when rate limiting is enabled".to_string(),
            });
        }

        if config.special.set_name.trim().is_empty() {
            errors.push(ValidationError::InvalidField {
                field: "special.set_name".to_string(),
                message: "Cannot be empty".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    /// Check if status code is valid for redirects
    fn is_valid_redirect_status_code(code: u16) -> bool {
        matches!(code, 301 | 302 | 307 | 308)
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A deployable baseline: defaults plus the fields every deployment
    /// must set.
    fn valid_config() -> DirectorConfig {
        DirectorConfig {
            admin_key: "secret".to_string(),
            override_destination: "https://fallback.example.com".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(DirectorConfigValidator::validate(&valid_config()).is_ok());
    }

    #[test]
    fn validate_rejects_bare_defaults() {
        // Defaults ship with no admin key and no override destination.
        let config = DirectorConfig::default();
        assert!(DirectorConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn validate_rejects_empty_admin_key() {
        let config = DirectorConfig {
            admin_key: String::new(),
            ..valid_config()
        };
        let err = DirectorConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("admin_key"));
    }

    #[test]
    fn validate_rejects_empty_override_destination() {
        let config = DirectorConfig {
            override_destination: String::new(),
            ..valid_config()
        };
        let err = DirectorConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("override_destination"));
    }

    #[test]
    fn validate_rejects_bad_listen_address() {
        let config = DirectorConfig {
            listen_addr: "not-an-address".to_string(),
            ..valid_config()
        };
        assert!(DirectorConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn validate_rejects_non_redirect_status_code() {
        let config = DirectorConfig {
            redirect_code: 200,
            ..valid_config()
        };
        assert!(DirectorConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn validate_rejects_non_http_override_destination() {
        let config = DirectorConfig {
            override_destination: "ftp://fallback.example.com".to_string(),
            ..valid_config()
        };
        assert!(DirectorConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn validate_accepts_seed_backends() {
        let config = DirectorConfig {
            cdns: vec![
                "http://cdn1.example.com".to_string(),
                "https://cdn2.example.com:8443".to_string(),
            ],
            ..valid_config()
        };
        assert!(DirectorConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn validate_rejects_bad_seed_backend() {
        let config = DirectorConfig {
            cdns: vec!["cdn1.example.com".to_string()],
            ..valid_config()
        };
        assert!(DirectorConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn validate_rejects_zero_poll_interval() {
        let mut config = valid_config();
        config.poller.interval_secs = 0;
        assert!(DirectorConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn validate_allows_disabled_rate_limit_with_zero_window() {
        let mut config = valid_config();
        config.rate_limit.max_requests_per_ip = 0;
        config.rate_limit.window_secs = 0;
        assert!(DirectorConfigValidator::validate(&config).is_ok());
    }
}
