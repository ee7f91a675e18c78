//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (interval, deadline and timeouts > 0, ports valid)
//! - Check probe connection parameters are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use sqlx::postgres::PgSslMode;
use url::Url;

use crate::config::schema::{GateConfig, ProbeConfig};
use crate::probe::http::endpoint_url;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("manager.check_interval_ms must be greater than 0")]
    ZeroCheckInterval,

    #[error("manager.deadline_ms must be greater than 0")]
    ZeroDeadline,

    #[error("manager.round_timeout_ms must be greater than 0 when set")]
    ZeroRoundTimeout,

    #[error("unknown log level '{0}'")]
    LogLevel(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),

    #[error("probes[{index}]: host must not be empty")]
    EmptyHost { index: usize },

    #[error("probes[{index}]: port must not be 0")]
    ZeroPort { index: usize },

    #[error("probes[{index}]: timeout_ms must be greater than 0")]
    ZeroTimeout { index: usize },

    #[error("probes[{index}]: name must not be blank")]
    BlankName { index: usize },

    #[error("probes[{index}]: '{value}' does not form a valid URL")]
    InvalidUrl { index: usize, value: String },

    #[error("probes[{index}]: {field} must not be empty")]
    MissingField { index: usize, field: &'static str },

    #[error("probes[{index}]: unknown ssl_mode '{value}'")]
    SslMode { index: usize, value: String },
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.manager.check_interval_ms == 0 {
        errors.push(ValidationError::ZeroCheckInterval);
    }
    if config.manager.deadline_ms == 0 {
        errors.push(ValidationError::ZeroDeadline);
    }
    if config.manager.round_timeout_ms == Some(0) {
        errors.push(ValidationError::ZeroRoundTimeout);
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }
    if let Some(addr) = &config.observability.metrics_address {
        if addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(ValidationError::MetricsAddress(addr.clone()));
        }
    }

    for (index, probe) in config.probes.iter().enumerate() {
        validate_probe(index, probe, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_probe(index: usize, probe: &ProbeConfig, errors: &mut Vec<ValidationError>) {
    if probe.timeout_ms() == 0 {
        errors.push(ValidationError::ZeroTimeout { index });
    }
    if probe.name().is_some_and(|n| n.trim().is_empty()) {
        errors.push(ValidationError::BlankName { index });
    }

    match probe {
        ProbeConfig::Http(c) => {
            check_endpoint(index, &c.host, c.port, errors);
            if !c.host.trim().is_empty() {
                let candidate = endpoint_url(&c.host, c.port, &c.path);
                if Url::parse(&candidate).is_err() {
                    errors.push(ValidationError::InvalidUrl { index, value: candidate });
                }
            }
        }
        ProbeConfig::Tcp(c) => check_endpoint(index, &c.host, c.port, errors),
        ProbeConfig::Postgres(c) => {
            check_endpoint(index, &c.host, c.port, errors);
            if c.database.trim().is_empty() {
                errors.push(ValidationError::MissingField { index, field: "database" });
            }
            if c.user.trim().is_empty() {
                errors.push(ValidationError::MissingField { index, field: "user" });
            }
            if c.ssl_mode.parse::<PgSslMode>().is_err() {
                errors.push(ValidationError::SslMode {
                    index,
                    value: c.ssl_mode.clone(),
                });
            }
        }
        ProbeConfig::Rabbitmq(c) => {
            check_endpoint(index, &c.host, c.port, errors);
            if c.user.is_empty() {
                errors.push(ValidationError::MissingField { index, field: "user" });
            }
            if c.vhost.is_empty() {
                errors.push(ValidationError::MissingField { index, field: "vhost" });
            }
        }
        ProbeConfig::Pubsub(c) => {
            if c.project_id.trim().is_empty() {
                errors.push(ValidationError::MissingField { index, field: "project_id" });
            }
            if let Some(endpoint) = &c.endpoint {
                if Url::parse(endpoint).is_err() {
                    errors.push(ValidationError::InvalidUrl {
                        index,
                        value: endpoint.clone(),
                    });
                }
            }
        }
    }
}

fn check_endpoint(index: usize, host: &str, port: u16, errors: &mut Vec<ValidationError>) {
    if host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost { index });
    }
    if port == 0 {
        errors.push(ValidationError::ZeroPort { index });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{
        HttpProbeConfig, PostgresProbeConfig, PubsubProbeConfig, TcpProbeConfig,
    };

    fn tcp(host: &str, port: u16) -> ProbeConfig {
        ProbeConfig::Tcp(TcpProbeConfig {
            name: None,
            host: host.into(),
            port,
            timeout_ms: 1_000,
        })
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GateConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_all_errors() {
        let mut config = GateConfig::default();
        config.manager.check_interval_ms = 0;
        config.manager.deadline_ms = 0;
        config.probes.push(tcp("", 0));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ZeroCheckInterval,
                ValidationError::ZeroDeadline,
                ValidationError::EmptyHost { index: 0 },
                ValidationError::ZeroPort { index: 0 },
            ]
        );
    }

    #[test]
    fn test_rejects_zero_round_timeout() {
        let mut config = GateConfig::default();
        config.manager.round_timeout_ms = Some(0);
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::ZeroRoundTimeout]
        );
    }

    #[test]
    fn test_rejects_bad_observability() {
        let mut config = GateConfig::default();
        config.observability.log_level = "chatty".into();
        config.observability.metrics_address = Some("not-an-addr".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_probe_specific_fields() {
        let mut config = GateConfig::default();
        config.probes.push(ProbeConfig::Pubsub(PubsubProbeConfig {
            name: Some("  ".into()),
            project_id: String::new(),
            emulator_host: None,
            endpoint: None,
            timeout_ms: 0,
        }));
        config.probes.push(ProbeConfig::Http(HttpProbeConfig {
            name: None,
            host: "localhost".into(),
            port: 8080,
            path: "/ready".into(),
            timeout_ms: 500,
        }));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ZeroTimeout { index: 0 },
                ValidationError::BlankName { index: 0 },
                ValidationError::MissingField { index: 0, field: "project_id" },
            ]
        );
    }

    fn http_path(path: &str) -> ProbeConfig {
        ProbeConfig::Http(HttpProbeConfig {
            name: None,
            host: "localhost".into(),
            port: 8080,
            path: path.into(),
            timeout_ms: 500,
        })
    }

    #[test]
    fn test_http_path_without_leading_slash() {
        let mut config = GateConfig::default();
        config.probes.push(http_path("health"));
        config.probes.push(http_path("/live"));
        assert!(validate_config(&config).is_ok());
    }

    fn postgres(ssl_mode: &str) -> ProbeConfig {
        ProbeConfig::Postgres(PostgresProbeConfig {
            name: None,
            host: "db".into(),
            port: 5432,
            database: "orders".into(),
            user: "app".into(),
            password: String::new(),
            ssl_mode: ssl_mode.into(),
            ssl_root_cert: None,
            timeout_ms: 1_000,
        })
    }

    #[test]
    fn test_ssl_modes() {
        for mode in ["disable", "allow", "prefer", "require", "verify-ca", "verify-full"] {
            let mut config = GateConfig::default();
            config.probes.push(postgres(mode));
            assert!(validate_config(&config).is_ok(), "{mode}");
        }

        let mut config = GateConfig::default();
        config.probes.push(postgres("nil"));
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::SslMode { index: 0, value: "nil".into() }]
        );
    }

    #[test]
    fn test_pubsub_endpoint_must_be_a_url() {
        let mut config = GateConfig::default();
        config.probes.push(ProbeConfig::Pubsub(PubsubProbeConfig {
            name: None,
            project_id: "orders".into(),
            emulator_host: None,
            endpoint: Some("pubsub.internal".into()),
            timeout_ms: 1_000,
        }));
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors.as_slice(), [ValidationError::InvalidUrl { index: 0, .. }]));
    }

    #[test]
    fn test_error_messages_name_the_probe() {
        let err = ValidationError::ZeroPort { index: 3 };
        assert_eq!(err.to_string(), "probes[3]: port must not be 0");
    }
}
