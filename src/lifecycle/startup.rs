//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn a validated configuration into a ready-to-run manager
//! - Register configured probes in file order
//! - Gate the caller until dependencies are healthy, then release probes
//!
//! # Design Decisions
//! - Fail fast: an invalid manager configuration is fatal
//! - Probes are always released, whether the wait succeeded or not

use crate::config::GateConfig;
use crate::manager::{HealthManager, HealthResult};
use crate::probe;

/// Build a manager with every configured probe registered.
pub async fn build_manager(config: &GateConfig) -> HealthResult<HealthManager> {
    let manager = HealthManager::from_config(&config.manager)?;
    for probe_config in &config.probes {
        manager.register(probe::from_config(probe_config)).await?;
    }
    tracing::info!(probes = config.probes.len(), "Health manager initialized");
    Ok(manager)
}

/// Block until every configured dependency is reachable or the deadline passes.
pub async fn wait_for_dependencies(config: &GateConfig) -> HealthResult<()> {
    let manager = build_manager(config).await?;
    let result = manager.run().await;
    manager.cleanup().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TcpProbeConfig;
    use crate::config::ProbeConfig;
    use crate::manager::HealthError;

    #[tokio::test]
    async fn test_build_registers_in_order() {
        let mut config = GateConfig::default();
        for name in ["cache", "queue"] {
            config.probes.push(ProbeConfig::Tcp(TcpProbeConfig {
                name: Some(name.into()),
                host: "127.0.0.1".into(),
                port: 1,
                timeout_ms: 100,
            }));
        }
        let manager = build_manager(&config).await.unwrap();
        assert_eq!(manager.kinds().await, vec!["cache", "queue"]);
    }

    #[tokio::test]
    async fn test_invalid_manager_config_is_fatal() {
        let mut config = GateConfig::default();
        config.manager.deadline_ms = 0;
        let err = build_manager(&config).await.unwrap_err();
        assert!(matches!(err, HealthError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_wait_without_probes() {
        wait_for_dependencies(&GateConfig::default()).await.unwrap();
    }
}
