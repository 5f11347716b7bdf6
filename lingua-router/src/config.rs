//! # Configuration
//!
//! Two concerns live here:
//!
//! - [`RouterConfig`] — tunables of the router itself (health-check
//!   cadence, dispatch timeout, cache TTL, scoring weights). Loadable
//!   from TOML with human-readable durations.
//! - [`ConfigStore`] — the persistent lookup of per-tenant provider
//!   credentials, consulted once at router init. Real deployments back
//!   this with their own store; [`StaticConfigStore`] covers tests and
//!   single-tenant setups.
//!
//! ## Configuration file example
//!
//! ```toml
//! health_check_interval = "60s"
//! adapter_call_timeout = "30s"
//! cache_ttl = "1h"
//! unhealthy_error_threshold = 5
//! cost_ceiling_per_char = 0.00005
//!
//! [balanced_weights]
//! quality = 0.4
//! speed = 0.3
//! cost = 0.3
//! ```

use crate::common::duration_serde;
use crate::error::{ConfigStoreError, RouterError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Weights of the `balanced` scoring mode. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalancedWeights {
    /// Weight of the provider's quality score.
    pub quality: f64,
    /// Weight of the provider's load headroom.
    pub speed: f64,
    /// Weight of the provider's cost advantage.
    pub cost: f64,
}

impl Default for BalancedWeights {
    fn default() -> Self {
        Self {
            quality: 0.4,
            speed: 0.3,
            cost: 0.3,
        }
    }
}

/// Router tunables. Every field has the documented default, so a plain
/// `RouterConfig::default()` is a working production configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Cadence of the background health reconciler.
    #[serde(with = "duration_serde")]
    pub health_check_interval: Duration,
    /// Budget for a single provider probe inside one monitor tick.
    #[serde(with = "duration_serde")]
    pub health_check_timeout: Duration,
    /// Budget for one adapter `translate` attempt.
    #[serde(with = "duration_serde")]
    pub adapter_call_timeout: Duration,
    /// TTL of memoized responses.
    #[serde(with = "duration_serde")]
    pub cache_ttl: Duration,
    /// TTL of the per-provider metrics records.
    #[serde(with = "duration_serde")]
    pub metrics_ttl: Duration,
    /// Consecutive dispatch failures before a provider is demoted.
    pub unhealthy_error_threshold: u32,
    /// Normalization ceiling for per-character cost in balanced scoring.
    pub cost_ceiling_per_char: f64,
    pub balanced_weights: BalancedWeights,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(60),
            health_check_timeout: Duration::from_secs(10),
            adapter_call_timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(3600),
            metrics_ttl: Duration::from_secs(3600),
            unhealthy_error_threshold: 5,
            cost_ceiling_per_char: 5e-5,
            balanced_weights: BalancedWeights::default(),
        }
    }
}

impl RouterConfig {
    /// Load from a TOML file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RouterError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RouterError::Configuration {
                message: format!("failed to read {}: {e}", path.as_ref().display()),
            }
        })?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| RouterError::Configuration {
                message: format!("failed to parse {}: {e}", path.as_ref().display()),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RouterError> {
        if self.unhealthy_error_threshold == 0 {
            return Err(RouterError::Configuration {
                message: "unhealthy_error_threshold must be at least 1".to_string(),
            });
        }
        if self.cost_ceiling_per_char <= 0.0 {
            return Err(RouterError::Configuration {
                message: "cost_ceiling_per_char must be positive".to_string(),
            });
        }
        if self.adapter_call_timeout.is_zero() || self.health_check_interval.is_zero() {
            return Err(RouterError::Configuration {
                message: "timeouts and intervals must be non-zero".to_string(),
            });
        }
        let w = &self.balanced_weights;
        let sum = w.quality + w.speed + w.cost;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(RouterError::Configuration {
                message: format!("balanced_weights must sum to 1, got {sum}"),
            });
        }
        if w.quality < 0.0 || w.speed < 0.0 || w.cost < 0.0 {
            return Err(RouterError::Configuration {
                message: "balanced_weights must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

/// One provider credential row for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredential {
    pub provider_id: String,
    /// Opaque credential blob; its shape is the adapter's business.
    pub credential: String,
    /// Inactive rows are ignored at init.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Persistent lookup of per-tenant enabled providers and credentials.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// All credential rows for `tenant_id`, active or not. The registry
    /// filters on `active` itself.
    async fn provider_credentials(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<ProviderCredential>, ConfigStoreError>;
}

/// In-memory config store, loadable from TOML.
///
/// ```toml
/// [[tenants.acme.providers]]
/// provider_id = "deepl"
/// credential = "dpl-key"
///
/// [[tenants.acme.providers]]
/// provider_id = "claude"
/// credential = "sk-ant-key"
/// active = false
/// ```
#[derive(Debug, Default, Clone)]
pub struct StaticConfigStore {
    tenants: HashMap<String, Vec<ProviderCredential>>,
}

#[derive(Debug, Deserialize)]
struct StaticStoreFile {
    tenants: HashMap<String, TenantSection>,
}

#[derive(Debug, Deserialize)]
struct TenantSection {
    providers: Vec<ProviderCredential>,
}

impl StaticConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(
        mut self,
        tenant_id: impl Into<String>,
        providers: Vec<ProviderCredential>,
    ) -> Self {
        self.tenants.insert(tenant_id.into(), providers);
        self
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RouterError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RouterError::Configuration {
                message: format!("failed to read {}: {e}", path.as_ref().display()),
            }
        })?;
        let file: StaticStoreFile =
            toml::from_str(&raw).map_err(|e| RouterError::Configuration {
                message: format!("failed to parse {}: {e}", path.as_ref().display()),
            })?;
        Ok(Self {
            tenants: file
                .tenants
                .into_iter()
                .map(|(id, section)| (id, section.providers))
                .collect(),
        })
    }
}

#[async_trait]
impl ConfigStore for StaticConfigStore {
    async fn provider_credentials(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<ProviderCredential>, ConfigStoreError> {
        Ok(self.tenants.get(tenant_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RouterConfig::default();
        config.validate().unwrap();
        assert_eq!(config.health_check_interval, Duration::from_secs(60));
        assert_eq!(config.adapter_call_timeout, Duration::from_secs(30));
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.unhealthy_error_threshold, 5);
        assert_eq!(config.cost_ceiling_per_char, 5e-5);
    }

    #[test]
    fn unbalanced_weights_rejected() {
        let config = RouterConfig {
            balanced_weights: BalancedWeights {
                quality: 0.5,
                speed: 0.3,
                cost: 0.3,
            },
            ..RouterConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_threshold_rejected() {
        let config = RouterConfig {
            unhealthy_error_threshold: 0,
            ..RouterConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_parses_from_toml_with_defaults() {
        let config: RouterConfig = toml::from_str(
            r#"
            health_check_interval = "30s"
            unhealthy_error_threshold = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.health_check_interval, Duration::from_secs(30));
        assert_eq!(config.unhealthy_error_threshold, 3);
        // Unspecified fields fall back to defaults.
        assert_eq!(config.adapter_call_timeout, Duration::from_secs(30));
        assert_eq!(config.balanced_weights, BalancedWeights::default());
    }

    #[tokio::test]
    async fn static_store_returns_tenant_rows() {
        let store = StaticConfigStore::new().with_tenant(
            "acme",
            vec![
                ProviderCredential {
                    provider_id: "deepl".to_string(),
                    credential: "dpl-key".to_string(),
                    active: true,
                },
                ProviderCredential {
                    provider_id: "claude".to_string(),
                    credential: "sk-ant".to_string(),
                    active: false,
                },
            ],
        );
        let rows = store.provider_credentials("acme").await.unwrap();
        assert_eq!(rows.len(), 2);
        let rows = store.provider_credentials("other").await.unwrap();
        assert!(rows.is_empty());
    }
}
