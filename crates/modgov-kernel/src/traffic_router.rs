use std::sync::Arc;

use rand::Rng;

use crate::instance::Instance;
use crate::instance_pool::InstancePool;

/// A module's canary split, if one is configured (spec §4.7).
#[derive(Debug, Clone)]
pub struct CanaryConfig {
    /// `[0, 100)`: the percentage of requests routed to the canary version.
    pub percent: u8,
    pub canary_version: String,
}

/// Picks one instance for a request out of a module's pool (spec §4.7).
/// Stateless — the canary split, if any, is supplied by the caller
/// (`ModuleManager` tracks it per module).
pub struct TrafficRouter;

impl TrafficRouter {
    /// Returns `None` if no eligible instance exists; the caller must fail
    /// with UNAVAILABLE.
    pub async fn route(pool: &InstancePool, canary: Option<&CanaryConfig>) -> Option<Arc<Instance>> {
        if let Some(cfg) = canary {
            let draw: u8 = rand::rng().random_range(0..100);
            if draw < cfg.percent {
                let active = pool.active_snapshot().await;
                if let Some(inst) = active.iter().find(|i| i.version == cfg.canary_version) {
                    return Some(inst.clone());
                }
            }
        }
        pool.default().await
    }
}
