//! Reader pool and load balancer.
//!
//! Grounded in the wrapper-selection logic scattered through `monitor.py`
//! (one wrapper acquired per controller, utilization logged before/after
//! each cycle) generalized into an explicit strategy per spec §3/§8.

use crate::bacnet::wrapper::{ReaderWrapper, SharedWrapper};
use crate::config::BacnetReaderConfig;
use crate::error::ReaderError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalancerStrategy {
    RoundRobin,
    LeastBusy,
    FirstAvailable,
}

pub struct ReaderPool {
    wrappers: RwLock<Vec<SharedWrapper>>,
    strategy: RwLock<BalancerStrategy>,
    round_robin_cursor: AtomicUsize,
}

impl ReaderPool {
    pub fn new(strategy: BalancerStrategy) -> Self {
        Self {
            wrappers: RwLock::new(Vec::new()),
            strategy: RwLock::new(strategy),
            round_robin_cursor: AtomicUsize::new(0),
        }
    }

    /// Builds wrappers for every active reader. Re-invoking with the same
    /// `readers` produces a pool with the same set of wrapper ids (spec §8);
    /// this is satisfied because `instance_id()` is a pure function of the
    /// reader config and we always rebuild from scratch rather than mutate.
    pub async fn initialize(&self, readers: &[BacnetReaderConfig]) -> Result<(), ReaderError> {
        let active = crate::config::active_readers(readers).map_err(|e| match e {
            crate::error::ConfigError::DuplicateReaderEndpoint { ip, port } => {
                ReaderError::DuplicateEndpoint {
                    id: String::new(),
                    ip,
                    port,
                }
            }
            other => ReaderError::Transport(other.to_string()),
        })?;

        let mut new_wrappers = Vec::with_capacity(active.len());
        for reader in active {
            new_wrappers.push(Arc::new(ReaderWrapper::new(reader)));
        }

        let mut guard = self.wrappers.write().await;
        *guard = new_wrappers;
        self.round_robin_cursor.store(0, Ordering::SeqCst);
        Ok(())
    }

    pub async fn set_strategy(&self, strategy: BalancerStrategy) {
        *self.strategy.write().await = strategy;
    }

    pub async fn get_all(&self) -> Vec<SharedWrapper> {
        self.wrappers.read().await.clone()
    }

    /// Selects one wrapper for an operation per the active balancing
    /// strategy. Returns `NoWrapperAvailable` if the pool is empty.
    pub async fn get_for_operation(&self) -> Result<SharedWrapper, ReaderError> {
        let wrappers = self.wrappers.read().await;
        if wrappers.is_empty() {
            return Err(ReaderError::NoWrapperAvailable);
        }

        let strategy = *self.strategy.read().await;
        let chosen = match strategy {
            BalancerStrategy::FirstAvailable => wrappers
                .iter()
                .find(|w| !w.is_busy())
                .cloned()
                .unwrap_or_else(|| wrappers[0].clone()),
            BalancerStrategy::LeastBusy => wrappers
                .iter()
                .min_by_key(|w| w.active_operations_count())
                .cloned()
                .expect("non-empty"),
            BalancerStrategy::RoundRobin => {
                let idx = self.round_robin_cursor.fetch_add(1, Ordering::SeqCst) % wrappers.len();
                wrappers[idx].clone()
            }
        };
        Ok(chosen)
    }

    /// One wrapper per controller id, selected once and reused for the
    /// whole monitoring cycle (mirrors `monitor_all_devices` acquiring a
    /// single wrapper per controller rather than per point).
    pub async fn get_for_controller(&self, _controller_id: &str) -> Result<SharedWrapper, ReaderError> {
        self.get_for_operation().await
    }

    pub async fn utilization(&self) -> Vec<(String, u32)> {
        let wrappers = self.wrappers.read().await;
        wrappers
            .iter()
            .map(|w| (w.instance_id(), w.active_operations_count()))
            .collect()
    }

    pub async fn log_utilization(&self, label: &str) {
        for (id, count) in self.utilization().await {
            info!(wrapper = %id, active_operations = count, "{label}");
        }
    }

    /// Disconnects every wrapper. Used on shutdown and by the periodic
    /// cleanup tick for wrappers that have gone stale.
    pub async fn cleanup(&self) {
        let wrappers = self.wrappers.read().await;
        for w in wrappers.iter() {
            w.disconnect().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(id: &str, port: u16) -> BacnetReaderConfig {
        BacnetReaderConfig {
            id: id.to_string(),
            ip_address: "127.0.0.1".parse().unwrap(),
            subnet_mask: 24,
            bacnet_device_id: 1,
            port,
            bbmd_enabled: false,
            bbmd_server_ip: None,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn empty_pool_returns_no_wrapper_available() {
        let pool = ReaderPool::new(BalancerStrategy::RoundRobin);
        let err = pool.get_for_operation().await.unwrap_err();
        assert!(matches!(err, ReaderError::NoWrapperAvailable));
    }

    #[tokio::test]
    async fn round_robin_cycles_through_wrappers() {
        let pool = ReaderPool::new(BalancerStrategy::RoundRobin);
        let readers = vec![reader("a", 1), reader("b", 2)];
        pool.initialize(&readers).await.unwrap();

        let first = pool.get_for_operation().await.unwrap();
        let second = pool.get_for_operation().await.unwrap();
        let third = pool.get_for_operation().await.unwrap();
        assert_ne!(first.instance_id(), second.instance_id());
        assert_eq!(first.instance_id(), third.instance_id());
    }

    #[tokio::test]
    async fn reinitializing_with_same_readers_yields_same_wrapper_ids() {
        let pool = ReaderPool::new(BalancerStrategy::RoundRobin);
        let readers = vec![reader("a", 1), reader("b", 2)];
        pool.initialize(&readers).await.unwrap();
        let first_ids: Vec<_> = pool.get_all().await.iter().map(|w| w.instance_id()).collect();

        pool.initialize(&readers).await.unwrap();
        let second_ids: Vec<_> = pool.get_all().await.iter().map(|w| w.instance_id()).collect();

        assert_eq!(first_ids, second_ids);
    }
}
