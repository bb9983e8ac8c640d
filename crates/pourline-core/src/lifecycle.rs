//! Start-up, run and shutdown of a bridge session.

use std::sync::Arc;

use tokio::sync::watch;

use crate::actuator::Actuator;
use crate::api::OrderApi;
use crate::config::BridgeConfig;
use crate::dispatch::{DispatchStats, Dispatcher};
use crate::error::Result;
use crate::sequencer::Sequencer;

pub struct Bridge {
    config: BridgeConfig,
    api: Arc<dyn OrderApi>,
    actuator: Arc<dyn Actuator>,
}

/// Calls `Actuator::shutdown` when dropped, whichever way the session ends.
struct ShutdownGuard(Arc<dyn Actuator>);

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

impl Bridge {
    pub fn new(config: BridgeConfig, api: Arc<dyn OrderApi>, actuator: Arc<dyn Actuator>) -> Self {
        Self {
            config,
            api,
            actuator,
        }
    }

    /// Configure all channels closed, then probe the API once.
    pub async fn start(&self) -> Result<()> {
        self.actuator.initialize()?;
        tracing::info!(backend = self.actuator.backend_name(), "actuator channels initialized");

        tracing::info!(api = %self.config.api.base_url, "connecting to API");
        let beverages = self.api.probe().await?;
        tracing::info!(beverages, "API connection successful");
        Ok(())
    }

    pub fn stop(&self) {
        self.actuator.shutdown();
    }

    /// Start, poll until `shutdown`, and release the actuator on every exit
    /// path. A failed start returns the error without entering the loop.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<DispatchStats> {
        let _guard = ShutdownGuard(Arc::clone(&self.actuator));

        if let Err(e) = self.start().await {
            tracing::error!(error = %e, "API connection failed");
            return Err(e);
        }

        let sequencer = Arc::new(Sequencer::new(
            Arc::clone(&self.api),
            Arc::clone(&self.actuator),
            self.config.dispense.clone(),
        ));
        let mut dispatcher =
            Dispatcher::new(Arc::clone(&self.api), sequencer, self.config.polling.clone());
        dispatcher.run(shutdown).await;

        let stats = dispatcher.into_stats();
        tracing::info!(
            started_at = %stats.started_at,
            polls = stats.polls,
            poll_errors = stats.poll_errors,
            completed = stats.orders_completed,
            failed = stats.orders_failed,
            "shutting down"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{ChannelMap, SimulatedActuator, ValveState};
    use crate::config::HardwareConfig;
    use crate::error::BridgeError;
    use crate::fakes::{order, FakeApi};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts shutdown calls on top of the simulated backend.
    struct Counting {
        inner: SimulatedActuator,
        shutdowns: AtomicUsize,
    }

    impl Actuator for Counting {
        fn backend_name(&self) -> &'static str {
            "counting"
        }
        fn initialize(&self) -> Result<()> {
            self.inner.initialize()
        }
        fn set_state(&self, pin: u32, open: bool) -> Result<()> {
            self.inner.set_state(pin, open)
        }
        fn state(&self, pin: u32) -> Option<ValveState> {
            self.inner.state(pin)
        }
        fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            self.inner.shutdown()
        }
    }

    fn counting() -> Arc<Counting> {
        Arc::new(Counting {
            inner: SimulatedActuator::new(ChannelMap::from_config(&HardwareConfig::default())),
            shutdowns: AtomicUsize::new(0),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_api_fails_fast_and_still_shuts_down() {
        let api = Arc::new(FakeApi::new());
        api.fail_probe(BridgeError::Network("connection refused".into()));
        let actuator = counting();
        let bridge = Bridge::new(BridgeConfig::default(), api.clone(), actuator.clone());

        let (_tx, rx) = watch::channel(false);
        let err = bridge.run(rx).await.unwrap_err();
        assert!(matches!(err, BridgeError::Network(_)));
        assert!(api.list_calls().is_empty());
        assert_eq!(actuator.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_processes_orders_and_shuts_down_on_signal() {
        let api = Arc::new(
            FakeApi::new()
                .with_beverage("bev1", Some(18))
                .with_order(order("A1", &[("bev1", 2)])),
        );
        let actuator = counting();
        let bridge = Bridge::new(BridgeConfig::default(), api.clone(), actuator.clone());

        let (tx, rx) = watch::channel(false);
        let session = tokio::spawn(bridge.run(rx));
        tokio::time::sleep(Duration::from_secs(11)).await;
        tx.send(true).unwrap();

        let stats = session.await.unwrap().unwrap();
        assert_eq!(stats.orders_completed, 1);
        assert_eq!(actuator.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(actuator.state(18), Some(ValveState::Closed));
    }

    #[tokio::test]
    async fn start_initializes_channels_closed() {
        let api = Arc::new(FakeApi::new().with_beverage("bev1", Some(18)));
        let actuator = counting();
        actuator.inner.set_state(19, true).unwrap();
        let bridge = Bridge::new(BridgeConfig::default(), api, actuator.clone());
        bridge.start().await.unwrap();
        assert!(actuator.inner.open_valves().is_empty());
        bridge.stop();
        assert_eq!(actuator.shutdowns.load(Ordering::SeqCst), 1);
    }
}
