//! Poll loop and single-order dispatch.
//!
//! One [`Dispatcher`] drives the [`Sequencer`]. Each tick fetches the
//! confirmed orders, takes the first eligible one, and runs it to its
//! terminal outcome while the [`DispensingLock`] is held. Later orders from
//! the same fetch stay `confirmed` and are re-offered on the next tick.
//!
//! Waits between ticks are two-tier: [`PollingConfig::interval`] after a
//! successful fetch, [`PollingConfig::error_backoff`] after a failed one.
//! Shutdown is only observed while waiting, so an order in progress (and its
//! valve pulse) always runs to completion first.

pub mod lock;
pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::api::OrderApi;
use crate::config::PollingConfig;
use crate::sequencer::{DispenseReport, Sequencer};
use crate::types::{Order, OrderId};

pub use lock::{DispenseGuard, DispensingLock};
pub use stats::DispatchStats;

/// What one poll iteration did.
#[derive(Debug)]
pub enum Tick {
    /// Fetch succeeded with nothing eligible.
    Idle,
    /// An order ran to completion or failure.
    Dispatched(DispenseReport),
    /// The processing task for this order crashed; it was reported failed.
    Faulted { order_id: OrderId, reason: String },
    /// A dispense was already in progress.
    Busy,
    FetchFailed,
}

pub struct Dispatcher {
    api: Arc<dyn OrderApi>,
    sequencer: Arc<Sequencer>,
    lock: DispensingLock,
    polling: PollingConfig,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(api: Arc<dyn OrderApi>, sequencer: Arc<Sequencer>, polling: PollingConfig) -> Self {
        Self {
            api,
            sequencer,
            lock: DispensingLock::new(),
            polling,
            stats: DispatchStats::new(),
        }
    }

    /// Handle on the dispensing gate, for observers.
    pub fn lock(&self) -> DispensingLock {
        self.lock.clone()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn into_stats(self) -> DispatchStats {
        self.stats
    }

    /// How long to wait after `tick` before polling again.
    pub fn wait_after(&self, tick: &Tick) -> Duration {
        match tick {
            Tick::FetchFailed => self.polling.error_backoff(),
            _ => self.polling.interval(),
        }
    }

    /// One poll iteration.
    pub async fn tick(&mut self) -> Tick {
        self.stats.polls += 1;

        let orders = match self.api.list_confirmed_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                self.stats.poll_errors += 1;
                tracing::error!(
                    error = %e,
                    transient = e.is_transient(),
                    backoff_secs = self.polling.error_backoff().as_secs_f64(),
                    "API polling error"
                );
                return Tick::FetchFailed;
            }
        };

        let Some(order) = first_eligible(orders) else {
            return Tick::Idle;
        };

        let Some(guard) = self.lock.try_acquire() else {
            tracing::debug!(order_id = %order.id, "dispense in progress, deferring order");
            return Tick::Busy;
        };

        let tick = self.dispatch(order).await;
        drop(guard);

        match &tick {
            Tick::Dispatched(report) => self.stats.record_order(report.outcome.is_completed()),
            Tick::Faulted { .. } => self.stats.record_order(false),
            _ => {}
        }
        tick
    }

    /// Run the sequencer for `order` in its own task so a panic inside it is
    /// contained to this order.
    async fn dispatch(&self, order: Order) -> Tick {
        let order_id = order.id.clone();
        let sequencer = Arc::clone(&self.sequencer);
        let task = tokio::spawn(async move { sequencer.process(&order).await });

        match task.await {
            Ok(report) => Tick::Dispatched(report),
            Err(e) => {
                let reason = if e.is_panic() {
                    "order processing panicked".to_string()
                } else {
                    format!("order processing task ended: {e}")
                };
                self.sequencer.report_fault(&order_id, &reason).await;
                Tick::Faulted { order_id, reason }
            }
        }
    }

    /// Poll until `shutdown` flips to `true` (or its sender is dropped).
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.polling.interval().as_secs_f64(),
            backoff_secs = self.polling.error_backoff().as_secs_f64(),
            "polling for confirmed orders"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let tick = self.tick().await;
            let wait = self.wait_after(&tick);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("poll loop stopped");
    }
}

fn first_eligible(orders: Vec<Order>) -> Option<Order> {
    let mut orders = orders.into_iter();
    let first = orders.find(|o| {
        if !o.is_confirmed() {
            tracing::debug!(order_id = %o.id, status = %o.status, "skipping ineligible order");
        }
        o.is_confirmed()
    })?;
    let deferred = orders.filter(|o| o.is_confirmed()).count();
    if deferred > 0 {
        tracing::info!(order_id = %first.id, deferred, "dispatching first order, rest wait for the next poll");
    }
    Some(first)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
