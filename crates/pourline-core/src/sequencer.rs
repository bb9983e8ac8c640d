//! Per-order dispensing state machine.
//!
//! ```text
//! Received
//!     │
//!     ▼
//! StatusUpdating(dispensing)      best-effort PATCH
//!     │
//!     ▼
//! PerItem { index, pin } …        lookup → pulse, strictly in item order
//!     │                     ╲
//!     ▼                      ╲ any item error
//! StatusUpdating(completed)   StatusUpdating(failed)
//!     │                      ╱
//!     ▼                     ╱
//! Finished
//! ```
//!
//! Status reports never abort or roll back actuation; a failed PATCH is
//! logged and listed in [`DispenseReport::unreported`].

use std::sync::Arc;
use std::time::Duration;

use crate::actuator::Actuator;
use crate::api::OrderApi;
use crate::config::DispenseConfig;
use crate::error::BridgeError;
use crate::types::{Order, OrderId, OrderStatus};

// ---------------------------------------------------------------------------
// DispensePhase / DispenseOutcome / DispenseReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum DispensePhase {
    Received,
    StatusUpdating(OrderStatus),
    PerItem { index: usize, pin: u32 },
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispenseOutcome {
    Completed,
    /// `item` is the index of the line item that failed, `None` for faults
    /// outside item processing.
    Failed { item: Option<usize>, reason: String },
}

impl DispenseOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn final_status(&self) -> OrderStatus {
        match self {
            Self::Completed => OrderStatus::Completed,
            Self::Failed { .. } => OrderStatus::Failed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispenseReport {
    pub order_id: OrderId,
    pub outcome: DispenseOutcome,
    /// Items whose pulse ran to completion. Never reversed on failure.
    pub items_poured: usize,
    pub poured_for: Duration,
    /// Status transitions the API did not acknowledge.
    pub unreported: Vec<OrderStatus>,
    pub phases: Vec<DispensePhase>,
}

struct ItemFailure {
    index: usize,
    error: BridgeError,
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

pub struct Sequencer {
    api: Arc<dyn OrderApi>,
    actuator: Arc<dyn Actuator>,
    dispense: DispenseConfig,
}

impl Sequencer {
    pub fn new(
        api: Arc<dyn OrderApi>,
        actuator: Arc<dyn Actuator>,
        dispense: DispenseConfig,
    ) -> Self {
        Self {
            api,
            actuator,
            dispense,
        }
    }

    /// Drive one order to a terminal outcome. Never fails: every fault is
    /// folded into the returned report.
    pub async fn process(&self, order: &Order) -> DispenseReport {
        let mut report = DispenseReport {
            order_id: order.id.clone(),
            outcome: DispenseOutcome::Completed,
            items_poured: 0,
            poured_for: Duration::ZERO,
            unreported: Vec::new(),
            phases: Vec::new(),
        };
        let mut status = order.status.clone();

        enter(&mut report, DispensePhase::Received);
        tracing::info!(
            order_id = %order.id,
            order_number = order.order_number.as_deref().unwrap_or("-"),
            items = order.items.len(),
            "processing order"
        );

        self.report_status(&mut report, &mut status, OrderStatus::Dispensing)
            .await;

        report.outcome = match self.pour_items(order, &mut report).await {
            Ok(()) => DispenseOutcome::Completed,
            Err(ItemFailure { index, error }) => {
                tracing::error!(
                    order_id = %order.id,
                    item = index,
                    error = %error,
                    "item failed, skipping remaining items"
                );
                DispenseOutcome::Failed {
                    item: Some(index),
                    reason: error.to_string(),
                }
            }
        };

        let terminal = report.outcome.final_status();
        self.report_status(&mut report, &mut status, terminal).await;
        enter(&mut report, DispensePhase::Finished);

        if report.outcome.is_completed() {
            tracing::info!(order_id = %order.id, poured = report.items_poured, "order completed");
        } else {
            tracing::warn!(order_id = %order.id, poured = report.items_poured, "order failed");
        }
        report
    }

    /// Best-effort `failed` report for an order whose processing task died
    /// before producing a report.
    pub async fn report_fault(&self, order_id: &OrderId, reason: &str) {
        tracing::error!(order_id = %order_id, %reason, "order processing fault");
        if let Err(e) = self
            .api
            .set_order_status(order_id, &OrderStatus::Failed)
            .await
        {
            tracing::warn!(order_id = %order_id, error = %e, "failed to record order as failed");
        }
    }

    async fn pour_items(
        &self,
        order: &Order,
        report: &mut DispenseReport,
    ) -> std::result::Result<(), ItemFailure> {
        for (index, item) in order.items.iter().enumerate() {
            let fail = |error| ItemFailure { index, error };

            let beverage = self.api.get_beverage(&item.beverage_id).await.map_err(fail)?;
            let pin = beverage
                .valve_pin
                .ok_or_else(|| fail(BridgeError::NoValve(beverage.id.to_string())))?;

            if item.quantity <= 0 {
                tracing::warn!(
                    order_id = %order.id,
                    item = index,
                    quantity = item.quantity,
                    "non-positive quantity, pulsing for zero seconds"
                );
            }
            let duration = self.dispense.duration_for(item.quantity);
            if duration > self.dispense.max_pour() {
                return Err(fail(BridgeError::PourTooLong {
                    quantity: item.quantity,
                    limit_secs: self.dispense.max_pour_secs,
                }));
            }

            enter(report, DispensePhase::PerItem { index, pin });
            tracing::info!(
                order_id = %order.id,
                beverage = %beverage.name,
                pin,
                duration_secs = duration.as_secs_f64(),
                "dispensing"
            );
            self.actuator.pulse(pin, duration).await.map_err(fail)?;

            report.items_poured += 1;
            report.poured_for += duration;
        }
        Ok(())
    }

    async fn report_status(
        &self,
        report: &mut DispenseReport,
        current: &mut OrderStatus,
        next: OrderStatus,
    ) {
        let next = match current.transition_to(next) {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!(order_id = %report.order_id, error = %e, "not reporting status");
                return;
            }
        };

        enter(report, DispensePhase::StatusUpdating(next.clone()));
        if let Err(e) = self.api.set_order_status(&report.order_id, &next).await {
            tracing::warn!(
                order_id = %report.order_id,
                status = %next,
                error = %e,
                "status update not recorded, continuing"
            );
            report.unreported.push(next.clone());
        }
        // Local view follows the physical state even when the PATCH was lost.
        *current = next;
    }
}

fn enter(report: &mut DispenseReport, phase: DispensePhase) {
    tracing::debug!(order_id = %report.order_id, phase = ?phase, "dispense phase");
    report.phases.push(phase);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
