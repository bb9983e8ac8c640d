//! Valve actuation.
//!
//! [`Actuator`] is the only surface the sequencer talks to. Two backends sit
//! behind it: [`GpioActuator`] drives the Linux sysfs GPIO tree, and
//! [`SimulatedActuator`] performs the same timing with no physical I/O. The
//! backend is chosen once by [`select_backend`] and never branched on again.

pub mod gpio;
pub mod simulated;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{BackendKind, HardwareConfig};
use crate::error::{BridgeError, Result};

pub use gpio::GpioActuator;
pub use simulated::{SimulatedActuator, ValveEvent};

// ---------------------------------------------------------------------------
// ValveState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValveState {
    Open,
    Closed,
}

impl ValveState {
    pub fn from_open(open: bool) -> Self {
        if open {
            Self::Open
        } else {
            Self::Closed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelMap
// ---------------------------------------------------------------------------

/// Named valve outputs and flow-sensor inputs known to a backend.
#[derive(Debug, Clone, Default)]
pub struct ChannelMap {
    pub valves: BTreeMap<String, u32>,
    pub flow_sensors: BTreeMap<String, u32>,
}

impl ChannelMap {
    pub fn from_config(cfg: &HardwareConfig) -> Self {
        Self {
            valves: cfg.valves.clone(),
            flow_sensors: cfg.flow_sensors.clone(),
        }
    }

    pub fn valve_name(&self, pin: u32) -> Option<&str> {
        self.valves
            .iter()
            .find(|(_, p)| **p == pin)
            .map(|(name, _)| name.as_str())
    }

    pub fn require_valve(&self, pin: u32) -> Result<&str> {
        self.valve_name(pin).ok_or(BridgeError::UnknownChannel(pin))
    }

    pub fn valve_pins(&self) -> impl Iterator<Item = u32> + '_ {
        self.valves.values().copied()
    }
}

// ---------------------------------------------------------------------------
// Actuator
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Actuator: Send + Sync {
    /// Short label for logs: `"gpio"` or `"simulation"`.
    fn backend_name(&self) -> &'static str;

    /// Put every known channel into its safe default (valves closed).
    /// Idempotent.
    fn initialize(&self) -> Result<()>;

    /// Command a valve open or closed immediately.
    fn set_state(&self, pin: u32, open: bool) -> Result<()>;

    /// Last commanded state of a valve, `None` for unknown pins.
    fn state(&self, pin: u32) -> Option<ValveState>;

    /// Release hardware resources. Safe to call even when `initialize`
    /// never completed, and more than once.
    fn shutdown(&self);

    /// Open `pin`, hold it for `duration`, then close it.
    ///
    /// Once the valve has opened the close is always attempted, including
    /// when the future is dropped mid-pulse.
    async fn pulse(&self, pin: u32, duration: Duration) -> Result<()> {
        self.set_state(pin, true)?;
        let mut guard = CloseOnDrop {
            actuator: self,
            pin,
            armed: true,
        };
        tracing::info!(
            pin,
            duration_secs = duration.as_secs_f64(),
            backend = self.backend_name(),
            "valve pulse started"
        );

        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }

        guard.armed = false;
        self.set_state(pin, false)?;
        tracing::info!(pin, duration_secs = duration.as_secs_f64(), "valve pulse finished");
        Ok(())
    }
}

struct CloseOnDrop<'a, A: Actuator + ?Sized> {
    actuator: &'a A,
    pin: u32,
    armed: bool,
}

impl<A: Actuator + ?Sized> Drop for CloseOnDrop<'_, A> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(pin = self.pin, "pulse interrupted, forcing valve closed");
            if let Err(e) = self.actuator.set_state(self.pin, false) {
                tracing::error!(pin = self.pin, error = %e, "failed to close interrupted valve");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// Build the actuator named by `cfg.backend`.
///
/// `Auto` probes for the sysfs GPIO interface and falls back to simulation
/// with a warning when it is missing. An explicit `Gpio` request fails
/// instead of falling back.
pub fn select_backend(cfg: &HardwareConfig) -> Result<Arc<dyn Actuator>> {
    let channels = ChannelMap::from_config(cfg);
    match cfg.backend {
        BackendKind::Simulation => {
            tracing::info!("hardware backend: simulation (requested)");
            Ok(Arc::new(SimulatedActuator::new(channels)))
        }
        BackendKind::Gpio => {
            let gpio = GpioActuator::open(&cfg.gpio_root, channels)?;
            tracing::info!(root = %cfg.gpio_root.display(), "hardware backend: gpio");
            Ok(Arc::new(gpio))
        }
        BackendKind::Auto => match GpioActuator::open(&cfg.gpio_root, channels.clone()) {
            Ok(gpio) => {
                tracing::info!(root = %cfg.gpio_root.display(), "hardware backend: gpio");
                Ok(Arc::new(gpio))
            }
            Err(BridgeError::HardwareUnavailable(reason)) => {
                tracing::warn!(%reason, "GPIO not available - running in simulation mode");
                Ok(Arc::new(SimulatedActuator::new(channels)))
            }
            Err(e) => Err(e),
        },
    }
}
