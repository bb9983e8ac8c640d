//! Linux sysfs GPIO backend (`/sys/class/gpio`).
//!
//! Valves are exported as outputs driven low at initialization; flow sensors
//! are exported as inputs. Pins this backend exported are unexported again at
//! shutdown.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{Actuator, ChannelMap, ValveState};
use crate::error::{BridgeError, Result};

#[derive(Debug)]
pub struct GpioActuator {
    root: PathBuf,
    channels: ChannelMap,
    states: Mutex<HashMap<u32, ValveState>>,
    exported: Mutex<BTreeSet<u32>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl GpioActuator {
    /// Probe for the sysfs interface under `root`.
    pub fn open(root: &Path, channels: ChannelMap) -> Result<Self> {
        if !root.join("export").exists() {
            return Err(BridgeError::HardwareUnavailable(format!(
                "{} has no export interface",
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
            channels,
            states: Mutex::new(HashMap::new()),
            exported: Mutex::new(BTreeSet::new()),
        })
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    fn export(&self, pin: u32) -> Result<()> {
        if self.pin_dir(pin).exists() {
            return Ok(());
        }
        std::fs::write(self.root.join("export"), pin.to_string())
            .map_err(|e| fault(pin, "export", e))?;
        if !self.pin_dir(pin).exists() {
            return Err(BridgeError::ActuationFault {
                pin,
                reason: "export did not create the pin directory".to_string(),
            });
        }
        lock(&self.exported).insert(pin);
        Ok(())
    }

    fn write_attr(&self, pin: u32, attr: &str, value: &str) -> Result<()> {
        std::fs::write(self.pin_dir(pin).join(attr), value).map_err(|e| fault(pin, attr, e))
    }
}

fn fault(pin: u32, attr: &str, e: std::io::Error) -> BridgeError {
    BridgeError::ActuationFault {
        pin,
        reason: format!("writing {attr}: {e}"),
    }
}

impl Actuator for GpioActuator {
    fn backend_name(&self) -> &'static str {
        "gpio"
    }

    fn initialize(&self) -> Result<()> {
        for (name, pin) in &self.channels.valves {
            self.export(*pin)?;
            // "low" sets the direction and drives the line low in one write.
            self.write_attr(*pin, "direction", "low")?;
            lock(&self.states).insert(*pin, ValveState::Closed);
            tracing::info!(channel = %name, pin, "configured valve output");
        }
        for (name, pin) in &self.channels.flow_sensors {
            self.export(*pin)?;
            self.write_attr(*pin, "direction", "in")?;
            tracing::info!(channel = %name, pin, "configured flow sensor input");
        }
        Ok(())
    }

    fn set_state(&self, pin: u32, open: bool) -> Result<()> {
        let name = self.channels.require_valve(pin)?;
        self.write_attr(pin, "value", if open { "1" } else { "0" })?;
        let state = ValveState::from_open(open);
        lock(&self.states).insert(pin, state);
        tracing::info!(channel = %name, pin, state = state.as_str(), "valve");
        Ok(())
    }

    fn state(&self, pin: u32) -> Option<ValveState> {
        self.channels.valve_name(pin)?;
        Some(
            lock(&self.states)
                .get(&pin)
                .copied()
                .unwrap_or(ValveState::Closed),
        )
    }

    fn shutdown(&self) {
        for pin in self.channels.valve_pins() {
            if !self.pin_dir(pin).exists() {
                continue;
            }
            if let Err(e) = self.write_attr(pin, "value", "0") {
                tracing::warn!(pin, error = %e, "failed to drive valve low at shutdown");
            }
            lock(&self.states).insert(pin, ValveState::Closed);
        }

        let exported = std::mem::take(&mut *lock(&self.exported));
        for pin in exported {
            if let Err(e) = std::fs::write(self.root.join("unexport"), pin.to_string()) {
                tracing::warn!(pin, error = %e, "failed to unexport pin");
            }
        }
        tracing::info!("gpio actuator shut down");
    }
}
