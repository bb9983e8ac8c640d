use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use tokio::time::Instant;

use super::{Actuator, ChannelMap, ValveState};
use crate::error::{BridgeError, Result};

/// A recorded valve command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValveEvent {
    pub pin: u32,
    pub state: ValveState,
    pub at: Instant,
}

/// Backend with no physical I/O. Pulses still sleep for their full
/// duration, and every command lands in an in-memory journal.
#[derive(Debug)]
pub struct SimulatedActuator {
    channels: ChannelMap,
    states: Mutex<HashMap<u32, ValveState>>,
    journal: Mutex<Vec<ValveEvent>>,
    faulty: Mutex<HashSet<u32>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimulatedActuator {
    pub fn new(channels: ChannelMap) -> Self {
        Self {
            channels,
            states: Mutex::new(HashMap::new()),
            journal: Mutex::new(Vec::new()),
            faulty: Mutex::new(HashSet::new()),
        }
    }

    /// Make every later command on `pin` fail, as a stuck relay would.
    pub fn inject_fault(&self, pin: u32) {
        lock(&self.faulty).insert(pin);
    }

    pub fn events(&self) -> Vec<ValveEvent> {
        lock(&self.journal).clone()
    }

    pub fn open_valves(&self) -> Vec<u32> {
        let mut open: Vec<u32> = lock(&self.states)
            .iter()
            .filter(|(_, s)| **s == ValveState::Open)
            .map(|(pin, _)| *pin)
            .collect();
        open.sort_unstable();
        open
    }
}

impl Actuator for SimulatedActuator {
    fn backend_name(&self) -> &'static str {
        "simulation"
    }

    fn initialize(&self) -> Result<()> {
        let mut states = lock(&self.states);
        for (name, pin) in &self.channels.valves {
            states.insert(*pin, ValveState::Closed);
            tracing::info!(channel = %name, pin, "SIMULATION: configured valve");
        }
        for (name, pin) in &self.channels.flow_sensors {
            tracing::debug!(channel = %name, pin, "SIMULATION: configured flow sensor");
        }
        Ok(())
    }

    fn set_state(&self, pin: u32, open: bool) -> Result<()> {
        let name = self.channels.require_valve(pin)?;
        if lock(&self.faulty).contains(&pin) {
            return Err(BridgeError::ActuationFault {
                pin,
                reason: "simulated relay fault".to_string(),
            });
        }

        let state = ValveState::from_open(open);
        lock(&self.states).insert(pin, state);
        lock(&self.journal).push(ValveEvent {
            pin,
            state,
            at: Instant::now(),
        });
        tracing::info!(channel = %name, pin, state = state.as_str(), "SIMULATION: valve");
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
        let mut states = lock(&self.states);
        for (pin, state) in states.iter_mut() {
            if *state == ValveState::Open {
                tracing::warn!(pin = *pin, "SIMULATION: closing valve left open at shutdown");
                *state = ValveState::Closed;
            }
        }
        tracing::info!("SIMULATION: actuator shut down");
    }
}
