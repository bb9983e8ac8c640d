pub mod actuator;
pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod sequencer;
pub mod types;

#[cfg(test)]
pub(crate) mod fakes;

pub use actuator::{select_backend, Actuator};
pub use api::OrderApi;
pub use config::BridgeConfig;
pub use dispatch::{DispatchStats, Dispatcher, DispensingLock};
pub use error::{BridgeError, Result};
pub use lifecycle::Bridge;
pub use sequencer::{DispenseOutcome, DispenseReport, Sequencer};
pub use types::{Beverage, Order, OrderItem, OrderStatus};
