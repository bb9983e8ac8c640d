//! In-memory order API used by the sequencer, dispatcher and lifecycle tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

use crate::api::OrderApi;
use crate::error::{BridgeError, Result};
use crate::types::{Beverage, BeverageId, Order, OrderId, OrderItem, OrderStatus, Token};

#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub order_id: String,
    pub status: OrderStatus,
    pub at: Instant,
}

#[derive(Default)]
struct Inner {
    orders: Vec<Order>,
    beverages: HashMap<String, Beverage>,
    list_failures: VecDeque<BridgeError>,
    probe_failure: Option<BridgeError>,
    fail_patches: bool,
    panic_on_lookup: Option<String>,
    list_calls: Vec<Instant>,
    patches: Vec<Patch>,
}

/// Tiny stand-in for the kiosk server: patches update the stored order, and
/// listing returns whatever is still `confirmed`.
#[derive(Default)]
pub struct FakeApi {
    inner: Mutex<Inner>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_beverage(self, id: &str, valve_pin: Option<u32>) -> Self {
        self.inner.lock().unwrap().beverages.insert(
            id.to_string(),
            Beverage {
                id: Token::from(id),
                name: format!("{id} name"),
                valve_pin,
            },
        );
        self
    }

    pub fn with_order(self, order: Order) -> Self {
        self.inner.lock().unwrap().orders.push(order);
        self
    }

    pub fn fail_next_lists(&self, errors: Vec<BridgeError>) {
        self.inner.lock().unwrap().list_failures.extend(errors);
    }

    pub fn fail_probe(&self, error: BridgeError) {
        self.inner.lock().unwrap().probe_failure = Some(error);
    }

    pub fn fail_patches(&self) {
        self.inner.lock().unwrap().fail_patches = true;
    }

    pub fn panic_on_lookup(&self, beverage_id: &str) {
        self.inner.lock().unwrap().panic_on_lookup = Some(beverage_id.to_string());
    }

    pub fn patches(&self) -> Vec<Patch> {
        self.inner.lock().unwrap().patches.clone()
    }

    pub fn patches_for(&self, order_id: &str) -> Vec<OrderStatus> {
        self.patches()
            .into_iter()
            .filter(|p| p.order_id == order_id)
            .map(|p| p.status)
            .collect()
    }

    pub fn list_calls(&self) -> Vec<Instant> {
        self.inner.lock().unwrap().list_calls.clone()
    }

    pub fn status_of(&self, order_id: &str) -> Option<OrderStatus> {
        self.inner
            .lock()
            .unwrap()
            .orders
            .iter()
            .find(|o| o.id.as_str() == order_id)
            .map(|o| o.status.clone())
    }
}

#[async_trait]
impl OrderApi for FakeApi {
    async fn list_confirmed_orders(&self) -> Result<Vec<Order>> {
        let mut inner = self.inner.lock().unwrap();
        inner.list_calls.push(Instant::now());
        if let Some(err) = inner.list_failures.pop_front() {
            return Err(err);
        }
        Ok(inner
            .orders
            .iter()
            .filter(|o| o.is_confirmed())
            .cloned()
            .collect())
    }

    async fn get_beverage(&self, id: &BeverageId) -> Result<Beverage> {
        let inner = self.inner.lock().unwrap();
        if inner.panic_on_lookup.as_deref() == Some(id.as_str()) {
            drop(inner);
            panic!("lookup exploded for {id}");
        }
        inner
            .beverages
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(format!("beverage {id}")))
    }

    async fn set_order_status(&self, id: &OrderId, status: &OrderStatus) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.patches.push(Patch {
            order_id: id.to_string(),
            status: status.clone(),
            at: Instant::now(),
        });
        if inner.fail_patches {
            return Err(BridgeError::Network("connection reset".into()));
        }
        if let Some(order) = inner.orders.iter_mut().find(|o| &o.id == id) {
            order.status = status.clone();
        }
        Ok(())
    }

    async fn probe(&self) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.probe_failure.take() {
            return Err(err);
        }
        Ok(inner.beverages.len())
    }
}

pub fn order(id: &str, items: &[(&str, i64)]) -> Order {
    Order {
        id: Token::from(id),
        order_number: None,
        items: items
            .iter()
            .map(|(bev, quantity)| OrderItem {
                beverage_id: Token::from(*bev),
                quantity: *quantity,
                name: None,
            })
            .collect(),
        status: OrderStatus::Confirmed,
    }
}
