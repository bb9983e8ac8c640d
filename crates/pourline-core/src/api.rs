//! The remote order API as seen by the bridge.
//!
//! Implementations carry their own bounded timeout and never retry; retrying
//! is the dispatcher's job, one poll cycle later.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Beverage, BeverageId, Order, OrderId, OrderStatus};

#[async_trait]
pub trait OrderApi: Send + Sync {
    /// `GET /admin/orders?status=confirmed`, in the order the API returns them.
    ///
    /// Fails with `Network` on timeout or connection failure and `Protocol` on
    /// a non-2xx status or a malformed body.
    async fn list_confirmed_orders(&self) -> Result<Vec<Order>>;

    /// `GET /beverages/{id}`. A missing beverage is `NotFound`.
    async fn get_beverage(&self, id: &BeverageId) -> Result<Beverage>;

    /// `PATCH /admin/orders/{id}` with `{"status": ...}`.
    async fn set_order_status(&self, id: &OrderId, status: &OrderStatus) -> Result<()>;

    /// `GET /beverages`, used once at startup. Returns the number of
    /// beverages listed.
    async fn probe(&self) -> Result<usize>;
}
