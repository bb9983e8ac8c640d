use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;

use pourline_core::config::ApiConfig;
use pourline_core::types::{BeverageId, OrderId};
use pourline_core::{Beverage, BridgeError, Order, OrderApi, OrderStatus, Result};

use crate::error::{classify, unexpected_status};

#[derive(Debug, Clone)]
pub struct HttpOrderApi {
    http: reqwest::Client,
    base: Url,
}

impl HttpOrderApi {
    pub fn new(cfg: &ApiConfig) -> Result<Self> {
        let base = Url::parse(cfg.base_url.trim())
            .map_err(|e| BridgeError::Config(format!("api.base_url '{}': {e}", cfg.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(BridgeError::Config(format!(
                "api.base_url '{}' cannot carry a path",
                cfg.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .user_agent(concat!("pourline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::Config(format!("building HTTP client: {e}")))?;

        Ok(Self { http, base })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| BridgeError::Config(format!("{} cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn read_json<T: DeserializeOwned>(context: &str, resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        return Err(unexpected_status(context, status));
    }
    let body = resp.bytes().await.map_err(|e| classify(context, e))?;
    serde_json::from_slice(&body)
        .map_err(|e| BridgeError::Protocol(format!("{context}: malformed body: {e}")))
}

/// Decode list entries one at a time. The server may return historical rows
/// of every status, and one undecodable row must not hide the others.
fn decode_orders(rows: Vec<serde_json::Value>) -> Vec<Order> {
    rows.into_iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let id = row.get("id").map(|v| v.to_string());
            match serde_json::from_value::<Order>(row) {
                Ok(order) => Some(order),
                Err(e) => {
                    tracing::warn!(index, id = ?id, error = %e, "skipping undecodable order");
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl OrderApi for HttpOrderApi {
    async fn list_confirmed_orders(&self) -> Result<Vec<Order>> {
        let context = "GET /admin/orders";
        let url = self.endpoint(&["admin", "orders"])?;
        let resp = self
            .http
            .get(url)
            .query(&[("status", "confirmed")])
            .send()
            .await
            .map_err(|e| classify(context, e))?;
        let rows: Vec<serde_json::Value> = read_json(context, resp).await?;
        let orders = decode_orders(rows);
        tracing::debug!(count = orders.len(), "fetched confirmed orders");
        Ok(orders)
    }

    async fn get_beverage(&self, id: &BeverageId) -> Result<Beverage> {
        let context = format!("GET /beverages/{id}");
        let url = self.endpoint(&["beverages", id.as_str()])?;
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| classify(&context, e))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(BridgeError::NotFound(format!("beverage {id}")));
        }
        read_json(&context, resp).await
    }

    async fn set_order_status(&self, id: &OrderId, status: &OrderStatus) -> Result<()> {
        let context = format!("PATCH /admin/orders/{id}");
        let url = self.endpoint(&["admin", "orders", id.as_str()])?;
        let resp = self
            .http
            .patch(url)
            .json(&serde_json::json!({ "status": status }))
            .send()
            .await
            .map_err(|e| classify(&context, e))?;
        if !resp.status().is_success() {
            return Err(unexpected_status(&context, resp.status()));
        }
        tracing::debug!(order_id = %id, %status, "order status recorded");
        Ok(())
    }

    async fn probe(&self) -> Result<usize> {
        let context = "GET /beverages";
        let url = self.endpoint(&["beverages"])?;
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| classify(context, e))?;
        let beverages: Vec<serde_json::Value> = read_json(context, resp).await?;
        Ok(beverages.len())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
