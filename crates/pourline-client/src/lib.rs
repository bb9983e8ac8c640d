//! HTTP implementation of [`pourline_core::OrderApi`].
//!
//! Talks to the kiosk server's JSON API:
//!
//! ```text
//! GET   {base}/admin/orders?status=confirmed   → [Order]
//! PATCH {base}/admin/orders/{id}  {"status"}   → ack
//! GET   {base}/beverages/{id}                  → Beverage
//! GET   {base}/beverages                       → [Beverage]   (startup probe)
//! ```
//!
//! Every request carries the configured timeout and is attempted exactly
//! once.

mod client;
mod error;

pub use client::HttpOrderApi;
