//! Wire-level order and beverage records.
//!
//! These mirror the JSON served by the kiosk API. The bridge only ever holds
//! a transient copy of an [`Order`]; the remote side stays authoritative for
//! its status.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{BridgeError, Result};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Opaque identifier. The API emits serial integers for orders and text for
/// beverages; both decode into the same string-backed token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D>(d: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(d)? {
            Raw::Int(n) => Self(n.to_string()),
            Raw::Text(s) => Self(s),
        })
    }
}

pub type OrderId = Token;
pub type BeverageId = Token;

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// Remote order status.
///
/// Transitions driven by the bridge: `Confirmed → Dispensing → Completed | Failed`.
/// Anything the server emits outside this vocabulary decodes as `Other` and is
/// never dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Dispensing,
    Completed,
    Failed,
    Other(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Dispensing => "dispensing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Other(s) => s,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "pending" => Self::Pending,
            "confirmed" => Self::Confirmed,
            "dispensing" => Self::Dispensing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Forward-only transitions the bridge is allowed to report.
    pub fn can_transition_to(&self, next: &OrderStatus) -> bool {
        matches!(
            (self, next),
            (Self::Confirmed, Self::Dispensing)
                | (Self::Confirmed, Self::Failed)
                | (Self::Dispensing, Self::Completed)
                | (Self::Dispensing, Self::Failed)
        )
    }

    pub fn transition_to(&self, next: OrderStatus) -> Result<OrderStatus> {
        if self.can_transition_to(&next) {
            Ok(next)
        } else {
            Err(BridgeError::InvalidTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OrderStatus {
    fn serialize<S>(&self, s: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D>(d: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(d)?;
        Ok(Self::parse(&raw))
    }
}

// ---------------------------------------------------------------------------
// Order / OrderItem / Beverage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub beverage_id: BeverageId,
    /// Dispensing units. Older kiosk builds omit it, meaning one unit.
    #[serde(default = "default_quantity", deserialize_with = "whole_number")]
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn default_quantity() -> i64 {
    1
}

/// Integer, or a float with no fractional part (`2.0`).
fn whole_number<'de, D>(d: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
    }

    match Raw::deserialize(d)? {
        Raw::Int(n) => Ok(n),
        Raw::Float(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Ok(f as i64)
        }
        Raw::Float(f) => Err(serde::de::Error::custom(format!(
            "quantity {f} is not a whole number"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
}

impl Order {
    pub fn is_confirmed(&self) -> bool {
        self.status == OrderStatus::Confirmed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beverage {
    pub id: BeverageId,
    #[serde(default)]
    pub name: String,
    /// Valve channel feeding this beverage. `None` means it cannot be poured.
    #[serde(default)]
    pub valve_pin: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_with_numeric_id_decodes() {
        let json = r#"{
            "id": 42,
            "orderNumber": "LX3K9QZ",
            "items": [{"beverageId": "bev1", "quantity": 2, "name": "Lager"}],
            "status": "confirmed",
            "totalAmount": "4.50"
        }"#;
        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.id.as_str(), "42");
        assert_eq!(order.order_number.as_deref(), Some("LX3K9QZ"));
        assert_eq!(order.items[0].beverage_id.as_str(), "bev1");
        assert_eq!(order.items[0].quantity, 2);
        assert!(order.is_confirmed());
    }

    #[test]
    fn missing_quantity_defaults_to_one() {
        let json = r#"{"id": "A1", "items": [{"beverageId": "bev1"}], "status": "confirmed"}"#;
        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.items[0].quantity, 1);
    }

    #[test]
    fn integral_float_quantity_is_accepted() {
        let json = r#"{"id": 1, "items": [{"beverageId": "bev1", "quantity": 2.0}], "status": "completed"}"#;
        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.items[0].quantity, 2);

        let json = r#"{"id": 1, "items": [{"beverageId": "bev1", "quantity": 1.5}], "status": "confirmed"}"#;
        let err = serde_json::from_str::<Order>(json).unwrap_err();
        assert!(err.to_string().contains("not a whole number"));
    }

    #[test]
    fn unknown_status_is_preserved() {
        let order: Order =
            serde_json::from_str(r#"{"id": "A1", "status": "refunded"}"#).unwrap();
        assert_eq!(order.status, OrderStatus::Other("refunded".into()));
        assert!(!order.is_confirmed());
        assert!(order.items.is_empty());
    }

    #[test]
    fn beverage_without_valve_pin() {
        let bev: Beverage = serde_json::from_str(r#"{"id": "bev2", "name": "Cola"}"#).unwrap();
        assert_eq!(bev.valve_pin, None);
        let bev: Beverage =
            serde_json::from_str(r#"{"id": "bev1", "name": "Lager", "valvePin": null}"#).unwrap();
        assert_eq!(bev.valve_pin, None);
    }

    #[test]
    fn status_serializes_as_lowercase_string() {
        let body = serde_json::json!({ "status": OrderStatus::Dispensing });
        assert_eq!(body.to_string(), r#"{"status":"dispensing"}"#);
    }

    #[test]
    fn forward_transitions_only() {
        use OrderStatus::*;
        assert!(Confirmed.can_transition_to(&Dispensing));
        assert!(Dispensing.can_transition_to(&Completed));
        assert!(Dispensing.can_transition_to(&Failed));
        assert!(!Completed.can_transition_to(&Dispensing));
        assert!(!Failed.can_transition_to(&Confirmed));
        assert!(!Dispensing.can_transition_to(&Confirmed));

        let err = Completed.transition_to(Dispensing).unwrap_err();
        assert!(err.to_string().contains("completed"));
    }
}
