use chrono::{DateTime, Utc};

/// Running totals for one bridge session, logged at shutdown.
#[derive(Debug, Clone)]
pub struct DispatchStats {
    pub started_at: DateTime<Utc>,
    pub polls: u64,
    pub poll_errors: u64,
    pub orders_completed: u64,
    pub orders_failed: u64,
    pub last_order_at: Option<DateTime<Utc>>,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            polls: 0,
            poll_errors: 0,
            orders_completed: 0,
            orders_failed: 0,
            last_order_at: None,
        }
    }

    pub fn record_order(&mut self, completed: bool) {
        if completed {
            self.orders_completed += 1;
        } else {
            self.orders_failed += 1;
        }
        self.last_order_at = Some(Utc::now());
    }

    pub fn orders_dispatched(&self) -> u64 {
        self.orders_completed + self.orders_failed
    }
}

impl Default for DispatchStats {
    fn default() -> Self {
        Self::new()
    }
}
