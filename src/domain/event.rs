//! Checkout events
//!
//! Emitted after a bulk close succeeds so listeners (CLI, notifications) can report it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::site::Category;

/// What started a bulk checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutTrigger {
    /// Daily cutoff reached
    Scheduled,
    /// Operator asked for an immediate run
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutEvent {
    pub trigger: CheckoutTrigger,
    pub category: Category,
    /// Number of visits closed
    pub count: usize,
    pub executed_at: DateTime<Utc>,
}

impl CheckoutEvent {
    pub fn summary(&self) -> String {
        format!(
            "{} {} visitors checked out at {}",
            self.count,
            self.category,
            self.executed_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}
