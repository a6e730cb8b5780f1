//! Daemon core - the daily auto-checkout scheduler and its tick gate
//!
//! The daemon is the long-running process that:
//! - Ticks on a fixed interval
//! - Closes open visits of the target category once per day at the cutoff
//! - Broadcasts a checkout event after each successful run

pub mod scheduler;
pub mod tick;

pub use scheduler::*;
pub use tick::*;
