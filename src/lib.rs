//! Visitrack - visitor check-in tracking for dormitory and factory sites
//!
//! Detects the active site from a GPS fix against registered geofences, records
//! visitor check-ins and check-outs, and closes every open visit of a category once
//! a day at a configured cutoff.

pub mod clock;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod geo;
pub mod gps;
pub mod id;
pub mod location;
pub mod storage;
pub mod store;
pub mod visits;

pub use error::{Result, VisitrackError};
