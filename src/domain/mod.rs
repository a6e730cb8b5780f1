//! Domain types for visitrack
//!
//! This module contains all core domain types:
//! - Site / Category: registered geofenced locations and their business category
//! - GpsFix: a position reading from a GPS provider
//! - VisitRecord / NewVisit: visitor check-in records
//! - FrequentVisitor: saved details that prefill check-in
//! - CheckoutEvent: emitted when an auto or batch checkout closes visits

pub mod event;
pub mod gps;
pub mod site;
pub mod visit;
pub mod visitor;

pub use event::{CheckoutEvent, CheckoutTrigger};
pub use gps::{AccuracyLevel, GpsFix};
pub use site::{Category, NewSite, ResolvedLocation, Site, SiteRef, SiteUpdate};
pub use visit::{NewVisit, Purpose, VisitRecord, VisitStats};
pub use visitor::{FrequentVisitor, NewFrequentVisitor};

/// Deserialize an opaque identifier that a remote store may send as a number or a string.
pub(crate) fn de_opaque_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id: {}", other))),
    }
}
