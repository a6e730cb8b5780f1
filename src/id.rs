//! ID generation utilities for visitrack
//!
//! Provides identifiers for sites and visits.

use uuid::Uuid;

/// Generate a unique visit ID
///
/// Format: `visit-{uuid_v7}`. UUIDv7 is time-ordered, so IDs sort by creation.
pub fn generate_visit_id() -> String {
    format!("visit-{}", Uuid::now_v7().simple())
}

/// Generate a unique site ID
///
/// Format: `site-{uuid_v7}`
pub fn generate_site_id() -> String {
    format!("site-{}", Uuid::now_v7().simple())
}

/// Generate a unique frequent visitor ID
pub fn generate_frequent_visitor_id() -> String {
    format!("frequent-{}", Uuid::now_v7().simple())
}
