//! Collaborator stores
//!
//! The core logic talks to external capabilities through these traits:
//! - SiteRegistry: the registered geofenced sites
//! - VisitStore: visit records with set-based bulk checkout
//! - FrequentVisitorStore: saved visitor details for check-in prefill
//! - PreferenceStore: small key/value preferences (saved location, toggles)
//!
//! `LocalStore` backs the first three with JSONL files, `RestStore` with a hosted
//! PostgREST-style table API.

pub mod local;
pub mod preferences;
pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Category, FrequentVisitor, NewSite, Site, SiteUpdate, VisitRecord};
use crate::error::Result;

pub use local::LocalStore;
pub use preferences::{FilePreferences, MemoryPreferences};
pub use rest::{RestConfig, RestStore};

/// Read access (plus simple administration) for registered sites
#[async_trait]
pub trait SiteRegistry: Send + Sync {
    /// All sites, sorted by name. Failures surface as `RegistryUnavailable`.
    async fn list_sites(&self) -> Result<Vec<Site>>;

    /// Validate and register a new site
    async fn add_site(&self, site: NewSite) -> Result<Site>;

    /// Edit a site in place. Fails with `SiteNotFound` for an unknown ID.
    async fn update_site(&self, id: &str, update: SiteUpdate) -> Result<Site>;

    /// Remove a site by ID
    async fn remove_site(&self, id: &str) -> Result<()>;
}

/// Visit record store
#[async_trait]
pub trait VisitStore: Send + Sync {
    /// Open visits of a category, newest check-in first
    async fn list_open_visits(&self, category: Category) -> Result<Vec<VisitRecord>>;

    /// Set `checkout_time = close_time` on every open visit of `category`.
    ///
    /// A single set-based update: records that are already closed are never touched,
    /// so repeating the call is harmless. Returns the number of visits closed.
    async fn bulk_close_open_visits(&self, category: Category, close_time: DateTime<Utc>) -> Result<usize>;

    /// Persist a new visit record
    async fn create_visit(&self, visit: &VisitRecord) -> Result<VisitRecord>;

    async fn get_visit(&self, id: &str) -> Result<Option<VisitRecord>>;

    /// Close one open visit. Fails with `VisitNotFound` or `AlreadyCheckedOut`.
    async fn close_visit(&self, id: &str, close_time: DateTime<Utc>) -> Result<VisitRecord>;

    /// All visits, open and closed, optionally restricted to one category
    async fn list_visits(&self, category: Option<Category>) -> Result<Vec<VisitRecord>>;
}

/// Saved frequent visitors
#[async_trait]
pub trait FrequentVisitorStore: Send + Sync {
    /// Most recently added first
    async fn list_frequent_visitors(&self) -> Result<Vec<FrequentVisitor>>;

    async fn get_frequent_visitor(&self, id: &str) -> Result<Option<FrequentVisitor>>;

    async fn add_frequent_visitor(&self, visitor: &FrequentVisitor) -> Result<FrequentVisitor>;

    /// Fails with `FrequentVisitorNotFound` for an unknown ID
    async fn remove_frequent_visitor(&self, id: &str) -> Result<()>;
}

/// Small string key/value preference storage
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// Sort visits newest check-in first
pub(crate) fn newest_first(visits: &mut [VisitRecord]) {
    visits.sort_by(|a, b| b.checkin_time.cmp(&a.checkin_time));
}
