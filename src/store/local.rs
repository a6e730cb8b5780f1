//! File-backed site registry and visit store

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{FrequentVisitorStore, SiteRegistry, VisitStore, newest_first};
use crate::domain::{Category, FrequentVisitor, NewSite, Site, SiteUpdate, VisitRecord};
use crate::error::{Result, VisitrackError};
use crate::storage::{Filter, HasId, JsonlStorage, Storage};

const SITES: &str = "sites";
const VISITS: &str = "visits";
const FREQUENT_VISITORS: &str = "frequent_visitors";

impl HasId for Site {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for VisitRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for FrequentVisitor {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Map low-level persistence failures onto the collaborator error kinds
fn registry_err(e: VisitrackError) -> VisitrackError {
    match e {
        VisitrackError::Storage(_) | VisitrackError::Io(_) | VisitrackError::Json(_) => {
            VisitrackError::RegistryUnavailable(e.to_string())
        }
        other => other,
    }
}

fn store_err(e: VisitrackError) -> VisitrackError {
    match e {
        VisitrackError::Storage(_) | VisitrackError::Io(_) | VisitrackError::Json(_) => {
            VisitrackError::StoreUnavailable(e.to_string())
        }
        other => other,
    }
}

/// JSONL-backed implementation of [`SiteRegistry`], [`VisitStore`] and
/// [`FrequentVisitorStore`]
#[derive(Debug)]
pub struct LocalStore {
    storage: JsonlStorage,
}

impl LocalStore {
    /// Open or create a store under `data_dir`
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let storage = JsonlStorage::new(data_dir)?;
        log::info!("Opened local store at {}", storage.base_path().display());
        Ok(Self { storage })
    }
}

#[async_trait]
impl SiteRegistry for LocalStore {
    async fn list_sites(&self) -> Result<Vec<Site>> {
        let mut sites: Vec<Site> = self.storage.list(SITES).map_err(registry_err)?;
        sites.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sites)
    }

    async fn add_site(&self, site: NewSite) -> Result<Site> {
        let site = site.into_site()?;
        self.storage.create(SITES, &site).map_err(registry_err)?;
        log::info!("Registered site {} ({})", site.name, site.id);
        Ok(site)
    }

    async fn update_site(&self, id: &str, update: SiteUpdate) -> Result<Site> {
        let existing: Site = self
            .storage
            .get(SITES, id)
            .map_err(registry_err)?
            .ok_or_else(|| VisitrackError::SiteNotFound(id.to_string()))?;
        let site = update.apply(&existing)?;
        self.storage.update(SITES, id, &site).map_err(registry_err)?;
        log::info!("Updated site {} ({})", site.name, site.id);
        Ok(site)
    }

    async fn remove_site(&self, id: &str) -> Result<()> {
        let existing: Option<Site> = self.storage.get(SITES, id).map_err(registry_err)?;
        if existing.is_none() {
            return Err(VisitrackError::SiteNotFound(id.to_string()));
        }
        self.storage.delete(SITES, id).map_err(registry_err)
    }
}

#[async_trait]
impl VisitStore for LocalStore {
    async fn list_open_visits(&self, category: Category) -> Result<Vec<VisitRecord>> {
        let mut visits: Vec<VisitRecord> = self
            .storage
            .query(VISITS, &[Filter::eq("category", category), Filter::is_null("checkout_time")])
            .map_err(store_err)?;
        newest_first(&mut visits);
        Ok(visits)
    }

    async fn bulk_close_open_visits(&self, category: Category, close_time: DateTime<Utc>) -> Result<usize> {
        let mut patch = serde_json::Map::new();
        patch.insert("checkout_time".to_string(), serde_json::to_value(close_time)?);

        let closed: Vec<VisitRecord> = self
            .storage
            .update_where(
                VISITS,
                &[Filter::eq("category", category), Filter::is_null("checkout_time")],
                &patch,
            )
            .map_err(store_err)?;
        Ok(closed.len())
    }

    async fn create_visit(&self, visit: &VisitRecord) -> Result<VisitRecord> {
        self.storage.create(VISITS, visit).map_err(store_err)?;
        Ok(visit.clone())
    }

    async fn get_visit(&self, id: &str) -> Result<Option<VisitRecord>> {
        self.storage.get(VISITS, id).map_err(store_err)
    }

    async fn close_visit(&self, id: &str, close_time: DateTime<Utc>) -> Result<VisitRecord> {
        let mut visit: VisitRecord = self
            .storage
            .get(VISITS, id)
            .map_err(store_err)?
            .ok_or_else(|| VisitrackError::VisitNotFound(id.to_string()))?;

        if !visit.is_open() {
            return Err(VisitrackError::AlreadyCheckedOut(id.to_string()));
        }

        visit.checkout_time = Some(close_time);
        self.storage.update(VISITS, id, &visit).map_err(store_err)?;
        Ok(visit)
    }

    async fn list_visits(&self, category: Option<Category>) -> Result<Vec<VisitRecord>> {
        let filters: Vec<Filter> = category.map(|c| Filter::eq("category", c)).into_iter().collect();
        let mut visits: Vec<VisitRecord> = self.storage.query(VISITS, &filters).map_err(store_err)?;
        newest_first(&mut visits);
        Ok(visits)
    }
}

#[async_trait]
impl FrequentVisitorStore for LocalStore {
    async fn list_frequent_visitors(&self) -> Result<Vec<FrequentVisitor>> {
        let mut visitors: Vec<FrequentVisitor> = self.storage.list(FREQUENT_VISITORS).map_err(store_err)?;
        visitors.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(visitors)
    }

    async fn get_frequent_visitor(&self, id: &str) -> Result<Option<FrequentVisitor>> {
        self.storage.get(FREQUENT_VISITORS, id).map_err(store_err)
    }

    async fn add_frequent_visitor(&self, visitor: &FrequentVisitor) -> Result<FrequentVisitor> {
        self.storage.create(FREQUENT_VISITORS, visitor).map_err(store_err)?;
        Ok(visitor.clone())
    }

    async fn remove_frequent_visitor(&self, id: &str) -> Result<()> {
        let existing: Option<FrequentVisitor> = self.storage.get(FREQUENT_VISITORS, id).map_err(store_err)?;
        if existing.is_none() {
            return Err(VisitrackError::FrequentVisitorNotFound(id.to_string()));
        }
        self.storage.delete(FREQUENT_VISITORS, id).map_err(store_err)
    }
}
