//! Hosted table API store
//!
//! Talks to a PostgREST-style endpoint (as exposed by Supabase): tables `locations`,
//! `visitors` and `frequent_visitors` under `{url}/rest/v1/`, authenticated with an `apikey` header plus
//! a bearer token. Filters use PostgREST operators (`eq.`, `is.null`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{FrequentVisitorStore, SiteRegistry, VisitStore};
use crate::domain::{Category, FrequentVisitor, NewSite, Site, SiteUpdate, VisitRecord};
use crate::error::{Result, VisitrackError};

const SITES_TABLE: &str = "locations";
const VISITS_TABLE: &str = "visitors";
const FREQUENT_VISITORS_TABLE: &str = "frequent_visitors";

/// Connection settings for [`RestStore`]
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Remote implementation of [`SiteRegistry`], [`VisitStore`] and [`FrequentVisitorStore`]
pub struct RestStore {
    client: Client,
    config: RestConfig,
}

impl std::fmt::Debug for RestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStore").field("url", &self.config.url).finish()
    }
}

type ErrorKind = fn(String) -> VisitrackError;

/// PostgREST filter pairs selecting open visits of a category
fn open_visit_filters(category: Category) -> Vec<(&'static str, String)> {
    vec![
        ("category", format!("eq.{}", category)),
        ("checkout_time", "is.null".to_string()),
    ]
}

/// Strip the locally generated `id` so the table assigns its own key
fn insert_body(value: Value) -> Value {
    match value {
        Value::Object(mut fields) => {
            fields.remove("id");
            Value::Object(fields)
        }
        other => other,
    }
}

impl RestStore {
    /// Build a client. Fails up front when the URL or key is missing, so a constructed
    /// store is always ready to issue requests.
    pub fn new(config: RestConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(VisitrackError::Config("rest store url is empty".to_string()));
        }
        if config.api_key.trim().is_empty() {
            return Err(VisitrackError::Config("rest store api key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VisitrackError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url.trim_end_matches('/'), table)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    /// Send a request and decode the JSON body, mapping every failure through `kind`
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, kind: ErrorKind) -> Result<T> {
        let response = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| kind(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(kind(format!("API error {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| kind(format!("Failed to parse response: {}", e)))
    }

    async fn site_by_id(&self, id: &str) -> Result<Option<Site>> {
        let request = self
            .client
            .get(self.table_url(SITES_TABLE))
            .query(&[("select", "*".to_string()), ("id", format!("eq.{}", id))]);
        let mut found: Vec<Site> = self.send(request, VisitrackError::RegistryUnavailable).await?;
        Ok(found.pop())
    }

    async fn visits_where(&self, filters: &[(&str, String)]) -> Result<Vec<VisitRecord>> {
        let request = self
            .client
            .get(self.table_url(VISITS_TABLE))
            .query(&[("select", "*"), ("order", "checkin_time.desc")])
            .query(filters);
        self.send(request, VisitrackError::StoreUnavailable).await
    }

    async fn patch_visits(&self, filters: &[(&str, String)], close_time: DateTime<Utc>) -> Result<Vec<VisitRecord>> {
        let request = self
            .client
            .patch(self.table_url(VISITS_TABLE))
            .query(filters)
            .header("Prefer", "return=representation")
            .json(&json!({ "checkout_time": close_time }));
        self.send(request, VisitrackError::StoreUnavailable).await
    }
}

#[async_trait]
impl SiteRegistry for RestStore {
    async fn list_sites(&self) -> Result<Vec<Site>> {
        let request = self
            .client
            .get(self.table_url(SITES_TABLE))
            .query(&[("select", "*"), ("order", "name.asc")]);
        self.send(request, VisitrackError::RegistryUnavailable).await
    }

    async fn add_site(&self, site: NewSite) -> Result<Site> {
        site.validate()?;
        let request = self
            .client
            .post(self.table_url(SITES_TABLE))
            .header("Prefer", "return=representation")
            .json(&[serde_json::to_value(&site)?]);
        let mut created: Vec<Site> = self.send(request, VisitrackError::RegistryUnavailable).await?;
        created
            .pop()
            .ok_or_else(|| VisitrackError::RegistryUnavailable("insert returned no rows".to_string()))
    }

    async fn update_site(&self, id: &str, update: SiteUpdate) -> Result<Site> {
        let existing = self
            .site_by_id(id)
            .await?
            .ok_or_else(|| VisitrackError::SiteNotFound(id.to_string()))?;
        let site = update.apply(&existing)?;

        let request = self
            .client
            .patch(self.table_url(SITES_TABLE))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&insert_body(serde_json::to_value(&site)?));
        let mut updated: Vec<Site> = self.send(request, VisitrackError::RegistryUnavailable).await?;
        updated.pop().ok_or_else(|| VisitrackError::SiteNotFound(id.to_string()))
    }

    async fn remove_site(&self, id: &str) -> Result<()> {
        let request = self
            .client
            .delete(self.table_url(SITES_TABLE))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation");
        let removed: Vec<Value> = self.send(request, VisitrackError::RegistryUnavailable).await?;
        if removed.is_empty() {
            return Err(VisitrackError::SiteNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl VisitStore for RestStore {
    async fn list_open_visits(&self, category: Category) -> Result<Vec<VisitRecord>> {
        self.visits_where(&open_visit_filters(category)).await
    }

    async fn bulk_close_open_visits(&self, category: Category, close_time: DateTime<Utc>) -> Result<usize> {
        let closed = self.patch_visits(&open_visit_filters(category), close_time).await?;
        Ok(closed.len())
    }

    async fn create_visit(&self, visit: &VisitRecord) -> Result<VisitRecord> {
        let body = insert_body(serde_json::to_value(visit)?);
        let request = self
            .client
            .post(self.table_url(VISITS_TABLE))
            .header("Prefer", "return=representation")
            .json(&[body]);
        let mut created: Vec<VisitRecord> = self.send(request, VisitrackError::StoreUnavailable).await?;
        created
            .pop()
            .ok_or_else(|| VisitrackError::StoreUnavailable("insert returned no rows".to_string()))
    }

    async fn get_visit(&self, id: &str) -> Result<Option<VisitRecord>> {
        let mut found = self.visits_where(&[("id", format!("eq.{}", id))]).await?;
        Ok(found.pop())
    }

    async fn close_visit(&self, id: &str, close_time: DateTime<Utc>) -> Result<VisitRecord> {
        let filters = [("id", format!("eq.{}", id)), ("checkout_time", "is.null".to_string())];
        if let Some(closed) = self.patch_visits(&filters, close_time).await?.pop() {
            return Ok(closed);
        }

        // Nothing matched: tell a missing visit apart from an already closed one
        match self.get_visit(id).await? {
            Some(_) => Err(VisitrackError::AlreadyCheckedOut(id.to_string())),
            None => Err(VisitrackError::VisitNotFound(id.to_string())),
        }
    }

    async fn list_visits(&self, category: Option<Category>) -> Result<Vec<VisitRecord>> {
        let filters: Vec<(&str, String)> = category
            .map(|c| ("category", format!("eq.{}", c)))
            .into_iter()
            .collect();
        self.visits_where(&filters).await
    }
}

#[async_trait]
impl FrequentVisitorStore for RestStore {
    async fn list_frequent_visitors(&self) -> Result<Vec<FrequentVisitor>> {
        let request = self
            .client
            .get(self.table_url(FREQUENT_VISITORS_TABLE))
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        self.send(request, VisitrackError::StoreUnavailable).await
    }

    async fn get_frequent_visitor(&self, id: &str) -> Result<Option<FrequentVisitor>> {
        let request = self
            .client
            .get(self.table_url(FREQUENT_VISITORS_TABLE))
            .query(&[("select", "*".to_string()), ("id", format!("eq.{}", id))]);
        let mut found: Vec<FrequentVisitor> = self.send(request, VisitrackError::StoreUnavailable).await?;
        Ok(found.pop())
    }

    async fn add_frequent_visitor(&self, visitor: &FrequentVisitor) -> Result<FrequentVisitor> {
        let body = insert_body(serde_json::to_value(visitor)?);
        let request = self
            .client
            .post(self.table_url(FREQUENT_VISITORS_TABLE))
            .header("Prefer", "return=representation")
            .json(&[body]);
        let mut created: Vec<FrequentVisitor> = self.send(request, VisitrackError::StoreUnavailable).await?;
        created
            .pop()
            .ok_or_else(|| VisitrackError::StoreUnavailable("insert returned no rows".to_string()))
    }

    async fn remove_frequent_visitor(&self, id: &str) -> Result<()> {
        let request = self
            .client
            .delete(self.table_url(FREQUENT_VISITORS_TABLE))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation");
        let removed: Vec<Value> = self.send(request, VisitrackError::StoreUnavailable).await?;
        if removed.is_empty() {
            return Err(VisitrackError::FrequentVisitorNotFound(id.to_string()));
        }
        Ok(())
    }
}
