//! Visit operations
//!
//! Check-in, single and batch check-out, open-visit listings and the filtered visit
//! log. Batch check-out goes through the same set-based bulk close the
//! auto-checkout scheduler uses.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::clock::Clock;
use crate::domain::{Category, NewVisit, Purpose, SiteRef, VisitRecord, VisitStats};
use crate::error::{Result, VisitrackError};
use crate::store::VisitStore;

/// Ordering of visit log results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogSort {
    /// Latest check-in first
    #[default]
    Newest,
    Oldest,
    /// Visitor name, A to Z
    Name,
    /// Location name, A to Z
    Location,
}

impl FromStr for LogSort {
    type Err = VisitrackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Ok(LogSort::Newest),
            "oldest" => Ok(LogSort::Oldest),
            "name" => Ok(LogSort::Name),
            "location" => Ok(LogSort::Location),
            other => Err(VisitrackError::InvalidInput(format!("unknown sort: {}", other))),
        }
    }
}

/// Visit log filters; `None` means "any"
#[derive(Debug, Clone, Default)]
pub struct VisitLogQuery {
    pub category: Option<Category>,
    /// Case-insensitive substring of first or last name
    pub visitor: Option<String>,
    /// Case-insensitive substring of the location name
    pub location: Option<String>,
    pub purpose: Option<Purpose>,
    /// First check-in day included
    pub start_date: Option<NaiveDate>,
    /// Last check-in day included, through 23:59:59.999
    pub end_date: Option<NaiveDate>,
    pub sort: LogSort,
}

/// Bounds of a query as instants, with dates taken in `offset`
fn date_bounds(query: &VisitLogQuery, offset: FixedOffset) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let local = |date: NaiveDate, time: NaiveTime| {
        offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|t| t.with_timezone(&Utc))
    };
    let start = query.start_date.and_then(|d| local(d, NaiveTime::MIN));
    let end = query
        .end_date
        .and_then(|d| NaiveTime::from_hms_milli_opt(23, 59, 59, 999).and_then(|t| local(d, t)));
    (start, end)
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl VisitLogQuery {
    fn matches(&self, visit: &VisitRecord, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> bool {
        if self.category.is_some_and(|c| c != visit.category) {
            return false;
        }
        if self.purpose.is_some_and(|p| p != visit.purpose) {
            return false;
        }
        if let Some(needle) = self.visitor.as_deref().filter(|n| !n.trim().is_empty()) {
            let needle = needle.trim();
            if !contains_ci(&visit.first_name, needle) && !contains_ci(&visit.last_name, needle) {
                return false;
            }
        }
        if let Some(needle) = self.location.as_deref().filter(|n| !n.trim().is_empty()) {
            let name = visit.location_name.as_deref().unwrap_or("");
            if !contains_ci(name, needle.trim()) {
                return false;
            }
        }
        if start.is_some_and(|s| visit.checkin_time < s) || end.is_some_and(|e| visit.checkin_time > e) {
            return false;
        }
        true
    }

    fn compare(&self, a: &VisitRecord, b: &VisitRecord) -> Ordering {
        match self.sort {
            LogSort::Newest => b.checkin_time.cmp(&a.checkin_time),
            LogSort::Oldest => a.checkin_time.cmp(&b.checkin_time),
            LogSort::Name => a
                .first_name
                .to_lowercase()
                .cmp(&b.first_name.to_lowercase())
                .then_with(|| a.last_name.to_lowercase().cmp(&b.last_name.to_lowercase())),
            LogSort::Location => a
                .location_name
                .as_deref()
                .unwrap_or("")
                .to_lowercase()
                .cmp(&b.location_name.as_deref().unwrap_or("").to_lowercase()),
        }
    }
}

/// Visit operations over a [`VisitStore`]
pub struct VisitService<S: VisitStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: VisitStore + ?Sized> VisitService<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Record a new open visit at `location`
    pub async fn check_in(&self, visit: NewVisit, location: &SiteRef) -> Result<VisitRecord> {
        let record = visit.into_record(location, self.clock.now_utc())?;
        let created = self.store.create_visit(&record).await?;
        log::info!(
            "Checked in {} at {} ({})",
            created.full_name(),
            location,
            created.id
        );
        Ok(created)
    }

    /// Close one open visit now
    pub async fn check_out(&self, id: &str) -> Result<VisitRecord> {
        let closed = self.store.close_visit(id, self.clock.now_utc()).await?;
        log::info!("Checked out {} ({})", closed.full_name(), closed.id);
        Ok(closed)
    }

    /// Close every open visit of `category` now; returns how many were closed
    pub async fn check_out_all(&self, category: Category) -> Result<usize> {
        let count = self
            .store
            .bulk_close_open_visits(category, self.clock.now_utc())
            .await?;
        tracing::info!(category = %category, count, "Batch check-out");
        Ok(count)
    }

    /// Open visits of `category`, newest first
    pub async fn open_visits(&self, category: Category) -> Result<Vec<VisitRecord>> {
        self.store.list_open_visits(category).await
    }

    /// Open-visit counts per category
    pub async fn stats(&self) -> Result<VisitStats> {
        let mut open = Vec::new();
        for category in Category::ALL {
            open.extend(self.store.list_open_visits(category).await?);
        }
        Ok(VisitStats::from_open_visits(&open))
    }

    /// All visits matching `query`, in the requested order
    pub async fn visit_log(&self, query: &VisitLogQuery) -> Result<Vec<VisitRecord>> {
        if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
            if start > end {
                return Err(VisitrackError::InvalidInput(format!(
                    "start date {} is after end date {}",
                    start, end
                )));
            }
        }

        let (start, end) = date_bounds(query, *self.clock.now().offset());
        let mut visits: Vec<VisitRecord> = self
            .store
            .list_visits(query.category)
            .await?
            .into_iter()
            .filter(|v| query.matches(v, start, end))
            .collect();
        visits.sort_by(|a, b| query.compare(a, b));
        log::debug!("Visit log query returned {} records", visits.len());
        Ok(visits)
    }
}
