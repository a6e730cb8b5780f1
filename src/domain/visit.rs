//! Visit records
//!
//! A visit is open while `checkout_time` is absent. Only open visits take part in
//! checkout, manual or automatic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::site::{Category, SiteRef};
use crate::error::{Result, VisitrackError};
use crate::id::generate_visit_id;

/// Declared reason for a visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Meeting,
    Delivery,
    Maintenance,
    Inspection,
    #[default]
    Other,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Meeting => "meeting",
            Purpose::Delivery => "delivery",
            Purpose::Maintenance => "maintenance",
            Purpose::Inspection => "inspection",
            Purpose::Other => "other",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Purpose {
    type Err = VisitrackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "meeting" => Ok(Purpose::Meeting),
            "delivery" => Ok(Purpose::Delivery),
            "maintenance" => Ok(Purpose::Maintenance),
            "inspection" => Ok(Purpose::Inspection),
            "other" => Ok(Purpose::Other),
            other => Err(VisitrackError::InvalidInput(format!("unknown purpose: {}", other))),
        }
    }
}

/// A visitor's stay at a site category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    #[serde(deserialize_with = "super::de_opaque_id")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub purpose: Purpose,
    pub category: Category,
    #[serde(default)]
    pub location_name: Option<String>,
    /// Set at creation, never changed
    pub checkin_time: DateTime<Utc>,
    /// None while the visit is open
    #[serde(default)]
    pub checkout_time: Option<DateTime<Utc>>,
}

impl VisitRecord {
    pub fn is_open(&self) -> bool {
        self.checkout_time.is_none()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Check-in form input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewVisit {
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub purpose: Purpose,
}

impl NewVisit {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            ..Default::default()
        }
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_purpose(mut self, purpose: Purpose) -> Self {
        self.purpose = purpose;
        self
    }

    /// Validate against the rules of the target category.
    ///
    /// Names are always required; factory visits also need company and phone.
    pub fn validate(&self, category: Category) -> Result<()> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(VisitrackError::InvalidInput(
                "first name and last name are required".to_string(),
            ));
        }
        if category == Category::Factory && (blank(&self.company) || blank(&self.phone)) {
            return Err(VisitrackError::InvalidInput(
                "company name and phone number are required for factory visits".to_string(),
            ));
        }
        Ok(())
    }

    /// Build an open visit record at the given location
    pub fn into_record(self, location: &SiteRef, checkin_time: DateTime<Utc>) -> Result<VisitRecord> {
        self.validate(location.category)?;
        Ok(VisitRecord {
            id: generate_visit_id(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            company: trimmed(self.company),
            phone: trimmed(self.phone),
            purpose: self.purpose,
            category: location.category,
            location_name: Some(location.name.clone()),
            checkin_time,
            checkout_time: None,
        })
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Open-visit counts per category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VisitStats {
    pub dormitory_count: usize,
    pub factory_count: usize,
    pub total_count: usize,
}

impl VisitStats {
    pub fn from_open_visits<'a>(visits: impl IntoIterator<Item = &'a VisitRecord>) -> Self {
        let mut stats = Self::default();
        for visit in visits.into_iter().filter(|v| v.is_open()) {
            match visit.category {
                Category::Dormitory => stats.dormitory_count += 1,
                Category::Factory => stats.factory_count += 1,
            }
            stats.total_count += 1;
        }
        stats
    }
}
