//! Frequent visitors
//!
//! Saved visitor details that prefill the check-in form for repeat visits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::visit::NewVisit;
use crate::error::{Result, VisitrackError};
use crate::id::generate_frequent_visitor_id;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequentVisitor {
    #[serde(deserialize_with = "super::de_opaque_id")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

impl FrequentVisitor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Check-in form filled from the saved details
    pub fn prefill(&self) -> NewVisit {
        NewVisit {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            company: self.company.clone(),
            phone: self.phone.clone(),
            ..Default::default()
        }
    }
}

/// Input for saving a frequent visitor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewFrequentVisitor {
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub phone: Option<String>,
}

impl NewFrequentVisitor {
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

    pub fn validate(&self) -> Result<()> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(VisitrackError::InvalidInput(
                "first name and last name are required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn into_record(self, created_at: DateTime<Utc>) -> Result<FrequentVisitor> {
        self.validate()?;
        Ok(FrequentVisitor {
            id: generate_frequent_visitor_id(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            company: trimmed(self.company),
            phone: trimmed(self.phone),
            created_at,
        })
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
