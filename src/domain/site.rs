//! Registered sites and their business category

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, VisitrackError};
use crate::geo::validate_coordinates;
use crate::id::generate_site_id;

/// Business category of a site; visits are tagged with it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Dormitory,
    Factory,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Dormitory, Category::Factory];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Dormitory => "dormitory",
            Category::Factory => "factory",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Category::Dormitory => "Dormitory",
            Category::Factory => "Factory",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = VisitrackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dormitory" => Ok(Category::Dormitory),
            "factory" => Ok(Category::Factory),
            other => Err(VisitrackError::InvalidInput(format!("unknown category: {}", other))),
        }
    }
}

/// A registered site with a circular geofence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    #[serde(deserialize_with = "super::de_opaque_id")]
    pub id: String,
    pub name: String,
    pub category: Category,
    pub latitude: f64,
    pub longitude: f64,
    /// Geofence radius in kilometers
    pub radius: f64,
}

impl Site {
    /// Whether the site's own geometry can take part in geofence matching
    pub fn is_well_formed(&self) -> bool {
        validate_coordinates(self.latitude, self.longitude).is_ok() && self.radius.is_finite() && self.radius >= 0.0
    }

    pub fn to_ref(&self) -> SiteRef {
        SiteRef {
            id: self.id.clone(),
            name: self.name.clone(),
            category: self.category,
        }
    }
}

/// Input for registering a new site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSite {
    pub name: String,
    pub category: Category,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
}

impl NewSite {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(VisitrackError::InvalidInput("site name is required".to_string()));
        }
        validate_coordinates(self.latitude, self.longitude)?;
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(VisitrackError::InvalidInput(format!(
                "radius must be a non-negative number of kilometers, got {}",
                self.radius
            )));
        }
        Ok(())
    }

    /// Validate and assign a fresh ID
    pub fn into_site(self) -> Result<Site> {
        self.validate()?;
        Ok(Site {
            id: generate_site_id(),
            name: self.name.trim().to_string(),
            category: self.category,
            latitude: self.latitude,
            longitude: self.longitude,
            radius: self.radius,
        })
    }
}

/// Edit of a registered site; fields left as `None` keep their current value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteUpdate {
    pub name: Option<String>,
    pub category: Option<Category>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius: Option<f64>,
}

impl SiteUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.radius.is_none()
    }

    /// Merge onto `site` and validate the result. The ID never changes.
    pub fn apply(&self, site: &Site) -> Result<Site> {
        if self.is_empty() {
            return Err(VisitrackError::InvalidInput("no site fields to update".to_string()));
        }
        let merged = NewSite {
            name: self.name.clone().unwrap_or_else(|| site.name.clone()),
            category: self.category.unwrap_or(site.category),
            latitude: self.latitude.unwrap_or(site.latitude),
            longitude: self.longitude.unwrap_or(site.longitude),
            radius: self.radius.unwrap_or(site.radius),
        };
        merged.validate()?;
        Ok(Site {
            id: site.id.clone(),
            name: merged.name.trim().to_string(),
            category: merged.category,
            latitude: merged.latitude,
            longitude: merged.longitude,
            radius: merged.radius,
        })
    }
}

/// The identifying subset of a site, kept as the active location preference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRef {
    #[serde(deserialize_with = "super::de_opaque_id")]
    pub id: String,
    pub name: String,
    pub category: Category,
}

impl fmt::Display for SiteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.category.label())
    }
}

/// The nearest site whose geofence contains a fix
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub site: Site,
    /// Great-circle distance from the fix to the site center, in kilometers
    pub distance_km: f64,
}

impl ResolvedLocation {
    pub fn category(&self) -> Category {
        self.site.category
    }
}
