//! GPS position readings

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, VisitrackError};
use crate::geo::validate_coordinates;

/// A single position reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported accuracy radius in meters; informational only
    pub accuracy: f64,
}

impl GpsFix {
    /// Create a fix, rejecting malformed coordinates
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Result<Self> {
        let fix = Self {
            latitude,
            longitude,
            accuracy,
        };
        fix.validate()?;
        Ok(fix)
    }

    pub fn validate(&self) -> Result<()> {
        validate_coordinates(self.latitude, self.longitude)?;
        if self.accuracy.is_nan() || self.accuracy < 0.0 {
            return Err(VisitrackError::InvalidInput(format!(
                "accuracy must be a non-negative number of meters, got {}",
                self.accuracy
            )));
        }
        Ok(())
    }

    pub fn accuracy_level(&self) -> AccuracyLevel {
        AccuracyLevel::from_meters(self.accuracy)
    }
}

/// Coarse accuracy classification for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyLevel {
    /// 50 m or better
    High,
    /// Up to 100 m
    Medium,
    /// Worse than 100 m; the detected site may be wrong
    Low,
}

impl AccuracyLevel {
    pub fn from_meters(accuracy: f64) -> Self {
        if accuracy > 100.0 {
            AccuracyLevel::Low
        } else if accuracy > 50.0 {
            AccuracyLevel::Medium
        } else {
            AccuracyLevel::High
        }
    }
}

impl fmt::Display for AccuracyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccuracyLevel::High => "High accuracy",
            AccuracyLevel::Medium => "Medium accuracy",
            AccuracyLevel::Low => "Low accuracy - may be inaccurate",
        };
        f.write_str(label)
    }
}
