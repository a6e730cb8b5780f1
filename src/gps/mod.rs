//! GPS providers
//!
//! `GpsProvider` is the seam to whatever produces a position. `StaticGpsProvider`
//! returns a configured fix (or failure); `BoundedGpsProvider` adds the request
//! timeout and cached-position tolerance every caller should use.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::domain::GpsFix;
use crate::error::{Result, VisitrackError};

/// Minimum request timeout
pub const MIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum age of a cached fix that may be reused
pub const MAX_CACHED_AGE: Duration = Duration::from_secs(300);

/// Source of position fixes
#[async_trait]
pub trait GpsProvider: Send + Sync {
    /// Current position. Fails with `PositionUnavailable`, `PermissionDenied` or `Timeout`.
    async fn current_fix(&self) -> Result<GpsFix>;
}

/// Why a static provider cannot produce a fix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpsFailure {
    PositionUnavailable,
    PermissionDenied,
    Timeout,
}

impl GpsFailure {
    fn to_error(self) -> VisitrackError {
        match self {
            GpsFailure::PositionUnavailable => {
                VisitrackError::PositionUnavailable("Location information unavailable".to_string())
            }
            GpsFailure::PermissionDenied => VisitrackError::PermissionDenied("Location access denied".to_string()),
            GpsFailure::Timeout => VisitrackError::Timeout("Location request timeout".to_string()),
        }
    }
}

/// Provider that always answers the same way
#[derive(Debug, Clone)]
pub struct StaticGpsProvider {
    outcome: std::result::Result<GpsFix, GpsFailure>,
}

impl StaticGpsProvider {
    pub fn new(fix: GpsFix) -> Self {
        Self { outcome: Ok(fix) }
    }

    pub fn failing(failure: GpsFailure) -> Self {
        Self { outcome: Err(failure) }
    }

    /// No positioning hardware configured
    pub fn unavailable() -> Self {
        Self::failing(GpsFailure::PositionUnavailable)
    }
}

#[async_trait]
impl GpsProvider for StaticGpsProvider {
    async fn current_fix(&self) -> Result<GpsFix> {
        match self.outcome {
            Ok(fix) => Ok(fix),
            Err(failure) => Err(failure.to_error()),
        }
    }
}

/// Wraps a provider with a timeout and reuse of recent fixes
pub struct BoundedGpsProvider<P: GpsProvider> {
    inner: P,
    timeout: Duration,
    max_age: Duration,
    cached: Mutex<Option<(Instant, GpsFix)>>,
}

impl<P: GpsProvider> BoundedGpsProvider<P> {
    /// `timeout` is raised to at least [`MIN_TIMEOUT`]; `max_age` is capped at [`MAX_CACHED_AGE`].
    pub fn new(inner: P, timeout: Duration, max_age: Duration) -> Self {
        Self {
            inner,
            timeout: timeout.max(MIN_TIMEOUT),
            max_age: max_age.min(MAX_CACHED_AGE),
            cached: Mutex::new(None),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    fn fresh_cached(&self) -> Option<GpsFix> {
        let cached = *self.cached.lock().ok()?;
        cached.and_then(|(at, fix)| (at.elapsed() <= self.max_age).then_some(fix))
    }
}

#[async_trait]
impl<P: GpsProvider> GpsProvider for BoundedGpsProvider<P> {
    async fn current_fix(&self) -> Result<GpsFix> {
        if let Some(fix) = self.fresh_cached() {
            tracing::debug!("Reusing cached GPS fix");
            return Ok(fix);
        }

        let fix = tokio::time::timeout(self.timeout, self.inner.current_fix())
            .await
            .map_err(|_| VisitrackError::Timeout(format!("no GPS fix within {:?}", self.timeout)))??;

        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some((Instant::now(), fix));
        }
        tracing::debug!(
            latitude = fix.latitude,
            longitude = fix.longitude,
            accuracy = fix.accuracy,
            "GPS fix acquired"
        );
        Ok(fix)
    }
}
