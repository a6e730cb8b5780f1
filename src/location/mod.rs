//! Active location session
//!
//! Reconciles three sources for "where am I checking visitors in": an explicit
//! selection made this session, the last location saved in preferences, and a live
//! GPS detection against the site registry.

use std::sync::RwLock;

use crate::domain::{AccuracyLevel, SiteRef};
use crate::error::Result;
use crate::geo::LocationResolver;
use crate::gps::GpsProvider;
use crate::store::{PreferenceStore, SiteRegistry};

const SAVED_LOCATION_KEY: &str = "saved_location";
const LOCATION_CHANGE_KEY: &str = "location_change_enabled";

/// Result of a location refresh or check
#[derive(Debug, Clone, PartialEq)]
pub enum LocationOutcome {
    /// A location chosen earlier in this session
    Selected(SiteRef),
    /// Detected from a GPS fix and saved
    Detected {
        site: SiteRef,
        distance_km: f64,
        accuracy: AccuracyLevel,
    },
    /// Detection produced nothing usable; the saved location stands in
    Saved(SiteRef),
    /// Nothing to fall back on
    ManualRequired { reason: String },
}

impl LocationOutcome {
    /// The location to use, if any
    pub fn site(&self) -> Option<&SiteRef> {
        match self {
            LocationOutcome::Selected(site) | LocationOutcome::Saved(site) => Some(site),
            LocationOutcome::Detected { site, .. } => Some(site),
            LocationOutcome::ManualRequired { .. } => None,
        }
    }
}

/// Location session backed by a preference store
pub struct LocationManager<P: PreferenceStore> {
    prefs: P,
    resolver: LocationResolver,
    selected: RwLock<Option<SiteRef>>,
}

impl<P: PreferenceStore> LocationManager<P> {
    pub fn new(prefs: P) -> Self {
        Self {
            prefs,
            resolver: LocationResolver::new(),
            selected: RwLock::new(None),
        }
    }

    pub fn preferences(&self) -> &P {
        &self.prefs
    }

    /// Make `site` the active location and remember it
    pub fn select(&self, site: SiteRef) -> Result<()> {
        self.save(&site)?;
        log::info!("Location selected: {}", site);
        if let Ok(mut selected) = self.selected.write() {
            *selected = Some(site);
        }
        Ok(())
    }

    /// Location saved in preferences. A value that fails to parse is ignored.
    pub fn saved_location(&self) -> Result<Option<SiteRef>> {
        let Some(raw) = self.prefs.get(SAVED_LOCATION_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(site) => Ok(Some(site)),
            Err(e) => {
                log::warn!("Ignoring unreadable saved location: {}", e);
                Ok(None)
            }
        }
    }

    /// Selected location, else saved location
    pub fn current(&self) -> Result<Option<SiteRef>> {
        let selected = self.selected.read().ok().and_then(|s| s.clone());
        match selected {
            Some(site) => Ok(Some(site)),
            None => self.saved_location(),
        }
    }

    pub fn location_change_enabled(&self) -> Result<bool> {
        Ok(self.prefs.get(LOCATION_CHANGE_KEY)?.as_deref() == Some("true"))
    }

    /// Flip the location-change toggle and return the new value
    pub fn toggle_location_change(&self) -> Result<bool> {
        let enabled = !self.location_change_enabled()?;
        self.prefs.set(LOCATION_CHANGE_KEY, if enabled { "true" } else { "false" })?;
        log::info!("Location change {}", if enabled { "enabled" } else { "disabled" });
        Ok(enabled)
    }

    /// Detect the location from GPS; fall back to the saved location when detection
    /// finds nothing or fails recoverably.
    pub async fn refresh<G, R>(&self, gps: &G, registry: &R) -> Result<LocationOutcome>
    where
        G: GpsProvider + ?Sized,
        R: SiteRegistry + ?Sized,
    {
        let reason = match self.detect(gps, registry).await {
            Ok(Some(outcome)) => return Ok(outcome),
            Ok(None) => "No registered site within range".to_string(),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(error = %e, "Location detection failed");
                e.to_string()
            }
            Err(e) => return Err(e),
        };

        match self.saved_location()? {
            Some(site) => {
                log::info!("Using saved location {}: {}", site, reason);
                Ok(LocationOutcome::Saved(site))
            }
            None => Ok(LocationOutcome::ManualRequired { reason }),
        }
    }

    /// Location for the check-out flow: the current one if known, otherwise a fresh
    /// detection when location change is enabled.
    pub async fn ensure_location<G, R>(&self, gps: &G, registry: &R) -> Result<LocationOutcome>
    where
        G: GpsProvider + ?Sized,
        R: SiteRegistry + ?Sized,
    {
        if let Some(site) = self.current()? {
            return Ok(LocationOutcome::Selected(site));
        }
        if self.location_change_enabled()? {
            return self.refresh(gps, registry).await;
        }
        Ok(LocationOutcome::ManualRequired {
            reason: "No location selected and location change is disabled".to_string(),
        })
    }

    async fn detect<G, R>(&self, gps: &G, registry: &R) -> Result<Option<LocationOutcome>>
    where
        G: GpsProvider + ?Sized,
        R: SiteRegistry + ?Sized,
    {
        let fix = gps.current_fix().await?;
        let sites = registry.list_sites().await?;
        let Some(resolved) = self.resolver.resolve(&fix, &sites)? else {
            return Ok(None);
        };

        let site = resolved.site.to_ref();
        self.save(&site)?;
        tracing::info!(
            site = %site,
            distance_km = resolved.distance_km,
            "Location detected"
        );
        Ok(Some(LocationOutcome::Detected {
            site,
            distance_km: resolved.distance_km,
            accuracy: fix.accuracy_level(),
        }))
    }

    fn save(&self, site: &SiteRef) -> Result<()> {
        let raw = serde_json::to_string(site)?;
        self.prefs.set(SAVED_LOCATION_KEY, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, GpsFix, NewSite, Site, SiteUpdate};
    use crate::error::VisitrackError;
    use crate::gps::{GpsFailure, StaticGpsProvider};
    use crate::store::MemoryPreferences;
    use async_trait::async_trait;

    struct FixedRegistry {
        sites: Vec<Site>,
        fail: bool,
    }

    #[async_trait]
    impl SiteRegistry for FixedRegistry {
        async fn list_sites(&self) -> Result<Vec<Site>> {
            if self.fail {
                return Err(VisitrackError::RegistryUnavailable("offline".to_string()));
            }
            Ok(self.sites.clone())
        }

        async fn add_site(&self, _site: NewSite) -> Result<Site> {
            Err(VisitrackError::RegistryUnavailable("read only".to_string()))
        }

        async fn update_site(&self, _id: &str, _update: SiteUpdate) -> Result<Site> {
            Err(VisitrackError::RegistryUnavailable("read only".to_string()))
        }

        async fn remove_site(&self, _id: &str) -> Result<()> {
            Err(VisitrackError::RegistryUnavailable("read only".to_string()))
        }
    }

    fn registry() -> FixedRegistry {
        FixedRegistry {
            sites: vec![
                Site {
                    id: "1".to_string(),
                    name: "Main Dormitory".to_string(),
                    category: Category::Dormitory,
                    latitude: 37.5665,
                    longitude: 126.9780,
                    radius: 0.1,
                },
                Site {
                    id: "2".to_string(),
                    name: "Factory Building A".to_string(),
                    category: Category::Factory,
                    latitude: 37.5700,
                    longitude: 126.9800,
                    radius: 0.2,
                },
            ],
            fail: false,
        }
    }

    fn gps_at(latitude: f64, longitude: f64) -> StaticGpsProvider {
        StaticGpsProvider::new(GpsFix::new(latitude, longitude, 30.0).unwrap())
    }

    fn dormitory_ref() -> SiteRef {
        SiteRef {
            id: "1".to_string(),
            name: "Main Dormitory".to_string(),
            category: Category::Dormitory,
        }
    }

    #[test]
    fn test_select_sets_current_and_saved() {
        let manager = LocationManager::new(MemoryPreferences::new());
        assert_eq!(manager.current().unwrap(), None);

        manager.select(dormitory_ref()).unwrap();
        assert_eq!(manager.current().unwrap(), Some(dormitory_ref()));
        assert_eq!(manager.saved_location().unwrap(), Some(dormitory_ref()));
    }

    #[test]
    fn test_current_falls_back_to_saved() {
        let prefs = MemoryPreferences::new();
        prefs
            .set(SAVED_LOCATION_KEY, &serde_json::to_string(&dormitory_ref()).unwrap())
            .unwrap();
        let manager = LocationManager::new(prefs);
        assert_eq!(manager.current().unwrap(), Some(dormitory_ref()));
    }

    #[test]
    fn test_corrupt_saved_location_is_ignored() {
        let prefs = MemoryPreferences::new();
        prefs.set(SAVED_LOCATION_KEY, "{broken").unwrap();
        let manager = LocationManager::new(prefs);
        assert_eq!(manager.current().unwrap(), None);
    }

    #[test]
    fn test_toggle_location_change() {
        let manager = LocationManager::new(MemoryPreferences::new());
        assert!(!manager.location_change_enabled().unwrap());
        assert!(manager.toggle_location_change().unwrap());
        assert!(manager.location_change_enabled().unwrap());
        assert!(!manager.toggle_location_change().unwrap());
    }

    #[tokio::test]
    async fn test_refresh_detects_and_saves() {
        let manager = LocationManager::new(MemoryPreferences::new());
        let outcome = manager.refresh(&gps_at(37.5665, 126.9780), &registry()).await.unwrap();

        match outcome {
            LocationOutcome::Detected {
                site,
                distance_km,
                accuracy,
            } => {
                assert_eq!(site, dormitory_ref());
                assert!(distance_km < 1e-9);
                assert_eq!(accuracy, AccuracyLevel::High);
            }
            other => panic!("expected detection, got {:?}", other),
        }
        assert_eq!(manager.saved_location().unwrap(), Some(dormitory_ref()));
    }

    #[tokio::test]
    async fn test_refresh_no_hit_uses_saved() {
        let manager = LocationManager::new(MemoryPreferences::new());
        manager.select(dormitory_ref()).unwrap();

        let outcome = manager.refresh(&gps_at(37.6, 127.1), &registry()).await.unwrap();
        assert_eq!(outcome, LocationOutcome::Saved(dormitory_ref()));
    }

    #[tokio::test]
    async fn test_refresh_no_hit_without_saved_requires_manual() {
        let manager = LocationManager::new(MemoryPreferences::new());
        let outcome = manager.refresh(&gps_at(37.6, 127.1), &registry()).await.unwrap();
        assert!(matches!(outcome, LocationOutcome::ManualRequired { .. }));
        assert!(outcome.site().is_none());
    }

    #[tokio::test]
    async fn test_refresh_gps_failure_falls_back() {
        let manager = LocationManager::new(MemoryPreferences::new());
        manager.select(dormitory_ref()).unwrap();

        let gps = StaticGpsProvider::failing(GpsFailure::PermissionDenied);
        let outcome = manager.refresh(&gps, &registry()).await.unwrap();
        assert_eq!(outcome, LocationOutcome::Saved(dormitory_ref()));
    }

    #[tokio::test]
    async fn test_refresh_registry_failure_requires_manual() {
        let manager = LocationManager::new(MemoryPreferences::new());
        let mut offline = registry();
        offline.fail = true;

        let outcome = manager.refresh(&gps_at(37.5665, 126.9780), &offline).await.unwrap();
        match outcome {
            LocationOutcome::ManualRequired { reason } => assert!(reason.contains("offline")),
            other => panic!("expected manual selection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ensure_location_prefers_current() {
        let manager = LocationManager::new(MemoryPreferences::new());
        manager.select(dormitory_ref()).unwrap();

        let gps = StaticGpsProvider::unavailable();
        let outcome = manager.ensure_location(&gps, &registry()).await.unwrap();
        assert_eq!(outcome, LocationOutcome::Selected(dormitory_ref()));
    }

    #[tokio::test]
    async fn test_ensure_location_detects_only_when_enabled() {
        let manager = LocationManager::new(MemoryPreferences::new());
        let gps = gps_at(37.5700, 126.9800);

        let outcome = manager.ensure_location(&gps, &registry()).await.unwrap();
        assert!(matches!(outcome, LocationOutcome::ManualRequired { .. }));

        manager.toggle_location_change().unwrap();
        let outcome = manager.ensure_location(&gps, &registry()).await.unwrap();
        assert_eq!(outcome.site().map(|s| s.category), Some(Category::Factory));
    }
}
