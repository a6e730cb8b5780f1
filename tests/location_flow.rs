//! Location detection integration tests
//!
//! Registers sites in a file-backed registry and resolves GPS fixes against them.

use std::time::Duration;

use tempfile::TempDir;
use visitrack::domain::{Category, GpsFix, NewSite};
use visitrack::error::Result;
use visitrack::geo::LocationResolver;
use visitrack::gps::{BoundedGpsProvider, GpsFailure, StaticGpsProvider};
use visitrack::location::{LocationManager, LocationOutcome};
use visitrack::store::{FilePreferences, LocalStore, SiteRegistry};

fn new_site(name: &str, category: Category, latitude: f64, longitude: f64, radius: f64) -> NewSite {
    NewSite {
        name: name.to_string(),
        category,
        latitude,
        longitude,
        radius,
    }
}

fn bounded(provider: StaticGpsProvider) -> BoundedGpsProvider<StaticGpsProvider> {
    BoundedGpsProvider::new(provider, Duration::from_secs(10), Duration::from_secs(300))
}

#[tokio::test]
async fn test_registered_site_is_detected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = LocalStore::open(temp_dir.path())?;
    store
        .add_site(new_site("Main Dormitory", Category::Dormitory, 37.5665, 126.9780, 0.5))
        .await?;

    let sites = store.list_sites().await?;
    let fix = GpsFix::new(37.5669, 126.9784, 15.0)?;
    let resolved = LocationResolver::new().resolve(&fix, &sites)?.unwrap();
    assert_eq!(resolved.site.name, "Main Dormitory");
    assert_eq!(resolved.category(), Category::Dormitory);
    assert!((resolved.distance_km - 0.0568).abs() < 0.001);

    let far = GpsFix::new(37.5845, 126.9780, 15.0)?;
    assert!(LocationResolver::new().resolve(&far, &sites)?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_location_session_survives_restart() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = LocalStore::open(temp_dir.path().join("data"))?;
    store
        .add_site(new_site("Factory Building A", Category::Factory, 37.5700, 126.9800, 0.2))
        .await?;
    let prefs_path = temp_dir.path().join("preferences.json");

    {
        let manager = LocationManager::new(FilePreferences::open(&prefs_path)?);
        let gps = bounded(StaticGpsProvider::new(GpsFix::new(37.5701, 126.9801, 40.0)?));
        let outcome = manager.refresh(&gps, &store).await?;
        assert!(matches!(outcome, LocationOutcome::Detected { .. }));
    }

    // A new session with GPS denied falls back to the saved site
    let manager = LocationManager::new(FilePreferences::open(&prefs_path)?);
    let denied = bounded(StaticGpsProvider::failing(GpsFailure::PermissionDenied));
    let outcome = manager.refresh(&denied, &store).await?;
    match outcome {
        LocationOutcome::Saved(site) => {
            assert_eq!(site.name, "Factory Building A");
            assert_eq!(site.category, Category::Factory);
        }
        other => panic!("expected saved location, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_nearest_of_overlapping_sites_wins() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = LocalStore::open(temp_dir.path())?;
    // Listed by name: "A Wide" first, but "B Close" is nearer
    store
        .add_site(new_site("A Wide", Category::Dormitory, 37.5674, 126.9780, 1.0))
        .await?;
    store
        .add_site(new_site("B Close", Category::Factory, 37.5665, 126.9789, 1.0))
        .await?;

    let fix = GpsFix::new(37.5665, 126.9780, 10.0)?;
    let resolved = LocationResolver::new().resolve(&fix, &store.list_sites().await?)?.unwrap();
    assert_eq!(resolved.site.name, "B Close");

    Ok(())
}
