//! Location resolver - maps a GPS fix to the nearest containing site
//!
//! A site is a candidate when the fix lies within its radius. The candidate with the
//! strictly smallest distance wins; on an exact tie the site listed first wins.

use super::distance::haversine_km;
use crate::domain::{GpsFix, ResolvedLocation, Site};
use crate::error::Result;

/// Stateless geofence resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationResolver;

impl LocationResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a fix against a site list.
    ///
    /// Returns `Ok(None)` when no site contains the fix, and `InvalidInput` when the
    /// fix itself is malformed. Sites with malformed geometry are never candidates.
    pub fn resolve(&self, fix: &GpsFix, sites: &[Site]) -> Result<Option<ResolvedLocation>> {
        fix.validate()?;

        let mut nearest: Option<(&Site, f64)> = None;

        for site in sites {
            if !site.is_well_formed() {
                tracing::warn!(site_id = %site.id, name = %site.name, "Skipping site with malformed geofence");
                continue;
            }

            let distance = haversine_km(fix.latitude, fix.longitude, site.latitude, site.longitude);
            if distance.is_nan() || distance > site.radius {
                continue;
            }

            // Strict comparison keeps the earlier site on ties
            if nearest.is_none_or(|(_, best)| distance < best) {
                nearest = Some((site, distance));
            }
        }

        Ok(nearest.map(|(site, distance_km)| ResolvedLocation {
            site: site.clone(),
            distance_km,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;
    use crate::error::VisitrackError;

    fn site(id: &str, category: Category, latitude: f64, longitude: f64, radius: f64) -> Site {
        Site {
            id: id.to_string(),
            name: format!("Site {}", id),
            category,
            latitude,
            longitude,
            radius,
        }
    }

    fn fix(latitude: f64, longitude: f64) -> GpsFix {
        GpsFix {
            latitude,
            longitude,
            accuracy: 10.0,
        }
    }

    #[test]
    fn test_fix_inside_radius_resolves() {
        let sites = vec![site("A", Category::Dormitory, 37.5665, 126.9780, 0.5)];
        let resolved = LocationResolver::new()
            .resolve(&fix(37.5669, 126.9784), &sites)
            .unwrap()
            .expect("site A should match");

        assert_eq!(resolved.site.id, "A");
        assert_eq!(resolved.category(), Category::Dormitory);
        assert!(resolved.distance_km > 0.05 && resolved.distance_km < 0.06);
    }

    #[test]
    fn test_fix_outside_radius_is_none() {
        let sites = vec![site("A", Category::Dormitory, 37.5665, 126.9780, 0.5)];
        // ~2 km north
        let resolved = LocationResolver::new().resolve(&fix(37.5845, 126.9780), &sites).unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn test_empty_registry_is_none() {
        let resolved = LocationResolver::new().resolve(&fix(37.5665, 126.9780), &[]).unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn test_nearest_candidate_wins_regardless_of_order() {
        // first is ~0.10 km away, second ~0.08 km
        let sites = vec![
            site("first", Category::Factory, 37.5665 + 0.0009, 126.9780, 0.5),
            site("second", Category::Dormitory, 37.5665 + 0.00072, 126.9780, 0.5),
        ];
        let resolved = LocationResolver::new()
            .resolve(&fix(37.5665, 126.9780), &sites)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.site.id, "second");
        assert_eq!(resolved.category(), Category::Dormitory);
    }

    #[test]
    fn test_exact_tie_resolves_to_first_listed() {
        let sites = vec![
            site("first", Category::Factory, 37.5670, 126.9780, 0.5),
            site("second", Category::Dormitory, 37.5670, 126.9780, 0.5),
        ];
        let resolved = LocationResolver::new()
            .resolve(&fix(37.5665, 126.9780), &sites)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.site.id, "first");

        let reversed: Vec<Site> = sites.into_iter().rev().collect();
        let resolved = LocationResolver::new()
            .resolve(&fix(37.5665, 126.9780), &reversed)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.site.id, "second");
    }

    #[test]
    fn test_closer_site_outside_its_radius_is_skipped() {
        let sites = vec![
            // ~0.08 km away but only 0.05 km radius
            site("tight", Category::Factory, 37.5665 + 0.00072, 126.9780, 0.05),
            // ~0.10 km away with a wide radius
            site("wide", Category::Dormitory, 37.5665 + 0.0009, 126.9780, 1.0),
        ];
        let resolved = LocationResolver::new()
            .resolve(&fix(37.5665, 126.9780), &sites)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.site.id, "wide");
    }

    #[test]
    fn test_zero_radius_matches_only_exact_point() {
        let sites = vec![site("pin", Category::Factory, 37.5665, 126.9780, 0.0)];
        let resolver = LocationResolver::new();
        assert!(resolver.resolve(&fix(37.5665, 126.9780), &sites).unwrap().is_some());
        assert!(resolver.resolve(&fix(37.5666, 126.9780), &sites).unwrap().is_none());
    }

    #[test]
    fn test_antipodal_site_never_matches_small_radius() {
        let sites = vec![site("far", Category::Factory, 70.877, 1.456, 0.0)];
        let resolver = LocationResolver::new();
        assert!(resolver.resolve(&fix(-70.877, -178.544), &sites).unwrap().is_none());

        let sites = vec![site("globe", Category::Factory, 70.877, 1.456, 25000.0)];
        let resolved = resolver.resolve(&fix(-70.877, -178.544), &sites).unwrap().unwrap();
        assert!(resolved.distance_km.is_finite());
        assert!(resolved.distance_km <= resolved.site.radius);
    }

    #[test]
    fn test_malformed_fix_is_invalid_input() {
        let sites = vec![site("A", Category::Dormitory, 37.5665, 126.9780, 0.5)];
        let err = LocationResolver::new().resolve(&fix(123.0, 126.9780), &sites).unwrap_err();
        assert!(matches!(err, VisitrackError::InvalidInput(_)));
    }

    #[test]
    fn test_malformed_site_is_skipped() {
        let sites = vec![
            site("broken", Category::Factory, f64::NAN, 126.9780, 0.5),
            site("negative", Category::Factory, 37.5665, 126.9780, -1.0),
            site("ok", Category::Dormitory, 37.5665, 126.9780, 0.5),
        ];
        let resolved = LocationResolver::new()
            .resolve(&fix(37.5665, 126.9780), &sites)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.site.id, "ok");
    }

    #[test]
    fn test_result_is_within_radius_for_grid_of_fixes() {
        let sites = vec![
            site("A", Category::Dormitory, 37.5665, 126.9780, 0.3),
            site("B", Category::Factory, 37.5700, 126.9800, 0.4),
        ];
        let resolver = LocationResolver::new();
        for i in 0..20 {
            for j in 0..20 {
                let f = fix(37.5600 + i as f64 * 0.0008, 126.9700 + j as f64 * 0.0008);
                match resolver.resolve(&f, &sites).unwrap() {
                    Some(resolved) => {
                        assert!(resolved.distance_km <= resolved.site.radius);
                        for other in &sites {
                            let d = haversine_km(f.latitude, f.longitude, other.latitude, other.longitude);
                            if d <= other.radius {
                                assert!(resolved.distance_km <= d);
                            }
                        }
                    }
                    None => {
                        for other in &sites {
                            let d = haversine_km(f.latitude, f.longitude, other.latitude, other.longitude);
                            assert!(d > other.radius);
                        }
                    }
                }
            }
        }
    }
}
