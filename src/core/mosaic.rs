use crate::core::geometry::haversine;
use crate::core::imager::Imager;
use crate::core::skymap::Skymap;
use crate::types::{AsiResult, EARTH_RADIUS_KM};
use std::collections::HashMap;

/// Several imagers with overlapping fields of view, assembled into a
/// mosaic.
///
/// Overlap resolution assigns every skymap cell to the imager whose site
/// is geographically closest, so a mosaic never double-plots a cell. The
/// masks are memoized per group composition and minimum elevation; adding
/// an imager invalidates the cache. This is plain memoization, not a
/// concurrency primitive.
pub struct ImagerGroup {
    imagers: Vec<Imager>,
    cache: Option<(f64, HashMap<String, Skymap>)>,
}

impl ImagerGroup {
    pub fn new(imagers: Vec<Imager>) -> Self {
        Self {
            imagers,
            cache: None,
        }
    }

    pub fn imagers(&self) -> &[Imager] {
        &self.imagers
    }

    /// Add an imager, invalidating any cached overlap masks.
    pub fn push(&mut self, imager: Imager) {
        self.imagers.push(imager);
        self.cache = None;
    }

    /// Per-imager skymaps with low-elevation cells and not-nearest cells
    /// masked out, keyed by location code.
    ///
    /// Each cell is compared against every site with the haversine
    /// formula (sphere approximation). A cell survives only for its
    /// strictly nearest imager; on an exact distance tie the first-listed
    /// imager wins.
    pub fn resolve_overlap(&mut self, min_elevation: f64) -> AsiResult<&HashMap<String, Skymap>> {
        let cached = matches!(&self.cache, Some((el, _)) if *el == min_elevation);
        if !cached {
            self.cache = Some((min_elevation, self.compute_masks(min_elevation)?));
        }
        Ok(&self.cache.as_ref().unwrap().1)
    }

    fn compute_masks(&self, min_elevation: f64) -> AsiResult<HashMap<String, Skymap>> {
        let sites: Vec<(f64, f64)> = self
            .imagers
            .iter()
            .map(|im| (im.meta().site_lat, im.meta().site_lon))
            .collect();

        let mut masks = HashMap::new();
        for (i, imager) in self.imagers.iter().enumerate() {
            let horizon_masked = imager.skymap().mask_low_horizon(min_elevation);
            let masked = horizon_masked.retain_cells(|lat, lon| {
                let mut nearest = 0usize;
                let mut best = f64::INFINITY;
                for (j, &(site_lat, site_lon)) in sites.iter().enumerate() {
                    let d = haversine(lat, lon, site_lat, site_lon, EARTH_RADIUS_KM);
                    // Strict < keeps the first-listed imager on exact ties.
                    if d < best {
                        best = d;
                        nearest = j;
                    }
                }
                nearest == i
            });
            masks.insert(imager.meta().location.clone(), masked);
        }

        log::debug!(
            "Resolved overlap for {} imagers at min elevation {}°",
            self.imagers.len(),
            min_elevation
        );
        Ok(masks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::synthetic::{synthetic_imager, SyntheticStation};
    use crate::io::TimeQuery;
    use chrono::{TimeZone, Utc};

    fn group(stations: &[SyntheticStation]) -> ImagerGroup {
        let t0 = Utc.with_ymd_and_hms(2020, 1, 1, 6, 0, 0).unwrap();
        let imagers = stations
            .iter()
            .map(|&s| synthetic_imager(s, TimeQuery::Single(t0), true).unwrap())
            .collect();
        ImagerGroup::new(imagers)
    }

    #[test]
    fn test_single_imager_keeps_all_cells() {
        let mut group = group(&[SyntheticStation::Gill]);
        let count = |s: &Skymap| s.lat_stack().iter().filter(|v| v.is_finite()).count();
        let original = count(group.imagers()[0].skymap());
        let masks = group.resolve_overlap(0.0).unwrap();
        assert_eq!(count(&masks["GILL"]), original);
    }

    #[test]
    fn test_overlapping_pair_reassigns_cells() {
        // GILL and TPAS are ~500 km apart; their fields of view overlap.
        let mut group = group(&[SyntheticStation::Gill, SyntheticStation::Tpas]);
        let originals: Vec<usize> = group
            .imagers()
            .iter()
            .map(|im| {
                im.skymap()
                    .lat_stack()
                    .iter()
                    .filter(|v| v.is_finite())
                    .count()
            })
            .collect();

        let masks = group.resolve_overlap(2.0).unwrap();
        for (station, original) in [("GILL", originals[0]), ("TPAS", originals[1])] {
            let kept = masks[station]
                .lat_stack()
                .iter()
                .filter(|v| v.is_finite())
                .count();
            assert!(kept > 0, "{} lost its whole field of view", station);
            assert!(
                kept < original,
                "{} should lose some overlap cells ({} vs {})",
                station,
                kept,
                original
            );
        }
    }

    #[test]
    fn test_push_invalidates_cache() {
        let mut group = group(&[SyntheticStation::Gill]);
        let before = group.resolve_overlap(2.0).unwrap().len();
        assert_eq!(before, 1);

        let t0 = Utc.with_ymd_and_hms(2020, 1, 1, 6, 0, 0).unwrap();
        let extra = synthetic_imager(SyntheticStation::Tpas, TimeQuery::Single(t0), true).unwrap();
        group.push(extra);
        let after = group.resolve_overlap(2.0).unwrap().len();
        assert_eq!(after, 2);
    }
}
