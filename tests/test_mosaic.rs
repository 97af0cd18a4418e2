use asikit::core::{haversine, ImagerGroup};
use asikit::io::synthetic::{synthetic_imager, SyntheticStation};
use asikit::io::TimeQuery;
use asikit::types::EARTH_RADIUS_KM;
use chrono::{TimeZone, Utc};

const STATIONS: [SyntheticStation; 4] = [
    SyntheticStation::Fsim,
    SyntheticStation::Atha,
    SyntheticStation::Tpas,
    SyntheticStation::Snkq,
];

fn four_station_group() -> ImagerGroup {
    let t0 = Utc.with_ymd_and_hms(2007, 3, 13, 5, 8, 45).unwrap();
    let imagers = STATIONS
        .iter()
        .map(|&s| synthetic_imager(s, TimeQuery::Single(t0), true).unwrap())
        .collect();
    ImagerGroup::new(imagers)
}

#[test]
fn test_overlap_partition_four_stations() {
    let mut group = four_station_group();
    let sites: Vec<(f64, f64)> = group
        .imagers()
        .iter()
        .map(|im| (im.meta().site_lat, im.meta().site_lon))
        .collect();
    let baselines: Vec<usize> = group
        .imagers()
        .iter()
        .map(|im| {
            im.skymap()
                .mask_low_horizon(2.0)
                .lat_stack()
                .iter()
                .filter(|v| v.is_finite())
                .count()
        })
        .collect();

    let masks = group.resolve_overlap(2.0).unwrap();
    assert_eq!(masks.len(), STATIONS.len());

    for (i, station) in STATIONS.iter().enumerate() {
        let masked = &masks[station.location_code()];

        // Every surviving cell must be strictly closest to its own
        // imager (ties keep the first-listed, which is still index i or
        // earlier; sampled to keep the test fast).
        let lat_stack = masked.lat_stack();
        let lon_stack = masked.lon_stack();
        for (idx, &lat) in lat_stack.iter().enumerate().step_by(17) {
            let lon = lon_stack.as_slice().unwrap()[idx];
            if !lat.is_finite() || !lon.is_finite() {
                continue;
            }
            let own = haversine(lat, lon, sites[i].0, sites[i].1, EARTH_RADIUS_KM);
            for (j, &(slat, slon)) in sites.iter().enumerate() {
                if j == i {
                    continue;
                }
                let other = haversine(lat, lon, slat, slon, EARTH_RADIUS_KM);
                assert!(
                    own <= other,
                    "{} kept a cell that is nearer to {}",
                    station.location_code(),
                    STATIONS[j].location_code()
                );
            }
        }

        // An imager with a neighbor inside ~1000 km shares part of its
        // field of view and must lose the shared cells to that neighbor.
        let kept = lat_stack.iter().filter(|v| v.is_finite()).count();
        assert!(kept > 0);
        let nearest_neighbor_km = sites
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(_, &(slat, slon))| {
                haversine(sites[i].0, sites[i].1, slat, slon, EARTH_RADIUS_KM)
            })
            .fold(f64::INFINITY, f64::min);
        if nearest_neighbor_km < 1000.0 {
            assert!(
                kept < baselines[i],
                "{} should be reassigned some overlap cells ({} of {})",
                station.location_code(),
                kept,
                baselines[i]
            );
        }
    }
}

#[test]
fn test_overlap_masks_are_memoized() {
    let mut group = four_station_group();
    let first = group.resolve_overlap(2.0).unwrap();
    let count: usize = first
        .values()
        .map(|s| s.lat_stack().iter().filter(|v| v.is_finite()).count())
        .sum();

    // Second call reuses the cache and returns identical masks.
    let second = group.resolve_overlap(2.0).unwrap();
    let count_again: usize = second
        .values()
        .map(|s| s.lat_stack().iter().filter(|v| v.is_finite()).count())
        .sum();
    assert_eq!(count, count_again);
}
