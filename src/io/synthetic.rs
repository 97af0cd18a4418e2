//! Analytic imager for exercising the analysis core without instrument
//! files.
//!
//! The skymap is a Gaussian elevation bowl centered on the station with
//! NaN edges, calibrated at the usual 90/110/150 km layers. Images carry a
//! moving cross pattern keyed to seconds-since-file-start, at a 10 s
//! cadence with one chunk per simulated hour file.

use crate::core::imager::Imager;
use crate::core::skymap::{GridOrientation, Skymap};
use crate::io::{ImageChunk, ImageSource, SkymapSource, TimeQuery};
use crate::types::{ArrayFamily, AsiError, AsiResult, GroundTrack, ImagerMeta};
use chrono::{DateTime, Duration, DurationRound, TimeZone, Utc};
use ndarray::{Array2, Array3};

/// Image rows/columns of the synthetic imager
pub const RESOLUTION: usize = 512;

/// Synthetic imaging cadence in seconds
pub const CADENCE_S: f64 = 10.0;

/// The discrete calibration altitudes, in kilometers
pub const ALTITUDES_KM: [f64; 3] = [90.0, 110.0, 150.0];

/// Stations with real THEMIS-array coordinates, so multi-imager geometry
/// (overlap, conjunctions) behaves like the genuine network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticStation {
    Gill,
    Atha,
    Tpas,
    Fsim,
    Snkq,
}

impl SyntheticStation {
    pub fn location_code(&self) -> &'static str {
        match self {
            SyntheticStation::Gill => "GILL",
            SyntheticStation::Atha => "ATHA",
            SyntheticStation::Tpas => "TPAS",
            SyntheticStation::Fsim => "FSIM",
            SyntheticStation::Snkq => "SNKQ",
        }
    }

    /// (latitude, longitude, altitude km) of the site.
    pub fn site(&self) -> (f64, f64, f64) {
        match self {
            SyntheticStation::Gill => (56.3494, -94.7056, 0.5),
            SyntheticStation::Atha => (54.7213, -113.285, 1.0),
            SyntheticStation::Tpas => (53.8255, -101.2427, 0.0),
            SyntheticStation::Fsim => (61.7618, -121.2703, 0.2),
            SyntheticStation::Snkq => (56.5361, -79.2258, 0.0),
        }
    }

    pub fn meta(&self) -> ImagerMeta {
        let (site_lat, site_lon, site_alt_km) = self.site();
        ImagerMeta {
            array: ArrayFamily::Themis,
            location: self.location_code().to_string(),
            site_lat,
            site_lon,
            site_alt_km,
            cadence_s: CADENCE_S,
            resolution: (RESOLUTION, RESOLUTION),
        }
    }
}

/// Build the analytic skymap for a station.
///
/// Each altitude layer spans site ± 10°·(alt/110) in both axes. Elevation
/// is a Gaussian bowl, 90° at zenith, dipping below zero (NaN) at the
/// edges so the field-of-view boundary behaves like a real calibration.
pub fn synthetic_skymap(meta: &ImagerMeta, pixel_center: bool) -> AsiResult<Skymap> {
    let pad = if pixel_center { 0 } else { 1 };
    let (rows, cols) = meta.resolution;
    let (grows, gcols) = (rows + pad, cols + pad);

    let mut lat = Array3::zeros((ALTITUDES_KM.len(), grows, gcols));
    let mut lon = Array3::zeros((ALTITUDES_KM.len(), grows, gcols));
    let mut elevation = Array2::zeros((rows, cols));
    let mut azimuth = Array2::zeros((rows, cols));

    for (a, &alt) in ALTITUDES_KM.iter().enumerate() {
        let half_span = 10.0 * (alt / 110.0);
        let sigma = 5.0 * (alt / 110.0);
        for r in 0..grows {
            for c in 0..gcols {
                let frac_r = r as f64 / (grows - 1) as f64;
                let frac_c = c as f64 / (gcols - 1) as f64;
                let cell_lat = meta.site_lat - half_span + 2.0 * half_span * frac_r;
                let cell_lon = meta.site_lon - half_span + 2.0 * half_span * frac_c;
                let dst = ((cell_lat - meta.site_lat).powi(2)
                    + (cell_lon - meta.site_lon).powi(2))
                .sqrt();
                // 105/-15 instead of a plain 90 peak so the edges go NaN.
                let el = 105.0 * (-dst * dst / (2.0 * sigma * sigma)).exp() - 15.0;
                let el = if el < 0.0 { f64::NAN } else { el };

                if a == 1 && r < rows && c < cols {
                    elevation[[r, c]] = el;
                    let north = cell_lat - meta.site_lat;
                    let east = cell_lon - meta.site_lon;
                    // Clockwise-from-north azimuth.
                    let az = -(-east).atan2(north).to_degrees();
                    azimuth[[r, c]] = if az < 0.0 { az + 360.0 } else { az };
                }
                lat[[a, r, c]] = if el.is_nan() { f64::NAN } else { cell_lat };
                lon[[a, r, c]] = if el.is_nan() { f64::NAN } else { cell_lon };
            }
        }
    }

    Skymap::new(
        ALTITUDES_KM.to_vec(),
        lat,
        lon,
        elevation,
        azimuth,
        meta.site_lat,
        meta.site_lon,
        meta.site_alt_km,
        GridOrientation::default(),
    )
}

/// Synthetic image source: hour-long "files" at a 10 s cadence.
pub struct SyntheticSource {
    query: TimeQuery,
    resolution: (usize, usize),
}

impl SyntheticSource {
    pub fn new(query: TimeQuery) -> Self {
        Self {
            query,
            resolution: (RESOLUTION, RESOLUTION),
        }
    }

    /// One hour of images starting at `file_start`, restricted to
    /// [start, end]. The pattern is a bright row and dimmer column whose
    /// position advances with seconds-since-file-start.
    fn file_chunk(
        &self,
        file_start: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<ImageChunk> {
        let (rows, cols) = self.resolution;
        let step = Duration::seconds(CADENCE_S as i64);
        let mut times = Vec::new();
        let mut t = file_start;
        while t < file_start + Duration::hours(1) {
            if t >= start && t <= end {
                times.push(t);
            }
            t += step;
        }
        if times.is_empty() {
            return None;
        }

        let mut images = Array3::zeros((times.len(), rows, cols));
        for (i, time) in times.iter().enumerate() {
            let sec = (*time - file_start).num_seconds() as usize;
            for c in 0..cols {
                images[[i, sec % rows, c]] = 255.0;
            }
            for r in 0..rows {
                images[[i, r, sec % cols]] = 100.0;
            }
        }
        Some(ImageChunk { times, images })
    }
}

impl ImageSource for SyntheticSource {
    fn resolution(&self) -> (usize, usize) {
        self.resolution
    }

    fn cadence_s(&self) -> f64 {
        CADENCE_S
    }

    fn time_range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        match self.query {
            TimeQuery::Single(t) => (t, t),
            TimeQuery::Range(start, end) => (start, end),
        }
    }

    fn chunks(&self) -> AsiResult<Box<dyn Iterator<Item = AsiResult<ImageChunk>> + '_>> {
        let (start, end) = match self.query {
            TimeQuery::Single(t) => {
                // The single image nearest to t on the cadence grid.
                let snapped = t
                    .duration_round(Duration::seconds(CADENCE_S as i64))
                    .map_err(|e| AsiError::Configuration(format!("Bad query time: {}", e)))?;
                (snapped, snapped)
            }
            TimeQuery::Range(start, end) => (start, end),
        };

        let first_file = start
            .duration_trunc(Duration::hours(1))
            .map_err(|e| AsiError::Configuration(format!("Bad query time: {}", e)))?;
        let n_files = ((end - first_file).num_seconds() / 3600) + 1;

        let chunks: Vec<AsiResult<ImageChunk>> = (0..n_files)
            .filter_map(|i| self.file_chunk(first_file + Duration::hours(i), start, end))
            .map(Ok)
            .collect();
        Ok(Box::new(chunks.into_iter()))
    }
}

/// Skymap source with a fixed calibration epoch history.
pub struct SyntheticSkymaps {
    meta: ImagerMeta,
    pixel_center: bool,
    epochs: Vec<DateTime<Utc>>,
}

impl SyntheticSkymaps {
    pub fn new(meta: ImagerMeta, pixel_center: bool) -> Self {
        let epochs = [2010, 2015, 2020]
            .iter()
            .map(|&y| Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap())
            .collect();
        Self {
            meta,
            pixel_center,
            epochs,
        }
    }
}

impl SkymapSource for SyntheticSkymaps {
    fn epochs(&self) -> &[DateTime<Utc>] {
        &self.epochs
    }

    fn load_epoch(&self, index: usize) -> AsiResult<Skymap> {
        if index >= self.epochs.len() {
            return Err(AsiError::Configuration(format!(
                "Calibration epoch index {} out of range ({} epochs)",
                index,
                self.epochs.len()
            )));
        }
        synthetic_skymap(&self.meta, self.pixel_center)
    }
}

/// Assemble a complete synthetic [`Imager`].
pub fn synthetic_imager(
    station: SyntheticStation,
    query: TimeQuery,
    pixel_center: bool,
) -> AsiResult<Imager> {
    let meta = station.meta();
    let reference_time = match query {
        TimeQuery::Single(t) => t,
        TimeQuery::Range(start, _) => start,
    };
    let skymap = SyntheticSkymaps::new(meta.clone(), pixel_center).load(reference_time)?;
    let source = SyntheticSource::new(query);
    Imager::new(meta, skymap, Box::new(source))
}

/// A precessing polar-orbit footprint for conjunction tests: latitude
/// oscillates with the orbital period while longitude drifts westward.
pub fn synthetic_footprint(
    center_lon: f64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    cadence_s: f64,
    precession_rate_deg_per_hour: f64,
    alt_km: f64,
) -> AsiResult<GroundTrack> {
    const ORBIT_PERIOD_S: f64 = 5400.0;

    let mut times = Vec::new();
    let mut lats = Vec::new();
    let mut lons = Vec::new();
    let mut alts = Vec::new();

    let mut t = start;
    while t <= end {
        let dt = (t - start).num_milliseconds() as f64 / 1000.0;
        let phase = 2.0 * std::f64::consts::PI * dt / ORBIT_PERIOD_S;
        lats.push(85.0 * phase.sin());
        lons.push(crate::core::skymap::normalize_lon(
            center_lon + precession_rate_deg_per_hour * dt / 3600.0,
        ));
        alts.push(alt_km);
        times.push(t);
        t += Duration::milliseconds((cadence_s * 1000.0) as i64);
    }

    GroundTrack::new(times, lats, lons, alts)
}
