use crate::types::{AsiError, AsiResult, MapGrid, MapGridStack};
use ndarray::{Array2, Axis};

/// Axis reversals applied once at load time so that row-major image
/// indexing lines up with the mapping arrays' native storage order.
/// THEMIS/REGO calibration files store latitude rows south-up; TREx files
/// are flipped in both axes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridOrientation {
    pub flip_rows: bool,
    pub flip_cols: bool,
}

/// Per-pixel geographic/angular calibration lookup table.
///
/// Latitude and longitude are stacked by altitude layer with shape
/// `(n_altitudes, rows + p, cols + p)` where `p == 1` for pixel-corner
/// maps and `p == 0` for pixel-center maps. Elevation and azimuth are
/// altitude-independent with the image shape `(rows, cols)`. Cells outside
/// the usable field of view are NaN. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Skymap {
    altitudes_km: Vec<f64>,
    lat: MapGridStack,
    lon: MapGridStack,
    elevation: MapGrid,
    azimuth: MapGrid,
    pub site_lat: f64,
    pub site_lon: f64,
    pub site_alt_km: f64,
    pixel_center: bool,
}

/// Borrowed view of one altitude layer of a [`Skymap`].
#[derive(Debug, Clone, Copy)]
pub struct SkymapLayer<'a> {
    pub altitude_km: f64,
    pub lat: ndarray::ArrayView2<'a, f64>,
    pub lon: ndarray::ArrayView2<'a, f64>,
    pub elevation: &'a MapGrid,
    pub azimuth: &'a MapGrid,
    pub pixel_center: bool,
}

impl<'a> SkymapLayer<'a> {
    /// Shape of the lat/lon grid (equals the image shape for pixel-center
    /// maps, one larger per dimension for pixel-corner maps).
    pub fn grid_shape(&self) -> (usize, usize) {
        self.lat.dim()
    }

    /// Shape of the image the layer calibrates.
    pub fn image_shape(&self) -> (usize, usize) {
        self.elevation.dim()
    }
}

impl Skymap {
    /// Build a skymap from calibration arrays.
    ///
    /// Longitudes are normalized to [-180, 180) and the requested axis
    /// reversals are applied here, once, never per query.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        altitudes_km: Vec<f64>,
        mut lat: MapGridStack,
        mut lon: MapGridStack,
        mut elevation: MapGrid,
        mut azimuth: MapGrid,
        site_lat: f64,
        site_lon: f64,
        site_alt_km: f64,
        orientation: GridOrientation,
    ) -> AsiResult<Self> {
        if altitudes_km.is_empty() {
            return Err(AsiError::Configuration(
                "A skymap needs at least one calibrated altitude".to_string(),
            ));
        }
        if lat.dim() != lon.dim() {
            return Err(AsiError::Configuration(format!(
                "Latitude and longitude grids differ in shape: {:?} vs {:?}",
                lat.dim(),
                lon.dim()
            )));
        }
        if elevation.dim() != azimuth.dim() {
            return Err(AsiError::Configuration(format!(
                "Elevation and azimuth grids differ in shape: {:?} vs {:?}",
                elevation.dim(),
                azimuth.dim()
            )));
        }
        let (n_alts, grid_rows, grid_cols) = lat.dim();
        if n_alts != altitudes_km.len() {
            return Err(AsiError::Configuration(format!(
                "{} altitude layers but {} altitudes listed",
                n_alts,
                altitudes_km.len()
            )));
        }
        let (img_rows, img_cols) = elevation.dim();
        let pixel_center = if grid_rows == img_rows && grid_cols == img_cols {
            true
        } else if grid_rows == img_rows + 1 && grid_cols == img_cols + 1 {
            false
        } else {
            return Err(AsiError::Configuration(format!(
                "Lat/lon grid {:?} matches neither pixel centers {:?} nor corners",
                (grid_rows, grid_cols),
                (img_rows, img_cols)
            )));
        };

        if orientation.flip_rows {
            lat.invert_axis(Axis(1));
            lon.invert_axis(Axis(1));
            elevation.invert_axis(Axis(0));
            azimuth.invert_axis(Axis(0));
        }
        if orientation.flip_cols {
            lat.invert_axis(Axis(2));
            lon.invert_axis(Axis(2));
            elevation.invert_axis(Axis(1));
            azimuth.invert_axis(Axis(1));
        }

        // Some calibration sources use the [0, 360) longitude convention.
        lon.mapv_inplace(normalize_lon);

        Ok(Self {
            altitudes_km,
            lat,
            lon,
            elevation,
            azimuth,
            site_lat,
            site_lon,
            site_alt_km,
            pixel_center,
        })
    }

    pub fn altitudes_km(&self) -> &[f64] {
        &self.altitudes_km
    }

    pub fn pixel_center(&self) -> bool {
        self.pixel_center
    }

    pub fn image_shape(&self) -> (usize, usize) {
        self.elevation.dim()
    }

    pub fn elevation(&self) -> &MapGrid {
        &self.elevation
    }

    pub fn azimuth(&self) -> &MapGrid {
        &self.azimuth
    }

    pub fn lat_stack(&self) -> &MapGridStack {
        &self.lat
    }

    pub fn lon_stack(&self) -> &MapGridStack {
        &self.lon
    }

    /// Index of `alt_km` in the discrete altitude set.
    ///
    /// Calibration files only contain a fixed small set of altitudes
    /// (typically 90/110/150 km); no interpolation is performed between
    /// them, so anything else is a configuration error.
    pub fn altitude_index(&self, alt_km: f64) -> AsiResult<usize> {
        self.altitudes_km
            .iter()
            .position(|&a| (a - alt_km).abs() < 1e-6)
            .ok_or_else(|| {
                AsiError::Configuration(format!(
                    "{} km is not in the skymap altitudes: {:?} km",
                    alt_km, self.altitudes_km
                ))
            })
    }

    /// Borrow the lat/lon/el/az arrays at one reference altitude.
    pub fn layer(&self, alt_km: f64) -> AsiResult<SkymapLayer<'_>> {
        let idx = self.altitude_index(alt_km)?;
        Ok(SkymapLayer {
            altitude_km: self.altitudes_km[idx],
            lat: self.lat.index_axis(Axis(0), idx),
            lon: self.lon.index_axis(Axis(0), idx),
            elevation: &self.elevation,
            azimuth: &self.azimuth,
            pixel_center: self.pixel_center,
        })
    }

    /// Copy of this skymap with lat/lon set to NaN wherever the elevation
    /// is below `min_elevation` or undefined.
    ///
    /// With a pixel-corner grid the bottom and right corner duplicates of
    /// a masked cell are masked as well, so the whole quadrilateral of a
    /// low-elevation pixel disappears.
    pub fn mask_low_horizon(&self, min_elevation: f64) -> Skymap {
        let mut masked = self.clone();
        let (img_rows, img_cols) = self.elevation.dim();
        let pad = if self.pixel_center { 0 } else { 1 };

        for r in 0..img_rows {
            for c in 0..img_cols {
                let el = self.elevation[[r, c]];
                if el.is_nan() || el < min_elevation {
                    for a in 0..self.altitudes_km.len() {
                        masked.lat[[a, r, c]] = f64::NAN;
                        masked.lon[[a, r, c]] = f64::NAN;
                        if pad == 1 {
                            masked.lat[[a, r + 1, c]] = f64::NAN;
                            masked.lon[[a, r + 1, c]] = f64::NAN;
                            masked.lat[[a, r, c + 1]] = f64::NAN;
                            masked.lon[[a, r, c + 1]] = f64::NAN;
                        }
                    }
                }
            }
        }
        masked
    }
}

impl Skymap {
    /// Copy of this skymap with lat/lon set to NaN, across all altitude
    /// layers, wherever `keep(lat, lon)` is false. Cells already NaN stay
    /// NaN.
    pub fn retain_cells<F: Fn(f64, f64) -> bool>(&self, keep: F) -> Skymap {
        let mut masked = self.clone();
        let (n_alts, grows, gcols) = self.lat.dim();
        for a in 0..n_alts {
            for r in 0..grows {
                for c in 0..gcols {
                    let lat = self.lat[[a, r, c]];
                    let lon = self.lon[[a, r, c]];
                    if lat.is_finite() && lon.is_finite() && !keep(lat, lon) {
                        masked.lat[[a, r, c]] = f64::NAN;
                        masked.lon[[a, r, c]] = f64::NAN;
                    }
                }
            }
        }
        masked
    }
}

/// Map a longitude from any convention onto [-180, 180). NaN passes
/// through untouched.
pub fn normalize_lon(lon: f64) -> f64 {
    if lon.is_nan() {
        return lon;
    }
    ((lon + 180.0).rem_euclid(360.0)) - 180.0
}

/// Convenience constructor for a single-altitude skymap stored as 2D
/// lat/lon grids (how most per-epoch calibration files arrive).
#[allow(clippy::too_many_arguments)]
pub fn single_altitude_skymap(
    alt_km: f64,
    lat: Array2<f64>,
    lon: Array2<f64>,
    elevation: MapGrid,
    azimuth: MapGrid,
    site_lat: f64,
    site_lon: f64,
    site_alt_km: f64,
    orientation: GridOrientation,
) -> AsiResult<Skymap> {
    let (rows, cols) = lat.dim();
    let lat3 = lat.into_shape((1, rows, cols)).map_err(|e| {
        AsiError::Configuration(format!("Failed to stack latitude grid: {}", e))
    })?;
    let lon3 = lon.into_shape((1, rows, cols)).map_err(|e| {
        AsiError::Configuration(format!("Failed to stack longitude grid: {}", e))
    })?;
    Skymap::new(
        vec![alt_km],
        lat3,
        lon3,
        elevation,
        azimuth,
        site_lat,
        site_lon,
        site_alt_km,
        orientation,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    fn small_skymap(pixel_center: bool) -> Skymap {
        let pad = if pixel_center { 0 } else { 1 };
        let g = 4 + pad;
        let mut lat = Array3::zeros((2, g, g));
        let mut lon = Array3::zeros((2, g, g));
        for a in 0..2 {
            for r in 0..g {
                for c in 0..g {
                    lat[[a, r, c]] = 50.0 + r as f64 + 0.1 * a as f64;
                    lon[[a, r, c]] = 260.0 + c as f64; // [0, 360) convention
                }
            }
        }
        let elevation = Array2::from_elem((4, 4), 45.0);
        let azimuth = Array2::from_elem((4, 4), 180.0);
        Skymap::new(
            vec![90.0, 110.0],
            lat,
            lon,
            elevation,
            azimuth,
            51.0,
            -100.0,
            0.2,
            GridOrientation::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_altitude_round_trip() {
        let skymap = small_skymap(true);
        for (i, alt) in skymap.altitudes_km().to_vec().into_iter().enumerate() {
            let layer = skymap.layer(alt).unwrap();
            assert_eq!(
                layer.lat,
                skymap.lat_stack().index_axis(Axis(0), i),
                "layer lookup must equal the raw slice at index {}",
                i
            );
        }
    }

    #[test]
    fn test_missing_altitude_is_configuration_error() {
        let skymap = small_skymap(true);
        let err = skymap.layer(150.0).unwrap_err();
        assert!(matches!(err, AsiError::Configuration(_)));
    }

    #[test]
    fn test_longitude_normalized_to_180_convention() {
        let skymap = small_skymap(true);
        let layer = skymap.layer(110.0).unwrap();
        // 260 E becomes -100.
        assert!((layer.lon[[0, 0]] + 100.0).abs() < 1e-9);
        assert!(layer.lon.iter().all(|&l| (-180.0..180.0).contains(&l)));
    }

    #[test]
    fn test_corner_grid_detected() {
        let skymap = small_skymap(false);
        assert!(!skymap.pixel_center());
        assert_eq!(skymap.image_shape(), (4, 4));
        let layer = skymap.layer(90.0).unwrap();
        assert_eq!(layer.grid_shape(), (5, 5));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let lat = Array3::zeros((1, 6, 4));
        let lon = Array3::zeros((1, 6, 4));
        let elevation = Array2::zeros((4, 4));
        let azimuth = Array2::zeros((4, 4));
        let result = Skymap::new(
            vec![110.0],
            lat,
            lon,
            elevation,
            azimuth,
            0.0,
            0.0,
            0.0,
            GridOrientation::default(),
        );
        assert!(matches!(result, Err(AsiError::Configuration(_))));
    }

    #[test]
    fn test_row_flip_applied_once_at_load() {
        let mut lat = Array3::zeros((1, 2, 2));
        lat[[0, 0, 0]] = 1.0;
        lat[[0, 0, 1]] = 2.0;
        lat[[0, 1, 0]] = 3.0;
        lat[[0, 1, 1]] = 4.0;
        let lon = Array3::zeros((1, 2, 2));
        let elevation = Array2::zeros((2, 2));
        let azimuth = Array2::zeros((2, 2));
        let skymap = Skymap::new(
            vec![110.0],
            lat,
            lon,
            elevation,
            azimuth,
            0.0,
            0.0,
            0.0,
            GridOrientation {
                flip_rows: true,
                flip_cols: false,
            },
        )
        .unwrap();
        let layer = skymap.layer(110.0).unwrap();
        assert_eq!(layer.lat[[0, 0]], 3.0);
        assert_eq!(layer.lat[[1, 1]], 2.0);
    }

    #[test]
    fn test_mask_low_horizon_corner_boundary() {
        let mut skymap = small_skymap(false);
        skymap.elevation[[0, 0]] = 1.0;
        let masked = skymap.mask_low_horizon(10.0);
        let layer = masked.layer(110.0).unwrap();
        assert!(layer.lat[[0, 0]].is_nan());
        // Corner duplicates of the masked pixel go too.
        assert!(layer.lat[[1, 0]].is_nan());
        assert!(layer.lat[[0, 1]].is_nan());
        // An untouched pixel keeps its coordinates.
        assert!(layer.lat[[3, 3]].is_finite());
    }

    #[test]
    fn test_normalize_lon() {
        assert!((normalize_lon(260.0) + 100.0).abs() < 1e-12);
        assert!((normalize_lon(-100.0) + 100.0).abs() < 1e-12);
        assert!((normalize_lon(180.0) + 180.0).abs() < 1e-12);
        assert!(normalize_lon(f64::NAN).is_nan());
    }
}
