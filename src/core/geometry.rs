use crate::core::skymap::SkymapLayer;
use crate::types::{AsiError, AsiResult, PixelCoord};
use kiddo::{KdTree, SquaredEuclidean};
use num_traits::Float;

/// Haversine distance between two points on a sphere of radius `r`.
/// Inputs in degrees. NaN in produces NaN out.
pub fn haversine<F: Float>(lat1: F, lon1: F, lat2: F, lon2: F, r: F) -> F {
    let two = F::one() + F::one();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let lon1 = lon1.to_radians();
    let lon2 = lon2.to_radians();

    let sin_dlat = ((lat1 - lat2) / two).sin();
    let sin_dlon = ((lon2 - lon1) / two).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    two * r * h.sqrt().asin()
}

/// Result of mapping a lat/lon path onto skymap pixels.
///
/// `pixels` only contains the points that matched a skymap cell within the
/// distance threshold; `valid` maps each entry back to its index in the
/// original query order. Callers must never assume `pixels.len()` equals
/// the query length.
#[derive(Debug, Clone)]
pub struct PathPixels {
    pub pixels: Vec<PixelCoord>,
    pub valid: Vec<usize>,
    /// Degree-space distance from each query point to its matched cell
    pub distances_deg: Vec<f64>,
}

/// Nearest-pixel spatial index over one skymap altitude layer.
///
/// The k-d tree is built once over all finite (lat, lon) cells; rebuild it
/// only when the skymap or altitude changes. Conjunction analysis over
/// long ground tracks queries this tree per sample, so callers should
/// cache it per skymap+altitude.
pub struct PixelResolver {
    tree: KdTree<f64, 2>,
    grid_shape: (usize, usize),
    image_shape: (usize, usize),
    pixel_center: bool,
}

impl PixelResolver {
    /// Index every finite cell of the layer's lat/lon grids.
    pub fn build(layer: &SkymapLayer) -> AsiResult<Self> {
        let grid_shape = layer.grid_shape();
        let image_shape = layer.image_shape();
        let mut tree: KdTree<f64, 2> = KdTree::new();

        for ((r, c), &lat) in layer.lat.indexed_iter() {
            let lon = layer.lon[[r, c]];
            if lat.is_finite() && lon.is_finite() {
                tree.add(&[lat, lon], (r * grid_shape.1 + c) as u64);
            }
        }

        if tree.size() == 0 {
            return Err(AsiError::Geometry(
                "The skymap layer has no finite lat/lon cells".to_string(),
            ));
        }

        log::debug!(
            "Built pixel resolver over {} finite cells ({}x{} grid)",
            tree.size(),
            grid_shape.0,
            grid_shape.1
        );

        Ok(Self {
            tree,
            grid_shape,
            image_shape,
            pixel_center: layer.pixel_center,
        })
    }

    /// Nearest valid image pixel for a single query point, with its
    /// degree-space distance. Does not apply a distance threshold.
    pub fn nearest_pixel(&self, lat: f64, lon: f64) -> AsiResult<(PixelCoord, f64)> {
        validate_point(lat, lon)?;
        let nearest = self.tree.nearest_one::<SquaredEuclidean>(&[lat, lon]);
        let pixel = self.clamp_to_image(nearest.item);
        Ok((pixel, nearest.distance.sqrt()))
    }

    /// Map a sequence of (lat, lon) points to their nearest valid skymap
    /// pixels.
    ///
    /// Points farther than `threshold_deg` (Euclidean in lat/lon degree
    /// space, an approximation acceptable at the imager's spatial scale)
    /// from any finite cell are excluded from the output.
    pub fn resolve(&self, path: &[(f64, f64)], threshold_deg: f64) -> AsiResult<PathPixels> {
        if path.is_empty() {
            return Err(AsiError::Geometry("The path is empty".to_string()));
        }
        for &(lat, lon) in path {
            validate_point(lat, lon)?;
        }

        let mut pixels = Vec::with_capacity(path.len());
        let mut valid = Vec::with_capacity(path.len());
        let mut distances_deg = Vec::with_capacity(path.len());
        let mut skipped = 0usize;

        for (i, &(lat, lon)) in path.iter().enumerate() {
            let nearest = self.tree.nearest_one::<SquaredEuclidean>(&[lat, lon]);
            let distance = nearest.distance.sqrt();
            if distance > threshold_deg {
                skipped += 1;
                continue;
            }
            pixels.push(self.clamp_to_image(nearest.item));
            valid.push(i);
            distances_deg.push(distance);
        }

        if skipped > 0 {
            log::warn!(
                "{} of {} path points were farther than {} degrees from the \
                 nearest skymap cell and were dropped",
                skipped,
                path.len(),
                threshold_deg
            );
        }
        if pixels.is_empty() {
            return Err(AsiError::Geometry(
                "The path is completely outside of the skymap".to_string(),
            ));
        }

        Ok(PathPixels {
            pixels,
            valid,
            distances_deg,
        })
    }

    /// Convert a flat grid index into an image pixel, clamping corner-grid
    /// indices that land on the last row/column inward by one cell so they
    /// can safely index the (one smaller) image.
    fn clamp_to_image(&self, flat: u64) -> PixelCoord {
        let mut row = flat as usize / self.grid_shape.1;
        let mut col = flat as usize % self.grid_shape.1;
        if !self.pixel_center {
            if row >= self.grid_shape.0 - 1 {
                row = self.grid_shape.0 - 2;
            }
            if col >= self.grid_shape.1 - 1 {
                col = self.grid_shape.1 - 2;
            }
        }
        PixelCoord {
            row: row.min(self.image_shape.0 - 1),
            col: col.min(self.image_shape.1 - 1),
        }
    }
}

fn validate_point(lat: f64, lon: f64) -> AsiResult<()> {
    if lat.is_nan() || lon.is_nan() {
        return Err(AsiError::Geometry(
            "The lat/lon path can't contain NaNs".to_string(),
        ));
    }
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(AsiError::Geometry(format!(
            "Point ({}, {}) is outside the valid lat/lon domain",
            lat, lon
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::skymap::{GridOrientation, Skymap};
    use crate::types::EARTH_RADIUS_KM;
    use approx::assert_relative_eq;
    use ndarray::{Array2, Array3};

    fn center_skymap() -> Skymap {
        // 8x8 pixel-center grid: lat rows 50..57, lon cols -104..-97.
        let n = 8;
        let mut lat = Array3::zeros((1, n, n));
        let mut lon = Array3::zeros((1, n, n));
        for r in 0..n {
            for c in 0..n {
                lat[[0, r, c]] = 50.0 + r as f64;
                lon[[0, r, c]] = -104.0 + c as f64;
            }
        }
        let elevation = Array2::from_elem((n, n), 45.0);
        let azimuth = Array2::from_elem((n, n), 0.0);
        Skymap::new(
            vec![110.0],
            lat,
            lon,
            elevation,
            azimuth,
            53.5,
            -100.5,
            0.0,
            GridOrientation::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_haversine_quarter_circumference() {
        let d = haversine(0.0, 0.0, 0.0, 90.0, EARTH_RADIUS_KM);
        assert_relative_eq!(
            d,
            std::f64::consts::FRAC_PI_2 * EARTH_RADIUS_KM,
            epsilon = 1e-6
        );
        assert_relative_eq!(haversine(10.0, 20.0, 10.0, 20.0, 1.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_path_on_pixel_centers_is_exact() {
        let skymap = center_skymap();
        let layer = skymap.layer(110.0).unwrap();
        let resolver = PixelResolver::build(&layer).unwrap();

        let path: Vec<(f64, f64)> = (0..8).map(|i| (50.0 + i as f64, -104.0 + i as f64)).collect();
        let resolved = resolver.resolve(&path, 1.0).unwrap();

        assert_eq!(resolved.pixels.len(), path.len());
        assert_eq!(resolved.valid, (0..path.len()).collect::<Vec<_>>());
        for (i, pixel) in resolved.pixels.iter().enumerate() {
            assert_eq!(*pixel, PixelCoord { row: i, col: i });
            assert_relative_eq!(resolved.distances_deg[i], 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_out_of_threshold_points_excluded() {
        let skymap = center_skymap();
        let layer = skymap.layer(110.0).unwrap();
        let resolver = PixelResolver::build(&layer).unwrap();

        let path = vec![(53.0, -101.0), (20.0, -101.0), (54.0, -100.0)];
        let resolved = resolver.resolve(&path, 1.0).unwrap();
        assert_eq!(resolved.pixels.len(), 2);
        assert_eq!(resolved.valid, vec![0, 2]);
    }

    #[test]
    fn test_nan_and_domain_checks() {
        let skymap = center_skymap();
        let layer = skymap.layer(110.0).unwrap();
        let resolver = PixelResolver::build(&layer).unwrap();

        let nan_path = vec![(f64::NAN, -101.0)];
        assert!(matches!(
            resolver.resolve(&nan_path, 1.0),
            Err(AsiError::Geometry(_))
        ));

        let bad_lon = vec![(53.0, 200.0)];
        assert!(matches!(
            resolver.resolve(&bad_lon, 1.0),
            Err(AsiError::Geometry(_))
        ));

        assert!(matches!(
            resolver.resolve(&[], 1.0),
            Err(AsiError::Geometry(_))
        ));
    }

    #[test]
    fn test_all_points_outside_is_error() {
        let skymap = center_skymap();
        let layer = skymap.layer(110.0).unwrap();
        let resolver = PixelResolver::build(&layer).unwrap();

        let path = vec![(10.0, 10.0), (-10.0, 40.0)];
        assert!(matches!(
            resolver.resolve(&path, 1.0),
            Err(AsiError::Geometry(_))
        ));
    }

    #[test]
    fn test_corner_grid_edge_clamped() {
        // 4x4 image with a 5x5 corner grid; a query at the far corner must
        // clamp inside the image bounds.
        let n = 5;
        let mut lat = Array3::zeros((1, n, n));
        let mut lon = Array3::zeros((1, n, n));
        for r in 0..n {
            for c in 0..n {
                lat[[0, r, c]] = 50.0 + r as f64;
                lon[[0, r, c]] = -104.0 + c as f64;
            }
        }
        let elevation = Array2::from_elem((4, 4), 45.0);
        let azimuth = Array2::from_elem((4, 4), 0.0);
        let skymap = Skymap::new(
            vec![110.0],
            lat,
            lon,
            elevation,
            azimuth,
            52.0,
            -102.0,
            0.0,
            GridOrientation::default(),
        )
        .unwrap();
        let layer = skymap.layer(110.0).unwrap();
        let resolver = PixelResolver::build(&layer).unwrap();

        let resolved = resolver.resolve(&[(54.0, -100.0)], 0.5).unwrap();
        assert_eq!(resolved.pixels[0], PixelCoord { row: 3, col: 3 });
    }
}
