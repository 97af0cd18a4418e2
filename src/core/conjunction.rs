use crate::core::geometry::{haversine, PixelResolver};
use crate::core::imager::Imager;
use crate::core::skymap::normalize_lon;
use crate::types::{
    AsiError, AsiResult, ConjunctionInterval, GroundTrack, PixelCoord, EARTH_RADIUS_KM,
};
use std::collections::HashMap;

/// Query points farther than this (degree space) from any finite skymap
/// cell are treated as outside the field of view.
const NEAREST_CELL_THRESHOLD_DEG: f64 = 10.0;

/// Azimuth/elevation mapping of a ground track through one imager's
/// skymap. Entries are index-aligned with the track; samples outside the
/// field of view carry NaN angles and no pixel.
#[derive(Debug, Clone)]
pub struct AzElPixels {
    pub azimuths: Vec<f64>,
    pub elevations: Vec<f64>,
    pub pixels: Vec<Option<PixelCoord>>,
}

/// Conjunction engine between one imager and one moving ground track.
///
/// Owns a per-altitude cache of pixel resolvers; each k-d tree is built
/// once per skymap+altitude and reused across the whole track.
pub struct Conjunction<'a> {
    imager: &'a Imager,
    track: GroundTrack,
    resolvers: HashMap<usize, PixelResolver>,
}

impl<'a> Conjunction<'a> {
    pub fn new(imager: &'a Imager, track: GroundTrack) -> Self {
        Self {
            imager,
            track,
            resolvers: HashMap::new(),
        }
    }

    pub fn track(&self) -> &GroundTrack {
        &self.track
    }

    /// Resample the ground track onto the imager's own timestamps by
    /// per-axis linear interpolation, restricted to the overlap of both
    /// time ranges.
    ///
    /// Longitudes are unwrapped across the antimeridian first: a jump
    /// larger than 180° between consecutive samples is treated as a wrap,
    /// not a real jump. That unwrapping is lossy for tracks that wind
    /// around more than once, so it logs a warning when triggered.
    pub fn interp_sat(&self) -> AsiResult<GroundTrack> {
        let data = self.imager.data()?;
        let (track_start, track_end) = self.track.time_range();

        let imager_times: Vec<_> = data
            .times
            .iter()
            .copied()
            .filter(|&t| t >= track_start && t <= track_end)
            .collect();
        if imager_times.is_empty() {
            return Err(AsiError::DataNotFound(
                "The imager and ground track time ranges don't overlap".to_string(),
            ));
        }

        let unwrapped = unwrap_lons(&self.track.lons);

        let epoch = self.track.times[0];
        let xs: Vec<f64> = self
            .track
            .times
            .iter()
            .map(|&t| (t - epoch).num_milliseconds() as f64 / 1000.0)
            .collect();

        let mut lats = Vec::with_capacity(imager_times.len());
        let mut lons = Vec::with_capacity(imager_times.len());
        let mut alts = Vec::with_capacity(imager_times.len());
        for &t in &imager_times {
            let x = (t - epoch).num_milliseconds() as f64 / 1000.0;
            lats.push(interp_linear(&xs, &self.track.lats, x));
            lons.push(normalize_lon(interp_linear(&xs, &unwrapped, x)));
            alts.push(interp_linear(&xs, &self.track.alts_km, x));
        }

        GroundTrack::new(imager_times, lats, lons, alts)
    }

    /// Map every track sample to the nearest skymap cell at the sample's
    /// altitude and report that cell's (azimuth, elevation) and image
    /// pixel.
    ///
    /// A sample directly overhead lands at elevation ≈ 90° and a pixel
    /// within about one pixel of the image center; the skymap grid is
    /// discrete, so exact center is not guaranteed.
    pub fn map_azel(&mut self) -> AsiResult<AzElPixels> {
        let n = self.track.len();
        let mut azimuths = Vec::with_capacity(n);
        let mut elevations = Vec::with_capacity(n);
        let mut pixels = Vec::with_capacity(n);

        for i in 0..n {
            let (lat, lon) = (self.track.lats[i], self.track.lons[i]);
            let alt_index = self.imager.skymap().altitude_index(self.track.alts_km[i])?;
            let resolver = self.resolver(alt_index)?;
            let (pixel, distance) = resolver.nearest_pixel(lat, lon)?;

            if distance > NEAREST_CELL_THRESHOLD_DEG {
                azimuths.push(f64::NAN);
                elevations.push(f64::NAN);
                pixels.push(None);
                continue;
            }
            azimuths.push(self.imager.skymap().azimuth()[[pixel.row, pixel.col]]);
            elevations.push(self.imager.skymap().elevation()[[pixel.row, pixel.col]]);
            pixels.push(Some(pixel));
        }

        Ok(AzElPixels {
            azimuths,
            elevations,
            pixels,
        })
    }

    /// Find the intervals where the track sits above `min_el` inside the
    /// field of view.
    ///
    /// Contiguous above-threshold runs become intervals with inclusive
    /// start/end indices into this conjunction's track. Runs separated by
    /// even a single below-threshold sample stay separate. No matching
    /// run yields an empty vector, not an error.
    pub fn find(&mut self, min_el: f64) -> AsiResult<Vec<ConjunctionInterval>> {
        let azel = self.map_azel()?;
        let mut intervals = Vec::new();
        let mut run_start: Option<usize> = None;

        for (i, &el) in azel.elevations.iter().enumerate() {
            let above = el >= min_el; // NaN compares false
            match (above, run_start) {
                (true, None) => run_start = Some(i),
                (false, Some(start)) => {
                    intervals.push(self.interval(start, i - 1));
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            intervals.push(self.interval(start, self.track.len() - 1));
        }

        log::info!(
            "Found {} conjunction(s) above {}° elevation for {}/{}",
            intervals.len(),
            min_el,
            self.imager.meta().array,
            self.imager.meta().location
        );
        Ok(intervals)
    }

    /// Image intensity along the track.
    ///
    /// With `box_km = None` the single nearest pixel is read. Otherwise
    /// the mean over a (width, height) kilometer box centered on the
    /// nearest pixel is taken, with the box converted to a per-sample
    /// pixel span from the local ground-sampling distance: pixels near
    /// the horizon cover far more ground than pixels near zenith, so a
    /// fixed-kilometer box spans fewer pixels at high elevation. Boxes
    /// partially off-image are truncated to their in-bounds pixels.
    ///
    /// Samples with no usable pixel or no image at their timestamp give
    /// NaN, never an error.
    pub fn intensity(&mut self, box_km: Option<(f64, f64)>) -> AsiResult<Vec<f64>> {
        let azel = self.map_azel()?;
        let data = self.imager.data()?;
        let cadence_ms = (self.imager.meta().cadence_s * 1000.0) as i64;
        let (rows, cols) = self.imager.meta().resolution;

        let mut out = Vec::with_capacity(self.track.len());
        for i in 0..self.track.len() {
            let pixel = match azel.pixels[i] {
                Some(p) => p,
                None => {
                    out.push(f64::NAN);
                    continue;
                }
            };
            // Nearest image at the sample's timestamp, within one cadence.
            let img_index = match nearest_time_index(&data.times, self.track.times[i], cadence_ms)
            {
                Some(idx) => idx,
                None => {
                    out.push(f64::NAN);
                    continue;
                }
            };

            match box_km {
                None => {
                    out.push(data.images[[img_index, pixel.row, pixel.col]] as f64);
                }
                Some((width_km, height_km)) => {
                    let (half_rows, half_cols) =
                        self.box_half_extent(i, pixel, width_km, height_km)?;
                    let r0 = pixel.row.saturating_sub(half_rows);
                    let r1 = (pixel.row + half_rows).min(rows - 1);
                    let c0 = pixel.col.saturating_sub(half_cols);
                    let c1 = (pixel.col + half_cols).min(cols - 1);

                    let mut sum = 0.0f64;
                    let mut count = 0usize;
                    for r in r0..=r1 {
                        for c in c0..=c1 {
                            let v = data.images[[img_index, r, c]];
                            if v.is_finite() {
                                sum += v as f64;
                                count += 1;
                            }
                        }
                    }
                    out.push(if count == 0 { f64::NAN } else { sum / count as f64 });
                }
            }
        }
        Ok(out)
    }

    /// Convert a kilometer box to pixel half-extents at one track sample
    /// using the ground distance between adjacent skymap cells there.
    fn box_half_extent(
        &self,
        sample: usize,
        pixel: PixelCoord,
        width_km: f64,
        height_km: f64,
    ) -> AsiResult<(usize, usize)> {
        let layer = self.imager.skymap().layer(self.track.alts_km[sample])?;
        let (grows, gcols) = layer.grid_shape();
        let r = pixel.row.min(grows - 2);
        let c = pixel.col.min(gcols - 2);

        let km_per_row = haversine(
            layer.lat[[r, c]],
            layer.lon[[r, c]],
            layer.lat[[r + 1, c]],
            layer.lon[[r + 1, c]],
            EARTH_RADIUS_KM,
        );
        let km_per_col = haversine(
            layer.lat[[r, c]],
            layer.lon[[r, c]],
            layer.lat[[r, c + 1]],
            layer.lon[[r, c + 1]],
            EARTH_RADIUS_KM,
        );

        let half = |box_km: f64, km_per_px: f64| -> usize {
            if !km_per_px.is_finite() || km_per_px <= 0.0 {
                return 1;
            }
            ((0.5 * box_km / km_per_px).round() as usize).max(1)
        };
        Ok((half(height_km, km_per_row), half(width_km, km_per_col)))
    }

    fn interval(&self, start: usize, end: usize) -> ConjunctionInterval {
        ConjunctionInterval {
            start_time: self.track.times[start],
            end_time: self.track.times[end],
            start_index: start,
            end_index: end,
        }
    }

    fn resolver(&mut self, alt_index: usize) -> AsiResult<&PixelResolver> {
        if !self.resolvers.contains_key(&alt_index) {
            let alt = self.imager.skymap().altitudes_km()[alt_index];
            let layer = self.imager.skymap().layer(alt)?;
            let resolver = PixelResolver::build(&layer)?;
            self.resolvers.insert(alt_index, resolver);
        }
        Ok(&self.resolvers[&alt_index])
    }
}

/// Unwrap longitudes so consecutive samples never jump by more than 180°.
/// Logs a warning when a wrap is detected; the result can be wrong for
/// tracks that wind around the globe more than once between samples.
fn unwrap_lons(lons: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(lons.len());
    let mut offset = 0.0;
    let mut wrapped = false;

    for (i, &lon) in lons.iter().enumerate() {
        if i > 0 {
            let jump = lon - lons[i - 1];
            if jump > 180.0 {
                offset -= 360.0;
                wrapped = true;
            } else if jump < -180.0 {
                offset += 360.0;
                wrapped = true;
            }
        }
        out.push(lon + offset);
    }

    if wrapped {
        log::warn!(
            "The ground track crosses the ±180° longitude discontinuity; \
             unwrapping before interpolation (lossy beyond a single wrap)"
        );
    }
    out
}

/// Linear interpolation of `ys` over sorted sample positions `xs`,
/// clamped at both ends.
fn interp_linear(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[xs.len() - 1] {
        return ys[ys.len() - 1];
    }
    let j = xs.partition_point(|&v| v <= x);
    let (x0, x1) = (xs[j - 1], xs[j]);
    let (y0, y1) = (ys[j - 1], ys[j]);
    if x1 == x0 {
        return y0;
    }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// Index of the timestamp nearest to `target`, if within `tolerance_ms`.
fn nearest_time_index(
    times: &[chrono::DateTime<chrono::Utc>],
    target: chrono::DateTime<chrono::Utc>,
    tolerance_ms: i64,
) -> Option<usize> {
    if times.is_empty() {
        return None;
    }
    let j = times.partition_point(|&t| t <= target);
    let candidates = [j.checked_sub(1), (j < times.len()).then_some(j)];
    candidates
        .iter()
        .flatten()
        .copied()
        .min_by_key(|&i| (times[i] - target).num_milliseconds().abs())
        .filter(|&i| (times[i] - target).num_milliseconds().abs() <= tolerance_ms)
}
