use crate::core::geometry::PixelResolver;
use crate::core::imager::Imager;
use crate::types::{AsiError, AsiResult, PixelCoord};
use chrono::{DateTime, Utc};
use ndarray::Array2;

/// Which 1-D slice of each image goes into the time-vs-position array.
#[derive(Debug, Clone)]
pub enum SlicePolicy {
    /// Central column: north-south keogram, latitude axis
    MeridianColumn,
    /// Central row: east-west ewogram, longitude axis
    CentralRow,
    /// Arbitrary lat/lon path resolved through the skymap
    Path(Vec<(f64, f64)>),
}

/// Meaning of the position axis of a built keogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceAxis {
    Latitude,
    Longitude,
    PixelIndex,
}

#[derive(Debug, Clone)]
pub struct KeogramParams {
    /// Reference altitude for the geographic axis. None keeps a raw pixel
    /// index axis.
    pub altitude_km: Option<f64>,
    /// Pixels below this elevation are excluded from the slice
    pub minimum_elevation: f64,
    /// Maximum degree-space distance when resolving a custom path
    pub path_threshold_deg: f64,
}

impl Default for KeogramParams {
    fn default() -> Self {
        Self {
            altitude_km: None,
            minimum_elevation: 0.0,
            path_threshold_deg: 1.0,
        }
    }
}

/// Time-ordered 2D slice of an image series: rows are timestamps, columns
/// are positions along the slice.
#[derive(Debug, Clone)]
pub struct Keogram {
    pub times: Vec<DateTime<Utc>>,
    /// Geographic coordinate (or pixel index) of each column
    pub positions: Vec<f64>,
    /// (time, position)
    pub values: Array2<f32>,
    pub axis: SliceAxis,
}

/// Build a keogram along the central meridian, or along `path` when given.
/// A custom path needs a reference altitude to resolve against.
pub fn build_keogram(
    imager: &Imager,
    path: Option<&[(f64, f64)]>,
    params: &KeogramParams,
) -> AsiResult<Keogram> {
    let policy = match path {
        Some(p) => {
            if params.altitude_km.is_none() {
                return Err(AsiError::Configuration(
                    "A keogram along a path needs the reference altitude".to_string(),
                ));
            }
            SlicePolicy::Path(p.to_vec())
        }
        None => SlicePolicy::MeridianColumn,
    };
    build_slice(imager, &policy, params)
}

/// East-west counterpart of [`build_keogram`]: slices the central row and
/// resolves longitude instead of latitude.
pub fn build_ewogram(imager: &Imager, params: &KeogramParams) -> AsiResult<Keogram> {
    build_slice(imager, &SlicePolicy::CentralRow, params)
}

/// Shared keogram/ewogram pipeline: pick slice pixels, pre-allocate the
/// time buffer from the nominal cadence, stream image chunks, trim gaps.
pub fn build_slice(
    imager: &Imager,
    policy: &SlicePolicy,
    params: &KeogramParams,
) -> AsiResult<Keogram> {
    let (pixels, positions, axis) = slice_pixels(imager, policy, params)?;
    let n_pos = pixels.len();

    log::info!(
        "{} {} slice: {} positions, axis {:?}",
        imager.meta().array,
        imager.meta().location,
        n_pos,
        axis
    );

    // Pre-allocate from the nominal cadence so memory is bounded by the
    // requested time range, not by the file count.
    let capacity = imager.estimate_n_times();
    let mut values = Array2::from_elem((capacity, n_pos), f32::NAN);
    let mut times: Vec<Option<DateTime<Utc>>> = vec![None; capacity];

    let mut cursor = 0usize;
    for chunk in imager.source().chunks()? {
        let chunk = chunk?;
        let n = chunk.times.len();
        if cursor + n > capacity {
            return Err(AsiError::Consistency(format!(
                "Found more image samples than the {} expected from the \
                 nominal {} s cadence; refusing to truncate",
                capacity,
                imager.meta().cadence_s
            )));
        }
        for k in 0..n {
            for (j, p) in pixels.iter().enumerate() {
                values[[cursor + k, j]] = chunk.images[[k, p.row, p.col]];
            }
            times[cursor + k] = Some(chunk.times[k]);
        }
        cursor += n;
    }

    // Drop unfilled rows (cadence gaps) by finiteness of the first column.
    let valid_rows: Vec<usize> = (0..capacity)
        .filter(|&i| times[i].is_some() && !values[[i, 0]].is_nan())
        .collect();

    if valid_rows.is_empty() {
        let (start, end) = imager.source().time_range();
        return Err(AsiError::DataNotFound(format!(
            "The keogram is empty for {}/{} during {} to {}; the images \
             probably don't exist in this time interval",
            imager.meta().array,
            imager.meta().location,
            start,
            end
        )));
    }

    let mut out = Array2::zeros((valid_rows.len(), n_pos));
    let mut out_times = Vec::with_capacity(valid_rows.len());
    for (r, &i) in valid_rows.iter().enumerate() {
        for j in 0..n_pos {
            out[[r, j]] = values[[i, j]];
        }
        out_times.push(times[i].unwrap());
    }

    Ok(Keogram {
        times: out_times,
        positions,
        values: out,
        axis,
    })
}

/// Resolve the slice policy into image pixels and their axis positions,
/// index-aligned after all filtering.
fn slice_pixels(
    imager: &Imager,
    policy: &SlicePolicy,
    params: &KeogramParams,
) -> AsiResult<(Vec<PixelCoord>, Vec<f64>, SliceAxis)> {
    let skymap = imager.skymap();
    let (rows, cols) = imager.meta().resolution;
    let elevation = skymap.elevation();

    // Candidate pixels plus their geographic position (NaN when no
    // altitude was requested; a pixel-index axis is substituted below).
    let (candidates, axis): (Vec<(PixelCoord, f64)>, SliceAxis) = match policy {
        SlicePolicy::MeridianColumn => {
            let col = cols / 2;
            let positions = axis_positions(imager, params.altitude_km, rows, |layer, r| {
                if layer.pixel_center {
                    layer.lat[[r, col]]
                } else {
                    0.5 * (layer.lat[[r, col]] + layer.lat[[r + 1, col]])
                }
            })?;
            (
                (0..rows)
                    .map(|r| (PixelCoord { row: r, col }, positions[r]))
                    .collect(),
                if params.altitude_km.is_some() {
                    SliceAxis::Latitude
                } else {
                    SliceAxis::PixelIndex
                },
            )
        }
        SlicePolicy::CentralRow => {
            let row = rows / 2;
            let positions = axis_positions(imager, params.altitude_km, cols, |layer, c| {
                if layer.pixel_center {
                    layer.lon[[row, c]]
                } else {
                    0.5 * (layer.lon[[row, c]] + layer.lon[[row, c + 1]])
                }
            })?;
            (
                (0..cols)
                    .map(|c| (PixelCoord { row, col: c }, positions[c]))
                    .collect(),
                if params.altitude_km.is_some() {
                    SliceAxis::Longitude
                } else {
                    SliceAxis::PixelIndex
                },
            )
        }
        SlicePolicy::Path(path) => {
            // altitude_km presence was checked by the caller.
            let alt = params.altitude_km.ok_or_else(|| {
                AsiError::Configuration(
                    "A keogram along a path needs the reference altitude".to_string(),
                )
            })?;
            let layer = skymap.layer(alt)?;
            let resolver = PixelResolver::build(&layer)?;
            let resolved = resolver.resolve(path, params.path_threshold_deg)?;
            (
                resolved
                    .pixels
                    .iter()
                    .map(|&p| (p, layer.lat[[p.row, p.col]]))
                    .collect(),
                SliceAxis::Latitude,
            )
        }
    };

    // Minimum-elevation and NaN-position filtering; axis and data stay
    // index-aligned.
    let mut pixels = Vec::new();
    let mut positions = Vec::new();
    for (i, (p, pos)) in candidates.into_iter().enumerate() {
        let el = elevation[[p.row, p.col]];
        if el.is_nan() || el < params.minimum_elevation {
            continue;
        }
        if params.altitude_km.is_some() {
            if pos.is_nan() {
                continue;
            }
            positions.push(pos);
        } else {
            positions.push(i as f64);
        }
        pixels.push(p);
    }

    if pixels.is_empty() {
        return Err(AsiError::Geometry(
            "No slice pixels survive the elevation and field-of-view filters".to_string(),
        ));
    }
    Ok((pixels, positions, axis))
}

/// Per-index axis positions at the requested altitude, or NaN placeholders
/// when no altitude was given.
fn axis_positions<F>(
    imager: &Imager,
    altitude_km: Option<f64>,
    len: usize,
    value_at: F,
) -> AsiResult<Vec<f64>>
where
    F: Fn(&crate::core::skymap::SkymapLayer, usize) -> f64,
{
    match altitude_km {
        None => Ok(vec![f64::NAN; len]),
        Some(alt) => {
            let layer = imager.skymap().layer(alt)?;
            Ok((0..len).map(|i| value_at(&layer, i)).collect())
        }
    }
}
