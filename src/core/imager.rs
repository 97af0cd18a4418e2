use crate::core::skymap::Skymap;
use crate::io::ImageSource;
use crate::types::{AsiError, AsiImageStack, AsiResult, ImagerMeta};
use chrono::{DateTime, Utc};
use ndarray::{s, Array3};

/// Eagerly loaded image series: parallel timestamps and image stack.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub times: Vec<DateTime<Utc>>,
    /// (time, row, column)
    pub images: AsiImageStack,
}

/// One ground station's imager: site metadata, calibration skymap, and an
/// image source. The skymap and source are read-only for the lifetime of
/// the imager; analyses own their output buffers.
pub struct Imager {
    meta: ImagerMeta,
    skymap: Skymap,
    source: Box<dyn ImageSource>,
}

impl Imager {
    pub fn new(meta: ImagerMeta, skymap: Skymap, source: Box<dyn ImageSource>) -> AsiResult<Self> {
        if skymap.image_shape() != meta.resolution {
            return Err(AsiError::Configuration(format!(
                "Skymap image shape {:?} does not match the imager resolution {:?}",
                skymap.image_shape(),
                meta.resolution
            )));
        }
        if source.resolution() != meta.resolution {
            return Err(AsiError::Configuration(format!(
                "Image source resolution {:?} does not match the imager resolution {:?}",
                source.resolution(),
                meta.resolution
            )));
        }
        Ok(Self {
            meta,
            skymap,
            source,
        })
    }

    pub fn meta(&self) -> &ImagerMeta {
        &self.meta
    }

    pub fn skymap(&self) -> &Skymap {
        &self.skymap
    }

    pub fn source(&self) -> &dyn ImageSource {
        self.source.as_ref()
    }

    /// Upper bound on the number of timestamps in the source's time range
    /// at the nominal cadence. Sizes pre-allocated buffers; unfilled rows
    /// are trimmed after streaming.
    pub fn estimate_n_times(&self) -> usize {
        let (start, end) = self.source.time_range();
        let n_sec = (end - start).num_milliseconds() as f64 / 1000.0;
        // +2 covers a time range that includes both bracketing stamps.
        (n_sec / self.meta.cadence_s) as usize + 2
    }

    /// Load the whole image series into memory.
    ///
    /// The buffer is pre-allocated from the nominal cadence and NaN-filled;
    /// cadence gaps therefore show up as NaN rows and are trimmed before
    /// returning. Finding no images at all is a hard error.
    pub fn data(&self) -> AsiResult<ImageData> {
        let (rows, cols) = self.meta.resolution;
        let capacity = self.estimate_n_times();
        let mut images = Array3::from_elem((capacity, rows, cols), f32::NAN);
        let mut times: Vec<Option<DateTime<Utc>>> = vec![None; capacity];

        let mut cursor = 0usize;
        for chunk in self.source.chunks()? {
            let chunk = chunk?;
            let n = chunk.times.len();
            if cursor + n > capacity {
                return Err(AsiError::Consistency(format!(
                    "Image source produced more than the {} samples expected \
                     from the nominal {} s cadence",
                    capacity, self.meta.cadence_s
                )));
            }
            images
                .slice_mut(s![cursor..cursor + n, .., ..])
                .assign(&chunk.images);
            times[cursor..cursor + n].clone_from_slice(
                &chunk.times.iter().map(|&t| Some(t)).collect::<Vec<_>>(),
            );
            cursor += n;
        }

        // Trim unfilled rows (whole-file gaps).
        let valid: Vec<usize> = (0..capacity)
            .filter(|&i| times[i].is_some() && !images[[i, 0, 0]].is_nan())
            .collect();
        if valid.is_empty() {
            let (start, end) = self.source.time_range();
            return Err(AsiError::DataNotFound(format!(
                "No images found for {}/{} during {} to {}",
                self.meta.array, self.meta.location, start, end
            )));
        }

        let mut out = Array3::zeros((valid.len(), rows, cols));
        let mut out_times = Vec::with_capacity(valid.len());
        for (j, &i) in valid.iter().enumerate() {
            out.slice_mut(s![j, .., ..]).assign(&images.slice(s![i, .., ..]));
            out_times.push(times[i].unwrap());
        }

        log::debug!(
            "Loaded {} images for {}/{}",
            out_times.len(),
            self.meta.array,
            self.meta.location
        );
        Ok(ImageData {
            times: out_times,
            images: out,
        })
    }
}
