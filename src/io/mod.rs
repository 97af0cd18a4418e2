//! Interfaces to the loading collaborators.
//!
//! File downloading, caching, and instrument file-format decoding live
//! outside this crate; the analysis core only sees the traits below. A
//! loader hands the core a restartable stream of image chunks (one chunk
//! per underlying file) and a calibration skymap per epoch.

pub mod synthetic;

use crate::core::skymap::Skymap;
use crate::types::{AsiError, AsiImageStack, AsiResult};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Timestamps and images read from one underlying file.
#[derive(Debug, Clone)]
pub struct ImageChunk {
    pub times: Vec<DateTime<Utc>>,
    /// (time, row, column)
    pub images: AsiImageStack,
}

/// A time-ordered, finite, forward-only image series.
///
/// One pass per keogram/conjunction build; re-scanning means calling
/// [`ImageSource::chunks`] again. Nothing here suspends except on blocking
/// file reads inside the iterator.
pub trait ImageSource {
    /// Image shape (rows, columns).
    fn resolution(&self) -> (usize, usize);

    /// Nominal imaging cadence in seconds.
    fn cadence_s(&self) -> f64;

    /// Inclusive time range this source covers.
    fn time_range(&self) -> (DateTime<Utc>, DateTime<Utc>);

    /// Start a fresh pass over the image chunks, in time order.
    fn chunks(&self) -> AsiResult<Box<dyn Iterator<Item = AsiResult<ImageChunk>> + '_>>;
}

/// Calibration skymap provider with discrete calibration epochs.
pub trait SkymapSource {
    /// Calibration epochs, sorted ascending.
    fn epochs(&self) -> &[DateTime<Utc>];

    /// Load the skymap calibrated at `epochs()[index]`.
    fn load_epoch(&self, index: usize) -> AsiResult<Skymap>;

    /// Load the newest skymap calibrated at or before `time`.
    ///
    /// A request before the first available epoch falls back to the
    /// earliest calibration with a warning; calibration drifts slowly, so
    /// this is non-fatal.
    fn load(&self, time: DateTime<Utc>) -> AsiResult<Skymap> {
        let epochs = self.epochs();
        if epochs.is_empty() {
            return Err(AsiError::DataNotFound(
                "The skymap source has no calibration epochs".to_string(),
            ));
        }
        match epochs.iter().rposition(|&e| e <= time) {
            Some(index) => self.load_epoch(index),
            None => {
                log::warn!(
                    "Requested skymap at {} predates the first calibration \
                     epoch {}; falling back to the earliest calibration",
                    time,
                    epochs[0]
                );
                self.load_epoch(0)
            }
        }
    }
}

/// Explicit process configuration handed to loader collaborators.
///
/// Replaces ambient global state (install paths, data directories): the
/// caller constructs one and passes it down.
#[derive(Debug, Clone)]
pub struct AsiConfig {
    /// Root directory where loaders look for (or place) instrument files
    pub data_dir: PathBuf,
}

impl AsiConfig {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

impl Default for AsiConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("asi-data"),
        }
    }
}

/// A single instant or a closed time range, exactly one of which must be
/// given when constructing an imager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeQuery {
    Single(DateTime<Utc>),
    Range(DateTime<Utc>, DateTime<Utc>),
}

impl TimeQuery {
    /// Build from the optional `time` / `time_range` pair. Specifying both
    /// or neither is a configuration error.
    pub fn new(
        time: Option<DateTime<Utc>>,
        time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> AsiResult<Self> {
        match (time, time_range) {
            (Some(_), Some(_)) => Err(AsiError::Configuration(
                "time and time_range can't be simultaneously specified".to_string(),
            )),
            (None, None) => Err(AsiError::Configuration(
                "Either time or time_range must be specified".to_string(),
            )),
            (Some(t), None) => Ok(TimeQuery::Single(t)),
            (None, Some((start, end))) => {
                if end < start {
                    return Err(AsiError::Configuration(format!(
                        "time_range end {} precedes start {}",
                        end, start
                    )));
                }
                Ok(TimeQuery::Range(start, end))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_time_query_exclusivity() {
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let range = (t, t + chrono::Duration::hours(1));

        assert!(matches!(
            TimeQuery::new(Some(t), Some(range)),
            Err(AsiError::Configuration(_))
        ));
        assert!(matches!(
            TimeQuery::new(None, None),
            Err(AsiError::Configuration(_))
        ));
        assert_eq!(TimeQuery::new(Some(t), None).unwrap(), TimeQuery::Single(t));
        assert_eq!(
            TimeQuery::new(None, Some(range)).unwrap(),
            TimeQuery::Range(range.0, range.1)
        );
    }

    #[test]
    fn test_time_query_rejects_reversed_range() {
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let reversed = (t, t - chrono::Duration::seconds(1));
        assert!(matches!(
            TimeQuery::new(None, Some(reversed)),
            Err(AsiError::Configuration(_))
        ));
    }
}
