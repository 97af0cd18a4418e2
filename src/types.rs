use chrono::{DateTime, Utc};
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

/// Real-valued image intensity data
pub type AsiReal = f32;

/// 2D image array (row x column)
pub type AsiImage = Array2<AsiReal>;

/// 3D image time series (time x row x column)
pub type AsiImageStack = Array3<AsiReal>;

/// 2D geographic/angular map grid (row x column)
pub type MapGrid = Array2<f64>;

/// 3D altitude-stacked map grid (altitude x row x column)
pub type MapGridStack = Array3<f64>;

/// Mean Earth radius in kilometers (sphere approximation)
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Ground-based imager array families supported by the toolkit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArrayFamily {
    Themis,
    Rego,
    TrexNir,
    TrexRgb,
}

impl ArrayFamily {
    /// Nominal imaging cadence in seconds.
    pub fn nominal_cadence_s(&self) -> f64 {
        match self {
            ArrayFamily::Themis => 3.0,
            ArrayFamily::Rego => 3.0,
            ArrayFamily::TrexNir => 6.0,
            ArrayFamily::TrexRgb => 3.0,
        }
    }
}

impl std::fmt::Display for ArrayFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArrayFamily::Themis => write!(f, "THEMIS"),
            ArrayFamily::Rego => write!(f, "REGO"),
            ArrayFamily::TrexNir => write!(f, "TREx-NIR"),
            ArrayFamily::TrexRgb => write!(f, "TREx-RGB"),
        }
    }
}

/// Imager site and instrument metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagerMeta {
    pub array: ArrayFamily,
    /// Four-letter station code, e.g. GILL
    pub location: String,
    pub site_lat: f64,
    pub site_lon: f64,
    pub site_alt_km: f64,
    /// Imaging cadence in seconds
    pub cadence_s: f64,
    /// Image shape (rows, columns)
    pub resolution: (usize, usize),
}

/// Integer pixel coordinate, valid only within one imager's resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelCoord {
    pub row: usize,
    pub col: usize,
}

/// Time series of geographic positions of a moving observer (e.g. a
/// satellite footprint). Parallel vectors, time-ordered.
#[derive(Debug, Clone)]
pub struct GroundTrack {
    pub times: Vec<DateTime<Utc>>,
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub alts_km: Vec<f64>,
}

impl GroundTrack {
    /// Validate and build a ground track. Vectors must have equal, nonzero
    /// length and timestamps must be non-decreasing.
    pub fn new(
        times: Vec<DateTime<Utc>>,
        lats: Vec<f64>,
        lons: Vec<f64>,
        alts_km: Vec<f64>,
    ) -> AsiResult<Self> {
        let n = times.len();
        if n == 0 {
            return Err(AsiError::Geometry("The ground track is empty".to_string()));
        }
        if lats.len() != n || lons.len() != n || alts_km.len() != n {
            return Err(AsiError::Geometry(format!(
                "Ground track length mismatch: {} times, {} lats, {} lons, {} alts",
                n,
                lats.len(),
                lons.len(),
                alts_km.len()
            )));
        }
        if times.windows(2).any(|w| w[1] < w[0]) {
            return Err(AsiError::Geometry(
                "Ground track timestamps must be non-decreasing".to_string(),
            ));
        }
        Ok(Self {
            times,
            lats,
            lons,
            alts_km,
        })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Inclusive time span covered by the track.
    pub fn time_range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.times[0], *self.times.last().unwrap())
    }
}

/// Time interval during which a ground track stays above the minimum
/// elevation inside an imager's field of view. Indices refer to the track
/// the conjunction search ran on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConjunctionInterval {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub start_index: usize,
    pub end_index: usize,
}

/// Error types for ASI analysis
#[derive(Debug, thiserror::Error)]
pub enum AsiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No data found: {0}")]
    DataNotFound(String),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Internal consistency error: {0}")]
    Consistency(String),
}

/// Result type for ASI operations
pub type AsiResult<T> = Result<T, AsiError>;
