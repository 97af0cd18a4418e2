//! asikit: A Fast, Modular All-Sky Imager Analysis Toolkit
//!
//! This library maps fisheye all-sky camera pixels onto geographic
//! coordinates at a chosen ionospheric altitude and builds the analyses
//! that rely on that mapping: keograms and ewograms, satellite-footprint
//! conjunction searches, and multi-imager mosaic overlap resolution for
//! the THEMIS, REGO, and TREx arrays.
//!
//! File downloading and instrument file-format decoding are collaborator
//! concerns behind the traits in [`io`]; the analysis core consumes a
//! stream of (timestamp, image) chunks and a per-pixel calibration
//! skymap.

pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use crate::core::{
    build_ewogram, build_keogram, haversine, Conjunction, Imager, ImagerGroup, Keogram,
    KeogramParams, PixelResolver, Skymap,
};
pub use io::{AsiConfig, ImageChunk, ImageSource, SkymapSource, TimeQuery};
pub use types::{
    ArrayFamily, AsiError, AsiImage, AsiImageStack, AsiResult, ConjunctionInterval, GroundTrack,
    ImagerMeta, PixelCoord,
};
