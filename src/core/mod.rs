//! Core analysis algorithms: skymap geometry, keograms, conjunctions,
//! and multi-imager overlap resolution.

pub mod conjunction;
pub mod geometry;
pub mod imager;
pub mod keogram;
pub mod mosaic;
pub mod skymap;

pub use conjunction::{AzElPixels, Conjunction};
pub use geometry::{haversine, PathPixels, PixelResolver};
pub use imager::{ImageData, Imager};
pub use keogram::{build_ewogram, build_keogram, Keogram, KeogramParams, SliceAxis, SlicePolicy};
pub use mosaic::ImagerGroup;
pub use skymap::{GridOrientation, Skymap, SkymapLayer};
