// Raster and vector primitives used by the landcover and integrate steps.

#[cfg(feature = "gdal")]
pub mod gdal_io;
pub mod geotiff;
pub mod overlay;
pub mod raster;
pub mod vector;
pub mod zonal;

pub use raster::{GeoTransform, Raster, ReclassStats, Reclassifier};
