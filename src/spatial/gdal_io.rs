use crate::spatial::raster::{ReclassStats, Reclassifier};
use crate::utils::error::{GieError, Result};
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager};
use std::path::Path;

/// 以 GDAL 逐區塊讀取 NetCDF 變數並寫出重分類後的 GeoTIFF
pub fn reclassify_netcdf(
    input: &Path,
    variable: &str,
    output: &Path,
    reclass: &Reclassifier,
) -> Result<ReclassStats> {
    let subdataset = format!("NETCDF:\"{}\":{}", input.display(), variable);
    tracing::debug!("Opening {}", subdataset);
    let src = Dataset::open(subdataset.as_str())?;

    let (width, height) = src.raster_size();
    let band = src.rasterband(1)?;
    let (block_w, block_h) = band.block_size();
    let source_nodata = band
        .no_data_value()
        .filter(|v| (0.0..=255.0).contains(v))
        .map(|v| v as u8);

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dst = driver.create_with_band_type::<u8, _>(output, width, height, 1)?;
    dst.set_geo_transform(&src.geo_transform()?)?;
    if let Ok(srs) = src.spatial_ref() {
        dst.set_spatial_ref(&srs)?;
    }
    let mut dst_band = dst.rasterband(1)?;
    dst_band.set_no_data_value(Some(reclass.nodata() as f64))?;

    if block_w == 0 || block_h == 0 {
        return Err(GieError::RasterError {
            message: format!("{} reports an empty block size", input.display()),
        });
    }

    let mut stats = ReclassStats::default();
    for y in (0..height).step_by(block_h) {
        let rows = block_h.min(height - y);
        for x in (0..width).step_by(block_w) {
            let cols = block_w.min(width - x);
            let window = (x as isize, y as isize);
            let block = band.read_as::<u8>(window, (cols, rows), (cols, rows), None)?;
            let (shape, mut data) = block.into_shape_and_vec();
            stats.merge(reclass.apply(&mut data, source_nodata));
            let mut out = Buffer::new(shape, data);
            dst_band.write(window, (cols, rows), &mut out)?;
        }
    }

    Ok(stats)
}
