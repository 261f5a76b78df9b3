//! Single-band 8-bit GeoTIFF reading and writing (EPSG:4326, pixel-is-area).
//!
//! Both directions work block by block, so a global 300 m raster never has to
//! fit in memory at once.

use crate::spatial::raster::{GeoTransform, Raster};
use crate::utils::error::{GieError, Result};
use geo::Rect;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, compression::Lzw, TiffEncoder};
use tiff::tags::Tag;
use tiff::ColorType;

/// 像元視窗 (col_start, row_start, col_end, row_end)，end 不含
pub type Window = (usize, usize, usize, usize);

const STRIP_ROWS: usize = 256;

// GeoKeyDirectory: version 1.1.0, 3 keys
// GTModelType = Geographic, GTRasterType = PixelIsArea, GeographicType = WGS 84
const WGS84_GEO_KEYS: [u16; 16] = [
    1, 1, 0, 3, //
    1024, 0, 1, 2, //
    1025, 0, 1, 1, //
    2048, 0, 1, 4326,
];

pub fn write_geotiff(path: &Path, raster: &Raster) -> Result<()> {
    write_geotiff_blocks(
        path,
        raster.width,
        raster.height,
        raster.transform,
        raster.nodata,
        STRIP_ROWS,
        |row, rows| Ok(raster.data[row * raster.width..(row + rows) * raster.width].to_vec()),
    )
}

/// 逐條帶寫出；`next_block(row, rows)` 需回傳從 `row` 開始 `rows` 列的像元
pub fn write_geotiff_blocks<F>(
    path: &Path,
    width: usize,
    height: usize,
    transform: GeoTransform,
    nodata: Option<u8>,
    block_rows: usize,
    mut next_block: F,
) -> Result<()>
where
    F: FnMut(usize, usize) -> Result<Vec<u8>>,
{
    if width == 0 || height == 0 {
        return Err(GieError::RasterError {
            message: format!("Refusing to write an empty {}x{} raster", width, height),
        });
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new(file)?;

    let mut image = encoder.new_image_with_compression::<colortype::Gray8, _>(
        width as u32,
        height as u32,
        Lzw::default(),
    )?;
    image.rows_per_strip(block_rows.clamp(1, height) as u32)?;

    image.encoder().write_tag(
        Tag::ModelPixelScaleTag,
        &[transform.pixel_width, -transform.pixel_height, 0.0][..],
    )?;
    image.encoder().write_tag(
        Tag::ModelTiepointTag,
        &[0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0][..],
    )?;
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, &WGS84_GEO_KEYS[..])?;
    if let Some(nodata) = nodata {
        image
            .encoder()
            .write_tag(Tag::GdalNodata, nodata.to_string().as_str())?;
    }

    let mut row = 0;
    while row < height {
        let samples = image.next_strip_sample_count() as usize;
        let rows = samples / width;
        if rows == 0 {
            break;
        }
        let block = next_block(row, rows)?;
        if block.len() != samples {
            return Err(GieError::RasterError {
                message: format!(
                    "Block at row {} has {} cells, expected {}",
                    row,
                    block.len(),
                    samples
                ),
            });
        }
        image.write_strip(&block)?;
        row += rows;
    }

    image.finish()?;
    Ok(())
}

/// 開啟後只讀取標頭；像元在 `read_window` 時才按 strip/tile 解碼
pub struct GeoTiffReader<R: Read + Seek> {
    decoder: Decoder<R>,
    label: String,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub nodata: Option<u8>,
}

impl GeoTiffReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = BufReader::new(File::open(path)?);
        Self::new(file, &path.display().to_string())
    }
}

impl<R: Read + Seek> GeoTiffReader<R> {
    /// `label` 只用於錯誤訊息
    pub fn new(reader: R, label: &str) -> Result<Self> {
        let mut decoder = Decoder::new(reader)?;

        if decoder.colortype()? != ColorType::Gray(8) {
            return Err(GieError::RasterError {
                message: format!("{} is not a single-band 8-bit raster", label),
            });
        }

        let (width, height) = decoder.dimensions()?;
        let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag)?;
        let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag)?;
        if scale.len() < 2 || tiepoint.len() < 6 {
            return Err(GieError::RasterError {
                message: format!("{} lacks a usable georeference", label),
            });
        }

        // 錨點不一定在像元 (0, 0)
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        let transform = GeoTransform::new(origin_x, scale[0], origin_y, -scale[1]);

        let nodata = decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok())
            .filter(|v| (0.0..=255.0).contains(v) && v.fract() == 0.0)
            .map(|v| v as u8);

        Ok(Self {
            decoder,
            label: label.to_string(),
            width: width as usize,
            height: height as usize,
            transform,
            nodata,
        })
    }

    /// 與 `bounds` 相交的像元；完全落在柵格外時回傳 None
    pub fn read_bounds(&mut self, bounds: &Rect<f64>) -> Result<Option<Raster>> {
        match self.transform.window_for(bounds, self.width, self.height) {
            Some(window) => self.read_window(window).map(Some),
            None => Ok(None),
        }
    }

    /// 只解碼與視窗相交的 strip/tile
    pub fn read_window(&mut self, window: Window) -> Result<Raster> {
        let (c0, r0, c1, r1) = window;
        if c0 >= c1 || r0 >= r1 || c1 > self.width || r1 > self.height {
            return Err(GieError::RasterError {
                message: format!(
                    "Window {:?} is outside the {}x{} raster {}",
                    window, self.width, self.height, self.label
                ),
            });
        }

        let (chunk_w, chunk_h) = self.decoder.chunk_dimensions();
        let (chunk_w, chunk_h) = (chunk_w as usize, chunk_h as usize);
        let chunks_across = self.width.div_ceil(chunk_w);

        let out_w = c1 - c0;
        let mut data = vec![self.nodata.unwrap_or(0); out_w * (r1 - r0)];

        for chunk_row in r0 / chunk_h..=(r1 - 1) / chunk_h {
            for chunk_col in c0 / chunk_w..=(c1 - 1) / chunk_w {
                let index = (chunk_row * chunks_across + chunk_col) as u32;
                let (actual_w, actual_h) = self.decoder.chunk_data_dimensions(index);
                let (actual_w, actual_h) = (actual_w as usize, actual_h as usize);

                let chunk = match self.decoder.read_chunk(index)? {
                    DecodingResult::U8(chunk) => chunk,
                    _ => {
                        return Err(GieError::RasterError {
                            message: format!("{} is not an 8-bit raster", self.label),
                        })
                    }
                };
                // 邊緣 tile 可能帶有補齊的像元
                let stride = if chunk.len() == actual_w * actual_h {
                    actual_w
                } else {
                    chunk_w
                };
                if chunk.len() < stride * actual_h {
                    return Err(GieError::RasterError {
                        message: format!("Chunk {} of {} is truncated", index, self.label),
                    });
                }

                let x0 = chunk_col * chunk_w;
                let y0 = chunk_row * chunk_h;
                let col_start = c0.max(x0);
                let col_end = c1.min(x0 + actual_w);
                if col_start >= col_end {
                    continue;
                }
                let len = col_end - col_start;

                for row in r0.max(y0)..r1.min(y0 + actual_h) {
                    let src = (row - y0) * stride + (col_start - x0);
                    let dst = (row - r0) * out_w + (col_start - c0);
                    data[dst..dst + len].copy_from_slice(&chunk[src..src + len]);
                }
            }
        }

        Raster::new(
            out_w,
            r1 - r0,
            self.transform.offset(c0, r0),
            self.nodata,
            data,
        )
    }
}
