use crate::utils::error::{GieError, Result};
use geo::{coord, Coord, Rect};
use std::collections::BTreeMap;

/// North-up affine transform (no rotation terms).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub origin_y: f64,
    /// Negative for north-up rasters.
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, pixel_width: f64, origin_y: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            origin_y,
            pixel_height,
        }
    }

    /// 視窗左上角位於 (col, row) 時的轉換
    pub fn offset(&self, col: usize, row: usize) -> Self {
        Self {
            origin_x: self.origin_x + col as f64 * self.pixel_width,
            origin_y: self.origin_y + row as f64 * self.pixel_height,
            ..*self
        }
    }

    pub fn cell_bounds(&self, col: usize, row: usize) -> Rect<f64> {
        let x0 = self.origin_x + col as f64 * self.pixel_width;
        let y0 = self.origin_y + row as f64 * self.pixel_height;
        Rect::new(
            coord! { x: x0, y: y0 },
            coord! { x: x0 + self.pixel_width, y: y0 + self.pixel_height },
        )
    }

    pub fn cell_center(&self, col: usize, row: usize) -> Coord<f64> {
        coord! {
            x: self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            y: self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        }
    }

    /// 與 `rect` 相交的像元範圍 (col_start, row_start, col_end, row_end)，end 不含
    pub fn window_for(
        &self,
        rect: &Rect<f64>,
        width: usize,
        height: usize,
    ) -> Option<(usize, usize, usize, usize)> {
        let to_col = |x: f64| (x - self.origin_x) / self.pixel_width;
        let to_row = |y: f64| (y - self.origin_y) / self.pixel_height;

        let (c0, c1) = ordered(to_col(rect.min().x), to_col(rect.max().x));
        let (r0, r1) = ordered(to_row(rect.min().y), to_row(rect.max().y));

        let col_start = c0.floor().max(0.0);
        let row_start = r0.floor().max(0.0);
        let col_end = c1.ceil().min(width as f64);
        let row_end = r1.ceil().min(height as f64);

        if col_start >= col_end || row_start >= row_end {
            return None;
        }
        Some((
            col_start as usize,
            row_start as usize,
            col_end as usize,
            row_end as usize,
        ))
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// 單波段 8-bit 類別柵格
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub nodata: Option<u8>,
    pub data: Vec<u8>,
}

impl Raster {
    pub fn new(
        width: usize,
        height: usize,
        transform: GeoTransform,
        nodata: Option<u8>,
        data: Vec<u8>,
    ) -> Result<Self> {
        if data.len() != width * height {
            return Err(GieError::RasterError {
                message: format!(
                    "Raster data has {} cells, expected {}x{}",
                    data.len(),
                    width,
                    height
                ),
            });
        }
        Ok(Self {
            width,
            height,
            transform,
            nodata,
            data,
        })
    }

    pub fn get(&self, col: usize, row: usize) -> u8 {
        self.data[row * self.width + col]
    }

    pub fn is_nodata(&self, value: u8) -> bool {
        self.nodata == Some(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclassStats {
    pub pixels: u64,
    pub unmapped: u64,
}

impl ReclassStats {
    pub fn merge(&mut self, other: ReclassStats) {
        self.pixels += other.pixels;
        self.unmapped += other.unmapped;
    }
}

/// 原始類別 -> 新類別的查表
#[derive(Debug, Clone)]
pub struct Reclassifier {
    table: [Option<u8>; 256],
    nodata: u8,
}

impl Reclassifier {
    /// `mapping` 為 新類別 -> 原始類別列表
    pub fn from_mapping(mapping: &BTreeMap<u8, Vec<u8>>, nodata: u8) -> Self {
        let mut table = [None; 256];
        for (&target, sources) in mapping {
            for &source in sources {
                table[source as usize] = Some(target);
            }
        }
        Self { table, nodata }
    }

    pub fn nodata(&self) -> u8 {
        self.nodata
    }

    /// 就地重分類一個區塊；未對應的像元設為 no-data
    pub fn apply(&self, block: &mut [u8], source_nodata: Option<u8>) -> ReclassStats {
        let mut stats = ReclassStats {
            pixels: block.len() as u64,
            unmapped: 0,
        };
        for value in block.iter_mut() {
            match self.table[*value as usize] {
                Some(mapped) => *value = mapped,
                None => {
                    if source_nodata != Some(*value) {
                        stats.unmapped += 1;
                    }
                    *value = self.nodata;
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform() -> GeoTransform {
        GeoTransform::new(0.0, 1.0, 4.0, -1.0)
    }

    #[test]
    fn test_cell_geometry() {
        let gt = transform();
        let cell = gt.cell_bounds(1, 2);
        assert_eq!(cell.min(), coord! { x: 1.0, y: 1.0 });
        assert_eq!(cell.max(), coord! { x: 2.0, y: 2.0 });
        assert_eq!(gt.cell_center(0, 0), coord! { x: 0.5, y: 3.5 });
    }

    #[test]
    fn test_window_is_clipped_to_raster() {
        let gt = transform();
        let rect = Rect::new(coord! { x: 0.5, y: 0.5 }, coord! { x: 2.5, y: 2.5 });
        assert_eq!(gt.window_for(&rect, 4, 4), Some((0, 1, 3, 4)));

        let outside = Rect::new(coord! { x: 10.0, y: 10.0 }, coord! { x: 12.0, y: 12.0 });
        assert_eq!(gt.window_for(&outside, 4, 4), None);

        let overhang = Rect::new(coord! { x: -5.0, y: -5.0 }, coord! { x: 9.0, y: 9.0 });
        assert_eq!(gt.window_for(&overhang, 4, 4), Some((0, 0, 4, 4)));
    }

    #[test]
    fn test_offset_moves_origin_to_window_corner() {
        let gt = transform().offset(2, 1);
        assert_eq!(gt, GeoTransform::new(2.0, 1.0, 3.0, -1.0));
        assert_eq!(gt.cell_center(0, 0), transform().cell_center(2, 1));
    }

    #[test]
    fn test_raster_size_must_match() {
        assert!(Raster::new(2, 2, transform(), None, vec![0; 3]).is_err());
        let raster = Raster::new(2, 2, transform(), Some(0), vec![1, 2, 3, 4]).unwrap();
        assert_eq!(raster.get(1, 1), 4);
        assert!(raster.is_nodata(0));
    }

    #[test]
    fn test_reclassify_block() {
        let mut mapping = BTreeMap::new();
        mapping.insert(10, vec![10, 11, 12]);
        mapping.insert(50, vec![50, 60]);
        let reclass = Reclassifier::from_mapping(&mapping, 0);

        let mut block = vec![10, 11, 12, 50, 60, 99, 0];
        let stats = reclass.apply(&mut block, Some(0));

        assert_eq!(block, vec![10, 10, 10, 50, 50, 0, 0]);
        assert_eq!(stats.pixels, 7);
        // 99 is unmapped, 0 is source no-data and not counted
        assert_eq!(stats.unmapped, 1);
    }
}
