use crate::spatial::raster::Raster;
use geo::{BoundingRect, Contains, Intersects, MultiPolygon, Point};
use std::collections::BTreeMap;

/// 多邊形內各類別的像元數
///
/// `all_touched` 為真時，只要像元與多邊形相交即計入；否則以像元中心是否落在多邊形內判斷。
/// no-data 像元不計。
pub fn categorical_counts(
    raster: &Raster,
    zone: &MultiPolygon<f64>,
    all_touched: bool,
) -> BTreeMap<u8, u64> {
    let mut counts = BTreeMap::new();

    let Some(envelope) = zone.bounding_rect() else {
        return counts;
    };
    let Some((c0, r0, c1, r1)) = raster
        .transform
        .window_for(&envelope, raster.width, raster.height)
    else {
        return counts;
    };

    for row in r0..r1 {
        for col in c0..c1 {
            let value = raster.get(col, row);
            if raster.is_nodata(value) {
                continue;
            }
            let inside = if all_touched {
                zone.intersects(&raster.transform.cell_bounds(col, row))
            } else {
                zone.contains(&Point::from(raster.transform.cell_center(col, row)))
            };
            if inside {
                *counts.entry(value).or_insert(0) += 1;
            }
        }
    }

    counts
}
