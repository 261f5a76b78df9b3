use crate::utils::error::{GieError, Result};
use geo::{BoundingRect, MultiPolygon, Rect};
use geojson::{FeatureCollection, GeoJson};
use serde_json::Value;
use std::path::Path;

pub fn parse_feature_collection(bytes: &[u8]) -> Result<FeatureCollection> {
    let text = std::str::from_utf8(bytes).map_err(|e| GieError::GeometryError {
        message: format!("GeoJSON is not valid UTF-8: {}", e),
    })?;
    match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        GeoJson::Feature(feature) => Ok(FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        }),
        GeoJson::Geometry(_) => Err(GieError::GeometryError {
            message: "Expected a FeatureCollection, found a bare geometry".to_string(),
        }),
    }
}

pub fn read_feature_collection(path: &Path) -> Result<FeatureCollection> {
    if !path.exists() {
        return Err(GieError::MissingInput {
            path: path.display().to_string(),
        });
    }
    let bytes = std::fs::read(path)?;
    parse_feature_collection(&bytes)
}

/// 面狀幾何轉成 MultiPolygon；其他幾何型別視為錯誤
pub fn to_multipolygon(geometry: &geojson::Geometry) -> Result<MultiPolygon<f64>> {
    let converted = geo::Geometry::<f64>::try_from(geometry.value.clone())?;
    match converted {
        geo::Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon])),
        geo::Geometry::MultiPolygon(multi) => Ok(multi),
        geo::Geometry::GeometryCollection(collection) => {
            let mut polygons = Vec::new();
            for member in collection {
                match member {
                    geo::Geometry::Polygon(p) => polygons.push(p),
                    geo::Geometry::MultiPolygon(m) => polygons.extend(m.0),
                    _ => {}
                }
            }
            if polygons.is_empty() {
                Err(GieError::GeometryError {
                    message: "GeometryCollection without polygons".to_string(),
                })
            } else {
                Ok(MultiPolygon::new(polygons))
            }
        }
        other => Err(GieError::GeometryError {
            message: format!("Expected a polygonal geometry, found {:?}", geometry_kind(&other)),
        }),
    }
}

fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

/// 所有要素的總外框 (等同 GeoDataFrame.total_bounds)
pub fn total_bounds(collection: &FeatureCollection) -> Result<Option<Rect<f64>>> {
    let mut bounds: Option<Rect<f64>> = None;
    for feature in &collection.features {
        let Some(geometry) = &feature.geometry else {
            continue;
        };
        let converted = geo::Geometry::<f64>::try_from(geometry.value.clone())?;
        if let Some(rect) = converted.bounding_rect() {
            bounds = Some(match bounds {
                None => rect,
                Some(current) => Rect::new(
                    geo::coord! {
                        x: current.min().x.min(rect.min().x),
                        y: current.min().y.min(rect.min().y),
                    },
                    geo::coord! {
                        x: current.max().x.max(rect.max().x),
                        y: current.max().y.max(rect.max().y),
                    },
                ),
            });
        }
    }
    Ok(bounds)
}

/// 外框的 WKT，頂點順序與 shapely `box()` 相同
pub fn bbox_wkt(rect: &Rect<f64>) -> String {
    let (minx, miny) = (rect.min().x, rect.min().y);
    let (maxx, maxy) = (rect.max().x, rect.max().y);
    format!(
        "POLYGON (({maxx} {miny}, {maxx} {maxy}, {minx} {maxy}, {minx} {miny}, {maxx} {miny}))"
    )
}

/// 確保每個要素都有 `shapeName`；沒有時改用 `{level}_NAME`，再不行就設為 null
pub fn ensure_shape_name(collection: &mut FeatureCollection, level: &str) {
    let has_field = |collection: &FeatureCollection, field: &str| {
        collection
            .features
            .iter()
            .any(|f| f.contains_property(field))
    };

    if has_field(collection, "shapeName") {
        return;
    }

    let fallback = format!("{}_NAME", level);
    let use_fallback = has_field(collection, &fallback);
    if use_fallback {
        tracing::debug!("Using {} as shapeName", fallback);
    }

    for feature in &mut collection.features {
        let value = if use_fallback {
            feature.property(&fallback).cloned().unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        feature.set_property("shapeName", value);
    }
}
