use crate::spatial::vector::to_multipolygon;
use crate::utils::error::{GieError, Result};
use geo::{Area, BooleanOps, BoundingRect, Intersects, MultiPolygon};
use geojson::FeatureCollection;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use serde_json::{Map, Value};

/// 行政區要素：屬性加上面狀幾何
#[derive(Debug, Clone)]
pub struct AdminUnit {
    pub properties: Map<String, Value>,
    pub geometry: MultiPolygon<f64>,
}

impl AdminUnit {
    pub fn property_str(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// 沒有幾何的要素直接略過
pub fn units_from_collection(collection: &FeatureCollection) -> Result<Vec<AdminUnit>> {
    let mut units = Vec::with_capacity(collection.features.len());
    for feature in &collection.features {
        let Some(geometry) = &feature.geometry else {
            tracing::debug!("Skipping feature without geometry");
            continue;
        };
        units.push(AdminUnit {
            properties: feature.properties.clone().unwrap_or_default(),
            geometry: to_multipolygon(geometry)?,
        });
    }
    Ok(units)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParentMatch {
    pub child: usize,
    pub parent: usize,
    /// area(child ∩ parent) / area(child)
    pub overlap: f64,
}

type IndexedEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

fn envelope(geometry: &MultiPolygon<f64>) -> Option<Rectangle<[f64; 2]>> {
    let rect = geometry.bounding_rect()?;
    Some(Rectangle::from_corners(
        [rect.min().x, rect.min().y],
        [rect.max().x, rect.max().y],
    ))
}

pub fn overlap_ratio(child: &MultiPolygon<f64>, parent: &MultiPolygon<f64>) -> f64 {
    let child_area = child.unsigned_area();
    if child_area == 0.0 {
        return 0.0;
    }
    child.intersection(parent).unsigned_area() / child_area
}

/// 每個子區指派重疊比例最大的上層區
///
/// 同分時取先出現的上層區；沒有任何相交上層區的子區不會出現在結果中。
pub fn assign_parents(children: &[AdminUnit], parents: &[AdminUnit]) -> Vec<ParentMatch> {
    let entries: Vec<IndexedEnvelope> = parents
        .iter()
        .enumerate()
        .filter_map(|(i, p)| envelope(&p.geometry).map(|env| GeomWithData::new(env, i)))
        .collect();
    let tree = RTree::bulk_load(entries);

    let mut matches = Vec::with_capacity(children.len());
    for (child_idx, child) in children.iter().enumerate() {
        let Some(rect) = child.geometry.bounding_rect() else {
            continue;
        };
        let search = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);

        let mut candidates: Vec<usize> = tree
            .locate_in_envelope_intersecting(&search)
            .map(|entry| entry.data)
            .collect();
        candidates.sort_unstable();

        let mut best: Option<ParentMatch> = None;
        for parent_idx in candidates {
            let parent = &parents[parent_idx].geometry;
            if !child.geometry.intersects(parent) {
                continue;
            }
            let overlap = overlap_ratio(&child.geometry, parent);
            if best.map_or(true, |b| overlap > b.overlap) {
                best = Some(ParentMatch {
                    child: child_idx,
                    parent: parent_idx,
                    overlap,
                });
            }
        }

        match best {
            Some(m) => matches.push(m),
            None => tracing::warn!("Child unit {} has no intersecting parent", child_idx),
        }
    }
    matches
}

/// 任一子區的最佳重疊比例不超過門檻即失敗；沒有任何配對也算失敗
pub fn check_overlap(
    children: &[AdminUnit],
    matches: &[ParentMatch],
    id_field: &str,
    threshold: f64,
) -> Result<()> {
    if matches.is_empty() {
        return Err(GieError::ProcessingError {
            message: format!(
                "None of the {} child units intersects a parent unit",
                children.len()
            ),
        });
    }
    if let Some(low) = matches.iter().find(|m| m.overlap <= threshold) {
        let shape_id = children[low.child]
            .property_str(id_field)
            .unwrap_or_else(|| format!("#{}", low.child));
        return Err(GieError::OverlapBelowThreshold {
            shape_id,
            overlap: low.overlap,
            threshold,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn unit(id: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> AdminUnit {
        let mut properties = Map::new();
        properties.insert("shapeID".to_string(), Value::String(id.to_string()));
        AdminUnit {
            properties,
            geometry: MultiPolygon::new(vec![polygon![
                (x: x0, y: y0),
                (x: x1, y: y0),
                (x: x1, y: y1),
                (x: x0, y: y1),
                (x: x0, y: y0),
            ]]),
        }
    }

    #[test]
    fn test_picks_parent_with_largest_overlap() {
        let parents = vec![unit("P1", 0.0, 0.0, 2.0, 2.0), unit("P2", 2.0, 0.0, 4.0, 2.0)];
        // C1: 2/3 in P1, C2: entirely in P2
        let children = vec![unit("C1", 1.0, 0.0, 2.5, 1.0), unit("C2", 2.5, 0.5, 3.5, 1.5)];

        let matches = assign_parents(&children, &parents);

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].parent, 0);
        assert!((matches[0].overlap - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(matches[1].parent, 1);
        assert!((matches[1].overlap - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_tie_goes_to_first_parent() {
        let parents = vec![unit("P1", 0.0, 0.0, 2.0, 2.0), unit("P2", 0.0, 0.0, 2.0, 2.0)];
        let children = vec![unit("C1", 0.5, 0.5, 1.5, 1.5)];

        let matches = assign_parents(&children, &parents);
        assert_eq!(matches[0].parent, 0);
        assert!((matches[0].overlap - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_orphan_child_is_dropped() {
        let parents = vec![unit("P1", 0.0, 0.0, 1.0, 1.0)];
        let children = vec![unit("C1", 5.0, 5.0, 6.0, 6.0), unit("C2", 0.2, 0.2, 0.8, 0.8)];

        let matches = assign_parents(&children, &parents);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].child, 1);
    }

    #[test]
    fn test_low_overlap_fails() {
        let parents = vec![unit("P1", 0.0, 0.0, 1.0, 1.0), unit("P2", 1.0, 0.0, 2.0, 1.0)];
        // 最佳重疊為 P2 的 0.75
        let children = vec![unit("C1", 0.75, 0.0, 1.75, 1.0)];
        let matches = assign_parents(&children, &parents);
        assert_eq!(matches[0].parent, 1);

        let err = check_overlap(&children, &matches, "shapeID", 0.8).unwrap_err();
        match err {
            GieError::OverlapBelowThreshold { shape_id, .. } => assert_eq!(shape_id, "C1"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(check_overlap(&children, &matches, "shapeID", 0.5).is_ok());
    }

    #[test]
    fn test_no_matches_fails() {
        let children = vec![unit("C1", 10.0, 10.0, 11.0, 11.0)];
        let parents = vec![unit("P1", 0.0, 0.0, 1.0, 1.0)];
        let matches = assign_parents(&children, &parents);
        assert!(matches.is_empty());

        let err = check_overlap(&children, &matches, "shapeID", 0.5).unwrap_err();
        assert!(matches!(err, GieError::ProcessingError { .. }));
        assert!(check_overlap(&[], &[], "shapeID", 0.5).is_err());
    }
}
