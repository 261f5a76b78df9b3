use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// geoBoundaries `index.json` 的一筆資料；未知欄位完整保留
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoundaryIndexEntry {
    #[serde(rename = "boundaryISO")]
    pub boundary_iso: String,
    #[serde(rename = "boundaryType")]
    pub boundary_type: String,
    #[serde(rename = "boundaryName")]
    pub boundary_name: String,
    #[serde(rename = "gjDownloadURL")]
    pub gj_download_url: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub const BOUNDARY_CITATION: &str = "Runfola, D. et al. (2020) geoBoundaries: A global database of political administrative boundaries. PLoS ONE 15(4): e0231866. https://doi.org/10.1371/journal.pone.0231866";

/// 每個邊界檔旁邊的 `.meta.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoundaryMetadata {
    pub name: String,
    pub path: String,
    pub file_extension: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub citation: String,
    pub source_name: String,
    pub source_url: String,
    pub other: BoundaryIndexEntry,
    pub group_name: String,
    pub group_title: String,
    pub group_class: String,
    pub group_level: u8,
    pub spatial_extent: Option<String>,
}

impl BoundaryMetadata {
    pub fn for_entry(entry: &BoundaryIndexEntry, path: String) -> Option<Self> {
        let iso3 = &entry.boundary_iso;
        let level_type = &entry.boundary_type;
        let group_level = level_type.get(3..)?.parse::<u8>().ok()?;

        Some(Self {
            name: format!("gB_v6_{}_{}", iso3, level_type),
            path,
            file_extension: ".geojson".to_string(),
            title: format!("geoBoundaries v6 - {} {}", entry.boundary_name, level_type),
            description: format!(
                "This feature collection represents the {} level boundaries for {} ({}) from geoBoundaries v6.",
                level_type, entry.boundary_name, iso3
            ),
            tags: vec![
                "geoboundaries".to_string(),
                "administrative".to_string(),
                "boundary".to_string(),
            ],
            citation: BOUNDARY_CITATION.to_string(),
            source_name: "geoBoundaries".to_string(),
            source_url: "geoboundaries.org".to_string(),
            other: entry.clone(),
            group_name: format!("gb_v6_{}", iso3),
            group_title: format!("gB v6 - {}", iso3),
            group_class: if level_type == "ADM0" { "parent" } else { "child" }.to_string(),
            group_level,
            spatial_extent: None,
        })
    }
}

/// ESA CCI 土地覆蓋資料版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandcoverVersion {
    V207Cds,
    V211,
}

impl LandcoverVersion {
    /// 回傳版本，以及是否為推測值（超出已知年份範圍）
    pub fn for_year(year: u16) -> (Self, bool) {
        match year {
            1992..=2015 => (LandcoverVersion::V207Cds, false),
            2016..=2021 => (LandcoverVersion::V211, false),
            _ => (LandcoverVersion::V211, true),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LandcoverVersion::V207Cds => "v2_0_7cds",
            LandcoverVersion::V211 => "v2_1_1",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub pipeline: String,
    pub processed: usize,
    pub skipped: usize,
    pub failed: Vec<String>,
    pub outputs: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineReport {
    pub fn new(pipeline: &str) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            processed: 0,
            skipped: 0,
            failed: Vec::new(),
            outputs: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct StageResult {
    pub report: PipelineReport,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: &str) -> BoundaryIndexEntry {
        serde_json::from_value(serde_json::json!({
            "boundaryISO": "GHA",
            "boundaryType": level,
            "boundaryName": "Ghana",
            "gjDownloadURL": format!("https://example.com/geoBoundaries-GHA-{}.geojson", level),
            "boundaryYearRepresented": "2020",
            "admUnitCount": "16"
        }))
        .unwrap()
    }

    #[test]
    fn test_index_entry_keeps_unknown_fields() {
        let entry = entry("ADM1");
        assert_eq!(entry.extra.len(), 2);

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["admUnitCount"], "16");
        assert_eq!(value["boundaryISO"], "GHA");
    }

    #[test]
    fn test_metadata_for_parent_and_child_levels() {
        let meta = BoundaryMetadata::for_entry(&entry("ADM0"), "a.geojson".to_string()).unwrap();
        assert_eq!(meta.name, "gB_v6_GHA_ADM0");
        assert_eq!(meta.group_class, "parent");
        assert_eq!(meta.group_level, 0);
        assert_eq!(meta.title, "geoBoundaries v6 - Ghana ADM0");

        let meta = BoundaryMetadata::for_entry(&entry("ADM2"), "b.geojson".to_string()).unwrap();
        assert_eq!(meta.group_class, "child");
        assert_eq!(meta.group_level, 2);
        assert_eq!(meta.group_name, "gb_v6_GHA");
        assert_eq!(meta.group_title, "gB v6 - GHA");
    }

    #[test]
    fn test_metadata_rejects_malformed_level() {
        assert!(BoundaryMetadata::for_entry(&entry("ADMX"), String::new()).is_none());
    }

    #[test]
    fn test_landcover_version_by_year() {
        assert_eq!(LandcoverVersion::for_year(1992), (LandcoverVersion::V207Cds, false));
        assert_eq!(LandcoverVersion::for_year(2015), (LandcoverVersion::V207Cds, false));
        assert_eq!(LandcoverVersion::for_year(2016), (LandcoverVersion::V211, false));
        assert_eq!(LandcoverVersion::for_year(2021), (LandcoverVersion::V211, false));
        assert_eq!(LandcoverVersion::for_year(2022), (LandcoverVersion::V211, true));
        assert_eq!(LandcoverVersion::V207Cds.as_str(), "v2_0_7cds");
    }
}
