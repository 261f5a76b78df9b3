#![allow(dead_code)]

use gie_etl::spatial::{geotiff, GeoTransform, Raster};
use gie_etl::ProjectConfig;
use std::path::Path;

/// 測試用專案設定；`server` 同時當作 gbWeb 與 CDS 的位址
pub fn project_config(base: &Path, server: &str, key_var: &str) -> ProjectConfig {
    let content = format!(
        r#"
base_path = '{base}'
treatment_path = "treatment/gha_adm2_treatment.csv"

[boundary]
version = "v6"
gb_data_hash = "9469f09"
gb_web_hash = "57dcd43"
dl_iso3_list = ["GHA"]
api_base_url = "{server}"
concurrent_requests = 2
timeout_seconds = 5
retry_attempts = 0

[landcover]
years = [2015]
api_key_env_var = "{key_var}"
cds_url = "{server}"
poll_interval_seconds = 1

[landcover.mapping]
10 = [10, 11, 30]
50 = [50, 60]

[landcover.category_map]
agriculture = 10
forest = 50

[treatment]
share = 0.5
seed = 11
"#,
        base = base.display(),
        server = server,
        key_var = key_var,
    );
    ProjectConfig::from_toml_str(&content).unwrap()
}

pub fn feature(properties: serde_json::Value, x0: f64, y0: f64, x1: f64, y1: f64) -> serde_json::Value {
    serde_json::json!({
        "type": "Feature",
        "properties": properties,
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]]
        }
    })
}

pub fn feature_collection(features: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({"type": "FeatureCollection", "features": features})
}

pub fn write_json(path: &Path, value: &serde_json::Value) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec(value).unwrap()).unwrap();
}

/// 4x4、1 度像元、左上角 (0, 4) 的 GeoTIFF
pub fn write_raster(path: &Path, data: Vec<u8>, nodata: Option<u8>) {
    let raster = Raster::new(4, 4, GeoTransform::new(0.0, 1.0, 4.0, -1.0), nodata, data).unwrap();
    geotiff::write_geotiff(path, &raster).unwrap();
}
