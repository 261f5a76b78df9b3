mod common;

use common::{feature, feature_collection, project_config, write_json, write_raster};
use gie_etl::app::pipelines::{IntegratePipeline, TreatmentPipeline};
use gie_etl::core::PipelineSequence;
use gie_etl::{EtlEngine, GieError, LocalStorage, ProjectConfig};
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;

fn write_boundaries(config: &ProjectConfig) {
    let drop = |id: &str, name: &str| {
        serde_json::json!({
            "shapeID": id,
            "shapeName": name,
            "shapeISO": "GH-X",
            "shapeGroup": "GHA",
            "shapeType": "ADM",
        })
    };
    write_json(
        &config.boundary_file("GHA", "ADM1"),
        &feature_collection(vec![
            feature(drop("P1", "North"), 0.0, 2.0, 4.0, 4.0),
            feature(drop("P2", "South"), 0.0, 0.0, 4.0, 2.0),
        ]),
    );
    write_json(
        &config.boundary_file("GHA", "ADM2"),
        &feature_collection(vec![
            feature(drop("C4", "Delta"), 2.0, 0.0, 4.0, 2.0),
            feature(drop("C1", "Alpha"), 0.0, 2.0, 2.0, 4.0),
            feature(drop("C2", "Bravo"), 2.0, 2.0, 4.0, 4.0),
            feature(drop("C3", "Charlie"), 0.0, 0.0, 2.0, 2.0),
        ]),
    );
}

fn write_landcover(config: &ProjectConfig) {
    #[rustfmt::skip]
    let data = vec![
        10, 10, 50, 50,
        10, 10, 50, 50,
        50, 50,  0,  0,
        50, 50,  0,  0,
    ];
    write_raster(&config.landcover_output(2015), data, Some(0));
}

fn read_rows(path: &Path) -> (Vec<String>, Vec<HashMap<String, String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
    let rows = reader.deserialize().map(|r| r.unwrap()).collect();
    (headers, rows)
}

#[tokio::test]
async fn test_treatment_then_integrate() {
    let temp_dir = TempDir::new().unwrap();
    let config = project_config(temp_dir.path(), "http://127.0.0.1:9", "CDS_API_KEY");
    write_boundaries(&config);
    write_landcover(&config);

    let mut sequence = PipelineSequence::new("integrate-test".to_string());
    sequence.add_stage(Box::new(EtlEngine::new(TreatmentPipeline::new(
        LocalStorage::new(config.base_dir()),
        &config,
    ))));
    sequence.add_stage(Box::new(EtlEngine::new(
        IntegratePipeline::new(LocalStorage::new(config.base_dir()), &config).unwrap(),
    )));
    let results = sequence.execute_all().await.unwrap();
    assert_eq!(results.len(), 2);

    // treatment: floor(0.5 * 4) 個單位
    let (headers, treatment) = read_rows(&config.treatment_file());
    assert_eq!(headers, vec!["shapeID", "shapeName", "treatment"]);
    assert_eq!(treatment.len(), 4);
    assert_eq!(treatment.iter().filter(|r| r["treatment"] == "1").count(), 2);

    let output_dir = config.integrate_output_dir();
    let (headers, rows) = read_rows(&output_dir.join("ghana_adm2_data.csv"));
    assert_eq!(
        headers,
        vec![
            "shapeID_adm2",
            "shapeName_adm2",
            "shapeID_adm1",
            "shapeName_adm1",
            "overlap_adm1",
            "treatment",
            "esa_lc_2015_agriculture",
            "esa_lc_2015_forest",
        ]
    );
    assert!(!headers.iter().any(|h| h.starts_with("shapeISO") || h == "geometry"));

    let ids: Vec<&str> = rows.iter().map(|r| r["shapeID_adm2"].as_str()).collect();
    assert_eq!(ids, vec!["C1", "C2", "C3", "C4"]);

    let by_id: HashMap<&str, &HashMap<String, String>> = rows
        .iter()
        .map(|r| (r["shapeID_adm2"].as_str(), r))
        .collect();
    assert_eq!(by_id["C1"]["shapeName_adm1"], "North");
    assert_eq!(by_id["C4"]["shapeID_adm1"], "P2");
    assert_eq!(by_id["C1"]["esa_lc_2015_agriculture"], "4");
    assert_eq!(by_id["C2"]["esa_lc_2015_forest"], "4");
    assert_eq!(by_id["C3"]["esa_lc_2015_forest"], "4");
    assert_eq!(by_id["C4"]["esa_lc_2015_agriculture"], "0");
    assert_eq!(by_id["C4"]["esa_lc_2015_forest"], "0");
    for row in &rows {
        assert!((row["overlap_adm1"].parse::<f64>().unwrap() - 1.0).abs() < 1e-9);
        assert!(row["treatment"] == "0" || row["treatment"] == "1");
    }

    let geojson: serde_json::Value = serde_json::from_slice(
        &std::fs::read(output_dir.join("ghana_adm2_data.geojson")).unwrap(),
    )
    .unwrap();
    assert_eq!(geojson["type"], "FeatureCollection");
    assert_eq!(geojson["features"].as_array().unwrap().len(), 4);
    assert_eq!(geojson["features"][0]["properties"]["shapeID_adm2"], "C1");
    assert_eq!(geojson["features"][0]["geometry"]["type"], "MultiPolygon");
}

#[tokio::test]
async fn test_missing_treatment_file_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let config = project_config(temp_dir.path(), "http://127.0.0.1:9", "CDS_API_KEY");
    write_boundaries(&config);
    write_landcover(&config);

    let pipeline = IntegratePipeline::new(LocalStorage::new(config.base_dir()), &config).unwrap();
    let err = EtlEngine::new(pipeline).run().await.unwrap_err();

    match err {
        GieError::MissingInput { path } => assert!(path.ends_with("gha_adm2_treatment.csv")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_boundaries_are_reported() {
    let temp_dir = TempDir::new().unwrap();
    let config = project_config(temp_dir.path(), "http://127.0.0.1:9", "CDS_API_KEY");

    let pipeline = TreatmentPipeline::new(LocalStorage::new(config.base_dir()), &config);
    let err = EtlEngine::new(pipeline).run().await.unwrap_err();
    assert!(matches!(err, GieError::MissingInput { .. }));
}
