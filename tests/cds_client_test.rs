use gie_etl::adapters::CdsClient;
use gie_etl::config::ApiKey;
use gie_etl::GieError;
use httpmock::prelude::*;
use std::time::Duration;
use tempfile::TempDir;

const EXECUTION_PATH: &str = "/retrieve/v1/processes/satellite-land-cover/execution";

fn client(server: &MockServer) -> CdsClient {
    CdsClient::new(&server.base_url(), ApiKey::new("secret-key"))
        .unwrap()
        .with_polling(Duration::from_millis(10), Duration::from_secs(5))
}

fn request() -> serde_json::Value {
    serde_json::json!({
        "variable": "all",
        "format": "zip",
        "version": ["v2_0_7cds"],
        "year": ["2015"],
    })
}

#[tokio::test]
async fn test_retrieve_submits_polls_and_downloads() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start_async().await;

    let submit_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(EXECUTION_PATH)
                .header("private-token", "secret-key")
                .body_contains("\"inputs\"")
                .body_contains("v2_0_7cds");
            then.status(201)
                .json_body(serde_json::json!({"jobID": "job-1", "status": "accepted"}));
        })
        .await;
    let status_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/retrieve/v1/jobs/job-1");
            then.status(200)
                .json_body(serde_json::json!({"jobID": "job-1", "status": "successful"}));
        })
        .await;
    let results_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/retrieve/v1/jobs/job-1/results");
            then.status(200).json_body(serde_json::json!({
                "asset": {"value": {
                    "href": server.url("/download/job-1.zip"),
                    "file:size": 5
                }}
            }));
        })
        .await;
    let download_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/download/job-1.zip");
            then.status(200).body("hello");
        })
        .await;

    let target = temp_dir.path().join("compressed").join("2015.zip");
    let path = client(&server)
        .retrieve("satellite-land-cover", &request(), &target)
        .await
        .unwrap();

    submit_mock.assert_async().await;
    status_mock.assert_async().await;
    results_mock.assert_async().await;
    download_mock.assert_async().await;
    assert_eq!(path, target);
    assert_eq!(std::fs::read(&target).unwrap(), b"hello");
    assert!(!target.with_extension("part").exists());
}

#[tokio::test]
async fn test_unaccepted_licence_is_reported() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(EXECUTION_PATH);
            then.status(403).json_body(serde_json::json!({
                "title": "required licences not accepted",
                "detail": "accept the licence at the dataset page"
            }));
        })
        .await;

    let err = client(&server)
        .submit("satellite-land-cover", &request())
        .await
        .unwrap_err();

    match err {
        GieError::LicenceNotAccepted { dataset, message } => {
            assert_eq!(dataset, "satellite-land-cover");
            assert!(message.contains("accept the licence"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_rejected_key_is_a_credential_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(EXECUTION_PATH);
            then.status(401).body("");
        })
        .await;

    let err = client(&server)
        .submit("satellite-land-cover", &request())
        .await
        .unwrap_err();

    assert!(matches!(err, GieError::InvalidCredential { .. }));
}

#[tokio::test]
async fn test_failed_job_stops_polling() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(EXECUTION_PATH);
            then.status(201)
                .json_body(serde_json::json!({"jobID": "job-2", "status": "accepted"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/retrieve/v1/jobs/job-2");
            then.status(200)
                .json_body(serde_json::json!({"jobID": "job-2", "status": "failed"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/retrieve/v1/jobs/job-2/results");
            then.status(400)
                .json_body(serde_json::json!({"title": "job failed", "detail": "out of quota"}));
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    let err = client(&server)
        .retrieve("satellite-land-cover", &request(), &temp_dir.path().join("x.zip"))
        .await
        .unwrap_err();

    match err {
        GieError::CdsJobFailed { job_id, status, message } => {
            assert_eq!(job_id, "job-2");
            assert_eq!(status, "failed");
            assert!(message.contains("out of quota"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_running_job_times_out() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(EXECUTION_PATH);
            then.status(201)
                .json_body(serde_json::json!({"jobID": "job-3", "status": "accepted"}));
        })
        .await;
    let status_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/retrieve/v1/jobs/job-3");
            then.status(200)
                .json_body(serde_json::json!({"jobID": "job-3", "status": "running"}));
        })
        .await;
    let results_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/retrieve/v1/jobs/job-3/results");
            then.status(200);
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    let err = CdsClient::new(&server.base_url(), ApiKey::new("secret-key"))
        .unwrap()
        .with_polling(Duration::from_millis(10), Duration::from_millis(60))
        .retrieve("satellite-land-cover", &request(), &temp_dir.path().join("x.zip"))
        .await
        .unwrap_err();

    match err {
        GieError::CdsTimeout { job_id, .. } => assert_eq!(job_id, "job-3"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(status_mock.hits_async().await >= 1);
    results_mock.assert_hits_async(0).await;
    assert!(!temp_dir.path().join("x.zip").exists());
}

#[tokio::test]
async fn test_licence_error_while_polling_is_reported() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(EXECUTION_PATH);
            then.status(201)
                .json_body(serde_json::json!({"jobID": "job-4", "status": "accepted"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/retrieve/v1/jobs/job-4");
            then.status(403).json_body(serde_json::json!({
                "title": "required licences not accepted"
            }));
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    let err = client(&server)
        .retrieve("satellite-land-cover", &request(), &temp_dir.path().join("x.zip"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GieError::LicenceNotAccepted { ref dataset, .. } if dataset == "satellite-land-cover"
    ));
}

#[tokio::test]
async fn test_rejected_key_on_results_is_a_credential_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(EXECUTION_PATH);
            then.status(201)
                .json_body(serde_json::json!({"jobID": "job-5", "status": "successful"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/retrieve/v1/jobs/job-5/results");
            then.status(401).body("");
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    let err = client(&server)
        .retrieve("satellite-land-cover", &request(), &temp_dir.path().join("x.zip"))
        .await
        .unwrap_err();

    assert!(matches!(err, GieError::InvalidCredential { .. }));
}
