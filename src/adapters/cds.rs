//! Client for the Copernicus Climate Data Store retrieve API.
//!
//! A retrieval is a job: submit the request, poll the job until it is
//! `successful`, look up the result asset and download it.

use crate::adapters::http::ensure_success;
use crate::config::ApiKey;
use crate::utils::error::{GieError, Result};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Accepted,
    Running,
    Successful,
    Failed,
    Rejected,
    Dismissed,
    Deleted,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Accepted | JobStatus::Running)
    }

    fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Accepted => "accepted",
            JobStatus::Running => "running",
            JobStatus::Successful => "successful",
            JobStatus::Failed => "failed",
            JobStatus::Rejected => "rejected",
            JobStatus::Dismissed => "dismissed",
            JobStatus::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CdsJob {
    #[serde(rename = "jobID")]
    pub job_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Deserialize)]
struct JobResults {
    asset: ResultAsset,
}

#[derive(Debug, Deserialize)]
struct ResultAsset {
    value: AssetValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetValue {
    pub href: String,
    #[serde(rename = "file:size")]
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiProblem {
    title: Option<String>,
    detail: Option<String>,
}

impl ApiProblem {
    fn message(&self, fallback: &str) -> String {
        match (&self.title, &self.detail) {
            (Some(title), Some(detail)) => format!("{}: {}", title, detail),
            (Some(text), None) | (None, Some(text)) => text.clone(),
            (None, None) => fallback.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CdsClient {
    base_url: String,
    key: ApiKey,
    client: Client,
    poll_interval: Duration,
    max_wait: Duration,
}

impl CdsClient {
    pub fn new(base_url: &str, key: ApiKey) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gie-etl/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            key,
            client,
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(6 * 60 * 60),
        })
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.max_wait = max_wait;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/retrieve/v1/{}", self.base_url, path)
    }

    pub async fn submit(&self, dataset: &str, request: &serde_json::Value) -> Result<CdsJob> {
        let url = self.url(&format!("processes/{}/execution", dataset));
        tracing::info!("📨 Submitting CDS request for {}", dataset);
        tracing::debug!("CDS request body: {}", request);

        let response = self
            .client
            .post(&url)
            .header(TOKEN_HEADER, self.key.expose())
            .json(&serde_json::json!({ "inputs": request }))
            .send()
            .await?;

        let response = self.check(dataset, &url, response).await?;
        let job: CdsJob = response.json().await?;
        tracing::info!("🆔 CDS job {} is {}", job.job_id, job.status.as_str());
        Ok(job)
    }

    pub async fn status(&self, dataset: &str, job_id: &str) -> Result<JobStatus> {
        let url = self.url(&format!("jobs/{}", job_id));
        let response = self
            .client
            .get(&url)
            .header(TOKEN_HEADER, self.key.expose())
            .send()
            .await?;
        let response = self.check(dataset, &url, response).await?;
        let job: CdsJob = response.json().await?;
        Ok(job.status)
    }

    pub async fn results(&self, dataset: &str, job_id: &str) -> Result<AssetValue> {
        let url = self.url(&format!("jobs/{}/results", job_id));
        let response = self
            .client
            .get(&url)
            .header(TOKEN_HEADER, self.key.expose())
            .send()
            .await?;
        let response = self.check(dataset, &url, response).await?;
        let results: JobResults = response.json().await?;
        Ok(results.asset.value)
    }

    /// 等待工作完成；失敗狀態與逾時都回傳錯誤
    pub async fn wait(&self, dataset: &str, job: &CdsJob) -> Result<()> {
        let started = Instant::now();
        let mut status = job.status;

        loop {
            match status {
                JobStatus::Successful => return Ok(()),
                terminal if terminal.is_terminal() => {
                    let message = self.failure_message(&job.job_id).await;
                    return Err(GieError::CdsJobFailed {
                        job_id: job.job_id.clone(),
                        status: terminal.as_str().to_string(),
                        message,
                    });
                }
                _ => {}
            }

            if started.elapsed() >= self.max_wait {
                return Err(GieError::CdsTimeout {
                    job_id: job.job_id.clone(),
                    waited_seconds: started.elapsed().as_secs(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
            let next = self.status(dataset, &job.job_id).await?;
            if next != status {
                tracing::info!("⏳ CDS job {} is {}", job.job_id, next.as_str());
            }
            status = next;
        }
    }

    /// 串流下載到 `.part`，完成後改名
    pub async fn download(&self, asset: &AssetValue, target: &Path) -> Result<PathBuf> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = target.with_extension("part");

        tracing::info!(
            "⬇️ Downloading {} ({} bytes) to {}",
            asset.href,
            asset
                .size
                .map(|s| s.to_string())
                .unwrap_or_else(|| "?".to_string()),
            target.display()
        );

        let response = self.client.get(&asset.href).send().await?;
        let mut response = ensure_success(&asset.href, response).await?;

        let mut file = tokio::fs::File::create(&partial).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        if let Some(expected) = asset.size {
            if expected != written {
                tokio::fs::remove_file(&partial).await?;
                return Err(GieError::ProcessingError {
                    message: format!(
                        "Download of {} truncated: expected {} bytes, got {}",
                        asset.href, expected, written
                    ),
                });
            }
        }

        tokio::fs::rename(&partial, target).await?;
        Ok(target.to_path_buf())
    }

    pub async fn retrieve(
        &self,
        dataset: &str,
        request: &serde_json::Value,
        target: &Path,
    ) -> Result<PathBuf> {
        let job = self.submit(dataset, request).await?;
        self.wait(dataset, &job).await?;
        let asset = self.results(dataset, &job.job_id).await?;
        self.download(&asset, target).await
    }

    async fn check(&self, dataset: &str, url: &str, response: Response) -> Result<Response> {
        match response.status() {
            StatusCode::UNAUTHORIZED => {
                let problem = read_problem(response).await;
                Err(GieError::InvalidCredential {
                    service: "Climate Data Store".to_string(),
                    message: problem.message("API key was not accepted"),
                })
            }
            StatusCode::FORBIDDEN => {
                let problem = read_problem(response).await;
                Err(GieError::LicenceNotAccepted {
                    dataset: dataset.to_string(),
                    message: problem.message("required licences not accepted"),
                })
            }
            _ => ensure_success(url, response).await,
        }
    }

    async fn failure_message(&self, job_id: &str) -> String {
        let url = self.url(&format!("jobs/{}/results", job_id));
        let response = match self
            .client
            .get(&url)
            .header(TOKEN_HEADER, self.key.expose())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return e.to_string(),
        };
        read_problem(response).await.message("no details returned")
    }
}

async fn read_problem(response: Response) -> ApiProblem {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str(&text).unwrap_or(ApiProblem {
        title: None,
        detail: if text.is_empty() { None } else { Some(text) },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_parsing() {
        let job: CdsJob =
            serde_json::from_str(r#"{"jobID": "abc", "status": "accepted", "type": "process"}"#)
                .unwrap();
        assert_eq!(job.job_id, "abc");
        assert_eq!(job.status, JobStatus::Accepted);
        assert!(!job.status.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Successful.is_terminal());
    }

    #[test]
    fn test_problem_message() {
        let problem = ApiProblem {
            title: Some("required licences not accepted".to_string()),
            detail: Some("accept the licence to continue".to_string()),
        };
        assert_eq!(
            problem.message("fallback"),
            "required licences not accepted: accept the licence to continue"
        );
        let empty = ApiProblem {
            title: None,
            detail: None,
        };
        assert_eq!(empty.message("fallback"), "fallback");
    }

    #[test]
    fn test_urls_are_built_from_base() {
        let client = CdsClient::new("https://cds.example.com/api/", ApiKey::new("k")).unwrap();
        assert_eq!(
            client.url("processes/satellite-land-cover/execution"),
            "https://cds.example.com/api/retrieve/v1/processes/satellite-land-cover/execution"
        );
    }
}
