use crate::adapters::HttpSource;
use crate::config::toml_config::BoundaryConfig;
use crate::domain::model::{BoundaryIndexEntry, BoundaryMetadata, PipelineReport};
use crate::domain::ports::{Pipeline, Storage};
use crate::spatial::vector;
use crate::utils::error::{GieError, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::path::Path;

/// 下載一筆邊界後的結果
#[derive(Debug)]
pub enum BoundaryOutcome {
    Ready(DownloadedBoundary),
    Skipped(String),
    Failed(String),
}

#[derive(Debug)]
pub struct DownloadedBoundary {
    pub stem: String,
    pub geojson: Vec<u8>,
    pub metadata: BoundaryMetadata,
}

/// geoBoundaries gbOpen 下載；`storage` 以版本目錄為根
pub struct BoundaryPipeline<S: Storage> {
    storage: S,
    source: HttpSource,
    config: BoundaryConfig,
}

impl<S: Storage> BoundaryPipeline<S> {
    pub fn new(storage: S, config: BoundaryConfig) -> Result<Self> {
        let source = HttpSource::new(
            config.timeout(),
            config.retry_attempts(),
            config.retry_delay(),
        )?;
        Ok(Self {
            storage,
            source,
            config,
        })
    }

    /// 取得索引並依 ISO3 過濾、排序
    pub async fn prepare(&self) -> Result<Vec<BoundaryIndexEntry>> {
        let index_url = self.config.index_url();
        tracing::info!("📥 Fetching boundary index: {}", index_url);
        let index: Vec<BoundaryIndexEntry> = self.source.get_json(&index_url).await?;
        tracing::debug!("Index contains {} entries", index.len());

        let filter = self.config.iso3_filter();
        let mut entries: Vec<BoundaryIndexEntry> = if filter.is_empty() {
            index
        } else {
            index
                .into_iter()
                .filter(|e| filter.iter().any(|iso| iso == &e.boundary_iso))
                .collect()
        };
        entries.sort_by(|a, b| a.boundary_iso.cmp(&b.boundary_iso));

        tracing::info!("{} boundaries selected", entries.len());
        Ok(entries)
    }

    fn output_paths(stem: &str) -> (String, String) {
        (
            format!("{stem}/{stem}.geojson"),
            format!("{stem}/{stem}.meta.json"),
        )
    }

    async fn fetch(&self, entry: BoundaryIndexEntry) -> BoundaryOutcome {
        let url = entry.gj_download_url.clone();
        let stem = match file_stem(&url) {
            Some(stem) => stem,
            None => {
                tracing::error!("❌ Cannot derive a file name from {}", url);
                return BoundaryOutcome::Failed(url);
            }
        };

        let (geojson_path, meta_path) = Self::output_paths(&stem);
        if !self.config.overwrite_existing
            && self.storage.exists(&geojson_path).await
            && self.storage.exists(&meta_path).await
        {
            tracing::info!("⏭️ Boundary exists: {}", stem);
            return BoundaryOutcome::Skipped(stem);
        }

        match self.download(&entry, &stem, &geojson_path).await {
            Ok(downloaded) => BoundaryOutcome::Ready(downloaded),
            Err(GieError::NotFound { url }) => {
                tracing::error!("404: {}", url);
                BoundaryOutcome::Failed(stem)
            }
            Err(e) => {
                tracing::error!("❌ Failed to download {} ({}): {}", stem, url, e);
                BoundaryOutcome::Failed(stem)
            }
        }
    }

    async fn download(
        &self,
        entry: &BoundaryIndexEntry,
        stem: &str,
        geojson_path: &str,
    ) -> Result<DownloadedBoundary> {
        tracing::info!("⬇️ Downloading {}", stem);
        let bytes = self.source.get_bytes(&entry.gj_download_url).await?;
        let mut collection = vector::parse_feature_collection(&bytes)?;
        vector::ensure_shape_name(&mut collection, &entry.boundary_type);

        let mut metadata = BoundaryMetadata::for_entry(entry, self.storage.locate(geojson_path))
            .ok_or_else(|| GieError::ProcessingError {
                message: format!("Unexpected boundary type {}", entry.boundary_type),
            })?;
        metadata.spatial_extent = vector::total_bounds(&collection)?.map(|r| vector::bbox_wkt(&r));

        Ok(DownloadedBoundary {
            stem: stem.to_string(),
            geojson: serde_json::to_vec(&collection)?,
            metadata,
        })
    }
}

/// URL 最後一段去掉副檔名
fn file_stem(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Path::new(segment)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(buf)
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for BoundaryPipeline<S> {
    type Extracted = Vec<BoundaryIndexEntry>;
    type Transformed = Vec<BoundaryOutcome>;

    fn name(&self) -> &str {
        "boundary"
    }

    async fn extract(&self) -> Result<Vec<BoundaryIndexEntry>> {
        self.prepare().await
    }

    async fn transform(&self, data: Vec<BoundaryIndexEntry>) -> Result<Vec<BoundaryOutcome>> {
        let concurrency = self.config.concurrent_requests().max(1);
        tracing::debug!("Downloading with {} concurrent requests", concurrency);

        // buffered 保留輸入順序
        let outcomes = stream::iter(data)
            .map(|entry| self.fetch(entry))
            .buffered(concurrency)
            .collect::<Vec<_>>()
            .await;
        Ok(outcomes)
    }

    async fn load(&self, result: Vec<BoundaryOutcome>) -> Result<PipelineReport> {
        let mut report = PipelineReport::new(self.name());

        for outcome in result {
            match outcome {
                BoundaryOutcome::Ready(boundary) => {
                    let (geojson_path, meta_path) = Self::output_paths(&boundary.stem);
                    self.storage
                        .write_file(&geojson_path, &boundary.geojson)
                        .await?;
                    self.storage
                        .write_file(&meta_path, &to_pretty_json(&boundary.metadata)?)
                        .await?;
                    tracing::info!("✅ Saved {}", self.storage.locate(&geojson_path));
                    report.processed += 1;
                    report.outputs.push(self.storage.locate(&geojson_path));
                }
                BoundaryOutcome::Skipped(_) => report.skipped += 1,
                BoundaryOutcome::Failed(name) => report.failed.push(name),
            }
        }

        if !report.is_clean() {
            tracing::warn!(
                "⚠️ {} boundaries could not be downloaded: {}",
                report.failed.len(),
                report.failed.join(", ")
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem_from_download_url() {
        assert_eq!(
            file_stem("https://github.com/wmgeolab/geoBoundaries/raw/9469f09/releaseData/gbOpen/GHA/ADM1/geoBoundaries-GHA-ADM1.geojson"),
            Some("geoBoundaries-GHA-ADM1".to_string())
        );
        assert_eq!(file_stem("not a url"), None);
    }

    #[test]
    fn test_meta_json_uses_four_space_indent() {
        let json = to_pretty_json(&serde_json::json!({"a": {"b": 1}})).unwrap();
        let text = String::from_utf8(json).unwrap();
        assert_eq!(text, "{\n    \"a\": {\n        \"b\": 1\n    }\n}");
    }
}
