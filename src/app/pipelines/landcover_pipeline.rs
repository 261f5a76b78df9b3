use crate::adapters::archive::extract_single_netcdf;
use crate::adapters::CdsClient;
use crate::config::credentials::api_key_from_env;
use crate::config::toml_config::{LandcoverConfig, ProjectConfig};
use crate::domain::model::{LandcoverVersion, PipelineReport};
use crate::domain::ports::Pipeline;
use crate::spatial::geotiff::{self, GeoTiffReader};
use crate::spatial::{ReclassStats, Reclassifier};
use crate::utils::error::{GieError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

const NODATA: u8 = 0;
const BLOCK_ROWS: usize = 256;

#[derive(Debug, Clone)]
pub struct YearInput {
    pub year: u16,
    pub path: PathBuf,
}

#[derive(Debug)]
pub enum YearOutcome {
    Processed {
        year: u16,
        staged: PathBuf,
        stats: ReclassStats,
    },
    Existing {
        year: u16,
    },
}

/// ESA CCI 土地覆蓋：CDS 下載、解壓、重分類
pub struct LandcoverPipeline {
    cds: CdsClient,
    config: LandcoverConfig,
    raw_dir: PathBuf,
    process_dir: PathBuf,
    output_dir: PathBuf,
    reclass: Reclassifier,
}

impl LandcoverPipeline {
    pub fn new(project: &ProjectConfig, cds: CdsClient) -> Result<Self> {
        let config = project.landcover.clone();
        let reclass = Reclassifier::from_mapping(&config.reclass_table()?, NODATA);
        Ok(Self {
            cds,
            config,
            raw_dir: project.landcover_raw_dir(),
            process_dir: project.landcover_process_dir(),
            output_dir: project.landcover_dir(),
            reclass,
        })
    }

    /// 從環境變數讀取 API 金鑰並建立 CDS 客戶端
    pub fn from_config(project: &ProjectConfig) -> Result<Self> {
        let landcover = &project.landcover;
        let key = api_key_from_env(&landcover.api_key_env_var)?;
        let cds = CdsClient::new(landcover.cds_url(), key)?.with_polling(
            Duration::from_secs(landcover.poll_interval_seconds()),
            Duration::from_secs(landcover.max_wait_seconds()),
        );
        Self::new(project, cds)
    }

    pub fn output_path(&self, year: u16) -> PathBuf {
        self.output_dir.join(format!("esa_lc_{}.tif", year))
    }

    /// 下載 (如需要) 並解壓出該年的 NetCDF
    pub async fn download_year(&self, year: u16) -> Result<PathBuf> {
        let (version, assumed) = LandcoverVersion::for_year(year);
        if assumed {
            tracing::warn!("⚠️ Assuming that {} is {}", year, version.as_str());
        }

        let archive = self.raw_dir.join("compressed").join(format!("{}.zip", year));
        if archive.exists() && !self.config.overwrite_download {
            tracing::info!("Download exists: {}", archive.display());
        } else {
            let request = serde_json::json!({
                "variable": "all",
                "format": "zip",
                "version": [version.as_str()],
                "year": [year.to_string()],
            });
            self.cds
                .retrieve(self.config.cds_dataset(), &request, &archive)
                .await?;
        }

        let dest = self.raw_dir.join("uncompressed");
        let overwrite = self.config.overwrite_download;
        tokio::task::spawn_blocking(move || extract_single_netcdf(&archive, &dest, overwrite))
            .await
            .map_err(join_error)?
    }

    /// 重分類到暫存目錄；最終輸出已存在且不覆寫時回傳 None
    pub async fn process_year(&self, year: u16, input: &Path) -> Result<Option<ReclassStats>> {
        Ok(match self.stage_year(year, input).await? {
            YearOutcome::Processed { staged, stats, .. } => {
                self.publish(year, &staged).await?;
                Some(stats)
            }
            YearOutcome::Existing { .. } => None,
        })
    }

    async fn stage_year(&self, year: u16, input: &Path) -> Result<YearOutcome> {
        let output = self.output_path(year);
        if output.exists() && !self.config.overwrite_processing {
            tracing::info!("Processed layer exists: {}", input.display());
            return Ok(YearOutcome::Existing { year });
        }

        tracing::info!("⚙️ Processing: {}", input.display());
        if !input.is_file() {
            return Err(GieError::MissingInput {
                path: input.display().to_string(),
            });
        }
        tokio::fs::create_dir_all(&self.process_dir).await?;

        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.nc", year));
        let staged_input = self.process_dir.join(format!("source_{}", file_name));
        let staged_output = self.process_dir.join(format!("esa_lc_{}.tif", year));

        tracing::info!(
            "Copying input to tmp {} {}",
            input.display(),
            staged_input.display()
        );
        tokio::fs::copy(input, &staged_input).await?;

        tracing::info!(
            "Running raster calc {} {}",
            staged_input.display(),
            staged_output.display()
        );
        let reclass = self.reclass.clone();
        let variable = self.config.netcdf_variable().to_string();
        let target = staged_output.clone();
        let stats = tokio::task::spawn_blocking(move || {
            reclassify_file(&staged_input, &target, &variable, &reclass)
        })
        .await
        .map_err(join_error)??;

        if stats.unmapped > 0 {
            tracing::warn!(
                "⚠️ {} of {} pixels in {} had no mapping and were set to no-data",
                stats.unmapped,
                stats.pixels,
                year
            );
        }

        Ok(YearOutcome::Processed {
            year,
            staged: staged_output,
            stats,
        })
    }

    async fn publish(&self, year: u16, staged: &Path) -> Result<PathBuf> {
        let output = self.output_path(year);
        tracing::info!(
            "Copying output tmp to final {} {}",
            staged.display(),
            output.display()
        );
        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::copy(staged, &output).await?;
        Ok(output)
    }
}

fn join_error(e: tokio::task::JoinError) -> GieError {
    GieError::ProcessingError {
        message: format!("Background task failed: {}", e),
    }
}

fn reclassify_file(
    input: &Path,
    output: &Path,
    variable: &str,
    reclass: &Reclassifier,
) -> Result<ReclassStats> {
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("tif") | Some("tiff") => reclassify_geotiff(input, output, reclass),
        Some("nc") => reclassify_netcdf(input, variable, output, reclass),
        _ => Err(GieError::RasterError {
            message: format!("Unsupported landcover input: {}", input.display()),
        }),
    }
}

/// 以 `BLOCK_ROWS` 列為單位讀取、重分類並寫出
fn reclassify_geotiff(input: &Path, output: &Path, reclass: &Reclassifier) -> Result<ReclassStats> {
    let mut reader = GeoTiffReader::open(input)?;
    let (width, height, transform) = (reader.width, reader.height, reader.transform);
    let source_nodata = reader.nodata;
    tracing::debug!("Reclassifying {}x{} cells from {}", width, height, input.display());

    let mut stats = ReclassStats::default();
    geotiff::write_geotiff_blocks(
        output,
        width,
        height,
        transform,
        Some(reclass.nodata()),
        BLOCK_ROWS,
        |row, rows| {
            let mut block = reader.read_window((0, row, width, row + rows))?.data;
            stats.merge(reclass.apply(&mut block, source_nodata));
            Ok(block)
        },
    )?;
    Ok(stats)
}

#[cfg(feature = "gdal")]
fn reclassify_netcdf(
    input: &Path,
    variable: &str,
    output: &Path,
    reclass: &Reclassifier,
) -> Result<ReclassStats> {
    crate::spatial::gdal_io::reclassify_netcdf(input, variable, output, reclass)
}

#[cfg(not(feature = "gdal"))]
fn reclassify_netcdf(
    input: &Path,
    _variable: &str,
    _output: &Path,
    _reclass: &Reclassifier,
) -> Result<ReclassStats> {
    Err(GieError::RasterError {
        message: format!(
            "Reading NetCDF requires the `gdal` feature: {}",
            input.display()
        ),
    })
}

#[async_trait::async_trait]
impl Pipeline for LandcoverPipeline {
    type Extracted = Vec<YearInput>;
    type Transformed = Vec<YearOutcome>;

    fn name(&self) -> &str {
        "landcover"
    }

    async fn extract(&self) -> Result<Vec<YearInput>> {
        tokio::fs::create_dir_all(self.raw_dir.join("compressed")).await?;
        tokio::fs::create_dir_all(self.raw_dir.join("uncompressed")).await?;

        tracing::info!("Running data download");
        let mut inputs = Vec::with_capacity(self.config.years.len());
        for &year in &self.config.years {
            let path = self.download_year(year).await?;
            inputs.push(YearInput { year, path });
        }
        Ok(inputs)
    }

    async fn transform(&self, data: Vec<YearInput>) -> Result<Vec<YearOutcome>> {
        tracing::info!("Running processing");
        if self.config.overwrite_download && !self.config.overwrite_processing {
            tracing::warn!("⚠️ Overwrite download set but not overwrite processing.");
        }

        let mut outcomes = Vec::with_capacity(data.len());
        for input in data {
            outcomes.push(self.stage_year(input.year, &input.path).await?);
        }
        Ok(outcomes)
    }

    async fn load(&self, result: Vec<YearOutcome>) -> Result<PipelineReport> {
        let mut report = PipelineReport::new(self.name());
        for outcome in result {
            match outcome {
                YearOutcome::Processed { year, staged, .. } => {
                    let output = self.publish(year, &staged).await?;
                    report.processed += 1;
                    report.outputs.push(output.display().to_string());
                }
                YearOutcome::Existing { year } => {
                    report.skipped += 1;
                    report
                        .outputs
                        .push(self.output_path(year).display().to_string());
                }
            }
        }
        tracing::info!("Finished processing land cover data");
        Ok(report)
    }
}
