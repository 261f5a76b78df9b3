use crate::utils::error::{GieError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_GB_WEB_URL: &str = "https://raw.githubusercontent.com/wmgeolab/gbWeb";
pub const DEFAULT_CDS_URL: &str = "https://cds.climate.copernicus.eu/api";
pub const DEFAULT_CDS_DATASET: &str = "satellite-land-cover";
pub const DEFAULT_API_KEY_VAR: &str = "CDS_API_KEY";

/// `config.toml`：所有步驟共用的專案設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub base_path: String,
    #[serde(default = "default_treatment_path")]
    pub treatment_path: String,
    pub boundary: BoundaryConfig,
    pub landcover: LandcoverConfig,
    #[serde(default)]
    pub integrate: IntegrateConfig,
    #[serde(default)]
    pub treatment: TreatmentConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryConfig {
    pub version: String,
    pub gb_data_hash: String,
    pub gb_web_hash: String,
    #[serde(default)]
    pub overwrite_existing: bool,
    /// 留空則下載全部國家
    pub dl_iso3_list: Option<Vec<String>>,
    pub api_base_url: Option<String>,
    pub concurrent_requests: Option<usize>,
    pub timeout_seconds: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandcoverConfig {
    #[serde(default = "default_dataset_name")]
    pub dataset_name: String,
    pub years: Vec<u16>,
    #[serde(default = "default_api_key_var")]
    pub api_key_env_var: String,
    #[serde(default)]
    pub overwrite_download: bool,
    #[serde(default)]
    pub overwrite_processing: bool,
    /// 新類別代碼 -> 原始 ESA 類別代碼
    pub mapping: BTreeMap<String, Vec<i64>>,
    /// 類別名稱 -> 新類別代碼
    #[serde(default)]
    pub category_map: BTreeMap<String, i64>,
    pub cds_url: Option<String>,
    pub cds_dataset: Option<String>,
    pub netcdf_variable: Option<String>,
    pub poll_interval_seconds: Option<u64>,
    pub max_wait_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrateConfig {
    pub iso3: String,
    pub child_level: String,
    pub parent_level: String,
    pub min_overlap: f64,
    pub drop_fields: Vec<String>,
    pub id_field: String,
    pub all_touched: bool,
    pub output_dir: String,
    pub output_name: String,
}

impl Default for IntegrateConfig {
    fn default() -> Self {
        Self {
            iso3: "GHA".to_string(),
            child_level: "ADM2".to_string(),
            parent_level: "ADM1".to_string(),
            min_overlap: 0.5,
            drop_fields: vec![
                "shapeISO".to_string(),
                "shapeGroup".to_string(),
                "shapeType".to_string(),
            ],
            id_field: "shapeID".to_string(),
            all_touched: true,
            output_dir: "output".to_string(),
            output_name: "ghana_adm2_data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreatmentConfig {
    pub share: f64,
    pub seed: Option<u64>,
}

impl Default for TreatmentConfig {
    fn default() -> Self {
        Self {
            share: 0.25,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

fn default_treatment_path() -> String {
    "treatment/ghana_adm2_treatment.csv".to_string()
}

fn default_dataset_name() -> String {
    "esa_landcover".to_string()
}

fn default_api_key_var() -> String {
    DEFAULT_API_KEY_VAR.to_string()
}

impl ProjectConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GieError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;
        Ok(toml::from_str(&processed_content)?)
    }

    /// 替換環境變數 (例如 ${DATA_ROOT})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| GieError::ConfigValidationError {
            field: "env_substitution".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn base_dir(&self) -> PathBuf {
        PathBuf::from(&self.base_path)
    }

    /// `geoBoundaries/{version}_{data hash}_{web hash}`，相對於 base_path
    pub fn boundary_dir_key(&self) -> String {
        format!(
            "geoBoundaries/{}_{}_{}",
            self.boundary.version, self.boundary.gb_data_hash, self.boundary.gb_web_hash
        )
    }

    pub fn boundary_dir(&self) -> PathBuf {
        self.base_dir().join(self.boundary_dir_key())
    }

    pub fn boundary_key(&self, iso3: &str, level: &str) -> String {
        let stem = format!("geoBoundaries-{}-{}", iso3, level);
        format!("{}/{}/{}.geojson", self.boundary_dir_key(), stem, stem)
    }

    pub fn boundary_file(&self, iso3: &str, level: &str) -> PathBuf {
        self.base_dir().join(self.boundary_key(iso3, level))
    }

    pub fn landcover_dir(&self) -> PathBuf {
        self.base_dir().join(&self.landcover.dataset_name)
    }

    pub fn landcover_raw_dir(&self) -> PathBuf {
        self.landcover_dir().join("tmp").join("raw")
    }

    pub fn landcover_process_dir(&self) -> PathBuf {
        self.landcover_dir().join("tmp").join("processed")
    }

    pub fn landcover_key(&self, year: u16) -> String {
        format!("{}/esa_lc_{}.tif", self.landcover.dataset_name, year)
    }

    pub fn landcover_output(&self, year: u16) -> PathBuf {
        self.base_dir().join(self.landcover_key(year))
    }

    pub fn treatment_file(&self) -> PathBuf {
        self.base_dir().join(&self.treatment_path)
    }

    pub fn integrate_output_dir(&self) -> PathBuf {
        self.base_dir().join(&self.integrate.output_dir)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_path("base_path", &self.base_path)?;
        validation::validate_path("treatment_path", &self.treatment_path)?;

        self.boundary.validate()?;
        self.landcover.validate()?;

        let integrate = &self.integrate;
        validation::validate_iso3("integrate.iso3", &integrate.iso3)?;
        validation::validate_admin_level("integrate.child_level", &integrate.child_level)?;
        validation::validate_admin_level("integrate.parent_level", &integrate.parent_level)?;
        validation::validate_non_empty_string("integrate.id_field", &integrate.id_field)?;
        validation::validate_non_empty_string("integrate.output_name", &integrate.output_name)?;
        validation::validate_path("integrate.output_dir", &integrate.output_dir)?;
        if !(integrate.min_overlap > 0.0 && integrate.min_overlap <= 1.0) {
            return Err(GieError::InvalidConfigValueError {
                field: "integrate.min_overlap".to_string(),
                value: integrate.min_overlap.to_string(),
                reason: "Overlap threshold must be in (0, 1]".to_string(),
            });
        }

        validation::validate_range("treatment.share", self.treatment.share, 0.0, 1.0)?;

        Ok(())
    }
}

impl BoundaryConfig {
    pub fn api_base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_GB_WEB_URL)
            .trim_end_matches('/')
    }

    /// gbWeb 在指定 commit 下的 gbOpen 索引
    pub fn index_url(&self) -> String {
        format!(
            "{}/{}/api/current/gbOpen/ALL/ALL/index.json",
            self.api_base_url(),
            self.gb_web_hash
        )
    }

    pub fn concurrent_requests(&self) -> usize {
        self.concurrent_requests.unwrap_or(4)
    }

    pub fn iso3_filter(&self) -> &[String] {
        self.dl_iso3_list.as_deref().unwrap_or(&[])
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(120))
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts.unwrap_or(2)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds.unwrap_or(2))
    }

    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("boundary.version", &self.version)?;
        validation::validate_non_empty_string("boundary.gb_data_hash", &self.gb_data_hash)?;
        validation::validate_non_empty_string("boundary.gb_web_hash", &self.gb_web_hash)?;
        validation::validate_url("boundary.api_base_url", self.api_base_url())?;
        validation::validate_positive_number(
            "boundary.concurrent_requests",
            self.concurrent_requests(),
            1,
        )?;
        for iso3 in self.iso3_filter() {
            validation::validate_iso3("boundary.dl_iso3_list", iso3)?;
        }
        Ok(())
    }
}

impl LandcoverConfig {
    pub fn cds_url(&self) -> &str {
        self.cds_url
            .as_deref()
            .unwrap_or(DEFAULT_CDS_URL)
            .trim_end_matches('/')
    }

    pub fn cds_dataset(&self) -> &str {
        self.cds_dataset.as_deref().unwrap_or(DEFAULT_CDS_DATASET)
    }

    pub fn netcdf_variable(&self) -> &str {
        self.netcdf_variable.as_deref().unwrap_or("lccs_class")
    }

    pub fn poll_interval_seconds(&self) -> u64 {
        self.poll_interval_seconds.unwrap_or(5)
    }

    pub fn max_wait_seconds(&self) -> u64 {
        self.max_wait_seconds.unwrap_or(6 * 60 * 60)
    }

    /// 解析並檢查重分類表：新代碼 -> 原始代碼
    pub fn reclass_table(&self) -> Result<BTreeMap<u8, Vec<u8>>> {
        let mut table = BTreeMap::new();
        let mut claimed: BTreeMap<u8, u8> = BTreeMap::new();

        for (target, sources) in &self.mapping {
            let target_code =
                target
                    .trim()
                    .parse::<u8>()
                    .map_err(|_| GieError::InvalidConfigValueError {
                        field: "landcover.mapping".to_string(),
                        value: target.clone(),
                        reason: "Target class must be an integer between 0 and 255".to_string(),
                    })?;

            let mut codes = Vec::with_capacity(sources.len());
            for &source in sources {
                let code = class_code("landcover.mapping", source)?;
                if let Some(previous) = claimed.insert(code, target_code) {
                    return Err(GieError::InvalidConfigValueError {
                        field: "landcover.mapping".to_string(),
                        value: source.to_string(),
                        reason: format!(
                            "Source class is mapped to both {} and {}",
                            previous, target_code
                        ),
                    });
                }
                codes.push(code);
            }
            table.insert(target_code, codes);
        }

        Ok(table)
    }

    /// 類別代碼 -> 名稱，用於統計欄位命名
    pub fn category_names(&self) -> Result<BTreeMap<u8, String>> {
        self.category_map
            .iter()
            .map(|(name, &code)| Ok((class_code("landcover.category_map", code)?, name.clone())))
            .collect()
    }

    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("landcover.dataset_name", &self.dataset_name)?;
        validation::validate_non_empty_string("landcover.api_key_env_var", &self.api_key_env_var)?;
        validation::validate_url("landcover.cds_url", self.cds_url())?;
        if self.years.is_empty() {
            return Err(GieError::MissingConfigError {
                field: "landcover.years".to_string(),
            });
        }
        for &year in &self.years {
            validation::validate_range("landcover.years", year, 1992, 2100)?;
        }
        let years: Vec<String> = self.years.iter().map(|y| y.to_string()).collect();
        validation::validate_unique("landcover.years", years.iter().map(String::as_str))?;
        if self.mapping.is_empty() {
            return Err(GieError::MissingConfigError {
                field: "landcover.mapping".to_string(),
            });
        }
        self.reclass_table()?;
        self.category_names()?;
        validation::validate_positive_number(
            "landcover.poll_interval_seconds",
            self.poll_interval_seconds() as usize,
            1,
        )?;
        Ok(())
    }
}

fn class_code(field: &str, value: i64) -> Result<u8> {
    u8::try_from(value).map_err(|_| GieError::InvalidConfigValueError {
        field: field.to_string(),
        value: value.to_string(),
        reason: "Class code must be between 0 and 255".to_string(),
    })
}

impl Validate for ProjectConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
