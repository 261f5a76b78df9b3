use thiserror::Error;

#[derive(Error, Debug)]
pub enum GieError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJsonError(#[from] geojson::Error),

    #[error("GeoTIFF error: {0}")]
    TiffError(#[from] tiff::TiffError),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    GdalError(#[from] gdal::errors::GdalError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration '{field}'")]
    MissingConfigError { field: String },

    #[error("Credential '{var}' is not set (expected in the environment or a .env file)")]
    MissingCredential { var: String },

    #[error("Credential rejected by {service}: {message}")]
    InvalidCredential { service: String, message: String },

    #[error("Licence for dataset '{dataset}' has not been accepted: {message}")]
    LicenceNotAccepted { dataset: String, message: String },

    #[error("Request to {url} returned HTTP {status}: {body}")]
    ApiStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Resource not found: {url}")]
    NotFound { url: String },

    #[error("CDS job {job_id} ended with status '{status}': {message}")]
    CdsJobFailed {
        job_id: String,
        status: String,
        message: String,
    },

    #[error("CDS job {job_id} did not finish within {waited_seconds}s")]
    CdsTimeout { job_id: String, waited_seconds: u64 },

    #[error("Archive {archive} must contain exactly one NetCDF file, found {found}")]
    ArchiveLayout { archive: String, found: usize },

    #[error("Required input is missing: {path}")]
    MissingInput { path: String },

    #[error("Raster error: {message}")]
    RasterError { message: String },

    #[error("Geometry error: {message}")]
    GeometryError { message: String },

    #[error("Unit {shape_id} overlaps its parent by only {overlap:.3} (threshold {threshold})")]
    OverlapBelowThreshold {
        shape_id: String,
        overlap: f64,
        threshold: f64,
    },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

pub type Result<T> = std::result::Result<T, GieError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Configuration,
    Credential,
    Data,
    Storage,
    Geospatial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// 步驟失敗時的退出碼，一律非零
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorSeverity::Low | ErrorSeverity::High => 1,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl GieError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            GieError::HttpError(_)
            | GieError::ApiStatus { .. }
            | GieError::NotFound { .. }
            | GieError::CdsJobFailed { .. }
            | GieError::CdsTimeout { .. } => ErrorCategory::Network,
            GieError::ConfigNotFound { .. }
            | GieError::ConfigValidationError { .. }
            | GieError::InvalidConfigValueError { .. }
            | GieError::MissingConfigError { .. } => ErrorCategory::Configuration,
            GieError::MissingCredential { .. }
            | GieError::InvalidCredential { .. }
            | GieError::LicenceNotAccepted { .. } => ErrorCategory::Credential,
            GieError::IoError(_) | GieError::ZipError(_) | GieError::MissingInput { .. } => {
                ErrorCategory::Storage
            }
            GieError::TiffError(_)
            | GieError::GeoJsonError(_)
            | GieError::RasterError { .. }
            | GieError::GeometryError { .. }
            | GieError::OverlapBelowThreshold { .. } => ErrorCategory::Geospatial,
            #[cfg(feature = "gdal")]
            GieError::GdalError(_) => ErrorCategory::Geospatial,
            GieError::CsvError(_)
            | GieError::SerializationError(_)
            | GieError::ArchiveLayout { .. }
            | GieError::ProcessingError { .. } => ErrorCategory::Data,
        }
    }

    /// 嚴重程度決定 CLI 的退出碼
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            GieError::NotFound { .. } => ErrorSeverity::Low,
            GieError::HttpError(_) | GieError::CdsTimeout { .. } => ErrorSeverity::Medium,
            GieError::ApiStatus { status, .. } if *status >= 500 => ErrorSeverity::Medium,
            _ => match self.category() {
                ErrorCategory::Configuration | ErrorCategory::Credential => ErrorSeverity::Critical,
                _ => ErrorSeverity::High,
            },
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            GieError::MissingCredential { .. } => {
                "Create a .env file containing CDS_API_KEY=<your key> (see your CDS profile page)"
            }
            GieError::InvalidCredential { .. } => {
                "Check that the API key in .env matches the one shown on your CDS profile"
            }
            GieError::LicenceNotAccepted { .. } => {
                "Log in to the Climate Data Store and accept the dataset licence, then retry"
            }
            GieError::ConfigNotFound { .. } => {
                "Run from the project directory or pass --config <path to config.toml>"
            }
            GieError::MissingInput { .. } => {
                "Run the earlier pipeline steps (boundary, landcover, treatment) first"
            }
            GieError::CdsTimeout { .. } => {
                "The CDS queue is busy; raise landcover.max_wait_seconds or retry later"
            }
            GieError::OverlapBelowThreshold { .. } => {
                "Check that both boundary layers come from the same geoBoundaries release"
            }
            _ => match self.category() {
                ErrorCategory::Network => "Check network connectivity and retry",
                ErrorCategory::Configuration => "Fix the reported value in config.toml",
                ErrorCategory::Credential => "Check the credentials in .env",
                ErrorCategory::Storage => "Check file permissions and free disk space",
                ErrorCategory::Geospatial => "Check the input layers and rasters for corruption",
                ErrorCategory::Data => "Inspect the input data for unexpected content",
            },
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Network problem: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Credential => format!("Credential problem: {}", self),
            ErrorCategory::Storage => format!("File problem: {}", self),
            ErrorCategory::Geospatial => format!("Geospatial processing problem: {}", self),
            ErrorCategory::Data => format!("Data problem: {}", self),
        }
    }

    /// 只有暫時性錯誤值得重試
    pub fn is_retryable(&self) -> bool {
        match self {
            GieError::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            GieError::ApiStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<toml::de::Error> for GieError {
    fn from(e: toml::de::Error) -> Self {
        GieError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        }
    }
}
