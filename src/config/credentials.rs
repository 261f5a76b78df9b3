use crate::utils::error::{GieError, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// API 金鑰；Debug 輸出不洩漏內容
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// 載入 `.env`；已存在的環境變數優先。找不到檔案不是錯誤
pub fn load_env_file(path: Option<&Path>) -> Option<PathBuf> {
    match path {
        Some(path) => match dotenvy::from_path(path) {
            Ok(()) => Some(path.to_path_buf()),
            Err(e) => {
                tracing::warn!("⚠️ Could not load env file {}: {}", path.display(), e);
                None
            }
        },
        None => dotenvy::dotenv().ok(),
    }
}

pub fn api_key_from_env(var: &str) -> Result<ApiKey> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(ApiKey::new(value.trim())),
        _ => Err(GieError::MissingCredential {
            var: var.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_key_is_an_error() {
        std::env::remove_var("GIE_TEST_MISSING_KEY");
        let err = api_key_from_env("GIE_TEST_MISSING_KEY").unwrap_err();
        assert!(matches!(err, GieError::MissingCredential { var } if var == "GIE_TEST_MISSING_KEY"));
    }

    #[test]
    fn test_blank_key_is_an_error() {
        std::env::set_var("GIE_TEST_BLANK_KEY", "   ");
        assert!(api_key_from_env("GIE_TEST_BLANK_KEY").is_err());
        std::env::remove_var("GIE_TEST_BLANK_KEY");
    }

    #[test]
    fn test_key_loaded_from_env_file() {
        let mut env_file = NamedTempFile::new().unwrap();
        writeln!(env_file, "GIE_TEST_ENV_FILE_KEY=abc-123").unwrap();

        let loaded = load_env_file(Some(env_file.path()));
        assert_eq!(loaded.as_deref(), Some(env_file.path()));

        let key = api_key_from_env("GIE_TEST_ENV_FILE_KEY").unwrap();
        assert_eq!(key.expose(), "abc-123");
        std::env::remove_var("GIE_TEST_ENV_FILE_KEY");
    }

    #[test]
    fn test_debug_output_is_redacted() {
        let key = ApiKey::new("secret-value");
        assert_eq!(format!("{:?}", key), "ApiKey(***)");
    }
}
