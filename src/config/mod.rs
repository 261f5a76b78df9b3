#[cfg(feature = "cli")]
pub mod cli;
pub mod credentials;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::{CliConfig, Command};
pub use credentials::{api_key_from_env, load_env_file, ApiKey};
pub use toml_config::ProjectConfig;
