pub mod doctor;
pub mod import;
pub mod onboard;
pub mod search;
pub mod serve;

use bluechat_config::{AppConfig, ConfigError};
use std::path::Path;

/// Load config from `path` (or the default location) with env overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    }
}
