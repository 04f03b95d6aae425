use std::path::Path;

use config::{Config, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ServerConfig;

/// Load configuration from a file using the config crate.
/// The format follows the extension: YAML, JSON or TOML.
pub async fn load_config(config_path: &str) -> Result<ServerConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: &str) -> Result<ServerConfig> {
    let config_path = Path::new(config_path);

    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        _ => FileFormat::Toml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let server_config: ServerConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(server_config)
}

/// Render a configuration as TOML, used by `fieldroute init`.
pub fn render_default_config() -> String {
    let defaults = ServerConfig::default();
    format!(
        "listen_addr = \"{}\"\nshutdown_timeout_secs = {}\n\n[router]\nbody_limit_bytes = {}\n\n[logging]\nlevel = \"{}\"\njson = {}\n",
        defaults.listen_addr,
        defaults.shutdown_timeout_secs,
        defaults.router.body_limit_bytes,
        defaults.logging.level,
        defaults.logging.json,
    )
}
