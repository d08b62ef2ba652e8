mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Size of one transport stream packet; transfer units are whole packets.
const TS_PACKET_SIZE: usize = 188;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./streamproxy.toml",
        "~/.config/streamproxy/config.toml",
        "/etc/streamproxy.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    let transfer = &config.transfer;
    if transfer.transfer_unit == 0 {
        anyhow::bail!("Transfer unit cannot be 0");
    }
    if transfer.transfer_unit % TS_PACKET_SIZE != 0 {
        anyhow::bail!(
            "Transfer unit {} is not a multiple of the {TS_PACKET_SIZE}-byte packet size",
            transfer.transfer_unit
        );
    }
    if transfer.queue_capacity < 2 * transfer.transfer_unit {
        anyhow::bail!(
            "Queue capacity {} must hold at least two transfer units ({} bytes)",
            transfer.queue_capacity,
            2 * transfer.transfer_unit
        );
    }

    let auth = &config.server.auth;
    if auth.enabled {
        if auth.users.is_empty() {
            anyhow::bail!("Authentication is enabled but no users are configured");
        }
        if let Some(user) = auth.users.iter().find(|u| u.password_hash.is_empty()) {
            anyhow::bail!("User '{}' has no password hash", user.username);
        }
        if let Some(group) = &auth.require_group {
            if !auth.users.iter().any(|u| u.groups.contains(group)) {
                tracing::warn!("No configured user is in required group '{group}'");
            }
        }
    }

    if config.encoder.device_paths.is_empty() {
        tracing::warn!("No encoder device paths configured; every request will get 503");
    }

    Ok(())
}
