use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;

use crate::paths;

/// Root configuration structure for marketplace.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MarketplaceConfig {
    #[serde(default)]
    pub defaults: Defaults,
}

/// All configurable defaults that can be overridden via marketplace.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_http")]
    pub http: HttpConfig,

    #[serde(default = "default_release")]
    pub release: ReleaseConfig,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            http: default_http(),
            release: default_release(),
        }
    }
}

/// Settings for catalog CSV downloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Settings for publishing the database as a release asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default = "default_asset_name")]
    pub asset_name: String,

    #[serde(default = "default_content_type")]
    pub content_type: String,

    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_http() -> HttpConfig {
    HttpConfig {
        timeout_secs: default_timeout_secs(),
        user_agent: default_user_agent(),
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("marketplace/{}", env!("CARGO_PKG_VERSION"))
}

fn default_release() -> ReleaseConfig {
    ReleaseConfig {
        api_base: default_api_base(),
        token_env: default_token_env(),
        asset_name: default_asset_name(),
        content_type: default_content_type(),
        upload_timeout_secs: default_upload_timeout_secs(),
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_asset_name() -> String {
    "marketplace.db".to_string()
}

fn default_content_type() -> String {
    "application/vnd.sqlite3".to_string()
}

fn default_upload_timeout_secs() -> u64 {
    300
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load defaults, merging file config with built-in defaults.
/// If marketplace.json is missing or invalid, silently returns built-in defaults.
pub fn load_defaults() -> Defaults {
    load_config().defaults
}

/// Load the full marketplace.json config, falling back to defaults on any error.
pub fn load_config() -> MarketplaceConfig {
    load_config_from_file().unwrap_or_default()
}

fn load_config_from_file() -> crate::Result<MarketplaceConfig> {
    let path = paths::marketplace_json()?;

    if !path.exists() {
        return Err(crate::Error::other("marketplace.json not found"));
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        crate::Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    parse_config(&content, &path.display().to_string())
}

fn parse_config(content: &str, source: &str) -> crate::Result<MarketplaceConfig> {
    serde_json::from_str(content).map_err(|e| crate::Error::config_invalid_json(source, e))
}

/// Save config to marketplace.json file (creates if missing).
pub fn save_config(config: &MarketplaceConfig) -> crate::Result<()> {
    let path = paths::marketplace_json()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            crate::Error::internal_io(e.to_string(), Some(format!("create {}", parent.display())))
        })?;
    }

    let content = serde_json::to_string_pretty(config).map_err(|e| {
        crate::Error::validation_invalid_json(
            e,
            Some("serialize marketplace.json".to_string()),
            None,
        )
    })?;

    fs::write(&path, content).map_err(|e| {
        crate::Error::internal_io(e.to_string(), Some(format!("write {}", path.display())))
    })?;

    Ok(())
}

/// Check if marketplace.json file exists
pub fn config_exists() -> bool {
    paths::marketplace_json()
        .map(|p| p.exists())
        .unwrap_or(false)
}

/// Delete marketplace.json file (reset to defaults)
pub fn reset_config() -> crate::Result<bool> {
    let path = paths::marketplace_json()?;

    if path.exists() {
        fs::remove_file(&path).map_err(|e| {
            crate::Error::internal_io(e.to_string(), Some(format!("delete {}", path.display())))
        })?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Get the path to marketplace.json (for display purposes)
pub fn config_path() -> crate::Result<String> {
    Ok(paths::marketplace_json()?.display().to_string())
}

/// Get built-in defaults (ignoring any file config)
pub fn builtin_defaults() -> Defaults {
    Defaults::default()
}

// =============================================================================
// JSON pointer edits
// =============================================================================

/// Return `config` with `value` written at `pointer` (e.g. `/defaults/http/timeout_secs`).
///
/// Intermediate objects are created as needed. The edited document must still
/// deserialize as a config, so type mismatches are rejected here.
pub fn apply_pointer(
    config: &MarketplaceConfig,
    pointer: &str,
    value: Value,
) -> crate::Result<MarketplaceConfig> {
    let mut document = serde_json::to_value(config).map_err(|e| {
        crate::Error::internal_json(e.to_string(), Some("serialize config".to_string()))
    })?;

    set_json_pointer(&mut document, pointer, value)?;

    serde_json::from_value(document).map_err(|e| {
        crate::Error::config_invalid_value(pointer, None, format!("Invalid value: {}", e))
    })
}

fn set_json_pointer(root: &mut Value, pointer: &str, new_value: Value) -> crate::Result<()> {
    if pointer == "/" || !pointer.starts_with('/') {
        return Err(crate::Error::validation_invalid_argument(
            "pointer",
            format!("JSON pointer must start with '/' and name a key: {}", pointer),
            None,
            None,
        ));
    }

    let tokens: Vec<String> = pointer.split('/').skip(1).map(unescape_token).collect();
    let Some((last, parents)) = tokens.split_last() else {
        return Ok(());
    };

    let mut current = root;
    for token in parents {
        if current.is_null() {
            *current = Value::Object(serde_json::Map::new());
        }
        let Value::Object(map) = current else {
            return Err(crate::Error::config_invalid_value(
                pointer,
                Some(token.clone()),
                "Expected an object along the pointer path",
            ));
        };
        current = map
            .entry(token.clone())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }

    match current {
        Value::Object(map) => {
            map.insert(last.clone(), new_value);
            Ok(())
        }
        _ => Err(crate::Error::config_invalid_value(
            pointer,
            Some(last.clone()),
            "Expected an object at the parent of the pointer",
        )),
    }
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}
