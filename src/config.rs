use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use dotenvy::dotenv;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::{
    batch::{BatchConfig, DEFAULT_MAX_CONCURRENT_UPLOADS, PartialFailurePolicy},
    client::DEFAULT_BASE_URL,
    model::UploadOptions,
};

pub const KEYRING_SERVICE: &str = "wvault-bucket-token";
pub const KEYRING_USER: &str = "WaifuVault";
const ENV_PREFIX: &str = "WAIFUVAULT_";

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_filename: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_time_download: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_uploads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_batch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigEnv {
    base_url: Option<Url>,
    expires: Option<String>,
    hide_filename: Option<bool>,
    one_time_download: Option<bool>,
    max_concurrent_uploads: Option<usize>,
    strict_batch: Option<bool>,
    request_timeout: Option<String>,
    bucket_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Url,
    /// Defaults applied to uploads before command-line flags.
    pub upload_defaults: UploadOptions,
    pub batch: BatchConfig,
    pub request_timeout: Option<Duration>,
    pub bucket_token: Option<String>,
}

fn merge_config(base: ConfigFile, override_config: ConfigEnv) -> Result<Config> {
    let base_url = match override_config.base_url.or(base.base_url) {
        Some(url) => url,
        None => Url::parse(DEFAULT_BASE_URL)?,
    };

    let expiry = override_config
        .expires
        .or(base.expires)
        .map(|expiry| validate_expiry(&expiry).map_err(|e| anyhow!(e)))
        .transpose()?;

    let max_concurrent = override_config
        .max_concurrent_uploads
        .or(base.max_concurrent_uploads)
        .unwrap_or(DEFAULT_MAX_CONCURRENT_UPLOADS);
    if max_concurrent == 0 {
        bail!("max_concurrent_uploads must be at least 1");
    }

    let partial_failure = if override_config
        .strict_batch
        .or(base.strict_batch)
        .unwrap_or(false)
    {
        PartialFailurePolicy::Strict
    } else {
        PartialFailurePolicy::BestEffort
    };

    let request_timeout = override_config
        .request_timeout
        .or(base.request_timeout)
        .map(|timeout| {
            humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid request_timeout '{}'", timeout))
        })
        .transpose()?;

    Ok(Config {
        base_url,
        upload_defaults: UploadOptions {
            expiry,
            hide_filename: override_config
                .hide_filename
                .or(base.hide_filename)
                .unwrap_or(false),
            password: None,
            one_time_download: override_config
                .one_time_download
                .or(base.one_time_download)
                .unwrap_or(false),
            bucket_token: None,
        },
        batch: BatchConfig {
            max_concurrent,
            partial_failure,
            emit_processing: false,
        },
        request_timeout,
        bucket_token: override_config.bucket_token,
    })
}

fn config_path() -> Result<PathBuf> {
    let project_dirs = directories::ProjectDirs::from("moe", "waifuvault", "wvault")
        .ok_or(anyhow!("Unable to determine home directory"))?;
    Ok(project_dirs.config_dir().join("config.toml"))
}

pub fn read_config_file() -> Result<ConfigFile> {
    let config_file = config_path()?;
    match fs::read_to_string(&config_file) {
        Ok(config) => toml::from_str(&config)
            .with_context(|| format!("Failed to parse {}", config_file.display())),
        Err(_) => Ok(ConfigFile::default()),
    }
}

pub fn read_config() -> Result<Config> {
    let _ = dotenv();
    let env_config = envy::prefixed(ENV_PREFIX)
        .from_env::<ConfigEnv>()
        .unwrap_or_default();

    let mut config = merge_config(read_config_file()?, env_config)?;

    if config.bucket_token.is_none() {
        config.bucket_token = bucket_token_from_keyring();
    }

    debug!(base_url = %config.base_url, has_bucket = config.bucket_token.is_some(), "configuration loaded");
    Ok(config)
}

pub fn write_config(config: &ConfigFile) -> Result<PathBuf> {
    let config_file = config_path()?;
    if let Some(parent) = config_file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&config_file, toml::to_string_pretty(config)?)
        .with_context(|| format!("Failed to write {}", config_file.display()))?;
    Ok(config_file)
}

/// A missing keyring entry, or a keyring that cannot be reached, means no stored bucket.
fn bucket_token_from_keyring() -> Option<String> {
    let lookup = Entry::new(KEYRING_SERVICE, KEYRING_USER).and_then(|entry| entry.get_secret());
    match lookup {
        Ok(secret) => match String::from_utf8(secret) {
            Ok(token) => Some(token),
            Err(_) => {
                warn!("stored bucket token is not valid UTF-8, ignoring it");
                None
            }
        },
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(error = %e, "unable to read bucket token from OS keyring");
            None
        }
    }
}

pub fn set_bucket_token_keyring(token: &str) -> Result<()> {
    let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
    entry
        .set_secret(token.as_bytes())
        .context("Failed to store bucket token in OS keyring")?;
    Ok(())
}

/// Returns whether a token was stored.
pub fn clear_bucket_token_keyring() -> Result<bool> {
    let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
    match entry.delete_credential() {
        Ok(()) => Ok(true),
        Err(keyring::Error::NoEntry) => Ok(false),
        Err(e) => Err(e).context("Failed to remove bucket token from OS keyring"),
    }
}

/// Accepts expiries the server understands such as `30m`, `12h` or `7d`.
pub fn validate_expiry(value: &str) -> Result<String, String> {
    let value = value.trim();
    match humantime::parse_duration(value) {
        Ok(duration) if duration.is_zero() => Err("expiry must be longer than zero".to_string()),
        Ok(_) => Ok(value.to_string()),
        Err(e) => Err(format!("invalid expiry '{}': {}", value, e)),
    }
}
