//! Uploader settings.
//!
//! Settings are stored as TOML:
//! - Linux: `~/.config/anna-uploader/settings.toml`
//! - Windows: `%APPDATA%/anna-uploader/settings.toml`

use std::path::{Path, PathBuf};

use anna_imaging::{PixelMethod, TransformSpec, UniquenessSpec};
use anna_platform::Creator;
use anna_platform::client::DEFAULT_UPLOAD_URL;
use anna_upload::{Backoff, NamingPolicy, RetryPolicy};
use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides the stored session cookie.
pub const SESSION_COOKIE_ENV: &str = "ANNA_SESSION_COOKIE";

/// Uploader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Upload endpoint.
    #[serde(default = "default_upload_url")]
    pub upload_url: String,

    /// `.ROBLOSECURITY` session cookie. Kept out of the file when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<String>,

    /// Re-encode inputs the platform does not accept as PNG.
    #[serde(default)]
    pub force_normalize: bool,

    /// Identity that will own uploaded assets.
    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub naming: NamingPolicy,

    #[serde(default)]
    pub uniqueness: UniquenessSpec,

    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Target account. `account_id = 0` means "not set yet".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub account_id: u64,
    #[serde(default)]
    pub is_group: bool,
}

fn default_upload_url() -> String {
    DEFAULT_UPLOAD_URL.into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_url: default_upload_url(),
            session_cookie: None,
            force_normalize: false,
            account: AccountConfig::default(),
            naming: NamingPolicy::default(),
            uniqueness: UniquenessSpec::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Saves the current configuration to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&config_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            config
                .uniqueness
                .validate()
                .with_context(|| format!("invalid uniqueness settings in {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // The file may hold a session cookie.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn creator(&self) -> Creator {
        if self.account.is_group {
            Creator::group(self.account.account_id)
        } else {
            Creator::user(self.account.account_id)
        }
    }

    pub fn transform_spec(&self) -> TransformSpec {
        TransformSpec {
            normalize: self.force_normalize,
            uniqueness: self.uniqueness,
        }
    }

    /// Session cookie from the environment, falling back to the stored one.
    pub fn resolved_session_cookie(&self) -> Option<String> {
        std::env::var(SESSION_COOKIE_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.session_cookie.clone())
    }

    /// Changes the target account ("Change ID").
    pub fn set_account(&mut self, account_id: u64, is_group: bool) -> anyhow::Result<()> {
        if account_id == 0 {
            bail!("account id must be a positive number");
        }
        self.account = AccountConfig {
            account_id,
            is_group,
        };
        Ok(())
    }

    /// Sets one setting by its command-line key.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "upload-url" => self.upload_url = value.to_string(),
            "session-cookie" => {
                self.session_cookie = (!value.trim().is_empty()).then(|| value.trim().to_string());
            }
            "normalize" => self.force_normalize = parse_bool(key, value)?,
            "use-forced-name" => self.naming.use_forced_name = parse_bool(key, value)?,
            "forced-name" => {
                if value.trim().is_empty() {
                    bail!("forced-name cannot be empty");
                }
                self.naming.forced_name = value.trim().to_string();
            }
            "uniqueness" => self.uniqueness.enabled = parse_bool(key, value)?,
            "copy-count" => {
                let uniqueness = UniquenessSpec {
                    copy_count: parse_num(key, value)?,
                    ..self.uniqueness
                };
                uniqueness.validate()?;
                self.uniqueness = uniqueness;
            }
            "pixel-method" => {
                self.uniqueness.pixel_method = match value.to_ascii_lowercase().as_str() {
                    "every" => PixelMethod::Every,
                    "sparse" => PixelMethod::Sparse,
                    other => bail!("unknown pixel method {other:?} (expected every or sparse)"),
                }
            }
            "max-retries" => self.retry.max_retries = parse_num(key, value)?,
            "retry-delay-ms" => {
                let delay_ms: u64 = parse_num(key, value)?;
                self.retry.backoff = if delay_ms == 0 {
                    Backoff::None
                } else {
                    Backoff::Fixed { delay_ms }
                };
            }
            _ => bail!("unknown setting {key:?}"),
        }
        Ok(())
    }

    /// Settings as TOML with the session cookie masked.
    pub fn display(&self) -> anyhow::Result<String> {
        let mut shown = self.clone();
        if shown.session_cookie.is_some() {
            shown.session_cookie = Some("<set>".into());
        }
        Ok(toml::to_string_pretty(&shown)?)
    }
}

/// Keys accepted by [`Config::set`].
pub const SETTABLE_KEYS: &[&str] = &[
    "upload-url",
    "session-cookie",
    "normalize",
    "use-forced-name",
    "forced-name",
    "uniqueness",
    "copy-count",
    "pixel-method",
    "max-retries",
    "retry-delay-ms",
];

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => bail!("{key} expects true or false, got {value:?}"),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{key} expects a number, got {value:?}"))
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("anna-uploader")
            .join("settings.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata)
            .join("anna-uploader")
            .join("settings.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".anna-uploader")
            .join("settings.toml"))
    }
}
