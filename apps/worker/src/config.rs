use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitoring::checker::DEFAULT_USER_AGENT;
use crate::notify::twilio::DEFAULT_API_BASE;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read config file {0}: {1}")]
    ReadFailed(path::PathBuf, #[source] std::io::Error),
    #[error("could not write config file {0}: {1}")]
    WriteFailed(path::PathBuf, #[source] std::io::Error),
    #[error("could not parse config file: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("could not serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config directory available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub worker: Worker,
    pub storage: Storage,
    pub alerts: Alerts,
    pub logging: Logging,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Worker {
    pub check_interval_seconds: u64,
    pub rotation_interval_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Storage {
    pub data_dir: path::PathBuf,
    pub logs_dir: path::PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertProvider {
    #[default]
    Log,
    Twilio,
}

impl fmt::Display for AlertProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertProvider::Log => write!(f, "log"),
            AlertProvider::Twilio => write!(f, "twilio"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Alerts {
    pub provider: AlertProvider,
    /// Prefix turning a stored 10-digit number into a dialable address
    pub country_code: String,
    pub from_phone: String,
    pub api_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_sid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub format: String,
}

impl Default for Worker {
    fn default() -> Self {
        Self {
            check_interval_seconds: 60,
            rotation_interval_seconds: 24 * 60 * 60,
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }
}

impl Worker {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds.max(1))
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_seconds.max(1))
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self { data_dir: ".data".into(), logs_dir: ".logs".into() }
    }
}

impl Default for Alerts {
    fn default() -> Self {
        Self {
            provider: AlertProvider::Log,
            country_code: "+1".into(),
            from_phone: String::new(),
            api_base: DEFAULT_API_BASE.into(),
            account_sid: None,
            auth_token: None,
        }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self { level: "info".into(), format: "compact".into() }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/uptime-worker/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("uptime-worker/config.toml"))
}

fn mask(secret: &Option<String>) -> &'static str {
    match secret {
        Some(value) if !value.is_empty() => "********",
        _ => "(unset)",
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Worker Configuration:")?;
        write_title_1(f, "Worker")?;
        write_1(f, "Check Interval (s)", &self.worker.check_interval_seconds)?;
        write_1(f, "Rotation Interval (s)", &self.worker.rotation_interval_seconds)?;
        write_1(f, "User Agent", &self.worker.user_agent)?;
        write_title_1(f, "Storage")?;
        write_1(f, "Data Directory", &self.storage.data_dir.display())?;
        write_1(f, "Logs Directory", &self.storage.logs_dir.display())?;
        write_title_1(f, "Alerts")?;
        write_1(f, "Provider", &self.alerts.provider)?;
        write_1(f, "Country Code", &self.alerts.country_code)?;
        write_1(f, "From Phone", &self.alerts.from_phone)?;
        write_1(f, "API Base", &self.alerts.api_base)?;
        write_1(f, "Account SID", &mask(&self.alerts.account_sid))?;
        write_1(f, "Auth Token", &mask(&self.alerts.auth_token))?;
        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        write_1(f, "Format", &self.logging.format)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/uptime-worker/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```no_run
    /// use uptime_worker::config::Config;
    ///
    /// let cfg = Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), uptime_worker::config::Error>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string =
                fs::read_to_string(&config_path).map_err(|err| Error::ReadFailed(config_path.clone(), err))?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::WriteFailed(path.to_path_buf(), err))?;
        }

        fs::write(path, config_str).map_err(|err| Error::WriteFailed(path.to_path_buf(), err))
    }

    /// Apply TWILIO_ACCOUNT_SID / TWILIO_AUTH_TOKEN from the environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(env::var("TWILIO_ACCOUNT_SID").ok(), env::var("TWILIO_AUTH_TOKEN").ok());
    }

    fn apply_overrides(&mut self, account_sid: Option<String>, auth_token: Option<String>) {
        if let Some(sid) = account_sid.filter(|s| !s.is_empty()) {
            self.alerts.account_sid = Some(sid);
        }
        if let Some(token) = auth_token.filter(|t| !t.is_empty()) {
            self.alerts.auth_token = Some(token);
        }
    }
}
