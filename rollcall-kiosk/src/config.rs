use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use directories::ProjectDirs;
use rollcall_shared::PhoneNumber;
use serde::{Deserialize, Serialize};

use crate::AppError;
use crate::dispatch::GuardianPolicy;

pub const ENV_CONFIG: &str = "ROLLCALL_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KioskConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// IANA zone name, e.g. `Asia/Manila`. Host local time when unset.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Receives one alert when a dispatch had failed sends.
    #[serde(default)]
    pub maintenance_contact: Option<PhoneNumber>,
    pub modem: ModemConfig,
    pub led: LedConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModemConfig {
    pub port: PathBuf,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_command_delay_ms")]
    pub command_delay_ms: u64,
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Wait for the final `AT+CMGS` result, which can take up to a minute.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedConfig {
    pub red: u32,
    pub green: u32,
    pub blue: u32,
    /// Common-anode lamps light a channel by pulling it low.
    #[serde(default = "default_true")]
    pub active_low: bool,
    #[serde(default = "default_gpio_root")]
    pub gpio_root: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScannerKind {
    #[default]
    Command,
    Stdin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default)]
    pub kind: ScannerKind,
    /// Decoder argv for `kind: command`.
    #[serde(default = "default_scanner_command")]
    pub command: Vec<String>,
    #[serde(default = "default_scan_timeout_ms")]
    pub timeout_ms: u64,
    /// How long a scan result stays on the LED.
    #[serde(default = "default_feedback_ms")]
    pub feedback_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            kind: ScannerKind::default(),
            command: default_scanner_command(),
            timeout_ms: default_scan_timeout_ms(),
            feedback_ms: default_feedback_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,
    #[serde(default)]
    pub guardian_policy: GuardianPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_interval_ms: default_send_interval_ms(),
            guardian_policy: GuardianPolicy::default(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/rollcall/rollcall.db")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/rollcall")
}

fn default_tick_ms() -> u64 {
    500
}

fn default_baud() -> u32 {
    115200
}

fn default_command_delay_ms() -> u64 {
    200
}

fn default_response_timeout_ms() -> u64 {
    10_000
}

fn default_send_timeout_ms() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

fn default_gpio_root() -> PathBuf {
    PathBuf::from("/sys/class/gpio")
}

fn default_scanner_command() -> Vec<String> {
    ["zbarcam", "--raw", "--nodisplay"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_scan_timeout_ms() -> u64 {
    1000
}

fn default_feedback_ms() -> u64 {
    1500
}

fn default_send_interval_ms() -> u64 {
    3000
}

impl KioskConfig {
    pub fn find_and_load(cli_value: Option<PathBuf>) -> Result<(PathBuf, Self), AppError> {
        let path = resolve_config_path(cli_value)?;
        let cfg = load_config(&path)?;
        Ok((path, cfg))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, AppError> {
        let cfg: KioskConfig = serde_yaml::from_str(text)
            .map_err(|e| AppError::Config(format!("parse failed: {e}")))?;
        cfg.zone()?;
        Ok(cfg)
    }

    pub fn zone(&self) -> Result<Option<Tz>, AppError> {
        self.timezone
            .as_deref()
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|e| AppError::Config(format!("timezone {name:?}: {e}")))
            })
            .transpose()
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

pub fn resolve_config_path(cli_value: Option<PathBuf>) -> Result<PathBuf, AppError> {
    if let Some(p) = cli_value {
        return Ok(p);
    }
    if let Ok(p) = std::env::var(ENV_CONFIG) {
        return Ok(PathBuf::from(p));
    }
    default_config_path().ok_or_else(|| AppError::Config("could not determine config dir".into()))
}

pub fn default_config_path() -> Option<PathBuf> {
    let pd = ProjectDirs::from("ph", "rollcall", "rollcall")?;
    Some(pd.config_dir().join("kiosk.yaml"))
}

pub fn load_config(path: &Path) -> Result<KioskConfig, AppError> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("read {} failed: {e}", path.display())))?;
    KioskConfig::from_yaml_str(&data).map_err(|e| match e {
        AppError::Config(msg) => AppError::Config(format!("{}: {msg}", path.display())),
        other => other,
    })
}
