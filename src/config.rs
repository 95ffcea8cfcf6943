//! Process configuration, read once from the environment at startup

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Longest password RMCP+ can carry as K_UID. Passwords over 16 bytes do
/// not fit an IPMI 1.5 auth code and only work over RMCP+.
pub const MAX_PASSWORD_LEN: usize = 20;

/// Errors found while loading the configuration. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Empty variable ${0}")]
    Empty(&'static str),

    #[error("Invalid value in variable ${name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Non-executable path in variable ${name}: {}", path.display())]
    NotExecutable { name: &'static str, path: PathBuf },
}

/// Login credentials accepted by the LAN session shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Action scripts run against the managed host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPaths {
    /// `power-action <host> <off|on|cycle|reset|diag|soft>`
    pub power_action: PathBuf,
    /// `power-status <host>`, prints on/off
    pub power_status: PathBuf,
    /// `chassis-bootdev <host> <pxe|cdrom|disk>`
    pub boot_device_set: PathBuf,
    /// `chassis-bootparam-get <host> 5`, prints pxe/cdrom/disk
    pub boot_device_get: PathBuf,
}

/// BMC service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub listen_host: String,
    pub listen_port: u16,
    /// Upper bound of one wait for an inbound request
    pub listen_timeout: Duration,
    /// Identifier passed as the first argument to every script
    pub managed_host: String,
    /// Upper bound of one script run
    pub process_timeout: Duration,
    pub scripts: ScriptPaths,
}

impl Config {
    /// Load the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load the configuration through `lookup`, applying defaults for
    /// unset variables
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let password = not_empty(&lookup, "IPMI_PASSWORD", "admin")?;
        if password.len() > MAX_PASSWORD_LEN {
            return Err(ConfigError::Invalid {
                name: "IPMI_PASSWORD",
                value: "<hidden>".into(),
                reason: format!("longer than {MAX_PASSWORD_LEN} bytes"),
            });
        }

        Ok(Self {
            credentials: Credentials {
                user: not_empty(&lookup, "IPMI_USER", "admin")?,
                password,
            },
            listen_host: not_empty(&lookup, "IPMI_LISTEN_HOST", "0.0.0.0")?,
            listen_port: port(&lookup, "IPMI_LISTEN_PORT", "623")?,
            listen_timeout: seconds(&lookup, "IPMI_LISTEN_TIMEOUT", "10.0")?,
            managed_host: not_empty(&lookup, "IPMI_MANAGED_HOST", "localhost")?,
            process_timeout: seconds(&lookup, "IPMI_PROCESS_TIMEOUT", "10.0")?,
            scripts: ScriptPaths {
                power_action: exec_path(&lookup, "IPMI_POWER_ACTION", "/root/scripts/power-action.sh")?,
                power_status: exec_path(&lookup, "IPMI_POWER_STATUS", "/root/scripts/power-status.sh")?,
                boot_device_set: exec_path(
                    &lookup,
                    "IPMI_CHASSIS_BOOTDEV",
                    "/root/scripts/chassis-bootdev.sh",
                )?,
                boot_device_get: exec_path(
                    &lookup,
                    "IPMI_CHASSIS_BOOTPARAM_GET",
                    "/root/scripts/chassis-bootparam-get.sh",
                )?,
            },
        })
    }
}

/// Logging settings, read before anything else so later errors get logged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `tracing` filter directive derived from IPMI_LOG_LEVEL
    pub level: String,
    /// Extra log destination next to the console
    pub file: Option<PathBuf>,
}

impl LogConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = not_empty(&lookup, "IPMI_LOG_LEVEL", "INFO")?;
        let level = match raw.to_ascii_lowercase().as_str() {
            "notset" | "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" | "warning" => "warn",
            "error" | "critical" | "fatal" => "error",
            _ => {
                return Err(ConfigError::Invalid {
                    name: "IPMI_LOG_LEVEL",
                    value: raw,
                    reason: "unknown log level".into(),
                })
            }
        };

        Ok(Self {
            level: level.to_string(),
            file: lookup("IPMI_LOG_FILE")
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
        })
    }
}

fn not_empty<F>(lookup: &F, name: &'static str, default: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name).unwrap_or_else(|| default.to_string());
    if value.is_empty() {
        return Err(ConfigError::Empty(name));
    }
    Ok(value)
}

fn port<F>(lookup: &F, name: &'static str, default: &str) -> Result<u16, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = not_empty(lookup, name, default)?;
    value.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
        name,
        value: value.clone(),
        reason: e.to_string(),
    })
}

fn seconds<F>(lookup: &F, name: &'static str, default: &str) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = not_empty(lookup, name, default)?;
    let invalid = |reason: String| ConfigError::Invalid {
        name,
        value: value.clone(),
        reason,
    };

    let secs = value.trim().parse::<f64>().map_err(|e| invalid(e.to_string()))?;
    if secs <= 0.0 {
        return Err(invalid("must be positive".into()));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| invalid(e.to_string()))
}

fn exec_path<F>(lookup: &F, name: &'static str, default: &str) -> Result<PathBuf, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = PathBuf::from(not_empty(lookup, name, default)?);
    if !is_executable(&path) {
        return Err(ConfigError::NotExecutable { name, path });
    }
    Ok(path)
}

/// Regular file with at least one execute bit set
fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
