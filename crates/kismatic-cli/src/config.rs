//! Configuration file management for kismatic.
//!
//! Provides a TOML-based config file at `~/.config/kismatic/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Installation engine used when nothing else is configured.
pub const DEFAULT_INSTALLER: &str = "./ansible-runner";
/// Provisioning engine used when nothing else is configured.
pub const DEFAULT_PROVISIONER: &str = "./terraform";

pub const INSTALLER_ENV: &str = "KISMATIC_INSTALLER";
pub const PROVISIONER_ENV: &str = "KISMATIC_PROVISIONER";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub engine: EngineSection,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Path of the installation engine binary.
    pub installer: String,
    /// Path of the provisioning engine binary.
    pub provisioner: String,
    /// Directory the engines run in. Empty means the current directory.
    pub working_dir: String,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            installer: DEFAULT_INSTALLER.to_owned(),
            provisioner: DEFAULT_PROVISIONER.to_owned(),
            working_dir: String::new(),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the kismatic config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/kismatic` or
/// `~/.config/kismatic`, on every platform.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("kismatic");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("kismatic")
}

/// Return the path to the kismatic config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KismaticConfig {
    pub installer: PathBuf,
    pub provisioner: PathBuf,
    pub working_dir: PathBuf,
}

impl KismaticConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Installer: `cli_installer` > `KISMATIC_INSTALLER` > `engine.installer`
    ///   > `./ansible-runner`
    /// - Provisioner: `cli_provisioner` > `KISMATIC_PROVISIONER` > `engine.provisioner`
    ///   > `./terraform`
    /// - Working dir: `engine.working_dir` > `.`
    pub fn resolve(cli_installer: Option<&str>, cli_provisioner: Option<&str>) -> Self {
        let engine = match load_config() {
            Ok(cfg) => cfg.engine,
            Err(e) => {
                tracing::debug!(error = %e, "no usable config file, using defaults");
                EngineSection::default()
            }
        };

        let installer = pick(cli_installer, INSTALLER_ENV, &engine.installer, DEFAULT_INSTALLER);
        let provisioner = pick(
            cli_provisioner,
            PROVISIONER_ENV,
            &engine.provisioner,
            DEFAULT_PROVISIONER,
        );
        let working_dir = if engine.working_dir.is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(&engine.working_dir)
        };

        Self {
            installer: PathBuf::from(installer),
            provisioner: PathBuf::from(provisioner),
            working_dir,
        }
    }
}

fn pick(cli: Option<&str>, env: &str, file: &str, default: &str) -> String {
    if let Some(value) = cli {
        value.to_owned()
    } else if let Ok(value) = std::env::var(env) {
        value
    } else if !file.is_empty() {
        file.to_owned()
    } else {
        default.to_owned()
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
