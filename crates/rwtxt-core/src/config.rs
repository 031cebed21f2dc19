//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/rwtxt/config.toml)
//! 3. Environment variables (RWTXT_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix
const ENV_PREFIX: &str = "RWTXT";

/// bcrypt work factor used unless configured otherwise
pub const DEFAULT_PASSWORD_COST: u32 = 10;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Directory for data storage
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Explicit database file; defaults to `<data_dir>/rwtxt.db`
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Order listings by creation time instead of modification time
    #[serde(default)]
    pub order_by_created: bool,

    /// bcrypt cost for domain passwords
    #[serde(default = "default_password_cost")]
    pub password_cost: u32,

    /// Allow listing and searching the public domain
    #[serde(default)]
    pub private: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: None,
            order_by_created: false,
            password_cost: DEFAULT_PASSWORD_COST,
            private: false,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_DATABASE", ENV_PREFIX)) {
            self.database = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }

        if let Ok(val) = std::env::var(format!("{}_ORDER_BY_CREATED", ENV_PREFIX)) {
            self.order_by_created = parse_flag(&val);
        }

        if let Ok(val) = std::env::var(format!("{}_PRIVATE", ENV_PREFIX)) {
            self.private = parse_flag(&val);
        }

        if let Ok(val) = std::env::var(format!("{}_PASSWORD_COST", ENV_PREFIX)) {
            self.password_cost = val
                .parse()
                .with_context(|| format!("Invalid {}_PASSWORD_COST: {:?}", ENV_PREFIX, val))?;
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with RWTXT_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rwtxt")
            .join("config.toml")
    }

    /// Get the path to the SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.data_dir.join("rwtxt.db"))
    }
}

fn parse_flag(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rwtxt")
}

fn default_password_cost() -> u32 {
    DEFAULT_PASSWORD_COST
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "RWTXT_DATA_DIR",
        "RWTXT_DATABASE",
        "RWTXT_ORDER_BY_CREATED",
        "RWTXT_PRIVATE",
        "RWTXT_PASSWORD_COST",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.order_by_created);
        assert!(!config.private);
        assert_eq!(config.password_cost, DEFAULT_PASSWORD_COST);
        assert!(config.data_dir.ends_with("rwtxt"));
        assert!(config.database_path().ends_with("rwtxt.db"));
    }

    #[test]
    fn test_explicit_database_path() {
        let config = Config {
            database: Some(PathBuf::from("/srv/notes.db")),
            ..Config::default()
        };
        assert_eq!(config.database_path(), PathBuf::from("/srv/notes.db"));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("RWTXT_DATA_DIR", "/tmp/rwtxt-test");
        config.apply_env_overrides().unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/rwtxt-test"));
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/rwtxt-test/rwtxt.db")
        );
    }

    #[test]
    fn test_env_override_flags() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("RWTXT_ORDER_BY_CREATED", "true");
        env::set_var("RWTXT_PRIVATE", "1");
        config.apply_env_overrides().unwrap();
        assert!(config.order_by_created);
        assert!(config.private);

        env::set_var("RWTXT_ORDER_BY_CREATED", "false");
        config.apply_env_overrides().unwrap();
        assert!(!config.order_by_created);
    }

    #[test]
    fn test_env_override_password_cost() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("RWTXT_PASSWORD_COST", "4");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.password_cost, 4);

        env::set_var("RWTXT_PASSWORD_COST", "lots");
        assert!(config.apply_env_overrides().is_err());
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            order_by_created = true
            password_cost = 6
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert!(config.order_by_created);
        assert_eq!(config.password_cost, 6);
        assert!(config.database.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config = Config {
            data_dir: PathBuf::from("/data/rwtxt"),
            database: Some(PathBuf::from("/data/other.db")),
            order_by_created: true,
            password_cost: 8,
            private: true,
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert!(!config.order_by_created);
        assert_eq!(config.password_cost, DEFAULT_PASSWORD_COST);
    }
}
