use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub database_url: String,
    pub cache_path: PathBuf,

    // Backend assets
    pub backend_path: PathBuf,

    // Localization
    pub site_default_language: String,

    // Editor session
    pub api_key: Option<String>,
    pub editor_interface_language: Option<String>,
    pub editor_modules: Vec<String>,

    // Server
    pub port: u16,
    pub debug: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            // Storage
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            cache_path: std::env::var("CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("var/cache")),

            // Backend assets
            backend_path: std::env::var("BACKEND_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("src/Backend")),

            // Localization
            site_default_language: std::env::var("SITE_DEFAULT_LANGUAGE")
                .unwrap_or_else(|_| "en".to_string()),

            // Editor session (empty key disables authentication entirely)
            api_key: std::env::var("BACKEND_API_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            editor_interface_language: std::env::var("EDITOR_INTERFACE_LANGUAGE")
                .ok()
                .filter(|lang| !lang.is_empty()),
            editor_modules: parse_list(
                &std::env::var("EDITOR_MODULES").unwrap_or_else(|_| "*".to_string()),
            ),

            // Server
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            debug: std::env::var("DEBUG")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        })
    }

    /// Directory holding the scripts of the `core` module.
    pub fn core_script_dir(&self) -> PathBuf {
        self.backend_path.join("Core").join("Js")
    }

    /// Directory holding the scripts of a regular module.
    pub fn module_script_dir(&self, module: &str) -> PathBuf {
        self.backend_path.join("Modules").join(module).join("Js")
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_path
    }
}

/// Parse a comma-separated list, dropping blanks.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 9] = [
        "DATABASE_URL",
        "CACHE_PATH",
        "BACKEND_PATH",
        "SITE_DEFAULT_LANGUAGE",
        "BACKEND_API_KEY",
        "EDITOR_INTERFACE_LANGUAGE",
        "EDITOR_MODULES",
        "PORT",
        "DEBUG",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    // ==================== from_env Tests ====================

    #[test]
    #[serial]
    fn test_from_env_requires_database_url() {
        clear_env();
        let result = Config::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("DATABASE_URL"));
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        std::env::set_var("DATABASE_URL", "sqlite::memory:");

        let config = Config::from_env().expect("Should load");
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.cache_path, PathBuf::from("var/cache"));
        assert_eq!(config.backend_path, PathBuf::from("src/Backend"));
        assert_eq!(config.site_default_language, "en");
        assert_eq!(config.port, 8080);
        assert!(!config.debug);
        assert!(config.api_key.is_none());
        assert_eq!(config.editor_modules, vec!["*".to_string()]);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("DATABASE_URL", "sqlite:cms.db");
        std::env::set_var("PORT", "9000");
        std::env::set_var("DEBUG", "true");
        std::env::set_var("BACKEND_API_KEY", "secret");
        std::env::set_var("EDITOR_MODULES", "Pages, Blog ,,");
        std::env::set_var("SITE_DEFAULT_LANGUAGE", "nl");

        let config = Config::from_env().expect("Should load");
        assert_eq!(config.port, 9000);
        assert!(config.debug);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.editor_modules, vec!["Pages", "Blog"]);
        assert_eq!(config.site_default_language, "nl");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_port_falls_back() {
        clear_env();
        std::env::set_var("DATABASE_URL", "sqlite::memory:");
        std::env::set_var("PORT", "not-a-port");

        let config = Config::from_env().expect("Should load");
        assert_eq!(config.port, 8080);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_empty_api_key_is_disabled() {
        clear_env();
        std::env::set_var("DATABASE_URL", "sqlite::memory:");
        std::env::set_var("BACKEND_API_KEY", "");

        let config = Config::from_env().expect("Should load");
        assert!(config.api_key.is_none());

        clear_env();
    }

    // ==================== Path Tests ====================

    #[test]
    fn test_script_dirs() {
        let config = Config {
            database_url: "sqlite::memory:".to_string(),
            cache_path: PathBuf::from("/tmp/cache"),
            backend_path: PathBuf::from("/srv/Backend"),
            site_default_language: "en".to_string(),
            api_key: None,
            editor_interface_language: None,
            editor_modules: vec![],
            port: 8080,
            debug: false,
        };

        assert_eq!(config.core_script_dir(), PathBuf::from("/srv/Backend/Core/Js"));
        assert_eq!(
            config.module_script_dir("Pages"),
            PathBuf::from("/srv/Backend/Modules/Pages/Js")
        );
        assert_eq!(config.cache_root(), Path::new("/tmp/cache"));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" yes "));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("off"));
        assert!(!parse_flag(""));
    }
}
