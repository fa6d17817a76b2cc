//! Config file discovery.
//!
//! Resolution order (first usable file wins):
//! 1. Explicit path (`--config` or `TOLLGATE_CONFIG`)
//! 2. `./tollgate.jsonc`, then `./tollgate.json` (project-local)
//! 3. `~/.config/tollgate/tollgate.jsonc` (user config dir)
//!
//! Finding nothing is not an error: the result is an empty config and every
//! request passes through unauthenticated.

use std::path::{Path, PathBuf};

use crate::{ConfigError, Result, TollgateConfig};

/// Project-local config filenames, in order of preference.
const PROJECT_CONFIG_FILES: &[&str] = &["tollgate.jsonc", "tollgate.json"];

/// Config filename within the user config directory.
const USER_CONFIG_FILE: &str = "tollgate.jsonc";

/// Application name for config directory resolution.
const APP_NAME: &str = "tollgate";

/// Environment variable naming an explicit config file.
const CONFIG_FILE_ENV: &str = "TOLLGATE_CONFIG";

/// Environment variable to override the user config directory.
const CONFIG_DIR_ENV: &str = "TOLLGATE_CONFIG_DIR";

/// Result of config discovery and loading.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// The parsed configuration.
    pub config: TollgateConfig,
    /// File the config was loaded from, if any.
    pub source: Option<PathBuf>,
    /// Paths that were checked, in order.
    pub searched: Vec<PathBuf>,
    /// Warnings generated during loading (unset variables, skipped files).
    pub warnings: Vec<String>,
}

/// Load configuration by discovery.
///
/// `explicit` (or `TOLLGATE_CONFIG` when `explicit` is `None`) names a file
/// that must exist and parse. Otherwise candidates are searched under
/// `project_dir` (default: current directory) and the user config dir.
pub fn load_config(explicit: Option<&Path>, project_dir: Option<&Path>) -> Result<LoadedConfig> {
    let from_env = std::env::var(CONFIG_FILE_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let explicit = explicit.map(Path::to_path_buf).or(from_env);
    load_config_with_options(explicit.as_deref(), project_dir, user_config_dir().as_deref())
}

/// Load configuration with explicit control over every location.
pub fn load_config_with_options(
    explicit: Option<&Path>,
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let (config, warnings) = load_config_file(path)?;
        return Ok(LoadedConfig {
            config,
            source: Some(path.to_path_buf()),
            searched: vec![path.to_path_buf()],
            warnings,
        });
    }

    let project_dir = project_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut candidates: Vec<PathBuf> = PROJECT_CONFIG_FILES
        .iter()
        .map(|name| project_dir.join(name))
        .collect();
    if let Some(dir) = config_dir {
        candidates.push(dir.join(USER_CONFIG_FILE));
    }

    let mut loaded = LoadedConfig::default();
    for path in candidates {
        loaded.searched.push(path.clone());
        if !path.is_file() {
            continue;
        }
        match load_config_file(&path) {
            Ok((config, warnings)) => {
                loaded.config = config;
                loaded.warnings.extend(warnings);
                loaded.source = Some(path);
                break;
            }
            Err(e) => {
                loaded
                    .warnings
                    .push(format!("Failed to load {}: {}", path.display(), e));
            }
        }
    }

    Ok(loaded)
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<(TollgateConfig, Vec<String>)> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    TollgateConfig::from_jsonc(&contents)
}

/// Get the user config file path.
pub fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the user config directory for tollgate.
///
/// Checks `TOLLGATE_CONFIG_DIR` first, then the platform default
/// (`~/.config/tollgate` on Linux, `~/Library/Application Support/tollgate`
/// on macOS).
pub fn user_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const PROVIDER_DOC: &str = r#"{
      "provider": {
        "kong": {
          "options": {
            "baseURL": "https://gateway.example.com/v1", // matched as prefix
            "oauth": {
              "tokenUrl": "https://auth.example.com/token",
              "clientId": "id",
              "clientSecret": "secret"
            }
          }
        }
      }
    }"#;

    #[test]
    fn test_user_config_path_shape() {
        if let Some(p) = user_config_path() {
            assert!(p.ends_with("tollgate.jsonc"));
        }
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tollgate.jsonc");
        fs::write(&path, PROVIDER_DOC).unwrap();

        let (config, warnings) = load_config_file(&path).unwrap();
        assert!(warnings.is_empty());
        assert!(config.providers.contains_key("kong"));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/tollgate.jsonc")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_explicit_path_must_parse() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.jsonc");
        fs::write(&path, "{ not json").unwrap();

        let err = load_config_with_options(Some(&path), None, None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_project_jsonc_preferred_over_json() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("tollgate.jsonc"), PROVIDER_DOC).unwrap();
        fs::write(dir.path().join("tollgate.json"), "{}").unwrap();
        let empty_config_dir = TempDir::new().unwrap();

        let loaded =
            load_config_with_options(None, Some(dir.path()), Some(empty_config_dir.path()))
                .unwrap();
        assert!(loaded.source.unwrap().ends_with("tollgate.jsonc"));
        assert_eq!(loaded.config.providers.len(), 1);
    }

    #[test]
    fn test_falls_back_to_user_config_dir() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(user.path().join("tollgate.jsonc"), PROVIDER_DOC).unwrap();

        let loaded =
            load_config_with_options(None, Some(project.path()), Some(user.path())).unwrap();
        assert!(loaded.source.unwrap().starts_with(user.path()));
        assert_eq!(loaded.searched.len(), 3);
    }

    #[test]
    fn test_no_files_yields_empty_config() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();

        let loaded =
            load_config_with_options(None, Some(project.path()), Some(user.path())).unwrap();
        assert!(loaded.config.is_empty());
        assert!(loaded.source.is_none());
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_malformed_candidate_warns_and_continues() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(project.path().join("tollgate.jsonc"), "{ broken").unwrap();
        fs::write(user.path().join("tollgate.jsonc"), PROVIDER_DOC).unwrap();

        let loaded =
            load_config_with_options(None, Some(project.path()), Some(user.path())).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("Failed to load"));
        assert!(loaded.config.providers.contains_key("kong"));
    }
}
