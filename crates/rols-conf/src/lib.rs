mod merge;
mod resolver;
pub mod sources;

use std::fs;
use std::path::Path;
use std::time::Duration;

use config::Config as Layered;
use config::ConfigError as ExternalConfigError;
use config::File;
use config::FileFormat;
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

pub use crate::merge::camel_case;
pub use crate::merge::merge;
pub use crate::resolver::Config;
pub use crate::resolver::ResolvedConfig;

/// Name of the server; also the namespace of its settings in client pushes.
pub const SERVER_NAME: &str = "rols";

const DEFAULT_PLUGIN_TIMEOUT_MS: u64 = 5000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration build/deserialize error")]
    Config(#[from] ExternalConfigError),
    #[error("Failed to read pyproject.toml")]
    PyprojectIo(#[from] std::io::Error),
    #[error("Failed to parse pyproject.toml TOML")]
    PyprojectParse(#[from] toml::de::Error),
    #[error("Failed to serialize extracted pyproject data")]
    PyprojectSerialize(#[from] toml::ser::Error),
}

/// Server-level settings, as opposed to the per-plugin tree handled by [`Config`].
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub debug: bool,
    pub log_level: Option<String>,
    pub plugin_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: None,
            plugin_timeout_ms: DEFAULT_PLUGIN_TIMEOUT_MS,
        }
    }
}

impl Settings {
    pub fn new(project_root: &Path) -> Result<Self, ConfigError> {
        let user_config_file = ProjectDirs::from("io.github", "rols", SERVER_NAME)
            .map(|proj_dirs| proj_dirs.config_dir().join("rols.toml"));

        Self::load_from_paths(project_root, user_config_file.as_deref())
    }

    fn load_from_paths(
        project_root: &Path,
        user_config_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Layered::builder();

        if let Some(path) = user_config_path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let pyproject_path = project_root.join("pyproject.toml");
        if pyproject_path.exists() {
            let content = fs::read_to_string(&pyproject_path)?;
            let full_toml_value: toml::Value = toml::from_str(&content)?;

            let rols_table = ["tool", SERVER_NAME]
                .iter()
                .try_fold(&full_toml_value, |current, &key| current.get(key))
                .and_then(toml::Value::as_table);

            if let Some(rols_table) = rols_table {
                let rols_toml_string = toml::to_string(rols_table)?;
                builder = builder.add_source(File::from_str(&rols_toml_string, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            File::from(project_root.join(".rols.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        builder = builder.add_source(
            File::from(project_root.join("rols.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        let config = builder.build()?;
        let settings = config.try_deserialize()?;
        Ok(settings)
    }

    #[must_use]
    pub fn plugin_timeout(&self) -> Duration {
        Duration::from_millis(self.plugin_timeout_ms)
    }

    /// Log filter asked for by the settings. An explicit `log_level` wins over `debug`.
    #[must_use]
    pub fn log_directive(&self) -> Option<&str> {
        self.log_level
            .as_deref()
            .or_else(|| self.debug.then_some("debug"))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    fn debug(debug: bool) -> Settings {
        Settings {
            debug,
            ..Settings::default()
        }
    }

    mod defaults {
        use super::*;

        #[test]
        fn test_load_no_files() {
            let dir = tempdir().unwrap();
            let settings = Settings::load_from_paths(dir.path(), None).unwrap();
            assert_eq!(settings, Settings::default());
            assert_eq!(settings.plugin_timeout(), Duration::from_secs(5));
        }
    }

    mod project_files {
        use super::*;

        #[test]
        fn test_load_rols_toml_only() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("rols.toml"), "debug = true").unwrap();
            let settings = Settings::load_from_paths(dir.path(), None).unwrap();
            assert_eq!(settings, debug(true));
        }

        #[test]
        fn test_load_dot_rols_toml_only() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join(".rols.toml"), "debug = true").unwrap();
            let settings = Settings::load_from_paths(dir.path(), None).unwrap();
            assert_eq!(settings, debug(true));
        }

        #[test]
        fn test_load_pyproject_toml_only() {
            let dir = tempdir().unwrap();
            let content = "[tool.rols]\ndebug = true\nplugin_timeout_ms = 250\n";
            fs::write(dir.path().join("pyproject.toml"), content).unwrap();
            let settings = Settings::load_from_paths(dir.path(), None).unwrap();
            assert_eq!(
                settings,
                Settings {
                    debug: true,
                    plugin_timeout_ms: 250,
                    ..Settings::default()
                }
            );
        }

        #[test]
        fn test_pyproject_without_tool_table() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("pyproject.toml"), "[project]\nname = \"x\"\n").unwrap();
            let settings = Settings::load_from_paths(dir.path(), None).unwrap();
            assert_eq!(settings, Settings::default());
        }
    }

    mod priority {
        use super::*;

        #[test]
        fn test_project_priority_rols_overrides_dot_rols() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join(".rols.toml"), "debug = false").unwrap();
            fs::write(dir.path().join("rols.toml"), "debug = true").unwrap();
            let settings = Settings::load_from_paths(dir.path(), None).unwrap();
            assert_eq!(settings, debug(true));
        }

        #[test]
        fn test_project_priority_dot_rols_overrides_pyproject() {
            let dir = tempdir().unwrap();
            fs::write(
                dir.path().join("pyproject.toml"),
                "[tool.rols]\ndebug = false\n",
            )
            .unwrap();
            fs::write(dir.path().join(".rols.toml"), "debug = true").unwrap();
            let settings = Settings::load_from_paths(dir.path(), None).unwrap();
            assert_eq!(settings, debug(true));
        }

        #[test]
        fn test_user_priority_project_overrides_user() {
            let user_dir = tempdir().unwrap();
            let project_dir = tempdir().unwrap();
            let user_conf_path = user_dir.path().join("rols.toml");
            fs::write(&user_conf_path, "debug = true\nlog_level = \"debug\"").unwrap();
            fs::write(project_dir.path().join("rols.toml"), "debug = false").unwrap();

            let settings =
                Settings::load_from_paths(project_dir.path(), Some(&user_conf_path)).unwrap();
            assert_eq!(
                settings,
                Settings {
                    log_level: Some("debug".to_string()),
                    ..Settings::default()
                }
            );
        }
    }

    mod log_directive {
        use super::*;

        #[test]
        fn test_defaults_leave_logging_alone() {
            assert_eq!(Settings::default().log_directive(), None);
        }

        #[test]
        fn test_debug_flag() {
            assert_eq!(debug(true).log_directive(), Some("debug"));
        }

        #[test]
        fn test_log_level_wins_over_debug() {
            let dir = tempdir().unwrap();
            fs::write(
                dir.path().join("rols.toml"),
                "debug = true\nlog_level = \"rols_hooks=trace\"\n",
            )
            .unwrap();
            let settings = Settings::load_from_paths(dir.path(), None).unwrap();
            assert_eq!(settings.log_directive(), Some("rols_hooks=trace"));
        }
    }

    mod user_config {
        use super::*;

        #[test]
        fn test_no_user_config_file_present() {
            let user_dir = tempdir().unwrap();
            let project_dir = tempdir().unwrap();
            let user_conf_path = user_dir.path().join("rols.toml");
            fs::write(project_dir.path().join("rols.toml"), "debug = true").unwrap();

            let settings =
                Settings::load_from_paths(project_dir.path(), Some(&user_conf_path)).unwrap();
            assert_eq!(settings, debug(true));
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn test_invalid_toml_content() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("rols.toml"), "debug = not_a_boolean").unwrap();
            let result = Settings::load_from_paths(dir.path(), None);
            assert!(matches!(result, Err(ConfigError::Config(_))));
        }

        #[test]
        fn test_invalid_pyproject() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("pyproject.toml"), "[tool.rols").unwrap();
            let result = Settings::load_from_paths(dir.path(), None);
            assert!(matches!(result, Err(ConfigError::PyprojectParse(_))));
        }
    }
}
