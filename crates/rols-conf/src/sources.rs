//! Per-tool configuration files
//!
//! Analysis tools keep their options in INI sections (`[pycodestyle]` in `setup.cfg`,
//! `[flake8]` in `.flake8`, ...) or in `pyproject.toml` under `[tool.<name>]`. Each
//! [`ToolSource`] knows where its tool looks and how to turn the raw strings into
//! typed, camel-cased settings.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use config::Config;
use config::File;
use config::FileFormat;
use serde_json::Map;
use serde_json::Value;

use crate::merge::camel_case;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptionKind {
    Bool,
    Int,
    List,
}

#[derive(Debug, Clone, Copy)]
pub struct ToolSource {
    name: &'static str,
    project_files: &'static [&'static str],
    user_file: &'static str,
    options: &'static [(&'static str, OptionKind)],
}

pub const PYCODESTYLE: ToolSource = ToolSource {
    name: "pycodestyle",
    project_files: &["pycodestyle.cfg", "setup.cfg", "tox.ini"],
    user_file: "pycodestyle",
    options: &[
        ("exclude", OptionKind::List),
        ("filename", OptionKind::List),
        ("hang-closing", OptionKind::Bool),
        ("ignore", OptionKind::List),
        ("indent-size", OptionKind::Int),
        ("max-doc-length", OptionKind::Int),
        ("max-line-length", OptionKind::Int),
        ("select", OptionKind::List),
    ],
};

pub const FLAKE8: ToolSource = ToolSource {
    name: "flake8",
    project_files: &[".flake8", "setup.cfg", "tox.ini"],
    user_file: "flake8",
    options: &[
        ("exclude", OptionKind::List),
        ("extend-ignore", OptionKind::List),
        ("filename", OptionKind::List),
        ("hang-closing", OptionKind::Bool),
        ("ignore", OptionKind::List),
        ("max-complexity", OptionKind::Int),
        ("max-line-length", OptionKind::Int),
        ("select", OptionKind::List),
    ],
};

/// Every tool whose project files the resolver understands.
pub const SOURCES: &[ToolSource] = &[PYCODESTYLE, FLAKE8];

impl ToolSource {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether `dir` holds any file this tool reads its options from.
    #[must_use]
    pub fn is_configured_in(&self, dir: &Path) -> bool {
        self.project_files
            .iter()
            .any(|file| dir.join(file).is_file())
            || self.pyproject_table(dir).is_some()
    }

    /// Options from the project files in `dir`. Files later in the search list win,
    /// `pyproject.toml` has the lowest precedence.
    #[must_use]
    pub fn load_project(&self, dir: &Path) -> Option<Map<String, Value>> {
        let mut found = false;
        let mut settings = Map::new();

        if let Some(table) = self.pyproject_table(dir) {
            found = true;
            for (key, value) in table {
                settings.insert(camel_case(&key), self.coerce(&key, value));
            }
        }

        for file in self.project_files {
            if let Some(section) = self.load_ini(&dir.join(file)) {
                found = true;
                settings.extend(section);
            }
        }

        found.then_some(settings)
    }

    /// Options from the tool's file in the user configuration directory.
    #[must_use]
    pub fn load_user(&self, config_dir: &Path) -> Option<Map<String, Value>> {
        self.load_ini(&config_dir.join(self.user_file))
    }

    fn load_ini(&self, path: &Path) -> Option<Map<String, Value>> {
        if !path.is_file() {
            return None;
        }

        let section = Config::builder()
            .add_source(File::from(path).format(FileFormat::Ini))
            .build()
            .and_then(|config| config.get_table(self.name));

        let section = match section {
            Ok(section) => section,
            Err(config::ConfigError::NotFound(_)) => return None,
            Err(err) => {
                tracing::warn!("Skipping {}: {}", path.display(), err);
                return None;
            }
        };

        let mut settings = Map::new();
        for (key, value) in section {
            match value.into_string() {
                Ok(raw) => {
                    let value = self.coerce(&key, Value::String(raw));
                    settings.insert(camel_case(&key), value);
                }
                Err(err) => {
                    tracing::debug!("Ignoring {} in {}: {}", key, path.display(), err);
                }
            }
        }
        Some(settings)
    }

    fn pyproject_table(&self, dir: &Path) -> Option<Map<String, Value>> {
        let path = dir.join("pyproject.toml");
        if !path.is_file() {
            return None;
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read {}: {}", path.display(), err);
                return None;
            }
        };
        let document: toml::Table = match toml::from_str(&content) {
            Ok(document) => document,
            Err(err) => {
                tracing::warn!("Failed to parse {}: {}", path.display(), err);
                return None;
            }
        };

        let table = document.get("tool")?.get(self.name)?.as_table()?;
        match serde_json::to_value(table) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    fn coerce(&self, key: &str, value: Value) -> Value {
        let Value::String(raw) = value else {
            return value;
        };
        let raw = raw.trim();

        let kind = self
            .options
            .iter()
            .find(|(option, _)| option.replace('_', "-") == key.replace('_', "-"))
            .map(|(_, kind)| *kind);

        match kind {
            Some(OptionKind::List) => Value::Array(
                raw.split([',', '\n'])
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| Value::String(item.to_string()))
                    .collect(),
            ),
            Some(OptionKind::Int) => raw
                .parse::<i64>()
                .map_or_else(|_| Value::String(raw.to_string()), Value::from),
            Some(OptionKind::Bool) => {
                parse_bool(raw).map_or_else(|| Value::String(raw.to_string()), Value::Bool)
            }
            None => infer(raw),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn infer(raw: &str) -> Value {
    if let Ok(number) = raw.parse::<i64>() {
        return Value::from(number);
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

/// Directory holding the user's per-tool files, `~/.config` on Linux.
#[must_use]
pub fn user_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf())
}
