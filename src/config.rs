//! Configuration loading and plugin config scopes.
//!
//! The main config and per-plugin configs are TOML files. Consumers read
//! them through defaulted accessors (`get_str`, `get_bool`, `get_list`,
//! ...) rather than a deserialized struct, because plugins declare their
//! own keys the core knows nothing about.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A configuration scope backed by a TOML table.
#[derive(Debug, Clone)]
pub struct Config {
    path: PathBuf,
    table: toml::Table,
    on_disk: bool,
}

impl Config {
    /// Load a scope from `path`. The file must exist and parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(path, &content)
    }

    /// Load a scope that may be absent: a missing file yields an empty
    /// scope that still knows its path. A file that exists but does not
    /// parse is still an error.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self {
                path: path.to_path_buf(),
                table: toml::Table::new(),
                on_disk: false,
            })
        }
    }

    /// Parse a scope from in-memory TOML, recording `path` as its origin.
    pub fn parse_str(path: impl AsRef<Path>, content: &str) -> Result<Self, ConfigError> {
        let table = content.parse::<toml::Table>()?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            table,
            on_disk: true,
        })
    }

    /// The file this scope was resolved against.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the backing file existed when the scope was resolved.
    pub fn on_disk(&self) -> bool {
        self.on_disk
    }

    /// Raw value lookup.
    pub fn value(&self, key: &str) -> Option<&toml::Value> {
        self.table.get(key)
    }

    /// String value for `key`, falling back to `default`. Non-string
    /// scalars are rendered to text, so `port = 6667` still reads as a
    /// string where callers want one.
    pub fn get_str(&self, key: &str, default: &str) -> String {
        match self.table.get(key) {
            Some(toml::Value::String(s)) => s.clone(),
            Some(value) => value.to_string(),
            None => default.to_string(),
        }
    }

    /// Boolean value for `key`, falling back to `default`.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.table.get(key) {
            Some(toml::Value::Boolean(b)) => *b,
            _ => default,
        }
    }

    /// Integer value for `key`, falling back to `default`.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.table.get(key) {
            Some(toml::Value::Integer(n)) => *n,
            _ => default,
        }
    }

    /// Port-sized integer value for `key`.
    pub fn get_u16(&self, key: &str, default: u16) -> u16 {
        u16::try_from(self.get_int(key, i64::from(default))).unwrap_or(default)
    }

    /// String-list value for `key`. A single string is tolerated as a
    /// one-element list; anything else reads as empty.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.table.get(key) {
            Some(toml::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(toml::Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config::parse_str(
            "test.toml",
            r##"
nick = "testbot"
port = 6667
verbose = true
quiet = false
channel = ["#one", "#two"]
plugin = "karma"
"##,
        )
        .unwrap()
    }

    #[test]
    fn test_get_str_with_default() {
        let conf = sample();
        assert_eq!(conf.get_str("nick", "fallback"), "testbot");
        assert_eq!(conf.get_str("missing", "fallback"), "fallback");
    }

    #[test]
    fn test_non_string_scalars_render_as_text() {
        let conf = sample();
        assert_eq!(conf.get_str("port", ""), "6667");
        assert_eq!(conf.get_str("verbose", ""), "true");
    }

    #[test]
    fn test_get_bool() {
        let conf = sample();
        assert!(conf.get_bool("verbose", false));
        assert!(!conf.get_bool("quiet", true));
        assert!(conf.get_bool("missing", true));
    }

    #[test]
    fn test_get_u16() {
        let conf = sample();
        assert_eq!(conf.get_u16("port", 6697), 6667);
        assert_eq!(conf.get_u16("missing", 6697), 6697);
    }

    #[test]
    fn test_get_list() {
        let conf = sample();
        assert_eq!(conf.get_list("channel"), vec!["#one", "#two"]);
        // single strings read as one-element lists
        assert_eq!(conf.get_list("plugin"), vec!["karma"]);
        assert!(conf.get_list("missing").is_empty());
    }

    #[test]
    fn test_load_or_empty_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let conf = Config::load_or_empty(&path).unwrap();
        assert!(!conf.on_disk());
        assert_eq!(conf.path(), path.as_path());
        assert_eq!(conf.get_str("anything", "default"), "default");
    }

    #[test]
    fn test_load_rejects_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
        // malformed files are an error even on the lenient path
        assert!(Config::load_or_empty(&path).is_err());
    }
}
