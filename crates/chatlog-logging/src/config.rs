//! Diagnostic log settings
//!
//! Read from the `[log]` table of the chatlog configuration file:
//!
//! ```toml
//! [log]
//! level = "debug"
//!
//! [log.console]
//! pretty = true
//!
//! [log.file]
//! directory = "/var/log/chatlog"
//! rotation = "hourly"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where diagnostic events go and at which level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// stderr output
    pub console: ConsoleConfig,
    /// Rolling JSON files; disabled when `None`
    pub file: Option<FileConfig>,
    /// JSON event layout, shared by console and file output
    pub json: JsonConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleConfig::default(),
            file: None,
            json: JsonConfig::default(),
        }
    }
}

/// stderr output settings
///
/// Console output is JSON lines unless `pretty` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub pretty: bool,
    /// Colors, only meaningful with `pretty`
    pub ansi: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pretty: false,
            ansi: false,
        }
    }
}

/// Rolling file output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub directory: PathBuf,
    /// File name prefix; rotated files get a date suffix
    pub prefix: String,
    pub rotation: RotationStrategy,
}

impl FileConfig {
    /// Daily-rotated `chatlog.*` files under `directory`
    pub fn in_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            prefix: "chatlog".to_string(),
            rotation: RotationStrategy::Daily,
        }
    }
}

/// How often the diagnostic log file rolls over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// One file, `<prefix>.log`
    Never,
}

/// JSON event layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonConfig {
    /// Put event fields at the top level instead of under `fields`
    pub flatten_events: bool,
    /// Attach the list of entered spans
    pub include_spans: bool,
    /// Attach source file and line
    pub include_location: bool,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self {
            flatten_events: true,
            include_spans: true,
            include_location: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_json_console_at_info() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console.enabled);
        assert!(!config.console.pretty);
        assert!(config.file.is_none());
    }

    #[test]
    fn test_file_in_directory() {
        let file = FileConfig::in_directory("/var/log/chatlog");
        assert_eq!(file.directory, PathBuf::from("/var/log/chatlog"));
        assert_eq!(file.prefix, "chatlog");
        assert_eq!(file.rotation, RotationStrategy::Daily);
    }

    #[test]
    fn test_partial_table_keeps_defaults() {
        let config: LogConfig = serde_json::from_str(
            r#"{"level": "debug", "console": {"pretty": true}, "file": {"rotation": "hourly"}}"#,
        )
        .unwrap();
        assert_eq!(config.level, "debug");
        assert!(config.console.pretty);
        assert!(config.console.enabled);

        let file = config.file.unwrap();
        assert_eq!(file.rotation, RotationStrategy::Hourly);
        assert_eq!(file.directory, PathBuf::from("./logs"));
        assert!(config.json.flatten_events);
    }
}
