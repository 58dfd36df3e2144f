//! Log entry and channel key types
//!
//! [`LogEntry`] is the unit that is buffered and persisted. Its serialized
//! field names (`user`, `timestamp`, `content`, `channel`) are part of the
//! on-disk format and must not change.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier used to partition entries and pick the target file
///
/// Distinct from the human-readable channel name stored inside each entry,
/// which may change over time without affecting the key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelKey(String);

impl ChannelKey {
    /// Create a new channel key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File stem for this channel's log, without extension
    ///
    /// Keys made only of ASCII alphanumerics, `-` and `_` are used verbatim.
    /// Anything else is hex-encoded behind an `x` marker so the mapping stays
    /// injective and can never point outside the log directory.
    pub fn file_stem(&self) -> String {
        let plain = !self.0.is_empty()
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

        if plain {
            format!("channel_{}", self.0)
        } else {
            format!("channel_x{}", hex::encode(self.0.as_bytes()))
        }
    }

    /// File name for this channel's log
    pub fn file_name(&self) -> String {
        format!("{}.json", self.file_stem())
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ChannelKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// A single observed chat message
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Display name of the message author
    #[serde(rename = "user")]
    pub author: String,
    /// RFC 3339 UTC timestamp with millisecond precision
    #[serde(rename = "timestamp")]
    pub timestamp_utc: String,
    /// Message body
    #[serde(rename = "content")]
    pub text: String,
    /// Human-readable channel label at the time of the message
    #[serde(rename = "channel")]
    pub channel_name: String,
}

impl LogEntry {
    /// Create an entry stamped with the current time
    pub fn new(
        author: impl Into<String>,
        text: impl Into<String>,
        channel_name: impl Into<String>,
    ) -> Self {
        Self::at(Utc::now(), author, text, channel_name)
    }

    /// Create an entry stamped with the given time
    pub fn at(
        time: DateTime<Utc>,
        author: impl Into<String>,
        text: impl Into<String>,
        channel_name: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            timestamp_utc: format_timestamp(time),
            text: text.into(),
            channel_name: channel_name.into(),
        }
    }

    /// Length of the message body in characters
    pub fn text_chars(&self) -> usize {
        self.text.chars().count()
    }
}

/// Format a timestamp the way entries store it (`2024-05-01T12:00:00.000Z`)
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_plain_key_file_name() {
        assert_eq!(ChannelKey::new("1234567890").file_name(), "channel_1234567890.json");
        assert_eq!(ChannelKey::new("general-chat_2").file_stem(), "channel_general-chat_2");
    }

    #[test]
    fn test_unsafe_key_is_hex_encoded() {
        let key = ChannelKey::new("../etc");
        let name = key.file_name();
        assert_eq!(name, "channel_x2e2e2f657463.json");
        assert!(!name.contains('/'));

        assert_eq!(ChannelKey::new("").file_stem(), "channel_x");
    }

    #[test]
    fn test_distinct_keys_map_to_distinct_files() {
        let a = ChannelKey::new("a b");
        let b = ChannelKey::new("a_b");
        assert_ne!(a.file_name(), b.file_name());
    }

    #[test]
    fn test_entry_serializes_with_legacy_field_names() {
        let time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let entry = LogEntry::at(time, "alice", "hello", "general");
        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(value["user"], "alice");
        assert_eq!(value["timestamp"], "2024-05-01T12:00:00.000Z");
        assert_eq!(value["content"], "hello");
        assert_eq!(value["channel"], "general");
        assert_eq!(value.as_object().unwrap().len(), 4);
    }

    #[test]
    fn test_entry_parses_legacy_json() {
        let json = r#"{"user":"bob","timestamp":"2023-01-01T00:00:00.000Z","content":"hi","channel":"dm"}"#;
        let entry: LogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.author, "bob");
        assert_eq!(entry.text, "hi");
        assert_eq!(entry.channel_name, "dm");
    }

    #[test]
    fn test_text_chars_counts_characters() {
        let entry = LogEntry::new("a", "héllo ✓", "c");
        assert_eq!(entry.text_chars(), 7);
    }
}
