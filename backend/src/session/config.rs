//! Session configuration

use serde::{Deserialize, Serialize};

use crate::engine::FormatOptions;

/// Configuration for a [`RunSession`](crate::session::RunSession)
///
/// # Example
///
/// ```
/// use jq_stream_core_rs::SessionConfig;
///
/// let config = SessionConfig::from_json(r#"{"format": {"pretty": true}}"#).unwrap();
/// assert!(config.format.pretty);
/// assert_eq!(config.format.indent, 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How `current_text` and `current_raw_string` render values
    pub format: FormatOptions,
}

impl SessionConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
