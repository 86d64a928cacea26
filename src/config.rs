//! Reader configuration
//!
//! A split reader takes a single tunable: the maximum number of bytes kept
//! from one line. It can be supplied programmatically, from a flat
//! string-to-string property map (the shape job configurations usually
//! arrive in), or from a TOML document.
//!
//! # Example
//!
//! ```
//! use splitline::ReaderConfig;
//! use std::collections::HashMap;
//!
//! # fn main() -> splitline::Result<()> {
//! let mut props = HashMap::new();
//! props.insert(
//!     splitline::config::MAX_LINE_LENGTH_KEY.to_string(),
//!     "4096".to_string(),
//! );
//! let config = ReaderConfig::from_properties(&props)?;
//! assert_eq!(config.max_line_length, 4096);
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SplitLineError};
use serde::Deserialize;
use std::collections::HashMap;

/// Property key holding the maximum line length
pub const MAX_LINE_LENGTH_KEY: &str = "splitline.record-reader.max-line-length";

/// Default maximum line length (unbounded)
pub const DEFAULT_MAX_LINE_LENGTH: usize = usize::MAX;

/// Configuration for [`SplitLineReader`](crate::SplitLineReader)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderConfig {
    /// Longest line value returned; longer lines are truncated
    pub max_line_length: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl ReaderConfig {
    /// Set the maximum line length
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    /// Build a configuration from a property map
    ///
    /// Keys other than [`MAX_LINE_LENGTH_KEY`] are ignored, since property
    /// maps are usually shared with unrelated components.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = props.get(MAX_LINE_LENGTH_KEY) {
            config.max_line_length =
                raw.trim()
                    .parse::<usize>()
                    .map_err(|e| SplitLineError::InvalidConfig {
                        key: MAX_LINE_LENGTH_KEY.to_string(),
                        value: raw.clone(),
                        msg: e.to_string(),
                    })?;
        }

        Ok(config)
    }

    /// Build a configuration from a TOML document
    ///
    /// ```
    /// use splitline::ReaderConfig;
    ///
    /// # fn main() -> splitline::Result<()> {
    /// let config = ReaderConfig::from_toml_str("max_line_length = 128")?;
    /// assert_eq!(config.max_line_length, 128);
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| SplitLineError::InvalidConfig {
            key: "max_line_length".to_string(),
            value: s.trim().to_string(),
            msg: e.message().to_string(),
        })
    }
}
