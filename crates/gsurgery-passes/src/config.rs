//! Config file loading
//!
//! Rule tables, taxonomies and pipelines are plain serde structs. The file
//! format is picked by extension:
//!
//! | Extension | Format |
//! |---|---|
//! | `.toml` | TOML |
//! | `.yaml`, `.yml` | YAML |
//! | `.json` | JSON |

use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Supported config file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Supported file extensions (without dot)
    pub const EXTENSIONS: &'static [&'static str] = &["toml", "yaml", "yml", "json"];

    /// Pick a format from a path's extension
    ///
    /// # Errors
    /// [`ConfigError::UnsupportedFormat`] for anything else
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("toml") => Ok(Self::Toml),
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("json") => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Deserialize `text`; `origin` only labels errors
    ///
    /// # Errors
    /// [`ConfigError::Syntax`] carrying the parser's message
    pub fn parse<T: DeserializeOwned>(self, text: &str, origin: &Path) -> Result<T, ConfigError> {
        match self {
            Self::Toml => toml::from_str(text).map_err(|e| ConfigError::syntax_error(origin, e)),
            Self::Yaml => {
                serde_yaml::from_str(text).map_err(|e| ConfigError::syntax_error(origin, e))
            }
            Self::Json => {
                serde_json::from_str(text).map_err(|e| ConfigError::syntax_error(origin, e))
            }
        }
    }
}

/// Read and deserialize a config file
///
/// # Errors
/// Unknown extension, I/O failure or a syntax error
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io_error(path, e))?;
    let value = format.parse(&text, path)?;
    tracing::debug!(path = %path.display(), ?format, "loaded config");
    Ok(value)
}
