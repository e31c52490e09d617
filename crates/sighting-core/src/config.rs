//! Application configuration management.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables such as `SIGHTING__FILTER__MIN_RSSI=-80`.
//!
//! ```toml
//! [filter]
//! min_rssi = -95
//! nearby_rssi = -50
//! require_identifier = false
//! name_equals = "softlogistics"
//!
//! [wire]
//! timestamp_format = "rfc3339"
//! ```

use std::path::{Path, PathBuf};

use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingest::ObservationFilter;
use crate::observation::{MAX_RSSI_DBM, MIN_RSSI_DBM};
use crate::wire::{TimestampFormat, WireCodec};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "SIGHTING";

/// Errors from loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// The configuration file could not be written.
    #[error("Failed to write {path}: {source}")]
    WriteError {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The layered sources could not be merged or deserialized.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// Settings could not be rendered as TOML.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single setting is out of bounds.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted setting path.
        field: String,
        /// What is wrong.
        message: String,
    },

    /// Several settings are out of bounds.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Wire output settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireSettings {
    /// How `date` is written.
    pub timestamp_format: TimestampFormat,
}

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Sighting acceptance rules.
    pub filter: ObservationFilter,

    /// Wire output.
    pub wire: WireSettings,
}

impl Settings {
    /// Load settings, treating a missing file as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or environment cannot be parsed or the
    /// merged settings fail validation.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::load_layers(path.as_ref(), false)
    }

    /// Load settings, requiring the file to exist.
    ///
    /// # Errors
    ///
    /// As [`Settings::load`], plus [`ConfigError::NotFound`].
    pub fn load_required(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::load_layers(path, true)
    }

    fn load_layers(path: &Path, required: bool) -> ConfigResult<Self> {
        let settings: Self = config::Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Write settings as pretty TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        })
    }

    /// Check every setting, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a single problem and
    /// [`ConfigError::MultipleValidationErrors`] for several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let rssi_range = MIN_RSSI_DBM..=MAX_RSSI_DBM;

        if !rssi_range.contains(&self.filter.min_rssi) {
            errors.push(invalid(
                "filter.min_rssi",
                format!("{} dBm is outside {MIN_RSSI_DBM}..={MAX_RSSI_DBM}", self.filter.min_rssi),
            ));
        }

        if let Some(nearby) = self.filter.nearby_rssi {
            if !rssi_range.contains(&nearby) {
                errors.push(invalid(
                    "filter.nearby_rssi",
                    format!("{nearby} dBm is outside {MIN_RSSI_DBM}..={MAX_RSSI_DBM}"),
                ));
            } else if nearby <= self.filter.min_rssi {
                errors.push(invalid(
                    "filter.nearby_rssi",
                    format!("{nearby} dBm must be above min_rssi ({})", self.filter.min_rssi),
                ));
            }
        }

        if self
            .filter
            .name_equals
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            errors.push(invalid("filter.name_equals", "must not be blank".into()));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Codec for the configured wire format.
    #[must_use]
    pub const fn codec(&self) -> WireCodec {
        WireCodec::new(self.wire.timestamp_format)
    }
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message,
    }
}

/// Platform configuration path, e.g. `~/.config/sighting/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "sighting")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
