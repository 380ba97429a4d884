//! Engine tuning loaded from JSON.

use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming a config file for [`EngineConfig::discover`].
pub const CONFIG_ENV: &str = "INKFRAME_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Hit-testing tolerances and spatial hash tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickConfig {
    /// Default hit tolerance in screen pixels.
    pub tolerance_px: f64,
    pub resize_handle_px: f64,
    pub rotate_handle_offset_px: f64,
    pub rotate_handle_radius_px: f64,
    /// Spatial hash cell size in world units.
    pub cell_size: f64,
    /// Entities covering more cells than this go to the overflow list.
    pub max_cells_per_entity: usize,
}

impl Default for PickConfig {
    fn default() -> Self {
        Self {
            tolerance_px: 10.0,
            resize_handle_px: 10.0,
            rotate_handle_offset_px: 15.0,
            rotate_handle_radius_px: 10.0,
            cell_size: 50.0,
            max_cells_per_entity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Screen distance before a pointer press becomes a drag.
    pub drag_threshold_px: f64,
    /// Shift-drag distance below which no axis is locked.
    pub axis_lock_min_px: f64,
    pub axis_lock_enter_ratio: f64,
    pub axis_lock_switch_ratio: f64,
    pub rotation_snap_degrees: f64,
    pub vertex_snap_degrees: f64,
    pub grid_snap: bool,
    pub grid_size: f64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            drag_threshold_px: 3.0,
            axis_lock_min_px: 4.0,
            axis_lock_enter_ratio: 1.1,
            axis_lock_switch_ratio: 1.2,
            rotation_snap_degrees: 15.0,
            vertex_snap_degrees: 45.0,
            grid_snap: false,
            grid_size: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub capacity: usize,
    /// Every n-th entry carries a full store checkpoint.
    pub checkpoint_interval: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            checkpoint_interval: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { capacity: 2048 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pick: PickConfig,
    pub interaction: InteractionConfig,
    pub history: HistoryConfig,
    pub events: EventConfig,
}

fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must be positive, got {value}")))
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must be non-negative, got {value}")))
    }
}

impl EngineConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Load from the file named by `INKFRAME_CONFIG`, or fall back to defaults.
    pub fn discover() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::from_file(PathBuf::from(path)),
            _ => {
                debug!("{CONFIG_ENV} not set, using default engine config");
                Ok(Self::default())
            }
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let pick = &self.pick;
        non_negative("pick.tolerance_px", pick.tolerance_px)?;
        positive("pick.resize_handle_px", pick.resize_handle_px)?;
        non_negative("pick.rotate_handle_offset_px", pick.rotate_handle_offset_px)?;
        positive("pick.rotate_handle_radius_px", pick.rotate_handle_radius_px)?;
        positive("pick.cell_size", pick.cell_size)?;
        if pick.max_cells_per_entity == 0 {
            return Err(ConfigError::Invalid("pick.max_cells_per_entity must be positive".into()));
        }

        let ix = &self.interaction;
        non_negative("interaction.drag_threshold_px", ix.drag_threshold_px)?;
        non_negative("interaction.axis_lock_min_px", ix.axis_lock_min_px)?;
        positive("interaction.axis_lock_enter_ratio", ix.axis_lock_enter_ratio)?;
        positive("interaction.axis_lock_switch_ratio", ix.axis_lock_switch_ratio)?;
        positive("interaction.rotation_snap_degrees", ix.rotation_snap_degrees)?;
        positive("interaction.vertex_snap_degrees", ix.vertex_snap_degrees)?;
        positive("interaction.grid_size", ix.grid_size)?;

        if self.history.capacity == 0 {
            return Err(ConfigError::Invalid("history.capacity must be positive".into()));
        }
        if self.history.checkpoint_interval == 0 {
            return Err(ConfigError::Invalid(
                "history.checkpoint_interval must be positive".into(),
            ));
        }
        if self.events.capacity == 0 {
            return Err(ConfigError::Invalid("events.capacity must be positive".into()));
        }
        Ok(())
    }
}
