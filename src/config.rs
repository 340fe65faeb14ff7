//! Robot configuration, loaded once at start-up from TOML
//!
//! Every section has working defaults, so a missing file or a missing table
//! still yields a drivable robot. Values that are present must be valid.

use crate::command::robot::SlewLimits;
use crate::controller::frame::Axis;
use crate::error::ConfigError;
use crate::mapping::{Deadbands, DriveMode, DriveSetpoint};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Overrides the config file location
pub const CONFIG_ENV: &str = "COMMANDBOT_CONFIG";
const CONFIG_DIR: &str = "commandbot";
const CONFIG_FILE: &str = "robot.toml";

const MAX_CYCLE_PERIOD_MS: u64 = 60_000;
const MAX_STATS_INTERVAL_SECS: u64 = 86_400;
const MAX_AUTONOMOUS_SECS: u64 = 3_600;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub scheduler: SchedulerConfig,
    pub operator: OperatorConfig,
    pub drive: DriveConfig,
    pub mechanisms: MechanismConfig,
    pub autonomous: AutonomousConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub cycle_period_ms: u64,
    /// How often the driver loop logs timing statistics
    pub stats_interval_secs: u64,
    /// Length of the autonomous phase before teleop starts, 0 skips it
    pub autonomous_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_period_ms: 20,
            stats_interval_secs: 10,
            autonomous_secs: 15,
        }
    }
}

impl SchedulerConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms)
    }

    pub fn period_secs(&self) -> f64 {
        self.cycle_period_ms as f64 / 1000.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub deadbands: Deadbands,
    /// Analog trigger travel that counts as pressed
    pub trigger_threshold: f64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            deadbands: Deadbands::default(),
            trigger_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Unset picks the mode matching the hardware
    pub mode: Option<DriveMode>,
    pub translation_slew: Option<f64>,
    pub rotation_slew: Option<f64>,
}

impl DriveConfig {
    pub fn mode_for(&self, simulated: bool) -> DriveMode {
        match self.mode {
            Some(mode) => mode,
            None if simulated => DriveMode::AxisAngle {
                axis: Axis::LeftTrigger,
            },
            None => DriveMode::AngularVelocity,
        }
    }

    pub fn slew_limits(&self) -> SlewLimits {
        SlewLimits {
            translation: self.translation_slew,
            rotation: self.rotation_slew,
        }
    }
}

/// Output levels of the operator's mechanism commands, all in `[-1, 1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MechanismConfig {
    pub shoot_speed: f64,
    pub arm_limit_speed: f64,
    pub arm_manual_speed: f64,
    pub intake_bumper_speed: f64,
    pub intake_trigger_speed: f64,
}

impl Default for MechanismConfig {
    fn default() -> Self {
        Self {
            shoot_speed: 1.0,
            arm_limit_speed: 0.5,
            arm_manual_speed: 0.7,
            intake_bumper_speed: -1.0,
            intake_trigger_speed: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomousConfig {
    /// Routine the driver loop runs in its autonomous phase
    pub selected: String,
    pub routines: Vec<AutoRoutine>,
}

impl Default for AutonomousConfig {
    fn default() -> Self {
        Self {
            selected: "New Auto".to_string(),
            routines: vec![AutoRoutine {
                name: "New Auto".to_string(),
                forward: 0.5,
                strafe: 0.0,
                rotation: 0.0,
                duration_ms: 2000,
            }],
        }
    }
}

/// Drives a constant field-oriented vector for a fixed time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoRoutine {
    pub name: String,
    #[serde(default)]
    pub forward: f64,
    #[serde(default)]
    pub strafe: f64,
    #[serde(default)]
    pub rotation: f64,
    pub duration_ms: u64,
}

impl AutoRoutine {
    pub fn setpoint(&self) -> DriveSetpoint {
        DriveSetpoint::Velocity {
            forward: self.forward,
            strafe: self.strafe,
            rotation: self.rotation,
        }
    }

    /// Whole cycles covering the duration, at least one
    pub fn cycles(&self, period_ms: u64) -> u32 {
        let cycles = self.duration_ms.div_ceil(period_ms.max(1)).max(1);
        u32::try_from(cycles).unwrap_or(u32::MAX)
    }
}

impl RobotConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RobotConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, falling back to defaults when it does not exist
    pub async fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if !exists {
            warn!(
                "Config file {} does not exist, using default",
                path.display()
            );
            return Ok(Self::default());
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded config from {}", path.display());
        debug!("Config: {:?}", config);
        Ok(config)
    }

    /// Writes the config as TOML, creating parent directories
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(path, content).await.map_err(io_err)?;
        info!("Config written to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheduler = &self.scheduler;
        for (name, value, max) in [
            ("cycle_period_ms", scheduler.cycle_period_ms, MAX_CYCLE_PERIOD_MS),
            ("stats_interval_secs", scheduler.stats_interval_secs, MAX_STATS_INTERVAL_SECS),
        ] {
            if !(1..=max).contains(&value) {
                return invalid(format!(
                    "scheduler.{} must be in [1, {}], got {}",
                    name, max, value
                ));
            }
        }
        if scheduler.autonomous_secs > MAX_AUTONOMOUS_SECS {
            return invalid(format!(
                "scheduler.autonomous_secs must be at most {}, got {}",
                MAX_AUTONOMOUS_SECS, scheduler.autonomous_secs
            ));
        }

        let deadbands = &self.operator.deadbands;
        for (name, value) in [
            ("left_x", deadbands.left_x),
            ("left_y", deadbands.left_y),
            ("right_x", deadbands.right_x),
            ("heading", deadbands.heading),
        ] {
            if !(0.0..1.0).contains(&value) {
                return invalid(format!(
                    "operator.deadbands.{} must be in [0, 1), got {}",
                    name, value
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.operator.trigger_threshold) {
            return invalid(format!(
                "operator.trigger_threshold must be in [0, 1], got {}",
                self.operator.trigger_threshold
            ));
        }

        for (name, rate) in [
            ("translation_slew", self.drive.translation_slew),
            ("rotation_slew", self.drive.rotation_slew),
        ] {
            if let Some(rate) = rate {
                if !rate.is_finite() || rate <= 0.0 {
                    return invalid(format!("drive.{} must be positive, got {}", name, rate));
                }
            }
        }

        let m = &self.mechanisms;
        for (name, speed) in [
            ("shoot_speed", m.shoot_speed),
            ("arm_limit_speed", m.arm_limit_speed),
            ("arm_manual_speed", m.arm_manual_speed),
            ("intake_bumper_speed", m.intake_bumper_speed),
            ("intake_trigger_speed", m.intake_trigger_speed),
        ] {
            if !(-1.0..=1.0).contains(&speed) {
                return invalid(format!(
                    "mechanisms.{} must be in [-1, 1], got {}",
                    name, speed
                ));
            }
        }

        let mut names = HashSet::new();
        for routine in &self.autonomous.routines {
            if routine.name.trim().is_empty() {
                return invalid("autonomous routine names must not be empty");
            }
            if !names.insert(routine.name.as_str()) {
                return invalid(format!("duplicate autonomous routine '{}'", routine.name));
            }
            if routine.duration_ms == 0 {
                return invalid(format!("routine '{}' has zero duration", routine.name));
            }
            for value in [routine.forward, routine.strafe, routine.rotation] {
                if !(-1.0..=1.0).contains(&value) {
                    return invalid(format!(
                        "routine '{}' components must be in [-1, 1]",
                        routine.name
                    ));
                }
            }
        }
        if !self.autonomous.routines.is_empty() && !names.contains(self.autonomous.selected.as_str())
        {
            return invalid(format!(
                "selected autonomous routine '{}' is not defined",
                self.autonomous.selected
            ));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(message.into()))
}

/// `$COMMANDBOT_CONFIG`, or `robot.toml` in the platform config directory
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    let mut path = dirs::config_dir().unwrap_or_else(|| {
        warn!("Could not determine config directory, using current directory");
        PathBuf::from(".")
    });
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}
