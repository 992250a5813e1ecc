//! Controller configuration
//!
//! Loaded from a TOML file, every field has a default so partial files are accepted.
//!
//! ```toml
//! [tilt]
//! channel = 0
//! min = 30
//! max = 150
//! step = 30
//!
//! [scan]
//! mode = "burst"
//! policy = "exact"
//! target = "PALLET-42"
//! ```

use std::{fs, path::Path, time::Duration};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::{ANGLE_RANGE_MAX, MatchPolicy, PULSE_MAX, PULSE_MIN, SweepMode, hardware::Pull};

/// upper bound for every hold and poll interval in seconds
pub const MAX_HOLD_SECS: f64 = 3600.0;

/// Top-level controller configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub tilt: AxisConfig,
    pub swivel: AxisConfig,
    pub pulse: PulseRange,
    pub signals: SignalConfig,
    pub camera: CameraConfig,
    pub scan: ScanConfig,
}

/// servo channel and sweep range of one axis, angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct AxisConfig {
    /// PWM channel index driving this servo
    pub channel: u8,
    /// lowest angle visited (inclusive)
    pub min: i32,
    /// highest angle visited (inclusive)
    pub max: i32,
    /// distance between two grid positions
    pub step: i32,
    /// idle pose, applied at startup
    pub home: i32,
}

/// duty-cycle values for 0° and 180°
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PulseRange {
    pub min: u16,
    pub max: u16,
}

impl Default for PulseRange {
    fn default() -> Self {
        PulseRange {
            min: PULSE_MIN,
            max: PULSE_MAX,
        }
    }
}

/// buzzer, handshake and start lines
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SignalConfig {
    /// output pin of the audible indicator
    pub indicator_pin: u8,
    /// output pin signalling an unmatched sweep downstream
    pub handshake_pin: u8,
    /// input pin gating the scan
    pub start_pin: u8,
    /// pull resistor of the start pin
    pub start_pull: Pull,
    /// wait for the start line before each cycle
    pub start_gate: bool,
    /// seconds the indicator is held high
    pub indicator_hold_secs: f64,
    /// seconds the handshake line is held high
    pub handshake_hold_secs: f64,
    /// idle delay between two polls of the start line
    pub start_poll_secs: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig {
            indicator_pin: 17,
            handshake_pin: 27,
            start_pin: 22,
            start_pull: Pull::Down,
            start_gate: true,
            indicator_hold_secs: 0.5,
            handshake_hold_secs: 0.1,
            start_poll_secs: 0.01,
        }
    }
}

/// video capture settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    /// fail startup when the camera cannot be opened instead of running without frames
    pub abort_on_open_failure: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        CameraConfig {
            width: 640,
            height: 480,
            abort_on_open_failure: false,
        }
    }
}

/// selector for [`MatchPolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Exact,
    Classify,
}

/// sweep strategy and match policy
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanConfig {
    pub mode: SweepMode,
    pub policy: PolicyKind,
    /// payload expected by the exact policy
    pub target: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            mode: SweepMode::Burst,
            policy: PolicyKind::Exact,
            target: String::from("MATCH"),
        }
    }
}

impl ScanConfig {
    pub fn match_policy(&self) -> MatchPolicy {
        match self.policy {
            PolicyKind::Exact => MatchPolicy::Exact {
                target: self.target.clone(),
            },
            PolicyKind::Classify => MatchPolicy::Classify,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            tilt: AxisConfig {
                channel: 0,
                min: 30,
                max: 150,
                step: 30,
                home: 90,
            },
            swivel: AxisConfig {
                channel: 1,
                min: 0,
                max: 180,
                step: 45,
                home: 90,
            },
            pulse: PulseRange::default(),
            signals: SignalConfig::default(),
            camera: CameraConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

impl ScannerConfig {
    /// Load and validate configuration from a TOML file
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use anyhow::Result;
    /// use pantilt_scanner::config::ScannerConfig;
    ///
    /// fn main() -> Result<()> {
    ///     let config = ScannerConfig::from_file("/etc/pantilt-scanner.toml")?;
    ///     println!("sweeping in {} mode", config.scan.mode);
    ///     Ok(())
    /// }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|err| anyhow!("unable to read {}: {}", path.display(), err))?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ScannerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// check the values for consistency
    pub fn validate(&self) -> Result<()> {
        validate_axis("tilt", &self.tilt)?;
        validate_axis("swivel", &self.swivel)?;
        if self.tilt.channel == self.swivel.channel {
            return Err(anyhow!(
                "tilt and swivel share PWM channel {}",
                self.tilt.channel
            ));
        }
        if self.pulse.min >= self.pulse.max {
            return Err(anyhow!(
                "pulse min {:#06X} must be below pulse max {:#06X}",
                self.pulse.min,
                self.pulse.max
            ));
        }
        let signals = &self.signals;
        for (name, secs) in [
            ("indicator_hold_secs", signals.indicator_hold_secs),
            ("handshake_hold_secs", signals.handshake_hold_secs),
            ("start_poll_secs", signals.start_poll_secs),
        ] {
            if !(0.0..=MAX_HOLD_SECS).contains(&secs) || Duration::try_from_secs_f64(secs).is_err()
            {
                return Err(anyhow!(
                    "{} must be between 0 and {} seconds, got {}",
                    name,
                    MAX_HOLD_SECS,
                    secs
                ));
            }
        }
        if signals.indicator_pin == signals.handshake_pin {
            return Err(anyhow!(
                "indicator and handshake share pin {}",
                signals.indicator_pin
            ));
        }
        if signals.start_gate
            && (signals.start_pin == signals.indicator_pin
                || signals.start_pin == signals.handshake_pin)
        {
            return Err(anyhow!(
                "start pin {} is already used as an output",
                signals.start_pin
            ));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!(
                "invalid frame resolution {}x{}",
                self.camera.width,
                self.camera.height
            ));
        }
        if self.scan.policy == PolicyKind::Exact && self.scan.target.is_empty() {
            return Err(anyhow!("exact match policy requires a non-empty target"));
        }
        Ok(())
    }
}

fn validate_axis(name: &str, axis: &AxisConfig) -> Result<()> {
    for (field, value) in [("min", axis.min), ("max", axis.max), ("home", axis.home)] {
        if !(0..=ANGLE_RANGE_MAX).contains(&value) {
            return Err(anyhow!(
                "{} {} angle {} is outside 0..={}",
                name,
                field,
                value,
                ANGLE_RANGE_MAX
            ));
        }
    }
    if axis.min > axis.max {
        return Err(anyhow!(
            "{} min angle {} exceeds max angle {}",
            name,
            axis.min,
            axis.max
        ));
    }
    if axis.step <= 0 {
        return Err(anyhow!("{} step must be positive, got {}", name, axis.step));
    }
    Ok(())
}
