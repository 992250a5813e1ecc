use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod angle;
pub mod config;
pub mod controller;
pub mod hardware;
pub mod mock;
pub mod scan;
pub mod signal;
pub mod sweep;

/// default lowest duty-cycle value written to a servo channel (0°)
pub const PULSE_MIN: u16 = 0x1000;
/// default highest duty-cycle value written to a servo channel (180°)
pub const PULSE_MAX: u16 = 0x3000;
/// full mechanical range of the servos in degrees, the duty mapping interpolates over [0, 180]
pub const ANGLE_RANGE_MAX: i32 = 180;

/// one of the two servo axes of the camera mount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// vertical movement
    Tilt,
    /// horizontal movement
    Swivel,
}

impl Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Tilt => write!(f, "tilt"),
            Axis::Swivel => write!(f, "swivel"),
        }
    }
}

/// strategy used to walk the position grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepMode {
    /// walk the whole grid on each activation, stop early on the first match
    #[default]
    Burst,
    /// evaluate one frame per activation, advance one grid cell when nothing was found
    Incremental,
}

impl Display for SweepMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SweepMode::Burst => write!(f, "burst"),
            SweepMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// decides whether a decoded payload counts as a match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPolicy {
    /// only a payload equal to `target` matches
    Exact { target: String },
    /// every payload matches, it is classified as url or plain text
    Classify,
}

impl MatchPolicy {
    /// evaluate a single payload, returns its classification when it matches
    pub fn evaluate(&self, text: &str) -> Option<PayloadKind> {
        match self {
            MatchPolicy::Exact { target } if text == target.as_str() => {
                Some(PayloadKind::classify(text))
            }
            MatchPolicy::Exact { .. } => None,
            MatchPolicy::Classify => Some(PayloadKind::classify(text)),
        }
    }
}

impl Display for MatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchPolicy::Exact { target } => write!(f, "exact match on {:?}", target),
            MatchPolicy::Classify => write!(f, "url/text classification"),
        }
    }
}

/// classification of a decoded payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// payload is an http(s) link
    Url,
    /// anything else
    Text,
}

impl PayloadKind {
    /// classify a payload, links are recognized by their http/https scheme
    pub fn classify(text: &str) -> Self {
        let text = text.trim_start().to_ascii_lowercase();
        if text.starts_with("http://") || text.starts_with("https://") {
            PayloadKind::Url
        } else {
            PayloadKind::Text
        }
    }
}

impl Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadKind::Url => write!(f, "url"),
            PayloadKind::Text => write!(f, "text"),
        }
    }
}

/// commanded pose of the mount, both angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanPosition {
    pub tilt: i32,
    pub swivel: i32,
}

impl ScanPosition {
    pub fn new(tilt: i32, swivel: i32) -> Self {
        ScanPosition { tilt, swivel }
    }
}

impl Display for ScanPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(tilt {}°, swivel {}°)", self.tilt, self.swivel)
    }
}

/// a payload that satisfied the match policy
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// decoded text
    pub payload: String,
    /// classification of the payload
    pub kind: PayloadKind,
    /// pose of the mount when the frame was captured
    pub position: ScanPosition,
    /// wall clock time of the detection
    pub detected_at: DateTime<Utc>,
}

impl Display for Detection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:?} at {} ({})",
            self.kind,
            self.payload,
            self.position,
            self.detected_at.format("%Y-%m-%d %H:%M:%S%.3f")
        )
    }
}

/// result of a single scan cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// a payload matched, remaining positions were skipped
    Matched(Detection),
    /// nothing matched (whole grid in burst mode, this frame in incremental mode)
    Exhausted,
    /// a stop was requested before the cycle completed
    Interrupted,
}

/// state of the outer control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// waiting for the start line to go high
    WaitingForStart,
    /// scan cycle in progress
    Sweeping,
    /// last cycle found a match
    Matched,
    /// last cycle ended without a match
    NoMatch,
}

impl Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::WaitingForStart => write!(f, "waiting for start"),
            RunState::Sweeping => write!(f, "sweeping"),
            RunState::Matched => write!(f, "matched"),
            RunState::NoMatch => write!(f, "no match"),
        }
    }
}
