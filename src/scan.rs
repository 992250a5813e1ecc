//! Scan cycle: move the mount, grab a frame, decode, apply the match policy

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, trace, warn};

use crate::{
    Axis, CycleOutcome, Detection, MatchPolicy, PayloadKind, ScanPosition, SweepMode,
    angle::Actuator,
    config::ScannerConfig,
    hardware::{Camera, CameraError, Decoder, Frame, Notifier, PwmOutput},
    sweep::{AxisRange, IncrementalCursor, SweepGrid},
};

/// capabilities consumed by the scan cycle
pub struct ScanDevices {
    pub camera: Box<dyn Camera>,
    pub decoder: Box<dyn Decoder>,
    pub pwm: Box<dyn PwmOutput>,
    pub notifier: Box<dyn Notifier>,
}

/// counters collected over the lifetime of a scan cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub cycles: u64,
    pub matches: u64,
    pub exhausted: u64,
    pub interrupted: u64,
    pub frames_read: u64,
    pub frame_failures: u64,
}

pub struct ScanCycle {
    mode: SweepMode,
    policy: MatchPolicy,
    grid: SweepGrid,
    cursor: IncrementalCursor,
    /// the cursor moved since the servos were last commanded
    cursor_moved: bool,
    tilt: Actuator,
    swivel: Actuator,
    camera: Box<dyn Camera>,
    decoder: Box<dyn Decoder>,
    pwm: Box<dyn PwmOutput>,
    notifier: Box<dyn Notifier>,
    stop: Arc<AtomicBool>,
    stats: ScanStats,
}

impl ScanCycle {
    pub fn new(config: &ScannerConfig, devices: ScanDevices, stop: Arc<AtomicBool>) -> Self {
        let grid = SweepGrid::new(
            AxisRange::from(&config.tilt),
            AxisRange::from(&config.swivel),
        );
        ScanCycle {
            mode: config.scan.mode,
            policy: config.scan.match_policy(),
            grid,
            cursor: IncrementalCursor::new(grid),
            cursor_moved: true,
            tilt: Actuator::new(Axis::Tilt, &config.tilt, config.pulse),
            swivel: Actuator::new(Axis::Swivel, &config.swivel, config.pulse),
            camera: devices.camera,
            decoder: devices.decoder,
            pwm: devices.pwm,
            notifier: devices.notifier,
            stop,
            stats: ScanStats::default(),
        }
    }

    /// command the idle pose of both servos
    pub fn home(&mut self) -> Result<()> {
        let position = ScanPosition::new(self.tilt.angle(), self.swivel.angle());
        debug!("moving to idle pose {}", position);
        self.move_to(position)
    }

    pub fn open_camera(&mut self, width: u32, height: u32) -> Result<(), CameraError> {
        self.camera.open(width, height)?;
        info!("camera opened at {}x{}", width, height);
        Ok(())
    }

    pub fn release_camera(&mut self) {
        self.camera.release();
        debug!("camera released");
    }

    pub fn deinit_pwm(&mut self) -> Result<()> {
        self.pwm.deinit()?;
        debug!("pwm output deinitialized");
        Ok(())
    }

    /// run one cycle in the configured sweep mode
    ///
    /// * burst: walk the whole grid, one frame per position, stop at the first match
    /// * incremental: evaluate one frame at the cursor, advance the cursor when nothing matched
    ///
    /// frame acquisition failures are logged and skipped
    pub fn run_cycle(&mut self) -> Result<CycleOutcome> {
        self.stats.cycles += 1;
        let outcome = match self.mode {
            SweepMode::Burst => self.run_burst()?,
            SweepMode::Incremental => self.run_incremental()?,
        };
        match &outcome {
            CycleOutcome::Matched(detection) => {
                self.stats.matches += 1;
                info!("match: {}", detection);
            }
            CycleOutcome::Exhausted => {
                self.stats.exhausted += 1;
                trace!("cycle ended without a match");
            }
            CycleOutcome::Interrupted => {
                self.stats.interrupted += 1;
                info!("scan cycle interrupted");
            }
        }
        Ok(outcome)
    }

    fn run_burst(&mut self) -> Result<CycleOutcome> {
        debug!("burst sweep over {} positions", self.grid.len());
        for position in self.grid.positions() {
            if self.stop_requested() {
                return Ok(CycleOutcome::Interrupted);
            }
            self.move_to(position)?;
            if let Some(detection) = self.capture_and_evaluate(position)? {
                return Ok(CycleOutcome::Matched(detection));
            }
        }
        Ok(CycleOutcome::Exhausted)
    }

    fn run_incremental(&mut self) -> Result<CycleOutcome> {
        if self.stop_requested() {
            return Ok(CycleOutcome::Interrupted);
        }
        let position = self.cursor.current();
        if self.cursor_moved {
            self.move_to(position)?;
            self.cursor_moved = false;
        }
        if let Some(detection) = self.capture_and_evaluate(position)? {
            return Ok(CycleOutcome::Matched(detection));
        }
        let next = self.cursor.advance();
        self.cursor_moved = true;
        trace!("advancing to {}", next);
        Ok(CycleOutcome::Exhausted)
    }

    fn move_to(&mut self, position: ScanPosition) -> Result<()> {
        self.tilt.set_angle(self.pwm.as_mut(), position.tilt)?;
        self.swivel.set_angle(self.pwm.as_mut(), position.swivel)?;
        Ok(())
    }

    /// grab one frame at `position` and evaluate its payloads in order
    fn capture_and_evaluate(&mut self, position: ScanPosition) -> Result<Option<Detection>> {
        let frame = match self.camera.read_frame() {
            Ok(frame) => frame,
            Err(err) => {
                self.stats.frame_failures += 1;
                warn!("skipping {}: {}", position, err);
                return Ok(None);
            }
        };
        self.stats.frames_read += 1;
        let Some(detection) = self.evaluate(&frame, position) else {
            return Ok(None);
        };
        if detection.kind == PayloadKind::Url && matches!(self.policy, MatchPolicy::Classify) {
            if let Err(err) = self.notifier.notify_url(&detection.payload) {
                warn!("notification for {} failed: {}", detection.payload, err);
            }
        }
        Ok(Some(detection))
    }

    fn evaluate(&mut self, frame: &Frame, position: ScanPosition) -> Option<Detection> {
        let payloads = self.decoder.decode(frame);
        if payloads.is_empty() {
            return None;
        }
        debug!("{} payload(s) decoded at {}", payloads.len(), position);
        payloads.into_iter().find_map(|payload| {
            let Some(kind) = self.policy.evaluate(&payload.text) else {
                debug!("ignoring payload {:?}", payload.text);
                return None;
            };
            Some(Detection {
                payload: payload.text,
                kind,
                position,
                detected_at: Utc::now(),
            })
        })
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn mode(&self) -> SweepMode {
        self.mode
    }

    pub fn grid(&self) -> &SweepGrid {
        &self.grid
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// current pose of the mount
    pub fn position(&self) -> ScanPosition {
        ScanPosition::new(self.tilt.angle(), self.swivel.angle())
    }
}
