use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Result, anyhow};
use tracing::{debug, error, info, warn};

use crate::{
    CycleOutcome, RunState, SweepMode,
    config::ScannerConfig,
    hardware::{Camera, Decoder, DigitalLine, Notifier, PwmOutput},
    scan::{ScanCycle, ScanDevices, ScanStats},
    signal::SignalController,
};

/// every capability the scanner acquires
pub struct Hardware {
    pub camera: Box<dyn Camera>,
    pub decoder: Box<dyn Decoder>,
    pub pwm: Box<dyn PwmOutput>,
    pub line: Box<dyn DigitalLine>,
    pub notifier: Box<dyn Notifier>,
}

pub struct Scanner {
    config: ScannerConfig,
    scan: ScanCycle,
    signals: SignalController,
    state: RunState,
    /// raised to end the run loop, shared with signal handlers
    stop: Arc<AtomicBool>,
    torn_down: bool,
}

impl Scanner {
    /// acquire the hardware and move the mount to its idle pose
    ///
    /// acquisition order is digital lines, servos, camera. A camera that fails to open is
    /// logged and the scanner keeps running without frames, unless
    /// `camera.abort_on_open_failure` is set.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use anyhow::Result;
    /// use pantilt_scanner::{
    ///     config::ScannerConfig,
    ///     controller::{Hardware, Scanner},
    ///     hardware::SystemNotifier,
    ///     mock::{MockCamera, MockDecoder, MockDigitalLine, MockPwm},
    /// };
    ///
    /// fn main() -> Result<()> {
    ///     let hardware = Hardware {
    ///         camera: Box::new(MockCamera::new()),
    ///         decoder: Box::new(MockDecoder::new()),
    ///         pwm: Box::new(MockPwm::new()),
    ///         line: Box::new(MockDigitalLine::new()),
    ///         notifier: Box::new(SystemNotifier),
    ///     };
    ///     let mut scanner = Scanner::start(ScannerConfig::default(), hardware)?;
    ///     scanner.run()?;
    ///     scanner.shutdown()
    /// }
    /// ```
    pub fn start(config: ScannerConfig, hardware: Hardware) -> Result<Self> {
        config.validate()?;
        let stop = Arc::new(AtomicBool::new(false));
        let scan = ScanCycle::new(
            &config,
            ScanDevices {
                camera: hardware.camera,
                decoder: hardware.decoder,
                pwm: hardware.pwm,
                notifier: hardware.notifier,
            },
            stop.clone(),
        );
        let signals = SignalController::new(hardware.line, config.signals.clone());
        let state = if config.signals.start_gate {
            RunState::WaitingForStart
        } else {
            RunState::Sweeping
        };
        // from here on every exit path tears down through Drop
        let mut scanner = Scanner {
            config,
            scan,
            signals,
            state,
            stop,
            torn_down: false,
        };
        scanner.signals.configure()?;
        scanner.scan.home()?;
        let (width, height) = (scanner.config.camera.width, scanner.config.camera.height);
        if let Err(err) = scanner.scan.open_camera(width, height) {
            if scanner.config.camera.abort_on_open_failure {
                return Err(anyhow!(err));
            }
            error!("{}, continuing without frames", err);
        }
        info!(
            "scanner ready: {} sweep over {} positions, {}",
            scanner.scan.mode(),
            scanner.scan.grid().len(),
            scanner.config.scan.match_policy()
        );
        Ok(scanner)
    }

    /// handle that ends [`Scanner::run`] when set, e.g. from a Ctrl-C handler
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// run outer iterations until a stop is requested
    pub fn run(&mut self) -> Result<()> {
        info!("scanner running");
        while !self.stop_requested() {
            self.step()?;
        }
        info!("stop requested, leaving run loop");
        Ok(())
    }

    /// one outer iteration
    ///
    /// with the start gate enabled the start line is polled once, a low level idles for the
    /// poll interval and returns. Otherwise a scan cycle runs and its outcome is signalled:
    /// a match sounds the indicator, an exhausted burst sweep pulses the handshake line.
    pub fn step(&mut self) -> Result<RunState> {
        if self.signals.start_gate() {
            self.state = RunState::WaitingForStart;
            if !self.signals.poll_start_line()? {
                self.signals.idle()?;
                return Ok(self.state);
            }
            debug!("start line high");
        }
        self.state = RunState::Sweeping;
        match self.scan.run_cycle()? {
            CycleOutcome::Matched(_) => {
                self.state = RunState::Matched;
                self.signals.activate_indicator()?;
            }
            CycleOutcome::Exhausted => {
                self.state = RunState::NoMatch;
                if self.scan.mode() == SweepMode::Burst {
                    self.signals.pulse_handshake_line()?;
                }
            }
            CycleOutcome::Interrupted => {
                self.state = RunState::WaitingForStart;
            }
        }
        Ok(self.state)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn stats(&self) -> ScanStats {
        self.scan.stats()
    }

    /// release all hardware in reverse acquisition order
    pub fn shutdown(mut self) -> Result<()> {
        self.teardown()
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// runs at most once, every capability is released even when an earlier one fails
    fn teardown(&mut self) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;
        info!("releasing hardware");
        self.scan.release_camera();
        let pwm = self.scan.deinit_pwm();
        if let Err(err) = &pwm {
            warn!("pwm deinit failed: {}", err);
        }
        let signals = self.signals.release();
        if let Err(err) = &signals {
            warn!("digital line cleanup failed: {}", err);
        }
        pwm.and(signals)
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            error!("teardown failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::PolicyKind,
        mock::{MockCamera, MockDecoder, MockDigitalLine, MockNotifier, MockPwm},
    };

    #[derive(Clone, Default)]
    struct Rig {
        camera: MockCamera,
        decoder: MockDecoder,
        pwm: MockPwm,
        line: MockDigitalLine,
        notifier: MockNotifier,
    }

    impl Rig {
        fn hardware(&self) -> Hardware {
            Hardware {
                camera: Box::new(self.camera.clone()),
                decoder: Box::new(self.decoder.clone()),
                pwm: Box::new(self.pwm.clone()),
                line: Box::new(self.line.clone()),
                notifier: Box::new(self.notifier.clone()),
            }
        }

        fn assert_torn_down_once(&self) {
            assert_eq!(self.camera.release_calls(), 1);
            assert_eq!(self.pwm.deinit_calls(), 1);
            assert_eq!(self.line.cleanup_calls(), 1);
        }
    }

    fn fast_config() -> ScannerConfig {
        let mut config = ScannerConfig::default();
        config.scan.target = String::from("PALLET-42");
        config.signals.indicator_hold_secs = 0.0;
        config.signals.handshake_hold_secs = 0.0;
        config.signals.start_poll_secs = 0.0;
        config
    }

    #[test]
    fn test_start_homes_and_opens_camera() -> Result<()> {
        let rig = Rig::default();
        let config = fast_config();
        let scanner = Scanner::start(config.clone(), rig.hardware())?;
        assert_eq!(scanner.state(), RunState::WaitingForStart);
        assert_eq!(rig.camera.open_calls(), 1);
        assert!(rig.camera.is_open());
        // idle pose written to both channels
        let writes = rig.pwm.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].0, config.tilt.channel);
        assert_eq!(writes[1].0, config.swivel.channel);
        scanner.shutdown()?;
        rig.assert_torn_down_once();
        Ok(())
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        let rig = Rig::default();
        let mut config = fast_config();
        config.tilt.step = 0;
        assert!(Scanner::start(config, rig.hardware()).is_err());
        assert_eq!(rig.camera.open_calls(), 0);
    }

    #[test]
    fn test_gate_low_keeps_waiting() -> Result<()> {
        let rig = Rig::default();
        let mut scanner = Scanner::start(fast_config(), rig.hardware())?;
        for _ in 0..3 {
            assert_eq!(scanner.step()?, RunState::WaitingForStart);
        }
        assert_eq!(rig.camera.reads(), 0);
        assert_eq!(rig.line.reads(), 3);
        assert_eq!(scanner.stats().cycles, 0);
        Ok(())
    }

    #[test]
    fn test_gated_match_sounds_indicator() -> Result<()> {
        let rig = Rig::default();
        let config = fast_config();
        let mut scanner = Scanner::start(config.clone(), rig.hardware())?;
        rig.line.set_input(config.signals.start_pin, true);
        rig.decoder.payloads_at(2, &["PALLET-42"]);
        assert_eq!(scanner.step()?, RunState::Matched);
        assert_eq!(rig.decoder.calls(), 3);
        assert_eq!(
            rig.line.writes_to(config.signals.indicator_pin),
            vec![false, true, false]
        );
        assert_eq!(rig.line.writes_to(config.signals.handshake_pin), vec![false]);
        Ok(())
    }

    #[test]
    fn test_exhausted_sweep_pulses_handshake_once() -> Result<()> {
        let rig = Rig::default();
        let config = fast_config();
        let mut scanner = Scanner::start(config.clone(), rig.hardware())?;
        rig.line.set_input(config.signals.start_pin, true);
        assert_eq!(scanner.step()?, RunState::NoMatch);
        assert_eq!(rig.decoder.calls(), 25);
        assert_eq!(
            rig.line.writes_to(config.signals.handshake_pin),
            vec![false, true, false]
        );
        assert_eq!(rig.line.writes_to(config.signals.indicator_pin), vec![false]);

        // line dropped, back to waiting
        rig.line.set_input(config.signals.start_pin, false);
        assert_eq!(scanner.step()?, RunState::WaitingForStart);
        assert_eq!(rig.decoder.calls(), 25);
        Ok(())
    }

    #[test]
    fn test_incremental_exhausted_frame_has_no_handshake() -> Result<()> {
        let rig = Rig::default();
        let mut config = fast_config();
        config.signals.start_gate = false;
        config.scan.mode = SweepMode::Incremental;
        config.scan.policy = PolicyKind::Classify;
        let mut scanner = Scanner::start(config.clone(), rig.hardware())?;
        rig.decoder.payloads_at(1, &["hello"]);
        assert_eq!(scanner.step()?, RunState::NoMatch);
        assert_eq!(scanner.step()?, RunState::Matched);
        assert_eq!(rig.line.writes_to(config.signals.handshake_pin), vec![false]);
        assert_eq!(
            rig.line.writes_to(config.signals.indicator_pin),
            vec![false, true, false]
        );
        Ok(())
    }

    #[test]
    fn test_camera_open_failure_degrades() -> Result<()> {
        let rig = Rig::default();
        rig.camera.fail_open();
        let mut config = fast_config();
        config.signals.start_gate = false;
        let mut scanner = Scanner::start(config, rig.hardware())?;
        assert_eq!(scanner.step()?, RunState::NoMatch);
        assert_eq!(scanner.stats().frame_failures, 25);
        assert_eq!(rig.decoder.calls(), 0);
        drop(scanner);
        rig.assert_torn_down_once();
        Ok(())
    }

    #[test]
    fn test_camera_open_failure_aborts_when_configured() {
        let rig = Rig::default();
        rig.camera.fail_open();
        let mut config = fast_config();
        config.camera.abort_on_open_failure = true;
        let result = Scanner::start(config, rig.hardware());
        assert!(result.is_err());
        // everything acquired so far is released
        rig.assert_torn_down_once();
    }

    #[test]
    fn test_interrupt_mid_sweep_tears_down_once() -> Result<()> {
        let rig = Rig::default();
        let mut config = fast_config();
        config.signals.start_gate = false;
        let mut scanner = Scanner::start(config, rig.hardware())?;
        rig.camera.interrupt_on_read(10, scanner.stop_handle());
        scanner.run()?;
        assert_eq!(scanner.state(), RunState::WaitingForStart);
        assert_eq!(rig.camera.reads(), 11);
        assert_eq!(scanner.stats().interrupted, 1);
        scanner.shutdown()?;
        rig.assert_torn_down_once();
        Ok(())
    }

    #[test]
    fn test_drop_after_shutdown_is_noop() -> Result<()> {
        let rig = Rig::default();
        let scanner = Scanner::start(fast_config(), rig.hardware())?;
        scanner.shutdown()?;
        rig.assert_torn_down_once();
        Ok(())
    }

    #[test]
    fn test_run_returns_immediately_when_stopped() -> Result<()> {
        let rig = Rig::default();
        let mut scanner = Scanner::start(fast_config(), rig.hardware())?;
        scanner.stop_handle().store(true, Ordering::SeqCst);
        scanner.run()?;
        assert_eq!(rig.line.reads(), 0);
        drop(scanner);
        rig.assert_torn_down_once();
        Ok(())
    }
}
