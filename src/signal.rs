use std::{thread::sleep, time::Duration};

use anyhow::{Result, anyhow};
use tracing::{debug, info, trace, warn};

use crate::{
    config::SignalConfig,
    hardware::{DigitalLine, PinMode, Pull},
};

/// drives the buzzer and handshake outputs and reads the start input
pub struct SignalController {
    line: Box<dyn DigitalLine>,
    config: SignalConfig,
}

impl SignalController {
    pub fn new(line: Box<dyn DigitalLine>, config: SignalConfig) -> Self {
        SignalController { line, config }
    }

    /// configure pin directions and drive both outputs low
    ///
    /// the start pin is only configured when the start gate is enabled
    pub fn configure(&mut self) -> Result<()> {
        let SignalConfig {
            indicator_pin,
            handshake_pin,
            start_pin,
            start_pull,
            start_gate,
            ..
        } = self.config;
        self.line
            .set_mode(indicator_pin, PinMode::Output, Pull::None)?;
        self.line
            .set_mode(handshake_pin, PinMode::Output, Pull::None)?;
        self.line.write(indicator_pin, false)?;
        self.line.write(handshake_pin, false)?;
        if start_gate {
            self.line.set_mode(start_pin, PinMode::Input, start_pull)?;
        }
        debug!(
            "signal lines configured: indicator {}, handshake {}, start {}",
            indicator_pin,
            handshake_pin,
            if start_gate {
                start_pin.to_string()
            } else {
                String::from("disabled")
            }
        );
        Ok(())
    }

    /// sound the indicator for the configured hold time (blocking)
    pub fn activate_indicator(&mut self) -> Result<()> {
        info!("indicator on for {}s", self.config.indicator_hold_secs);
        pulse(
            self.line.as_mut(),
            self.config.indicator_pin,
            self.config.indicator_hold_secs,
        )
    }

    /// notify the downstream consumer that a sweep ended without a match (blocking)
    pub fn pulse_handshake_line(&mut self) -> Result<()> {
        info!("handshake pulse for {}s", self.config.handshake_hold_secs);
        pulse(
            self.line.as_mut(),
            self.config.handshake_pin,
            self.config.handshake_hold_secs,
        )
    }

    /// non-blocking read of the start input, `true` when high
    pub fn poll_start_line(&mut self) -> Result<bool> {
        let level = self.line.read(self.config.start_pin)?;
        trace!("start line {}", if level { "high" } else { "low" });
        Ok(level)
    }

    /// delay between two polls of the start line
    pub fn idle(&self) -> Result<()> {
        sleep(hold_duration(self.config.start_poll_secs)?);
        Ok(())
    }

    pub fn start_gate(&self) -> bool {
        self.config.start_gate
    }

    /// drive outputs low and release the lines
    pub fn release(&mut self) -> Result<()> {
        for pin in [self.config.indicator_pin, self.config.handshake_pin] {
            if let Err(err) = self.line.write(pin, false) {
                warn!("unable to drive pin {} low on release: {}", pin, err);
            }
        }
        self.line.cleanup()
    }
}

/// drive `pin` high for `hold_secs`, then low again
fn pulse(line: &mut dyn DigitalLine, pin: u8, hold_secs: f64) -> Result<()> {
    let hold = hold_duration(hold_secs)?;
    line.write(pin, true)?;
    sleep(hold);
    line.write(pin, false)
}

fn hold_duration(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|err| anyhow!("invalid hold time {}s: {}", secs, err))
}
