//! Recording in-memory capabilities for tests and simulated runs
//!
//! Every mock is a cheap handle around shared state, keep a clone before moving
//! one into the controller to inspect the calls afterwards.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Result, anyhow};
use tracing::trace;

use crate::hardware::{
    Camera, CameraError, DecodedPayload, Decoder, DigitalLine, Frame, Notifier, PinMode, Pull,
    PwmOutput,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// scripted camera
#[derive(Clone, Default)]
pub struct MockCamera {
    inner: Arc<Mutex<MockCameraInner>>,
}

#[derive(Default)]
struct MockCameraInner {
    fail_open: bool,
    failing_reads: HashSet<usize>,
    interrupt_on_read: Option<(usize, Arc<AtomicBool>)>,
    size: Option<(u32, u32)>,
    open_calls: usize,
    release_calls: usize,
    reads: usize,
}

impl MockCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// make `open` fail with [`CameraError::NotAvailable`]
    pub fn fail_open(&self) {
        lock(&self.inner).fail_open = true;
    }

    /// make the read with the given 0-based index fail with [`CameraError::NoFrame`]
    pub fn fail_read(&self, read_index: usize) {
        lock(&self.inner).failing_reads.insert(read_index);
    }

    /// raise `flag` while serving the read with the given 0-based index
    pub fn interrupt_on_read(&self, read_index: usize, flag: Arc<AtomicBool>) {
        lock(&self.inner).interrupt_on_read = Some((read_index, flag));
    }

    pub fn open_calls(&self) -> usize {
        lock(&self.inner).open_calls
    }

    pub fn release_calls(&self) -> usize {
        lock(&self.inner).release_calls
    }

    /// number of `read_frame` calls, failed ones included
    pub fn reads(&self) -> usize {
        lock(&self.inner).reads
    }

    pub fn is_open(&self) -> bool {
        lock(&self.inner).size.is_some()
    }
}

impl Camera for MockCamera {
    fn open(&mut self, width: u32, height: u32) -> Result<(), CameraError> {
        let mut inner = lock(&self.inner);
        inner.open_calls += 1;
        if inner.fail_open {
            return Err(CameraError::NotAvailable(String::from("mock camera disabled")));
        }
        inner.size = Some((width, height));
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let mut inner = lock(&self.inner);
        let index = inner.reads;
        inner.reads += 1;
        if let Some((trigger, flag)) = &inner.interrupt_on_read
            && *trigger == index
        {
            flag.store(true, Ordering::SeqCst);
        }
        if inner.failing_reads.contains(&index) {
            trace!("mock camera failing read {}", index);
            return Err(CameraError::NoFrame);
        }
        match inner.size {
            Some((width, height)) => Ok(Frame::blank(width, height)),
            None => Err(CameraError::NoFrame),
        }
    }

    fn release(&mut self) {
        let mut inner = lock(&self.inner);
        inner.release_calls += 1;
        inner.size = None;
    }
}

/// decoder returning scripted payloads per call
#[derive(Clone, Default)]
pub struct MockDecoder {
    inner: Arc<Mutex<MockDecoderInner>>,
}

#[derive(Default)]
struct MockDecoderInner {
    script: HashMap<usize, Vec<String>>,
    calls: usize,
}

impl MockDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// return `payloads` from the decode call with the given 0-based index
    pub fn payloads_at(&self, call_index: usize, payloads: &[&str]) {
        lock(&self.inner).script.insert(
            call_index,
            payloads.iter().map(|payload| payload.to_string()).collect(),
        );
    }

    pub fn calls(&self) -> usize {
        lock(&self.inner).calls
    }
}

impl Decoder for MockDecoder {
    fn decode(&mut self, _frame: &Frame) -> Vec<DecodedPayload> {
        let mut inner = lock(&self.inner);
        let index = inner.calls;
        inner.calls += 1;
        inner
            .script
            .get(&index)
            .map(|payloads| {
                payloads
                    .iter()
                    .map(|text| DecodedPayload::from(text.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// PWM driver recording every duty-cycle write
#[derive(Clone, Default)]
pub struct MockPwm {
    inner: Arc<Mutex<MockPwmInner>>,
}

#[derive(Default)]
struct MockPwmInner {
    writes: Vec<(u8, u16)>,
    deinit_calls: usize,
}

impl MockPwm {
    pub fn new() -> Self {
        Self::default()
    }

    /// all `(channel, duty)` writes in order
    pub fn writes(&self) -> Vec<(u8, u16)> {
        lock(&self.inner).writes.clone()
    }

    pub fn deinit_calls(&self) -> usize {
        lock(&self.inner).deinit_calls
    }
}

impl PwmOutput for MockPwm {
    fn set_duty(&mut self, channel: u8, value: u16) -> Result<()> {
        trace!("mock pwm channel {} duty {:#06X}", channel, value);
        lock(&self.inner).writes.push((channel, value));
        Ok(())
    }

    fn deinit(&mut self) -> Result<()> {
        lock(&self.inner).deinit_calls += 1;
        Ok(())
    }
}

/// GPIO lines with settable input levels
#[derive(Clone, Default)]
pub struct MockDigitalLine {
    inner: Arc<Mutex<MockDigitalLineInner>>,
}

#[derive(Default)]
struct MockDigitalLineInner {
    modes: HashMap<u8, (PinMode, Pull)>,
    inputs: HashMap<u8, bool>,
    writes: Vec<(u8, bool)>,
    reads: usize,
    cleanup_calls: usize,
}

impl MockDigitalLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// level returned by subsequent reads of `pin`
    pub fn set_input(&self, pin: u8, level: bool) {
        lock(&self.inner).inputs.insert(pin, level);
    }

    pub fn mode(&self, pin: u8) -> Option<(PinMode, Pull)> {
        lock(&self.inner).modes.get(&pin).copied()
    }

    /// all `(pin, level)` writes in order
    pub fn writes(&self) -> Vec<(u8, bool)> {
        lock(&self.inner).writes.clone()
    }

    /// writes to a single pin, in order
    pub fn writes_to(&self, pin: u8) -> Vec<bool> {
        lock(&self.inner)
            .writes
            .iter()
            .filter(|(written, _)| *written == pin)
            .map(|(_, level)| *level)
            .collect()
    }

    pub fn reads(&self) -> usize {
        lock(&self.inner).reads
    }

    pub fn cleanup_calls(&self) -> usize {
        lock(&self.inner).cleanup_calls
    }
}

impl DigitalLine for MockDigitalLine {
    fn set_mode(&mut self, pin: u8, mode: PinMode, pull: Pull) -> Result<()> {
        lock(&self.inner).modes.insert(pin, (mode, pull));
        Ok(())
    }

    fn write(&mut self, pin: u8, level: bool) -> Result<()> {
        let mut inner = lock(&self.inner);
        match inner.modes.get(&pin) {
            Some((PinMode::Output, _)) => {
                inner.writes.push((pin, level));
                Ok(())
            }
            _ => Err(anyhow!("pin {} is not configured as output", pin)),
        }
    }

    fn read(&mut self, pin: u8) -> Result<bool> {
        let mut inner = lock(&self.inner);
        match inner.modes.get(&pin) {
            Some((PinMode::Input, pull)) => {
                let pull = *pull;
                inner.reads += 1;
                Ok(inner
                    .inputs
                    .get(&pin)
                    .copied()
                    .unwrap_or(pull == Pull::Up))
            }
            _ => Err(anyhow!("pin {} is not configured as input", pin)),
        }
    }

    fn cleanup(&mut self) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.cleanup_calls += 1;
        inner.modes.clear();
        Ok(())
    }
}

/// notifier recording the urls it was asked to open
#[derive(Clone, Default)]
pub struct MockNotifier {
    inner: Arc<Mutex<MockNotifierInner>>,
}

#[derive(Default)]
struct MockNotifierInner {
    urls: Vec<String>,
    fail: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// make every notification fail
    pub fn fail(&self) {
        lock(&self.inner).fail = true;
    }

    pub fn urls(&self) -> Vec<String> {
        lock(&self.inner).urls.clone()
    }
}

impl Notifier for MockNotifier {
    fn notify_url(&mut self, url: &str) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.urls.push(url.to_string());
        if inner.fail {
            return Err(anyhow!("no viewer available for {}", url));
        }
        Ok(())
    }
}
