extern crate pantilt_scanner;

use std::{
    sync::atomic::Ordering,
    thread,
    time::Duration,
};

use anyhow::Result;
use pantilt_scanner::{
    RunState,
    config::ScannerConfig,
    controller::{Hardware, Scanner},
    mock::{MockCamera, MockDecoder, MockDigitalLine, MockNotifier, MockPwm},
};
use tracing::info;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // console output
    let console_layer = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_filter(EnvFilter::from_default_env());

    tracing_subscriber::registry().with(console_layer).init();

    let mut config = ScannerConfig::default();
    config.scan.target = String::from("PALLET-42");

    let line = MockDigitalLine::new();
    let decoder = MockDecoder::new();
    // the target shows up in the second sweep, 5 frames in
    decoder.payloads_at(25 + 4, &["PALLET-17", "PALLET-42"]);

    let hardware = Hardware {
        camera: Box::new(MockCamera::new()),
        decoder: Box::new(decoder),
        pwm: Box::new(MockPwm::new()),
        line: Box::new(line.clone()),
        notifier: Box::new(MockNotifier::new()),
    };
    let mut scanner = Scanner::start(config.clone(), hardware)?;

    let stop = scanner.stop_handle();
    ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))?;

    // simulated upstream machine raising the start line after a short delay
    let start_pin = config.signals.start_pin;
    let start_line = line.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(500));
        info!("raising start line");
        start_line.set_input(start_pin, true);
    });

    let mut matches = 0;
    while !scanner.stop_handle().load(Ordering::SeqCst) && matches == 0 {
        match scanner.step()? {
            RunState::Matched => matches += 1,
            RunState::NoMatch => info!("sweep exhausted, handshake sent"),
            _ => {}
        }
    }

    let stats = scanner.stats();
    println!(
        "cycles {}, matches {}, frames {}, frame failures {}",
        stats.cycles, stats.matches, stats.frames_read, stats.frame_failures
    );
    scanner.shutdown()
}
