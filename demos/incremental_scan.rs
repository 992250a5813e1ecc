extern crate pantilt_scanner;

use std::sync::atomic::Ordering;

use anyhow::Result;
use pantilt_scanner::{
    SweepMode,
    config::{PolicyKind, ScannerConfig},
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
    config.signals.start_gate = false;
    config.scan.mode = SweepMode::Incremental;
    config.scan.policy = PolicyKind::Classify;

    let camera = MockCamera::new();
    // a few dropped frames on the way
    camera.fail_read(3);
    camera.fail_read(4);
    let decoder = MockDecoder::new();
    decoder.payloads_at(9, &["https://example.com/pallet/42"]);
    let notifier = MockNotifier::new();

    let hardware = Hardware {
        camera: Box::new(camera),
        decoder: Box::new(decoder),
        pwm: Box::new(MockPwm::new()),
        line: Box::new(MockDigitalLine::new()),
        notifier: Box::new(notifier.clone()),
    };
    let mut scanner = Scanner::start(config, hardware)?;

    let stop = scanner.stop_handle();
    ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))?;

    // one frame per step, at most two laps of the grid
    for _ in 0..50 {
        if scanner.stop_handle().load(Ordering::SeqCst) {
            break;
        }
        let state = scanner.step()?;
        info!("state after frame: {}", state);
        if scanner.stats().matches > 0 {
            break;
        }
    }

    let stats = scanner.stats();
    println!(
        "frames {}, frame failures {}, matches {}",
        stats.frames_read, stats.frame_failures, stats.matches
    );
    for url in notifier.urls() {
        println!("would open {}", url);
    }
    scanner.shutdown()
}
