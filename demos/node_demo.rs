//! Sensing node demonstration
//!
//! Wires a board sensor and a soil probe to the sensor manager on simulated
//! hardware, fans readings out to a logging adapter and a queue, and drains
//! the queue on a consumer thread that writes JSON lines to stdout.

use soil_node::hardware::mock::MockBus;
use soil_node::{
    Adapter, BoardSensor, HardwareConfig, JsonLinesAdapter, LoggingAdapter, PotChannel,
    ProbeSensor, QueueAdapter, SensorManager,
};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    println!("=== Soil Sensing Node - Demo ===\n");

    let config = Arc::new(HardwareConfig::from_json(r#"{"serial_settle": 0.0}"#)?);
    let mock = simulated_hardware();

    let board = Arc::new(BoardSensor::new("pcb_main", config.clone(), Arc::new(mock.clone())));
    let probe = Arc::new(ProbeSensor::with_port(
        "teros_main",
        config,
        Arc::new(mock.clone()),
        "/dev/ttyACM0",
    ));

    // Load control happens outside the polling loop
    let position = board.set_resistance(PotChannel::Ad0, 25_000.0)?;
    let (readback, ohms) = board.read_wiper(PotChannel::Ad0)?;
    println!("Wiper set to {} (read back {} = {:.0} ohms)\n", position, readback, ohms);

    let (queue, receiver) = QueueAdapter::bounded(64);
    let queue = Arc::new(queue);
    let sink: Arc<dyn Adapter> = queue.clone();
    let logger: Arc<dyn Adapter> = Arc::new(LoggingAdapter::new());

    let consumer = thread::spawn(move || {
        let writer = JsonLinesAdapter::new(io::stdout());
        let mut written = 0usize;
        // Ends once the manager has released every queue handle
        for reading in receiver {
            match writer.process_reading(&reading) {
                Ok(()) => written += 1,
                Err(e) => eprintln!("Failed to write reading: {}", e),
            }
        }
        written
    });

    let mut manager = SensorManager::new();
    manager.add_sensor(
        board,
        Duration::from_millis(200),
        vec![logger.clone(), sink.clone()],
    )?;
    manager.add_sensor(probe, Duration::from_millis(300), vec![logger, sink])?;

    println!("Sensors: {:?}", manager.sensor_names());
    manager.start_all()?;
    thread::sleep(Duration::from_secs(1));

    manager.stop_sensor("teros_main");
    println!("Probe running: {}", manager.is_running("teros_main"));
    thread::sleep(Duration::from_millis(500));

    manager.cleanup();
    let dropped = queue.dropped();
    drop(queue);

    let written = consumer.join().map_err(|_| "consumer thread panicked")?;
    println!("\nWrote {} readings ({} dropped)", written, dropped);
    println!("Sensing node demo completed successfully!");
    Ok(())
}

/// Board conversions and a probe that answers the handshake and a few data requests
fn simulated_hardware() -> MockBus {
    let mock = MockBus::new();

    for chip_select in 0..2u8 {
        for channel in 0..4u8 {
            let code = 0x10 + chip_select * 0x20 + channel * 0x08;
            mock.set_conversion(chip_select, channel, [code, 0x00, 0x00]);
        }
    }

    mock.script_reply(b"S\n", "U");
    for tick in 0..5 {
        let vwc = 0.31 + f64::from(tick) * 0.01;
        let reply = format!("{},{:.2},{:.1},{:.2}", tick * 300, vwc, 21.4, 0.12);
        mock.script_reply(b"R\n", &reply);
    }

    mock
}
