//! VDL Demo
//!
//! Demonstrates the vdl library features including:
//! - Binary framing and streaming reassembly
//! - Retrying execution with backoff reconnect (in-memory transport)
//! - Background heartbeat monitoring
//! - SCPI queries against a real instrument (optional)
//!
//! Usage: cargo run --features demo --bin demo [instrument_address]
//! Example: RUST_LOG=vdl=debug cargo run --features demo --bin demo 192.168.1.50:5025

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;
use vdl::{
    format_hex, BinaryCodec, Command, Device, DeviceConfig, FrameCodec, GenericDevice,
    HeartbeatConfig, HeartbeatEvent, HeartbeatRunner, LineCodec, MockTransport, PingHeartbeat,
    ReconnectEvent, RingBuffer, ScpiAdapter, TcpTransport, VdlError,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vdl=info")),
        )
        .init();

    println!("🚀 {}", vdl::info());
    println!("=============================\n");

    // =========================================================================
    // Part 1: Framing (no connection required)
    // =========================================================================
    println!("📦 Part 1: Binary framing");
    println!("-------------------------");

    let codec = BinaryCodec::new();
    let command = Command::write(0x10, 0x0200, vec![0x12, 0x34, 0x56]).with_tag("setpoint");
    let frame = codec.encode(&command)?;
    println!("  {}", command);
    println!("  wire: {}", format_hex(&frame));

    // deliver the frame three bytes at a time
    let mut ring = RingBuffer::new(codec.max_frame_size());
    let mut scratch = vec![0u8; frame.len()];
    for (i, piece) in frame.chunks(3).enumerate() {
        ring.write(piece);
        let n = ring.peek(&mut scratch);
        let complete = codec.frame_length(&scratch[..n]);
        println!("  chunk {} -> buffered {:2} bytes, frame_length = {}", i, n, complete);
        if complete > 0 {
            let outcome = codec.decode(&scratch[..n]);
            ring.skip(outcome.consumed);
            let response = outcome.result?;
            println!(
                "  decoded FC={:02X} payload={}",
                response.function_code(),
                format_hex(response.data())
            );
        }
    }

    // =========================================================================
    // Part 2: Retry and reconnect over an in-memory transport
    // =========================================================================
    println!("\n🔁 Part 2: Retry and reconnect");
    println!("------------------------------");

    let mock = MockTransport::new();
    let config = DeviceConfig::new()
        .with_command_timeout(Duration::from_millis(100))
        .with_retry_delay(Duration::from_millis(10))
        .with_reconnect_delay(Duration::from_millis(20));
    let mut device = GenericDevice::with_config(mock.clone(), Box::new(BinaryCodec::new()), config);
    device.set_reconnect_callback(Some(Arc::new(|event: &ReconnectEvent| {
        println!("  reconnect event: {:?}", event);
    })));
    device.connect().await?;

    mock.set_auto_response(Some(BinaryCodec::new().encode(&Command::new(0x03).with_data(vec![0x00, 0x2A]))?));
    mock.set_fail_write_times(2);
    let response = device.execute(&Command::read(0x03, 0x0000, 1)).await?;
    println!(
        "  read after 2 transient write failures: {:?} ({} writes)",
        response.u16_be(0),
        mock.write_calls()
    );

    mock.set_fail_write(true);
    mock.set_fail_open_times(1);
    if let Err(e) = device.execute(&Command::read(0x03, 0x0000, 1)).await {
        println!("  link down: {} -> state {}", e, device.state());
    }
    mock.set_fail_write(false);
    device.reconnect().await?;
    println!("  manual reconnect -> state {}", device.state());
    println!("  stats: {:?}", device.stats());

    // =========================================================================
    // Part 3: Heartbeat
    // =========================================================================
    println!("\n💓 Part 3: Heartbeat");
    println!("--------------------");

    mock.set_auto_response(Some(BinaryCodec::new().encode(&Command::execute(0x00))?));
    let shared = Arc::new(Mutex::new(device));
    let mut runner = HeartbeatRunner::new(
        shared.clone(),
        HeartbeatConfig::new().with_interval(Duration::from_millis(50)),
    )
    .with_strategy(Arc::new(PingHeartbeat::new(0x00)));
    runner.set_callback(Some(Arc::new(
        |event: HeartbeatEvent, failures: u32, err: Option<&VdlError>| match err {
            Some(e) => println!("  heartbeat {} (failures={}): {}", event, failures, e),
            None => println!("  heartbeat {}", event),
        },
    )));
    runner.start()?;
    sleep(Duration::from_millis(180)).await;

    {
        let _quiet = runner.suspend();
        let mut dev = shared.lock().await;
        dev.disconnect();
    }
    sleep(Duration::from_millis(180)).await;
    runner.stop().await;
    println!(
        "  successes={} total_failures={}",
        runner.success_count(),
        runner.total_failures()
    );

    // =========================================================================
    // Part 4: SCPI over TCP (requires an instrument)
    // =========================================================================
    println!("\n🔌 Part 4: SCPI over TCP");
    println!("------------------------");

    let Some(address) = std::env::args().nth(1) else {
        println!("  No instrument address given, skipping");
        println!("\n🎉 Demo completed! (TCP operations skipped)");
        return Ok(());
    };

    let mut instrument = GenericDevice::new(TcpTransport::new(address.clone()), Box::new(LineCodec::new()));
    if let Err(e) = instrument.connect().await {
        println!("  ❌ Failed to connect to {}: {}", address, e);
        println!("\n🎉 Demo completed! (TCP operations skipped)");
        return Ok(());
    }

    let mut scpi = ScpiAdapter::new(&mut instrument);
    match scpi.idn().await {
        Ok(idn) => println!("  *IDN? -> {}", idn),
        Err(e) => println!("  *IDN? Error: {}", e),
    }
    match scpi.drain_errors().await {
        Ok(errors) if errors.is_empty() => println!("  error queue empty"),
        Ok(errors) => errors.iter().for_each(|e| println!("  queued error: {}", e)),
        Err(e) => println!("  SYST:ERR? Error: {}", e),
    }
    scpi.disconnect();

    println!("\n🎉 Demo completed!");
    Ok(())
}
