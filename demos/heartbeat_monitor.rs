//! Heartbeat Monitor Example
//!
//! Runs an echo heartbeat against an in-process TCP echo server, then kills
//! the server to show failure escalation and the device's reconnect events.
//!
//! # Running this example
//!
//! ```bash
//! RUST_LOG=vdl=info cargo run --features demo --example heartbeat_monitor
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use vdl::{
    BinaryCodec, Device, DeviceConfig, EchoHeartbeat, GenericDevice, HeartbeatConfig, HeartbeatEvent,
    HeartbeatRunner, ReconnectEvent, TcpTransport, VdlError, VdlResult,
};

/// Echo every byte back to a single client until the peer goes away.
async fn echo_server(listener: TcpListener) -> VdlResult<()> {
    let (mut socket, _) = listener.accept().await?;
    let mut buf = [0u8; 512];
    loop {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        socket.write_all(&buf[..n]).await?;
    }
}

#[tokio::main]
async fn main() -> VdlResult<()> {
    tracing_subscriber::fmt::init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    let server = tokio::spawn(echo_server(listener));

    let config = DeviceConfig::new()
        .with_command_timeout(Duration::from_millis(200))
        .with_max_retries(2)
        .with_reconnect_delay(Duration::from_millis(50));
    let mut device = GenericDevice::with_config(
        TcpTransport::new(address.to_string()),
        Box::new(BinaryCodec::new()),
        config,
    );
    device.set_reconnect_callback(Some(Arc::new(|event: &ReconnectEvent| {
        println!("  [reconnect] {:?}", event);
    })));

    // =========================================================================
    // Start monitoring
    // =========================================================================

    let device = Arc::new(Mutex::new(device));
    device.lock().await.connect().await?;

    let heartbeat = HeartbeatConfig::new()
        .with_interval(Duration::from_millis(100))
        .with_timeout(Duration::from_millis(200))
        .with_max_failures(3);
    let mut runner = HeartbeatRunner::new(device.clone(), heartbeat)
        .with_strategy(Arc::new(EchoHeartbeat::with_data(0x08, &b"ping"[..])));
    runner.set_callback(Some(Arc::new(
        |event: HeartbeatEvent, failures: u32, err: Option<&VdlError>| match (event, err) {
            (HeartbeatEvent::MaxFailures, Some(e)) => {
                println!("  ⚠️  device unresponsive ({} failures): {}", failures, e)
            }
            (HeartbeatEvent::Failure, Some(e)) => println!("  ❌ probe failed: {}", e),
            (event, _) => println!("  💓 {}", event),
        },
    )));
    runner.start()?;
    tokio::time::sleep(Duration::from_millis(350)).await;

    // =========================================================================
    // Exclusive section: heartbeat suspended
    // =========================================================================

    {
        let _quiet = runner.suspend();
        println!("  (exclusive section, heartbeat paused: {})", runner.is_paused());
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    // =========================================================================
    // Lose the peer
    // =========================================================================

    println!("  stopping echo server");
    server.abort();
    tokio::time::sleep(Duration::from_millis(1200)).await;

    runner.stop().await;
    println!(
        "\nsuccesses={} total_failures={} last_error={:?}",
        runner.success_count(),
        runner.total_failures(),
        runner.last_error().map(|e| e.to_string())
    );
    Ok(())
}
