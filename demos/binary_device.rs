//! Binary Device Example
//!
//! This example starts a tiny in-process device simulator on a local TCP port
//! and talks to it with `GenericDevice` + `BinaryCodec`. The simulator answers
//! every frame by echoing its function code with a register snapshot, and
//! splits its replies into small TCP writes to show streaming reassembly.
//!
//! # Running this example
//!
//! ```bash
//! RUST_LOG=vdl=debug cargo run --features demo --example binary_device
//! ```

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use vdl::{
    BinaryCodec, Command, Device, DeviceConfig, FrameCodec, GenericDevice, Response, TcpTransport,
    VdlResult,
};

/// Accept one client and answer each frame with `[fc, counter_hi, counter_lo]`.
async fn simulator(listener: TcpListener) -> VdlResult<()> {
    let (mut socket, peer) = listener.accept().await?;
    println!("[sim] client connected from {}", peer);

    let codec = BinaryCodec::new();
    let mut pending = Vec::new();
    let mut buf = [0u8; 256];
    let mut counter: u16 = 0;

    loop {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            println!("[sim] client closed the connection");
            return Ok(());
        }
        pending.extend_from_slice(&buf[..n]);

        while codec.frame_length(&pending) > 0 {
            let outcome = codec.decode(&pending);
            pending.drain(..outcome.consumed);
            let request = outcome.result?;

            counter = counter.wrapping_add(1);
            let mut payload = vec![request.function_code()];
            payload.extend_from_slice(&counter.to_be_bytes());
            let reply = codec.encode(&Command::new(request.function_code()).with_data(payload))?;

            for piece in reply.chunks(2) {
                socket.write_all(piece).await?;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
    }
}

fn describe(response: &Response) -> String {
    format!(
        "FC={:02X} status={:?} counter={:?}",
        response.function_code(),
        response.status(),
        response.u16_be(1)
    )
}

#[tokio::main]
async fn main() -> VdlResult<()> {
    tracing_subscriber::fmt::init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    let sim = tokio::spawn(simulator(listener));

    let config = DeviceConfig::new()
        .with_command_timeout(Duration::from_millis(500))
        .with_max_retries(2);
    let mut device = GenericDevice::with_config(
        TcpTransport::new(address.to_string()),
        Box::new(BinaryCodec::new()),
        config,
    );
    device.connect().await?;
    println!("Connected to simulator at {}", address);

    // =========================================================================
    // Command round trips
    // =========================================================================

    let commands = [
        Command::read(0x03, 0x0000, 4).with_tag("read holding"),
        Command::write(0x06, 0x0010, vec![0x00, 0x64]).with_tag("write single"),
        Command::execute(0x08).with_tag("diagnostics"),
    ];
    for command in &commands {
        let response = device.execute(command).await?;
        println!("{} -> {}", command, describe(&response));
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    let stats = device.stats();
    println!(
        "\nsent={} received={} errors={} retries={}",
        stats.commands_sent, stats.responses_received, stats.errors, stats.retries
    );

    device.disconnect();
    match sim.await {
        Ok(result) => result?,
        Err(e) => println!("[sim] task failed: {}", e),
    }
    Ok(())
}
