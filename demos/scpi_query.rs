//! SCPI Query Example
//!
//! Connects to a SCPI instrument over raw TCP (port 5025 on most bench
//! instruments), identifies it and reads a few values.
//!
//! # Running this example
//!
//! ```bash
//! cargo run --features demo --example scpi_query -- 192.168.1.50:5025
//! ```
//!
//! Note: This requires a SCPI instrument (or simulator) listening on the
//! given address. Defaults to 127.0.0.1:5025.

use std::time::Duration;

use vdl::{
    DeviceConfig, DeviceGuard, DeviceInfo, GenericDevice, LineCodec, ScpiAdapter,
    TcpTransport, TransportConfig, VdlResult,
};

#[tokio::main]
async fn main() -> VdlResult<()> {
    tracing_subscriber::fmt::init();

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5025".to_string());

    let transport = TcpTransport::with_config(
        address.clone(),
        TransportConfig::new().with_connect_timeout(Duration::from_secs(3)),
    );
    let config = DeviceConfig::new()
        .with_command_timeout(Duration::from_secs(2))
        .with_reconnect_on_timeout(false);
    let mut device = GenericDevice::with_config(transport, Box::new(LineCodec::new()), config);

    // the guard disconnects again when it goes out of scope
    let mut guard = DeviceGuard::connect(&mut device).await;
    if let Some(e) = guard.connect_error() {
        println!("Could not connect to {}: {}", address, e);
        return Ok(());
    }

    let mut scpi = ScpiAdapter::new(&mut *guard);

    // =========================================================================
    // Identification
    // =========================================================================

    let idn = scpi.idn().await?;
    let info = DeviceInfo::from_idn(address.as_str(), &idn);
    println!("Manufacturer: {}", info.manufacturer);
    println!("Model:        {}", info.model);
    println!("Serial:       {}", info.serial_number);
    println!("Firmware:     {}", info.firmware_version);
    scpi.device_mut().set_info(info);

    // =========================================================================
    // Status and measurements
    // =========================================================================

    scpi.clear_status().await?;
    println!("Operation complete: {}", scpi.operation_complete().await?);

    match scpi.query_f64("MEAS:VOLT:DC?").await {
        Ok(volts) => println!("DC voltage: {:.6} V", volts),
        Err(e) => println!("MEAS:VOLT:DC? not supported: {}", e),
    }

    match scpi.query("TRAC:DATA?").await {
        Ok(block) => match ScpiAdapter::<TcpTransport>::parse_f64_list(&block) {
            Ok(points) => println!("Trace: {} points", points.len()),
            Err(e) => println!("Trace parse error: {}", e),
        },
        Err(e) => println!("TRAC:DATA? not supported: {}", e),
    }

    for error in scpi.drain_errors().await? {
        println!("Instrument error: {}", error);
    }

    println!("Connected: {}", scpi.is_connected());
    Ok(())
}
