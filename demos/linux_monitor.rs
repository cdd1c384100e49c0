//! Example: air quality monitoring with a BME688 on a Linux I2C bus (e.g. a Raspberry Pi).
//!
//! This example demonstrates:
//! 1. **Initialization**: opening `/dev/i2c-1` and identifying the sensor.
//! 2. **Configuration**: oversampling and a 320 °C heater profile.
//! 3. **Acquisition worker**: running the measurement cycle on its own thread.
//! 4. **Telemetry**: reading the shared snapshot from the main thread.
//! 5. **Commands**: feeding the measured temperature back into the heater profile.
//!
//! Run with `cargo run --example linux_monitor --features std [-- /dev/i2c-N]`.

use std::thread;
use std::time::Duration;

use bme688_iaq::iaq::IaqLevel;
use bme688_iaq::monitor::{Command, Monitor, MonitorConfig, NO_DATA};
use bme688_iaq::{regs, Bme688, Bme688Builder, Celsius, HeaterConfig, Milliseconds, Oversampling};
use linux_embedded_hal::{Delay, I2cdev};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "/dev/i2c-1".into());

    // --- 1. Hardware Setup ---
    let i2c = I2cdev::new(&path)?;
    let mut delay = Delay;

    // --- 2. Driver Initialization ---
    let config = Bme688Builder::new()
        .temp_oversampling(Oversampling::X8)
        .pres_oversampling(Oversampling::X4)
        .hum_oversampling(Oversampling::X2)
        .heater(HeaterConfig {
            enabled: true,
            target_temp: Celsius(320.0),
            duration: Milliseconds(150),
        })
        .ambient_temp(Celsius(22.0))
        .build();

    let sensor = Bme688::with_config(i2c, regs::ADDR_SECONDARY, config).init(&mut delay)?;
    println!("BME688 found on {path}");

    // --- 3. Acquisition worker ---
    let monitor = Monitor::spawn(sensor, delay, MonitorConfig::default())?;
    let telemetry = monitor.telemetry();

    // --- 4. Telemetry ---
    for second in 0..60 {
        thread::sleep(Duration::from_secs(1));
        let s = telemetry.snapshot();

        // --- 5. Commands ---
        if second == 10 && s.temperature != NO_DATA {
            monitor.send(Command::SetAmbientTemperature(Celsius(s.temperature)))?;
        }

        let iaq = if s.iaq == NO_DATA {
            "burn-in".to_string()
        } else {
            format!("{:.0} ({:?})", s.iaq, IaqLevel::from_score(s.iaq))
        };

        println!(
            "T: {:.2} °C | P: {:.2} hPa | H: {:.2} % | Alt: {:.1} m | Gas: {:.0} Ω | IAQ: {} | failed cycles: {}",
            s.temperature,
            s.pressure / 100.0,
            s.humidity,
            s.altitude,
            s.gas_resistance,
            iaq,
            s.cycles_failed,
        );
    }

    let (sensor, _delay) = monitor.stop().map_err(|_| "acquisition worker panicked")?;
    drop(sensor.release());

    Ok(())
}
