//! Periodic acquisition on a dedicated thread.
//!
//! The worker owns the driver, the delay provider and the IAQ tracker and is
//! the only writer of [`Telemetry`]. Every field is stored atomically on its
//! own, so a reader can see values from two consecutive cycles side by side.
//! Readers never block the worker.
//!
//! Settings are changed through [`Command`]s, which the worker applies on the
//! bus between two cycles. The IAQ baseline survives every command.

use core::fmt::Debug;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SendError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use embedded_hal::{delay::DelayNs, i2c};
use libm::powf;

use crate::error;
use crate::iaq::{IaqConfig, IaqTracker};
use crate::{
    Bme688, Celsius, HeaterConfig, Measurement, Oversampling, OversamplingConfig, Ready,
};

/// Value of a telemetry field that has not been published yet.
pub const NO_DATA: f32 = -1.0;

/// Standard atmosphere pressure at sea level, in Pa.
const SEA_LEVEL_PA: f32 = 101_325.0;

/// Altitude in metres above sea level for a pressure in Pa (barometric formula).
pub fn altitude_from_pressure(pressure: f32) -> f32 {
    44_330.769_23 * (1.0 - powf(pressure / SEA_LEVEL_PA, 0.190_266))
}

/// An `f32` stored as its bit pattern.
#[derive(Debug)]
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed)
    }
}

/// Latest published values, shared between the worker and any number of
/// readers.
#[derive(Debug)]
pub struct Telemetry {
    temperature: AtomicF32,
    pressure: AtomicF32,
    humidity: AtomicF32,
    gas_resistance: AtomicF32,
    altitude: AtomicF32,
    iaq: AtomicF32,
    cycles_ok: AtomicU64,
    cycles_failed: AtomicU64,
}

/// Plain copy of the telemetry fields. Unpublished fields hold [`NO_DATA`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub temperature: f32,
    pub pressure: f32,
    pub humidity: f32,
    pub gas_resistance: f32,
    pub altitude: f32,
    pub iaq: f32,
    pub cycles_ok: u64,
    pub cycles_failed: u64,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            temperature: AtomicF32::new(NO_DATA),
            pressure: AtomicF32::new(NO_DATA),
            humidity: AtomicF32::new(NO_DATA),
            gas_resistance: AtomicF32::new(NO_DATA),
            altitude: AtomicF32::new(NO_DATA),
            iaq: AtomicF32::new(NO_DATA),
            cycles_ok: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
        }
    }

    /// Reads every field. Fields are loaded one by one, not as a unit.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            temperature: self.temperature.load(),
            pressure: self.pressure.load(),
            humidity: self.humidity.load(),
            gas_resistance: self.gas_resistance.load(),
            altitude: self.altitude.load(),
            iaq: self.iaq.load(),
            cycles_ok: self.cycles_ok.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
        }
    }

    /// Stores the channels present in `measurement`; missing channels keep
    /// their previous value. The IAQ is only replaced by a score.
    pub fn publish(&self, measurement: &Measurement, iaq: Option<f32>) {
        if let Some(t) = measurement.temperature {
            self.temperature.store(t);
        }
        if let Some(p) = measurement.pressure {
            self.pressure.store(p);
            self.altitude.store(altitude_from_pressure(p));
        }
        if let Some(h) = measurement.humidity {
            self.humidity.store(h);
        }
        if let Some(g) = measurement.gas_resistance {
            self.gas_resistance.store(g);
        }
        if let Some(score) = iaq {
            self.iaq.store(score);
        }

        self.cycles_ok.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Settings of the acquisition worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorConfig {
    /// Sleep between the end of one cycle and the start of the next.
    pub period: Duration,
    pub iaq: IaqConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            iaq: IaqConfig::default(),
        }
    }
}

/// Runs one acquisition cycle and publishes the result.
///
/// On failure the telemetry values stay as they were and the failure counter
/// is bumped; the error is returned so the caller can decide what to do next.
pub fn run_cycle<I2C, E, D, const N: usize>(
    sensor: &mut Bme688<I2C, Ready>,
    delay: &mut D,
    tracker: &mut IaqTracker<N>,
    telemetry: &Telemetry,
) -> error::Result<Measurement, E>
where
    I2C: i2c::I2c<Error = E>,
    D: DelayNs,
{
    match sensor.acquire_one(delay) {
        Ok(measurement) => {
            if measurement.gas_resistance.is_some() && measurement.stable_gas().is_none() {
                log::debug!(
                    "gas reading not used for IAQ: valid {}, heat stable {}",
                    measurement.gas_valid,
                    measurement.heat_stable
                );
            }

            let iaq = match (
                measurement.temperature,
                measurement.humidity,
                measurement.stable_gas(),
            ) {
                (Some(t), Some(h), Some(g)) => tracker.update(t, h, g),
                _ => None,
            };

            telemetry.publish(&measurement, iaq);
            Ok(measurement)
        }
        Err(e) => {
            telemetry.record_failure();
            Err(e)
        }
    }
}

/// A TPH channel that can be switched at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Temperature,
    Pressure,
    Humidity,
}

impl Channel {
    fn of(self, osrs: &mut OversamplingConfig) -> &mut Oversampling {
        match self {
            Channel::Temperature => &mut osrs.temp_osrs,
            Channel::Pressure => &mut osrs.pres_osrs,
            Channel::Humidity => &mut osrs.hum_osrs,
        }
    }
}

/// Settings change applied by the worker before its next cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Offset subtracted from every compensated temperature.
    SetTemperatureOffset(Celsius),
    /// New ambient estimate; the heater is reprogrammed if it is on.
    SetAmbientTemperature(Celsius),
    /// Switches the heater and the gas conversion on or off.
    SetGas(bool),
    /// Switches a channel off, or back on with the oversampling it had when
    /// the worker started (1x if it was skipped then).
    SetChannel(Channel, bool),
}

/// Handle to a running acquisition worker.
pub struct Monitor<I2C, D> {
    stop: Arc<AtomicBool>,
    commands: Sender<Command>,
    telemetry: Arc<Telemetry>,
    handle: JoinHandle<(Bme688<I2C, Ready>, D)>,
}

impl<I2C, E, D> Monitor<I2C, D>
where
    I2C: i2c::I2c<Error = E> + Send + 'static,
    E: Debug,
    D: DelayNs + Send + 'static,
{
    /// Moves the driver and delay provider onto a new thread and starts
    /// acquiring every `config.period`.
    pub fn spawn(sensor: Bme688<I2C, Ready>, delay: D, config: MonitorConfig) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let telemetry = Arc::new(Telemetry::new());
        let (commands, inbox) = mpsc::channel();

        let worker_stop = Arc::clone(&stop);
        let worker_telemetry = Arc::clone(&telemetry);
        let worker = Worker::new(sensor, delay, config.iaq);

        let handle = thread::Builder::new()
            .name("bme688-acquisition".into())
            .spawn(move || worker.run(config.period, &worker_stop, &inbox, &worker_telemetry))?;

        log::info!("acquisition worker started, period {:?}", config.period);

        Ok(Self {
            stop,
            commands,
            telemetry,
            handle,
        })
    }

    /// Queues a settings change for the worker.
    ///
    /// Fails only if the worker thread has already exited.
    pub fn send(&self, command: Command) -> Result<(), SendError<Command>> {
        self.commands.send(command)
    }

    /// Shared view of the published values.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Asks the worker to stop and waits for it.
    ///
    /// A cycle in progress is completed first. Returns the driver and the
    /// delay provider, or the panic payload if the worker panicked.
    pub fn stop(self) -> thread::Result<(Bme688<I2C, Ready>, D)> {
        self.stop.store(true, Ordering::Relaxed);
        let parts = self.handle.join();

        log::info!("acquisition worker stopped");
        parts
    }
}

struct Worker<I2C, D> {
    sensor: Bme688<I2C, Ready>,
    delay: D,
    tracker: IaqTracker,
    configured: OversamplingConfig,
}

impl<I2C, E, D> Worker<I2C, D>
where
    I2C: i2c::I2c<Error = E>,
    E: Debug,
    D: DelayNs,
{
    fn new(sensor: Bme688<I2C, Ready>, delay: D, iaq: IaqConfig) -> Self {
        let configured = sensor.config().osrs_config;

        Self {
            sensor,
            delay,
            tracker: IaqTracker::new(iaq),
            configured,
        }
    }

    fn apply(&mut self, command: Command) -> error::Result<(), E> {
        match command {
            Command::SetTemperatureOffset(offset) => self.sensor.set_temperature_offset(offset),
            Command::SetAmbientTemperature(ambient) => {
                self.sensor.set_ambient_temperature(ambient);
                let heater = self.sensor.config().heater;
                if heater.enabled {
                    self.sensor.configure_heater(heater)?;
                }
            }
            Command::SetGas(enabled) => {
                let heater = HeaterConfig {
                    enabled,
                    ..self.sensor.config().heater
                };
                self.sensor.configure_heater(heater)?;
            }
            Command::SetChannel(channel, enabled) => {
                let restored = match *channel.of(&mut self.configured) {
                    Oversampling::Skipped => Oversampling::default(),
                    os => os,
                };

                let mut osrs = self.sensor.config().osrs_config;
                *channel.of(&mut osrs) = if enabled {
                    restored
                } else {
                    Oversampling::Skipped
                };
                self.sensor.configure(osrs)?;
            }
        }

        Ok(())
    }

    fn cycle(&mut self, telemetry: &Telemetry) -> error::Result<Measurement, E> {
        run_cycle(&mut self.sensor, &mut self.delay, &mut self.tracker, telemetry)
    }

    fn run(
        mut self,
        period: Duration,
        stop: &AtomicBool,
        inbox: &Receiver<Command>,
        telemetry: &Telemetry,
    ) -> (Bme688<I2C, Ready>, D) {
        while !stop.load(Ordering::Relaxed) {
            for command in inbox.try_iter() {
                match self.apply(command) {
                    Ok(()) => log::info!("applied {:?}", command),
                    Err(e) => log::warn!("could not apply {:?}: {}", command, e),
                }
            }

            match self.cycle(telemetry) {
                Ok(m) => log::debug!(
                    "T {:?} C, P {:?} Pa, H {:?} %, gas {:?} Ohm",
                    m.temperature,
                    m.pressure,
                    m.humidity,
                    m.gas_resistance
                ),
                Err(e) => log::warn!("acquisition cycle failed: {}", e),
            }

            thread::sleep(period);
        }

        (self.sensor, self.delay)
    }
}
