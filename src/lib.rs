#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

//! # BME688 Gas Sensor Pipeline
//!
//! A type-safe, `no_std` driver for the Bosch BME688 with an indoor air
//! quality tracker on top.
//! The driver uses the typestate pattern so that no measurement can be
//! taken before the chip has been identified and its calibration loaded.
//!
//! ## Features
//! - **Forced mode**: one measurement cycle per call, the chip sleeps in between.
//! - **Per-channel skip**: any of temperature, pressure, humidity or gas can
//!   be disabled; skipped channels are reported as `None`.
//! - **Heater profile**: target temperature and duration are encoded with
//!   the chip's own calibration and the current ambient estimate.
//! - **IAQ**: [`iaq::IaqTracker`] turns the gas resistance into a 0 to 500
//!   score against a self-calibrating baseline.
//! - **Acquisition worker** (`std` feature): [`monitor::Monitor`] runs the
//!   cycle on a thread and publishes the latest values lock-free.
//!
//! ## Units
//! - **Temperature**: °C
//! - **Pressure**: Pa
//! - **Humidity**: %RH, clamped to `[0, 100]`
//! - **Gas Resistance**: Ω
//!
//! ## Example
//! ```no_run
//! # use embedded_hal::{delay::DelayNs, i2c::I2c};
//! # fn run<I: I2c, D: DelayNs>(i2c: I, mut delay: D) -> Result<(), bme688_iaq::error::Bme688Error<I::Error>> {
//! use bme688_iaq::{iaq::IaqTracker, regs, Bme688};
//!
//! let mut sensor = Bme688::new(i2c, regs::ADDR_PRIMARY).init(&mut delay)?;
//! let mut tracker: IaqTracker = IaqTracker::default();
//!
//! let m = sensor.acquire_one(&mut delay)?;
//! if let (Some(t), Some(h), Some(g)) = (m.temperature, m.humidity, m.stable_gas()) {
//!     let _score = tracker.update(t, h, g);
//! }
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod logging;

pub mod calc;
pub mod codec;
pub mod heater;
pub mod iaq;
#[cfg(feature = "std")]
pub mod monitor;
pub mod regs;
mod settings;

pub use settings::{
    Bme688Builder, Config, HeaterConfig, Oversampling, OversamplingConfig, PollConfig,
};

use codec::CalibrationSet;
use core::marker::PhantomData;
use embedded_hal::{delay::DelayNs, i2c};

// --- Typestates ---

/// Sensor has been created but not yet identified and calibrated.
#[derive(Debug)]
pub struct Uninitialized;
/// Sensor is identified, calibrated and configured.
#[derive(Debug)]
pub struct Ready;

/// Error types for the BME688 driver.
pub mod error {
    use core::fmt;

    /// Errors that can occur during communication or acquisition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub enum Bme688Error<E> {
        /// I2C bus error.
        I2CError(E),
        /// An identification register did not hold the BME688 value.
        IdentityMismatch {
            register: u8,
            expected: u8,
            found: u8,
        },
        /// The new-data flag never showed up within the poll attempts.
        StaleData,
    }

    impl<E: fmt::Debug> fmt::Display for Bme688Error<E> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Bme688Error::I2CError(e) => write!(f, "I2C bus error: {:?}", e),
                Bme688Error::IdentityMismatch {
                    register,
                    expected,
                    found,
                } => write!(
                    f,
                    "register 0x{:02X} reads 0x{:02X}, expected 0x{:02X}",
                    register, found, expected
                ),
                Bme688Error::StaleData => write!(f, "no new data after polling"),
            }
        }
    }

    #[cfg(feature = "std")]
    impl<E: fmt::Debug> std::error::Error for Bme688Error<E> {}

    /// Result type alias for BME688 operations.
    pub type Result<T, E> = core::result::Result<T, Bme688Error<E>>;
}

/// Temperature wrapper for type-safety, in °C.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Celsius(pub f32);

/// Duration wrapper for type-safety. Stored in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Milliseconds(pub u16);

/// Compensated measurement result in physical units.
///
/// A channel that was not measured is `None`. Pressure and humidity are
/// derived from the temperature conversion and are `None` whenever
/// temperature is skipped.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    /// Temperature in °C.
    pub temperature: Option<f32>,
    /// Pressure in Pa.
    pub pressure: Option<f32>,
    /// Relative humidity in %.
    pub humidity: Option<f32>,
    /// Gas resistance in Ω.
    pub gas_resistance: Option<f32>,
    /// The gas conversion reported a valid result.
    pub gas_valid: bool,
    /// The heater reached its target temperature.
    pub heat_stable: bool,
}

impl Measurement {
    /// Gas resistance, only if the conversion was valid and the heater had
    /// reached its target.
    pub fn stable_gas(&self) -> Option<f32> {
        if self.gas_valid && self.heat_stable {
            self.gas_resistance
        } else {
            None
        }
    }
}

/// The main BME688 driver structure.
///
/// Use `Bme688::new(...)` to start. The `STATE` generic uses the Typestate
/// pattern to track initialization status at compile time. The driver owns
/// the bus handle; only one driver may talk to a given chip.
#[derive(Debug)]
pub struct Bme688<I2C, STATE> {
    i2c: I2C,
    address: u8,
    calib: CalibrationSet,
    config: Config,
    _state: PhantomData<STATE>,
}

impl<I2C, E> Bme688<I2C, Uninitialized>
where
    I2C: i2c::I2c<Error = E>,
{
    /// Creates a new driver instance with the default configuration.
    ///
    /// This does not communicate with the sensor yet.
    ///
    /// # Arguments
    /// * `i2c` - The I2C bus object.
    /// * `address` - The I2C address of the sensor (`regs::ADDR_PRIMARY` or `regs::ADDR_SECONDARY`).
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self::with_config(i2c, address, Config::default())
    }

    /// Creates a new driver instance that applies `config` during [`init`](Self::init).
    pub fn with_config(i2c: I2C, address: u8, config: Config) -> Self {
        Bme688 {
            i2c,
            address,
            calib: CalibrationSet::default(),
            config,
            _state: PhantomData,
        }
    }

    /// Soft-resets the chip, checks its identity, loads the calibration and
    /// applies the configuration.
    ///
    /// This transitions the driver state from `Uninitialized` to `Ready`.
    ///
    /// # Errors
    /// `IdentityMismatch` if the chip is not a BME688, `I2CError` on any bus
    /// failure.
    pub fn init(mut self, delay: &mut impl DelayNs) -> error::Result<Bme688<I2C, Ready>, E> {
        self.reset(delay)?;

        self.check_identity(regs::ADDR_CHIP_ID, regs::CHIP_ID)?;
        self.check_identity(regs::ADDR_VARIANT_ID, regs::VARIANT_ID_BME688)?;

        let calib = self.read_calibration()?;

        let mut sensor = Bme688 {
            i2c: self.i2c,
            address: self.address,
            calib,
            config: self.config,
            _state: PhantomData,
        };

        let config = sensor.config;
        sensor.configure(config.osrs_config)?;
        sensor.configure_heater(config.heater)?;

        log_info!("BME688 at address {} ready", sensor.address);

        Ok(sensor)
    }

    /// Resets all registers to their power-on values.
    fn reset(&mut self, delay: &mut impl DelayNs) -> error::Result<(), E> {
        self.write_reg(&[regs::ADDR_SOFT_RESET, regs::CMD_SOFT_RESET])?;
        delay.delay_ms(10);

        Ok(())
    }

    fn check_identity(&mut self, register: u8, expected: u8) -> error::Result<(), E> {
        let found = self.read_reg_byte(register)?;

        if found != expected {
            log_warn!(
                "identity mismatch at register {}: found {}, expected {}",
                register,
                found,
                expected
            );
            return Err(error::Bme688Error::IdentityMismatch {
                register,
                expected,
                found,
            });
        }

        Ok(())
    }

    /// Reads the factory-fused calibration coefficients.
    ///
    /// They are spread over three non-contiguous register blocks.
    fn read_calibration(&mut self) -> error::Result<CalibrationSet, E> {
        let mut group1 = [0u8; regs::LEN_CALIB_GROUP_1];
        let mut group2 = [0u8; regs::LEN_CALIB_GROUP_2];
        let mut group3 = [0u8; regs::LEN_CALIB_GROUP_3];

        self.read_into(regs::ADDR_CALIB_GROUP_1, &mut group1)?;
        self.read_into(regs::ADDR_CALIB_GROUP_2, &mut group2)?;
        self.read_into(regs::ADDR_CALIB_GROUP_3, &mut group3)?;

        Ok(codec::parse_calibration(&group1, &group2, &group3))
    }
}

impl<I2C, STATE, E> Bme688<I2C, STATE>
where
    I2C: i2c::I2c<Error = E>,
{
    /// Reads data from a starting register address into a provided buffer.
    fn read_into(&mut self, reg_address: u8, buffer: &mut [u8]) -> error::Result<(), E> {
        self.i2c
            .write_read(self.address, &[reg_address], buffer)
            .map_err(error::Bme688Error::I2CError)
    }

    /// Reads a single byte from a specific register address.
    fn read_reg_byte(&mut self, reg_address: u8) -> error::Result<u8, E> {
        let mut buffer = [0];
        self.read_into(reg_address, &mut buffer)?;

        Ok(buffer[0])
    }

    /// Writes a byte slice (typically `[Register, Value]`) to the sensor.
    fn write_reg(&mut self, data: &[u8]) -> error::Result<(), E> {
        self.i2c
            .write(self.address, data)
            .map_err(error::Bme688Error::I2CError)
    }

    /// Read-modify-write of a single register.
    fn update_reg(&mut self, reg_address: u8, f: impl FnOnce(u8) -> u8) -> error::Result<(), E> {
        let current = self.read_reg_byte(reg_address)?;
        self.write_reg(&[reg_address, f(current)])
    }
}

impl<I2C, E> Bme688<I2C, Ready>
where
    I2C: i2c::I2c<Error = E>,
{
    /// Sets oversampling rates for temperature, pressure and humidity.
    ///
    /// `ctrl_hum` (0x72) is written first; the chip only latches it on the
    /// following write to `ctrl_meas` (0x74).
    pub fn configure(&mut self, osrs: OversamplingConfig) -> error::Result<(), E> {
        self.update_reg(regs::ADDR_CTRL_HUM, |reg| {
            codec::ctrl_hum_oversampling(reg, &osrs)
        })?;
        self.update_reg(regs::ADDR_CTRL_MEAS, |reg| {
            codec::ctrl_meas_oversampling(reg, &osrs)
        })?;

        self.config.osrs_config = osrs;
        Ok(())
    }

    /// Reads the oversampling settings back from the chip.
    pub fn read_oversampling(&mut self) -> error::Result<OversamplingConfig, E> {
        let ctrl_hum = self.read_reg_byte(regs::ADDR_CTRL_HUM)?;
        let ctrl_meas = self.read_reg_byte(regs::ADDR_CTRL_MEAS)?;

        Ok(codec::decode_oversampling(ctrl_hum, ctrl_meas))
    }

    /// Programs heater profile 0 and switches the gas conversion on or off.
    ///
    /// The resistance code is computed from the current ambient temperature
    /// estimate; see [`set_ambient_temperature`](Self::set_ambient_temperature).
    pub fn configure_heater(&mut self, heater: HeaterConfig) -> error::Result<(), E> {
        if heater.enabled {
            let codes = heater::encode(&heater, self.config.ambient_temp, &self.calib.gas);
            log_debug!(
                "heater profile: res_heat {}, gas_wait {}",
                codes.res_heat.code,
                codes.gas_wait
            );

            self.write_reg(&[regs::ADDR_RES_HEAT_0, codes.res_heat.code])?;
            self.write_reg(&[regs::ADDR_GAS_WAIT_0, codes.gas_wait])?;
        }

        self.update_reg(regs::ADDR_CTRL_GAS_0, |reg| {
            codec::ctrl_gas_0(reg, heater.enabled)
        })?;
        self.update_reg(regs::ADDR_CTRL_GAS_1, |reg| {
            codec::ctrl_gas_1(reg, heater.enabled, 0)
        })?;

        self.config.heater = heater;
        Ok(())
    }

    /// Updates the ambient temperature estimate.
    ///
    /// Takes effect on the next [`configure_heater`](Self::configure_heater).
    pub fn set_ambient_temperature(&mut self, ambient: Celsius) {
        self.config.ambient_temp = ambient;
    }

    /// Sets the offset subtracted from every compensated temperature.
    pub fn set_temperature_offset(&mut self, offset: Celsius) {
        self.config.temp_offset = offset;
    }

    /// Triggers a measurement in forced mode, waits for completion and
    /// returns compensated data.
    ///
    /// If every channel is disabled this returns immediately with an empty
    /// measurement and no bus traffic.
    ///
    /// # Errors
    /// `StaleData` if the new-data flag is still clear after the configured
    /// number of polls, `I2CError` on a bus failure while triggering or if
    /// the last poll failed on the bus.
    pub fn acquire_one(&mut self, delay: &mut impl DelayNs) -> error::Result<Measurement, E> {
        let osrs = self.config.osrs_config;
        let gas_enabled = self.config.gas_enabled();

        if !gas_enabled && osrs.is_all_skipped() {
            return Ok(Measurement::default());
        }

        // 1. Wake up sensor and start measurement cycle
        self.update_reg(regs::ADDR_CTRL_MEAS, |reg| {
            codec::ctrl_meas_mode(reg, regs::MODE_FORCED)
        })?;

        // 2. Wait for TPH conversion, heating and gas conversion
        delay.delay_us(self.measurement_wait_us());

        // 3. Poll for "New Data" bit and read ADC values
        let field = self.poll_field(delay)?;
        let raw = codec::decode_field(&field);

        // 4. Compensate enabled channels
        Ok(calc::compensate(
            &raw,
            &self.calib,
            &osrs,
            gas_enabled,
            self.config.temp_offset.0,
        ))
    }

    /// Time to wait after the trigger before the first poll.
    fn measurement_wait_us(&self) -> u32 {
        let mut wait_us = calc::measure_duration_us(&self.config.osrs_config);

        if self.config.gas_enabled() {
            let code = heater::calc_gas_wait(self.config.heater.duration);
            let heat_ms = heater::decode_gas_wait(code);
            wait_us = wait_us.saturating_add(heat_ms * 1000);
        }

        wait_us.saturating_add(self.config.poll.settle_margin_us)
    }

    /// Reads field 0 until the new-data flag is set.
    ///
    /// Every read counts as one attempt, whether it fails on the bus or comes
    /// back without the flag.
    fn poll_field(
        &mut self,
        delay: &mut impl DelayNs,
    ) -> error::Result<[u8; regs::LEN_FIELD_0], E> {
        let poll = self.config.poll;
        let mut field = [0u8; regs::LEN_FIELD_0];
        let mut last_error = None;

        for attempt in 1..=poll.attempts {
            match self.read_into(regs::ADDR_FIELD_0, &mut field) {
                Ok(()) if codec::has_new_data(&field) => return Ok(field),
                Ok(()) => {
                    log_debug!("poll {}/{}: no new data", attempt, poll.attempts);
                    last_error = None;
                }
                Err(e) => {
                    log_debug!("poll {}/{}: bus error", attempt, poll.attempts);
                    last_error = Some(e);
                }
            }

            if attempt < poll.attempts {
                delay.delay_us(poll.interval_us);
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => {
                log_warn!("no new data after {} polls", poll.attempts);
                Err(error::Bme688Error::StaleData)
            }
        }
    }

    /// Factory calibration read at initialization.
    pub fn calibration(&self) -> &CalibrationSet {
        &self.calib
    }

    /// The configuration currently applied to the chip.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Gives the bus handle back.
    pub fn release(self) -> I2C {
        self.i2c
    }
}
