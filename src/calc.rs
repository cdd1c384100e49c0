//! Compensation engine.
//!
//! Floating point compensation formulas from the BME688 datasheet
//! (section 3.3). All functions are pure: they take a raw ADC code and the
//! relevant calibration coefficients and return a value in physical units.
//!
//! Temperature must run first. Its fine-resolution intermediate (`t_fine`)
//! is returned in [`TempComp`] and passed explicitly to the pressure and
//! humidity formulas of the same sample.

use crate::codec::{CalibrationSet, HumCalib, PressCalib, RawSample, TempCalib};
use crate::settings::OversamplingConfig;
use crate::Measurement;

/// Result of the temperature compensation.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TempComp {
    /// Fine-resolution intermediate consumed by pressure and humidity.
    pub t_fine: f32,
    /// Compensated temperature in °C.
    pub celsius: f32,
}

/// Converts the raw temperature code into °C.
///
/// `offset` is subtracted from the result by shifting `t_fine`, so pressure
/// and humidity computed from the returned value see the corrected
/// temperature as well.
pub fn compensate_temperature(temp_adc: u32, offset: f32, calib: &TempCalib) -> TempComp {
    let adc = temp_adc as f32;
    let par_t1 = calib.par_t1 as f32;

    let var1 = ((adc / 16384.0) - (par_t1 / 1024.0)) * calib.par_t2 as f32;
    let var2 = (adc / 131072.0) - (par_t1 / 8192.0);
    let var2 = var2 * var2 * calib.par_t3 as f32 * 16.0;

    let t_fine = var1 + var2 - offset * 5120.0;

    TempComp {
        t_fine,
        celsius: t_fine / 5120.0,
    }
}

/// Converts the raw pressure code into Pascal.
///
/// A degenerate calibration that zeroes the divisor yields exactly `0.0`.
pub fn compensate_pressure(press_adc: u32, t_fine: f32, calib: &PressCalib) -> f32 {
    let mut var1 = (t_fine / 2.0) - 64000.0;
    let mut var2 = var1 * var1 * (calib.par_p6 as f32 / 131072.0);
    var2 += var1 * calib.par_p5 as f32 * 2.0;
    var2 = (var2 / 4.0) + (calib.par_p4 as f32 * 65536.0);
    var1 = (((calib.par_p3 as f32 * var1 * var1) / 16384.0) + (calib.par_p2 as f32 * var1))
        / 524288.0;
    var1 = (1.0 + (var1 / 32768.0)) * calib.par_p1 as f32;

    if var1 == 0.0 {
        log_warn!("pressure compensation divisor is zero, reporting 0 Pa");
        return 0.0;
    }

    let mut press_comp = 1048576.0 - press_adc as f32;
    press_comp = ((press_comp - (var2 / 4096.0)) * 6250.0) / var1;

    let var1 = (calib.par_p9 as f32 * press_comp * press_comp) / 2147483648.0;
    let var2 = press_comp * (calib.par_p8 as f32 / 32768.0);
    let var4 = press_comp / 256.0;
    let var3 = var4 * var4 * var4 * (calib.par_p10 as f32 / 131072.0);

    press_comp + (var1 + var2 + var3 + (calib.par_p7 as f32 * 128.0)) / 16.0
}

/// Converts the raw humidity code into %RH, clamped to `[0, 100]`.
pub fn compensate_humidity(hum_adc: u16, t_fine: f32, calib: &HumCalib) -> f32 {
    let temp_comp = t_fine / 5120.0;

    let var1 = hum_adc as f32
        - ((calib.par_h1 as f32 * 16.0) + ((calib.par_h3 as f32 / 2.0) * temp_comp));
    let var2 = var1
        * (calib.par_h2 as f32 / 262144.0
            * (1.0
                + (calib.par_h4 as f32 / 16384.0 * temp_comp)
                + (calib.par_h5 as f32 / 1048576.0 * temp_comp * temp_comp)));
    let var3 = calib.par_h6 as f32 / 16384.0;
    let var4 = calib.par_h7 as f32 / 2097152.0;

    let hum_comp = var2 + ((var3 + (var4 * temp_comp)) * var2 * var2);

    // NaN fails both comparisons and lands on 0
    if hum_comp > 100.0 {
        100.0
    } else if hum_comp >= 0.0 {
        hum_comp
    } else {
        0.0
    }
}

/// Converts the raw gas code and its range into Ohm.
///
/// The result is not clamped. Near `gas_adc == 512` in the lowest ranges the
/// formula becomes very steep, so callers should treat extreme values as out
/// of range rather than as a precise resistance.
pub fn compensate_gas(gas_adc: u16, gas_range: u8) -> f32 {
    let var1 = 262144u32 >> (gas_range & 0x0F);
    let var2 = (gas_adc as i32 - 512) * 3 + 4096;

    1_000_000.0 * var1 as f32 / var2 as f32
}

// Conversion timings of the BME68x family, in microseconds.
const US_PER_CYCLE: u32 = 1963;
const TPH_SWITCHING_US: u32 = 477 * 4;
const GAS_MEASUREMENT_US: u32 = 477 * 5;
const FORCED_WAKEUP_US: u32 = 1000;

/// Time a forced-mode TPH conversion takes with the given oversampling.
///
/// The heater duration is not included.
pub fn measure_duration_us(osrs: &OversamplingConfig) -> u32 {
    osrs.total_cycles() * US_PER_CYCLE + TPH_SWITCHING_US + GAS_MEASUREMENT_US + FORCED_WAKEUP_US
}

/// Runs the compensation for every enabled channel of a raw sample.
///
/// Pressure and humidity need `t_fine` and are only produced together with
/// temperature.
pub fn compensate(
    raw: &RawSample,
    calib: &CalibrationSet,
    osrs: &OversamplingConfig,
    gas_enabled: bool,
    temp_offset: f32,
) -> Measurement {
    let mut measurement = Measurement {
        gas_valid: raw.gas_valid,
        heat_stable: raw.heat_stable,
        ..Measurement::default()
    };

    if !osrs.temp_osrs.is_skipped() {
        let temp = compensate_temperature(raw.temp_adc, temp_offset, &calib.temp);
        measurement.temperature = Some(temp.celsius);

        if !osrs.pres_osrs.is_skipped() {
            measurement.pressure =
                Some(compensate_pressure(raw.press_adc, temp.t_fine, &calib.press));
        }
        if !osrs.hum_osrs.is_skipped() {
            measurement.humidity = Some(compensate_humidity(raw.hum_adc, temp.t_fine, &calib.hum));
        }
    }

    if gas_enabled {
        measurement.gas_resistance = Some(compensate_gas(raw.gas_adc, raw.gas_range));
    }

    measurement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_field, tests as fixtures};
    use crate::settings::Oversampling;

    fn assert_close(actual: f32, expected: f32, tolerance: f32) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected} ± {tolerance}, got {actual}"
        );
    }

    #[test]
    fn temperature_from_reference_trace() {
        let calib = fixtures::calibration();
        let temp = compensate_temperature(497_612, 0.0, &calib.temp);

        assert_close(temp.t_fine, 124_826.03, 1.0);
        assert_close(temp.celsius, 24.380, 0.001);
    }

    #[test]
    fn offset_shifts_t_fine() {
        let calib = fixtures::calibration();
        let plain = compensate_temperature(497_612, 0.0, &calib.temp);
        let shifted = compensate_temperature(497_612, 1.5, &calib.temp);

        assert_close(plain.t_fine - shifted.t_fine, 7680.0, 0.1);
        assert_close(shifted.celsius, 22.880, 0.001);

        // humidity follows the corrected temperature
        let hum = compensate_humidity(25_000, shifted.t_fine, &calib.hum);
        assert_close(hum, 70.925, 0.01);
    }

    #[test]
    fn pressure_from_reference_trace() {
        let calib = fixtures::calibration();
        let temp = compensate_temperature(497_612, 0.0, &calib.temp);

        assert_close(compensate_pressure(350_000, temp.t_fine, &calib.press), 100_387.56, 2.0);
        assert_close(compensate_pressure(400_000, temp.t_fine, &calib.press), 91_837.13, 2.0);
    }

    #[test]
    fn pressure_with_zero_divisor_is_zero() {
        let mut calib = fixtures::calibration();
        calib.press.par_p1 = 0;
        let temp = compensate_temperature(497_612, 0.0, &calib.temp);

        let pressure = compensate_pressure(350_000, temp.t_fine, &calib.press);
        assert_eq!(pressure, 0.0);
        assert!(!pressure.is_nan());
    }

    #[test]
    fn humidity_is_clamped() {
        let calib = fixtures::calibration();
        let temp = compensate_temperature(497_612, 0.0, &calib.temp);

        assert_close(compensate_humidity(20_000, temp.t_fine, &calib.hum), 39.040, 0.01);
        assert_close(compensate_humidity(25_000, temp.t_fine, &calib.hum), 71.172, 0.01);
        assert_eq!(compensate_humidity(0, temp.t_fine, &calib.hum), 0.0);
        assert_eq!(compensate_humidity(30_000, temp.t_fine, &calib.hum), 100.0);
        assert_eq!(compensate_humidity(u16::MAX, temp.t_fine, &calib.hum), 100.0);
    }

    #[test]
    fn humidity_subtracts_h3_term() {
        let mut calib = fixtures::calibration();
        calib.hum.par_h3 = 100;
        let temp = compensate_temperature(497_612, 0.0, &calib.temp);

        // par_h3 / 2 * T lowers the effective raw code
        assert_close(compensate_humidity(20_000, temp.t_fine, &calib.hum), 32.031, 0.01);
        assert_close(compensate_humidity(25_000, temp.t_fine, &calib.hum), 62.838, 0.01);
    }

    #[test]
    fn gas_resistance_scales_with_range() {
        assert_close(compensate_gas(512, 0), 64_000_000.0, 1.0);
        assert_close(compensate_gas(600, 5), 1_878_899.1, 1.0);
        assert_close(compensate_gas(1023, 15), 1_421.2116, 0.01);
        // lowest code still has a positive divisor
        assert_close(compensate_gas(0, 0), 102_400_000.0, 10.0);
    }

    #[test]
    fn measure_duration_grows_with_oversampling() {
        let off = OversamplingConfig::new(
            Oversampling::Skipped,
            Oversampling::Skipped,
            Oversampling::Skipped,
        );
        let x1 = OversamplingConfig::new(Oversampling::X1, Oversampling::X1, Oversampling::X1);
        let x16 = OversamplingConfig::new(Oversampling::X16, Oversampling::X16, Oversampling::X16);

        assert_eq!(measure_duration_us(&off), 5293);
        assert_eq!(measure_duration_us(&x1), 5293 + 3 * 1963);
        assert_eq!(measure_duration_us(&x16), 5293 + 48 * 1963);
    }

    #[test]
    fn compensate_skips_disabled_channels() {
        let calib = fixtures::calibration();
        let raw = decode_field(&fixtures::FIELD);

        let all = OversamplingConfig::new(Oversampling::X1, Oversampling::X1, Oversampling::X1);
        let full = compensate(&raw, &calib, &all, true, 0.0);
        assert!(full.temperature.is_some());
        assert!(full.pressure.is_some());
        assert!(full.humidity.is_some());
        assert!(full.gas_resistance.is_some());
        assert!(full.gas_valid && full.heat_stable);

        let no_hum =
            OversamplingConfig::new(Oversampling::X1, Oversampling::X1, Oversampling::Skipped);
        let partial = compensate(&raw, &calib, &no_hum, false, 0.0);
        assert!(partial.humidity.is_none());
        assert!(partial.gas_resistance.is_none());
        assert_eq!(partial.pressure, full.pressure);

        let no_temp =
            OversamplingConfig::new(Oversampling::Skipped, Oversampling::X1, Oversampling::X1);
        let orphaned = compensate(&raw, &calib, &no_temp, true, 0.0);
        assert!(orphaned.temperature.is_none());
        assert!(orphaned.pressure.is_none());
        assert!(orphaned.humidity.is_none());
        assert!(orphaned.gas_resistance.is_some());
    }
}
