//! Heater encoder.
//!
//! Converts a plate temperature and a heating duration into the two bytes of
//! heater profile 0: `res_heat_0` (0x5A) and `gas_wait_0` (0x64).

use crate::codec::GasCalib;
use crate::settings::HeaterConfig;
use crate::{Celsius, Milliseconds};

/// Longest heating duration `gas_wait` can express, in ms (63 * 4^3 = 4032).
pub const MAX_GAS_WAIT_MS: u16 = 0xFC0;

/// Saturated `gas_wait` code.
const GAS_WAIT_SATURATED: u8 = 0xFF;
const GAS_WAIT_MANTISSA_MSK: u8 = 0x3F;
const GAS_WAIT_FACTOR_POS: u8 = 6;

/// Heater resistance code.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResHeat {
    /// Value written to `res_heat_0`.
    pub code: u8,
    /// The computed value fell outside `0..=255` and was saturated.
    pub clamped: bool,
}

/// Both register bytes of a heater profile.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeaterCodes {
    pub res_heat: ResHeat,
    pub gas_wait: u8,
}

/// Computes the heater resistance code for a target plate temperature.
///
/// Targets outside the range the heater can reach produce a saturated code
/// with `clamped` set rather than a wrapped byte.
pub fn calc_res_heat(target: Celsius, ambient: Celsius, calib: &GasCalib) -> ResHeat {
    let var1 = ((calib.par_g1 as f32 / 16.0) + 49.0)
        * (1.0 + (((calib.par_g2 as f32 / 32768.0) * 0.0005) + 0.00235) * target.0);
    let var2 = var1 + (calib.par_g3 as f32 / 1024.0) * ambient.0;
    let var3 = 4.0 / (4.0 + calib.res_heat_range as f32);
    let var4 = 1.0 / (1.0 + calib.res_heat_val as f32 * 0.002);

    let res_heat = 3.4 * ((var2 * var3 * var4) - 25.0);

    if res_heat >= 0.0 && res_heat <= 255.0 {
        ResHeat {
            code: res_heat as u8,
            clamped: false,
        }
    } else {
        let code = if res_heat > 255.0 { u8::MAX } else { 0 };
        log_warn!(
            "heater code for {} C out of range, clamped to {}",
            target.0,
            code
        );
        ResHeat {
            code,
            clamped: true,
        }
    }
}

/// Encodes a heating duration as a 6-bit mantissa and a power-of-4 factor.
///
/// The encoding is lossy: the decoded duration never exceeds the request and
/// is within one step of the chosen factor below it. Durations of
/// [`MAX_GAS_WAIT_MS`] or more saturate to `0xFF`.
pub fn calc_gas_wait(duration: Milliseconds) -> u8 {
    if duration.0 >= MAX_GAS_WAIT_MS {
        return GAS_WAIT_SATURATED;
    }

    let mut mantissa = duration.0;
    let mut factor: u8 = 0;
    while mantissa > GAS_WAIT_MANTISSA_MSK as u16 {
        mantissa /= 4;
        factor += 1;
    }

    mantissa as u8 + (factor << GAS_WAIT_FACTOR_POS)
}

/// Duration in ms represented by a `gas_wait` code.
pub fn decode_gas_wait(code: u8) -> u32 {
    let mantissa = (code & GAS_WAIT_MANTISSA_MSK) as u32;
    let factor = (code >> GAS_WAIT_FACTOR_POS) as u32;

    mantissa << (2 * factor)
}

/// Encodes a heater configuration into its two register bytes.
pub fn encode(heater: &HeaterConfig, ambient: Celsius, calib: &GasCalib) -> HeaterCodes {
    HeaterCodes {
        res_heat: calc_res_heat(heater.target_temp, ambient, calib),
        gas_wait: calc_gas_wait(heater.duration),
    }
}
