//! Register codec.
//!
//! Turns the byte buffers delivered by the bus into typed values and builds
//! the control register bytes written back. Everything here is pure; the
//! driver in `lib.rs` does the I/O.
//!
//! Calibration layout follows the BME688 datasheet, section 5.3.3
//! ("Calibration data"). Signed coefficients are reinterpreted through the
//! native `i8`/`i16` types, never by manual sign correction.

use crate::regs;
use crate::settings::{Oversampling, OversamplingConfig};

/// Temperature compensation coefficients.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TempCalib {
    pub par_t1: u16,
    pub par_t2: i16,
    pub par_t3: i8,
}

/// Pressure compensation coefficients.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PressCalib {
    pub par_p1: u16,
    pub par_p2: i16,
    pub par_p3: i8,
    pub par_p4: i16,
    pub par_p5: i16,
    pub par_p6: i8,
    pub par_p7: i8,
    pub par_p8: i16,
    pub par_p9: i16,
    pub par_p10: u8,
}

/// Humidity compensation coefficients.
///
/// `par_h1` and `par_h2` are 12-bit values that share their low nibbles in
/// one register (0xE2).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HumCalib {
    pub par_h1: u16,
    pub par_h2: u16,
    pub par_h3: i8,
    pub par_h4: i8,
    pub par_h5: i8,
    pub par_h6: u8,
    pub par_h7: i8,
}

/// Gas heater coefficients.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GasCalib {
    pub par_g1: i8,
    pub par_g2: i16,
    pub par_g3: i8,
    /// Heater resistance range, 2 bits.
    pub res_heat_range: u8,
    /// Heater resistance correction factor.
    pub res_heat_val: i8,
}

/// Factory-fused calibration coefficients, unique to every chip.
///
/// Read once at initialization and never mutated afterwards. The temperature
/// intermediate `t_fine` is not stored here: it is returned by
/// [`crate::calc::compensate_temperature`] and handed explicitly to the
/// pressure and humidity compensation of the same sample.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationSet {
    pub temp: TempCalib,
    pub press: PressCalib,
    pub hum: HumCalib,
    pub gas: GasCalib,
}

// Byte offsets inside group 1 (0x8A..=0xA0).
const T2_LSB: usize = 0;
const T3: usize = 2;
const P1_LSB: usize = 4;
const P2_LSB: usize = 6;
const P3: usize = 8;
const P4_LSB: usize = 10;
const P5_LSB: usize = 12;
const P7: usize = 14;
const P6: usize = 15;
const P8_LSB: usize = 18;
const P9_LSB: usize = 20;
const P10: usize = 22;

// Byte offsets inside group 2 (0xE1..=0xEE).
const H2_MSB: usize = 0;
const H1_H2_LSB: usize = 1;
const H1_MSB: usize = 2;
const H3: usize = 3;
const H4: usize = 4;
const H5: usize = 5;
const H6: usize = 6;
const H7: usize = 7;
const T1_LSB: usize = 8;
const G2_LSB: usize = 10;
const G1: usize = 12;
const G3: usize = 13;

// Byte offsets inside group 3 (0x00..=0x04).
const RES_HEAT_VAL: usize = 0;
const RES_HEAT_RANGE: usize = 2;

fn le_u16(buf: &[u8], lsb: usize) -> u16 {
    u16::from_le_bytes([buf[lsb], buf[lsb + 1]])
}

fn le_i16(buf: &[u8], lsb: usize) -> i16 {
    i16::from_le_bytes([buf[lsb], buf[lsb + 1]])
}

/// Assembles the calibration set from the three register groups.
pub fn parse_calibration(
    group1: &[u8; regs::LEN_CALIB_GROUP_1],
    group2: &[u8; regs::LEN_CALIB_GROUP_2],
    group3: &[u8; regs::LEN_CALIB_GROUP_3],
) -> CalibrationSet {
    let temp = TempCalib {
        par_t1: le_u16(group2, T1_LSB),
        par_t2: le_i16(group1, T2_LSB),
        par_t3: group1[T3] as i8,
    };

    let press = PressCalib {
        par_p1: le_u16(group1, P1_LSB),
        par_p2: le_i16(group1, P2_LSB),
        par_p3: group1[P3] as i8,
        par_p4: le_i16(group1, P4_LSB),
        par_p5: le_i16(group1, P5_LSB),
        par_p6: group1[P6] as i8,
        par_p7: group1[P7] as i8,
        par_p8: le_i16(group1, P8_LSB),
        par_p9: le_i16(group1, P9_LSB),
        par_p10: group1[P10],
    };

    // h1 = MSB:low nibble of 0xE2, h2 = MSB:high nibble of 0xE2
    let hum = HumCalib {
        par_h1: ((group2[H1_MSB] as u16) << 4) | (group2[H1_H2_LSB] & 0x0F) as u16,
        par_h2: ((group2[H2_MSB] as u16) << 4) | (group2[H1_H2_LSB] >> 4) as u16,
        par_h3: group2[H3] as i8,
        par_h4: group2[H4] as i8,
        par_h5: group2[H5] as i8,
        par_h6: group2[H6],
        par_h7: group2[H7] as i8,
    };

    let gas = GasCalib {
        par_g1: group2[G1] as i8,
        par_g2: le_i16(group2, G2_LSB),
        par_g3: group2[G3] as i8,
        res_heat_range: (group3[RES_HEAT_RANGE] & regs::RES_HEAT_RANGE_MSK)
            >> regs::RES_HEAT_RANGE_POS,
        res_heat_val: group3[RES_HEAT_VAL] as i8,
    };

    CalibrationSet {
        temp,
        press,
        hum,
        gas,
    }
}

/// Uncompensated ADC codes of one forced-mode cycle.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    /// 20-bit pressure code.
    pub press_adc: u32,
    /// 20-bit temperature code.
    pub temp_adc: u32,
    /// 16-bit humidity code.
    pub hum_adc: u16,
    /// 10-bit gas resistance code.
    pub gas_adc: u16,
    /// Gas measurement sub-range, 4 bits.
    pub gas_range: u8,
    /// The gas conversion completed with a valid result.
    pub gas_valid: bool,
    /// The heater reached its target temperature.
    pub heat_stable: bool,
}

/// Returns `true` if the `new_data_0` flag is set in a field 0 buffer.
pub fn has_new_data(field: &[u8; regs::LEN_FIELD_0]) -> bool {
    field[0] & regs::NEW_DATA_MSK != 0
}

// 20 significant bits in a 24-bit big-endian register triplet.
fn be_u20(msb: u8, lsb: u8, xlsb: u8) -> u32 {
    u32::from_be_bytes([0, msb, lsb, xlsb]) >> 4
}

/// Decodes the burst read of field 0 (starting at `meas_status_0`, 0x1D).
pub fn decode_field(field: &[u8; regs::LEN_FIELD_0]) -> RawSample {
    let gas_lsb = field[16];

    RawSample {
        press_adc: be_u20(field[2], field[3], field[4]),
        temp_adc: be_u20(field[5], field[6], field[7]),
        hum_adc: u16::from_be_bytes([field[8], field[9]]),
        gas_adc: ((field[15] as u16) << 2) | (gas_lsb >> 6) as u16,
        gas_range: gas_lsb & regs::GAS_RANGE_MSK,
        gas_valid: gas_lsb & regs::GAS_VALID_MSK != 0,
        heat_stable: gas_lsb & regs::HEAT_STAB_MSK != 0,
    }
}

/// `ctrl_meas` with the mode bits replaced, other bits preserved.
pub fn ctrl_meas_mode(current: u8, mode: u8) -> u8 {
    (current & !regs::MODE_MSK) | (mode & regs::MODE_MSK)
}

/// `ctrl_meas` with `osrs_t` and `osrs_p` replaced, mode bits preserved.
pub fn ctrl_meas_oversampling(current: u8, osrs: &OversamplingConfig) -> u8 {
    let cleared =
        current & !((regs::OSRS_MSK << regs::OSRS_T_POS) | (regs::OSRS_MSK << regs::OSRS_P_POS));
    cleared
        | ((osrs.temp_osrs as u8) & regs::OSRS_MSK) << regs::OSRS_T_POS
        | ((osrs.pres_osrs as u8) & regs::OSRS_MSK) << regs::OSRS_P_POS
}

/// `ctrl_hum` with `osrs_h` replaced.
pub fn ctrl_hum_oversampling(current: u8, osrs: &OversamplingConfig) -> u8 {
    (current & !(regs::OSRS_MSK << regs::OSRS_H_POS))
        | ((osrs.hum_osrs as u8) & regs::OSRS_MSK) << regs::OSRS_H_POS
}

/// Oversampling settings currently held by `ctrl_hum` and `ctrl_meas`.
pub fn decode_oversampling(ctrl_hum: u8, ctrl_meas: u8) -> OversamplingConfig {
    OversamplingConfig::new(
        Oversampling::from_u8((ctrl_meas >> regs::OSRS_T_POS) & regs::OSRS_MSK),
        Oversampling::from_u8((ctrl_meas >> regs::OSRS_P_POS) & regs::OSRS_MSK),
        Oversampling::from_u8((ctrl_hum >> regs::OSRS_H_POS) & regs::OSRS_MSK),
    )
}

/// `ctrl_gas_0` with `heat_off` set to the inverse of `enabled`.
pub fn ctrl_gas_0(current: u8, enabled: bool) -> u8 {
    (current & !(1 << regs::HEAT_OFF_POS)) | ((!enabled) as u8) << regs::HEAT_OFF_POS
}

/// `ctrl_gas_1` with `run_gas` and the heater profile index (`nb_conv`) replaced.
pub fn ctrl_gas_1(current: u8, enabled: bool, profile: u8) -> u8 {
    (current & !((1 << regs::RUN_GAS_POS) | regs::NB_CONV_MSK))
        | (enabled as u8) << regs::RUN_GAS_POS
        | (profile & regs::NB_CONV_MSK)
}
