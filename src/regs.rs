//! BME688 register map.
//!
//! Addresses, lengths and bit positions as laid out in the BME688 datasheet
//! (section 5.3, "Memory map"). Only the subset used for forced-mode
//! operation with heater profile 0 is listed.

/// Default I2C address (SDO tied to GND).
pub const ADDR_PRIMARY: u8 = 0x76;
/// Alternate I2C address (SDO tied to VDDIO).
pub const ADDR_SECONDARY: u8 = 0x77;

// --- Identity & reset ---

pub const ADDR_SOFT_RESET: u8 = 0xE0;
pub const CMD_SOFT_RESET: u8 = 0xB6;
pub const ADDR_CHIP_ID: u8 = 0xD0;
pub const CHIP_ID: u8 = 0x61;
pub const ADDR_VARIANT_ID: u8 = 0xF0;
/// Variant id reported by the BME688 (the BME680 reports 0x00).
pub const VARIANT_ID_BME688: u8 = 0x01;

// --- Control registers ---

pub const ADDR_CTRL_GAS_0: u8 = 0x70;
pub const ADDR_CTRL_GAS_1: u8 = 0x71;
pub const ADDR_CTRL_HUM: u8 = 0x72;
pub const ADDR_CTRL_MEAS: u8 = 0x74;

// --- Heater profile 0 ---

pub const ADDR_RES_HEAT_0: u8 = 0x5A;
pub const ADDR_GAS_WAIT_0: u8 = 0x64;

// --- Calibration groups ---

pub const ADDR_CALIB_GROUP_1: u8 = 0x8A;
pub const LEN_CALIB_GROUP_1: usize = 23;
pub const ADDR_CALIB_GROUP_2: u8 = 0xE1;
pub const LEN_CALIB_GROUP_2: usize = 14;
pub const ADDR_CALIB_GROUP_3: u8 = 0x00;
pub const LEN_CALIB_GROUP_3: usize = 5;

// --- Measurement data (field 0) ---

/// First register of field 0 (`meas_status_0`).
pub const ADDR_FIELD_0: u8 = 0x1D;
/// Burst length from `meas_status_0` up to and including `gas_r_lsb`.
pub const LEN_FIELD_0: usize = 17;

// --- Masks & positions ---

pub const MODE_MSK: u8 = 0x03;
pub const MODE_SLEEP: u8 = 0b00;
pub const MODE_FORCED: u8 = 0b01;

pub const OSRS_MSK: u8 = 0x07;
pub const OSRS_T_POS: u8 = 5;
pub const OSRS_P_POS: u8 = 2;
pub const OSRS_H_POS: u8 = 0;

pub const HEAT_OFF_POS: u8 = 3;
pub const RUN_GAS_POS: u8 = 5;
pub const NB_CONV_MSK: u8 = 0x0F;

pub const NEW_DATA_MSK: u8 = 0x80;
pub const GAS_VALID_MSK: u8 = 0x20;
pub const HEAT_STAB_MSK: u8 = 0x10;
pub const GAS_RANGE_MSK: u8 = 0x0F;

pub const RES_HEAT_RANGE_MSK: u8 = 0x30;
pub const RES_HEAT_RANGE_POS: u8 = 4;
