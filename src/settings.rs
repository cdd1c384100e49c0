use crate::{Celsius, Milliseconds};

/// Oversampling settings for temperature, pressure and humidity.
///
/// Higher oversampling rates reduce noise by averaging in hardware, at the
/// cost of a longer measurement cycle and higher power per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Oversampling {
    /// No measurement. Disables the channel entirely.
    Skipped = 0,
    /// 1x oversampling.
    #[default]
    X1 = 1,
    /// 2x oversampling.
    X2 = 2,
    /// 4x oversampling.
    X4 = 3,
    /// 8x oversampling.
    X8 = 4,
    /// 16x oversampling. Highest precision, longest duration.
    X16 = 5,
}

impl Oversampling {
    /// All settings, in register-code order.
    pub const ALL: [Oversampling; 6] = [
        Oversampling::Skipped,
        Oversampling::X1,
        Oversampling::X2,
        Oversampling::X4,
        Oversampling::X8,
        Oversampling::X16,
    ];

    /// Builds a setting from its 3-bit register code.
    ///
    /// Codes 6 and 7 are treated as 16x, like the device does.
    pub fn from_u8(value: u8) -> Self {
        match value & 0x07 {
            0 => Oversampling::Skipped,
            1 => Oversampling::X1,
            2 => Oversampling::X2,
            3 => Oversampling::X4,
            4 => Oversampling::X8,
            _ => Oversampling::X16,
        }
    }

    /// Number of conversion cycles this setting costs.
    pub fn cycles(self) -> u32 {
        match self {
            Oversampling::Skipped => 0,
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
            Oversampling::X16 => 16,
        }
    }

    pub fn is_skipped(self) -> bool {
        self == Oversampling::Skipped
    }
}

/// Grouped oversampling configuration for the three TPH channels.
///
/// Use `Oversampling::Skipped` to disable channels your application does not
/// need; a skipped channel is reported as `None` in the measurement.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OversamplingConfig {
    /// Temperature oversampling.
    pub temp_osrs: Oversampling,
    /// Pressure oversampling.
    pub pres_osrs: Oversampling,
    /// Humidity oversampling.
    pub hum_osrs: Oversampling,
}

impl OversamplingConfig {
    pub fn new(temp_osrs: Oversampling, pres_osrs: Oversampling, hum_osrs: Oversampling) -> Self {
        Self {
            temp_osrs,
            pres_osrs,
            hum_osrs,
        }
    }

    /// Returns `true` if all three channels are `Skipped`.
    pub fn is_all_skipped(&self) -> bool {
        self.temp_osrs.is_skipped() && self.hum_osrs.is_skipped() && self.pres_osrs.is_skipped()
    }

    /// Sum of the conversion cycles of all three channels.
    pub fn total_cycles(&self) -> u32 {
        self.temp_osrs.cycles() + self.pres_osrs.cycles() + self.hum_osrs.cycles()
    }
}

/// Heater settings for the gas sensing element (profile 0).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeaterConfig {
    /// Runs the gas measurement. When `false` the heater is switched off and
    /// the measurement carries no gas resistance.
    pub enabled: bool,
    /// Hot plate target temperature, typically 200 to 400 °C.
    pub target_temp: Celsius,
    /// Time the plate is held at temperature before the gas conversion.
    pub duration: Milliseconds,
}

impl Default for HeaterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_temp: Celsius(300.0),
            duration: Milliseconds(100),
        }
    }
}

impl HeaterConfig {
    /// A configuration with the heater switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Timing of the forced-mode poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollConfig {
    /// Number of reads of the status register before giving up.
    pub attempts: u8,
    /// Delay between two reads that did not see the new-data flag.
    pub interval_us: u32,
    /// Added on top of the computed measurement duration before the first read.
    pub settle_margin_us: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval_us: 10_000,
            settle_margin_us: 100_000,
        }
    }
}

/// Complete driver configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Oversampling settings for T, P and H.
    pub osrs_config: OversamplingConfig,
    /// Gas heater settings.
    pub heater: HeaterConfig,
    /// Current ambient temperature estimate.
    /// Only needs to be roughly right; it feeds the heater resistance code.
    pub ambient_temp: Celsius,
    /// Subtracted from every compensated temperature to cancel self-heating.
    /// Humidity and pressure follow since they derive from `t_fine`.
    pub temp_offset: Celsius,
    /// Poll loop timing.
    pub poll: PollConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            osrs_config: OversamplingConfig::new(
                Oversampling::X16,
                Oversampling::X16,
                Oversampling::X16,
            ),
            heater: HeaterConfig::default(),
            ambient_temp: Celsius(25.0),
            temp_offset: Celsius(0.0),
            poll: PollConfig::default(),
        }
    }
}

impl Config {
    pub(crate) fn gas_enabled(&self) -> bool {
        self.heater.enabled
    }
}

/// Fluent builder for a [`Config`].
#[derive(Default)]
pub struct Bme688Builder {
    config: Config,
}

impl Bme688Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the temperature oversampling.
    pub fn temp_oversampling(mut self, os: Oversampling) -> Self {
        self.config.osrs_config.temp_osrs = os;
        self
    }

    /// Sets the humidity oversampling.
    pub fn hum_oversampling(mut self, os: Oversampling) -> Self {
        self.config.osrs_config.hum_osrs = os;
        self
    }

    /// Sets the pressure oversampling.
    pub fn pres_oversampling(mut self, os: Oversampling) -> Self {
        self.config.osrs_config.pres_osrs = os;
        self
    }

    pub fn heater(mut self, heater: HeaterConfig) -> Self {
        self.config.heater = heater;
        self
    }

    /// Sets the initial ambient temperature estimate for the heater calculation.
    pub fn ambient_temp(mut self, temp: Celsius) -> Self {
        self.config.ambient_temp = temp;
        self
    }

    pub fn temp_offset(mut self, offset: Celsius) -> Self {
        self.config.temp_offset = offset;
        self
    }

    /// Overrides the delay between two status polls.
    pub fn poll_interval_us(mut self, us: u32) -> Self {
        self.config.poll.interval_us = us;
        self
    }

    pub fn settle_margin_us(mut self, us: u32) -> Self {
        self.config.poll.settle_margin_us = us;
        self
    }

    /// Finalizes the builder.
    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_codes_round_trip() {
        for os in Oversampling::ALL {
            assert_eq!(Oversampling::from_u8(os as u8), os);
        }
        assert_eq!(Oversampling::from_u8(6), Oversampling::X16);
        assert_eq!(Oversampling::from_u8(7), Oversampling::X16);
    }

    #[test]
    fn cycles_follow_lookup_table() {
        let cycles: [u32; 6] = Oversampling::ALL.map(Oversampling::cycles);
        assert_eq!(cycles, [0, 1, 2, 4, 8, 16]);

        let osrs = OversamplingConfig::new(Oversampling::X1, Oversampling::X4, Oversampling::X16);
        assert_eq!(osrs.total_cycles(), 21);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = Bme688Builder::new()
            .temp_oversampling(Oversampling::X2)
            .hum_oversampling(Oversampling::Skipped)
            .heater(HeaterConfig::disabled())
            .temp_offset(Celsius(1.5))
            .poll_interval_us(0)
            .build();

        assert_eq!(config.osrs_config.temp_osrs, Oversampling::X2);
        assert_eq!(config.osrs_config.pres_osrs, Oversampling::X16);
        assert!(config.osrs_config.hum_osrs.is_skipped());
        assert!(!config.gas_enabled());
        assert_eq!(config.temp_offset, Celsius(1.5));
        assert_eq!(config.poll.interval_us, 0);
        assert_eq!(config.poll.attempts, 5);
    }
}
