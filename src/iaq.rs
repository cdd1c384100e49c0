//! Indoor air quality score from a self-calibrating gas baseline.
//!
//! The gas resistance is first normalized for temperature through the
//! saturation vapor density, then compared against a rolling ceiling: the
//! mean of the highest compensated readings seen so far. Clean air sits at
//! the ceiling and scores 0; the score rises towards 500 as the resistance
//! drops below it.

use libm::expf;

/// Capacity of the calibration buffer used by [`IaqTracker`] unless stated otherwise.
pub const DEFAULT_CALIBRATION_SAMPLES: usize = 100;

/// Tuning of the baseline tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IaqConfig {
    /// Ratio between log gas resistance and absolute humidity.
    pub hum_corr_factor: f32,
    /// Number of initial updates discarded while the hot plate settles.
    pub burn_in_cycles: u32,
    /// Updates after which a reading is pushed into the baseline even if it
    /// does not exceed the current ceiling.
    pub refresh_period: u32,
}

impl Default for IaqConfig {
    fn default() -> Self {
        Self {
            hum_corr_factor: 0.827,
            burn_in_cycles: 300,
            refresh_period: 3600,
        }
    }
}

/// Air quality band of a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IaqLevel {
    /// 0 to 50.
    Excellent,
    /// 51 to 100.
    Good,
    /// 101 to 150.
    Moderate,
    /// 151 to 200.
    Poor,
    /// 201 to 300.
    VeryPoor,
    /// Above 300.
    Hazardous,
}

impl IaqLevel {
    pub fn from_score(score: f32) -> Self {
        // saturating cast: NaN and negatives land on 0
        match score as u32 {
            0..=50 => Self::Excellent,
            51..=100 => Self::Good,
            101..=150 => Self::Moderate,
            151..=200 => Self::Poor,
            201..=300 => Self::VeryPoor,
            _ => Self::Hazardous,
        }
    }
}

/// Saturation vapor density in kg/m³ at `temp` °C (Magnus formula).
pub fn saturation_vapor_density(temp: f32) -> f32 {
    1.3237 * expf((17.625 * temp) / (temp + 243.04)) / (temp + 273.15)
}

/// Gas resistance normalized for the humidity the air can hold at `temp`.
pub fn compensated_gas(gas_resistance: f32, temp: f32, hum_corr_factor: f32) -> f32 {
    gas_resistance * expf(saturation_vapor_density(temp) * hum_corr_factor)
}

/// Fixed-capacity ring of calibration samples.
///
/// `count` grows until it reaches `N`; from then on the ring is complete and
/// new samples overwrite the oldest one.
#[derive(Debug, Clone)]
pub struct CalibrationRing<const N: usize> {
    samples: [f32; N],
    cursor: usize,
    count: usize,
}

impl<const N: usize> Default for CalibrationRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> CalibrationRing<N> {
    pub const fn new() -> Self {
        Self {
            samples: [0.0; N],
            cursor: 0,
            count: 0,
        }
    }

    pub fn push(&mut self, sample: f32) {
        if N == 0 {
            return;
        }

        self.samples[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % N;
        if self.count < N {
            self.count += 1;
        }
    }

    /// Number of samples stored, at most `N`.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// `true` once every slot holds a sample.
    pub fn is_complete(&self) -> bool {
        N > 0 && self.count == N
    }

    /// Arithmetic mean of the stored samples, 0 when empty.
    pub fn mean(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }

        // slots are filled from 0 until the first wrap
        let sum: f32 = self.samples[..self.count].iter().sum();
        sum / self.count as f32
    }
}

/// Turns a stream of (temperature, humidity, gas resistance) readings into
/// an IAQ score.
///
/// Meant to be fed once per acquisition cycle by a single owner.
#[derive(Debug, Clone)]
pub struct IaqTracker<const N: usize = DEFAULT_CALIBRATION_SAMPLES> {
    config: IaqConfig,
    burn_in_remaining: u32,
    refresh_counter: u32,
    ceiling: f32,
    ring: CalibrationRing<N>,
}

impl<const N: usize> Default for IaqTracker<N> {
    fn default() -> Self {
        Self::new(IaqConfig::default())
    }
}

impl<const N: usize> IaqTracker<N> {
    pub fn new(config: IaqConfig) -> Self {
        Self {
            config,
            burn_in_remaining: config.burn_in_cycles,
            refresh_counter: 0,
            ceiling: 0.0,
            ring: CalibrationRing::new(),
        }
    }

    /// Feeds one reading.
    ///
    /// Returns `None` during burn-in and the score in `[0, 500]` afterwards.
    /// `humidity` is part of the reading but the normalization only depends
    /// on temperature.
    pub fn update(&mut self, temperature: f32, _humidity: f32, gas_resistance: f32) -> Option<f32> {
        let comp_gas = compensated_gas(gas_resistance, temperature, self.config.hum_corr_factor);

        if self.burn_in_remaining > 0 {
            self.burn_in_remaining -= 1;
            if self.burn_in_remaining == 0 {
                self.ring.push(comp_gas);
                self.ceiling = comp_gas;
                log_info!("IAQ burn-in complete, initial ceiling {}", comp_gas);
            }
            return None;
        }

        self.refresh_counter += 1;
        let refresh = self.refresh_counter >= self.config.refresh_period;

        if refresh || comp_gas > self.ceiling {
            if refresh {
                self.refresh_counter = 0;
            }
            self.ring.push(comp_gas);
            self.ceiling = self.ring.mean();
        }

        let ratio = comp_gas / self.ceiling;
        let score = (1.0 - ratio * ratio) * 500.0;

        // NaN from an empty baseline fails the comparison
        Some(if score > 0.0 { score } else { 0.0 })
    }

    /// Current baseline, 0 before burn-in completes.
    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    pub fn is_burned_in(&self) -> bool {
        self.burn_in_remaining == 0
    }

    pub fn calibration(&self) -> &CalibrationRing<N> {
        &self.ring
    }

    pub fn config(&self) -> &IaqConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: f32 = 25.0;
    const H: f32 = 40.0;

    fn config(burn_in_cycles: u32, refresh_period: u32) -> IaqConfig {
        IaqConfig {
            burn_in_cycles,
            refresh_period,
            ..IaqConfig::default()
        }
    }

    fn assert_close(actual: f32, expected: f32, tolerance: f32) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected} ± {tolerance}, got {actual}"
        );
    }

    #[test]
    fn vapor_density_at_room_temperature() {
        assert_close(saturation_vapor_density(25.0), 0.022_976, 1e-5);
        assert_close(compensated_gas(100_000.0, 25.0, 0.827), 101_918.3, 1.0);
    }

    #[test]
    fn burn_in_suppresses_scores() {
        let mut tracker: IaqTracker = IaqTracker::new(config(3, 3600));

        assert_eq!(tracker.update(T, H, 50_000.0), None);
        assert_eq!(tracker.update(T, H, 50_000.0), None);
        assert!(!tracker.is_burned_in());
        assert_eq!(tracker.update(T, H, 50_000.0), None);
        assert!(tracker.is_burned_in());
        assert_eq!(tracker.calibration().len(), 1);

        let score = tracker.update(T, H, 50_000.0);
        assert_eq!(score, Some(0.0));
    }

    #[test]
    fn lower_resistance_scores_higher() {
        let mut tracker: IaqTracker = IaqTracker::new(config(1, 3600));
        tracker.update(T, H, 100_000.0);
        let ceiling = tracker.ceiling();

        let clean = tracker.update(T, H, 100_000.0).unwrap();
        let dirty = tracker.update(T, H, 50_000.0).unwrap();
        let awful = tracker.update(T, H, 10_000.0).unwrap();

        assert_eq!(tracker.ceiling(), ceiling);
        assert_eq!(clean, 0.0);
        assert_close(dirty, 375.0, 0.01);
        assert!(awful > dirty && awful <= 500.0);
        assert_eq!(IaqLevel::from_score(dirty), IaqLevel::Hazardous);
    }

    #[test]
    fn higher_reading_raises_ceiling_to_mean() {
        let mut tracker: IaqTracker = IaqTracker::new(config(1, 3600));
        tracker.update(T, H, 100_000.0);
        let first = tracker.ceiling();

        let score = tracker.update(T, H, 200_000.0).unwrap();
        let second = compensated_gas(200_000.0, T, 0.827);

        assert_eq!(tracker.calibration().len(), 2);
        assert_close(tracker.ceiling(), (first + second) / 2.0, 0.5);
        // above the new mean: clamped at 0
        assert_eq!(score, 0.0);
    }

    #[test]
    fn refresh_pushes_low_readings() {
        let mut tracker: IaqTracker = IaqTracker::new(config(1, 3));
        tracker.update(T, H, 100_000.0);

        tracker.update(T, H, 50_000.0);
        tracker.update(T, H, 50_000.0);
        assert_eq!(tracker.calibration().len(), 1);

        // third steady-state call hits the refresh period
        tracker.update(T, H, 50_000.0);
        assert_eq!(tracker.calibration().len(), 2);
        let expected =
            (compensated_gas(100_000.0, T, 0.827) + compensated_gas(50_000.0, T, 0.827)) / 2.0;
        assert_close(tracker.ceiling(), expected, 0.5);
    }

    #[test]
    fn ring_completes_and_wraps() {
        let mut ring = CalibrationRing::<4>::new();
        assert!(ring.is_empty());
        assert_eq!(ring.mean(), 0.0);

        for sample in [1.0, 2.0, 3.0] {
            ring.push(sample);
        }
        assert!(!ring.is_complete());
        assert_eq!(ring.mean(), 2.0);

        ring.push(4.0);
        assert!(ring.is_complete());
        assert_eq!(ring.mean(), 2.5);

        // overwrites the 1.0
        ring.push(9.0);
        assert!(ring.is_complete());
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.mean(), 4.5);
    }

    #[test]
    fn zero_burn_in_starts_from_empty_baseline() {
        let mut tracker: IaqTracker<8> = IaqTracker::new(config(0, 3600));

        assert!(tracker.is_burned_in());
        assert_eq!(tracker.update(T, H, 80_000.0), Some(0.0));
        assert_eq!(tracker.calibration().len(), 1);
    }

    #[test]
    fn score_bands() {
        assert_eq!(IaqLevel::from_score(0.0), IaqLevel::Excellent);
        assert_eq!(IaqLevel::from_score(50.9), IaqLevel::Excellent);
        assert_eq!(IaqLevel::from_score(51.0), IaqLevel::Good);
        assert_eq!(IaqLevel::from_score(150.0), IaqLevel::Moderate);
        assert_eq!(IaqLevel::from_score(200.0), IaqLevel::Poor);
        assert_eq!(IaqLevel::from_score(300.0), IaqLevel::VeryPoor);
        assert_eq!(IaqLevel::from_score(301.0), IaqLevel::Hazardous);
        assert_eq!(IaqLevel::from_score(f32::NAN), IaqLevel::Excellent);
    }
}
