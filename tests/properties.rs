use bme688_iaq::calc::{compensate_humidity, measure_duration_us};
use bme688_iaq::codec::HumCalib;
use bme688_iaq::heater::{calc_gas_wait, decode_gas_wait, MAX_GAS_WAIT_MS};
use bme688_iaq::iaq::{IaqConfig, IaqTracker};
use bme688_iaq::{Milliseconds, Oversampling, OversamplingConfig};
use proptest::prelude::*;

fn oversampling() -> impl Strategy<Value = Oversampling> {
    (0u8..6).prop_map(Oversampling::from_u8)
}

fn oversampling_config() -> impl Strategy<Value = OversamplingConfig> {
    (oversampling(), oversampling(), oversampling())
        .prop_map(|(t, p, h)| OversamplingConfig::new(t, p, h))
}

prop_compose! {
    fn hum_calib()(
        par_h1 in 0u16..4096,
        par_h2 in 0u16..4096,
        par_h3 in any::<i8>(),
        par_h4 in any::<i8>(),
        par_h5 in any::<i8>(),
        par_h6 in any::<u8>(),
        par_h7 in any::<i8>(),
    ) -> HumCalib {
        HumCalib { par_h1, par_h2, par_h3, par_h4, par_h5, par_h6, par_h7 }
    }
}

proptest! {
    #[test]
    fn measure_duration_is_monotonic(a in oversampling_config(), b in oversampling_config()) {
        let (short, long) = if a.total_cycles() <= b.total_cycles() { (a, b) } else { (b, a) };

        prop_assert!(measure_duration_us(&short) <= measure_duration_us(&long));
        prop_assert!(measure_duration_us(&short) > 0);
    }

    #[test]
    fn gas_wait_never_overpromises(ms in any::<u16>()) {
        let code = calc_gas_wait(Milliseconds(ms));
        let decoded = decode_gas_wait(code);

        prop_assert!(decoded <= ms as u32);

        if ms < MAX_GAS_WAIT_MS {
            // one step of the selected power-of-4 factor
            let step = 1u32 << (2 * (code >> 6) as u32);
            prop_assert!(ms as u32 - decoded < step);
        } else {
            prop_assert_eq!(code, 0xFF);
        }
    }

    #[test]
    fn humidity_stays_in_range(
        hum_adc in any::<u16>(),
        temperature in -40.0f32..85.0,
        calib in hum_calib(),
    ) {
        let humidity = compensate_humidity(hum_adc, temperature * 5120.0, &calib);

        prop_assert!((0.0..=100.0).contains(&humidity));
    }

    #[test]
    fn iaq_constant_stream_is_stable(
        burn_in in 0u32..20,
        refresh_period in 1u32..6,
        gas in 1_000.0f32..1_000_000.0,
        temperature in -10.0f32..40.0,
    ) {
        let config = IaqConfig { burn_in_cycles: burn_in, refresh_period, ..IaqConfig::default() };
        let mut tracker: IaqTracker<8> = IaqTracker::new(config);

        let scores: Vec<f32> = (0..burn_in + 40)
            .filter_map(|_| tracker.update(temperature, 50.0, gas))
            .collect();

        prop_assert_eq!(scores.len(), 40);
        for score in &scores {
            prop_assert!(*score < 0.01, "score {} for a reading at the ceiling", score);
        }
    }

    #[test]
    fn iaq_settles_after_buffer_fills(
        high in 100_000.0f32..1_000_000.0,
        ratio in 0.1f32..0.9,
        refresh_period in 1u32..4,
    ) {
        let low = high * ratio;
        let config = IaqConfig { burn_in_cycles: 1, refresh_period, ..IaqConfig::default() };
        let mut tracker: IaqTracker<8> = IaqTracker::new(config);
        let mut replay: IaqTracker<8> = IaqTracker::new(config);

        tracker.update(25.0, 50.0, high);
        replay.update(25.0, 50.0, high);

        // enough refreshes to overwrite every slot with the low reading
        let settle = 8 * refresh_period + 1;
        for _ in 0..settle {
            tracker.update(25.0, 50.0, low);
            replay.update(25.0, 50.0, low);
        }
        prop_assert!(tracker.calibration().is_complete());

        let settled: Vec<f32> = (0..3 * refresh_period)
            .filter_map(|_| tracker.update(25.0, 50.0, low))
            .collect();
        let replayed: Vec<f32> = (0..3 * refresh_period)
            .filter_map(|_| replay.update(25.0, 50.0, low))
            .collect();

        prop_assert_eq!(&settled, &replayed);
        for pair in settled.windows(2) {
            prop_assert!((pair[0] - pair[1]).abs() < 0.01);
        }
    }
}
