//! Per-range conversion parameters for the charge integrator.

/// Positive full-scale code of the 20-bit converter, `2^19 - 1`.
pub const FULL_SCALE_CODE: f32 = 524_287.0;

/// Number of selectable ranges.
pub const RANGE_COUNT: u8 = 8;

/// Fixed parameters of one measurement range.
///
/// Range 0 is the external-capacitor position; ranges 1-7 select the
/// converter's internal integration capacitors. Calibration factors were
/// determined against a reference source on the assembled board.
pub struct RangeProfile {
    /// Integration capacitance in pC.
    pub cap_pc: f32,
    /// Full-scale input current in amps.
    pub full_scale_a: f32,
    /// Gain correction applied on top of the nominal transfer function.
    pub calibration: f32,
    /// Multiplier taking amps into the display unit.
    pub display_scale: f32,
    /// Label of the display unit.
    pub unit: &'static str,
}

/// The eight fixed profiles, indexed by range number.
pub static RANGES: [RangeProfile; RANGE_COUNT as usize] = [
    RangeProfile {
        cap_pc: 1000.0,
        full_scale_a: 2.0e-6,
        calibration: 1.024,
        display_scale: 1e6,
        unit: "uA",
    },
    RangeProfile {
        cap_pc: 50.0,
        full_scale_a: 1.0e-7,
        calibration: 1.018,
        display_scale: 1e9,
        unit: "nA",
    },
    RangeProfile {
        cap_pc: 100.0,
        full_scale_a: 2.0e-7,
        calibration: 1.021,
        display_scale: 1e9,
        unit: "nA",
    },
    RangeProfile {
        cap_pc: 150.0,
        full_scale_a: 3.0e-7,
        calibration: 1.019,
        display_scale: 1e9,
        unit: "nA",
    },
    RangeProfile {
        cap_pc: 200.0,
        full_scale_a: 4.0e-7,
        calibration: 1.022,
        display_scale: 1e9,
        unit: "nA",
    },
    RangeProfile {
        cap_pc: 250.0,
        full_scale_a: 5.0e-7,
        calibration: 1.020,
        display_scale: 1e9,
        unit: "nA",
    },
    RangeProfile {
        cap_pc: 300.0,
        full_scale_a: 6.0e-7,
        calibration: 1.023,
        display_scale: 1e9,
        unit: "nA",
    },
    RangeProfile {
        cap_pc: 350.0,
        full_scale_a: 7.0e-7,
        calibration: 1.025,
        display_scale: 1e9,
        unit: "nA",
    },
];

impl RangeProfile {
    /// Full-scale current expressed in this range's display unit.
    pub fn full_scale_display(&self) -> f32 {
        self.full_scale_a * self.display_scale
    }
}

/// Look up a profile. Indices past the table yield `None`.
pub fn profile(index: u8) -> Option<&'static RangeProfile> {
    RANGES.get(index as usize)
}

/// Convert a mean raw code into physical current in amps.
pub fn current_amps(mean_raw: f32, profile: &RangeProfile) -> f32 {
    (mean_raw / FULL_SCALE_CODE) * profile.full_scale_a * profile.calibration
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(value: f32, expected: f32, tolerance: f32) {
        assert!(
            (value - expected).abs() <= tolerance,
            "{value} not within {tolerance} of {expected}"
        );
    }

    #[test]
    fn full_scale_mean_hits_calibrated_limit() {
        // Range 1: 100 nA full scale, calibration 1.018 -> ~101.8 nA.
        let amps = current_amps(FULL_SCALE_CODE, &RANGES[1]);
        assert_close(amps, 1.018e-7, 1e-12);
    }

    #[test]
    fn zero_mean_is_zero_current() {
        for range in &RANGES {
            assert_eq!(current_amps(0.0, range), 0.0);
        }
    }

    #[test]
    fn negative_mean_yields_negative_current() {
        let amps = current_amps(-FULL_SCALE_CODE, &RANGES[2]);
        assert_close(amps, -2.042e-7, 1e-11);
    }

    #[test]
    fn lookup_rejects_out_of_table_indices() {
        assert!(profile(7).is_some());
        assert!(profile(8).is_none());
        assert!(profile(u8::MAX).is_none());
    }

    #[test]
    fn display_scaling_matches_unit_labels() {
        assert_close(RANGES[0].full_scale_display(), 2.0, 1e-4);
        assert_eq!(RANGES[0].unit, "uA");
        assert_close(RANGES[1].full_scale_display(), 100.0, 1e-3);
        assert_eq!(RANGES[1].unit, "nA");
    }
}
