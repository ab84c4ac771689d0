//! Foreground bookkeeping: averaging, range selection, and advisories.

use crate::acquire::{Frame, FRAME_LEN};
use crate::buffer::{SampleBuffer, MIN_SAMPLES_FOR_MEAN};
use crate::range::{self, RangeProfile, RANGES};
use crate::store::Capture;

/// Accepted samples between raw-frame diagnostic lines.
pub const FRAME_TRACE_INTERVAL: u32 = 50;

/// Consecutive identical codes per stagnation advisory.
pub const STAGNATION_INTERVAL: u32 = 50;

/// Advisory conditions noticed while recording samples.
///
/// Purely informational; none of them alters acquisition state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Advisory {
    /// The raw code has not changed across `run` consecutive samples,
    /// which usually means a wedged bus or a floating input.
    Stagnant {
        /// Length of the identical run so far.
        run: u32,
    },
}

/// A calibrated reading ready for presentation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Reading {
    /// Physical current in amps.
    pub amps: f32,
    /// Number of samples behind the mean.
    pub samples: usize,
}

/// Aggregates drained captures and derives calibrated output.
pub struct Meter {
    /// Moving-average window over raw codes.
    buffer: SampleBuffer,
    /// Active range index, always within the table.
    range: u8,
    /// Accepted samples since boot.
    total_samples: u32,
    /// Last accepted raw code, for stagnation detection.
    last_raw: Option<i32>,
    /// Current run of identical raw codes.
    stagnant_run: u32,
    /// Last accepted frame, kept for the periodic diagnostic line.
    last_frame: Frame,
}

impl Meter {
    /// Start on range 0 with an empty buffer.
    pub const fn new() -> Self {
        Self {
            buffer: SampleBuffer::new(),
            range: 0,
            total_samples: 0,
            last_raw: None,
            stagnant_run: 0,
            last_frame: Frame::new([0; FRAME_LEN]),
        }
    }

    /// Record one drained capture, returning any advisory it raised.
    pub fn record(&mut self, capture: Capture) -> Option<Advisory> {
        self.total_samples = self.total_samples.wrapping_add(1);

        if self.last_raw == Some(capture.raw) {
            self.stagnant_run += 1;
        } else {
            self.stagnant_run = 0;
        }
        self.last_raw = Some(capture.raw);

        self.buffer.push(capture.raw);
        self.last_frame = capture.frame;

        if self.stagnant_run > 0 && self.stagnant_run % STAGNATION_INTERVAL == 0 {
            return Some(Advisory::Stagnant {
                run: self.stagnant_run,
            });
        }
        None
    }

    /// Switch the active range, clearing the averaging window.
    ///
    /// Indices past the table are ignored: no range change, no reset.
    pub fn select_range(&mut self, index: u8) -> Option<&'static RangeProfile> {
        let profile = range::profile(index)?;
        self.range = index;
        self.buffer.reset();
        Some(profile)
    }

    /// Clear the averaging window, keeping the active range.
    pub fn reset_average(&mut self) {
        self.buffer.reset();
    }

    /// Calibrated reading, once enough samples have accumulated.
    pub fn reading(&self) -> Option<Reading> {
        if self.buffer.len() < MIN_SAMPLES_FOR_MEAN {
            return None;
        }
        Some(Reading {
            amps: range::current_amps(self.buffer.mean(), self.profile()),
            samples: self.buffer.len(),
        })
    }

    /// The active range's parameters.
    pub fn profile(&self) -> &'static RangeProfile {
        &RANGES[self.range as usize]
    }

    /// The active range index.
    pub fn range_index(&self) -> u8 {
        self.range
    }

    /// Accepted samples since boot.
    pub fn total_samples(&self) -> u32 {
        self.total_samples
    }

    /// The averaging window, for fill reporting.
    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    /// The most recently accepted frame.
    pub fn last_frame(&self) -> &Frame {
        &self.last_frame
    }

    /// Whether the periodic raw-frame diagnostic is due this sample.
    pub fn frame_trace_due(&self) -> bool {
        self.total_samples > 0 && self.total_samples % FRAME_TRACE_INTERVAL == 0
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(raw: i32) -> Capture {
        Capture {
            raw,
            frame: Frame::new([0, 0, 0, 0, raw as u8]),
        }
    }

    #[test]
    fn out_of_table_range_is_ignored() {
        let mut meter = Meter::new();
        meter.select_range(3);
        for i in 0..5 {
            meter.record(capture(i));
        }

        assert!(meter.select_range(8).is_none());
        assert_eq!(meter.range_index(), 3);
        assert_eq!(meter.buffer().len(), 5);
    }

    #[test]
    fn valid_range_switch_clears_the_window() {
        let mut meter = Meter::new();
        for i in 0..10 {
            meter.record(capture(i));
        }

        let profile = meter.select_range(2).expect("range 2 exists");
        assert_eq!(profile.unit, "nA");
        assert_eq!(meter.range_index(), 2);
        assert_eq!(meter.buffer().len(), 0);
        assert!(!meter.buffer().is_full());
    }

    #[test]
    fn reading_requires_the_sample_threshold() {
        let mut meter = Meter::new();
        for i in 0..MIN_SAMPLES_FOR_MEAN - 1 {
            meter.record(capture(i as i32));
        }
        assert_eq!(meter.reading(), None);

        meter.record(capture(7));
        let reading = meter.reading().expect("threshold met");
        assert_eq!(reading.samples, MIN_SAMPLES_FOR_MEAN);
    }

    #[test]
    fn reset_average_keeps_the_range() {
        let mut meter = Meter::new();
        meter.select_range(5);
        for i in 0..10 {
            meter.record(capture(i));
        }

        meter.reset_average();
        assert_eq!(meter.range_index(), 5);
        assert_eq!(meter.buffer().len(), 0);
    }

    #[test]
    fn stagnation_advisory_fires_on_the_run_boundary() {
        let mut meter = Meter::new();
        assert_eq!(meter.record(capture(123)), None);

        // 49 repeats stay quiet, the 50th raises the advisory.
        for _ in 0..STAGNATION_INTERVAL - 1 {
            assert_eq!(meter.record(capture(123)), None);
        }
        assert_eq!(
            meter.record(capture(123)),
            Some(Advisory::Stagnant {
                run: STAGNATION_INTERVAL
            })
        );

        // A changed code clears the run.
        assert_eq!(meter.record(capture(124)), None);
        assert_eq!(meter.record(capture(124)), None);
    }

    #[test]
    fn frame_trace_cadence_follows_total_samples() {
        let mut meter = Meter::new();
        for i in 1..=FRAME_TRACE_INTERVAL {
            meter.record(capture(i as i32));
            assert_eq!(meter.frame_trace_due(), i == FRAME_TRACE_INTERVAL);
        }
        assert_eq!(meter.total_samples(), FRAME_TRACE_INTERVAL);
    }
}
