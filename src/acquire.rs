
// SPDX-License-Identifier: Apache-2.0

//! Frame capture and decode for the data-valid interrupt path.

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::store::SampleStore;

/// Bytes clocked out of the converter per conversion.
pub const FRAME_LEN: usize = 5;

/// Most negative representable sample code.
pub const SAMPLE_MIN: i32 = -(1 << 19);
/// Most positive representable sample code.
pub const SAMPLE_MAX: i32 = (1 << 19) - 1;

/// Mask selecting the 20-bit channel code within bytes 2-4.
const CODE_MASK: u32 = 0x000F_FFFF;
/// Sign bit of the 20-bit two's-complement code.
const SIGN_BIT: u32 = 0x0008_0000;

/// Settling time between the data-valid edge and the first bus clock,
/// ~1 us at the 125 MHz core clock. A hardware constant, not a tunable.
#[cfg(target_os = "none")]
const SETTLE_CYCLES: u32 = 125;

/// One 5-byte capture as clocked from the converter.
///
/// Bytes 0-1 carry status and the unused channel; bytes 2-4 hold the 20-bit
/// conversion code, most significant byte first, in the low 20 bits of the
/// 24-bit field.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    /// Wrap a raw capture.
    pub const fn new(bytes: [u8; FRAME_LEN]) -> Self {
        Self(bytes)
    }

    /// Extract the conversion code, sign-extended to `i32`.
    pub fn sample(&self) -> i32 {
        let field = u32::from(self.0[2]) << 16 | u32::from(self.0[3]) << 8 | u32::from(self.0[4]);
        let code = field & CODE_MASK;
        if code & SIGN_BIT != 0 {
            (code | !CODE_MASK) as i32
        } else {
            code as i32
        }
    }

    /// The raw frame bytes, for diagnostic output.
    pub fn bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }
}

/// Capture states of the handler.
#[derive(Copy, Clone, PartialEq, Eq)]
enum AcqState {
    /// Waiting for a data-valid edge.
    Idle,
    /// A transfer is in flight; further edges are dropped.
    Busy,
}

/// Runs one fixed-length transfer per data-valid edge and publishes the
/// decoded sample.
///
/// Generic over the bus and select pin so the capture path can be exercised
/// off-target. The transport has no error channel of its own; a wedged bus
/// shows up downstream as stagnant or missing samples, which the main loop
/// reports.
pub struct Acquisition<SPI, CSN> {
    /// Bus wired to the converter.
    spi: SPI,
    /// Active-low select (nDXMIT).
    csn: CSN,
    /// Re-entry guard.
    state: AcqState,
}

impl<SPI, CSN> Acquisition<SPI, CSN>
where
    SPI: SpiBus<u8>,
    CSN: OutputPin,
{
    /// Take ownership of the bus and select pin, leaving the bus deselected.
    pub fn new(spi: SPI, mut csn: CSN) -> Self {
        let _ = csn.set_high();
        Self {
            spi,
            csn,
            state: AcqState::Idle,
        }
    }

    /// Service one data-valid edge.
    ///
    /// An edge arriving while a capture is already in flight is dropped, not
    /// queued: the converter paces the system, and a backlog could never
    /// drain. The drop is counted so `status` can surface it.
    pub fn on_data_valid(&mut self, store: &SampleStore) {
        if !self.try_begin() {
            store.note_drop();
            return;
        }

        settle();
        let frame = self.read_frame();
        store.publish(frame.sample(), frame);

        self.finish();
    }

    /// Claim the Idle->Busy transition. Returns false if already Busy.
    fn try_begin(&mut self) -> bool {
        if self.state == AcqState::Busy {
            return false;
        }
        self.state = AcqState::Busy;
        true
    }

    /// Return to Idle after a completed capture.
    fn finish(&mut self) {
        self.state = AcqState::Idle;
    }

    /// Clock one full frame out of the converter under select.
    fn read_frame(&mut self) -> Frame {
        let mut bytes = [0u8; FRAME_LEN];

        let _ = self.csn.set_low();
        let _ = self.spi.transfer(&mut bytes, &[0u8; FRAME_LEN]);
        let _ = self.spi.flush();
        let _ = self.csn.set_high();

        Frame::new(bytes)
    }
}

/// Fixed pre-transfer settling delay.
#[cfg(target_os = "none")]
fn settle() {
    cortex_m::asm::delay(SETTLE_CYCLES);
}

/// Off-target builds have nothing to settle.
#[cfg(not(target_os = "none"))]
fn settle() {}

#[cfg(test)]
mod tests {
    use core::convert::Infallible;

    use super::*;

    #[test]
    fn decode_sign_extends_full_scale_negative() {
        // Low 20 bits all set -> -1; the top nibble of byte 2 is ignored.
        let frame = Frame::new([0x00, 0x00, 0x7F, 0xFF, 0xFF]);
        assert_eq!(frame.sample(), -1);
    }

    #[test]
    fn decode_passes_small_positive_through() {
        let frame = Frame::new([0x00, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(frame.sample(), 1);
    }

    #[test]
    fn decode_reaches_both_limits() {
        // 0x80000 is the most negative code.
        let frame = Frame::new([0x00, 0x00, 0x08, 0x00, 0x00]);
        assert_eq!(frame.sample(), SAMPLE_MIN);

        // 0x7FFFF is the most positive code.
        let frame = Frame::new([0x00, 0x00, 0x07, 0xFF, 0xFF]);
        assert_eq!(frame.sample(), SAMPLE_MAX);
    }

    #[test]
    fn decode_ignores_status_bytes() {
        let frame = Frame::new([0xFF, 0xA5, 0x00, 0x00, 0x05]);
        assert_eq!(frame.sample(), 5);
    }

    /// Bus stub that returns a canned frame and counts transfers.
    struct FakeBus {
        /// Frame handed back on every transfer.
        response: [u8; FRAME_LEN],
        /// Number of transfers performed.
        transfers: usize,
    }

    impl embedded_hal::spi::ErrorType for FakeBus {
        type Error = Infallible;
    }

    impl SpiBus<u8> for FakeBus {
        fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
            for (word, byte) in words.iter_mut().zip(self.response.iter()) {
                *word = *byte;
            }
            Ok(())
        }

        fn write(&mut self, _words: &[u8]) -> Result<(), Self::Error> {
            Ok(())
        }

        fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
            // The handler always writes idle zeros while clocking data in.
            assert!(write.iter().all(|&byte| byte == 0));
            assert_eq!(read.len(), FRAME_LEN);
            self.transfers += 1;
            self.read(read)
        }

        fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
            self.read(words)
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    /// Select-pin stub recording its level history.
    struct FakePin {
        /// True while asserted (low).
        low: bool,
        /// Number of falling transitions.
        selects: usize,
    }

    impl embedded_hal::digital::ErrorType for FakePin {
        type Error = Infallible;
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            if !self.low {
                self.selects += 1;
            }
            self.low = true;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.low = false;
            Ok(())
        }
    }

    fn driver(response: [u8; FRAME_LEN]) -> Acquisition<FakeBus, FakePin> {
        Acquisition::new(
            FakeBus {
                response,
                transfers: 0,
            },
            FakePin {
                low: false,
                selects: 0,
            },
        )
    }

    #[test]
    fn edge_captures_and_publishes() {
        let store = SampleStore::new();
        let mut acq = driver([0x00, 0x00, 0x00, 0x00, 0x2A]);

        acq.on_data_valid(&store);

        let capture = store.take().expect("capture should be pending");
        assert_eq!(capture.raw, 42);
        assert_eq!(capture.frame.bytes(), &[0x00, 0x00, 0x00, 0x00, 0x2A]);
        assert_eq!(acq.spi.transfers, 1);
        assert_eq!(acq.csn.selects, 1);
        assert!(!acq.csn.low, "select must be released after the frame");
        assert_eq!(store.drops(), 0);
    }

    #[test]
    fn edge_during_busy_is_dropped_without_touching_the_bus() {
        let store = SampleStore::new();
        let mut acq = driver([0x00, 0x00, 0x00, 0x00, 0x01]);

        // First edge claims the handler...
        assert!(acq.try_begin());
        // ...so a second qualifying edge before completion must only count.
        acq.on_data_valid(&store);

        assert_eq!(store.take(), None);
        assert_eq!(store.drops(), 1);
        assert_eq!(acq.spi.transfers, 0);
        assert_eq!(acq.csn.selects, 0);

        // Once the first capture finishes, edges are serviced again.
        acq.finish();
        acq.on_data_valid(&store);
        assert_eq!(store.take().map(|c| c.raw), Some(1));
        assert_eq!(store.drops(), 1);
    }

    #[test]
    fn begin_is_exclusive_until_finish() {
        let mut acq = driver([0; FRAME_LEN]);
        assert!(acq.try_begin());
        assert!(!acq.try_begin());
        acq.finish();
        assert!(acq.try_begin());
    }
}
