//! This [RP2040](rp2040_hal) project drives a DDC112 charge-integrating
//! current-to-digital converter as a single-channel picoammeter: it
//! synthesizes the converter's two clocks, captures a 20-bit conversion on
//! every data-valid edge, smooths the codes with a bounded moving average,
//! and reports calibrated current over a serial console.
//!
//! ## Layout
//!
//! The real-time path lives in [`acquire`] (frame capture and decode, run
//! from the `IO_IRQ_BANK0` handler in [`interrupt`]) and [`store`] (the
//! single-slot handoff into the main loop). The main loop's bookkeeping is
//! pure logic in [`meter`], [`buffer`], [`range`] and [`commands`], which
//! build for the host so their behavior is covered by `cargo test` without
//! a board attached. Clock synthesis sits in [`clocks`].
//!
//! ## Wiring
//!
//! | signal | GPIO |
//! |---|---|
//! | converter clock (10 MHz) | 6 |
//! | integration clock (1 kHz) | 7 |
//! | TEST | 8 |
//! | nDVALID | 12 |
//! | DOUT -> MISO | 16 |
//! | nDXMIT (select) | 17 |
//! | DCLK <- SCK | 18 |
//! | DIN <- MOSI | 19 |
//! | console (UART0) | 0, 1 |
//!
//! ## Crate features
//!
//! - `trace_indiv_samples`: Logs information on every accepted sample over
//!   defmt. Very noisy!

// Copyright 2026 the ddc112_picoammeter authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![no_std]
#![warn(missing_docs)]

pub mod acquire;
pub mod buffer;
pub mod commands;
pub mod meter;
pub mod range;
pub mod store;

#[cfg(target_os = "none")]
pub mod clocks;
#[cfg(target_os = "none")]
pub mod interrupt;

/// External high-speed crystal on the board is 12 MHz.
pub const XOSC_FREQ_HZ: u32 = 12_000_000;
/// Conversion clock fed to the converter's CLK input.
pub const CONV_CLOCK_HZ: u32 = 10_000_000;
/// Integration pacing clock fed to CONV; one conversion per 1 ms period.
pub const INTEG_CLOCK_HZ: u32 = 1_000;
/// Bus clock for frame readout.
pub const SPI_BAUD_HZ: u32 = 4_000_000;
